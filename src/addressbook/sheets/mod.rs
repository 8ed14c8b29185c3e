pub mod config;
pub mod error;
pub mod io;
pub mod model;
pub mod normalize;
pub mod sync;
pub mod upload;

pub use error::{ExportError, Result};
