//! Core library for the contact-sheets command line application.
//!
//! Contacts are read from an address-book export by the adapters in
//! [`addressbook::sheets::io`], flattened into fixed-width rows by
//! [`addressbook::sheets::normalize`], and pushed to a spreadsheet in batches by
//! [`addressbook::sheets::upload`]. [`addressbook::sheets::sync`] ties the steps
//! together for the CLI and the integration tests.

pub mod addressbook;

pub use addressbook::sheets::{
    ExportError, Result, config, error, io, model, normalize, sync, upload,
};
