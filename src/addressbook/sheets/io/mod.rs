pub mod backup;
pub mod delimited;
pub mod google_sheets;
pub mod oauth;
pub mod source;
pub mod vcard;
pub mod xlsx_sheet;
