//! Upload parsing. Everything here is pure: bytes in, typed rows (or a typed
//! error naming the offending row and column) out.

pub mod csv_upload;
pub mod listing;

pub use csv_upload::{parse_trade_file, parse_yield_file, ParsedRows, TradeRow, YieldRow};
pub use listing::parse_listing;

/// A file received from a multipart form, with what the client declared
/// about it.
#[derive(Debug, Clone, Default)]
pub struct FileUpload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn new(file_name: impl Into<String>, content_type: Option<&str>, bytes: Vec<u8>) -> Self {
        FileUpload {
            file_name: Some(file_name.into()),
            content_type: content_type.map(str::to_string),
            bytes,
        }
    }

    /// Convenience for a `text/csv` upload named `name`.
    pub fn csv(name: &str, contents: &str) -> Self {
        Self::new(name, Some("text/csv"), contents.as_bytes().to_vec())
    }
}
