use thiserror::Error;

pub mod form;
pub mod record;
pub mod schema;
pub mod store;


/// Row holding the column names. Rows above it are reserved for the sheet's own layout.
pub const HEADER_ROW: u32 = 9;

pub const DEFAULT_SHEET: &str = "Sheet1";

/// Columns written into a freshly created template workbook.
pub const TEMPLATE_HEADERS: [&str; 12] = [
    "DATE",
    "ENTRY TIME",
    "EXIT TIME",
    "INSTRUMENT",
    "STRIKE PRICE",
    "CE/PE",
    "BUY/SELL",
    "QUANTITY",
    "ENTRY PRICE",
    "EXIT PRICE",
    "STOP LOSS",
    "P&L",
];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("workbook not found: {0}")]
    MissingWorkbook(String),
    #[error("could not read workbook {path}: {reason}")]
    Unreadable { path: String, reason: String },
    #[error("workbook {0} has no sheets")]
    NoSheet(String),
    #[error("could not save workbook {path}: {reason}")]
    SaveFailed { path: String, reason: String },
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, PartialEq, Error)]
pub enum FormError {
    #[error("no field named {0}")]
    UnknownField(String),
    #[error("{value} is not a valid choice for {header}")]
    InvalidChoice { header: String, value: String },
    #[error("{0} does not take a quick fill")]
    NoQuickFill(String),
}

/// Upper-cased, trimmed header text used for every keyword comparison.
pub fn header_key(header: &str) -> String {
    header.trim().to_uppercase()
}
