use std::fmt;

use super::header_key;

const OPTION_TYPE: [&str; 2] = ["CE", "PE"];
const SIDE: [&str; 2] = ["BUY", "SELL"];

const OPTION_TYPE_HEADERS: [&str; 3] = ["CE/PE", "CE/ PE", "CE PE"];
const SIDE_HEADERS: [&str; 2] = ["BUY/SELL", "BUY / SELL"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuickFill {
    Today,
    Now,
}

/// Input kind of a column, inferred from its header text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Decimal,
    /// ISO `YYYY-MM-DD`.
    Date,
    /// `HH:MM`.
    Time,
    Choice([&'static str; 2]),
}

impl FieldKind {
    pub fn quick_fill(&self) -> Option<QuickFill> {
        match self {
            FieldKind::Date => Some(QuickFill::Today),
            FieldKind::Time => Some(QuickFill::Now),
            _ => None,
        }
    }

    pub fn options(&self) -> Option<&[&'static str; 2]> {
        match self {
            FieldKind::Choice(options) => Some(options),
            _ => None,
        }
    }

    pub fn choose(&self, value: &str) -> Option<&'static str> {
        let options = self.options()?;
        let wanted = value.trim();
        options.iter().copied().find(|option| option.eq_ignore_ascii_case(wanted))
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Text => write!(f, "text"),
            FieldKind::Integer => write!(f, "integer"),
            FieldKind::Decimal => write!(f, "decimal"),
            FieldKind::Date => write!(f, "date"),
            FieldKind::Time => write!(f, "time"),
            FieldKind::Choice([a, b]) => write!(f, "choice {}/{}", a, b),
        }
    }
}

/// Maps a header to its input kind. Total: anything unrecognised is free text.
pub fn infer_kind(header: &str) -> FieldKind {
    let key = header_key(header);
    let key = key.as_str();

    if OPTION_TYPE_HEADERS.contains(&key) {
        FieldKind::Choice(OPTION_TYPE)
    } else if SIDE_HEADERS.contains(&key) {
        FieldKind::Choice(SIDE)
    } else if key.contains("QUANTITY") || key == "QTY" {
        FieldKind::Integer
    } else if key.contains("PRICE") || key.contains("P&L") {
        FieldKind::Decimal
    } else if key == "DATE" {
        FieldKind::Date
    } else if key == "TIME" || key.contains("ENTRY TIME") || key.contains("EXIT TIME") {
        FieldKind::Time
    } else {
        FieldKind::Text
    }
}
