use std::fmt;
use std::str::FromStr;

use chrono::{Local, NaiveDateTime};
use getset::Getters;
use log::{debug, info, warn};
use rust_decimal::Decimal;
use thiserror::Error;

use super::record::TradeRecord;
use super::schema::{infer_kind, FieldKind, QuickFill};
use super::store::WorkbookStore;
use super::{header_key, FormError, StoreError};

const DATE: &str = "DATE";
const INSTRUMENT: &str = "INSTRUMENT";
const SIDE: &str = "BUY/SELL";
const ENTRY_PRICE: &str = "ENTRY PRICE";
const EXIT_PRICE: &str = "EXIT PRICE";
const QUANTITY: &str = "QUANTITY";
const PNL: &str = "P&L";

const REQUIRED: [&str; 5] = [DATE, INSTRUMENT, SIDE, ENTRY_PRICE, QUANTITY];
const NUMERIC: [&str; 2] = [ENTRY_PRICE, EXIT_PRICE];
const PNL_OPERANDS: [&str; 4] = [ENTRY_PRICE, EXIT_PRICE, QUANTITY, SIDE];

const PNL_DECIMALS: u32 = 2;

#[derive(Debug, PartialEq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(String),
    #[error("{0} must be a number")]
    NotANumber(String),
    #[error("{0} must be an integer")]
    NotAnInteger(String),
}

#[derive(Debug, PartialEq, Error)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    pub fn errors(&self) -> &[ValidationError] {
        &self.0
    }

    pub fn messages(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.messages().join("\n"))
    }
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("{0}")]
    Invalid(#[from] ValidationErrors),
    #[error("{0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Getters)]
pub struct Field {
    #[getset(get = "pub")]
    header: String,
    #[getset(get = "pub")]
    kind: FieldKind,
    #[getset(get = "pub")]
    value: String,

    key: String,
}

/// One input slot per workbook header. Slots start empty and are cleared after a
/// successful save.
#[derive(Debug, Clone)]
pub struct EntryForm {
    fields: Vec<Field>,
}

impl EntryForm {
    pub fn new<I, S>(headers: I) -> EntryForm
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let fields = headers
            .into_iter()
            .map(|header| {
                let header = header.as_ref();
                Field {
                    header: header.to_string(),
                    kind: infer_kind(header),
                    value: String::new(),
                    key: header_key(header),
                }
            })
            .collect();

        EntryForm { fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn value(&self, header: &str) -> Option<&str> {
        self.position(&header_key(header)).map(|idx| self.fields[idx].value.as_str())
    }

    pub fn set_value(&mut self, header: &str, value: &str) -> Result<(), FormError> {
        let key = header_key(header);
        let idx = self.position(&key).ok_or_else(|| FormError::UnknownField(header.to_string()))?;
        let field = &mut self.fields[idx];

        field.value = match field.kind {
            FieldKind::Choice(_) if !value.trim().is_empty() => field
                .kind
                .choose(value)
                .ok_or_else(|| FormError::InvalidChoice {
                    header: field.header.clone(),
                    value: value.to_string(),
                })?
                .to_string(),
            _ => value.to_string(),
        };

        if PNL_OPERANDS.contains(&key.as_str()) {
            self.recompute_pnl();
        }

        Ok(())
    }

    pub fn fill_today(&mut self, header: &str) -> Result<(), FormError> {
        self.quick_fill(header, QuickFill::Today, Local::now().naive_local())
    }

    pub fn fill_now(&mut self, header: &str) -> Result<(), FormError> {
        self.quick_fill(header, QuickFill::Now, Local::now().naive_local())
    }

    pub fn quick_fill(&mut self, header: &str, fill: QuickFill, at: NaiveDateTime) -> Result<(), FormError> {
        let idx = self
            .position(&header_key(header))
            .ok_or_else(|| FormError::UnknownField(header.to_string()))?;
        let field = &mut self.fields[idx];

        if field.kind.quick_fill() != Some(fill) {
            return Err(FormError::NoQuickFill(field.header.clone()));
        }

        field.value = match fill {
            QuickFill::Today => at.format("%Y-%m-%d").to_string(),
            QuickFill::Now => at.format("%H:%M").to_string(),
        };

        Ok(())
    }

    // Empty operands count as zero; an unparsable one leaves P&L as it was.
    fn recompute_pnl(&mut self) {
        let Some(pnl_idx) = self.position(PNL) else {
            return;
        };

        let (Some(entry), Some(exit), Some(quantity)) =
            (self.operand(ENTRY_PRICE), self.operand(EXIT_PRICE), self.operand(QUANTITY))
        else {
            return;
        };

        let Some(pnl) = exit.checked_sub(entry).and_then(|diff| diff.checked_mul(quantity)) else {
            debug!("p&l overflow, keeping previous value");
            return;
        };

        let sell = self
            .value(SIDE)
            .is_some_and(|side| side.trim().eq_ignore_ascii_case("SELL"));
        let pnl = match pnl.round_dp(PNL_DECIMALS) {
            rounded if rounded.is_zero() => Decimal::ZERO,
            rounded if sell => -rounded,
            rounded => rounded,
        };

        self.fields[pnl_idx].value = format!("{:.2}", pnl);
    }

    fn operand(&self, key: &str) -> Option<Decimal> {
        let value = self.value(key).unwrap_or_default().trim();
        if value.is_empty() {
            return Some(Decimal::ZERO);
        }

        parse_decimal(value)
    }

    pub fn validate(&self) -> Result<TradeRecord, ValidationErrors> {
        let mut errors = Vec::new();

        for key in REQUIRED {
            if let Some(field) = self.field(key) {
                if field.value.trim().is_empty() {
                    errors.push(ValidationError::Required(field.header.clone()));
                }
            }
        }

        for key in NUMERIC {
            if let Some(field) = self.field(key) {
                let value = field.value.trim();
                if !value.is_empty() && parse_decimal(value).is_none() {
                    errors.push(ValidationError::NotANumber(field.header.clone()));
                }
            }
        }

        let mut quantity = None;
        if let Some(field) = self.field(QUANTITY) {
            let value = field.value.trim();
            if !value.is_empty() {
                match coerce_integer(value) {
                    Some(coerced) => quantity = Some(coerced),
                    None => errors.push(ValidationError::NotAnInteger(field.header.clone())),
                }
            }
        }

        if !errors.is_empty() {
            return Err(ValidationErrors(errors));
        }

        let values = self
            .fields
            .iter()
            .map(|field| match (&quantity, field.key.as_str()) {
                (Some(coerced), QUANTITY) => coerced.clone(),
                _ => field.value.trim().to_string(),
            })
            .collect();

        Ok(TradeRecord::new(values))
    }

    /// Validates, appends the record and clears the form. Input is kept on any failure.
    pub fn submit(&mut self, store: &WorkbookStore) -> Result<TradeRecord, SubmitError> {
        let record = self.validate().inspect_err(|errors| {
            debug!("rejected entry, errors={:?}", errors.messages());
        })?;

        if let Err(err) = store.append_record(&record) {
            warn!("failed to save entry, err={}", err);
            return Err(err.into());
        }

        info!("saved entry to {}", store.path().display());
        self.clear();

        Ok(record)
    }

    pub fn clear(&mut self) {
        for field in &mut self.fields {
            field.value.clear();
        }
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.key == key)
    }

    fn field(&self, key: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.key == key)
    }
}

fn parse_decimal(value: &str) -> Option<Decimal> {
    Decimal::from_str(value)
        .or_else(|_| Decimal::from_scientific(value))
        .ok()
}

fn coerce_integer(value: &str) -> Option<String> {
    if let Ok(integer) = value.parse::<i64>() {
        return Some(integer.to_string());
    }

    let decimal = parse_decimal(value)?;
    if decimal.fract().is_zero() {
        Some(decimal.trunc().normalize().to_string())
    } else {
        None
    }
}
