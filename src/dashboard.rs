//! Read-only view of the journal: everything below the header row as a table.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use calamine::{open_workbook_auto, Data, Range, Reader};
use log::debug;
use thiserror::Error;

use crate::journal::HEADER_ROW;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("Error loading file: {0}")]
    Open(String),
    #[error("Error loading file: sheet {0} could not be read")]
    Sheet(String),
    #[error("Error loading file: no header row in {0}")]
    Empty(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Opens the workbook, skips the reserved rows and reads the header row plus every
/// non-blank row below it. Uses `sheet_name` when present, else the first sheet.
pub fn load_table(path: &Path, sheet_name: &str) -> Result<Table, DashboardError> {
    let mut workbook = open_workbook_auto(path).map_err(|err| DashboardError::Open(err.to_string()))?;

    let names = workbook.sheet_names();
    let name = names
        .iter()
        .find(|name| name.as_str() == sheet_name)
        .or_else(|| names.first())
        .cloned()
        .ok_or_else(|| DashboardError::Empty(path.display().to_string()))?;

    let range = workbook
        .worksheet_range(&name)
        .map_err(|_| DashboardError::Sheet(name.clone()))?;

    table_from_range(&range).ok_or_else(|| DashboardError::Empty(path.display().to_string()))
}

fn table_from_range(range: &Range<Data>) -> Option<Table> {
    let (start_row, _) = range.start()?;
    let header_index = (HEADER_ROW - 1).checked_sub(start_row)? as usize;

    let mut rows = range.rows().skip(header_index);
    let header_cells = rows.next()?;
    let mut headers: Vec<String> = header_cells.iter().map(|cell| cell.to_string().trim().to_string()).collect();
    while headers.last().is_some_and(|h| h.is_empty()) {
        headers.pop();
    }
    if headers.is_empty() {
        return None;
    }

    let width = headers.len();
    let rows: Vec<Vec<String>> = rows
        .map(|row| {
            let mut values: Vec<String> = row.iter().take(width).map(ToString::to_string).collect();
            values.resize(width, String::new());
            values
        })
        .filter(|values| values.iter().any(|value| !value.trim().is_empty()))
        .collect();
    debug!("loaded {} journal rows", rows.len());

    Some(Table { headers, rows })
}

impl Table {
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::WriterBuilder::new().from_writer(writer);
        csv_writer.write_record(&self.headers)?;
        for row in &self.rows {
            csv_writer.write_record(row)?;
        }

        csv_writer.flush()?;

        Ok(())
    }

    /// Plain text table with columns padded to their widest cell.
    pub fn render_text(&self) -> String {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (width, value) in widths.iter_mut().zip(row) {
                *width = (*width).max(value.chars().count());
            }
        }

        let line = |cells: &[String]| {
            cells
                .iter()
                .zip(&widths)
                .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
                .collect::<Vec<_>>()
                .join(" | ")
                .trim_end()
                .to_string()
        };

        let mut out = vec![line(&self.headers)];
        out.push(widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-+-"));
        out.extend(self.rows.iter().map(|row| line(row)));
        out.join("\n")
    }
}
