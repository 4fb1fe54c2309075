use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use umya_spreadsheet::{Spreadsheet, Worksheet};

use super::record::TradeRecord;
use super::{StoreError, DEFAULT_SHEET, HEADER_ROW, TEMPLATE_HEADERS};

/// Reopens the file on every call. One writer per workbook.
pub struct WorkbookStore {
    path: PathBuf,
    sheet_name: String,
}

impl WorkbookStore {
    pub fn new(path: impl Into<PathBuf>) -> WorkbookStore {
        WorkbookStore {
            path: path.into(),
            sheet_name: DEFAULT_SHEET.to_string(),
        }
    }

    pub fn with_sheet(mut self, sheet_name: impl Into<String>) -> WorkbookStore {
        self.sheet_name = sheet_name.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_headers(&self) -> Option<Vec<String>> {
        match self.read_headers() {
            Ok(headers) => Some(headers),
            Err(err) => {
                warn!("failed to load headers, err={}", err);
                None
            },
        }
    }

    pub fn read_headers(&self) -> Result<Vec<String>, StoreError> {
        let book = self.open()?;
        let sheet = self.sheet(&book)?;

        let headers = (1..=sheet.get_highest_column())
            .map(|col| sheet.get_value((col, HEADER_ROW)).trim().to_string())
            .filter(|header| !header.is_empty())
            .collect();

        Ok(headers)
    }

    /// Writes `record` into the row after the current last row and saves the workbook.
    /// Returns the 1-based row number written.
    pub fn append_record(&self, record: &TradeRecord) -> Result<u32, StoreError> {
        let mut book = self.open()?;
        let index = self.sheet_index(&book)?;
        let sheet = book
            .get_sheet_mut(&index)
            .ok_or_else(|| StoreError::NoSheet(self.path.display().to_string()))?;

        let row = sheet.get_highest_row() + 1;
        for (col, value) in (1u32..).zip(record.values()) {
            sheet.get_cell_mut((col, row)).set_value_string(value.as_str());
        }

        self.save(&book)?;
        info!("appended record at row {} of {}", row, self.path.display());

        Ok(row)
    }

    fn open(&self) -> Result<Spreadsheet, StoreError> {
        if !self.path.is_file() {
            return Err(StoreError::MissingWorkbook(self.path.display().to_string()));
        }

        umya_spreadsheet::reader::xlsx::read(&self.path).map_err(|err| StoreError::Unreadable {
            path: self.path.display().to_string(),
            reason: err.to_string(),
        })
    }

    fn save(&self, book: &Spreadsheet) -> Result<(), StoreError> {
        let staging = staging_path(&self.path);
        let save_failed = |reason: String| StoreError::SaveFailed {
            path: self.path.display().to_string(),
            reason,
        };

        umya_spreadsheet::writer::xlsx::write(book, &staging).map_err(|err| save_failed(err.to_string()))?;
        if let Err(err) = fs::rename(&staging, &self.path) {
            let _ = fs::remove_file(&staging);
            return Err(save_failed(err.to_string()));
        }

        Ok(())
    }

    fn sheet_index(&self, book: &Spreadsheet) -> Result<usize, StoreError> {
        let sheets = book.get_sheet_collection();
        if sheets.is_empty() {
            return Err(StoreError::NoSheet(self.path.display().to_string()));
        }

        Ok(sheets
            .iter()
            .position(|sheet| sheet.get_name() == self.sheet_name)
            .unwrap_or_else(|| {
                debug!("sheet {} not found, using first sheet", self.sheet_name);
                0
            }))
    }

    fn sheet<'a>(&self, book: &'a Spreadsheet) -> Result<&'a Worksheet, StoreError> {
        let index = self.sheet_index(book)?;
        book.get_sheet(&index)
            .ok_or_else(|| StoreError::NoSheet(self.path.display().to_string()))
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    match path.extension() {
        Some(ext) => path.with_file_name(format!("{}.saving.{}", stem, ext.to_string_lossy())),
        None => path.with_file_name(format!("{}.saving", stem)),
    }
}

/// Creates an empty journal: rows above the header row blank, the fixed headers on the
/// header row of `Sheet1`.
pub fn create_template(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut book = umya_spreadsheet::new_file();
    let sheet = book
        .get_sheet_mut(&0)
        .ok_or_else(|| StoreError::NoSheet(path.display().to_string()))?;
    for (col, header) in (1u32..).zip(TEMPLATE_HEADERS) {
        sheet.get_cell_mut((col, HEADER_ROW)).set_value_string(header);
    }

    umya_spreadsheet::writer::xlsx::write(&book, path).map_err(|err| StoreError::SaveFailed {
        path: path.display().to_string(),
        reason: err.to_string(),
    })?;
    info!("created template workbook at {}", path.display());

    Ok(())
}

/// Makes sure a writable workbook exists at `dest`, copying `template` on first run or
/// creating a blank template when there is nothing to copy.
pub fn install_workbook(template: Option<&Path>, dest: &Path) -> Result<bool, StoreError> {
    if dest.is_file() {
        return Ok(false);
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    match template {
        Some(template) if template.is_file() => {
            fs::copy(template, dest)?;
            info!("copied {} -> {}", template.display(), dest.display());
        },
        _ => create_template(dest)?,
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use anyhow::{bail, Result};
    use pretty_assertions::assert_eq;

    use super::*;

    fn template_store(dir: &Path) -> Result<WorkbookStore> {
        let path = dir.join("JOURNAL.xlsm");
        create_template(&path)?;
        Ok(WorkbookStore::new(path))
    }

    fn record(values: &[&str]) -> TradeRecord {
        TradeRecord::new(values.iter().map(|v| v.to_string()).collect())
    }

    #[test]
    fn test_template_headers_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = template_store(dir.path())?;

        assert_eq!(store.read_headers()?, TEMPLATE_HEADERS.to_vec());

        Ok(())
    }

    #[test]
    fn test_missing_workbook() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = WorkbookStore::new(dir.path().join("absent.xlsm"));

        assert_eq!(store.load_headers(), None);
        match store.append_record(&record(&["2024-01-01"])) {
            Err(StoreError::MissingWorkbook(_)) => {},
            other => bail!("expected missing workbook, got {:?}", other),
        }
        assert!(!store.path().exists());

        Ok(())
    }

    #[test]
    fn test_unreadable_workbook() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("JOURNAL.xlsm");
        fs::write(&path, b"not a workbook")?;
        let store = WorkbookStore::new(&path);

        assert_eq!(store.load_headers(), None);
        match store.read_headers() {
            Err(StoreError::Unreadable { .. }) => {},
            other => bail!("expected unreadable workbook, got {:?}", other),
        }

        Ok(())
    }

    #[test]
    fn test_append_goes_after_last_row() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = template_store(dir.path())?;

        let first = store.append_record(&record(&["2024-01-01", "09:15"]))?;
        let second = store.append_record(&record(&["2024-01-02", "10:30"]))?;
        assert_eq!(first, HEADER_ROW + 1);
        assert_eq!(second, HEADER_ROW + 2);

        let book = umya_spreadsheet::reader::xlsx::read(store.path())?;
        let sheet = book.get_sheet(&0).expect("sheet");
        assert_eq!(sheet.get_value((1u32, HEADER_ROW + 1)), "2024-01-01");
        assert_eq!(sheet.get_value((2u32, HEADER_ROW + 2)), "10:30");
        assert_eq!(sheet.get_value((1u32, HEADER_ROW)), "DATE");
        assert!(!staging_path(store.path()).exists());

        Ok(())
    }

    #[test]
    fn test_headers_skip_blank_cells() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("custom.xlsx");
        let mut book = umya_spreadsheet::new_file();
        let sheet = book.get_sheet_mut(&0).expect("sheet");
        sheet.get_cell_mut((1u32, HEADER_ROW)).set_value_string(" DATE ");
        sheet.get_cell_mut((3u32, HEADER_ROW)).set_value_string("NOTES");
        umya_spreadsheet::writer::xlsx::write(&book, &path)?;

        let store = WorkbookStore::new(&path);
        assert_eq!(store.read_headers()?, vec!["DATE".to_string(), "NOTES".to_string()]);

        Ok(())
    }

    #[test]
    fn test_install_workbook() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let template = dir.path().join("packaged").join("JOURNAL.xlsm");
        create_template(&template)?;
        let dest = dir.path().join("data").join("JOURNAL.xlsm");

        assert!(install_workbook(Some(&template), &dest)?);
        assert_eq!(fs::read(&dest)?, fs::read(&template)?);
        // Existing working copy is never replaced.
        assert!(!install_workbook(Some(&template), &dest)?);

        let fresh = dir.path().join("fresh").join("JOURNAL.xlsm");
        assert!(install_workbook(None, &fresh)?);
        assert_eq!(WorkbookStore::new(&fresh).read_headers()?, TEMPLATE_HEADERS.to_vec());

        Ok(())
    }
}
