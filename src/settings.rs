//! Settings and the per-run session context.
//!
//! Settings come from a JSON file: the path given on the command line or in
//! `JOURNAL_SETTINGS`, else `journal.json` in the current directory, else built-in
//! defaults. Any field left out of the file takes its default.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::{ProjectDirs, UserDirs};
use getset::Getters;
use log::{debug, info, warn};
use serde::Deserialize;

use crate::journal::store::{install_workbook, WorkbookStore};
use crate::journal::DEFAULT_SHEET;

pub const SETTINGS_ENV: &str = "JOURNAL_SETTINGS";
pub const DEFAULT_SETTINGS_FILE: &str = "journal.json";
pub const WORKBOOK_NAME: &str = "JOURNAL.xlsm";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data_dir: PathBuf,
    /// Packaged workbook copied into `data_dir` on first run.
    pub template_path: Option<PathBuf>,
    pub downloads_dir: PathBuf,
    pub workbook_name: String,
    pub sheet_name: String,
    /// Ask for an export destination instead of writing to `downloads_dir`.
    pub use_picker: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            data_dir: default_data_dir(),
            template_path: Some(PathBuf::from(WORKBOOK_NAME)),
            downloads_dir: default_downloads_dir(),
            workbook_name: WORKBOOK_NAME.to_string(),
            sheet_name: DEFAULT_SHEET.to_string(),
            use_picker: false,
        }
    }
}

fn default_data_dir() -> PathBuf {
    ProjectDirs::from("com", "tradejournal", "journal")
        .map(|dirs| dirs.data_local_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".journal"))
}

fn default_downloads_dir() -> PathBuf {
    UserDirs::new()
        .and_then(|dirs| dirs.download_dir().map(Path::to_path_buf))
        .or_else(|| env::var_os("HOME").map(|home| PathBuf::from(home).join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("Downloads"))
}

pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).with_context(|| format!("Reading settings file: {}", path.display()))?;
    let settings: Settings =
        serde_json::from_str(&raw).with_context(|| format!("Parsing settings JSON in {}", path.display()))?;
    Ok(settings)
}

/// Resolves settings from an explicit path, the environment, the default file, or
/// the built-in defaults, in that order. Only an explicitly named file must exist.
pub fn resolve_settings(explicit: Option<&Path>) -> Result<Settings> {
    if let Some(path) = explicit {
        return load_settings(path);
    }

    if let Some(path) = env::var_os(SETTINGS_ENV) {
        return load_settings(PathBuf::from(path));
    }

    let default = Path::new(DEFAULT_SETTINGS_FILE);
    if default.is_file() {
        return load_settings(default);
    }

    debug!("no settings file found, using defaults");
    Ok(Settings::default())
}

/// What one run of the journal works against.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub")]
pub struct Session {
    settings: Settings,
    workbook_path: PathBuf,
}

impl Session {
    pub fn new(settings: Settings) -> Session {
        let workbook_path = settings.data_dir.join(&settings.workbook_name);
        Session { settings, workbook_path }
    }

    /// Builds the session and makes sure the working workbook exists. A failed copy is
    /// only logged; reading headers reports the missing workbook afterwards.
    pub fn provision(settings: Settings) -> Session {
        let session = Session::new(settings);

        match install_workbook(session.settings.template_path.as_deref(), &session.workbook_path) {
            Ok(true) => info!("installed workbook at {}", session.workbook_path.display()),
            Ok(false) => debug!("using existing workbook {}", session.workbook_path.display()),
            Err(err) => warn!("could not install workbook, err={}", err),
        }

        session
    }

    pub fn store(&self) -> WorkbookStore {
        WorkbookStore::new(&self.workbook_path).with_sheet(&self.settings.sheet_name)
    }
}
