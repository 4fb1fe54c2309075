use std::cell::RefCell;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use enum_dispatch::enum_dispatch;
use log::{debug, info, warn};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no workbook to export at {0}")]
    MissingSource(String),
    #[error("export cancelled")]
    Cancelled,
    #[error("cannot export {0} onto itself")]
    SameAsSource(String),
    #[error("file picker unavailable: {0}")]
    PickerUnavailable(String),
    #[error("export failed: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, PartialEq)]
pub enum ExportOutcome {
    Written(PathBuf),
    /// A destination was requested; the result arrives through the notify callback.
    Pending,
}

pub type ExportNotify = Box<dyn FnOnce(Result<PathBuf, ExportError>)>;

/// Answer from a destination picker: the chosen path, or `None` when the user backs out.
pub type PickerReply = Box<dyn FnOnce(Option<PathBuf>)>;

/// Platform capability that lets the user choose where a new file goes.
pub trait DestinationPicker {
    fn request(&self, suggested_name: &str, reply: PickerReply) -> Result<(), ExportError>;
}

#[enum_dispatch]
pub trait ExportSink {
    fn export(&self, source: &Path, notify: ExportNotify) -> Result<ExportOutcome, ExportError>;
}

#[enum_dispatch(ExportSink)]
pub enum Sink {
    Downloads(DownloadsSink),
    Picker(PickerSink),
}

const MAX_NAME_ATTEMPTS: u32 = 100;

pub fn export_file_name() -> String {
    export_name(Utc::now().timestamp(), 0)
}

fn export_name(stamp: i64, attempt: u32) -> String {
    match attempt {
        0 => format!("JOURNAL_export_{}.xlsm", stamp),
        n => format!("JOURNAL_export_{}_{}.xlsm", stamp, n),
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn copy_to(source: &Path, dest: &Path) -> Result<(), ExportError> {
    if same_file(source, dest) {
        return Err(ExportError::SameAsSource(dest.display().to_string()));
    }

    fs::copy(source, dest)?;
    Ok(())
}

pub struct DownloadsSink {
    dir: PathBuf,
}

impl DownloadsSink {
    pub fn new(dir: impl Into<PathBuf>) -> DownloadsSink {
        DownloadsSink { dir: dir.into() }
    }

    // Never replaces an earlier export: a taken name gets a numeric suffix.
    pub fn copy(&self, source: &Path) -> Result<PathBuf, ExportError> {
        let mut reader = File::open(source)?;
        fs::create_dir_all(&self.dir)?;

        let stamp = Utc::now().timestamp();
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let dest = self.dir.join(export_name(stamp, attempt));
            match OpenOptions::new().write(true).create_new(true).open(&dest) {
                Ok(mut file) => {
                    io::copy(&mut reader, &mut file)?;
                    return Ok(dest);
                },
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    debug!("{} already exists", dest.display());
                },
                Err(err) => return Err(err.into()),
            }
        }

        Err(io::Error::new(io::ErrorKind::AlreadyExists, "no free export file name").into())
    }
}

impl ExportSink for DownloadsSink {
    fn export(&self, source: &Path, _notify: ExportNotify) -> Result<ExportOutcome, ExportError> {
        self.copy(source).map(ExportOutcome::Written)
    }
}

pub struct PickerSink {
    picker: Box<dyn DestinationPicker>,
}

impl PickerSink {
    pub fn new(picker: Box<dyn DestinationPicker>) -> PickerSink {
        PickerSink { picker }
    }
}

impl ExportSink for PickerSink {
    fn export(&self, source: &Path, notify: ExportNotify) -> Result<ExportOutcome, ExportError> {
        let source = source.to_path_buf();
        let reply: PickerReply = Box::new(move |choice| {
            let result = match choice {
                Some(dest) => copy_to(&source, &dest).map(|_| dest),
                None => Err(ExportError::Cancelled),
            };
            notify(result);
        });

        self.picker.request(&export_file_name(), reply)?;
        Ok(ExportOutcome::Pending)
    }
}

/// Export policy: the picker when one is configured, the downloads copy otherwise or
/// when the picker cannot be started.
pub struct Exporter {
    preferred: Option<Sink>,
    fallback: DownloadsSink,
}

impl Exporter {
    pub fn new(downloads_dir: impl Into<PathBuf>) -> Exporter {
        Exporter {
            preferred: None,
            fallback: DownloadsSink::new(downloads_dir),
        }
    }

    pub fn with_preferred(mut self, sink: impl Into<Sink>) -> Exporter {
        self.preferred = Some(sink.into());
        self
    }

    pub fn with_picker(self, picker: Box<dyn DestinationPicker>) -> Exporter {
        self.with_preferred(PickerSink::new(picker))
    }

    pub fn export(&self, source: &Path, notify: ExportNotify) -> Result<ExportOutcome, ExportError> {
        if !source.is_file() {
            warn!("no workbook to export at {}", source.display());
            return Err(ExportError::MissingSource(source.display().to_string()));
        }

        if let Some(sink) = &self.preferred {
            // The callback is consumed by the attempt, so completion of a fallback copy is
            // only reported through the return value.
            match sink.export(source, notify) {
                Err(ExportError::PickerUnavailable(reason)) => {
                    warn!("file picker failed, falling back to downloads, err={}", reason);
                },
                other => return other,
            }
        } else {
            debug!("no preferred export sink");
        }

        let dest = self.fallback.copy(source)?;
        info!("exported to {}", dest.display());
        Ok(ExportOutcome::Written(dest))
    }
}

/// Terminal picker: asks for a destination path on the given input.
pub struct PromptPicker<R, W> {
    input: RefCell<R>,
    output: RefCell<W>,
}

impl<R: BufRead, W: Write> PromptPicker<R, W> {
    pub fn new(input: R, output: W) -> PromptPicker<R, W> {
        PromptPicker {
            input: RefCell::new(input),
            output: RefCell::new(output),
        }
    }
}

impl<R: BufRead, W: Write> DestinationPicker for PromptPicker<R, W> {
    fn request(&self, suggested_name: &str, reply: PickerReply) -> Result<(), ExportError> {
        let prompt = || -> io::Result<String> {
            let mut output = self.output.borrow_mut();
            write!(output, "Save as [{}] (empty to cancel): ", suggested_name)?;
            output.flush()?;
            let mut line = String::new();
            self.input.borrow_mut().read_line(&mut line)?;
            Ok(line.trim().to_string())
        };

        let answer = prompt().map_err(|err| ExportError::PickerUnavailable(err.to_string()))?;
        if answer.is_empty() {
            reply(None);
            return Ok(());
        }

        let mut dest = PathBuf::from(answer);
        if dest.is_dir() {
            dest.push(suggested_name);
        }
        reply(Some(dest));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use anyhow::{bail, Result};
    use pretty_assertions::assert_eq;

    use super::*;

    type Shared<T> = Rc<RefCell<T>>;

    struct DeferredPicker {
        pending: Shared<Option<PickerReply>>,
    }

    impl DestinationPicker for DeferredPicker {
        fn request(&self, _suggested_name: &str, reply: PickerReply) -> Result<(), ExportError> {
            *self.pending.borrow_mut() = Some(reply);
            Ok(())
        }
    }

    struct BrokenPicker;

    impl DestinationPicker for BrokenPicker {
        fn request(&self, _suggested_name: &str, _reply: PickerReply) -> Result<(), ExportError> {
            Err(ExportError::PickerUnavailable("no activity".to_string()))
        }
    }

    fn recorder() -> (Shared<Option<Result<PathBuf, ExportError>>>, ExportNotify) {
        let slot: Shared<Option<Result<PathBuf, ExportError>>> = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&slot);
        (slot, Box::new(move |result| *sink.borrow_mut() = Some(result)))
    }

    fn workbook(dir: &Path) -> Result<PathBuf> {
        let path = dir.join("JOURNAL.xlsm");
        fs::write(&path, b"workbook bytes")?;
        Ok(path)
    }

    #[test]
    fn test_downloads_copy() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let source = workbook(dir.path())?;
        let downloads = dir.path().join("Downloads");
        let (_, notify) = recorder();

        let outcome = Exporter::new(&downloads).export(&source, notify)?;
        let ExportOutcome::Written(dest) = outcome else {
            bail!("expected a finished copy, got {:?}", outcome);
        };

        assert_eq!(dest.parent(), Some(downloads.as_path()));
        let name = dest.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        assert!(name.starts_with("JOURNAL_export_") && name.ends_with(".xlsm"), "name {}", name);
        assert_eq!(fs::read(&dest)?, b"workbook bytes");
        assert_eq!(fs::read(&source)?, b"workbook bytes");

        Ok(())
    }

    #[test]
    fn test_missing_source_creates_nothing() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let downloads = dir.path().join("Downloads");
        let (notified, notify) = recorder();

        match Exporter::new(&downloads).export(&dir.path().join("absent.xlsm"), notify) {
            Err(ExportError::MissingSource(_)) => {},
            other => bail!("expected missing source, got {:?}", other),
        }

        assert!(!downloads.exists());
        assert!(notified.borrow().is_none());

        Ok(())
    }

    #[test]
    fn test_picker_completes_later() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let source = workbook(dir.path())?;
        let pending = Rc::new(RefCell::new(None));
        let exporter = Exporter::new(dir.path().join("Downloads")).with_picker(Box::new(DeferredPicker {
            pending: Rc::clone(&pending),
        }));
        let (notified, notify) = recorder();

        assert_eq!(exporter.export(&source, notify)?, ExportOutcome::Pending);
        assert!(notified.borrow().is_none());

        let chosen = dir.path().join("chosen.xlsm");
        let Some(reply) = pending.borrow_mut().take() else {
            bail!("picker was not asked for a destination");
        };
        reply(Some(chosen.clone()));

        match notified.borrow_mut().take() {
            Some(Ok(dest)) => assert_eq!(dest, chosen),
            other => bail!("expected completed export, got {:?}", other),
        }
        assert_eq!(fs::read(&chosen)?, b"workbook bytes");
        assert!(!dir.path().join("Downloads").exists());

        Ok(())
    }

    #[test]
    fn test_picker_rejected() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let source = workbook(dir.path())?;
        let pending = Rc::new(RefCell::new(None));
        let exporter = Exporter::new(dir.path().join("Downloads")).with_picker(Box::new(DeferredPicker {
            pending: Rc::clone(&pending),
        }));
        let (notified, notify) = recorder();

        exporter.export(&source, notify)?;
        if let Some(reply) = pending.borrow_mut().take() {
            reply(None);
        }

        match notified.borrow_mut().take() {
            Some(Err(ExportError::Cancelled)) => {},
            other => bail!("expected cancellation, got {:?}", other),
        }

        Ok(())
    }

    #[test]
    fn test_broken_picker_falls_back() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let source = workbook(dir.path())?;
        let downloads = dir.path().join("Downloads");
        let exporter = Exporter::new(&downloads).with_picker(Box::new(BrokenPicker));
        let (_, notify) = recorder();

        match exporter.export(&source, notify)? {
            ExportOutcome::Written(dest) => assert_eq!(fs::read(dest)?, b"workbook bytes"),
            ExportOutcome::Pending => bail!("fallback copy should finish immediately"),
        }

        Ok(())
    }

    #[test]
    fn test_preferred_directory() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let source = workbook(dir.path())?;
        let backups = dir.path().join("backups");
        let exporter = Exporter::new(dir.path().join("Downloads")).with_preferred(DownloadsSink::new(&backups));
        let (_, notify) = recorder();

        match exporter.export(&source, notify)? {
            ExportOutcome::Written(dest) => assert_eq!(dest.parent(), Some(backups.as_path())),
            ExportOutcome::Pending => bail!("directory copy should finish immediately"),
        }
        assert!(!dir.path().join("Downloads").exists());

        Ok(())
    }

    #[test]
    fn test_picker_refuses_working_copy() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let source = workbook(dir.path())?;
        let answer = format!("{}\n", source.display());
        let exporter = Exporter::new(dir.path().join("Downloads"))
            .with_picker(Box::new(PromptPicker::new(io::Cursor::new(answer.into_bytes()), Vec::new())));
        let (notified, notify) = recorder();

        assert_eq!(exporter.export(&source, notify)?, ExportOutcome::Pending);
        match notified.borrow_mut().take() {
            Some(Err(ExportError::SameAsSource(_))) => {},
            other => bail!("expected refusal to overwrite the working copy, got {:?}", other),
        }
        assert_eq!(fs::read(&source)?, b"workbook bytes");

        Ok(())
    }

    #[test]
    fn test_downloads_keeps_earlier_exports() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let source = workbook(dir.path())?;
        let sink = DownloadsSink::new(dir.path().join("Downloads"));

        let first = sink.copy(&source)?;
        fs::write(&source, b"newer bytes")?;
        let second = sink.copy(&source)?;

        assert!(first != second, "second export reused {}", first.display());
        assert_eq!(fs::read(&first)?, b"workbook bytes");
        assert_eq!(fs::read(&second)?, b"newer bytes");

        Ok(())
    }

    #[test]
    fn test_export_name_suffix() {
        assert_eq!(export_name(1700000000, 0), "JOURNAL_export_1700000000.xlsm");
        assert_eq!(export_name(1700000000, 2), "JOURNAL_export_1700000000_2.xlsm");
    }

    #[test]
    fn test_prompt_picker() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let source = workbook(dir.path())?;
        let answer = format!("{}\n", dir.path().display());
        let exporter = Exporter::new(dir.path().join("Downloads"))
            .with_picker(Box::new(PromptPicker::new(io::Cursor::new(answer.into_bytes()), Vec::new())));
        let (notified, notify) = recorder();

        assert_eq!(exporter.export(&source, notify)?, ExportOutcome::Pending);
        match notified.borrow_mut().take() {
            Some(Ok(dest)) => {
                assert_eq!(dest.parent(), Some(dir.path()));
                assert_eq!(fs::read(dest)?, b"workbook bytes");
            },
            other => bail!("expected export into the chosen directory, got {:?}", other),
        }

        Ok(())
    }
}
