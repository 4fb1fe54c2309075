use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use log::{error, info};

use trade_journal::dashboard;
use trade_journal::export::{DownloadsSink, ExportError, ExportNotify, ExportOutcome, Exporter, PromptPicker};
use trade_journal::journal::form::{EntryForm, SubmitError};
use trade_journal::journal::schema::QuickFill;
use trade_journal::settings::{resolve_settings, Session};

const USAGE: &str = "Usage: journal [--settings <file>] <init|headers|add [HEADER=VALUE ...]|export [--pick|--to <dir>]|view [--csv]>";

fn main() -> Result<()> {
    env_logger::init();

    let mut args: Vec<String> = env::args().skip(1).collect();
    let settings_path = take_option(&mut args, "--settings")?.map(PathBuf::from);

    let Some(command) = (!args.is_empty()).then(|| args.remove(0)) else {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    };

    let settings = resolve_settings(settings_path.as_deref())?;
    let session = Session::provision(settings);

    match command.as_str() {
        "init" => {
            println!("{}", session.workbook_path().display());
            Ok(())
        },
        "headers" => list_headers(&session),
        "add" => add_entry(&session, &args),
        "export" => export(&session, &mut args),
        "view" => view(&session, &args),
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(1);
        },
    }
}

fn take_option(args: &mut Vec<String>, name: &str) -> Result<Option<String>> {
    let Some(idx) = args.iter().position(|arg| arg == name) else {
        return Ok(None);
    };
    if idx + 1 >= args.len() {
        bail!("{} needs a value", name);
    }
    let value = args.remove(idx + 1);
    args.remove(idx);
    Ok(Some(value))
}

fn open_form(session: &Session) -> EntryForm {
    match session.store().load_headers() {
        Some(headers) if !headers.is_empty() => EntryForm::new(headers),
        _ => {
            eprintln!("Could not read headers from {}", session.workbook_path().display());
            std::process::exit(1);
        },
    }
}

fn list_headers(session: &Session) -> Result<()> {
    let form = open_form(session);
    for field in form.fields() {
        println!("{}\t{}", field.header(), field.kind());
    }
    Ok(())
}

fn add_entry(session: &Session, args: &[String]) -> Result<()> {
    let mut form = open_form(session);
    let store = session.store();

    if !args.is_empty() {
        for arg in args {
            let (header, value) = arg
                .split_once('=')
                .with_context(|| format!("expected HEADER=VALUE, got {}", arg))?;
            apply_input(&mut form, header, value)?;
        }
        return match form.submit(&store) {
            Ok(_) => {
                println!("Saved to {}", store.path().display());
                Ok(())
            },
            Err(err) => {
                report_submit_error(&err);
                std::process::exit(1);
            },
        };
    }

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();
    loop {
        if !prompt_fields(&mut form, &mut input, &mut output)? {
            println!("Entry discarded");
            return Ok(());
        }

        match form.submit(&store) {
            Ok(_) => {
                println!("Entry saved successfully to {}", store.path().display());
                return Ok(());
            },
            Err(err) => {
                report_submit_error(&err);
                println!("Press Enter to keep a value, '-' to clear it.");
            },
        }
    }
}

fn report_submit_error(err: &SubmitError) {
    match err {
        SubmitError::Invalid(errors) => {
            eprintln!("Validation error:");
            for message in errors.messages() {
                eprintln!("  {}", message);
            }
        },
        SubmitError::Store(err) => {
            error!("save failed, err={}", err);
            eprintln!("{}", err);
        },
    }
}

/// `today` / `now` trigger the quick fill on date and time fields.
fn apply_input(form: &mut EntryForm, header: &str, value: &str) -> Result<()> {
    let fill = form
        .fields()
        .iter()
        .find(|field| field.header().eq_ignore_ascii_case(header.trim()))
        .and_then(|field| field.kind().quick_fill());

    match (fill, value.trim().to_ascii_lowercase().as_str()) {
        (Some(QuickFill::Today), "today") => form.fill_today(header)?,
        (Some(QuickFill::Now), "now") => form.fill_now(header)?,
        _ => form.set_value(header, value)?,
    }

    Ok(())
}

/// Walks every field once. Returns false when input ends before the last field.
fn prompt_fields<R: BufRead, W: Write>(form: &mut EntryForm, input: &mut R, output: &mut W) -> Result<bool> {
    let headers: Vec<String> = form.fields().iter().map(|field| field.header().clone()).collect();

    for (idx, header) in headers.iter().enumerate() {
        loop {
            let field = &form.fields()[idx];
            let hint = match field.kind().quick_fill() {
                Some(QuickFill::Today) => " ('today')",
                Some(QuickFill::Now) => " ('now')",
                None => "",
            };
            write!(output, "{} <{}>{} [{}]: ", header, field.kind(), hint, field.value())?;
            output.flush()?;

            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                return Ok(false);
            }

            let answer = line.trim_end_matches(|c: char| c == '\r' || c == '\n');
            let result = match answer.trim() {
                "" => break,
                "-" => form.set_value(header, "").map_err(anyhow::Error::from),
                _ => apply_input(form, header, answer),
            };

            match result {
                Ok(()) => {
                    if let Some(pnl) = form.value("P&L").filter(|pnl| !pnl.is_empty()) {
                        writeln!(output, "  P&L: {}", pnl)?;
                    }
                    break;
                },
                Err(err) => writeln!(output, "  {}", err)?,
            }
        }
    }

    Ok(true)
}

fn export(session: &Session, args: &mut Vec<String>) -> Result<()> {
    let settings = session.settings();
    let to = take_option(args, "--to")?;
    let pick = args.iter().any(|arg| arg == "--pick") || (settings.use_picker && to.is_none());

    let mut exporter = Exporter::new(&settings.downloads_dir);
    if let Some(dir) = to {
        exporter = exporter.with_preferred(DownloadsSink::new(dir));
    } else if pick {
        exporter = exporter.with_picker(Box::new(PromptPicker::new(io::stdin().lock(), io::stdout())));
    }

    let notify: ExportNotify = Box::new(|result: Result<PathBuf, ExportError>| match result {
        Ok(dest) => {
            info!("exported to {}", dest.display());
            println!("Exported to {}", dest.display());
        },
        Err(err) => {
            error!("export failed, err={}", err);
            eprintln!("{}", err);
        },
    });

    match exporter.export(session.workbook_path(), notify) {
        Ok(ExportOutcome::Written(dest)) => println!("Exported to {}", dest.display()),
        Ok(ExportOutcome::Pending) => {},
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(1);
        },
    }

    Ok(())
}

fn view(session: &Session, args: &[String]) -> Result<()> {
    let table = match dashboard::load_table(session.workbook_path(), &session.settings().sheet_name) {
        Ok(table) => table,
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(1);
        },
    };

    if args.iter().any(|arg| arg == "--csv") {
        table.write_csv(io::stdout())?;
    } else {
        println!("Your Trade History");
        println!("{}", table.render_text());
    }

    Ok(())
}
