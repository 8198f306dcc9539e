//! Rendering of command results to stdout.

mod table;

use std::io::Write;

use serde::Serialize;
use serde_json::Value;

use crate::cli::OutputFormat;
use crate::error::CliError;
use crate::metadata::Metadata;

pub use table::Table;

/// Document printed for `--format json`.
#[derive(Debug, Serialize)]
pub struct Envelope<'a> {
    pub meta: &'a Metadata,
    pub data: &'a Value,
}

pub fn render(
    meta: &Metadata,
    data: &Value,
    table: &Table,
    format: OutputFormat,
    pretty: bool,
) -> Result<(), CliError> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match format {
        OutputFormat::Json => {
            let envelope = Envelope { meta, data };
            if pretty {
                serde_json::to_writer_pretty(&mut out, &envelope)?;
            } else {
                serde_json::to_writer(&mut out, &envelope)?;
            }
            writeln!(out)?;
        }
        OutputFormat::Table => {
            write!(out, "{}", table.render())?;
            for warning in &meta.warnings {
                writeln!(out, "warning: {warning}")?;
            }
        }
    }
    Ok(())
}
