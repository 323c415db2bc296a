//! Rendering command results on stdout.

use std::io::Write;

use anyhow::Result;
use clap::ValueEnum;
use crossterm::style::Stylize as _;
use lambroll_core::diff::{DiffLine, DiffResult};
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Indented JSON
    Json,
    /// Tab separated values, one record per line
    Tsv,
    #[default]
    Table,
}

/// Write `records` as JSON, or as rows built by `row` for the other formats.
pub(crate) fn write_records<T, R>(
    out: &mut impl Write,
    records: &[T],
    format: OutputFormat,
    row: impl Fn(&T) -> R,
) -> Result<()>
where
    T: Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, records)?;
            writeln!(out)?;
        }
        OutputFormat::Tsv => {
            for record in records {
                let fields: Vec<String> = row(record)
                    .fields()
                    .into_iter()
                    .map(|f| f.into_owned())
                    .collect();
                writeln!(out, "{}", fields.join("\t"))?;
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new(records.iter().map(row));
            table.with(Style::rounded());
            writeln!(out, "{}", table)?;
        }
    }
    Ok(())
}

pub(crate) fn write_json<T: Serialize + ?Sized>(out: &mut impl Write, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

fn styled(line: &DiffLine) -> String {
    let text = line.to_string();
    match line {
        DiffLine::From(_) | DiffLine::To(_) => text.bold().to_string(),
        DiffLine::Hunk(_) => text.cyan().to_string(),
        DiffLine::Removed(_) => text.red().to_string(),
        DiffLine::Added(_) => text.green().to_string(),
    }
}

pub(crate) fn write_diff(out: &mut impl Write, diff: &DiffResult, color: bool) -> Result<()> {
    for line in diff.lines() {
        if color {
            writeln!(out, "{}", styled(&line))?;
        } else {
            writeln!(out, "{}", line)?;
        }
    }
    Ok(())
}
