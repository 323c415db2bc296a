use std::io::Write;

use anyhow::{Context, Result};
use lambroll_core::remote::FunctionConfiguration;
use lambroll_remote::pagination::collect_all;
use tabled::Tabled;

use crate::application::App;
use crate::output::{write_records, OutputFormat};

#[derive(clap::Parser, Debug, Clone)]
pub(crate) struct Args {
    #[arg(long, value_enum, default_value_t)]
    output: OutputFormat,
}

#[derive(Tabled)]
struct FunctionRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Runtime")]
    runtime: String,
    #[tabled(rename = "Memory")]
    memory_size: String,
    #[tabled(rename = "Last Modified")]
    last_modified: String,
}

impl From<&FunctionConfiguration> for FunctionRow {
    fn from(c: &FunctionConfiguration) -> Self {
        FunctionRow {
            name: c.function_name.clone(),
            runtime: c.runtime.clone().unwrap_or_default(),
            memory_size: c.memory_size.map(|m| m.to_string()).unwrap_or_default(),
            last_modified: c.last_modified.clone().unwrap_or_default(),
        }
    }
}

/// Run the `list` command.
pub(crate) async fn list(app: &App, args: &Args, out: &mut impl Write) -> Result<()> {
    let functions = collect_all(|marker| app.service.list_functions(marker))
        .await
        .context("listing functions")?;
    write_records(out, &functions, args.output, |c| FunctionRow::from(c))
}
