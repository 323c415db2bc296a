use std::io::Write;

use anyhow::Result;
use lambroll_core::normalize::normalize;

use crate::application::App;
use crate::output::write_json;

#[derive(clap::Parser, Debug, Clone)]
pub(crate) struct Args {
    /// Fill in the values the service would default
    #[arg(long)]
    normalized: bool,
}

/// Run the `render` command: print the definition after templating.
pub(crate) fn render(app: &App, args: &Args, out: &mut impl Write) -> Result<()> {
    let (_, definition) = app.load_definition()?;
    if args.normalized {
        write_json(out, &normalize(definition))
    } else {
        write_json(out, &definition)
    }
}
