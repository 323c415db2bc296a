use anyhow::Result;
use lambroll_core::error::is_not_found;

use crate::application::App;

#[derive(clap::Parser, Debug, Clone)]
pub(crate) struct Args {
    /// Show what would be done without changing anything
    #[arg(long)]
    dry_run: bool,
}

/// Run the `delete` command. A function that is already gone counts as
/// deleted.
pub(crate) async fn delete(app: &App, args: &Args) -> Result<()> {
    let (_, definition) = app.load_function()?;
    let name = definition.function_name.as_str();
    if args.dry_run {
        tracing::info!("would delete function {}", name);
        return Ok(());
    }
    match app.service.delete_function(name, None).await {
        Ok(()) => {
            tracing::info!("deleted function {}", name);
            Ok(())
        }
        Err(e) if is_not_found(&e) => {
            tracing::info!("function {} does not exist", name);
            Ok(())
        }
        Err(e) => Err(e.context(format!("deleting function {}", name))),
    }
}
