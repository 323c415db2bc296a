mod application;
mod archive;
mod delete;
mod deploy;
mod diff;
mod init;
mod interrupt;
mod invoke;
mod list;
mod loader;
mod logging;
mod options;
mod output;
mod providers;
mod render;
mod rollback;
mod status;
mod template;
#[cfg(test)]
mod testing;
mod versions;

use anyhow::{Context, Result};
use application::{handle_result, App};
use clap::{CommandFactory as _, Parser, Subcommand};
use interrupt::set_up_process_interrupt_handler;
use options::{load_defaults, load_envfiles, OptionSources, Options};

fn main() {
    let args = Args::parse();
    handle_result(run_args(args));
}

fn run_args(args: Args) -> Result<()> {
    if run_standalone(&args.command)? {
        return Ok(());
    }
    let (args, sources) = load_option_sources(args)?;
    logging::set_up(logging::Options {
        level: args.options.log_level(),
        color: args.options.use_color(),
    })?;
    sources.log();
    let interrupt_state = set_up_process_interrupt_handler()?;
    let rt = application::runtime()?;
    rt.block_on(async {
        let app = App::new(&args.options, interrupt_state).await?;
        run_command(&app, &args.command).await
    })
}

/// Commands that need neither the options files nor the remote service.
fn run_standalone(command: &Commands) -> Result<bool> {
    match command {
        Commands::GenerateMan => {
            let cmd = Args::command();
            let man = clap_mangen::Man::new(cmd);
            let mut buffer: Vec<u8> = Default::default();
            man.render(&mut buffer)?;
            println!("{}", String::from_utf8(buffer)?);
        }
        Commands::GenerateMarkdown => {
            let opts = clap_markdown::MarkdownOptions::new().show_footer(false);
            let markdown: String = clap_markdown::help_markdown_custom::<Args>(&opts);
            println!("{}", markdown);
        }
        Commands::GenerateCompletion { shell } => {
            let mut cmd = Args::command();
            clap_complete::generate(*shell, &mut cmd, "lambroll", &mut std::io::stdout());
        }
        Commands::Version => {
            println!("lambroll {}", env!("CARGO_PKG_VERSION"));
        }
        _ => return Ok(false),
    }
    Ok(true)
}

/// Apply `lambroll.json` and the env files beneath the command line.
///
/// Env files may set variables that back options, so the command line is
/// parsed again once they are loaded. Logging is not set up yet; the
/// returned sources are reported once it is.
fn load_option_sources(args: Args) -> Result<(Args, OptionSources)> {
    let cwd = std::env::current_dir().context("determining the working directory")?;
    let defaults = load_defaults(&cwd)?;
    let envfiles: Vec<_> = defaults
        .envfile
        .iter()
        .chain(args.options.envfile.iter())
        .cloned()
        .collect();
    let mut args = if envfiles.is_empty() {
        args
    } else {
        load_envfiles(&envfiles)?;
        Args::parse()
    };
    let sources = OptionSources {
        defaults: defaults.source.clone(),
        envfiles,
    };
    args.options.merge_defaults(defaults);
    Ok((args, sources))
}

async fn run_command(app: &App, command: &Commands) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    match command {
        Commands::Init(args) => init::init(app, args).await,
        Commands::List(args) => list::list(app, args, &mut stdout).await,
        Commands::Deploy(args) => {
            let outcome = deploy::deploy(app, args).await?;
            tracing::debug!(?outcome, "deploy finished");
            Ok(())
        }
        Commands::Invoke(args) => {
            invoke::invoke(app, args, &mut std::io::stdin().lock(), &mut stdout).await
        }
        Commands::Versions(args) => versions::versions(app, args, &mut stdout).await,
        Commands::Rollback(args) => {
            let version = rollback::rollback(app, args).await?;
            tracing::debug!(version = %version, "rollback finished");
            Ok(())
        }
        Commands::Render(args) => render::render(app, args, &mut stdout),
        Commands::Diff(args) => {
            let differs = diff::diff(app, args, &mut stdout).await?;
            tracing::debug!(differs, "diff finished");
            Ok(())
        }
        Commands::Delete(args) => delete::delete(app, args).await,
        Commands::Status(args) => status::status(app, args, &mut stdout).await,
        Commands::Version
        | Commands::GenerateMarkdown
        | Commands::GenerateMan
        | Commands::GenerateCompletion { .. } => Ok(()),
    }
}

/// lambroll: deploy an AWS Lambda function from a definition file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    options: Options,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write the definition of a deployed function to the function file
    Init(init::Args),

    /// List the functions in the account
    List(list::Args),

    /// Create or update the function so that it matches its definition
    Deploy(deploy::Args),

    /// Invoke the function
    Invoke(invoke::Args),

    /// List published versions, optionally deleting old ones
    Versions(versions::Args),

    /// Point the alias back at an earlier version
    Rollback(rollback::Args),

    /// Print the function definition after templating
    Render(render::Args),

    /// Show how the deployed function differs from its definition
    Diff(diff::Args),

    /// Delete the function
    Delete(delete::Args),

    /// Show the deployed state of the function
    Status(status::Args),

    /// Print the version of lambroll
    Version,

    /// Generate markdown documentation for lambroll
    #[command(hide = true)]
    GenerateMarkdown,

    /// Generate a manpage for lambroll
    #[command(hide = true)]
    GenerateMan,

    /// Generate shell completion for lambroll
    #[command(hide = true)]
    GenerateCompletion {
        /// The shell to generate completion for
        #[arg(long)]
        shell: clap_complete::Shell,
    },
}
