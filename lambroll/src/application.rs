use std::path::{Path, PathBuf};
use std::process::exit;
use std::sync::Arc;

use anyhow::{Context, Result};
use lambroll_core::definition::ResourceDefinition;
use lambroll_core::normalize::{normalize, NormalizedDefinition};
use lambroll_remote::lambda::LambdaService;
use lambroll_remote::FunctionService;

use crate::interrupt::InterruptState;
use crate::loader::{load_definition_file, DEFAULT_FUNCTION_FILENAMES};
use crate::options::Options;
use crate::template::TemplateContext;

/// Create the single-threaded tokio runtime used by the CLI.
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("initializing tokio runtime")
}

/// Handle a Result, printing the error and exiting with code 1 on failure.
pub fn handle_result(r: Result<()>) {
    match r {
        Ok(()) => {}
        Err(e) => {
            eprintln!("lambroll error: {:#}", e);
            exit(1);
        }
    }
}

/// Everything a command needs: the remote service, how to load the
/// definition, and whether to stop.
pub(crate) struct App {
    pub service: Arc<dyn FunctionService>,
    pub template: TemplateContext,
    pub interrupt: InterruptState,
    pub function_file: Option<PathBuf>,
    pub color: bool,
}

impl App {
    pub async fn new(options: &Options, interrupt: InterruptState) -> Result<App> {
        let template = options.template_context()?;
        let service = LambdaService::connect(&options.connect_options(), interrupt.token()).await;
        Ok(App {
            service: Arc::new(service),
            template,
            interrupt,
            function_file: options.function.clone(),
            color: options.use_color(),
        })
    }

    /// Load the function definition as written, templates rendered.
    pub fn load_definition(&self) -> Result<(PathBuf, ResourceDefinition)> {
        load_definition_file(
            "function",
            Some(&self.template),
            self.function_file.as_deref(),
            DEFAULT_FUNCTION_FILENAMES,
        )
    }

    pub fn load_function(&self) -> Result<(PathBuf, NormalizedDefinition)> {
        let (path, definition) = self.load_definition()?;
        Ok((path, normalize(definition)))
    }

    /// Where `init` writes the definition.
    pub fn function_file_or_default(&self) -> &Path {
        self.function_file
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_FUNCTION_FILENAMES[0]))
    }

    #[cfg(test)]
    pub fn with_service(service: Arc<dyn FunctionService>, function_file: Option<PathBuf>) -> App {
        App {
            service,
            template: TemplateContext::default(),
            interrupt: InterruptState::new(),
            function_file,
            color: false,
        }
    }
}
