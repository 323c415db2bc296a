use anyhow::{Context, Result};
use lambroll_core::Error;

use crate::application::App;

#[derive(clap::Parser, Debug, Clone)]
pub(crate) struct Args {
    /// Name of the deployed function to mirror
    #[arg(long)]
    function_name: String,

    /// Overwrite an existing definition file
    #[arg(long)]
    force: bool,
}

/// Run the `init` command: write the definition of a deployed function.
pub(crate) async fn init(app: &App, args: &Args) -> Result<()> {
    let path = app.function_file_or_default();
    if path.exists() && !args.force {
        return Err(Error::Usage(format!(
            "{} already exists; use --force to overwrite it",
            path.display()
        ))
        .into());
    }
    let function = app
        .service
        .get_function(&args.function_name)
        .await
        .with_context(|| format!("getting function {}", args.function_name))?;
    let definition = function.to_definition();
    let mut json = serde_json::to_string_pretty(&definition)?;
    json.push('\n');
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    tracing::info!("wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use lambroll_core::definition::ResourceDefinition;

    use super::*;
    use crate::testing::{hello_definition, zip, FakeService, Workspace};

    #[tokio::test]
    async fn mirrors_remote_function() {
        let mut deployed = hello_definition();
        deployed.memory_size = Some(512);
        let service = FakeService::with_function(deployed, &zip("v1"));
        let ws = Workspace::new(&hello_definition(), &zip("v1"));
        std::fs::remove_file(ws.path("function.json")).unwrap();
        let app = ws.app(service);
        let args = Args {
            function_name: "hello".to_string(),
            force: false,
        };
        init(&app, &args).await.unwrap();

        let written: ResourceDefinition =
            serde_json::from_str(&std::fs::read_to_string(ws.path("function.json")).unwrap())
                .unwrap();
        assert_eq!(written.function_name, "hello");
        assert_eq!(written.memory_size, Some(512));

        let err = init(&app, &args).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Usage(_))));
        init(
            &app,
            &Args {
                force: true,
                ..args
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn unknown_function_is_an_error() {
        let ws = Workspace::new(&hello_definition(), &zip("v1"));
        std::fs::remove_file(ws.path("function.json")).unwrap();
        let app = ws.app(FakeService::new());
        let args = Args {
            function_name: "missing".to_string(),
            force: false,
        };
        let err = init(&app, &args).await.unwrap_err();
        assert!(lambroll_core::error::is_not_found(&err));
        assert!(!ws.dir().join("function.json").exists());
    }
}
