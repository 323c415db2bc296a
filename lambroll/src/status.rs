use std::io::Write;

use anyhow::{Context, Result};
use lambroll_core::remote::RemoteFunction;
use serde::Serialize;
use tabled::Tabled;

use crate::application::App;
use crate::output::{write_json, write_records, OutputFormat};

#[derive(clap::Parser, Debug, Clone)]
pub(crate) struct Args {
    #[arg(long, value_enum, default_value_t)]
    output: OutputFormat,
}

#[derive(Serialize, Tabled)]
struct Field {
    #[tabled(rename = "Field")]
    name: String,
    #[tabled(rename = "Value")]
    value: String,
}

fn field(name: &str, value: impl ToString) -> Field {
    Field {
        name: name.to_string(),
        value: value.to_string(),
    }
}

fn summary(function: &RemoteFunction) -> Vec<Field> {
    let c = &function.configuration;
    let mut fields = vec![
        field("FunctionName", &c.function_name),
        field("FunctionArn", c.function_arn.as_deref().unwrap_or_default()),
        field("Version", c.version.as_deref().unwrap_or_default()),
        field("PackageType", function.backing_type()),
        field("Runtime", c.runtime.as_deref().unwrap_or_default()),
        field("Handler", c.handler.as_deref().unwrap_or_default()),
        field("Role", c.role.as_deref().unwrap_or_default()),
        field("Architectures", c.architectures.join(",")),
        field("MemorySize", c.memory_size.unwrap_or_default()),
        field("Timeout", c.timeout.unwrap_or_default()),
        field("CodeSize", c.code_size),
        field("CodeSha256", c.code_sha256.as_deref().unwrap_or_default()),
        field("LastModified", c.last_modified.as_deref().unwrap_or_default()),
        field("State", c.state.as_deref().unwrap_or_default()),
        field(
            "LastUpdateStatus",
            c.last_update_status.as_deref().unwrap_or_default(),
        ),
    ];
    if let Some(uri) = function.image_uri() {
        fields.push(field("ImageUri", uri));
    }
    for (key, value) in &function.tags {
        fields.push(field(&format!("Tags.{}", key), value));
    }
    fields
}

/// Run the `status` command.
pub(crate) async fn status(app: &App, args: &Args, out: &mut impl Write) -> Result<()> {
    let (_, definition) = app.load_function()?;
    let name = definition.function_name.as_str();
    let function = app
        .service
        .get_function(name)
        .await
        .with_context(|| format!("getting function {}", name))?;
    match args.output {
        OutputFormat::Json => write_json(out, &function),
        format => write_records(out, &summary(&function), format, |f| Field {
            name: f.name.clone(),
            value: f.value.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{hello_definition, zip, FakeService, Workspace};

    #[tokio::test]
    async fn shows_configuration_and_tags() {
        let mut def = hello_definition();
        def.tags = Some([("team".to_string(), "a".to_string())].into_iter().collect());
        let service = FakeService::with_function(def, &zip("v1"));
        let ws = Workspace::new(&hello_definition(), &zip("v1"));
        let app = ws.app(service);

        let mut out = Vec::new();
        status(
            &app,
            &Args {
                output: OutputFormat::Tsv,
            },
            &mut out,
        )
        .await
        .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("MemorySize\t128\n"), "{}", text);
        assert!(text.contains("PackageType\tZip\n"), "{}", text);
        assert!(text.contains("Tags.team\ta\n"), "{}", text);

        let mut out = Vec::new();
        status(
            &app,
            &Args {
                output: OutputFormat::Json,
            },
            &mut out,
        )
        .await
        .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["Configuration"]["FunctionName"], "hello");
        assert_eq!(value["Tags"]["team"], "a");
    }
}
