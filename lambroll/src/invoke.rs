use std::io::{Read, Write};

use anyhow::{bail, Context, Result};
use lambroll_core::Error;
use lambroll_remote::Invocation;
use tracing::info;

use crate::application::App;

#[derive(clap::Parser, Debug, Clone, Default)]
pub(crate) struct Args {
    /// JSON payload; read from standard input when absent
    #[arg(long)]
    payload: Option<String>,

    /// Version or alias to invoke
    #[arg(long)]
    qualifier: Option<String>,

    /// Queue the event instead of waiting for the result
    #[arg(long = "async")]
    asynchronous: bool,
}

fn read_payload(args: &Args, input: &mut impl Read) -> Result<Vec<u8>> {
    let payload = match &args.payload {
        Some(payload) => payload.clone().into_bytes(),
        None => {
            let mut buffer = Vec::new();
            input
                .read_to_end(&mut buffer)
                .context("reading payload from standard input")?;
            buffer
        }
    };
    if payload.iter().all(u8::is_ascii_whitespace) {
        return Ok(b"{}".to_vec());
    }
    serde_json::from_slice::<serde_json::Value>(&payload)
        .map_err(|e| Error::Usage(format!("payload is not valid JSON: {}", e)))?;
    Ok(payload)
}

/// Run the `invoke` command, writing the response payload to `out`.
pub(crate) async fn invoke(
    app: &App,
    args: &Args,
    input: &mut impl Read,
    out: &mut impl Write,
) -> Result<()> {
    let payload = read_payload(args, input)?;
    let (_, definition) = app.load_function()?;
    let invocation = Invocation {
        function_name: definition.function_name.clone(),
        qualifier: args.qualifier.clone(),
        payload,
        asynchronous: args.asynchronous,
    };
    let result = app
        .service
        .invoke(&invocation)
        .await
        .with_context(|| format!("invoking {}", invocation.function_name))?;
    info!(
        "status code {}, executed version {}",
        result.status_code,
        result.executed_version.as_deref().unwrap_or("-")
    );
    if !result.payload.is_empty() {
        out.write_all(&result.payload)?;
        writeln!(out)?;
    }
    if let Some(function_error) = result.function_error {
        bail!(
            "{} failed with a function error: {}",
            invocation.function_name,
            function_error
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{hello_definition, zip, FakeService, Workspace};

    async fn run(args: &Args, stdin: &str) -> (Result<()>, String, Vec<String>) {
        let service = FakeService::with_function(hello_definition(), &zip("v1"));
        let ws = Workspace::new(&hello_definition(), &zip("v1"));
        let app = ws.app(service.clone());
        let mut out = Vec::new();
        let result = invoke(&app, args, &mut stdin.as_bytes(), &mut out).await;
        (result, String::from_utf8(out).unwrap(), service.calls())
    }

    #[tokio::test]
    async fn payload_from_flag() {
        let args = Args {
            payload: Some(r#"{"hello":"world"}"#.to_string()),
            ..Default::default()
        };
        let (result, out, calls) = run(&args, "ignored").await;
        result.unwrap();
        assert_eq!(out, "{\"hello\":\"world\"}\n");
        assert_eq!(calls, vec!["Invoke hello"]);
    }

    #[tokio::test]
    async fn payload_from_stdin() {
        let (result, out, _) = run(&Args::default(), "[1, 2]").await;
        result.unwrap();
        assert_eq!(out, "[1, 2]\n");

        let (result, out, _) = run(&Args::default(), "\n").await;
        result.unwrap();
        assert_eq!(out, "{}\n");
    }

    #[tokio::test]
    async fn asynchronous_invocation_has_no_output() {
        let args = Args {
            asynchronous: true,
            ..Default::default()
        };
        let (result, out, _) = run(&args, "{}").await;
        result.unwrap();
        assert_eq!(out, "");
    }

    #[tokio::test]
    async fn invalid_payload_is_rejected_before_invoking() {
        let (result, _, calls) = run(&Args::default(), "{not json").await;
        assert!(matches!(
            result.unwrap_err().downcast_ref::<Error>(),
            Some(Error::Usage(_))
        ));
        assert!(calls.is_empty());
    }
}
