//! Look up values in a local Terraform state file (format version 4).
//!
//! Addresses follow Terraform's syntax:
//!
//! ```text
//! aws_iam_role.lambda.arn
//! data.aws_caller_identity.current.account_id
//! module.network.aws_subnet.private[0].id
//! aws_ssm_parameter.config["db"].value
//! output.bucket_name
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde_json::Value;

use super::ValueProvider;

#[derive(Debug, Clone, PartialEq)]
enum Index {
    Number(u64),
    Key(String),
}

impl Index {
    fn matches(&self, key: &Value) -> bool {
        match (self, key) {
            (Index::Number(n), Value::Number(k)) => k.as_u64() == Some(*n),
            (Index::Key(s), Value::String(k)) => s == k,
            _ => false,
        }
    }
}

/// One dotted segment of an address, with an optional `[index]` suffix.
#[derive(Debug, Clone, PartialEq)]
struct Segment {
    name: String,
    index: Option<Index>,
}

fn split_address(address: &str) -> Result<Vec<Segment>> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_brackets = false;
    let mut in_quotes = false;
    for c in address.chars() {
        match c {
            '"' if in_brackets => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            '[' if !in_quotes => {
                in_brackets = true;
                current.push(c);
            }
            ']' if !in_quotes => {
                in_brackets = false;
                current.push(c);
            }
            '.' if !in_brackets => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    if in_brackets || in_quotes {
        bail!("unbalanced brackets in address {:?}", address);
    }
    parts.push(current);
    parts.iter().map(|p| parse_segment(p, address)).collect()
}

fn parse_segment(part: &str, address: &str) -> Result<Segment> {
    if part.is_empty() {
        bail!("empty segment in address {:?}", address);
    }
    let Some(open) = part.find('[') else {
        return Ok(Segment {
            name: part.to_string(),
            index: None,
        });
    };
    let name = &part[..open];
    let inner = part[open + 1..]
        .strip_suffix(']')
        .with_context(|| format!("malformed index in address {:?}", address))?;
    let index = if let Some(key) = inner.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        Index::Key(key.to_string())
    } else {
        Index::Number(
            inner
                .parse()
                .with_context(|| format!("malformed index in address {:?}", address))?,
        )
    };
    Ok(Segment {
        name: name.to_string(),
        index: Some(index),
    })
}

fn not_found(address: &str) -> String {
    format!("{} is not found in tfstate", address)
}

fn index_into<'a>(value: &'a Value, index: &Index, address: &str) -> Result<&'a Value> {
    let found = match index {
        Index::Number(n) => value.get(*n as usize),
        Index::Key(k) => value.get(k),
    };
    found.with_context(|| not_found(address))
}

fn navigate<'a>(mut value: &'a Value, path: &[Segment], address: &str) -> Result<&'a Value> {
    for segment in path {
        value = value
            .get(&segment.name)
            .with_context(|| not_found(address))?;
        if let Some(index) = &segment.index {
            value = index_into(value, index, address)?;
        }
    }
    Ok(value)
}

fn segment_text(segment: &Segment) -> String {
    match &segment.index {
        None => segment.name.clone(),
        Some(Index::Number(n)) => format!("{}[{}]", segment.name, n),
        Some(Index::Key(k)) => format!("{}[\"{}\"]", segment.name, k),
    }
}

/// A parsed Terraform state.
pub(crate) struct TfState {
    source: PathBuf,
    state: Value,
}

impl TfState {
    /// Read a state file. `file://` locations are accepted; remote backends
    /// are not.
    pub fn open(location: &str) -> Result<Self> {
        let path = match location.split_once("://") {
            None => Path::new(location),
            Some(("file", path)) => Path::new(path),
            Some((scheme, _)) => bail!(
                "tfstate location {:?}: {} backends are not supported, use a local file",
                location,
                scheme
            ),
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading tfstate {}", path.display()))?;
        let state: Value = serde_json::from_str(&text)
            .with_context(|| format!("parsing tfstate {}", path.display()))?;
        Self::from_value(path.to_path_buf(), state)
    }

    pub fn from_value(source: PathBuf, state: Value) -> Result<Self> {
        match state.get("version").and_then(Value::as_u64) {
            Some(4) => Ok(TfState { source, state }),
            Some(v) => bail!(
                "tfstate {}: unsupported format version {}",
                source.display(),
                v
            ),
            None => bail!("tfstate {}: missing format version", source.display()),
        }
    }

    pub fn lookup(&self, address: &str) -> Result<Value> {
        let segments = split_address(address)?;
        if segments[0].name == "output" && segments[0].index.is_none() {
            let Some(output) = segments.get(1) else {
                bail!("output address {:?} names no output", address);
            };
            let mut value = self
                .state
                .get("outputs")
                .and_then(|o| o.get(&output.name))
                .and_then(|o| o.get("value"))
                .with_context(|| not_found(address))?;
            if let Some(index) = &output.index {
                value = index_into(value, index, address)?;
            }
            return Ok(navigate(value, &segments[2..], address)?.clone());
        }

        let mut i = 0;
        let mut module = Vec::new();
        while segments.get(i).is_some_and(|s| s.name == "module" && s.index.is_none()) {
            let Some(name) = segments.get(i + 1) else {
                bail!("module address {:?} names no module", address);
            };
            module.push(format!("module.{}", segment_text(name)));
            i += 2;
        }
        let mode = if segments.get(i).is_some_and(|s| s.name == "data" && s.index.is_none()) {
            i += 1;
            "data"
        } else {
            "managed"
        };
        let (Some(type_), Some(name)) = (segments.get(i), segments.get(i + 1)) else {
            bail!("address {:?} must name a resource type and name", address);
        };
        let module = (!module.is_empty()).then(|| module.join("."));

        let resources = self
            .state
            .get("resources")
            .and_then(Value::as_array)
            .with_context(|| format!("tfstate {} has no resources", self.source.display()))?;
        let resource = resources
            .iter()
            .find(|r| {
                r.get("mode").and_then(Value::as_str) == Some(mode)
                    && r.get("type").and_then(Value::as_str) == Some(type_.name.as_str())
                    && r.get("name").and_then(Value::as_str) == Some(name.name.as_str())
                    && r.get("module").and_then(Value::as_str) == module.as_deref()
            })
            .with_context(|| not_found(address))?;
        let instances = resource
            .get("instances")
            .and_then(Value::as_array)
            .with_context(|| format!("{} has no instances in tfstate", address))?;
        let instance = match &name.index {
            None => instances.first(),
            Some(index) => instances.iter().find(|inst| {
                inst.get("index_key")
                    .is_some_and(|key| index.matches(key))
            }),
        }
        .with_context(|| not_found(address))?;
        let attributes = instance
            .get("attributes")
            .with_context(|| format!("{} has no attributes in tfstate", address))?;
        Ok(navigate(attributes, &segments[i + 2..], address)?.clone())
    }
}

/// Fill `%s` / `%d` placeholders in order, for `tfstatef`.
fn format_address(format: &str, args: &[String]) -> Result<String> {
    let mut out = String::new();
    let mut args = args.iter();
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        if c == '%' {
            match chars.next() {
                Some('s') | Some('d') => out.push_str(
                    args.next()
                        .with_context(|| format!("too few arguments for {:?}", format))?,
                ),
                Some('%') => out.push('%'),
                Some(other) => bail!("unsupported placeholder %{} in {:?}", other, format),
                None => bail!("dangling % in {:?}", format),
            }
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

/// The `tfstate` and `tfstatef` template functions.
pub(crate) struct TfStateProvider {
    state: TfState,
}

impl TfStateProvider {
    pub fn open(location: &str) -> Result<Self> {
        tracing::debug!("reading tfstate from {}", location);
        Ok(TfStateProvider {
            state: TfState::open(location)?,
        })
    }
}

fn scalar_or_json(value: Value) -> Value {
    match value {
        Value::String(_) | Value::Number(_) | Value::Bool(_) | Value::Null => value,
        other => Value::String(other.to_string()),
    }
}

impl ValueProvider for TfStateProvider {
    fn functions(&self) -> &[&'static str] {
        &["tfstate", "tfstatef"]
    }

    fn call(&self, function: &str, args: &[String]) -> Result<Value> {
        let address = match (function, args) {
            ("tfstate", [address]) => address.clone(),
            ("tfstatef", [format, rest @ ..]) => format_address(format, rest)?,
            ("tfstate", _) => bail!("tfstate takes exactly one address"),
            ("tfstatef", _) => bail!("tfstatef takes a format and its arguments"),
            (other, _) => bail!("unknown tfstate function {}", other),
        };
        Ok(scalar_or_json(self.state.lookup(&address)?))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample() -> TfState {
        TfState::from_value(
            PathBuf::from("terraform.tfstate"),
            json!({
                "version": 4,
                "outputs": {
                    "bucket": { "value": "my-bucket", "type": "string" },
                    "ids": { "value": ["a", "b"], "type": ["list", "string"] }
                },
                "resources": [
                    {
                        "mode": "managed",
                        "type": "aws_iam_role",
                        "name": "lambda",
                        "instances": [
                            { "attributes": { "arn": "arn:aws:iam::123456789012:role/lambda", "tags": { "team": "infra" } } }
                        ]
                    },
                    {
                        "mode": "data",
                        "type": "aws_caller_identity",
                        "name": "current",
                        "instances": [ { "attributes": { "account_id": "123456789012" } } ]
                    },
                    {
                        "module": "module.network",
                        "mode": "managed",
                        "type": "aws_subnet",
                        "name": "private",
                        "instances": [
                            { "index_key": 0, "attributes": { "id": "subnet-0" } },
                            { "index_key": 1, "attributes": { "id": "subnet-1" } }
                        ]
                    },
                    {
                        "mode": "managed",
                        "type": "aws_ssm_parameter",
                        "name": "config",
                        "instances": [
                            { "index_key": "db.host", "attributes": { "value": "db.internal" } }
                        ]
                    }
                ]
            }),
        )
        .unwrap()
    }

    #[test]
    fn managed_resource_attribute() {
        assert_eq!(
            sample().lookup("aws_iam_role.lambda.arn").unwrap(),
            json!("arn:aws:iam::123456789012:role/lambda")
        );
        assert_eq!(
            sample().lookup("aws_iam_role.lambda.tags.team").unwrap(),
            json!("infra")
        );
    }

    #[test]
    fn data_source_attribute() {
        assert_eq!(
            sample()
                .lookup("data.aws_caller_identity.current.account_id")
                .unwrap(),
            json!("123456789012")
        );
    }

    #[test]
    fn module_and_index() {
        assert_eq!(
            sample()
                .lookup("module.network.aws_subnet.private[1].id")
                .unwrap(),
            json!("subnet-1")
        );
        assert_eq!(
            sample()
                .lookup(r#"aws_ssm_parameter.config["db.host"].value"#)
                .unwrap(),
            json!("db.internal")
        );
    }

    #[test]
    fn outputs() {
        assert_eq!(sample().lookup("output.bucket").unwrap(), json!("my-bucket"));
        assert_eq!(sample().lookup("output.ids[1]").unwrap(), json!("b"));
    }

    #[test]
    fn missing_addresses() {
        let err = sample().lookup("aws_iam_role.other.arn").unwrap_err();
        assert_eq!(err.to_string(), "aws_iam_role.other.arn is not found in tfstate");
        assert!(sample().lookup("aws_iam_role.lambda.nope").is_err());
        assert!(sample().lookup("aws_iam_role").is_err());
        assert!(sample().lookup("aws_iam_role.lambda[").is_err());
    }

    #[test]
    fn rejects_other_versions() {
        assert!(TfState::from_value(PathBuf::from("x"), json!({ "version": 3 })).is_err());
    }

    #[test]
    fn provider_functions() {
        let provider = TfStateProvider { state: sample() };
        assert_eq!(
            provider
                .call("tfstatef", &["module.network.aws_subnet.private[%d].id".to_string(), "0".to_string()])
                .unwrap(),
            json!("subnet-0")
        );
        assert_eq!(
            provider
                .call("tfstate", &["aws_iam_role.lambda.tags".to_string()])
                .unwrap(),
            json!(r#"{"team":"infra"}"#)
        );
        assert!(provider.call("tfstate", &[]).is_err());
    }

    #[test]
    fn opens_local_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("terraform.tfstate");
        std::fs::write(&path, r#"{"version": 4, "resources": []}"#).unwrap();
        assert!(TfState::open(path.to_str().unwrap()).is_ok());
        assert!(TfState::open(&format!("file://{}", path.display())).is_ok());
        assert!(TfState::open("s3://bucket/key").is_err());
    }
}
