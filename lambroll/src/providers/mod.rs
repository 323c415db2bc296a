//! External value providers: named lookup functions made available to
//! definition templates, such as `tfstate "aws_iam_role.lambda.arn"`.

pub(crate) mod tfstate;

use std::sync::Arc;

use anyhow::{bail, Result};
use serde_json::Value;

/// A source of values looked up by the definition loader.
pub(crate) trait ValueProvider: Send + Sync {
    /// Function names this provider answers to, before any prefix.
    fn functions(&self) -> &[&'static str];

    fn call(&self, function: &str, args: &[String]) -> Result<Value>;
}

/// A function name as templates see it, bound to its provider.
#[derive(Clone)]
pub(crate) struct Binding {
    pub name: String,
    pub function: &'static str,
    pub provider: Arc<dyn ValueProvider>,
}

impl Binding {
    pub fn call(&self, args: &[String]) -> Result<Value> {
        self.provider.call(self.function, args)
    }
}

/// The providers configured for one run. Later registrations shadow earlier
/// ones with the same function name.
#[derive(Clone, Default)]
pub(crate) struct ProviderSet {
    entries: Vec<(String, Arc<dyn ValueProvider>)>,
}

impl ProviderSet {
    pub fn add(&mut self, provider: Arc<dyn ValueProvider>) {
        self.entries.push((String::new(), provider));
    }

    /// Register `provider` with its function names prefixed, e.g. `prod_tfstate`.
    pub fn add_prefixed(&mut self, prefix: &str, provider: Arc<dyn ValueProvider>) -> Result<()> {
        if prefix.is_empty() {
            bail!("provider prefix must not be empty");
        }
        if !prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            bail!(
                "provider prefix {:?} may only contain letters, digits and underscores",
                prefix
            );
        }
        self.entries.push((prefix.to_string(), provider));
        Ok(())
    }

    pub fn bindings(&self) -> Vec<Binding> {
        self.entries
            .iter()
            .flat_map(|(prefix, provider)| {
                provider.functions().iter().map(move |function| Binding {
                    name: format!("{}{}", prefix, function),
                    function: *function,
                    provider: provider.clone(),
                })
            })
            .collect()
    }

    pub fn call(&self, name: &str, args: &[String]) -> Result<Value> {
        match self.bindings().into_iter().rev().find(|b| b.name == name) {
            Some(binding) => binding.call(args),
            None => bail!("no value provider offers a function named {}", name),
        }
    }
}

/// Parse a `PREFIX=VALUE` command line argument.
pub(crate) fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {:?}", s)),
    }
}
