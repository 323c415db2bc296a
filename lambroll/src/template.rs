//! Template rendering for definition files.
//!
//! Two passes run over a definition before it is parsed:
//!
//! 1. Files ending in `.jinja` are rendered as full templates, with the
//!    external variables (`ext_str`, `ext_code`) and all provider functions
//!    available.
//! 2. Every file then goes through a substitution pass offering `env`,
//!    `must_env` and the provider functions, e.g.
//!    `"Role": "{{ tfstate('aws_iam_role.lambda.arn') }}"`.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use minijinja::value::Rest;
use minijinja::{Environment, ErrorKind, UndefinedBehavior, Value};

use crate::providers::ProviderSet;

fn template_error(message: String) -> minijinja::Error {
    minijinja::Error::new(ErrorKind::InvalidOperation, message)
}

#[derive(Clone, Default)]
pub(crate) struct TemplateContext {
    providers: ProviderSet,
    ext_str: BTreeMap<String, String>,
    ext_code: BTreeMap<String, serde_json::Value>,
}

impl TemplateContext {
    /// `ext_code` values are JSON documents; they are parsed here so that a
    /// malformed value is reported before any file is loaded.
    pub fn new(
        providers: ProviderSet,
        ext_str: BTreeMap<String, String>,
        ext_code: BTreeMap<String, String>,
    ) -> Result<Self> {
        let ext_code = ext_code
            .into_iter()
            .map(|(name, code)| {
                let value = serde_json::from_str(&code)
                    .with_context(|| format!("parsing ext-code {} as JSON", name))?;
                Ok((name, value))
            })
            .collect::<Result<_>>()?;
        Ok(TemplateContext {
            providers,
            ext_str,
            ext_code,
        })
    }

    fn environment(&self, with_external: bool) -> Environment<'static> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);

        env.add_function(
            "env",
            |name: String, default: Option<String>| -> Result<String, minijinja::Error> {
                Ok(std::env::var(&name)
                    .ok()
                    .filter(|v| !v.is_empty())
                    .or(default)
                    .unwrap_or_default())
            },
        );
        env.add_function(
            "must_env",
            |name: String| -> Result<String, minijinja::Error> {
                std::env::var(&name).map_err(|_| {
                    template_error(format!("environment variable {} is not defined", name))
                })
            },
        );

        for binding in self.providers.bindings() {
            let name = binding.name.clone();
            env.add_function(
                name,
                move |args: Rest<String>| -> Result<Value, minijinja::Error> {
                    binding
                        .call(&args.0)
                        .map(|v| Value::from_serialize(&v))
                        .map_err(|e| template_error(format!("{}: {:#}", binding.name, e)))
                },
            );
        }

        if with_external {
            let ext_str = self.ext_str.clone();
            env.add_function(
                "ext_str",
                move |name: String| -> Result<String, minijinja::Error> {
                    ext_str.get(&name).cloned().ok_or_else(|| {
                        minijinja::Error::new(
                            ErrorKind::UndefinedError,
                            format!("undefined external variable {}", name),
                        )
                    })
                },
            );
            let ext_code = self.ext_code.clone();
            env.add_function(
                "ext_code",
                move |name: String| -> Result<Value, minijinja::Error> {
                    ext_code.get(&name).map(Value::from_serialize).ok_or_else(|| {
                        minijinja::Error::new(
                            ErrorKind::UndefinedError,
                            format!("undefined external code {}", name),
                        )
                    })
                },
            );
        }
        env
    }

    /// Render a `.jinja` definition.
    pub fn render_template(&self, source: &str) -> Result<String, minijinja::Error> {
        self.environment(true).render_str(source, ())
    }

    /// The substitution pass applied to every definition.
    pub fn substitute(&self, source: &str) -> Result<String, minijinja::Error> {
        self.environment(false).render_str(source, ())
    }
}

/// Render a `.jinja` file without any external values or functions.
pub(crate) fn render_plain(source: &str) -> Result<String, minijinja::Error> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);
    env.render_str(source, ())
}
