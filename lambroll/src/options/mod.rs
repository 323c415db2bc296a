use std::collections::BTreeMap;
use std::io::IsTerminal as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ColorChoice, Parser, ValueEnum};
use lambroll_core::Error;
use lambroll_remote::lambda::ConnectOptions;
use serde::Deserialize;
use tracing::level_filters::LevelFilter;

use crate::loader::{find_definition_file, load_definition_file, DEFAULT_OPTION_FILENAMES};
use crate::providers::tfstate::TfStateProvider;
use crate::providers::{parse_key_value, ProviderSet};
use crate::template::TemplateContext;

#[derive(ValueEnum, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Parser, Debug, Clone, Default)]
pub struct Options {
    /// Function definition file [default: function.json or function.json.jinja]
    #[arg(long, global = true, env = "LAMBROLL_FUNCTION")]
    pub function: Option<PathBuf>,

    /// Minimum level of log messages to show [default: info]
    #[arg(long, global = true, value_enum, env = "LAMBROLL_LOGLEVEL")]
    pub log_level: Option<LogLevel>,

    /// Colorize diffs and logs [default: auto]
    #[arg(long, global = true, env = "LAMBROLL_COLOR")]
    pub color: Option<ColorChoice>,

    #[arg(long, global = true, env = "AWS_REGION")]
    pub region: Option<String>,

    /// Credential profile name
    #[arg(long, global = true, env = "AWS_PROFILE")]
    pub profile: Option<String>,

    /// Endpoint URL of the Lambda API
    #[arg(long, global = true, env = "AWS_LAMBDA_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Terraform state file whose values `tfstate` looks up
    #[arg(long, global = true, env = "LAMBROLL_TFSTATE")]
    pub tfstate: Option<String>,

    /// Additional terraform state, available as `<PREFIX>tfstate`
    #[arg(long, global = true, value_name = "PREFIX=PATH", value_parser = parse_key_value)]
    pub prefixed_tfstate: Vec<(String, String)>,

    /// Environment file to load; variables already set take precedence
    #[arg(long, global = true)]
    pub envfile: Vec<PathBuf>,

    /// External string value for templates, read with `ext_str(NAME)`
    #[arg(long, global = true, value_name = "NAME=VALUE", value_parser = parse_key_value)]
    pub ext_str: Vec<(String, String)>,

    /// External JSON value for templates, read with `ext_code(NAME)`
    #[arg(long, global = true, value_name = "NAME=JSON", value_parser = parse_key_value)]
    pub ext_code: Vec<(String, String)>,
}

/// Option defaults from `lambroll.json` in the working directory.
#[derive(Deserialize, Debug, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OptionDefaults {
    pub function: Option<PathBuf>,
    pub log_level: Option<LogLevel>,
    pub color: Option<bool>,
    pub region: Option<String>,
    pub profile: Option<String>,
    pub endpoint: Option<String>,
    pub tfstate: Option<String>,
    #[serde(default)]
    pub prefixed_tfstate: BTreeMap<String, String>,
    #[serde(default)]
    pub envfile: Vec<PathBuf>,
    #[serde(default, rename = "extstr")]
    pub ext_str: BTreeMap<String, String>,
    #[serde(default, rename = "extcode")]
    pub ext_code: BTreeMap<String, String>,
    /// The file these were read from.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// Load `lambroll.json`, or nothing if there is none.
pub fn load_defaults(dir: &Path) -> Result<OptionDefaults> {
    let path = match find_definition_file(dir, DEFAULT_OPTION_FILENAMES) {
        Ok(path) => path,
        Err(Error::NoDefinitionFile { .. }) => return Ok(OptionDefaults::default()),
        Err(e) => return Err(e.into()),
    };
    let (path, mut defaults): (PathBuf, OptionDefaults) =
        load_definition_file("options", None, Some(&path), &[])?;
    defaults.source = Some(path);
    Ok(defaults)
}

/// Files that supplied options before logging was set up.
#[derive(Debug, Default, PartialEq)]
pub struct OptionSources {
    pub defaults: Option<PathBuf>,
    pub envfiles: Vec<PathBuf>,
}

impl OptionSources {
    pub fn messages(&self) -> Vec<String> {
        self.defaults
            .iter()
            .map(|path| format!("loaded options from {}", path.display()))
            .chain(
                self.envfiles
                    .iter()
                    .map(|path| format!("loaded environment file {}", path.display())),
            )
            .collect()
    }

    /// Report the sources; call once the subscriber is installed.
    pub fn log(&self) {
        for message in self.messages() {
            tracing::info!("{}", message);
        }
    }
}

/// Export the variables of each env file, in order.
pub fn load_envfiles(files: &[PathBuf]) -> Result<()> {
    for file in files {
        dotenvy::from_path(file)
            .with_context(|| format!("loading environment file {}", file.display()))?;
    }
    Ok(())
}

impl Options {
    /// Fill in what neither the command line nor the environment set.
    ///
    /// List-valued options accumulate, file entries first.
    pub fn merge_defaults(&mut self, defaults: OptionDefaults) {
        self.function = self.function.take().or(defaults.function);
        self.log_level = self.log_level.or(defaults.log_level);
        self.color = self.color.or(defaults.color.map(|enabled| {
            if enabled {
                ColorChoice::Always
            } else {
                ColorChoice::Never
            }
        }));
        self.region = self.region.take().or(defaults.region);
        self.profile = self.profile.take().or(defaults.profile);
        self.endpoint = self.endpoint.take().or(defaults.endpoint);
        self.tfstate = self.tfstate.take().or(defaults.tfstate);
        self.prefixed_tfstate = prepend(defaults.prefixed_tfstate, &self.prefixed_tfstate);
        self.envfile = defaults
            .envfile
            .into_iter()
            .chain(self.envfile.drain(..))
            .collect();
        self.ext_str = prepend(defaults.ext_str, &self.ext_str);
        self.ext_code = prepend(defaults.ext_code, &self.ext_code);
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level.unwrap_or_default().level_filter()
    }

    pub fn use_color(&self) -> bool {
        match self.color.unwrap_or(ColorChoice::Auto) {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => std::io::stderr().is_terminal(),
        }
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            region: self.region.clone(),
            profile: self.profile.clone(),
            endpoint: self.endpoint.clone(),
        }
    }

    pub(crate) fn providers(&self) -> Result<ProviderSet> {
        let mut providers = ProviderSet::default();
        if let Some(location) = &self.tfstate {
            providers.add(Arc::new(TfStateProvider::open(location)?));
        }
        for (prefix, location) in &self.prefixed_tfstate {
            providers.add_prefixed(prefix, Arc::new(TfStateProvider::open(location)?))?;
        }
        Ok(providers)
    }

    pub(crate) fn template_context(&self) -> Result<TemplateContext> {
        TemplateContext::new(
            self.providers()?,
            self.ext_str.iter().cloned().collect(),
            self.ext_code.iter().cloned().collect(),
        )
    }
}

fn prepend(file: BTreeMap<String, String>, cli: &[(String, String)]) -> Vec<(String, String)> {
    file.into_iter().chain(cli.iter().cloned()).collect()
}

/// Reject `--keep-versions` style flags that only make sense with another.
pub(crate) fn require(condition: bool, message: &str) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(Error::Usage(message.to_string()).into())
    }
}
