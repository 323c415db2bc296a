//! Fill in the values the service assumes when a definition leaves them out,
//! so that a definition and its remote mirror compare equal when nothing has
//! actually changed.

use std::ops::Deref;

use serde::Serialize;

use crate::definition::{
    EphemeralStorage, LoggingConfig, ResourceDefinition, SnapStart, TracingConfig,
};

pub const DEFAULT_ARCHITECTURE: &str = "x86_64";
pub const DEFAULT_MEMORY_SIZE: i32 = 128;
pub const DEFAULT_TIMEOUT: i32 = 3;
pub const DEFAULT_EPHEMERAL_STORAGE_SIZE: i32 = 512;
pub const LOG_FORMAT_TEXT: &str = "Text";
pub const LOG_FORMAT_JSON: &str = "JSON";
pub const DEFAULT_LOG_LEVEL: &str = "INFO";
pub const TRACING_MODE_PASS_THROUGH: &str = "PassThrough";
pub const SNAP_START_NONE: &str = "None";

pub fn default_log_group(function_name: &str) -> String {
    format!("/aws/lambda/{}", function_name)
}

/// A definition with every defaultable field filled in.
///
/// Only [`normalize`] constructs this, which is what makes it safe to feed
/// into the diff engine and the planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct NormalizedDefinition(ResourceDefinition);

impl NormalizedDefinition {
    pub fn as_definition(&self) -> &ResourceDefinition {
        &self.0
    }

    pub fn into_inner(self) -> ResourceDefinition {
        self.0
    }
}

impl Deref for NormalizedDefinition {
    type Target = ResourceDefinition;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

pub fn normalize(mut def: ResourceDefinition) -> NormalizedDefinition {
    if def.architectures.as_ref().map_or(true, Vec::is_empty) {
        def.architectures = Some(vec![DEFAULT_ARCHITECTURE.to_string()]);
    }
    def.description.get_or_insert_with(String::new);
    def.memory_size.get_or_insert(DEFAULT_MEMORY_SIZE);
    def.timeout.get_or_insert(DEFAULT_TIMEOUT);
    def.layers.get_or_insert_with(Vec::new);
    def.ephemeral_storage.get_or_insert(EphemeralStorage {
        size: DEFAULT_EPHEMERAL_STORAGE_SIZE,
    });

    let tracing = def.tracing_config.get_or_insert_with(TracingConfig::default);
    tracing
        .mode
        .get_or_insert_with(|| TRACING_MODE_PASS_THROUGH.to_string());

    let snap_start = def.snap_start.get_or_insert_with(SnapStart::default);
    snap_start
        .apply_on
        .get_or_insert_with(|| SNAP_START_NONE.to_string());

    let log_group = default_log_group(&def.function_name);
    let logging = def.logging_config.get_or_insert_with(LoggingConfig::default);
    let format = logging
        .log_format
        .get_or_insert_with(|| LOG_FORMAT_TEXT.to_string())
        .clone();
    logging.log_group.get_or_insert(log_group);
    // Log levels only exist for structured logs.
    if format == LOG_FORMAT_JSON {
        logging
            .application_log_level
            .get_or_insert_with(|| DEFAULT_LOG_LEVEL.to_string());
        logging
            .system_log_level
            .get_or_insert_with(|| DEFAULT_LOG_LEVEL.to_string());
    }

    // The service reports an environment without variables as absent.
    if def
        .environment
        .as_ref()
        .is_some_and(|env| env.variables.is_empty())
    {
        def.environment = None;
    }

    NormalizedDefinition(def)
}
