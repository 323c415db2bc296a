//! The remote side of `lambroll`: a narrow interface over the function
//! service, an implementation backed by AWS Lambda, and the paging and retry
//! helpers both use.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use lambroll_core::normalize::NormalizedDefinition;
use lambroll_core::plan::ConfigurationUpdate;
use lambroll_core::remote::{FunctionConfiguration, RemoteFunction};
use lambroll_core::versions::{AliasRecord, VersionInfo};

pub mod lambda;
pub mod pagination;
pub mod retry;

pub use pagination::Page;

/// Code as it is sent to the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodePayload {
    /// Zip archive bytes.
    Archive(Vec<u8>),
    /// Container image URI.
    Image(String),
}

#[derive(Debug, Clone)]
pub struct CreateFunctionRequest {
    pub definition: NormalizedDefinition,
    pub code: CodePayload,
    pub publish: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeUpdateRequest {
    pub code: CodePayload,
    pub architectures: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub function_name: String,
    pub qualifier: Option<String>,
    pub payload: Vec<u8>,
    /// Fire and forget rather than waiting for the result.
    pub asynchronous: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationResult {
    pub status_code: i32,
    pub function_error: Option<String>,
    pub executed_version: Option<String>,
    pub payload: Vec<u8>,
}

/// Everything `lambroll` asks of the function service.
///
/// Errors carry a [`lambroll_core::Error`] so callers can tell a missing
/// function ([`lambroll_core::error::is_not_found`]) from other failures.
/// List operations return one page; see [`pagination::collect_all`].
#[async_trait]
pub trait FunctionService: Send + Sync {
    async fn get_function(&self, name: &str) -> Result<RemoteFunction>;

    async fn list_functions(&self, marker: Option<String>) -> Result<Page<FunctionConfiguration>>;

    /// Returns the version the new function is at: the published version
    /// when `request.publish` is set, `$LATEST` otherwise.
    async fn create_function(&self, request: &CreateFunctionRequest) -> Result<String>;

    async fn update_function_configuration(
        &self,
        name: &str,
        update: &ConfigurationUpdate,
    ) -> Result<()>;

    async fn update_function_code(&self, name: &str, update: &CodeUpdateRequest) -> Result<()>;

    /// Returns the new version number.
    async fn publish_version(&self, name: &str) -> Result<String>;

    async fn tag_function(&self, arn: &str, tags: &BTreeMap<String, String>) -> Result<()>;

    async fn untag_function(&self, arn: &str, keys: &[String]) -> Result<()>;

    async fn get_alias(&self, name: &str, alias: &str) -> Result<AliasRecord>;

    async fn create_alias(&self, name: &str, alias: &AliasRecord) -> Result<()>;

    async fn update_alias(&self, name: &str, alias: &AliasRecord) -> Result<()>;

    async fn list_aliases(&self, name: &str, marker: Option<String>) -> Result<Page<AliasRecord>>;

    async fn list_versions(&self, name: &str, marker: Option<String>)
        -> Result<Page<VersionInfo>>;

    /// Deletes the whole function, or only one version when `qualifier` is
    /// given.
    async fn delete_function(&self, name: &str, qualifier: Option<&str>) -> Result<()>;

    async fn invoke(&self, invocation: &Invocation) -> Result<InvocationResult>;
}
