//! An in-memory [`FunctionService`] for command tests.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration};
use lambroll_core::definition::{
    CodeReference, ImageConfig, ResourceDefinition, PACKAGE_TYPE_IMAGE, PACKAGE_TYPE_ZIP,
};
use lambroll_core::normalize::normalize;
use lambroll_core::plan::ConfigurationUpdate;
use lambroll_core::remote::{
    CodeLocation, FunctionConfiguration, RemoteFunction, VpcConfigResponse, REPOSITORY_TYPE_ECR,
};
use lambroll_core::versions::{AliasRecord, VersionInfo, VERSION_LATEST};
use lambroll_core::Error;
use lambroll_remote::{
    CodePayload, CodeUpdateRequest, CreateFunctionRequest, FunctionService, Invocation,
    InvocationResult, Page,
};

use crate::application::App;
use crate::archive::code_sha256;

const PAGE_SIZE: usize = 2;

/// Calls that only read.
const READS: &[&str] = &[
    "GetFunction",
    "ListFunctions",
    "GetAlias",
    "ListAliases",
    "ListVersionsByFunction",
];

#[derive(Debug, Clone)]
struct StoredFunction {
    definition: ResourceDefinition,
    code_sha256: String,
    tags: BTreeMap<String, String>,
}

#[derive(Default)]
struct State {
    function: Option<StoredFunction>,
    others: Vec<FunctionConfiguration>,
    versions: Vec<VersionInfo>,
    aliases: BTreeMap<String, AliasRecord>,
    next_version: u64,
    calls: Vec<String>,
    failing_deletes: BTreeSet<String>,
}

#[derive(Default)]
pub(crate) struct FakeService {
    state: Mutex<State>,
}

fn function_arn(name: &str) -> String {
    format!("arn:aws:lambda:us-east-1:123456789012:function:{}", name)
}

fn timestamp(minute: u64) -> DateTime<chrono::FixedOffset> {
    DateTime::parse_from_rfc3339("2024-03-01T12:00:00+00:00").unwrap()
        + Duration::minutes(minute as i64)
}

fn paginate<T: Clone>(items: &[T], marker: Option<String>) -> Result<Page<T>> {
    let start: usize = marker.as_deref().unwrap_or("0").parse()?;
    let end = (start + PAGE_SIZE).min(items.len());
    Ok(Page {
        items: items[start.min(end)..end].to_vec(),
        next_marker: (end < items.len()).then(|| end.to_string()),
    })
}

fn not_found(name: &str) -> anyhow::Error {
    Error::NotFound {
        name: name.to_string(),
    }
    .into()
}

impl StoredFunction {
    /// What `GetFunction` reports; empty settings come back absent, as the
    /// service reports them.
    fn to_remote(&self) -> RemoteFunction {
        let d = &self.definition;
        let image_uri = d.code.image_uri().map(str::to_string);
        let vpc_id = d
            .vpc_config
            .as_ref()
            .filter(|v| !v.subnet_ids.is_empty())
            .map_or_else(String::new, |_| "vpc-1".to_string());
        let configuration = FunctionConfiguration {
            function_name: d.function_name.clone(),
            function_arn: Some(function_arn(&d.function_name)),
            runtime: d.runtime.clone(),
            role: d.role.clone(),
            handler: d.handler.clone(),
            description: d.description.clone(),
            code_size: 1024,
            code_sha256: Some(self.code_sha256.clone()),
            memory_size: d.memory_size,
            timeout: d.timeout,
            last_modified: Some("2024-03-01T12:00:00.000+0000".to_string()),
            version: Some(VERSION_LATEST.to_string()),
            package_type: Some(
                if image_uri.is_some() {
                    PACKAGE_TYPE_IMAGE
                } else {
                    PACKAGE_TYPE_ZIP
                }
                .to_string(),
            ),
            architectures: d.architectures.clone().unwrap_or_default(),
            ephemeral_storage: d.ephemeral_storage.clone(),
            vpc_config: Some(VpcConfigResponse {
                subnet_ids: d
                    .vpc_config
                    .as_ref()
                    .map(|v| v.subnet_ids.clone())
                    .unwrap_or_default(),
                security_group_ids: d
                    .vpc_config
                    .as_ref()
                    .map(|v| v.security_group_ids.clone())
                    .unwrap_or_default(),
                vpc_id: Some(vpc_id),
                ipv6_allowed_for_dual_stack: None,
            }),
            environment: d
                .environment
                .as_ref()
                .filter(|e| !e.variables.is_empty())
                .map(|e| e.variables.clone()),
            kms_key_arn: d.kms_key_arn.clone().filter(|k| !k.is_empty()),
            tracing_mode: d.tracing_config.as_ref().and_then(|t| t.mode.clone()),
            dead_letter_target_arn: d
                .dead_letter_config
                .as_ref()
                .and_then(|c| c.target_arn.clone())
                .filter(|a| !a.is_empty()),
            layers: d.layers.clone().unwrap_or_default(),
            file_system_configs: d.file_system_configs.clone().unwrap_or_default(),
            image_config: d
                .image_config
                .clone()
                .filter(|c| *c != ImageConfig::default()),
            snap_start_apply_on: d.snap_start.as_ref().and_then(|s| s.apply_on.clone()),
            logging_config: d.logging_config.clone(),
            state: Some("Active".to_string()),
            last_update_status: Some("Successful".to_string()),
        };
        RemoteFunction {
            configuration,
            code: Some(CodeLocation {
                repository_type: Some(
                    if image_uri.is_some() {
                        REPOSITORY_TYPE_ECR
                    } else {
                        "S3"
                    }
                    .to_string(),
                ),
                location: None,
                image_uri,
            }),
            tags: self.tags.clone(),
        }
    }

    fn apply(&mut self, update: &ConfigurationUpdate) {
        fn set<T: Clone>(field: &mut Option<T>, value: &Option<T>) {
            if let Some(value) = value {
                *field = Some(value.clone());
            }
        }
        let d = &mut self.definition;
        set(&mut d.role, &update.role);
        set(&mut d.handler, &update.handler);
        set(&mut d.description, &update.description);
        set(&mut d.timeout, &update.timeout);
        set(&mut d.memory_size, &update.memory_size);
        set(&mut d.vpc_config, &update.vpc_config);
        set(&mut d.environment, &update.environment);
        set(&mut d.runtime, &update.runtime);
        set(&mut d.dead_letter_config, &update.dead_letter_config);
        set(&mut d.kms_key_arn, &update.kms_key_arn);
        set(&mut d.tracing_config, &update.tracing_config);
        set(&mut d.layers, &update.layers);
        set(&mut d.file_system_configs, &update.file_system_configs);
        set(&mut d.image_config, &update.image_config);
        set(&mut d.ephemeral_storage, &update.ephemeral_storage);
        set(&mut d.snap_start, &update.snap_start);
        set(&mut d.logging_config, &update.logging_config);
    }
}

impl FakeService {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeService::default())
    }

    /// A function already deployed from `definition`, with `code` as its
    /// archive, without any versions.
    pub fn with_function(definition: ResourceDefinition, code: &[u8]) -> Arc<Self> {
        let service = FakeService::default();
        {
            let mut state = service.state.lock().unwrap();
            state.function = Some(StoredFunction {
                tags: definition.tags.clone().unwrap_or_default(),
                definition: normalize(definition).into_inner(),
                code_sha256: code_sha256(code),
            });
        }
        Arc::new(service)
    }

    pub fn add_other_function(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .others
            .push(FunctionConfiguration {
                function_name: name.to_string(),
                function_arn: Some(function_arn(name)),
                ..Default::default()
            });
    }

    /// Publish versions 1..=n, one minute apart.
    pub fn publish_versions(&self, n: u64) {
        let mut state = self.state.lock().unwrap();
        for _ in 0..n {
            Self::publish(&mut state);
        }
    }

    pub fn set_alias(&self, alias: AliasRecord) {
        self.state
            .lock()
            .unwrap()
            .aliases
            .insert(alias.name.clone(), alias);
    }

    pub fn fail_delete_of(&self, version: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_deletes
            .insert(version.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !READS.contains(&c.split(' ').next().unwrap_or_default()))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn alias(&self, name: &str) -> Option<AliasRecord> {
        self.state.lock().unwrap().aliases.get(name).cloned()
    }

    pub fn version_numbers(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .versions
            .iter()
            .map(|v| v.version.clone())
            .collect()
    }

    pub fn definition(&self) -> Option<ResourceDefinition> {
        self.state
            .lock()
            .unwrap()
            .function
            .as_ref()
            .map(|f| f.definition.clone())
    }

    pub fn code_sha256(&self) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .function
            .as_ref()
            .map(|f| f.code_sha256.clone())
    }

    fn publish(state: &mut State) -> String {
        state.next_version += 1;
        let version = state.next_version.to_string();
        let runtime = state
            .function
            .as_ref()
            .and_then(|f| f.definition.runtime.clone());
        state.versions.push(VersionInfo {
            version: version.clone(),
            last_modified: timestamp(state.next_version),
            runtime,
        });
        version
    }

    fn record(&self, call: String) -> std::sync::MutexGuard<'_, State> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        state
    }

    fn existing<'a>(state: &'a mut State, name: &str) -> Result<&'a mut StoredFunction> {
        match state.function.as_mut() {
            Some(f) if f.definition.function_name == name => Ok(f),
            _ => Err(not_found(name)),
        }
    }
}

#[async_trait]
impl FunctionService for FakeService {
    async fn get_function(&self, name: &str) -> Result<RemoteFunction> {
        let mut state = self.record(format!("GetFunction {}", name));
        Ok(Self::existing(&mut state, name)?.to_remote())
    }

    async fn list_functions(&self, marker: Option<String>) -> Result<Page<FunctionConfiguration>> {
        let state = self.record("ListFunctions".to_string());
        let mut all: Vec<FunctionConfiguration> = state
            .function
            .iter()
            .map(|f| f.to_remote().configuration)
            .collect();
        all.extend(state.others.iter().cloned());
        paginate(&all, marker)
    }

    async fn create_function(&self, request: &CreateFunctionRequest) -> Result<String> {
        let name = request.definition.function_name.clone();
        let mut state = self.record(format!("CreateFunction {}", name));
        if state.function.is_some() {
            bail!("function {} already exists", name);
        }
        let code_sha256 = match (&request.code, &request.definition.code) {
            (CodePayload::Archive(bytes), CodeReference::Archive) => code_sha256(bytes),
            (CodePayload::Image(uri), CodeReference::Image { uri: defined }) if uri == defined => {
                code_sha256(uri.as_bytes())
            }
            _ => bail!("code payload does not match the package type"),
        };
        state.function = Some(StoredFunction {
            definition: request.definition.as_definition().clone(),
            code_sha256,
            tags: request.definition.tags.clone().unwrap_or_default(),
        });
        if request.publish {
            Ok(Self::publish(&mut state))
        } else {
            Ok(VERSION_LATEST.to_string())
        }
    }

    async fn update_function_configuration(
        &self,
        name: &str,
        update: &ConfigurationUpdate,
    ) -> Result<()> {
        let mut state = self.record(format!(
            "UpdateFunctionConfiguration {}",
            update.changed_fields().join(",")
        ));
        Self::existing(&mut state, name)?.apply(update);
        Ok(())
    }

    async fn update_function_code(&self, name: &str, update: &CodeUpdateRequest) -> Result<()> {
        let mut state = self.record("UpdateFunctionCode".to_string());
        let function = Self::existing(&mut state, name)?;
        match &update.code {
            CodePayload::Archive(bytes) => function.code_sha256 = code_sha256(bytes),
            CodePayload::Image(uri) => {
                function.code_sha256 = code_sha256(uri.as_bytes());
                function.definition.code = CodeReference::Image { uri: uri.clone() };
            }
        }
        if !update.architectures.is_empty() {
            function.definition.architectures = Some(update.architectures.clone());
        }
        Ok(())
    }

    async fn publish_version(&self, name: &str) -> Result<String> {
        let mut state = self.record("PublishVersion".to_string());
        Self::existing(&mut state, name)?;
        Ok(Self::publish(&mut state))
    }

    async fn tag_function(&self, arn: &str, tags: &BTreeMap<String, String>) -> Result<()> {
        let mut state = self.record(format!(
            "TagResource {}",
            tags.keys().cloned().collect::<Vec<_>>().join(",")
        ));
        let function = state
            .function
            .as_mut()
            .filter(|f| function_arn(&f.definition.function_name) == arn)
            .ok_or_else(|| not_found(arn))?;
        function.tags.extend(tags.clone());
        Ok(())
    }

    async fn untag_function(&self, arn: &str, keys: &[String]) -> Result<()> {
        let mut state = self.record(format!("UntagResource {}", keys.join(",")));
        let function = state
            .function
            .as_mut()
            .filter(|f| function_arn(&f.definition.function_name) == arn)
            .ok_or_else(|| not_found(arn))?;
        for key in keys {
            function.tags.remove(key);
        }
        Ok(())
    }

    async fn get_alias(&self, name: &str, alias: &str) -> Result<AliasRecord> {
        let mut state = self.record(format!("GetAlias {}", alias));
        Self::existing(&mut state, name)?;
        state
            .aliases
            .get(alias)
            .cloned()
            .ok_or_else(|| not_found(alias))
    }

    async fn create_alias(&self, name: &str, alias: &AliasRecord) -> Result<()> {
        let mut state = self.record(format!("CreateAlias {} {}", alias.name, alias.function_version));
        Self::existing(&mut state, name)?;
        if state.aliases.contains_key(&alias.name) {
            bail!("alias {} already exists", alias.name);
        }
        state.aliases.insert(alias.name.clone(), alias.clone());
        Ok(())
    }

    async fn update_alias(&self, name: &str, alias: &AliasRecord) -> Result<()> {
        let mut state = self.record(format!("UpdateAlias {} {}", alias.name, alias.function_version));
        Self::existing(&mut state, name)?;
        match state.aliases.get_mut(&alias.name) {
            Some(existing) => {
                *existing = alias.clone();
                Ok(())
            }
            None => Err(not_found(&alias.name)),
        }
    }

    async fn list_aliases(&self, name: &str, marker: Option<String>) -> Result<Page<AliasRecord>> {
        let mut state = self.record("ListAliases".to_string());
        Self::existing(&mut state, name)?;
        let aliases: Vec<AliasRecord> = state.aliases.values().cloned().collect();
        paginate(&aliases, marker)
    }

    async fn list_versions(
        &self,
        name: &str,
        marker: Option<String>,
    ) -> Result<Page<VersionInfo>> {
        let mut state = self.record("ListVersionsByFunction".to_string());
        Self::existing(&mut state, name)?;
        let mut versions = vec![VersionInfo {
            version: VERSION_LATEST.to_string(),
            last_modified: timestamp(state.next_version + 1),
            runtime: None,
        }];
        versions.extend(state.versions.iter().cloned());
        paginate(&versions, marker)
    }

    async fn delete_function(&self, name: &str, qualifier: Option<&str>) -> Result<()> {
        let mut state = self.record(match qualifier {
            Some(q) => format!("DeleteFunction {}:{}", name, q),
            None => format!("DeleteFunction {}", name),
        });
        Self::existing(&mut state, name)?;
        let Some(version) = qualifier else {
            let calls = std::mem::take(&mut state.calls);
            *state = State {
                calls,
                ..Default::default()
            };
            return Ok(());
        };
        if state.failing_deletes.contains(version) {
            bail!("DeleteFunction {}:{} failed", name, version);
        }
        if state.aliases.values().any(|a| {
            a.function_version == version || a.additional_version_weights.contains_key(version)
        }) {
            bail!("version {} is referenced by an alias", version);
        }
        let before = state.versions.len();
        state.versions.retain(|v| v.version != version);
        if state.versions.len() == before {
            return Err(not_found(&format!("{}:{}", name, version)));
        }
        Ok(())
    }

    async fn invoke(&self, invocation: &Invocation) -> Result<InvocationResult> {
        let mut state = self.record(format!("Invoke {}", invocation.function_name));
        Self::existing(&mut state, &invocation.function_name)?;
        Ok(InvocationResult {
            status_code: if invocation.asynchronous { 202 } else { 200 },
            function_error: None,
            executed_version: Some(
                invocation
                    .qualifier
                    .clone()
                    .unwrap_or_else(|| VERSION_LATEST.to_string()),
            ),
            payload: if invocation.asynchronous {
                Vec::new()
            } else {
                invocation.payload.clone()
            },
        })
    }
}

/// A directory holding `function.json` and `function.zip`.
pub(crate) struct Workspace {
    pub dir: tempfile::TempDir,
}

impl Workspace {
    pub fn new(definition: &ResourceDefinition, code: &[u8]) -> Workspace {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("function.json"),
            serde_json::to_string_pretty(definition).unwrap(),
        )
        .unwrap();
        std::fs::write(dir.path().join("function.zip"), code).unwrap();
        Workspace { dir }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn write_definition(&self, definition: &ResourceDefinition) {
        std::fs::write(
            self.path("function.json"),
            serde_json::to_string_pretty(definition).unwrap(),
        )
        .unwrap();
    }

    pub fn write_code(&self, code: &[u8]) {
        std::fs::write(self.path("function.zip"), code).unwrap();
    }

    pub fn app(&self, service: Arc<FakeService>) -> App {
        App::with_service(service, Some(self.path("function.json")))
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Zip-looking bytes; only the magic number is checked.
pub(crate) fn zip(content: &str) -> Vec<u8> {
    let mut bytes = b"PK\x03\x04".to_vec();
    bytes.extend_from_slice(content.as_bytes());
    bytes
}

pub(crate) fn hello_definition() -> ResourceDefinition {
    let mut def = ResourceDefinition::new("hello");
    def.runtime = Some("nodejs20.x".to_string());
    def.role = Some("arn:aws:iam::123456789012:role/lambda".to_string());
    def.handler = Some("index.handler".to_string());
    def
}
