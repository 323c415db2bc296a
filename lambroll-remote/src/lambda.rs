//! [`FunctionService`] backed by the AWS Lambda API.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_lambda::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types as aws;
use aws_sdk_lambda::Client;
use lambroll_core::definition::{
    DeadLetterConfig, EphemeralStorage, Environment, FileSystemConfig, ImageConfig,
    LoggingConfig, SnapStart, TracingConfig, VpcConfig, PACKAGE_TYPE_IMAGE, PACKAGE_TYPE_ZIP,
};
use lambroll_core::error::Error;
use lambroll_core::plan::ConfigurationUpdate;
use lambroll_core::remote::{
    CodeLocation, FunctionConfiguration, RemoteFunction, VpcConfigResponse,
};
use lambroll_core::versions::{parse_last_modified, AliasRecord, VersionInfo, VERSION_LATEST};
use tokio_util::sync::CancellationToken;

use crate::retry::{retry, RetryPolicy};
use crate::{
    CodePayload, CodeUpdateRequest, CreateFunctionRequest, FunctionService, Invocation,
    InvocationResult, Page,
};

/// Where to connect; unset fields fall back to the SDK's own resolution
/// (environment, shared config files).
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    pub region: Option<String>,
    pub profile: Option<String>,
    pub endpoint: Option<String>,
}

const TRANSIENT_CODES: &[&str] = &[
    "ResourceConflictException",
    "TooManyRequestsException",
    "ThrottlingException",
    "ServiceException",
    "EC2ThrottledException",
];

const NOT_FOUND_CODE: &str = "ResourceNotFoundException";

/// Map an SDK failure onto [`Error`], so retry and callers can classify it.
fn classify<E, R>(operation: &str, resource: &str, err: SdkError<E, R>) -> anyhow::Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let code = err.as_service_error().and_then(|e| e.code()).map(str::to_string);
    let message = DisplayErrorContext(&err).to_string();
    let error = match code.as_deref() {
        Some(NOT_FOUND_CODE) => Error::NotFound {
            name: resource.to_string(),
        },
        Some(code) if TRANSIENT_CODES.contains(&code) => Error::Transient {
            operation: operation.to_string(),
            message,
        },
        _ if matches!(err, SdkError::TimeoutError(_) | SdkError::DispatchFailure(_)) => {
            Error::Transient {
                operation: operation.to_string(),
                message,
            }
        }
        _ => Error::Remote {
            operation: operation.to_string(),
            message,
        },
    };
    error.into()
}

pub struct LambdaService {
    client: Client,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl LambdaService {
    pub fn new(client: Client, cancel: CancellationToken) -> Self {
        LambdaService {
            client,
            policy: RetryPolicy::default(),
            cancel,
        }
    }

    pub async fn connect(options: &ConnectOptions, cancel: CancellationToken) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &options.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(profile) = &options.profile {
            loader = loader.profile_name(profile);
        }
        if let Some(endpoint) = &options.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let config = loader.load().await;
        tracing::debug!(region = ?config.region(), "connected to the Lambda API");
        Self::new(Client::new(&config), cancel)
    }
}

fn strings<T: AsRef<str>>(values: Option<&Vec<T>>) -> Vec<String> {
    values
        .map(|vs| vs.iter().map(|v| v.as_ref().to_string()).collect())
        .unwrap_or_default()
}

fn sorted(map: Option<HashMap<String, String>>) -> BTreeMap<String, String> {
    map.map(|m| m.into_iter().collect()).unwrap_or_default()
}

fn from_aws_configuration(c: aws::FunctionConfiguration) -> FunctionConfiguration {
    FunctionConfiguration {
        function_name: c.function_name.unwrap_or_default(),
        function_arn: c.function_arn,
        runtime: c.runtime.map(|r| r.as_str().to_string()),
        role: c.role,
        handler: c.handler,
        description: c.description,
        code_size: c.code_size,
        code_sha256: c.code_sha256,
        memory_size: c.memory_size,
        timeout: c.timeout,
        last_modified: c.last_modified,
        version: c.version,
        package_type: c.package_type.map(|p| p.as_str().to_string()),
        architectures: strings(c.architectures.as_ref()),
        ephemeral_storage: c
            .ephemeral_storage
            .map(|e| EphemeralStorage { size: e.size }),
        vpc_config: c.vpc_config.map(|v| VpcConfigResponse {
            subnet_ids: v.subnet_ids.unwrap_or_default(),
            security_group_ids: v.security_group_ids.unwrap_or_default(),
            vpc_id: v.vpc_id,
            ipv6_allowed_for_dual_stack: v.ipv6_allowed_for_dual_stack,
        }),
        environment: c.environment.map(|e| sorted(e.variables)),
        kms_key_arn: c.kms_key_arn,
        tracing_mode: c
            .tracing_config
            .and_then(|t| t.mode)
            .map(|m| m.as_str().to_string()),
        dead_letter_target_arn: c.dead_letter_config.and_then(|d| d.target_arn),
        layers: c
            .layers
            .unwrap_or_default()
            .into_iter()
            .filter_map(|l| l.arn)
            .collect(),
        file_system_configs: c
            .file_system_configs
            .unwrap_or_default()
            .into_iter()
            .map(|f| FileSystemConfig {
                arn: f.arn,
                local_mount_path: f.local_mount_path,
            })
            .collect(),
        image_config: c
            .image_config_response
            .and_then(|r| r.image_config)
            .map(|i| ImageConfig {
                command: i.command,
                entry_point: i.entry_point,
                working_directory: i.working_directory,
            }),
        snap_start_apply_on: c
            .snap_start
            .and_then(|s| s.apply_on)
            .map(|a| a.as_str().to_string()),
        logging_config: c.logging_config.map(|l| LoggingConfig {
            log_format: l.log_format.map(|f| f.as_str().to_string()),
            log_group: l.log_group,
            application_log_level: l.application_log_level.map(|v| v.as_str().to_string()),
            system_log_level: l.system_log_level.map(|v| v.as_str().to_string()),
        }),
        state: c.state.map(|s| s.as_str().to_string()),
        last_update_status: c.last_update_status.map(|s| s.as_str().to_string()),
    }
}

fn from_aws_alias(a: aws::AliasConfiguration) -> AliasRecord {
    AliasRecord {
        name: a.name.unwrap_or_default(),
        function_version: a.function_version.unwrap_or_default(),
        additional_version_weights: a
            .routing_config
            .and_then(|r| r.additional_version_weights)
            .map(|w| w.into_iter().collect())
            .unwrap_or_default(),
    }
}

fn to_aws_vpc(v: &VpcConfig) -> aws::VpcConfig {
    aws::VpcConfig::builder()
        .set_subnet_ids(Some(v.subnet_ids.clone()))
        .set_security_group_ids(Some(v.security_group_ids.clone()))
        .set_ipv6_allowed_for_dual_stack(v.ipv6_allowed_for_dual_stack)
        .build()
}

fn to_aws_environment(e: &Environment) -> aws::Environment {
    aws::Environment::builder()
        .set_variables(Some(e.variables.clone().into_iter().collect()))
        .build()
}

fn to_aws_dead_letter(d: &DeadLetterConfig) -> aws::DeadLetterConfig {
    aws::DeadLetterConfig::builder()
        .set_target_arn(d.target_arn.clone())
        .build()
}

fn to_aws_tracing(t: &TracingConfig) -> aws::TracingConfig {
    aws::TracingConfig::builder()
        .set_mode(t.mode.as_deref().map(aws::TracingMode::from))
        .build()
}

fn to_aws_image_config(i: &ImageConfig) -> aws::ImageConfig {
    aws::ImageConfig::builder()
        .set_command(i.command.clone())
        .set_entry_point(i.entry_point.clone())
        .set_working_directory(i.working_directory.clone())
        .build()
}

fn to_aws_ephemeral_storage(e: &EphemeralStorage) -> Result<aws::EphemeralStorage> {
    aws::EphemeralStorage::builder()
        .size(e.size)
        .build()
        .context("building EphemeralStorage")
}

fn to_aws_file_systems(fs: &[FileSystemConfig]) -> Result<Vec<aws::FileSystemConfig>> {
    fs.iter()
        .map(|f| {
            aws::FileSystemConfig::builder()
                .arn(&f.arn)
                .local_mount_path(&f.local_mount_path)
                .build()
                .context("building FileSystemConfig")
        })
        .collect()
}

fn to_aws_snap_start(s: &SnapStart) -> aws::SnapStart {
    aws::SnapStart::builder()
        .set_apply_on(s.apply_on.as_deref().map(aws::SnapStartApplyOn::from))
        .build()
}

fn to_aws_logging(l: &LoggingConfig) -> aws::LoggingConfig {
    aws::LoggingConfig::builder()
        .set_log_format(l.log_format.as_deref().map(aws::LogFormat::from))
        .set_log_group(l.log_group.clone())
        .set_application_log_level(
            l.application_log_level
                .as_deref()
                .map(aws::ApplicationLogLevel::from),
        )
        .set_system_log_level(l.system_log_level.as_deref().map(aws::SystemLogLevel::from))
        .build()
}

fn to_aws_architectures(architectures: &[String]) -> Option<Vec<aws::Architecture>> {
    (!architectures.is_empty()).then(|| {
        architectures
            .iter()
            .map(|a| aws::Architecture::from(a.as_str()))
            .collect()
    })
}

fn to_aws_routing(alias: &AliasRecord) -> Option<aws::AliasRoutingConfiguration> {
    Some(
        aws::AliasRoutingConfiguration::builder()
            .set_additional_version_weights(Some(
                alias
                    .additional_version_weights
                    .iter()
                    .map(|(k, v)| (k.clone(), *v))
                    .collect(),
            ))
            .build(),
    )
}

fn to_aws_code(code: &CodePayload) -> aws::FunctionCode {
    match code {
        CodePayload::Archive(bytes) => aws::FunctionCode::builder()
            .zip_file(Blob::new(bytes.clone()))
            .build(),
        CodePayload::Image(uri) => aws::FunctionCode::builder().image_uri(uri).build(),
    }
}

#[async_trait]
impl FunctionService for LambdaService {
    async fn get_function(&self, name: &str) -> Result<RemoteFunction> {
        let output = retry(&self.policy, &self.cancel, "GetFunction", || async {
            self.client
                .get_function()
                .function_name(name)
                .send()
                .await
                .map_err(|e| classify("GetFunction", name, e))
        })
        .await?;
        let configuration = output
            .configuration
            .map(from_aws_configuration)
            .with_context(|| format!("GetFunction returned no configuration for {}", name))?;
        Ok(RemoteFunction {
            configuration,
            code: output.code.map(|c| CodeLocation {
                repository_type: c.repository_type,
                location: c.location,
                image_uri: c.image_uri,
            }),
            tags: sorted(output.tags),
        })
    }

    async fn list_functions(&self, marker: Option<String>) -> Result<Page<FunctionConfiguration>> {
        let output = retry(&self.policy, &self.cancel, "ListFunctions", || async {
            self.client
                .list_functions()
                .set_marker(marker.clone())
                .send()
                .await
                .map_err(|e| classify("ListFunctions", "functions", e))
        })
        .await?;
        Ok(Page {
            items: output
                .functions
                .unwrap_or_default()
                .into_iter()
                .map(from_aws_configuration)
                .collect(),
            next_marker: output.next_marker,
        })
    }

    async fn create_function(&self, request: &CreateFunctionRequest) -> Result<String> {
        let def = &request.definition;
        let name = def.function_name.as_str();
        let package_type = match request.code {
            CodePayload::Archive(_) => PACKAGE_TYPE_ZIP,
            CodePayload::Image(_) => PACKAGE_TYPE_IMAGE,
        };
        let ephemeral_storage = def
            .ephemeral_storage
            .as_ref()
            .map(to_aws_ephemeral_storage)
            .transpose()?;
        let file_system_configs = def
            .file_system_configs
            .as_deref()
            .map(to_aws_file_systems)
            .transpose()?;
        let output = retry(&self.policy, &self.cancel, "CreateFunction", || async {
            self.client
                .create_function()
                .function_name(name)
                .package_type(aws::PackageType::from(package_type))
                .code(to_aws_code(&request.code))
                .publish(request.publish)
                .set_runtime(def.runtime.as_deref().map(aws::Runtime::from))
                .set_role(def.role.clone())
                .set_handler(def.handler.clone())
                .set_description(def.description.clone())
                .set_timeout(def.timeout)
                .set_memory_size(def.memory_size)
                .set_vpc_config(def.vpc_config.as_ref().map(to_aws_vpc))
                .set_environment(def.environment.as_ref().map(to_aws_environment))
                .set_dead_letter_config(def.dead_letter_config.as_ref().map(to_aws_dead_letter))
                .set_kms_key_arn(def.kms_key_arn.clone())
                .set_tracing_config(def.tracing_config.as_ref().map(to_aws_tracing))
                .set_layers(def.layers.clone())
                .set_file_system_configs(file_system_configs.clone())
                .set_image_config(def.image_config.as_ref().map(to_aws_image_config))
                .set_architectures(
                    def.architectures
                        .as_deref()
                        .and_then(to_aws_architectures),
                )
                .set_ephemeral_storage(ephemeral_storage.clone())
                .set_snap_start(def.snap_start.as_ref().map(to_aws_snap_start))
                .set_logging_config(def.logging_config.as_ref().map(to_aws_logging))
                .set_tags(
                    def.tags
                        .as_ref()
                        .map(|t| t.clone().into_iter().collect()),
                )
                .send()
                .await
                .map_err(|e| classify("CreateFunction", name, e))
        })
        .await?;
        Ok(output.version.unwrap_or_else(|| VERSION_LATEST.to_string()))
    }

    async fn update_function_configuration(
        &self,
        name: &str,
        update: &ConfigurationUpdate,
    ) -> Result<()> {
        let ephemeral_storage = update
            .ephemeral_storage
            .as_ref()
            .map(to_aws_ephemeral_storage)
            .transpose()?;
        let file_system_configs = update
            .file_system_configs
            .as_deref()
            .map(to_aws_file_systems)
            .transpose()?;
        retry(
            &self.policy,
            &self.cancel,
            "UpdateFunctionConfiguration",
            || async {
                self.client
                    .update_function_configuration()
                    .function_name(name)
                    .set_role(update.role.clone())
                    .set_handler(update.handler.clone())
                    .set_description(update.description.clone())
                    .set_timeout(update.timeout)
                    .set_memory_size(update.memory_size)
                    .set_vpc_config(update.vpc_config.as_ref().map(to_aws_vpc))
                    .set_environment(update.environment.as_ref().map(to_aws_environment))
                    .set_runtime(update.runtime.as_deref().map(aws::Runtime::from))
                    .set_dead_letter_config(
                        update.dead_letter_config.as_ref().map(to_aws_dead_letter),
                    )
                    .set_kms_key_arn(update.kms_key_arn.clone())
                    .set_tracing_config(update.tracing_config.as_ref().map(to_aws_tracing))
                    .set_layers(update.layers.clone())
                    .set_file_system_configs(file_system_configs.clone())
                    .set_image_config(update.image_config.as_ref().map(to_aws_image_config))
                    .set_ephemeral_storage(ephemeral_storage.clone())
                    .set_snap_start(update.snap_start.as_ref().map(to_aws_snap_start))
                    .set_logging_config(update.logging_config.as_ref().map(to_aws_logging))
                    .send()
                    .await
                    .map_err(|e| classify("UpdateFunctionConfiguration", name, e))
            },
        )
        .await?;
        Ok(())
    }

    async fn update_function_code(&self, name: &str, update: &CodeUpdateRequest) -> Result<()> {
        let (zip_file, image_uri) = match &update.code {
            CodePayload::Archive(bytes) => (Some(Blob::new(bytes.clone())), None),
            CodePayload::Image(uri) => (None, Some(uri.clone())),
        };
        retry(&self.policy, &self.cancel, "UpdateFunctionCode", || async {
            self.client
                .update_function_code()
                .function_name(name)
                .set_zip_file(zip_file.clone())
                .set_image_uri(image_uri.clone())
                .set_architectures(to_aws_architectures(&update.architectures))
                .send()
                .await
                .map_err(|e| classify("UpdateFunctionCode", name, e))
        })
        .await?;
        Ok(())
    }

    async fn publish_version(&self, name: &str) -> Result<String> {
        let output = retry(&self.policy, &self.cancel, "PublishVersion", || async {
            self.client
                .publish_version()
                .function_name(name)
                .send()
                .await
                .map_err(|e| classify("PublishVersion", name, e))
        })
        .await?;
        output
            .version
            .with_context(|| format!("PublishVersion returned no version for {}", name))
    }

    async fn tag_function(&self, arn: &str, tags: &BTreeMap<String, String>) -> Result<()> {
        let tags: HashMap<String, String> = tags.clone().into_iter().collect();
        retry(&self.policy, &self.cancel, "TagResource", || async {
            self.client
                .tag_resource()
                .resource(arn)
                .set_tags(Some(tags.clone()))
                .send()
                .await
                .map_err(|e| classify("TagResource", arn, e))
        })
        .await?;
        Ok(())
    }

    async fn untag_function(&self, arn: &str, keys: &[String]) -> Result<()> {
        retry(&self.policy, &self.cancel, "UntagResource", || async {
            self.client
                .untag_resource()
                .resource(arn)
                .set_tag_keys(Some(keys.to_vec()))
                .send()
                .await
                .map_err(|e| classify("UntagResource", arn, e))
        })
        .await?;
        Ok(())
    }

    async fn get_alias(&self, name: &str, alias: &str) -> Result<AliasRecord> {
        let resource = format!("alias {} of {}", alias, name);
        let output = retry(&self.policy, &self.cancel, "GetAlias", || async {
            self.client
                .get_alias()
                .function_name(name)
                .name(alias)
                .send()
                .await
                .map_err(|e| classify("GetAlias", &resource, e))
        })
        .await?;
        Ok(AliasRecord {
            name: output.name.unwrap_or_else(|| alias.to_string()),
            function_version: output.function_version.unwrap_or_default(),
            additional_version_weights: output
                .routing_config
                .and_then(|r| r.additional_version_weights)
                .map(|w| w.into_iter().collect())
                .unwrap_or_default(),
        })
    }

    async fn create_alias(&self, name: &str, alias: &AliasRecord) -> Result<()> {
        retry(&self.policy, &self.cancel, "CreateAlias", || async {
            self.client
                .create_alias()
                .function_name(name)
                .name(&alias.name)
                .function_version(&alias.function_version)
                .set_routing_config(to_aws_routing(alias))
                .send()
                .await
                .map_err(|e| classify("CreateAlias", name, e))
        })
        .await?;
        Ok(())
    }

    async fn update_alias(&self, name: &str, alias: &AliasRecord) -> Result<()> {
        retry(&self.policy, &self.cancel, "UpdateAlias", || async {
            self.client
                .update_alias()
                .function_name(name)
                .name(&alias.name)
                .function_version(&alias.function_version)
                .set_routing_config(to_aws_routing(alias))
                .send()
                .await
                .map_err(|e| classify("UpdateAlias", name, e))
        })
        .await?;
        Ok(())
    }

    async fn list_aliases(&self, name: &str, marker: Option<String>) -> Result<Page<AliasRecord>> {
        let output = retry(&self.policy, &self.cancel, "ListAliases", || async {
            self.client
                .list_aliases()
                .function_name(name)
                .set_marker(marker.clone())
                .send()
                .await
                .map_err(|e| classify("ListAliases", name, e))
        })
        .await?;
        Ok(Page {
            items: output
                .aliases
                .unwrap_or_default()
                .into_iter()
                .map(from_aws_alias)
                .collect(),
            next_marker: output.next_marker,
        })
    }

    async fn list_versions(
        &self,
        name: &str,
        marker: Option<String>,
    ) -> Result<Page<VersionInfo>> {
        let output = retry(&self.policy, &self.cancel, "ListVersionsByFunction", || async {
            self.client
                .list_versions_by_function()
                .function_name(name)
                .set_marker(marker.clone())
                .send()
                .await
                .map_err(|e| classify("ListVersionsByFunction", name, e))
        })
        .await?;
        let items = output
            .versions
            .unwrap_or_default()
            .into_iter()
            .map(|v| {
                let last_modified = parse_last_modified(v.last_modified.as_deref().unwrap_or(""))?;
                Ok(VersionInfo {
                    version: v.version.unwrap_or_default(),
                    last_modified,
                    runtime: v.runtime.map(|r| r.as_str().to_string()),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Page {
            items,
            next_marker: output.next_marker,
        })
    }

    async fn delete_function(&self, name: &str, qualifier: Option<&str>) -> Result<()> {
        let resource = match qualifier {
            Some(q) => format!("{}:{}", name, q),
            None => name.to_string(),
        };
        retry(&self.policy, &self.cancel, "DeleteFunction", || async {
            self.client
                .delete_function()
                .function_name(name)
                .set_qualifier(qualifier.map(str::to_string))
                .send()
                .await
                .map_err(|e| classify("DeleteFunction", &resource, e))
        })
        .await?;
        Ok(())
    }

    async fn invoke(&self, invocation: &Invocation) -> Result<InvocationResult> {
        let invocation_type = if invocation.asynchronous {
            aws::InvocationType::Event
        } else {
            aws::InvocationType::RequestResponse
        };
        let name = invocation.function_name.as_str();
        let output = retry(&self.policy, &self.cancel, "Invoke", || async {
            self.client
                .invoke()
                .function_name(name)
                .set_qualifier(invocation.qualifier.clone())
                .invocation_type(invocation_type.clone())
                .payload(Blob::new(invocation.payload.clone()))
                .send()
                .await
                .map_err(|e| classify("Invoke", name, e))
        })
        .await?;
        Ok(InvocationResult {
            status_code: output.status_code,
            function_error: output.function_error,
            executed_version: output.executed_version,
            payload: output.payload.map(Blob::into_inner).unwrap_or_default(),
        })
    }
}
