//! Snapshot of a deployed function, independent of any SDK types, and the
//! mirror that turns it back into a [`ResourceDefinition`].

use std::collections::BTreeMap;

use serde::Serialize;

use crate::definition::{
    BackingType, CodeReference, DeadLetterConfig, EphemeralStorage, Environment, FileSystemConfig,
    ImageConfig, LoggingConfig, ResourceDefinition, SnapStart, TracingConfig, VpcConfig,
    PACKAGE_TYPE_IMAGE,
};

pub const REPOSITORY_TYPE_ECR: &str = "ECR";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct VpcConfigResponse {
    pub subnet_ids: Vec<String>,
    pub security_group_ids: Vec<String>,
    pub vpc_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6_allowed_for_dual_stack: Option<bool>,
}

/// The configuration half of a function as the service reports it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FunctionConfiguration {
    pub function_name: String,
    pub function_arn: Option<String>,
    pub runtime: Option<String>,
    pub role: Option<String>,
    pub handler: Option<String>,
    pub description: Option<String>,
    pub code_size: i64,
    pub code_sha256: Option<String>,
    pub memory_size: Option<i32>,
    pub timeout: Option<i32>,
    pub last_modified: Option<String>,
    pub version: Option<String>,
    pub package_type: Option<String>,
    pub architectures: Vec<String>,
    pub ephemeral_storage: Option<EphemeralStorage>,
    pub vpc_config: Option<VpcConfigResponse>,
    pub environment: Option<BTreeMap<String, String>>,
    #[serde(rename = "KMSKeyArn")]
    pub kms_key_arn: Option<String>,
    pub tracing_mode: Option<String>,
    pub dead_letter_target_arn: Option<String>,
    pub layers: Vec<String>,
    pub file_system_configs: Vec<FileSystemConfig>,
    pub image_config: Option<ImageConfig>,
    pub snap_start_apply_on: Option<String>,
    pub logging_config: Option<LoggingConfig>,
    pub state: Option<String>,
    pub last_update_status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CodeLocation {
    pub repository_type: Option<String>,
    pub location: Option<String>,
    pub image_uri: Option<String>,
}

/// Everything `GetFunction` tells us about one function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoteFunction {
    pub configuration: FunctionConfiguration,
    pub code: Option<CodeLocation>,
    pub tags: BTreeMap<String, String>,
}

impl RemoteFunction {
    pub fn name(&self) -> &str {
        &self.configuration.function_name
    }

    pub fn arn(&self) -> Option<&str> {
        self.configuration.function_arn.as_deref()
    }

    pub fn code_sha256(&self) -> Option<&str> {
        self.configuration.code_sha256.as_deref()
    }

    pub fn image_uri(&self) -> Option<&str> {
        self.code.as_ref().and_then(|code| code.image_uri.as_deref())
    }

    pub fn backing_type(&self) -> BackingType {
        let from_ecr = self
            .code
            .as_ref()
            .and_then(|code| code.repository_type.as_deref())
            == Some(REPOSITORY_TYPE_ECR);
        let declared_image =
            self.configuration.package_type.as_deref() == Some(PACKAGE_TYPE_IMAGE);
        if from_ecr || declared_image {
            BackingType::Image
        } else {
            BackingType::Archive
        }
    }

    /// Reconstruct the definition that would produce this function.
    ///
    /// The result is not normalized; run it through
    /// [`crate::normalize::normalize`] before comparing.
    pub fn to_definition(&self) -> ResourceDefinition {
        let c = &self.configuration;
        let code = match self.backing_type() {
            BackingType::Image => CodeReference::Image {
                uri: self.image_uri().unwrap_or_default().to_string(),
            },
            BackingType::Archive => CodeReference::Archive,
        };
        let vpc_config = c
            .vpc_config
            .as_ref()
            .filter(|vpc| vpc.vpc_id.as_deref().is_some_and(|id| !id.is_empty()))
            .map(|vpc| VpcConfig {
                subnet_ids: vpc.subnet_ids.clone(),
                security_group_ids: vpc.security_group_ids.clone(),
                ipv6_allowed_for_dual_stack: vpc.ipv6_allowed_for_dual_stack,
            });
        ResourceDefinition {
            function_name: c.function_name.clone(),
            code,
            architectures: Some(c.architectures.clone()),
            description: c.description.clone(),
            handler: c.handler.clone(),
            runtime: c.runtime.clone(),
            role: c.role.clone(),
            memory_size: c.memory_size,
            timeout: c.timeout,
            ephemeral_storage: c.ephemeral_storage.clone(),
            environment: c.environment.as_ref().map(|variables| Environment {
                variables: variables.clone(),
            }),
            vpc_config,
            dead_letter_config: c.dead_letter_target_arn.as_ref().map(|arn| DeadLetterConfig {
                target_arn: Some(arn.clone()),
            }),
            kms_key_arn: c.kms_key_arn.clone(),
            tracing_config: c.tracing_mode.as_ref().map(|mode| TracingConfig {
                mode: Some(mode.clone()),
            }),
            layers: (!c.layers.is_empty()).then(|| c.layers.clone()),
            file_system_configs: (!c.file_system_configs.is_empty())
                .then(|| c.file_system_configs.clone()),
            image_config: c.image_config.clone(),
            snap_start: c.snap_start_apply_on.as_ref().map(|apply_on| SnapStart {
                apply_on: Some(apply_on.clone()),
            }),
            logging_config: c.logging_config.clone(),
            tags: (!self.tags.is_empty()).then(|| self.tags.clone()),
        }
    }
}
