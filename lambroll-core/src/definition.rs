//! The function definition: what a `function.json` file describes.
//!
//! The file format uses the PascalCase member names of the Lambda API.
//! In memory the code reference is a proper sum type, so a definition that
//! is both image-backed and archive-backed cannot be represented.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

pub const PACKAGE_TYPE_ZIP: &str = "Zip";
pub const PACKAGE_TYPE_IMAGE: &str = "Image";

/// How the function code is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackingType {
    Archive,
    Image,
}

impl Display for BackingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackingType::Archive => f.write_str(PACKAGE_TYPE_ZIP),
            BackingType::Image => f.write_str(PACKAGE_TYPE_IMAGE),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CodeReference {
    /// The code is uploaded as a zip archive at deploy time.
    #[default]
    Archive,
    /// The code is a container image already pushed to a registry.
    Image { uri: String },
}

impl CodeReference {
    pub fn backing_type(&self) -> BackingType {
        match self {
            CodeReference::Archive => BackingType::Archive,
            CodeReference::Image { .. } => BackingType::Image,
        }
    }

    pub fn image_uri(&self) -> Option<&str> {
        match self {
            CodeReference::Archive => None,
            CodeReference::Image { uri } => Some(uri),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EphemeralStorage {
    pub size: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Environment {
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VpcConfig {
    #[serde(default)]
    pub subnet_ids: Vec<String>,
    #[serde(default)]
    pub security_group_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6_allowed_for_dual_stack: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeadLetterConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_arn: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TracingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileSystemConfig {
    pub arn: String,
    pub local_mount_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SnapStart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_on: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoggingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_log_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_log_level: Option<String>,
}

/// The desired (or mirrored) configuration of one function.
///
/// `None` means "not specified". The normalizer turns the fields the service
/// defaults into concrete values, so only normalized definitions should be
/// compared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DefinitionFile", into = "DefinitionFile")]
pub struct ResourceDefinition {
    pub function_name: String,
    pub code: CodeReference,
    pub architectures: Option<Vec<String>>,
    pub description: Option<String>,
    pub handler: Option<String>,
    pub runtime: Option<String>,
    pub role: Option<String>,
    pub memory_size: Option<i32>,
    pub timeout: Option<i32>,
    pub ephemeral_storage: Option<EphemeralStorage>,
    pub environment: Option<Environment>,
    pub vpc_config: Option<VpcConfig>,
    pub dead_letter_config: Option<DeadLetterConfig>,
    pub kms_key_arn: Option<String>,
    pub tracing_config: Option<TracingConfig>,
    pub layers: Option<Vec<String>>,
    pub file_system_configs: Option<Vec<FileSystemConfig>>,
    pub image_config: Option<ImageConfig>,
    pub snap_start: Option<SnapStart>,
    pub logging_config: Option<LoggingConfig>,
    pub tags: Option<BTreeMap<String, String>>,
}

impl ResourceDefinition {
    pub fn new(function_name: impl Into<String>) -> Self {
        ResourceDefinition {
            function_name: function_name.into(),
            ..Default::default()
        }
    }

    pub fn backing_type(&self) -> BackingType {
        self.code.backing_type()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
struct CodeFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image_uri: Option<String>,
}

/// Wire form of [`ResourceDefinition`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
struct DefinitionFile {
    function_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    package_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    code: Option<CodeFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    architectures: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    handler: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    runtime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    memory_size: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timeout: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ephemeral_storage: Option<EphemeralStorage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    environment: Option<Environment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vpc_config: Option<VpcConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dead_letter_config: Option<DeadLetterConfig>,
    #[serde(
        rename = "KMSKeyArn",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    kms_key_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tracing_config: Option<TracingConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    layers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file_system_configs: Option<Vec<FileSystemConfig>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image_config: Option<ImageConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    snap_start: Option<SnapStart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    logging_config: Option<LoggingConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tags: Option<BTreeMap<String, String>>,
}

impl TryFrom<DefinitionFile> for ResourceDefinition {
    type Error = String;

    fn try_from(file: DefinitionFile) -> Result<Self, Self::Error> {
        let image_uri = file.code.and_then(|code| code.image_uri);
        let code = match (file.package_type.as_deref(), image_uri) {
            (None | Some(PACKAGE_TYPE_ZIP), None) => CodeReference::Archive,
            (None | Some(PACKAGE_TYPE_IMAGE), Some(uri)) => CodeReference::Image { uri },
            (Some(PACKAGE_TYPE_IMAGE), None) => {
                return Err("PackageType Image requires Code.ImageUri".to_string())
            }
            (Some(PACKAGE_TYPE_ZIP), Some(_)) => {
                return Err("Code.ImageUri cannot be combined with PackageType Zip".to_string())
            }
            (Some(other), _) => return Err(format!("unknown PackageType {:?}", other)),
        };
        if file.function_name.is_empty() {
            return Err("FunctionName must not be empty".to_string());
        }
        Ok(ResourceDefinition {
            function_name: file.function_name,
            code,
            architectures: file.architectures,
            description: file.description,
            handler: file.handler,
            runtime: file.runtime,
            role: file.role,
            memory_size: file.memory_size,
            timeout: file.timeout,
            ephemeral_storage: file.ephemeral_storage,
            environment: file.environment,
            vpc_config: file.vpc_config,
            dead_letter_config: file.dead_letter_config,
            kms_key_arn: file.kms_key_arn,
            tracing_config: file.tracing_config,
            layers: file.layers,
            file_system_configs: file.file_system_configs,
            image_config: file.image_config,
            snap_start: file.snap_start,
            logging_config: file.logging_config,
            tags: file.tags,
        })
    }
}

impl From<ResourceDefinition> for DefinitionFile {
    fn from(def: ResourceDefinition) -> Self {
        let (package_type, code) = match def.code {
            CodeReference::Archive => (None, None),
            CodeReference::Image { uri } => (
                Some(PACKAGE_TYPE_IMAGE.to_string()),
                Some(CodeFile {
                    image_uri: Some(uri),
                }),
            ),
        };
        DefinitionFile {
            function_name: def.function_name,
            package_type,
            code,
            architectures: def.architectures,
            description: def.description,
            handler: def.handler,
            runtime: def.runtime,
            role: def.role,
            memory_size: def.memory_size,
            timeout: def.timeout,
            ephemeral_storage: def.ephemeral_storage,
            environment: def.environment,
            vpc_config: def.vpc_config,
            dead_letter_config: def.dead_letter_config,
            kms_key_arn: def.kms_key_arn,
            tracing_config: def.tracing_config,
            layers: def.layers,
            file_system_configs: def.file_system_configs,
            image_config: def.image_config,
            snap_start: def.snap_start,
            logging_config: def.logging_config,
            tags: def.tags,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_archive_definition() {
        let def: ResourceDefinition = serde_json::from_value(json!({
            "FunctionName": "hello",
            "Handler": "index.handler",
            "Runtime": "nodejs20.x",
            "MemorySize": 256,
            "KMSKeyArn": "arn:aws:kms:us-east-1:123456789012:key/abc",
            "Environment": { "Variables": { "GREETING": "hi" } }
        }))
        .unwrap();
        assert_eq!(def.function_name, "hello");
        assert_eq!(def.code, CodeReference::Archive);
        assert_eq!(def.memory_size, Some(256));
        assert_eq!(
            def.kms_key_arn.as_deref(),
            Some("arn:aws:kms:us-east-1:123456789012:key/abc")
        );
        assert_eq!(
            def.environment.unwrap().variables.get("GREETING").unwrap(),
            "hi"
        );
    }

    #[test]
    fn image_uri_implies_image_backing() {
        let def: ResourceDefinition = serde_json::from_value(json!({
            "FunctionName": "img",
            "Code": { "ImageUri": "123456789012.dkr.ecr.us-east-1.amazonaws.com/app:v1" }
        }))
        .unwrap();
        assert_eq!(def.backing_type(), BackingType::Image);
        assert_eq!(
            def.code.image_uri(),
            Some("123456789012.dkr.ecr.us-east-1.amazonaws.com/app:v1")
        );
    }

    #[test]
    fn image_package_without_uri_is_rejected() {
        let err = serde_json::from_value::<ResourceDefinition>(json!({
            "FunctionName": "img",
            "PackageType": "Image"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("ImageUri"), "{}", err);
    }

    #[test]
    fn unknown_members_are_rejected() {
        let err = serde_json::from_value::<ResourceDefinition>(json!({
            "FunctionName": "hello",
            "MemorySiz": 128
        }))
        .unwrap_err();
        assert!(err.to_string().contains("MemorySiz"), "{}", err);
    }

    #[test]
    fn missing_function_name_is_rejected() {
        assert!(serde_json::from_value::<ResourceDefinition>(json!({ "Handler": "x" })).is_err());
        assert!(serde_json::from_value::<ResourceDefinition>(json!({ "FunctionName": "" })).is_err());
    }

    #[test]
    fn serializes_back_to_file_form() {
        let mut def = ResourceDefinition::new("img");
        def.code = CodeReference::Image {
            uri: "repo/app:v2".to_string(),
        };
        def.kms_key_arn = Some("key".to_string());
        let value = serde_json::to_value(&def).unwrap();
        assert_eq!(
            value,
            json!({
                "FunctionName": "img",
                "PackageType": "Image",
                "Code": { "ImageUri": "repo/app:v2" },
                "KMSKeyArn": "key"
            })
        );
        let back: ResourceDefinition = serde_json::from_value(value).unwrap();
        assert_eq!(back, def);
    }
}
