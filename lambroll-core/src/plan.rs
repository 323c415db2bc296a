//! Decide which mutations bring a deployed function in line with its
//! definition.

use std::collections::BTreeMap;

use crate::definition::{
    BackingType, CodeReference, DeadLetterConfig, EphemeralStorage, Environment,
    FileSystemConfig, ImageConfig, LoggingConfig, ResourceDefinition, SnapStart, TracingConfig,
    VpcConfig,
};
use crate::error::Error;
use crate::normalize::{normalize, NormalizedDefinition};
use crate::remote::RemoteFunction;

/// Refuse to switch between archive and image code on an existing function.
pub fn ensure_compatible_code(current: BackingType, desired: BackingType) -> Result<(), Error> {
    if current == desired {
        Ok(())
    } else {
        Err(Error::CodeTypeMismatch { current, desired })
    }
}

/// Only the fields that differ; `None` means "leave as is".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigurationUpdate {
    pub role: Option<String>,
    pub handler: Option<String>,
    pub description: Option<String>,
    pub timeout: Option<i32>,
    pub memory_size: Option<i32>,
    pub vpc_config: Option<VpcConfig>,
    pub environment: Option<Environment>,
    pub runtime: Option<String>,
    pub dead_letter_config: Option<DeadLetterConfig>,
    pub kms_key_arn: Option<String>,
    pub tracing_config: Option<TracingConfig>,
    pub layers: Option<Vec<String>>,
    pub file_system_configs: Option<Vec<FileSystemConfig>>,
    pub image_config: Option<ImageConfig>,
    pub ephemeral_storage: Option<EphemeralStorage>,
    pub snap_start: Option<SnapStart>,
    pub logging_config: Option<LoggingConfig>,
}

/// `desired` if it differs from `current`; `clear` supplies the value that
/// removes a setting the definition no longer mentions.
fn changed<T: PartialEq + Clone>(
    current: &Option<T>,
    desired: &Option<T>,
    clear: impl FnOnce() -> Option<T>,
) -> Option<T> {
    if current == desired {
        None
    } else {
        desired.clone().or_else(clear)
    }
}

fn keep<T>() -> Option<T> {
    None
}

impl ConfigurationUpdate {
    pub fn between(current: &ResourceDefinition, desired: &ResourceDefinition) -> Self {
        ConfigurationUpdate {
            role: changed(&current.role, &desired.role, keep),
            handler: changed(&current.handler, &desired.handler, keep),
            description: changed(&current.description, &desired.description, || {
                Some(String::new())
            }),
            timeout: changed(&current.timeout, &desired.timeout, keep),
            memory_size: changed(&current.memory_size, &desired.memory_size, keep),
            vpc_config: changed(&current.vpc_config, &desired.vpc_config, || {
                Some(VpcConfig::default())
            }),
            environment: changed(&current.environment, &desired.environment, || {
                Some(Environment::default())
            }),
            runtime: changed(&current.runtime, &desired.runtime, keep),
            dead_letter_config: changed(
                &current.dead_letter_config,
                &desired.dead_letter_config,
                || {
                    Some(DeadLetterConfig {
                        target_arn: Some(String::new()),
                    })
                },
            ),
            kms_key_arn: changed(&current.kms_key_arn, &desired.kms_key_arn, || {
                Some(String::new())
            }),
            tracing_config: changed(&current.tracing_config, &desired.tracing_config, keep),
            layers: changed(&current.layers, &desired.layers, || Some(Vec::new())),
            file_system_configs: changed(
                &current.file_system_configs,
                &desired.file_system_configs,
                || Some(Vec::new()),
            ),
            image_config: changed(&current.image_config, &desired.image_config, || {
                Some(ImageConfig::default())
            }),
            ephemeral_storage: changed(
                &current.ephemeral_storage,
                &desired.ephemeral_storage,
                keep,
            ),
            snap_start: changed(&current.snap_start, &desired.snap_start, keep),
            logging_config: changed(&current.logging_config, &desired.logging_config, keep),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changed_fields().is_empty()
    }

    /// Member names of the fields this update touches.
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let fields = [
            ("Role", self.role.is_some()),
            ("Handler", self.handler.is_some()),
            ("Description", self.description.is_some()),
            ("Timeout", self.timeout.is_some()),
            ("MemorySize", self.memory_size.is_some()),
            ("VpcConfig", self.vpc_config.is_some()),
            ("Environment", self.environment.is_some()),
            ("Runtime", self.runtime.is_some()),
            ("DeadLetterConfig", self.dead_letter_config.is_some()),
            ("KMSKeyArn", self.kms_key_arn.is_some()),
            ("TracingConfig", self.tracing_config.is_some()),
            ("Layers", self.layers.is_some()),
            ("FileSystemConfigs", self.file_system_configs.is_some()),
            ("ImageConfig", self.image_config.is_some()),
            ("EphemeralStorage", self.ephemeral_storage.is_some()),
            ("SnapStart", self.snap_start.is_some()),
            ("LoggingConfig", self.logging_config.is_some()),
        ];
        fields
            .into_iter()
            .filter_map(|(name, set)| set.then_some(name))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagUpdate {
    pub set: BTreeMap<String, String>,
    pub remove: Vec<String>,
}

impl TagUpdate {
    /// A definition without `Tags` leaves the function's tags alone.
    pub fn between(
        current: &BTreeMap<String, String>,
        desired: Option<&BTreeMap<String, String>>,
    ) -> Self {
        let Some(desired) = desired else {
            return TagUpdate::default();
        };
        TagUpdate {
            set: desired
                .iter()
                .filter(|(k, v)| current.get(*k) != Some(*v))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            remove: current
                .keys()
                .filter(|k| !desired.contains_key(*k))
                .cloned()
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.remove.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeChange {
    /// Upload the local archive, whose digest is given.
    Archive { sha256: String },
    Image { uri: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePlan {
    pub configuration: ConfigurationUpdate,
    pub tags: TagUpdate,
    pub code: Option<CodeChange>,
    /// Sent along with a code update.
    pub architectures: Vec<String>,
}

impl UpdatePlan {
    pub fn is_empty(&self) -> bool {
        self.configuration.is_empty() && self.tags.is_empty() && self.code.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployPlan {
    Create(NormalizedDefinition),
    Update(UpdatePlan),
    Unchanged,
}

/// Plan a deployment.
///
/// `local_digest` is the digest of the archive about to be uploaded, or
/// `None` when the archive is not part of this deployment.
pub fn plan_deploy(
    current: Option<&RemoteFunction>,
    desired: &NormalizedDefinition,
    local_digest: Option<&str>,
) -> Result<DeployPlan, Error> {
    let Some(current) = current else {
        return Ok(DeployPlan::Create(desired.clone()));
    };
    ensure_compatible_code(current.backing_type(), desired.backing_type())?;
    let mirrored = normalize(current.to_definition());

    let architectures = desired.architectures.clone().unwrap_or_default();
    let architectures_changed = mirrored.architectures != desired.architectures;
    let code = match &desired.code {
        CodeReference::Archive => match local_digest {
            Some(digest) if architectures_changed || current.code_sha256() != Some(digest) => {
                Some(CodeChange::Archive {
                    sha256: digest.to_string(),
                })
            }
            Some(_) => None,
            None if architectures_changed => {
                return Err(Error::Usage(
                    "Architectures can only change together with the function code".to_string(),
                ))
            }
            None => None,
        },
        CodeReference::Image { uri } => {
            (architectures_changed || current.image_uri() != Some(uri.as_str()))
                .then(|| CodeChange::Image { uri: uri.clone() })
        }
    };

    let plan = UpdatePlan {
        configuration: ConfigurationUpdate::between(&mirrored, desired),
        tags: TagUpdate::between(&current.tags, desired.tags.as_ref()),
        code,
        architectures,
    };
    if plan.is_empty() {
        Ok(DeployPlan::Unchanged)
    } else {
        Ok(DeployPlan::Update(plan))
    }
}
