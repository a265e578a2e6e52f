//! Envelope encryption settings for Kubernetes secrets

use serde::{Deserialize, Serialize};

use keel_common::{Error, Result};

/// The only resource kind that can be envelope encrypted
pub const SECRETS_RESOURCE: &str = "secrets";

/// One encryption configuration entry of a cluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionConfig {
    /// ARN of the KMS key used to encrypt data keys
    pub provider_key_arn: String,
    /// Resources to encrypt; must be exactly `["secrets"]`
    #[serde(default)]
    pub resources: Vec<String>,
}

/// Region component of an ARN (`arn:partition:service:region:account:resource`)
fn arn_region(arn: &str) -> Option<&str> {
    let parts: Vec<&str> = arn.splitn(6, ':').collect();
    match parts.as_slice() {
        ["arn", _, _, region, _, _] if !region.is_empty() => Some(*region),
        _ => None,
    }
}

/// Validate a cluster's encryption configuration
///
/// No configuration means secrets are stored unencrypted, which is allowed.
/// Each entry must reference a key in the cluster's region and encrypt
/// exactly the `secrets` resource.
pub fn validate_encryption_config(
    cluster: &str,
    region: &str,
    configs: &[EncryptionConfig],
) -> Result<()> {
    let mut errors = Vec::new();

    for config in configs {
        match arn_region(&config.provider_key_arn) {
            None => errors.push(Error::validation_for_field(
                cluster,
                "providerKeyArn",
                format!("{} is not a valid key ARN", config.provider_key_arn),
            )),
            Some(key_region) if key_region != region => {
                errors.push(Error::validation_for_field(
                    cluster,
                    "providerKeyArn",
                    format!(
                        "encryption key region {key_region} does not match cluster region {region}"
                    ),
                ))
            }
            Some(_) => {}
        }

        if config.resources.len() != 1 || config.resources[0] != SECRETS_RESOURCE {
            errors.push(Error::validation_for_field(
                cluster,
                "resources",
                format!(
                    "encryption resources must be exactly [\"{SECRETS_RESOURCE}\"], got {:?}",
                    config.resources
                ),
            ));
        }
    }

    Error::combine(errors)
}
