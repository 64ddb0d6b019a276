use std::collections::BTreeMap;

use rolegate_core::{AppError, AppResult};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::Capability;

/// Durable id of the current dynamic configuration version.
pub const DYNAMIC_CONFIG_MASTER_ID: &str = "master";

/// Role a group may assume, read from the `role_mappings` config section.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleMapping {
    /// Role ARN.
    pub arn: String,
    /// Whether the role is only offered for console sessions.
    #[serde(default)]
    pub console_only: bool,
}

/// Runtime configuration blob edited by administrators.
///
/// The document is a JSON object. Recognised sections:
///
/// - `admins`: list of users or groups with every capability
/// - `capabilities.<name>`: per-capability allow-lists
/// - `self_approval_groups`: groups whose members auto-approve their requests
/// - `role_mappings.<group>`: roles granted to a group
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DynamicConfigDocument(Map<String, Value>);

impl DynamicConfigDocument {
    /// Creates a document from a JSON value, which must be an object.
    pub fn from_value(value: Value) -> AppResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(AppError::Validation(
                "dynamic configuration must be a JSON object".to_owned(),
            )),
        }
    }

    /// Parses a document from JSON text.
    pub fn parse(text: &str) -> AppResult<Self> {
        let value = serde_json::from_str::<Value>(text).map_err(|error| {
            AppError::Validation(format!("dynamic configuration is not valid JSON: {error}"))
        })?;
        Self::from_value(value)
    }

    /// Returns the document as a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Returns the canonical serialisation with sorted keys.
    pub fn canonical_bytes(&self) -> AppResult<Vec<u8>> {
        serde_json::to_vec(&Canonical(&Value::Object(self.0.clone()))).map_err(|error| {
            AppError::Internal(format!("failed to serialize dynamic configuration: {error}"))
        })
    }

    /// Returns the hex SHA-256 checksum of the canonical serialisation.
    pub fn checksum(&self) -> AppResult<String> {
        let digest = Sha256::digest(self.canonical_bytes()?);
        Ok(hex::encode(digest))
    }

    /// Returns users and groups with every capability.
    #[must_use]
    pub fn admins(&self) -> Vec<String> {
        string_list(self.0.get("admins"))
    }

    /// Returns the dynamic allow-list for one capability.
    #[must_use]
    pub fn capability_allow_list(&self, capability: Capability) -> Vec<String> {
        string_list(
            self.0
                .get("capabilities")
                .and_then(|section| section.get(capability.as_str())),
        )
    }

    /// Returns groups whose members auto-approve their own requests.
    #[must_use]
    pub fn self_approval_groups(&self) -> Vec<String> {
        string_list(self.0.get("self_approval_groups"))
    }

    /// Returns the role mappings configured for one group.
    #[must_use]
    pub fn role_mappings_for_group(&self, group: &str) -> Vec<RoleMapping> {
        let Some(section) = self.0.get("role_mappings").and_then(Value::as_object) else {
            return Vec::new();
        };

        section
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case(group))
            .filter_map(|(_, entries)| entries.as_array())
            .flatten()
            .filter_map(|entry| match entry {
                Value::String(arn) => Some(RoleMapping {
                    arn: arn.clone(),
                    console_only: false,
                }),
                other => serde_json::from_value::<RoleMapping>(other.clone()).ok(),
            })
            .collect()
    }
}

/// Serialises a JSON value with object keys sorted at every depth.
struct Canonical<'a>(&'a Value);

impl Serialize for Canonical<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Value::Object(map) => map
                .iter()
                .map(|(key, value)| (key.as_str(), Canonical(value)))
                .collect::<BTreeMap<_, _>>()
                .serialize(serializer),
            Value::Array(values) => values
                .iter()
                .map(Canonical)
                .collect::<Vec<_>>()
                .serialize(serializer),
            other => other.serialize(serializer),
        }
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(|value| value.trim().to_lowercase())
                .filter(|value| !value.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
