use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use rolegate_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Cache key of one IAM role: the role ARN plus its owning account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleKey {
    account_id: String,
    arn: String,
}

impl RoleKey {
    /// Creates a validated role key.
    ///
    /// The ARN must be an IAM role ARN (`arn:<partition>:iam::<account>:role/<path/name>`)
    /// whose account segment matches `account_id`.
    pub fn new(account_id: impl Into<String>, arn: impl Into<String>) -> AppResult<Self> {
        let account_id = account_id.into().trim().to_owned();
        let arn = arn.into().trim().to_owned();

        if account_id.len() != 12 || !account_id.chars().all(|value| value.is_ascii_digit()) {
            return Err(AppError::Validation(format!(
                "account id '{account_id}' must be 12 digits"
            )));
        }

        let segments: Vec<&str> = arn.splitn(6, ':').collect();
        if segments.len() != 6 || segments[0] != "arn" || segments[2] != "iam" {
            return Err(AppError::Validation(format!(
                "'{arn}' is not an IAM ARN"
            )));
        }

        if segments[4] != account_id {
            return Err(AppError::Validation(format!(
                "role arn '{arn}' does not belong to account '{account_id}'"
            )));
        }

        let Some(resource) = segments[5].strip_prefix("role/") else {
            return Err(AppError::Validation(format!(
                "'{arn}' is not an IAM role ARN"
            )));
        };

        if resource.rsplit('/').next().is_none_or(str::is_empty) {
            return Err(AppError::Validation(format!(
                "role arn '{arn}' has an empty role name"
            )));
        }

        Ok(Self { account_id, arn })
    }

    /// Returns the owning account identifier.
    #[must_use]
    pub fn account_id(&self) -> &str {
        self.account_id.as_str()
    }

    /// Returns the role ARN.
    #[must_use]
    pub fn arn(&self) -> &str {
        self.arn.as_str()
    }

    /// Returns the role name, the last path segment of the ARN.
    #[must_use]
    pub fn role_name(&self) -> &str {
        self.arn.rsplit('/').next().unwrap_or(self.arn.as_str())
    }
}

impl Display for RoleKey {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}@{}", self.arn, self.account_id)
    }
}

/// Managed policy attached to a role.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ManagedPolicyAttachment {
    /// Managed policy name.
    pub policy_name: String,
    /// Managed policy ARN.
    pub policy_arn: String,
}

/// Canonical role document merged from every IAM read needed to describe a role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleDocument {
    /// Role ARN.
    pub arn: String,
    /// Owning account.
    pub account_id: String,
    /// Role name.
    pub role_name: String,
    /// Stable IAM role id.
    pub role_id: String,
    /// Trust policy.
    pub assume_role_policy_document: Value,
    /// Inline policies keyed by policy name.
    pub inline_policies: BTreeMap<String, Value>,
    /// Attached managed policies, sorted by ARN.
    pub managed_policies: Vec<ManagedPolicyAttachment>,
    /// Role tags.
    pub tags: BTreeMap<String, String>,
    /// Template source path when the role is generated from one.
    pub templated: Option<String>,
    /// Epoch seconds of the cloud read that produced this document.
    pub fetched_at: i64,
}

impl RoleDocument {
    /// Returns the cache key for this document.
    pub fn key(&self) -> AppResult<RoleKey> {
        RoleKey::new(self.account_id.as_str(), self.arn.as_str())
    }

    /// Checks that this document describes the role behind `key`.
    ///
    /// The ARN must name the key's account and the same role name, compared
    /// case-insensitively as IAM does. A document read through credentials of
    /// another account fails here instead of being cached under `key`.
    pub fn ensure_describes(&self, key: &RoleKey) -> AppResult<()> {
        let document_key = RoleKey::new(key.account_id(), self.arn.as_str()).map_err(|_| {
            AppError::Internal(format!(
                "cloud returned role '{}' for '{}' in account '{}'",
                self.arn,
                key.arn(),
                key.account_id()
            ))
        })?;

        if self.account_id != key.account_id()
            || !document_key
                .role_name()
                .eq_ignore_ascii_case(key.role_name())
        {
            return Err(AppError::Internal(format!(
                "cloud returned role '{}' in account '{}' for '{}'",
                self.arn,
                self.account_id,
                key.arn()
            )));
        }

        Ok(())
    }

    /// Sorts collection fields so equal cloud state always serialises identically.
    #[must_use]
    pub fn canonicalized(mut self) -> Self {
        self.managed_policies.sort();
        self.managed_policies.dedup();
        self
    }

    /// Serialises the canonical document for storage.
    pub fn to_policy_json(&self) -> AppResult<String> {
        serde_json::to_string(self).map_err(|error| {
            AppError::Internal(format!(
                "failed to serialize role document '{}': {error}",
                self.arn
            ))
        })
    }

    /// Restores a document previously produced by [`RoleDocument::to_policy_json`].
    pub fn from_policy_json(value: &str) -> AppResult<Self> {
        serde_json::from_str(value).map_err(|error| {
            AppError::Internal(format!("failed to parse cached role document: {error}"))
        })
    }

    /// Returns whether the managed policy is attached.
    #[must_use]
    pub fn has_managed_policy(&self, policy_arn: &str) -> bool {
        self.managed_policies
            .iter()
            .any(|policy| policy.policy_arn == policy_arn)
    }
}
