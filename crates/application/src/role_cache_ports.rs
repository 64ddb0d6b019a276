use async_trait::async_trait;
use rolegate_core::AppResult;
use rolegate_domain::{RoleDocument, RoleKey};
use serde_json::Value;

/// Outcome of a role lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum RoleLookup {
    /// The role exists.
    Found(RoleDocument),
    /// The cloud provider reported that the role does not exist.
    Missing,
}

impl RoleLookup {
    /// Returns the role when it was found.
    #[must_use]
    pub fn into_role(self) -> Option<RoleDocument> {
        match self {
            Self::Found(role) => Some(role),
            Self::Missing => None,
        }
    }
}

/// Fast-tier role entry.
#[derive(Debug, Clone, PartialEq)]
pub struct FastTierRole {
    /// Cached role document.
    pub role: RoleDocument,
    /// Epoch seconds when the entry was written.
    pub cached_at: i64,
}

/// Durable-tier role row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurableRoleRecord {
    /// Role ARN, the partition key.
    pub arn: String,
    /// Owning account, the sort key.
    pub account_id: String,
    /// Serialised canonical role document.
    pub policy: String,
    /// Template source path, when templated.
    pub templated: Option<String>,
    /// Eviction horizon in epoch seconds.
    pub ttl: i64,
}

/// Low-latency role cache.
///
/// Failures of this tier are never fatal to callers.
#[async_trait]
pub trait FastRoleCache: Send + Sync {
    /// Returns the cached entry for a role, fresh or not.
    async fn get_role(&self, key: &RoleKey) -> AppResult<Option<FastTierRole>>;

    /// Stores an entry under `key`; adapters may evict it after
    /// `freshness_seconds`.
    async fn put_role(
        &self,
        key: &RoleKey,
        entry: FastTierRole,
        freshness_seconds: u32,
    ) -> AppResult<()>;
}

/// Durable role table used as cache fallback of record.
#[async_trait]
pub trait DurableRoleRepository: Send + Sync {
    /// Finds one role row.
    async fn find_role(&self, key: &RoleKey) -> AppResult<Option<DurableRoleRecord>>;

    /// Inserts or replaces one role row.
    async fn save_role(&self, record: DurableRoleRecord) -> AppResult<()>;

    /// Deletes rows whose ttl is at or before `now` and returns the count.
    async fn delete_expired(&self, now: i64) -> AppResult<u64>;
}

/// Source of truth for role data.
#[async_trait]
pub trait CloudRoleSource: Send + Sync {
    /// Reads the complete role: metadata, inline policies, managed policies and tags.
    ///
    /// Returns `Ok(None)` when the provider reports the role does not exist.
    /// Throttling and timeouts are reported as `AppError::Transient`.
    async fn fetch_role(&self, key: &RoleKey) -> AppResult<Option<RoleDocument>>;

    /// Lists every role ARN in one account.
    async fn list_role_arns(&self, account_id: &str) -> AppResult<Vec<String>>;
}

/// Outcome of applying a policy change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyApplyOutcome {
    /// The change was written.
    Applied,
    /// The role already carried the change.
    AlreadyApplied,
}

/// Mutating side of the cloud provider used by approved policy requests.
#[async_trait]
pub trait RolePolicyWriter: Send + Sync {
    /// Creates or replaces an inline policy.
    async fn put_inline_policy(
        &self,
        key: &RoleKey,
        policy_name: &str,
        document: &Value,
    ) -> AppResult<()>;

    /// Attaches a managed policy.
    async fn attach_managed_policy(&self, key: &RoleKey, policy_arn: &str) -> AppResult<()>;
}
