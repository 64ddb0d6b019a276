use rolegate_application::{ConfigSnapshot, GroupAttributes, StoredDynamicConfig};
use rolegate_domain::{AccessRequest, RequestStatus, RequestTarget, RoleMapping};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Health status of one backing dependency.
#[derive(Debug, Serialize)]
pub struct HealthDependencyStatus {
    pub status: &'static str,
    pub detail: Option<String>,
}

/// Health response payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub ready: bool,
    pub postgres: HealthDependencyStatus,
    pub redis: HealthDependencyStatus,
}

/// Query string of a role lookup.
#[derive(Debug, Deserialize)]
pub struct RoleQuery {
    pub account_id: String,
    pub arn: String,
    #[serde(default)]
    pub force_refresh: bool,
}

/// Query string of listings with a limit.
#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

/// Query string of the eligible-roles lookup.
#[derive(Debug, Deserialize)]
pub struct EligibleRolesQuery {
    #[serde(default)]
    pub console_only: bool,
}

/// API representation of an access request.
#[derive(Debug, Serialize)]
pub struct AccessRequestResponse {
    pub request_id: String,
    pub requester: String,
    pub target: RequestTarget,
    pub justification: String,
    pub status: RequestStatus,
    pub updated_by: String,
    pub request_time: i64,
    pub last_updated: i64,
    pub reviewer_comments: Option<String>,
    pub expires_at: Option<i64>,
    pub policy_snapshot: Option<Value>,
}

impl From<AccessRequest> for AccessRequestResponse {
    fn from(request: AccessRequest) -> Self {
        Self {
            request_id: request.request_id,
            requester: request.requester,
            target: request.target,
            justification: request.justification,
            status: request.status,
            updated_by: request.updated_by,
            request_time: request.request_time,
            last_updated: request.last_updated,
            reviewer_comments: request.reviewer_comments,
            expires_at: request.expires_at,
            policy_snapshot: request.policy_snapshot,
        }
    }
}

/// API representation of a dynamic configuration version.
#[derive(Debug, Serialize)]
pub struct DynamicConfigResponse {
    pub id: Option<String>,
    pub config: Value,
    pub checksum: Option<String>,
    pub updated_by: Option<String>,
    pub updated_at: Option<i64>,
}

impl From<ConfigSnapshot> for DynamicConfigResponse {
    fn from(snapshot: ConfigSnapshot) -> Self {
        Self {
            id: None,
            config: snapshot.document.to_value(),
            checksum: snapshot.checksum,
            updated_by: snapshot.updated_by,
            updated_at: snapshot.updated_at,
        }
    }
}

impl From<StoredDynamicConfig> for DynamicConfigResponse {
    fn from(version: StoredDynamicConfig) -> Self {
        Self {
            id: Some(version.id),
            config: version.document.to_value(),
            checksum: Some(version.checksum),
            updated_by: Some(version.updated_by),
            updated_at: Some(version.updated_at),
        }
    }
}

/// Incoming payload for a dynamic configuration write.
#[derive(Debug, Deserialize)]
pub struct WriteDynamicConfigRequest {
    pub config: Value,
    /// Checksum of the version the caller edited; omitted only for the first write.
    pub expected_checksum: Option<String>,
}

/// Query string of a configuration read.
#[derive(Debug, Deserialize)]
pub struct DynamicConfigQuery {
    /// Reads the durable tier instead of the propagated snapshot.
    #[serde(default)]
    pub force_read: bool,
}

/// Archived configuration ids, newest first.
#[derive(Debug, Serialize)]
pub struct DynamicConfigHistoryResponse {
    pub ids: Vec<String>,
}

/// Roles the caller may assume.
#[derive(Debug, Serialize)]
pub struct EligibleRolesResponse {
    pub roles: Vec<RoleMapping>,
}

/// Directory attributes of one group.
#[derive(Debug, Serialize)]
pub struct GroupResponse {
    pub group_name: String,
    #[serde(flatten)]
    pub attributes: GroupAttributes,
}
