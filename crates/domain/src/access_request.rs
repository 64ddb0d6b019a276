use std::fmt::{Display, Formatter};

use rolegate_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default window during which a rejected or cancelled request may be reopened.
pub const REOPEN_WINDOW_SECONDS: i64 = 24 * 60 * 60;

/// Lifecycle status of an access request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Waiting for a reviewer.
    Pending,
    /// Approved and applied.
    Approved,
    /// Rejected by a reviewer.
    Rejected,
    /// Withdrawn by the requester or an admin.
    Cancelled,
    /// Approved grant ran past its expiry and was revoked.
    Expired,
    /// Approved grant was removed by a member manager.
    Removed,
}

impl RequestStatus {
    /// Returns the stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::Removed => "removed",
        }
    }

    /// Returns every status.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[RequestStatus] = &[
            RequestStatus::Pending,
            RequestStatus::Approved,
            RequestStatus::Rejected,
            RequestStatus::Cancelled,
            RequestStatus::Expired,
            RequestStatus::Removed,
        ];

        ALL
    }

    /// Parses a storage or transport value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "cancelled" => Ok(Self::Cancelled),
            "expired" => Ok(Self::Expired),
            "removed" => Ok(Self::Removed),
            _ => Err(AppError::Validation(format!(
                "unknown request status '{value}'"
            ))),
        }
    }

    /// Returns whether `next` is an edge of the request lifecycle graph.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved)
                | (Self::Pending, Self::Rejected)
                | (Self::Pending, Self::Cancelled)
                | (Self::Rejected, Self::Pending)
                | (Self::Cancelled, Self::Pending)
                | (Self::Approved, Self::Expired)
                | (Self::Approved, Self::Removed)
        )
    }

    /// Validates a transition, rejecting no-op moves and unknown edges.
    pub fn ensure_transition(self, next: Self) -> AppResult<()> {
        if self == next {
            return Err(AppError::Conflict(format!(
                "request is already '{}'",
                self.as_str()
            )));
        }

        if !self.can_transition_to(next) {
            return Err(AppError::Conflict(format!(
                "request cannot move from '{}' to '{}'",
                self.as_str(),
                next.as_str()
            )));
        }

        Ok(())
    }
}

impl Display for RequestStatus {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Proposed change carried by a policy request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolicyChange {
    /// Creates or replaces an inline policy.
    InlinePolicy {
        /// Inline policy name.
        policy_name: String,
        /// Proposed policy document.
        document: Value,
    },
    /// Attaches a managed policy.
    ManagedPolicy {
        /// Managed policy ARN.
        policy_arn: String,
    },
}

impl PolicyChange {
    /// Returns the identifier of the policy touched by this change.
    #[must_use]
    pub fn policy_identifier(&self) -> &str {
        match self {
            Self::InlinePolicy { policy_name, .. } => policy_name.as_str(),
            Self::ManagedPolicy { policy_arn } => policy_arn.as_str(),
        }
    }
}

/// Resource an access request targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestTarget {
    /// Membership in a directory group.
    Group {
        /// Group name, usually its email address.
        group_name: String,
    },
    /// Policy change on an IAM role.
    Policy {
        /// Account owning the principal.
        account_id: String,
        /// Principal ARN.
        principal_arn: String,
        /// Proposed change.
        change: PolicyChange,
    },
}

impl RequestTarget {
    /// Returns a stable key identifying the target for duplicate detection.
    #[must_use]
    pub fn target_key(&self) -> String {
        match self {
            Self::Group { group_name } => format!("group:{}", group_name.trim().to_lowercase()),
            Self::Policy {
                principal_arn,
                change,
                ..
            } => format!("policy:{principal_arn}:{}", change.policy_identifier()),
        }
    }

    /// Returns the principal identifier used for approver matching.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Group { group_name } => group_name.as_str(),
            Self::Policy { principal_arn, .. } => principal_arn.as_str(),
        }
    }

    /// Validates target fields.
    pub fn validate(&self) -> AppResult<()> {
        match self {
            Self::Group { group_name } if group_name.trim().is_empty() => Err(
                AppError::Validation("group request requires a group name".to_owned()),
            ),
            Self::Group { .. } => Ok(()),
            Self::Policy { change, .. } => match change {
                PolicyChange::InlinePolicy {
                    policy_name,
                    document,
                } => {
                    if policy_name.trim().is_empty() {
                        return Err(AppError::Validation(
                            "inline policy request requires a policy name".to_owned(),
                        ));
                    }
                    if !document.is_object() {
                        return Err(AppError::Validation(
                            "inline policy document must be a JSON object".to_owned(),
                        ));
                    }
                    Ok(())
                }
                PolicyChange::ManagedPolicy { policy_arn } => {
                    if !policy_arn.starts_with("arn:") || !policy_arn.contains(":policy/") {
                        return Err(AppError::Validation(format!(
                            "'{policy_arn}' is not a managed policy ARN"
                        )));
                    }
                    Ok(())
                }
            },
        }
    }
}

/// Persisted access request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessRequest {
    /// Opaque unique request id.
    pub request_id: String,
    /// Requesting user.
    pub requester: String,
    /// Requested resource.
    pub target: RequestTarget,
    /// Business justification.
    pub justification: String,
    /// Current lifecycle status.
    pub status: RequestStatus,
    /// Last actor that changed the request.
    pub updated_by: String,
    /// Creation time in epoch seconds.
    pub request_time: i64,
    /// Last update time in epoch seconds.
    pub last_updated: i64,
    /// Reviewer comment captured with the latest status change.
    pub reviewer_comments: Option<String>,
    /// Optional membership expiry in epoch seconds.
    pub expires_at: Option<i64>,
    /// Policy state captured before the approved change was applied.
    pub policy_snapshot: Option<Value>,
}

impl AccessRequest {
    /// Returns whether a rejected or cancelled request is still young enough to reopen.
    #[must_use]
    pub fn within_reopen_window(&self, now: i64, window_seconds: i64) -> bool {
        now.saturating_sub(self.last_updated) <= window_seconds
    }

    /// Returns whether an approved request has passed its expiry.
    #[must_use]
    pub fn is_past_expiry(&self, now: i64) -> bool {
        self.status == RequestStatus::Approved && self.expires_at.is_some_and(|at| at <= now)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::{PolicyChange, RequestStatus, RequestTarget};

    fn any_status() -> impl Strategy<Value = RequestStatus> {
        proptest::sample::select(RequestStatus::all().to_vec())
    }

    proptest! {
        #[test]
        fn no_op_transitions_are_always_rejected(status in any_status()) {
            prop_assert!(status.ensure_transition(status).is_err());
        }

        #[test]
        fn approval_is_only_reachable_from_pending(from in any_status()) {
            if from != RequestStatus::Pending {
                prop_assert!(!from.can_transition_to(RequestStatus::Approved));
            }
        }

        #[test]
        fn revoked_grants_are_final(next in any_status()) {
            prop_assert!(!RequestStatus::Expired.can_transition_to(next));
            prop_assert!(!RequestStatus::Removed.can_transition_to(next));
        }
    }

    #[test]
    fn status_storage_values_roundtrip() {
        for status in RequestStatus::all() {
            assert_eq!(RequestStatus::parse(status.as_str()).ok(), Some(*status));
        }
        assert!(RequestStatus::parse("approved_by_magic").is_err());
    }

    #[test]
    fn target_key_distinguishes_policies_on_one_role() {
        let inline = RequestTarget::Policy {
            account_id: "123456789012".to_owned(),
            principal_arn: "arn:aws:iam::123456789012:role/app".to_owned(),
            change: PolicyChange::InlinePolicy {
                policy_name: "s3".to_owned(),
                document: json!({"Statement": []}),
            },
        };
        let managed = RequestTarget::Policy {
            account_id: "123456789012".to_owned(),
            principal_arn: "arn:aws:iam::123456789012:role/app".to_owned(),
            change: PolicyChange::ManagedPolicy {
                policy_arn: "arn:aws:iam::aws:policy/ReadOnlyAccess".to_owned(),
            },
        };

        assert_ne!(inline.target_key(), managed.target_key());
    }

    #[test]
    fn group_target_key_ignores_case() {
        let upper = RequestTarget::Group {
            group_name: "Eng@Example.com".to_owned(),
        };
        let lower = RequestTarget::Group {
            group_name: "eng@example.com".to_owned(),
        };
        assert_eq!(upper.target_key(), lower.target_key());
    }

    #[test]
    fn inline_policy_document_must_be_object() {
        let target = RequestTarget::Policy {
            account_id: "123456789012".to_owned(),
            principal_arn: "arn:aws:iam::123456789012:role/app".to_owned(),
            change: PolicyChange::InlinePolicy {
                policy_name: "s3".to_owned(),
                document: json!("not a document"),
            },
        };
        assert!(target.validate().is_err());
    }
}
