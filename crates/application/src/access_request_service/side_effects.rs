use rolegate_domain::{PolicyChange, RequestTarget, RoleDocument, RoleKey};

use crate::access_request_ports::{MembershipChange, MembershipRemoval};
use crate::{PolicyApplyOutcome, RoleLookup, call_with_retry};

use super::*;

impl AccessRequestService {
    /// Applies the underlying mutation and marks the request approved.
    ///
    /// Group targets add the member; policy targets persist a pre-change
    /// snapshot, write the policy and force a role refresh.
    ///
    /// The status never changes when the mutation fails. A policy target
    /// still keeps its snapshot, which is saved before the cloud write so a
    /// partially applied change can be rolled back by hand.
    pub(super) async fn approve(
        &self,
        request: &mut AccessRequest,
        route: &ApprovalRoute,
        actor: &str,
        reviewer_comments: Option<String>,
    ) -> AppResult<()> {
        let target = request.target.clone();
        match &target {
            RequestTarget::Group { group_name } => {
                self.add_membership(request, route, group_name).await?;
            }
            RequestTarget::Policy {
                account_id,
                principal_arn,
                change,
            } => {
                let key = RoleKey::new(account_id.as_str(), principal_arn.as_str())?;
                self.apply_policy_change(request, &key, change).await?;
            }
        }

        request.status = RequestStatus::Approved;
        request.updated_by = actor.to_owned();
        request.last_updated = self.now();
        request.reviewer_comments = reviewer_comments;
        self.repository.save_request(request).await?;

        match &target {
            RequestTarget::Group { .. } => {
                self.authorization
                    .invalidate_user(request.requester.as_str())
                    .await;
            }
            RequestTarget::Policy {
                account_id,
                principal_arn,
                ..
            } => {
                let key = RoleKey::new(account_id.as_str(), principal_arn.as_str())?;
                if let Err(error) = self.roles.fetch_role(&key, true).await {
                    warn!(
                        request_id = %request.request_id,
                        arn = %principal_arn,
                        error = %error,
                        "role cache refresh after policy change failed"
                    );
                }
            }
        }

        Ok(())
    }

    async fn add_membership(
        &self,
        request: &AccessRequest,
        route: &ApprovalRoute,
        group_name: &str,
    ) -> AppResult<()> {
        if route.restricted {
            return Err(AppError::Forbidden(format!(
                "group '{group_name}' is restricted; membership changes are denied"
            )));
        }

        match self
            .groups
            .add_member(group_name, request.requester.as_str())
            .await?
        {
            MembershipChange::Added => {
                info!(
                    request_id = %request.request_id,
                    group = group_name,
                    user = %request.requester,
                    "group member added"
                );
                Ok(())
            }
            MembershipChange::AlreadyMember => {
                info!(
                    request_id = %request.request_id,
                    group = group_name,
                    user = %request.requester,
                    "user already a group member"
                );
                Ok(())
            }
            MembershipChange::Denied(reason) => Err(AppError::Forbidden(format!(
                "directory refused adding '{}' to '{group_name}': {reason}",
                request.requester
            ))),
        }
    }

    async fn apply_policy_change(
        &self,
        request: &mut AccessRequest,
        key: &RoleKey,
        change: &PolicyChange,
    ) -> AppResult<PolicyApplyOutcome> {
        let role = match self.roles.fetch_role(key, true).await? {
            RoleLookup::Found(role) => role,
            RoleLookup::Missing => {
                return Err(AppError::NotFound(format!(
                    "role '{}' does not exist",
                    key.arn()
                )));
            }
        };

        request.policy_snapshot = Some(policy_snapshot(&role, change)?);
        self.repository.save_request(request).await?;

        let outcome = match change {
            PolicyChange::InlinePolicy {
                policy_name,
                document,
            } => {
                if role.inline_policies.get(policy_name) == Some(document) {
                    PolicyApplyOutcome::AlreadyApplied
                } else {
                    call_with_retry(&self.settings.retry, "iam put_role_policy", || {
                        self.policy_writer
                            .put_inline_policy(key, policy_name.as_str(), document)
                    })
                    .await?;
                    PolicyApplyOutcome::Applied
                }
            }
            PolicyChange::ManagedPolicy { policy_arn } => {
                if role.has_managed_policy(policy_arn.as_str()) {
                    PolicyApplyOutcome::AlreadyApplied
                } else {
                    call_with_retry(&self.settings.retry, "iam attach_role_policy", || {
                        self.policy_writer
                            .attach_managed_policy(key, policy_arn.as_str())
                    })
                    .await?;
                    PolicyApplyOutcome::Applied
                }
            }
        };

        info!(
            request_id = %request.request_id,
            arn = %key.arn(),
            policy = change.policy_identifier(),
            outcome = ?outcome,
            "policy change applied"
        );

        Ok(outcome)
    }

    /// Removes the requester from the target group.
    ///
    /// A user who is no longer a member counts as removed.
    pub(super) async fn remove_membership(&self, request: &AccessRequest) -> AppResult<()> {
        let RequestTarget::Group { group_name } = &request.target else {
            return Err(AppError::Validation(format!(
                "access request '{}' is not a group membership request",
                request.request_id
            )));
        };

        match self
            .groups
            .remove_member(group_name.as_str(), request.requester.as_str())
            .await?
        {
            MembershipRemoval::Removed | MembershipRemoval::NotMember => {
                self.authorization
                    .invalidate_user(request.requester.as_str())
                    .await;
                Ok(())
            }
            MembershipRemoval::Denied(reason) => Err(AppError::Forbidden(format!(
                "directory refused removing '{}' from '{group_name}': {reason}",
                request.requester
            ))),
        }
    }
}

/// Captures the policy state a change is about to overwrite.
fn policy_snapshot(role: &RoleDocument, change: &PolicyChange) -> AppResult<serde_json::Value> {
    let previous = match change {
        PolicyChange::InlinePolicy { policy_name, .. } => role
            .inline_policies
            .get(policy_name)
            .cloned()
            .unwrap_or(serde_json::Value::Null),
        PolicyChange::ManagedPolicy { .. } => serde_json::to_value(&role.managed_policies)
            .map_err(|error| {
                AppError::Internal(format!("failed to serialize managed policies: {error}"))
            })?,
    };

    Ok(serde_json::json!({
        "arn": role.arn,
        "fetched_at": role.fetched_at,
        "policy": change.policy_identifier(),
        "previous": previous,
    }))
}
