use rolegate_domain::{Capability, PolicyChange, RequestTarget};

use crate::UpdateRequestStatusInput;

use super::*;

impl AccessRequestService {
    /// Moves a request along one edge of the status graph.
    ///
    /// Authorization is checked before any side effect runs.
    pub async fn update_status(
        &self,
        identity: &PrincipalIdentity,
        request_id: &str,
        input: UpdateRequestStatusInput,
    ) -> AppResult<AccessRequest> {
        let mut request = self.require_request(request_id).await?;
        let previous_status = request.status;
        let next_status = input.status;
        previous_status.ensure_transition(next_status)?;

        let route = self.authorization.approval_route(&request.target).await?;
        let lists = self.authorization.lists();
        let is_reviewer = self.can_review(identity, &request, &route);
        let actor = identity.user();
        let comments = input.reviewer_comments;

        match (previous_status, next_status) {
            (RequestStatus::Pending, RequestStatus::Approved) => {
                self.ensure(is_reviewer, identity, &request, "approve")?;
                self.approve(&mut request, &route, actor, comments).await?;
            }
            (RequestStatus::Pending, RequestStatus::Rejected) => {
                self.ensure(is_reviewer, identity, &request, "reject")?;
                self.record_status(&mut request, next_status, actor, comments)
                    .await?;
            }
            (RequestStatus::Pending, RequestStatus::Cancelled) => {
                let allowed =
                    authorization_policy::can_cancel(&lists, identity, &request.requester);
                self.ensure(allowed, identity, &request, "cancel")?;
                self.record_status(&mut request, next_status, actor, comments)
                    .await?;
            }
            (RequestStatus::Rejected | RequestStatus::Cancelled, RequestStatus::Pending) => {
                let allowed = authorization_policy::can_reopen(
                    &lists,
                    identity,
                    &request.requester,
                    route.approvers.as_slice(),
                );
                self.ensure(allowed, identity, &request, "reopen")?;
                let window = self.settings.reopen_window_seconds;
                if !request.within_reopen_window(self.now(), window) {
                    return Err(AppError::Conflict(format!(
                        "access request '{}' was last updated more than {window} seconds ago and can no longer be reopened",
                        request.request_id
                    )));
                }
                self.ensure_no_other_pending(&request).await?;
                self.record_status(&mut request, next_status, actor, comments)
                    .await?;
            }
            (RequestStatus::Approved, RequestStatus::Removed) => {
                self.authorization.require_capability(
                    identity,
                    Capability::ModifyMembers,
                    route.restricted,
                )?;
                self.remove_membership(&request).await?;
                self.record_status(&mut request, next_status, actor, comments)
                    .await?;
            }
            (RequestStatus::Approved, RequestStatus::Expired) => {
                return Err(AppError::Forbidden(format!(
                    "access request '{}' can only be expired by the system",
                    request.request_id
                )));
            }
            (from, to) => {
                return Err(AppError::Conflict(format!(
                    "access request cannot move from '{from}' to '{to}'"
                )));
            }
        }

        info!(
            request_id = %request.request_id,
            previous_status = %previous_status,
            status = %request.status,
            updated_by = %request.updated_by,
            "access request status changed"
        );
        self.emit(&request, Some(previous_status)).await;
        Ok(request)
    }

    /// Replaces the proposed change of a pending policy request.
    pub async fn update_proposal(
        &self,
        identity: &PrincipalIdentity,
        request_id: &str,
        proposed: PolicyChange,
    ) -> AppResult<AccessRequest> {
        let mut request = self.require_request(request_id).await?;
        if request.status != RequestStatus::Pending {
            return Err(AppError::Conflict(format!(
                "access request '{}' is '{}' and can no longer be edited",
                request.request_id, request.status
            )));
        }

        let RequestTarget::Policy {
            account_id,
            principal_arn,
            change,
        } = &request.target
        else {
            return Err(AppError::Validation(format!(
                "access request '{}' does not carry a policy proposal",
                request.request_id
            )));
        };

        let route = self.authorization.approval_route(&request.target).await?;
        let allowed = authorization_policy::can_edit_proposal(
            &self.authorization.lists(),
            identity,
            &request.requester,
            route.approvers.as_slice(),
        );
        self.ensure(allowed, identity, &request, "edit")?;

        if *change == proposed {
            return Err(AppError::Conflict(format!(
                "proposed change of access request '{}' is unchanged",
                request.request_id
            )));
        }

        let updated_target = RequestTarget::Policy {
            account_id: account_id.clone(),
            principal_arn: principal_arn.clone(),
            change: proposed,
        };
        updated_target.validate()?;

        let previous_key = request.target.target_key();
        request.target = updated_target;
        if request.target.target_key() != previous_key {
            self.ensure_no_other_pending(&request).await?;
        }

        request.updated_by = identity.user().to_owned();
        request.last_updated = self.now();
        self.repository.save_request(&request).await?;

        info!(
            request_id = %request.request_id,
            updated_by = %request.updated_by,
            "access request proposal updated"
        );
        Ok(request)
    }

    async fn record_status(
        &self,
        request: &mut AccessRequest,
        status: RequestStatus,
        actor: &str,
        reviewer_comments: Option<String>,
    ) -> AppResult<()> {
        request.status = status;
        request.updated_by = actor.to_owned();
        request.last_updated = self.now();
        request.reviewer_comments = reviewer_comments;
        self.repository.save_request(request).await
    }

    async fn ensure_no_other_pending(&self, request: &AccessRequest) -> AppResult<()> {
        let target_key = request.target.target_key();
        match self
            .repository
            .find_pending_for(request.requester.as_str(), target_key.as_str())
            .await?
        {
            Some(existing) if existing.request_id != request.request_id => {
                Err(AppError::Conflict(format!(
                    "access request '{}' for '{}' is already pending",
                    existing.request_id, target_key
                )))
            }
            _ => Ok(()),
        }
    }

    fn ensure(
        &self,
        allowed: bool,
        identity: &PrincipalIdentity,
        request: &AccessRequest,
        action: &str,
    ) -> AppResult<()> {
        if allowed {
            return Ok(());
        }

        Err(AppError::Forbidden(format!(
            "'{}' may not {action} access request '{}'",
            identity.user(),
            request.request_id
        )))
    }
}
