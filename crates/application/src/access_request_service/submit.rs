use rolegate_domain::{RequestTarget, RoleKey};
use uuid::Uuid;

use crate::SubmitAccessRequestInput;

use super::*;

impl AccessRequestService {
    /// Submits a request for group membership or a role policy change.
    ///
    /// The request starts out approved, with its side effect applied inline,
    /// when the target has no approvers or the requester may self-approve.
    pub async fn submit_request(
        &self,
        identity: &PrincipalIdentity,
        input: SubmitAccessRequestInput,
    ) -> AppResult<AccessRequest> {
        let now = self.now();
        validate_submission(&input, now)?;

        let route = self.authorization.approval_route(&input.target).await?;
        if !route.requestable {
            return Err(AppError::Forbidden(format!(
                "'{}' does not accept access requests",
                input.target.name()
            )));
        }
        if route.restricted {
            return Err(AppError::Forbidden(format!(
                "membership of restricted group '{}' cannot be requested",
                input.target.name()
            )));
        }

        let target_key = input.target.target_key();
        if let Some(existing) = self
            .repository
            .find_pending_for(identity.user(), target_key.as_str())
            .await?
        {
            return Err(AppError::Conflict(format!(
                "access request '{}' for '{}' is already pending",
                existing.request_id, target_key
            )));
        }

        let mut request = AccessRequest {
            request_id: Uuid::new_v4().to_string(),
            requester: identity.user().to_owned(),
            target: input.target,
            justification: input.justification.trim().to_owned(),
            status: RequestStatus::Pending,
            updated_by: identity.user().to_owned(),
            request_time: now,
            last_updated: now,
            reviewer_comments: None,
            expires_at: input.expires_at,
            policy_snapshot: None,
        };

        self.repository.insert_request(&request).await?;
        self.record_back_reference(&request).await;

        let auto_approve = authorization_policy::should_auto_approve(
            identity,
            route.approvers.as_slice(),
            route.self_approval_groups.as_slice(),
            route.open_when_unowned,
        );

        if !auto_approve {
            info!(
                request_id = %request.request_id,
                requester = %request.requester,
                target = %target_key,
                "access request submitted for review"
            );
            self.emit(&request, None).await;
            return Ok(request);
        }

        self.approve(
            &mut request,
            &route,
            identity.user(),
            Some("auto-approved".to_owned()),
        )
        .await
        .inspect_err(|error| {
            warn!(
                request_id = %request.request_id,
                error = %error,
                "auto-approval failed; request left pending"
            );
        })?;

        info!(
            request_id = %request.request_id,
            requester = %request.requester,
            target = %target_key,
            "access request auto-approved"
        );
        self.emit(&request, None).await;
        Ok(request)
    }

    /// Appends the request to the requester's list.
    ///
    /// The request row is authoritative; a failed append is only logged.
    async fn record_back_reference(&self, request: &AccessRequest) {
        if let Err(error) = self
            .repository
            .append_user_request(request.requester.as_str(), request.request_id.as_str())
            .await
        {
            warn!(
                request_id = %request.request_id,
                requester = %request.requester,
                error = %error,
                "failed to append request to user back-reference list"
            );
        }
    }
}

fn validate_submission(input: &SubmitAccessRequestInput, now: i64) -> AppResult<()> {
    input.target.validate()?;

    if input.justification.trim().is_empty() {
        return Err(AppError::Validation(
            "access request requires a justification".to_owned(),
        ));
    }

    match &input.target {
        RequestTarget::Group { .. } => {
            if input.expires_at.is_some_and(|expires_at| expires_at <= now) {
                return Err(AppError::Validation(
                    "membership expiry must be in the future".to_owned(),
                ));
            }
        }
        RequestTarget::Policy {
            account_id,
            principal_arn,
            ..
        } => {
            if input.expires_at.is_some() {
                return Err(AppError::Validation(
                    "policy requests cannot carry an expiry".to_owned(),
                ));
            }
            RoleKey::new(account_id.as_str(), principal_arn.as_str())?;
        }
    }

    Ok(())
}
