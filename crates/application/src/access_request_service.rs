use std::sync::Arc;

use rolegate_core::{AppError, AppResult, Clock, PrincipalIdentity};
use rolegate_domain::{AccessRequest, RequestStatus};
use tracing::{info, warn};

use crate::access_request_ports::{
    AccessRequestEvent, AccessRequestNotifier, AccessRequestRepository, GroupDirectory,
};
use crate::authorization_policy;
use crate::{
    ApprovalRoute, AuthorizationService, RoleCacheService, RoleGateSettings, RolePolicyWriter,
};

mod queries;
mod side_effects;
mod submit;
mod sweep;
mod transitions;

/// Actor recorded on transitions performed by background maintenance.
pub const SYSTEM_ACTOR: &str = "rolegate-system";

/// Application service owning the access request lifecycle.
#[derive(Clone)]
pub struct AccessRequestService {
    repository: Arc<dyn AccessRequestRepository>,
    groups: Arc<dyn GroupDirectory>,
    policy_writer: Arc<dyn RolePolicyWriter>,
    notifier: Arc<dyn AccessRequestNotifier>,
    roles: RoleCacheService,
    authorization: AuthorizationService,
    clock: Arc<dyn Clock>,
    settings: RoleGateSettings,
}

impl AccessRequestService {
    /// Creates the service.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        repository: Arc<dyn AccessRequestRepository>,
        groups: Arc<dyn GroupDirectory>,
        policy_writer: Arc<dyn RolePolicyWriter>,
        notifier: Arc<dyn AccessRequestNotifier>,
        roles: RoleCacheService,
        authorization: AuthorizationService,
        clock: Arc<dyn Clock>,
        settings: RoleGateSettings,
    ) -> Self {
        Self {
            repository,
            groups,
            policy_writer,
            notifier,
            roles,
            authorization,
            clock,
            settings,
        }
    }

    async fn require_request(&self, request_id: &str) -> AppResult<AccessRequest> {
        self.repository
            .find_request(request_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("access request '{request_id}' does not exist"))
            })
    }

    fn can_review(
        &self,
        identity: &PrincipalIdentity,
        request: &AccessRequest,
        route: &ApprovalRoute,
    ) -> bool {
        authorization_policy::can_approve(
            &self.authorization.lists(),
            identity,
            route.approvers.as_slice(),
            request.target.name(),
        )
    }

    /// Delivers an event; failures never undo the committed change.
    async fn emit(&self, request: &AccessRequest, previous_status: Option<RequestStatus>) {
        let event = AccessRequestEvent {
            request_id: request.request_id.clone(),
            previous_status,
            new_status: request.status,
            requester: request.requester.clone(),
            target: request.target.clone(),
            reviewer_comments: request.reviewer_comments.clone(),
            updated_by: request.updated_by.clone(),
        };

        if let Err(error) = self.notifier.notify(&event).await {
            warn!(
                request_id = %request.request_id,
                status = %request.status,
                error = %error,
                "failed to deliver access request notification"
            );
        }
    }

    fn now(&self) -> i64 {
        self.clock.epoch_seconds()
    }
}
