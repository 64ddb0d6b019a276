use std::sync::Arc;

use async_trait::async_trait;
use rolegate_core::{AppError, AppResult, PrincipalIdentity};
use rolegate_domain::{Capability, RequestTarget, RoleMapping};
use tracing::{info, warn};

use crate::access_request_ports::{GroupAttributes, GroupDirectory};
use crate::authorization_policy::{self, AuthorizationLists};
use crate::{DynamicConfigHandle, RoleGateSettings, StaticAuthorizationConfig};

mod eligible;

/// Fast-tier cache of per-user eligible roles keyed by `(user, console_only)`.
#[async_trait]
pub trait AuthorizationCache: Send + Sync {
    /// Returns cached roles for a user.
    async fn get_eligible_roles(
        &self,
        user: &str,
        console_only: bool,
    ) -> AppResult<Option<Vec<RoleMapping>>>;

    /// Stores roles for a user with an explicit expiry.
    async fn put_eligible_roles(
        &self,
        user: &str,
        console_only: bool,
        roles: &[RoleMapping],
        ttl_seconds: u32,
    ) -> AppResult<()>;

    /// Drops every entry of a user.
    async fn invalidate_user(&self, user: &str) -> AppResult<()>;
}

/// Who decides on requests for one target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApprovalRoute {
    /// Users or groups that may approve.
    pub approvers: Vec<String>,
    /// Groups whose members are approved automatically.
    pub self_approval_groups: Vec<String>,
    /// Whether member modification is locked on the target.
    pub restricted: bool,
    /// Whether the target accepts new requests.
    pub requestable: bool,
    /// Whether a request is approved outright when `approvers` is empty.
    pub open_when_unowned: bool,
}

/// Application service resolving capabilities against current configuration.
#[derive(Clone)]
pub struct AuthorizationService {
    static_config: Arc<StaticAuthorizationConfig>,
    dynamic_config: DynamicConfigHandle,
    groups: Arc<dyn GroupDirectory>,
    cache: Arc<dyn AuthorizationCache>,
    settings: RoleGateSettings,
}

impl AuthorizationService {
    /// Creates the service.
    #[must_use]
    pub fn new(
        static_config: Arc<StaticAuthorizationConfig>,
        dynamic_config: DynamicConfigHandle,
        groups: Arc<dyn GroupDirectory>,
        cache: Arc<dyn AuthorizationCache>,
        settings: RoleGateSettings,
    ) -> Self {
        Self {
            static_config,
            dynamic_config,
            groups,
            cache,
            settings,
        }
    }

    /// Returns allow-lists merged from static and propagated dynamic configuration.
    #[must_use]
    pub fn lists(&self) -> AuthorizationLists {
        AuthorizationLists::merge(
            self.static_config.as_ref(),
            &self.dynamic_config.current().document,
        )
    }

    /// Returns whether the identity holds a capability.
    #[must_use]
    pub fn has_capability(
        &self,
        identity: &PrincipalIdentity,
        capability: Capability,
        target_restricted: bool,
    ) -> bool {
        authorization_policy::has_capability(
            &self.lists(),
            identity,
            capability,
            target_restricted,
        )
    }

    /// Fails with `AppError::Forbidden` when the capability is missing.
    pub fn require_capability(
        &self,
        identity: &PrincipalIdentity,
        capability: Capability,
        target_restricted: bool,
    ) -> AppResult<()> {
        if self.has_capability(identity, capability, target_restricted) {
            return Ok(());
        }

        Err(AppError::Forbidden(format!(
            "'{}' is missing capability '{}'{}",
            identity.user(),
            capability.as_str(),
            if target_restricted {
                " on a restricted target"
            } else {
                ""
            }
        )))
    }

    /// Resolves approvers and self-approval groups of a target.
    ///
    /// Group targets read the directory attributes; a group without
    /// secondary approvers is open. Policy targets are decided by holders of
    /// the approve capability and never open up when nobody holds it.
    pub async fn approval_route(&self, target: &RequestTarget) -> AppResult<ApprovalRoute> {
        let lists = self.lists();
        let global_self_approval = lists.self_approval_groups().iter().cloned();

        match target {
            RequestTarget::Group { group_name } => {
                let attributes = self
                    .groups
                    .group_attributes(group_name)
                    .await?
                    .ok_or_else(|| {
                        AppError::NotFound(format!("group '{group_name}' does not exist"))
                    })?;

                let mut self_approval_groups = attributes.self_approval_groups;
                self_approval_groups.extend(global_self_approval);

                Ok(ApprovalRoute {
                    approvers: attributes.secondary_approvers,
                    self_approval_groups,
                    restricted: attributes.restricted,
                    requestable: attributes.requestable,
                    open_when_unowned: true,
                })
            }
            RequestTarget::Policy { .. } => {
                let mut approvers: Vec<String> = lists.admins().iter().cloned().collect();
                if let Some(allowed) = lists.allow_list(Capability::ApproveRequests) {
                    approvers.extend(allowed.iter().cloned());
                }
                approvers.sort();
                approvers.dedup();

                Ok(ApprovalRoute {
                    approvers,
                    self_approval_groups: global_self_approval.collect(),
                    restricted: false,
                    requestable: true,
                    open_when_unowned: false,
                })
            }
        }
    }

    /// Returns the directory attributes of a group.
    pub async fn group_attributes(&self, group_name: &str) -> AppResult<GroupAttributes> {
        self.groups
            .group_attributes(group_name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("group '{group_name}' does not exist")))
    }

    /// Creates a group or replaces its attributes in the directory.
    ///
    /// Approver and self-approval entries are stored lowercase. Members are
    /// left untouched.
    pub async fn update_group_attributes(
        &self,
        identity: &PrincipalIdentity,
        group_name: &str,
        attributes: GroupAttributes,
    ) -> AppResult<GroupAttributes> {
        let group_name = group_name.trim();
        if group_name.is_empty() {
            return Err(AppError::Validation("group name must not be empty".to_owned()));
        }

        let restricted = self
            .groups
            .group_attributes(group_name)
            .await?
            .is_some_and(|existing| existing.restricted);
        self.require_capability(identity, Capability::EditAttributes, restricted)?;

        let attributes = GroupAttributes {
            secondary_approvers: normalize_names(attributes.secondary_approvers),
            self_approval_groups: normalize_names(attributes.self_approval_groups),
            ..attributes
        };
        self.groups
            .put_group_attributes(group_name, &attributes)
            .await?;

        info!(
            group = group_name,
            updated_by = identity.user(),
            restricted = attributes.restricted,
            requestable = attributes.requestable,
            "group attributes updated"
        );
        Ok(attributes)
    }

    /// Drops cached eligibility of a user after a membership change.
    pub async fn invalidate_user(&self, user: &str) {
        if let Err(error) = self.cache.invalidate_user(user).await {
            warn!(user = user, error = %error, cache_tier = "fast", "failed to invalidate authorization cache");
        }
    }
}

fn normalize_names(names: Vec<String>) -> Vec<String> {
    let mut names: Vec<String> = names
        .into_iter()
        .map(|name| name.trim().to_lowercase())
        .filter(|name| !name.is_empty())
        .collect();
    names.sort();
    names.dedup();
    names
}

#[cfg(test)]
mod tests;
