use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::json;
use tokio::sync::Mutex;

use rolegate_core::{AppError, AppResult, ManualClock, PrincipalIdentity};
use rolegate_domain::{
    Capability, DynamicConfigDocument, PolicyChange, RequestTarget, RoleMapping,
};

use crate::access_request_ports::{
    GroupAttributes, GroupDirectory, MembershipChange, MembershipRemoval,
};
use crate::dynamic_config_ports::{
    DynamicConfigCache, DynamicConfigRepository, StoredDynamicConfig,
};
use crate::{DynamicConfigService, RoleGateSettings, StaticAuthorizationConfig};

use super::{AuthorizationCache, AuthorizationService};

#[derive(Default)]
struct FakeConfigStore {
    master: Mutex<Option<StoredDynamicConfig>>,
}

#[async_trait]
impl DynamicConfigRepository for FakeConfigStore {
    async fn find_version(&self, _id: &str) -> AppResult<Option<StoredDynamicConfig>> {
        Ok(self.master.lock().await.clone())
    }

    async fn insert_archive(&self, _version: StoredDynamicConfig) -> AppResult<()> {
        Ok(())
    }

    async fn compare_and_swap_master(
        &self,
        _expected_checksum: Option<&str>,
        version: StoredDynamicConfig,
    ) -> AppResult<bool> {
        *self.master.lock().await = Some(version);
        Ok(true)
    }

    async fn list_archive_ids(&self, _limit: usize) -> AppResult<Vec<String>> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl DynamicConfigCache for FakeConfigStore {
    async fn get_current(&self) -> AppResult<Option<StoredDynamicConfig>> {
        Ok(None)
    }

    async fn put_current(&self, _version: &StoredDynamicConfig) -> AppResult<()> {
        Ok(())
    }
}

struct FakeDirectory {
    groups: Mutex<HashMap<String, GroupAttributes>>,
}

#[async_trait]
impl GroupDirectory for FakeDirectory {
    async fn group_attributes(&self, group_name: &str) -> AppResult<Option<GroupAttributes>> {
        Ok(self.groups.lock().await.get(group_name).cloned())
    }

    async fn put_group_attributes(
        &self,
        group_name: &str,
        attributes: &GroupAttributes,
    ) -> AppResult<()> {
        self.groups
            .lock()
            .await
            .insert(group_name.to_owned(), attributes.clone());
        Ok(())
    }

    async fn add_member(&self, _group_name: &str, _user: &str) -> AppResult<MembershipChange> {
        Ok(MembershipChange::Added)
    }

    async fn remove_member(&self, _group_name: &str, _user: &str) -> AppResult<MembershipRemoval> {
        Ok(MembershipRemoval::Removed)
    }
}

#[derive(Default)]
struct FakeAuthorizationCache {
    entries: Mutex<HashMap<(String, bool), Vec<RoleMapping>>>,
    reads: Mutex<HashSet<(String, bool)>>,
    failing: bool,
}

#[async_trait]
impl AuthorizationCache for FakeAuthorizationCache {
    async fn get_eligible_roles(
        &self,
        user: &str,
        console_only: bool,
    ) -> AppResult<Option<Vec<RoleMapping>>> {
        if self.failing {
            return Err(AppError::Internal("redis down".to_owned()));
        }
        self.reads.lock().await.insert((user.to_owned(), console_only));
        Ok(self
            .entries
            .lock()
            .await
            .get(&(user.to_owned(), console_only))
            .cloned())
    }

    async fn put_eligible_roles(
        &self,
        user: &str,
        console_only: bool,
        roles: &[RoleMapping],
        _ttl_seconds: u32,
    ) -> AppResult<()> {
        if self.failing {
            return Err(AppError::Internal("redis down".to_owned()));
        }
        self.entries
            .lock()
            .await
            .insert((user.to_owned(), console_only), roles.to_vec());
        Ok(())
    }

    async fn invalidate_user(&self, user: &str) -> AppResult<()> {
        self.entries
            .lock()
            .await
            .retain(|(cached_user, _), _| cached_user != user);
        Ok(())
    }
}

struct Harness {
    service: AuthorizationService,
    config: DynamicConfigService,
    cache: Arc<FakeAuthorizationCache>,
}

fn directory() -> FakeDirectory {
    FakeDirectory {
        groups: Mutex::new(HashMap::from([
            (
                "payments@example.com".to_owned(),
                GroupAttributes {
                    secondary_approvers: vec!["payments-leads@example.com".to_owned()],
                    self_approval_groups: vec!["payments-oncall@example.com".to_owned()],
                    restricted: false,
                    requestable: true,
                },
            ),
            (
                "break-glass@example.com".to_owned(),
                GroupAttributes {
                    restricted: true,
                    requestable: true,
                    ..GroupAttributes::default()
                },
            ),
        ])),
    }
}

async fn harness_with_cache(cache: Arc<FakeAuthorizationCache>) -> Harness {
    let store = Arc::new(FakeConfigStore::default());
    let clock = Arc::new(ManualClock::new(
        Utc.timestamp_opt(1_700_000_000, 0)
            .single()
            .unwrap_or_default(),
    ));
    let config = DynamicConfigService::new(store.clone(), store, clock);

    let document = DynamicConfigDocument::from_value(json!({
        "admins": ["dyn-admin@example.com"],
        "capabilities": { "approve_requests": ["security@example.com"] },
        "self_approval_groups": ["sre@example.com"],
        "role_mappings": {
            "eng@example.com": [
                "arn:aws:iam::123456789012:role/readonly",
                { "arn": "arn:aws:iam::123456789012:role/console", "console_only": true }
            ],
            "ops@example.com": ["arn:aws:iam::210987654321:role/operator"]
        }
    }))
    .unwrap_or_default();
    assert!(config.write(document, None, "root@example.com").await.is_ok());

    let static_config = StaticAuthorizationConfig {
        admins: vec!["admins@example.com".to_owned()],
        capability_allow_lists: HashMap::new(),
        self_approval_groups: Vec::new(),
    };

    let service = AuthorizationService::new(
        Arc::new(static_config),
        config.handle(),
        Arc::new(directory()),
        cache.clone(),
        RoleGateSettings::default(),
    );

    Harness {
        service,
        config,
        cache,
    }
}

async fn harness() -> Harness {
    harness_with_cache(Arc::new(FakeAuthorizationCache::default())).await
}

fn identity(user: &str, groups: &[&str]) -> PrincipalIdentity {
    PrincipalIdentity::new(user, groups.iter().copied())
}

#[tokio::test]
async fn restricted_target_denies_member_changes_even_for_admins() {
    let harness = harness().await;
    let admin = identity("boss@example.com", &["admins@example.com"]);

    let result = harness
        .service
        .require_capability(&admin, Capability::ModifyMembers, true);

    assert!(matches!(result, Err(AppError::Forbidden(_))));
    assert!(
        harness
            .service
            .require_capability(&admin, Capability::ModifyMembers, false)
            .is_ok()
    );
}

#[tokio::test]
async fn dynamic_admins_apply_after_propagation() {
    let harness = harness().await;
    let dynamic_admin = identity("someone@example.com", &["dyn-admin@example.com"]);

    assert!(
        harness
            .service
            .has_capability(&dynamic_admin, Capability::EditConfig, false)
    );
    assert!(
        !harness
            .service
            .has_capability(&identity("x@example.com", &[]), Capability::EditConfig, false)
    );
    assert!(harness.config.handle().current().checksum.is_some());
}

#[tokio::test]
async fn group_route_reads_directory_attributes() {
    let harness = harness().await;
    let route = harness
        .service
        .approval_route(&RequestTarget::Group {
            group_name: "payments@example.com".to_owned(),
        })
        .await;

    let Ok(route) = route else {
        panic!("route should resolve");
    };
    assert_eq!(route.approvers, vec!["payments-leads@example.com".to_owned()]);
    assert!(route.self_approval_groups.contains(&"payments-oncall@example.com".to_owned()));
    assert!(route.self_approval_groups.contains(&"sre@example.com".to_owned()));
    assert!(!route.restricted);
    assert!(route.open_when_unowned);
}

#[tokio::test]
async fn unknown_group_route_is_not_found() {
    let harness = harness().await;
    let route = harness
        .service
        .approval_route(&RequestTarget::Group {
            group_name: "nope@example.com".to_owned(),
        })
        .await;

    assert!(matches!(route, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn policy_route_uses_approve_capability_holders() {
    let harness = harness().await;
    let route = harness
        .service
        .approval_route(&RequestTarget::Policy {
            account_id: "123456789012".to_owned(),
            principal_arn: "arn:aws:iam::123456789012:role/app".to_owned(),
            change: PolicyChange::ManagedPolicy {
                policy_arn: "arn:aws:iam::aws:policy/ReadOnlyAccess".to_owned(),
            },
        })
        .await;

    let Ok(route) = route else {
        panic!("route should resolve");
    };
    assert_eq!(
        route.approvers,
        vec![
            "admins@example.com".to_owned(),
            "dyn-admin@example.com".to_owned(),
            "security@example.com".to_owned(),
        ]
    );
    assert!(!route.open_when_unowned);
}

#[tokio::test]
async fn eligible_roles_filter_console_only_and_are_cached() {
    let harness = harness().await;
    let engineer = identity("dev@example.com", &["eng@example.com", "ops@example.com"]);

    let api_roles = harness
        .service
        .eligible_roles(&engineer, false)
        .await
        .unwrap_or_default();
    let console_roles = harness
        .service
        .eligible_roles(&engineer, true)
        .await
        .unwrap_or_default();

    assert_eq!(api_roles.len(), 2);
    assert!(api_roles.iter().all(|role| !role.console_only));
    assert_eq!(console_roles.len(), 3);

    let cached = harness.cache.entries.lock().await.len();
    assert_eq!(cached, 2);

    harness.service.invalidate_user("dev@example.com").await;
    assert!(harness.cache.entries.lock().await.is_empty());
}

#[tokio::test]
async fn cached_eligibility_is_served_without_recompute() {
    let harness = harness().await;
    let engineer = identity("dev@example.com", &["eng@example.com"]);
    let stale = vec![RoleMapping {
        arn: "arn:aws:iam::123456789012:role/cached".to_owned(),
        console_only: false,
    }];
    harness
        .cache
        .entries
        .lock()
        .await
        .insert(("dev@example.com".to_owned(), false), stale.clone());

    let roles = harness.service.eligible_roles(&engineer, false).await;

    assert_eq!(roles.ok(), Some(stale));
    assert!(
        harness
            .cache
            .reads
            .lock()
            .await
            .contains(&("dev@example.com".to_owned(), false))
    );
}

#[tokio::test]
async fn cache_failures_fall_back_to_computation() {
    let harness = harness_with_cache(Arc::new(FakeAuthorizationCache {
        failing: true,
        ..FakeAuthorizationCache::default()
    }))
    .await;

    let roles = harness
        .service
        .eligible_roles(&identity("dev@example.com", &["eng@example.com"]), false)
        .await;

    assert_eq!(roles.map(|roles| roles.len()).ok(), Some(1));
}

#[tokio::test]
async fn group_attributes_are_edited_by_capability_holders() {
    let harness = harness().await;
    let admin = identity("boss@example.com", &["admins@example.com"]);
    let attributes = GroupAttributes {
        secondary_approvers: vec!["Infra-Leads@example.com".to_owned()],
        requestable: true,
        ..GroupAttributes::default()
    };

    let stranger = harness
        .service
        .update_group_attributes(
            &identity("x@example.com", &[]),
            "infra@example.com",
            attributes.clone(),
        )
        .await;
    assert!(matches!(stranger, Err(AppError::Forbidden(_))));

    let updated = harness
        .service
        .update_group_attributes(&admin, "infra@example.com", attributes)
        .await;
    let Ok(updated) = updated else {
        panic!("admin should edit group attributes");
    };
    assert_eq!(updated.secondary_approvers, vec!["infra-leads@example.com".to_owned()]);

    let route = harness
        .service
        .approval_route(&RequestTarget::Group {
            group_name: "infra@example.com".to_owned(),
        })
        .await;
    assert_eq!(
        route.map(|route| route.approvers).ok(),
        Some(vec!["infra-leads@example.com".to_owned()])
    );
}

#[tokio::test]
async fn unknown_group_attributes_are_not_found() {
    let harness = harness().await;

    let result = harness.service.group_attributes("nope@example.com").await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}
