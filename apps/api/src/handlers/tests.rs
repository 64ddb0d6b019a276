use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use rolegate_application::{
    GroupAttributes, SubmitAccessRequestInput, UpdateRequestStatusInput,
};
use rolegate_core::PrincipalIdentity;
use rolegate_domain::{RequestStatus, RequestTarget, RoleDocument};
use rolegate_infrastructure::{
    InMemoryAccessRequestRepository, InMemoryAuthorizationCache, InMemoryDurableRoleRepository,
    InMemoryDynamicConfigCache, InMemoryDynamicConfigRepository, InMemoryGroupDirectory,
    InMemoryRoleCache, InMemoryRoleSource, LoggingAccessRequestNotifier, RoleGateServices,
    RuntimeAdapters, RuntimeConfig,
};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;

use crate::dto::{
    DynamicConfigQuery, EligibleRolesQuery, LimitQuery, RoleQuery, WriteDynamicConfigRequest,
};
use crate::state::AppState;

use super::{config, eligible, groups, requests, roles};

const ACCOUNT: &str = "123456789012";
const ROLE_ARN: &str = "arn:aws:iam::123456789012:role/app";

fn sample_role() -> RoleDocument {
    RoleDocument {
        arn: ROLE_ARN.to_owned(),
        account_id: ACCOUNT.to_owned(),
        role_name: "app".to_owned(),
        role_id: "AROAAPP".to_owned(),
        assume_role_policy_document: json!({"Version": "2012-10-17", "Statement": []}),
        inline_policies: BTreeMap::new(),
        managed_policies: Vec::new(),
        tags: BTreeMap::new(),
        templated: None,
        fetched_at: 0,
    }
}

async fn test_state() -> (AppState, Arc<InMemoryGroupDirectory>) {
    let Ok(config) = RuntimeConfig::from_lookup(|name| match name {
        "DATABASE_URL" => Some("postgres://localhost/rolegate".to_owned()),
        "ROLEGATE_ROLE_SOURCE" => Some("memory".to_owned()),
        "ROLEGATE_ADMINS" => Some("admin@example.com".to_owned()),
        _ => None,
    }) else {
        panic!("test configuration should load");
    };
    let Ok(source) = InMemoryRoleSource::with_roles([sample_role()]) else {
        panic!("sample role should be valid");
    };
    let source = Arc::new(source);
    let directory = Arc::new(InMemoryGroupDirectory::new());

    let adapters = RuntimeAdapters {
        fast_roles: Arc::new(InMemoryRoleCache::new()),
        durable_roles: Arc::new(InMemoryDurableRoleRepository::new()),
        cloud_roles: source.clone(),
        policy_writer: source,
        config_repository: Arc::new(InMemoryDynamicConfigRepository::new()),
        config_cache: Arc::new(InMemoryDynamicConfigCache::new()),
        authorization_cache: Arc::new(InMemoryAuthorizationCache::new()),
        access_requests: Arc::new(InMemoryAccessRequestRepository::new()),
        groups: directory.clone(),
        notifier: Arc::new(LoggingAccessRequestNotifier::new()),
        redis_client: None,
    };
    let services = RoleGateServices::build(&config, &adapters).await;

    let Ok(pool) = PgPoolOptions::new().connect_lazy(config.database_url.as_str()) else {
        panic!("lazy pool should build");
    };

    (AppState::new(services, pool, None), directory)
}

fn admin() -> PrincipalIdentity {
    PrincipalIdentity::new("admin@example.com", Vec::<String>::new())
}

fn developer() -> PrincipalIdentity {
    PrincipalIdentity::new("dev@example.com", ["engineering@example.com"])
}

#[tokio::test]
async fn role_lookup_returns_document_and_missing_role_is_not_found() {
    let (state, _) = test_state().await;

    let found = roles::get_role_handler(
        State(state.clone()),
        Extension(developer()),
        Query(RoleQuery {
            account_id: ACCOUNT.to_owned(),
            arn: ROLE_ARN.to_owned(),
            force_refresh: false,
        }),
    )
    .await;
    let Ok(Json(role)) = found else {
        panic!("role lookup should succeed");
    };
    assert_eq!(role.role_name, "app");
    assert!(role.fetched_at > 0);

    let missing = roles::get_role_handler(
        State(state),
        Extension(developer()),
        Query(RoleQuery {
            account_id: ACCOUNT.to_owned(),
            arn: "arn:aws:iam::123456789012:role/ghost".to_owned(),
            force_refresh: false,
        }),
    )
    .await;
    let Err(error) = missing else {
        panic!("missing role should fail");
    };
    assert_eq!(error.into_response().status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_role_key_is_bad_request() {
    let (state, _) = test_state().await;

    let result = roles::get_role_handler(
        State(state),
        Extension(developer()),
        Query(RoleQuery {
            account_id: "42".to_owned(),
            arn: ROLE_ARN.to_owned(),
            force_refresh: true,
        }),
    )
    .await;

    let Err(error) = result else {
        panic!("malformed account id should fail");
    };
    assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn config_write_requires_capability_and_current_checksum() {
    let (state, _) = test_state().await;

    let forbidden = config::write_config_handler(
        State(state.clone()),
        Extension(developer()),
        Json(WriteDynamicConfigRequest {
            config: json!({"admins": ["dev@example.com"]}),
            expected_checksum: None,
        }),
    )
    .await;
    let Err(error) = forbidden else {
        panic!("developer should not edit configuration");
    };
    assert_eq!(error.into_response().status(), StatusCode::FORBIDDEN);

    let written = config::write_config_handler(
        State(state.clone()),
        Extension(admin()),
        Json(WriteDynamicConfigRequest {
            config: json!({
                "role_mappings": {
                    "engineering@example.com": [
                        ROLE_ARN,
                        {"arn": "arn:aws:iam::123456789012:role/console", "console_only": true}
                    ]
                }
            }),
            expected_checksum: None,
        }),
    )
    .await;
    let Ok(Json(written)) = written else {
        panic!("admin write should succeed");
    };
    assert!(written.checksum.is_some());
    assert_eq!(written.updated_by.as_deref(), Some("admin@example.com"));

    let stale = config::write_config_handler(
        State(state.clone()),
        Extension(admin()),
        Json(WriteDynamicConfigRequest {
            config: json!({}),
            expected_checksum: Some("0".repeat(64)),
        }),
    )
    .await;
    let Err(error) = stale else {
        panic!("stale checksum should conflict");
    };
    assert_eq!(error.into_response().status(), StatusCode::CONFLICT);

    let Ok(Json(current)) = config::read_config_handler(
        State(state),
        Extension(developer()),
        Query(DynamicConfigQuery { force_read: true }),
    )
    .await
    else {
        panic!("forced read should succeed");
    };
    assert_eq!(current.checksum, written.checksum);
}

#[tokio::test]
async fn eligible_roles_follow_config_mappings() {
    let (state, _) = test_state().await;

    let written = config::write_config_handler(
        State(state.clone()),
        Extension(admin()),
        Json(WriteDynamicConfigRequest {
            config: json!({
                "role_mappings": {
                    "engineering@example.com": [
                        ROLE_ARN,
                        {"arn": "arn:aws:iam::123456789012:role/console", "console_only": true}
                    ]
                }
            }),
            expected_checksum: None,
        }),
    )
    .await;
    assert!(written.is_ok());

    let Ok(Json(api_roles)) = eligible::eligible_roles_handler(
        State(state.clone()),
        Extension(developer()),
        Query(EligibleRolesQuery {
            console_only: false,
        }),
    )
    .await
    else {
        panic!("eligible roles should resolve");
    };
    assert_eq!(api_roles.roles.len(), 1);
    assert_eq!(api_roles.roles[0].arn, ROLE_ARN);

    let Ok(Json(console_roles)) = eligible::eligible_roles_handler(
        State(state),
        Extension(developer()),
        Query(EligibleRolesQuery { console_only: true }),
    )
    .await
    else {
        panic!("eligible console roles should resolve");
    };
    assert_eq!(console_roles.roles.len(), 2);
}

#[tokio::test]
async fn group_request_is_created_listed_and_approved() {
    let (state, directory) = test_state().await;

    let forbidden = groups::put_group_handler(
        State(state.clone()),
        Extension(developer()),
        Path("payments@example.com".to_owned()),
        Json(GroupAttributes {
            requestable: true,
            ..GroupAttributes::default()
        }),
    )
    .await;
    let Err(error) = forbidden else {
        panic!("developer should not edit group attributes");
    };
    assert_eq!(error.into_response().status(), StatusCode::FORBIDDEN);

    let Ok(Json(group)) = groups::put_group_handler(
        State(state.clone()),
        Extension(admin()),
        Path("payments@example.com".to_owned()),
        Json(GroupAttributes {
            secondary_approvers: vec!["Security-Leads@example.com".to_owned()],
            requestable: true,
            ..GroupAttributes::default()
        }),
    )
    .await
    else {
        panic!("admin should create the group");
    };
    assert_eq!(
        group.attributes.secondary_approvers,
        vec!["security-leads@example.com".to_owned()]
    );

    let Ok(Json(read_back)) = groups::get_group_handler(
        State(state.clone()),
        Extension(developer()),
        Path("payments@example.com".to_owned()),
    )
    .await
    else {
        panic!("group should be readable");
    };
    assert!(read_back.attributes.requestable);

    let Ok((status, Json(created))) = requests::submit_request_handler(
        State(state.clone()),
        Extension(developer()),
        Json(SubmitAccessRequestInput {
            target: RequestTarget::Group {
                group_name: "payments@example.com".to_owned(),
            },
            justification: "on-call rotation".to_owned(),
            expires_at: None,
        }),
    )
    .await
    else {
        panic!("submission should succeed");
    };
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created.status, RequestStatus::Pending);

    let Ok(Json(mine)) =
        requests::list_my_requests_handler(State(state.clone()), Extension(developer())).await
    else {
        panic!("listing own requests should succeed");
    };
    assert_eq!(mine.len(), 1);

    let reviewer = PrincipalIdentity::new("lead@example.com", ["security-leads@example.com"]);
    let Ok(Json(pending)) = requests::list_pending_requests_handler(
        State(state.clone()),
        Extension(reviewer.clone()),
        Query(LimitQuery { limit: None }),
    )
    .await
    else {
        panic!("reviewer listing should succeed");
    };
    assert_eq!(pending.len(), 1);

    let Ok(Json(approved)) = requests::update_request_status_handler(
        State(state.clone()),
        Extension(reviewer),
        Path(created.request_id.clone()),
        Json(UpdateRequestStatusInput {
            status: RequestStatus::Approved,
            reviewer_comments: Some("ok".to_owned()),
        }),
    )
    .await
    else {
        panic!("approval should succeed");
    };
    assert_eq!(approved.status, RequestStatus::Approved);
    assert_eq!(
        directory.members("payments@example.com").await,
        vec!["dev@example.com".to_owned()]
    );

    let outsider = PrincipalIdentity::new("eve@example.com", Vec::<String>::new());
    let hidden = requests::get_request_handler(
        State(state),
        Extension(outsider),
        Path(created.request_id),
    )
    .await;
    let Err(error) = hidden else {
        panic!("unrelated users should not see the request");
    };
    assert_eq!(error.into_response().status(), StatusCode::FORBIDDEN);
}
