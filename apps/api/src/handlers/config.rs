use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use rolegate_core::PrincipalIdentity;
use rolegate_domain::{Capability, DynamicConfigDocument};

use crate::dto::{
    DynamicConfigHistoryResponse, DynamicConfigQuery, DynamicConfigResponse, LimitQuery,
    WriteDynamicConfigRequest,
};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn read_config_handler(
    State(state): State<AppState>,
    Extension(_user): Extension<PrincipalIdentity>,
    Query(query): Query<DynamicConfigQuery>,
) -> ApiResult<Json<DynamicConfigResponse>> {
    let snapshot = if query.force_read {
        state.dynamic_config_service.read().await?
    } else {
        state.dynamic_config_service.handle().current()
    };

    Ok(Json(DynamicConfigResponse::from(snapshot)))
}

pub async fn write_config_handler(
    State(state): State<AppState>,
    Extension(user): Extension<PrincipalIdentity>,
    Json(payload): Json<WriteDynamicConfigRequest>,
) -> ApiResult<Json<DynamicConfigResponse>> {
    state
        .authorization_service
        .require_capability(&user, Capability::EditConfig, false)?;

    let document = DynamicConfigDocument::from_value(payload.config)?;
    let snapshot = state
        .dynamic_config_service
        .write(document, payload.expected_checksum.as_deref(), user.user())
        .await?;

    Ok(Json(DynamicConfigResponse::from(snapshot)))
}

pub async fn list_config_history_handler(
    State(state): State<AppState>,
    Extension(user): Extension<PrincipalIdentity>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<DynamicConfigHistoryResponse>> {
    state
        .authorization_service
        .require_capability(&user, Capability::EditConfig, false)?;

    let ids = state
        .dynamic_config_service
        .list_archive_ids(query.limit.unwrap_or(50))
        .await?;

    Ok(Json(DynamicConfigHistoryResponse { ids }))
}

pub async fn read_archived_config_handler(
    State(state): State<AppState>,
    Extension(user): Extension<PrincipalIdentity>,
    Path(archive_id): Path<String>,
) -> ApiResult<Json<DynamicConfigResponse>> {
    state
        .authorization_service
        .require_capability(&user, Capability::EditConfig, false)?;

    let version = state
        .dynamic_config_service
        .read_archived(archive_id.as_str())
        .await?;

    Ok(Json(DynamicConfigResponse::from(version)))
}
