use axum::Json;
use axum::extract::{Extension, Path, State};
use rolegate_application::GroupAttributes;
use rolegate_core::PrincipalIdentity;

use crate::dto::GroupResponse;
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn get_group_handler(
    State(state): State<AppState>,
    Extension(_user): Extension<PrincipalIdentity>,
    Path(group_name): Path<String>,
) -> ApiResult<Json<GroupResponse>> {
    let attributes = state
        .authorization_service
        .group_attributes(group_name.as_str())
        .await?;

    Ok(Json(GroupResponse {
        group_name,
        attributes,
    }))
}

pub async fn put_group_handler(
    State(state): State<AppState>,
    Extension(user): Extension<PrincipalIdentity>,
    Path(group_name): Path<String>,
    Json(payload): Json<GroupAttributes>,
) -> ApiResult<Json<GroupResponse>> {
    let attributes = state
        .authorization_service
        .update_group_attributes(&user, group_name.as_str(), payload)
        .await?;

    Ok(Json(GroupResponse {
        group_name,
        attributes,
    }))
}
