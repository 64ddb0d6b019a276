use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use rolegate_application::{SubmitAccessRequestInput, UpdateRequestStatusInput};
use rolegate_core::PrincipalIdentity;
use rolegate_domain::PolicyChange;

use crate::dto::{AccessRequestResponse, LimitQuery};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn submit_request_handler(
    State(state): State<AppState>,
    Extension(user): Extension<PrincipalIdentity>,
    Json(payload): Json<SubmitAccessRequestInput>,
) -> ApiResult<(StatusCode, Json<AccessRequestResponse>)> {
    let request = state
        .access_request_service
        .submit_request(&user, payload)
        .await?;

    Ok((StatusCode::CREATED, Json(AccessRequestResponse::from(request))))
}

pub async fn list_my_requests_handler(
    State(state): State<AppState>,
    Extension(user): Extension<PrincipalIdentity>,
) -> ApiResult<Json<Vec<AccessRequestResponse>>> {
    let requests = state
        .access_request_service
        .list_requests_for_user(&user)
        .await?
        .into_iter()
        .map(AccessRequestResponse::from)
        .collect();

    Ok(Json(requests))
}

pub async fn list_pending_requests_handler(
    State(state): State<AppState>,
    Extension(user): Extension<PrincipalIdentity>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Vec<AccessRequestResponse>>> {
    let requests = state
        .access_request_service
        .list_pending_for_reviewer(&user, query.limit.unwrap_or(100))
        .await?
        .into_iter()
        .map(AccessRequestResponse::from)
        .collect();

    Ok(Json(requests))
}

pub async fn get_request_handler(
    State(state): State<AppState>,
    Extension(user): Extension<PrincipalIdentity>,
    Path(request_id): Path<String>,
) -> ApiResult<Json<AccessRequestResponse>> {
    let request = state
        .access_request_service
        .get_request(&user, request_id.as_str())
        .await?;

    Ok(Json(AccessRequestResponse::from(request)))
}

pub async fn update_request_status_handler(
    State(state): State<AppState>,
    Extension(user): Extension<PrincipalIdentity>,
    Path(request_id): Path<String>,
    Json(payload): Json<UpdateRequestStatusInput>,
) -> ApiResult<Json<AccessRequestResponse>> {
    let request = state
        .access_request_service
        .update_status(&user, request_id.as_str(), payload)
        .await?;

    Ok(Json(AccessRequestResponse::from(request)))
}

pub async fn update_request_change_handler(
    State(state): State<AppState>,
    Extension(user): Extension<PrincipalIdentity>,
    Path(request_id): Path<String>,
    Json(payload): Json<PolicyChange>,
) -> ApiResult<Json<AccessRequestResponse>> {
    let request = state
        .access_request_service
        .update_proposal(&user, request_id.as_str(), payload)
        .await?;

    Ok(Json(AccessRequestResponse::from(request)))
}
