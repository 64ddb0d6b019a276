use axum::Json;
use axum::extract::{Extension, Query, State};
use rolegate_core::PrincipalIdentity;

use crate::dto::{EligibleRolesQuery, EligibleRolesResponse};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn eligible_roles_handler(
    State(state): State<AppState>,
    Extension(user): Extension<PrincipalIdentity>,
    Query(query): Query<EligibleRolesQuery>,
) -> ApiResult<Json<EligibleRolesResponse>> {
    let roles = state
        .authorization_service
        .eligible_roles(&user, query.console_only)
        .await?;

    Ok(Json(EligibleRolesResponse { roles }))
}
