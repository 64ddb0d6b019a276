use axum::Json;
use axum::extract::{Extension, Query, State};
use rolegate_application::RoleLookup;
use rolegate_core::{AppError, PrincipalIdentity};
use rolegate_domain::{RoleDocument, RoleKey};
use tracing::debug;

use crate::dto::RoleQuery;
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn get_role_handler(
    State(state): State<AppState>,
    Extension(user): Extension<PrincipalIdentity>,
    Query(query): Query<RoleQuery>,
) -> ApiResult<Json<RoleDocument>> {
    let key = RoleKey::new(query.account_id, query.arn)?;
    debug!(
        user = %user.user(),
        arn = %key.arn(),
        force_refresh = query.force_refresh,
        "role lookup"
    );

    match state
        .role_cache_service
        .fetch_role(&key, query.force_refresh)
        .await?
    {
        RoleLookup::Found(role) => Ok(Json(role)),
        RoleLookup::Missing => {
            Err(AppError::NotFound(format!("role '{}' does not exist", key.arn())).into())
        }
    }
}
