use super::checks::{check_postgres, check_redis};
use super::*;

pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let postgres = check_postgres(&state.postgres_pool).await;
    let redis = check_redis(state.redis_client.clone()).await;

    // Redis only backs the fast tiers, so losing it degrades but does not unready.
    let ready = is_healthy(postgres.status);
    let status = if ready && redis.status != "error" {
        "ok"
    } else {
        "degraded"
    };
    let http_status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        http_status,
        Json(HealthResponse {
            status,
            ready,
            postgres,
            redis,
        }),
    )
}

fn is_healthy(status: &str) -> bool {
    status == "ok"
}
