use axum::Router;
use axum::middleware::from_fn;
use axum::routing::{get, post, put};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{handlers, middleware};

pub fn build_router(app_state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/api/roles", get(handlers::roles::get_role_handler))
        .route(
            "/api/eligible-roles",
            get(handlers::eligible::eligible_roles_handler),
        )
        .route(
            "/api/groups/{group_name}",
            get(handlers::groups::get_group_handler).put(handlers::groups::put_group_handler),
        )
        .route(
            "/api/requests",
            get(handlers::requests::list_my_requests_handler)
                .post(handlers::requests::submit_request_handler),
        )
        .route(
            "/api/requests/pending",
            get(handlers::requests::list_pending_requests_handler),
        )
        .route(
            "/api/requests/{request_id}",
            get(handlers::requests::get_request_handler),
        )
        .route(
            "/api/requests/{request_id}/status",
            post(handlers::requests::update_request_status_handler),
        )
        .route(
            "/api/requests/{request_id}/change",
            put(handlers::requests::update_request_change_handler),
        )
        .route(
            "/api/config",
            get(handlers::config::read_config_handler).put(handlers::config::write_config_handler),
        )
        .route(
            "/api/config/history",
            get(handlers::config::list_config_history_handler),
        )
        .route(
            "/api/config/history/{archive_id}",
            get(handlers::config::read_archived_config_handler),
        )
        .route_layer(from_fn(middleware::require_identity));

    Router::new()
        .route("/api/health", get(handlers::health::health_handler))
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
