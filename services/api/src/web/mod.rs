pub mod auth;
pub mod middleware;
pub mod rest;
pub mod routes;
pub mod state;

#[cfg(test)]
mod tests;

use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method, StatusCode,
    },
    middleware as axum_middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use middleware::navigation_guard;
pub use routes::app_routes;

use crate::web::{
    auth::{login_handler, logout_handler, register_admin_handler, register_user_handler},
    rest::{
        active_session_handler, dashboard_handler, end_session_handler,
        latest_sensor_data_handler, sensor_history_handler, sensor_reading_handler,
        session_history_handler, start_session_handler, update_session_handler, ApiDoc,
    },
    state::AppState,
};

/// Builds the full HTTP surface. Every request, documentation included, passes
/// through the navigation guard first.
pub fn router(app_state: Arc<AppState>, cors_origin: Option<HeaderValue>) -> Router {
    let auth_routes = Router::new()
        .route("/login", post(login_handler))
        .route("/logout", post(logout_handler))
        .route("/register", post(register_admin_handler))
        .route("/user-register", post(register_user_handler));

    let admin_routes = Router::new()
        .route("/admin-dashboard", get(dashboard_handler))
        .route("/admin-dashboard/sessions", post(start_session_handler))
        .route("/admin-dashboard/sessions/active", get(active_session_handler))
        .route("/admin-dashboard/sessions/history", get(session_history_handler))
        .route("/admin-dashboard/sessions/{session_id}", patch(update_session_handler))
        .route("/admin-dashboard/sessions/{session_id}/end", post(end_session_handler))
        .route("/admin-dashboard/sensors/latest", get(latest_sensor_data_handler))
        .route("/admin-dashboard/sensors/{sensor_id}", get(sensor_reading_handler))
        .route("/admin-dashboard/sensors/{sensor_id}/history", get(sensor_history_handler));

    let user_routes = Router::new()
        .route("/user-dashboard", get(dashboard_handler))
        .route("/user-dashboard/session", get(active_session_handler))
        .route("/user-dashboard/sensors/latest", get(latest_sensor_data_handler))
        .route("/user-dashboard/sensors/{sensor_id}", get(sensor_reading_handler))
        .route("/user-dashboard/sensors/{sensor_id}/history", get(sensor_history_handler));

    let mut app = Router::new()
        .merge(auth_routes)
        .merge(admin_routes)
        .merge(user_routes)
        .with_state(app_state.clone())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .fallback(|| async { StatusCode::NOT_FOUND })
        .layer(axum_middleware::from_fn_with_state(app_state, navigation_guard));

    if let Some(origin) = cors_origin {
        let cors = CorsLayer::new()
            .allow_origin(origin)
            .allow_credentials(true)
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
            .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);
        app = app.layer(cors);
    }
    app
}
