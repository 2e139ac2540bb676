//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the dashboard, session and sensor endpoints
//! and the master definition for the OpenAPI document.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smoker_core::domain::{
    AuthUser, LatestSensorData, NewSession, SensorReading, SessionUpdate, SmokingSession,
};
use smoker_core::ports::{IdentityProvider, PortError};
use std::sync::Arc;
use tracing::error;
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

use crate::adapters::identity::SessionIdentity;
use crate::web::auth::{self, AuthResponse, LoginRequest, RegisterRequest};
use crate::web::state::AppState;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::register_admin_handler,
        auth::register_user_handler,
        auth::login_handler,
        auth::logout_handler,
        dashboard_handler,
        start_session_handler,
        active_session_handler,
        update_session_handler,
        end_session_handler,
        session_history_handler,
        latest_sensor_data_handler,
        sensor_reading_handler,
        sensor_history_handler,
    ),
    components(
        schemas(
            RegisterRequest,
            LoginRequest,
            AuthResponse,
            StartSessionRequest,
            UpdateSessionRequest,
            SensorReadingResponse
        )
    ),
    tags(
        (name = "Smoker Monitor API", description = "Dashboards, smoking sessions and sensor telemetry.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// Everything a dashboard renders on load.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    pub user: Option<AuthUser>,
    /// `null` when sensor data is unavailable right now.
    pub sensors: Option<LatestSensorData>,
    pub active_session: Option<SmokingSession>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    /// Target duration in seconds.
    pub duration: i64,
    /// Defaults to the signed-in user.
    pub admin_id: Option<String>,
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSessionRequest {
    /// Defaults to the signed-in user.
    pub admin_id: Option<String>,
    pub current_duration: Option<i64>,
    pub temperature_data: Option<Vec<f64>>,
    pub smoke_level_data: Option<Vec<f64>>,
    pub timestamps: Option<Vec<DateTime<Utc>>>,
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SensorReadingResponse {
    pub sensor_id: String,
    pub reading: Option<f64>,
    pub last_update: Option<DateTime<Utc>>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryParams {
    /// RFC 3339 start of the range (inclusive).
    pub start: DateTime<Utc>,
    /// RFC 3339 end of the range (inclusive).
    pub end: DateTime<Utc>,
}

fn port_failure(context: &str, e: PortError) -> (StatusCode, String) {
    error!("{}: {:?}", context, e);
    match e {
        PortError::NotFound(message) => (StatusCode::NOT_FOUND, message),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, context.to_string()),
    }
}

fn acting_user(identity: &SessionIdentity) -> Option<String> {
    identity.current_user().map(|user| user.uid)
}

//=========================================================================================
// Dashboards
//=========================================================================================

/// GET /admin-dashboard, /user-dashboard - Latest sensor aggregate and active session.
#[utoipa::path(
    get,
    path = "/{dashboard}",
    params(("dashboard" = String, Path, description = "`admin-dashboard` or `user-dashboard`")),
    responses(
        (status = 200, description = "Dashboard snapshot"),
        (status = 303, description = "Redirected by the navigation guard")
    )
)]
pub async fn dashboard_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Arc<SessionIdentity>>,
) -> Json<DashboardResponse> {
    let (sensors, active_session) =
        tokio::join!(state.sensors.latest_sensor_data(), state.sessions.active_session());
    let active_session = active_session.unwrap_or_else(|e| {
        error!("Dashboard could not load the active session: {:?}", e);
        None
    });

    Json(DashboardResponse {
        user: identity.current_user(),
        sensors,
        active_session,
    })
}

//=========================================================================================
// Smoking Sessions
//=========================================================================================

/// POST /admin-dashboard/sessions - Start a new smoking session.
#[utoipa::path(
    post,
    path = "/admin-dashboard/sessions",
    request_body = StartSessionRequest,
    responses(
        (status = 201, description = "Session started"),
        (status = 500, description = "The session could not be stored")
    )
)]
pub async fn start_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Arc<SessionIdentity>>,
    Json(req): Json<StartSessionRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let request = NewSession {
        duration: req.duration,
        admin_id: req.admin_id.or_else(|| acting_user(&identity)),
        extra: req.extra,
    };
    let session = state
        .sessions
        .start_session(request)
        .await
        .map_err(|e| port_failure("Failed to start session", e))?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /admin-dashboard/sessions/active - The active session, or `null`.
#[utoipa::path(
    get,
    path = "/admin-dashboard/sessions/active",
    responses(
        (status = 200, description = "The active session or null"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn active_session_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Option<SmokingSession>>, (StatusCode, String)> {
    let session = state
        .sessions
        .active_session()
        .await
        .map_err(|e| port_failure("Failed to fetch active session", e))?;
    Ok(Json(session))
}

/// PATCH /admin-dashboard/sessions/{session_id} - Merge fields into a session.
#[utoipa::path(
    patch,
    path = "/admin-dashboard/sessions/{session_id}",
    params(("session_id" = Uuid, Path, description = "The session to update.")),
    request_body = UpdateSessionRequest,
    responses(
        (status = 204, description = "Session updated"),
        (status = 404, description = "No such session"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn update_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Arc<SessionIdentity>>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<UpdateSessionRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    let update = SessionUpdate {
        admin_id: req.admin_id.or_else(|| acting_user(&identity)),
        current_duration: req.current_duration,
        temperature_data: req.temperature_data,
        smoke_level_data: req.smoke_level_data,
        timestamps: req.timestamps,
        extra: req.extra,
    };
    state
        .sessions
        .update_session(session_id, update)
        .await
        .map_err(|e| port_failure("Failed to update session", e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /admin-dashboard/sessions/{session_id}/end - Complete a session.
#[utoipa::path(
    post,
    path = "/admin-dashboard/sessions/{session_id}/end",
    params(("session_id" = Uuid, Path, description = "The session to end.")),
    responses(
        (status = 204, description = "Session completed"),
        (status = 404, description = "No such session"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn end_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Arc<SessionIdentity>>,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    let admin_id = acting_user(&identity).unwrap_or_default();
    state
        .sessions
        .end_session(session_id, &admin_id)
        .await
        .map_err(|e| port_failure("Failed to end session", e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /admin-dashboard/sessions/history - Every completed session.
#[utoipa::path(
    get,
    path = "/admin-dashboard/sessions/history",
    responses(
        (status = 200, description = "Completed sessions"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn session_history_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SmokingSession>>, (StatusCode, String)> {
    let sessions = state
        .sessions
        .session_history()
        .await
        .map_err(|e| port_failure("Failed to fetch session history", e))?;
    Ok(Json(sessions))
}

//=========================================================================================
// Sensors
//=========================================================================================

/// GET /{dashboard}/sensors/latest - Chart data for the last 24 hours, or `null`.
#[utoipa::path(
    get,
    path = "/{dashboard}/sensors/latest",
    params(("dashboard" = String, Path, description = "`admin-dashboard` or `user-dashboard`")),
    responses((status = 200, description = "Latest aggregate, or null when unavailable"))
)]
pub async fn latest_sensor_data_handler(
    State(state): State<Arc<AppState>>,
) -> Json<Option<LatestSensorData>> {
    Json(state.sensors.latest_sensor_data().await)
}

/// GET /{dashboard}/sensors/{sensor_id} - The sensor's most recent in-memory reading.
#[utoipa::path(
    get,
    path = "/{dashboard}/sensors/{sensor_id}",
    params(
        ("dashboard" = String, Path, description = "`admin-dashboard` or `user-dashboard`"),
        ("sensor_id" = String, Path, description = "A registered sensor.")
    ),
    responses(
        (status = 200, description = "Latest reading", body = SensorReadingResponse),
        (status = 404, description = "Sensor is not registered")
    )
)]
pub async fn sensor_reading_handler(
    State(state): State<Arc<AppState>>,
    Path(sensor_id): Path<String>,
) -> Result<Json<SensorReadingResponse>, (StatusCode, String)> {
    let sensor = state.sensors.sensor(&sensor_id).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            format!("Sensor {} not found", sensor_id),
        )
    })?;
    Ok(Json(SensorReadingResponse {
        sensor_id,
        reading: sensor.last_reading,
        last_update: sensor.last_update,
    }))
}

/// GET /{dashboard}/sensors/{sensor_id}/history - Persisted readings within a range.
#[utoipa::path(
    get,
    path = "/{dashboard}/sensors/{sensor_id}/history",
    params(
        ("dashboard" = String, Path, description = "`admin-dashboard` or `user-dashboard`"),
        ("sensor_id" = String, Path, description = "The sensor to query."),
        HistoryParams
    ),
    responses((status = 200, description = "Readings in ascending time order; empty on failure"))
)]
pub async fn sensor_history_handler(
    State(state): State<Arc<AppState>>,
    Path(sensor_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Json<Vec<SensorReading>> {
    Json(
        state
            .sensors
            .sensor_history(&sensor_id, params.start, params.end)
            .await,
    )
}
