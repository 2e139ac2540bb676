//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for registration, login, and logout.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use smoker_core::domain::{AuthUser, Credentials, Role};
use smoker_core::ports::{IdentityProvider, PortError};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

use crate::adapters::identity::{hash_password, SessionIdentity, SESSION_TTL_DAYS};
use crate::web::middleware::{session_clear_cookie, session_set_cookie};
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub uid: String,
    pub email: String,
    /// `admin` or `user`; absent if the role document could not be read.
    pub role: Option<String>,
    /// Where the client should navigate next.
    pub dashboard: String,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /register - Create an admin account
#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Admin created and signed in", body = AuthResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn register_admin_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Arc<SessionIdentity>>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    register(&state, &identity, req, Role::Admin).await
}

/// POST /user-register - Create a user account
#[utoipa::path(
    post,
    path = "/user-register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created and signed in", body = AuthResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn register_user_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Arc<SessionIdentity>>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    register(&state, &identity, req, Role::User).await
}

async fn register(
    state: &AppState,
    identity: &SessionIdentity,
    req: RegisterRequest,
    role: Role,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // 1. Hash the password
    let password_hash = hash_password(&req.password).map_err(|e| {
        error!("Failed to hash password: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to hash password".to_string())
    })?;

    // 2. Create the account and its role document
    state
        .accounts
        .create_account(&req.email, &password_hash, role)
        .await
        .map_err(|e| {
            error!("Failed to create user: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create user".to_string())
        })?;

    // 3. Sign the new account in
    let user = identity
        .sign_in(Credentials {
            email: req.email,
            password: req.password,
        })
        .await
        .map_err(|e| {
            error!("Failed to sign in new user: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create session".to_string())
        })?;

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, login_cookie(identity))],
        Json(auth_response(user, Some(role))),
    ))
}

/// POST /login - Login with existing account
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Arc<SessionIdentity>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user = identity
        .sign_in(Credentials {
            email: req.email,
            password: req.password,
        })
        .await
        .map_err(|e| match e {
            PortError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "Invalid email or password".to_string())
            }
            other => {
                error!("Failed to sign in: {:?}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, "Authentication error".to_string())
            }
        })?;

    // The guard resolves the role again on navigation; this lookup only picks the landing page.
    let role = match state.store.get_user_role(&user.uid).await {
        Ok(role) => role,
        Err(e) => {
            error!("Failed to read role after login: {:?}", e);
            None
        }
    };

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, login_cookie(&identity))],
        Json(auth_response(user, role)),
    ))
}

/// POST /logout - Logout and invalidate session
#[utoipa::path(
    post,
    path = "/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn logout_handler(
    Extension(identity): Extension<Arc<SessionIdentity>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    identity.sign_out().await.map_err(|e| {
        error!("Failed to delete auth session: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to logout".to_string())
    })?;

    Ok((StatusCode::OK, [(header::SET_COOKIE, session_clear_cookie())]))
}

fn login_cookie(identity: &SessionIdentity) -> String {
    session_set_cookie(
        &identity.session_id().unwrap_or_default(),
        Duration::days(SESSION_TTL_DAYS).num_seconds(),
    )
}

fn auth_response(user: AuthUser, role: Option<Role>) -> AuthResponse {
    AuthResponse {
        uid: user.uid,
        email: user.email.unwrap_or_default(),
        role: role.map(|role| role.to_string()),
        dashboard: role
            .map(|role| role.dashboard_path())
            .unwrap_or(smoker_core::LOGIN_PATH)
            .to_string(),
    }
}
