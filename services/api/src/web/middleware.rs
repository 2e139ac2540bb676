//! services/api/src/web/middleware.rs
//!
//! The navigation guard middleware. Every request path is resolved against the
//! route table and checked by the `RouteGuard` before it reaches a handler.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use smoker_core::ports::IdentityProvider;
use smoker_core::{NavigationDecision, Resolution};
use std::sync::Arc;
use tracing::debug;

use crate::web::state::AppState;

pub const SESSION_COOKIE: &str = "session";

/// Extracts the login session id from the `Cookie` header.
pub fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())?
        .split(';')
        .find_map(|c| c.trim().strip_prefix("session="))
        .filter(|id| !id.is_empty())
}

pub fn session_set_cookie(session_id: &str, max_age_seconds: i64) -> String {
    format!(
        "{}={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE, session_id, max_age_seconds
    )
}

pub fn session_clear_cookie() -> String {
    session_set_cookie("", 0)
}

/// Middleware that admits or redirects every navigation.
///
/// Admitted requests carry the request's `SessionIdentity` as an extension.
/// Redirects are `303 See Other` to the path chosen by the guard.
pub async fn navigation_guard(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    let route = match state.routes.resolve(&path) {
        Resolution::Redirect(to) => return Redirect::to(&to).into_response(),
        Resolution::NotFound => return StatusCode::NOT_FOUND.into_response(),
        Resolution::Matched(route) => route,
    };

    let from = req
        .headers()
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let had_cookie = session_cookie(req.headers()).is_some();
    let identity = Arc::new(state.identity_for(session_cookie(req.headers())).await);

    match state
        .guard
        .before_each(&route, from.as_deref(), identity.as_ref())
        .await
    {
        NavigationDecision::Proceed => {
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        NavigationDecision::Redirect(to) => {
            debug!(%path, %to, "Navigation redirected");
            let mut response = Redirect::to(&to).into_response();
            // The guard may have signed the user out; drop the stale cookie too.
            if had_cookie && identity.current_user().is_none() {
                if let Ok(value) = HeaderValue::from_str(&session_clear_cookie()) {
                    response.headers_mut().insert(header::SET_COOKIE, value);
                }
            }
            response
        }
    }
}
