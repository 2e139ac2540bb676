//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use smoker_core::ports::{AccountStore, DocumentStore};
use smoker_core::{RoleCache, RouteGuard, RouteTable, SensorManager, SessionRecorder};
use std::sync::Arc;

use crate::adapters::identity::{AuthStateSender, SessionIdentity};

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub accounts: Arc<dyn AccountStore>,
    pub routes: Arc<RouteTable>,
    pub role_cache: Arc<RoleCache>,
    pub guard: Arc<RouteGuard>,
    pub sensors: Arc<SensorManager>,
    pub sessions: SessionRecorder,
    pub auth_state: AuthStateSender,
}

impl AppState {
    /// Resolves the identity behind a request's `session` cookie.
    pub async fn identity_for(&self, session_id: Option<&str>) -> SessionIdentity {
        SessionIdentity::from_cookie(self.accounts.clone(), self.auth_state.clone(), session_id)
            .await
    }
}
