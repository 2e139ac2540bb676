//! services/api/src/adapters/identity.rs
//!
//! This module contains the identity provider adapter. It implements the
//! `IdentityProvider` port on top of email/password accounts and cookie-bound
//! login sessions kept in an `AccountStore`. One `SessionIdentity` is built per
//! request from the `session` cookie; all of them publish auth transitions on
//! the same shared channel.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use smoker_core::domain::{AuthUser, Credentials};
use smoker_core::ports::{AccountStore, IdentityProvider, PortError, PortResult};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};
use uuid::Uuid;

/// How long a login session stays valid.
pub const SESSION_TTL_DAYS: i64 = 30;

/// The channel every identity publishes its auth transitions on.
pub type AuthStateSender = Arc<watch::Sender<Option<AuthUser>>>;

pub fn auth_state_channel() -> AuthStateSender {
    let (sender, _) = watch::channel(None);
    Arc::new(sender)
}

/// Hashes a password for storage.
pub fn hash_password(password: &str) -> PortResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PortError::Unexpected(format!("Failed to hash password: {}", e)))
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

struct LoginSession {
    id: String,
    user: AuthUser,
}

pub struct SessionIdentity {
    accounts: Arc<dyn AccountStore>,
    auth_state: AuthStateSender,
    session: Mutex<Option<LoginSession>>,
}

impl SessionIdentity {
    /// An identity with nobody signed in.
    pub fn anonymous(accounts: Arc<dyn AccountStore>, auth_state: AuthStateSender) -> Self {
        Self {
            accounts,
            auth_state,
            session: Mutex::new(None),
        }
    }

    /// Restores the identity bound to a `session` cookie. Unknown or expired
    /// sessions yield an anonymous identity. Only an expired one is reported as
    /// a sign-out; an unknown id never belonged to a signed-in user.
    pub async fn from_cookie(
        accounts: Arc<dyn AccountStore>,
        auth_state: AuthStateSender,
        session_id: Option<&str>,
    ) -> Self {
        let identity = Self::anonymous(accounts, auth_state);
        let Some(session_id) = session_id else {
            return identity;
        };

        match identity.accounts.validate_auth_session(session_id).await {
            Ok(user) => {
                *identity.session.lock() = Some(LoginSession {
                    id: session_id.to_string(),
                    user,
                });
            }
            Err(PortError::Expired) => {
                debug!("Login session has expired");
                identity.auth_state.send_replace(None);
            }
            Err(PortError::Unauthorized) | Err(PortError::NotFound(_)) => {
                debug!("Login session is unknown");
            }
            Err(e) => {
                error!("Failed to validate auth session: {:?}", e);
            }
        }
        identity
    }

    /// The id of the current login session, used as the cookie value.
    pub fn session_id(&self) -> Option<String> {
        self.session.lock().as_ref().map(|session| session.id.clone())
    }
}

//=========================================================================================
// `IdentityProvider` Trait Implementation
//=========================================================================================

#[async_trait]
impl IdentityProvider for SessionIdentity {
    fn current_user(&self) -> Option<AuthUser> {
        self.session.lock().as_ref().map(|session| session.user.clone())
    }

    async fn sign_in(&self, credentials: Credentials) -> PortResult<AuthUser> {
        // 1. Look up the account; an unknown email is indistinguishable from a bad password.
        let stored = self
            .accounts
            .credentials_by_email(&credentials.email)
            .await
            .map_err(|e| match e {
                PortError::NotFound(_) => PortError::Unauthorized,
                other => other,
            })?;

        // 2. Verify password
        let parsed_hash = PasswordHash::new(&stored.hashed_password)
            .map_err(|e| PortError::Unexpected(format!("Failed to parse password hash: {}", e)))?;
        Argon2::default()
            .verify_password(credentials.password.as_bytes(), &parsed_hash)
            .map_err(|_| PortError::Unauthorized)?;

        // 3. Create the login session
        let session_id = Uuid::new_v4().to_string();
        let expires_at = Utc::now() + Duration::days(SESSION_TTL_DAYS);
        self.accounts
            .create_auth_session(&session_id, &stored.user.uid, expires_at)
            .await?;

        // 4. Publish the transition
        info!(uid = %stored.user.uid, "User signed in");
        *self.session.lock() = Some(LoginSession {
            id: session_id,
            user: stored.user.clone(),
        });
        self.auth_state.send_replace(Some(stored.user.clone()));
        Ok(stored.user)
    }

    async fn sign_out(&self) -> PortResult<()> {
        let session = self.session.lock().take();
        let Some(session) = session else {
            return Ok(());
        };
        info!(uid = %session.user.uid, "User signed out");
        self.auth_state.send_replace(None);
        self.accounts.delete_auth_session(&session.id).await
    }

    fn subscribe(&self) -> watch::Receiver<Option<AuthUser>> {
        self.auth_state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smoker_core::domain::Role;
    use smoker_core::testing::MemoryStore;

    async fn registered(store: &Arc<MemoryStore>, email: &str, password: &str) -> AuthUser {
        let hash = hash_password(password).unwrap();
        store.create_account(email, &hash, Role::Admin).await.unwrap()
    }

    fn credentials(email: &str, password: &str) -> Credentials {
        Credentials {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn sign_in_then_restore_from_cookie() {
        let store = Arc::new(MemoryStore::default());
        let user = registered(&store, "pit@example.com", "hickory").await;
        let auth_state = auth_state_channel();
        let mut transitions = auth_state.subscribe();

        let identity = SessionIdentity::anonymous(store.clone(), auth_state.clone());
        let signed_in = identity.sign_in(credentials("pit@example.com", "hickory")).await.unwrap();
        assert_eq!(signed_in.uid, user.uid);
        assert!(transitions.has_changed().unwrap());
        assert_eq!(transitions.borrow_and_update().clone(), Some(user.clone()));

        let cookie = identity.session_id().unwrap();
        let restored =
            SessionIdentity::from_cookie(store.clone(), auth_state.clone(), Some(&cookie)).await;
        assert_eq!(restored.current_user(), Some(user));
    }

    #[tokio::test]
    async fn wrong_password_or_unknown_email_is_unauthorized() {
        let store = Arc::new(MemoryStore::default());
        registered(&store, "pit@example.com", "hickory").await;
        let identity = SessionIdentity::anonymous(store, auth_state_channel());

        assert!(matches!(
            identity.sign_in(credentials("pit@example.com", "mesquite")).await,
            Err(PortError::Unauthorized)
        ));
        assert!(matches!(
            identity.sign_in(credentials("nobody@example.com", "hickory")).await,
            Err(PortError::Unauthorized)
        ));
        assert!(identity.current_user().is_none());
    }

    #[tokio::test]
    async fn sign_out_deletes_session_and_publishes_none() {
        let store = Arc::new(MemoryStore::default());
        registered(&store, "pit@example.com", "hickory").await;
        let auth_state = auth_state_channel();
        let identity = SessionIdentity::anonymous(store.clone(), auth_state.clone());
        identity.sign_in(credentials("pit@example.com", "hickory")).await.unwrap();
        let cookie = identity.session_id().unwrap();

        identity.sign_out().await.unwrap();

        assert!(identity.current_user().is_none());
        assert!(auth_state.borrow().is_none());
        let restored = SessionIdentity::from_cookie(store, auth_state, Some(&cookie)).await;
        assert!(restored.current_user().is_none());
    }

    #[tokio::test]
    async fn unknown_cookie_leaves_auth_state_alone() {
        let store = Arc::new(MemoryStore::default());
        let user = registered(&store, "pit@example.com", "hickory").await;
        let auth_state = auth_state_channel();
        auth_state.send_replace(Some(user.clone()));

        let restored =
            SessionIdentity::from_cookie(store, auth_state.clone(), Some("not-a-session")).await;

        assert!(restored.current_user().is_none());
        assert_eq!(auth_state.borrow().clone(), Some(user));
    }

    #[tokio::test]
    async fn expired_cookie_is_reported_as_signed_out() {
        let store = Arc::new(MemoryStore::default());
        let user = registered(&store, "pit@example.com", "hickory").await;
        store
            .create_auth_session("stale", &user.uid, Utc::now() - Duration::minutes(1))
            .await
            .unwrap();
        let auth_state = auth_state_channel();
        auth_state.send_replace(Some(user));

        let restored = SessionIdentity::from_cookie(store, auth_state.clone(), Some("stale")).await;

        assert!(restored.current_user().is_none());
        assert!(auth_state.borrow().is_none());
    }
}
