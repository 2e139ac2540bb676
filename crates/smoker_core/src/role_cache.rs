//! crates/smoker_core/src/role_cache.rs
//!
//! Maps user identifiers to their resolved role. Entries never expire on their
//! own; the whole map is dropped whenever the identity provider reports that
//! nobody is signed in any more.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info};

use crate::domain::{AuthUser, Role};

#[derive(Debug, Default)]
pub struct RoleCache {
    entries: RwLock<HashMap<String, Role>>,
}

impl RoleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, uid: &str) -> Option<Role> {
        self.entries.read().get(uid).copied()
    }

    /// Upserts, overwriting any previous role for `uid`.
    pub fn set(&self, uid: impl Into<String>, role: Role) {
        self.entries.write().insert(uid.into(), role);
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write();
        debug!(entries = entries.len(), "Clearing role cache");
        entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Spawns the listener that clears `cache` once for every transition from
/// signed-in to signed-out observed on `auth_state`.
///
/// The task ends when the identity provider drops its sender.
pub fn watch_auth_state(
    cache: Arc<RoleCache>,
    mut auth_state: watch::Receiver<Option<AuthUser>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut signed_in = auth_state.borrow_and_update().is_some();
        while auth_state.changed().await.is_ok() {
            let now_signed_in = auth_state.borrow_and_update().is_some();
            if signed_in && !now_signed_in {
                info!("User signed out, invalidating role cache.");
                cache.clear();
            }
            signed_in = now_signed_in;
        }
        debug!("Auth state channel closed, role cache listener exiting.");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn user(uid: &str) -> AuthUser {
        AuthUser {
            uid: uid.to_string(),
            email: None,
        }
    }

    #[test]
    fn get_returns_last_set_role_until_cleared() {
        let cache = RoleCache::new();
        assert_eq!(cache.get("u1"), None);

        cache.set("u1", Role::User);
        assert_eq!(cache.get("u1"), Some(Role::User));

        cache.set("u1", Role::Admin);
        assert_eq!(cache.get("u1"), Some(Role::Admin));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn clear_drops_every_entry() {
        let cache = RoleCache::new();
        cache.set("u1", Role::User);
        cache.set("u2", Role::Admin);

        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.get("u1"), None);
        assert_eq!(cache.get("u2"), None);
    }

    #[tokio::test]
    async fn sign_out_transition_clears_cache() {
        let cache = Arc::new(RoleCache::new());
        let (tx, rx) = watch::channel(Some(user("u1")));
        let listener = watch_auth_state(cache.clone(), rx);

        cache.set("u1", Role::Admin);
        tx.send(None).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.is_empty());

        // Signing in again must not wipe entries resolved for the new session.
        tx.send(Some(user("u2"))).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        cache.set("u2", Role::User);
        tx.send(Some(user("u3"))).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("u2"), Some(Role::User));

        drop(tx);
        listener.await.unwrap();
    }

    #[tokio::test]
    async fn starting_signed_out_does_not_clear() {
        let cache = Arc::new(RoleCache::new());
        let (tx, rx) = watch::channel(None);
        let _listener = watch_auth_state(cache.clone(), rx);

        cache.set("u1", Role::User);
        tx.send(None).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("u1"), Some(Role::User));
    }
}
