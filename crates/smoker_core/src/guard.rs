//! crates/smoker_core/src/guard.rs
//!
//! The navigation guard. Every navigation attempt is checked against the
//! matched route's metadata and the user's role, which is resolved through
//! the role cache and, on a miss, the `users` collection.

use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::domain::{Role, LOGIN_PATH};
use crate::ports::{DocumentStore, IdentityProvider, PortResult};
use crate::role_cache::RoleCache;
use crate::routes::MatchedRoute;

/// The outcome of a guard evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationDecision {
    Proceed,
    Redirect(String),
}

/// What to do when the role cannot be resolved because the store failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GuardFailurePolicy {
    /// Admit the navigation without a resolved role.
    #[default]
    FailOpen,
    /// Send the user back to the login route.
    FailClosed,
}

pub struct RouteGuard {
    cache: Arc<RoleCache>,
    store: Arc<dyn DocumentStore>,
    policy: GuardFailurePolicy,
}

impl RouteGuard {
    pub fn new(
        cache: Arc<RoleCache>,
        store: Arc<dyn DocumentStore>,
        policy: GuardFailurePolicy,
    ) -> Self {
        Self {
            cache,
            store,
            policy,
        }
    }

    /// Evaluates one navigation attempt from `from` to `to` on behalf of whoever
    /// `identity` reports as signed in.
    pub async fn before_each(
        &self,
        to: &MatchedRoute<'_>,
        from: Option<&str>,
        identity: &dyn IdentityProvider,
    ) -> NavigationDecision {
        if !to.requires_auth() {
            return NavigationDecision::Proceed;
        }

        let Some(user) = identity.current_user() else {
            debug!(to = %to.path, ?from, "Unauthenticated navigation, redirecting to login");
            return NavigationDecision::Redirect(LOGIN_PATH.to_string());
        };

        let role = match self.resolve_role(&user.uid).await {
            Ok(Some(role)) => role,
            Ok(None) => {
                warn!(uid = %user.uid, "No role document for user, signing out");
                if let Err(e) = identity.sign_out().await {
                    error!(uid = %user.uid, "Failed to sign out orphaned user: {:?}", e);
                }
                return NavigationDecision::Redirect(LOGIN_PATH.to_string());
            }
            Err(e) => {
                return match self.policy {
                    GuardFailurePolicy::FailOpen => {
                        warn!(uid = %user.uid, to = %to.path, "Role lookup failed, admitting navigation: {:?}", e);
                        NavigationDecision::Proceed
                    }
                    GuardFailurePolicy::FailClosed => {
                        warn!(uid = %user.uid, to = %to.path, "Role lookup failed, denying navigation: {:?}", e);
                        NavigationDecision::Redirect(LOGIN_PATH.to_string())
                    }
                };
            }
        };

        if Some(role) == to.required_role() {
            NavigationDecision::Proceed
        } else {
            debug!(uid = %user.uid, %role, to = %to.path, "Role mismatch, redirecting to own dashboard");
            NavigationDecision::Redirect(role.dashboard_path().to_string())
        }
    }

    async fn resolve_role(&self, uid: &str) -> PortResult<Option<Role>> {
        if let Some(role) = self.cache.get(uid) {
            return Ok(Some(role));
        }
        let role = self.store.get_user_role(uid).await?;
        if let Some(role) = role {
            self.cache.set(uid, role);
        }
        Ok(role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RouteMeta, ADMIN_DASHBOARD_PATH, USER_DASHBOARD_PATH};
    use crate::routes::{Resolution, RouteRecord, RouteTable};
    use crate::testing::{FakeIdentity, MemoryStore};

    fn table() -> RouteTable {
        RouteTable::new(vec![
            RouteRecord::new("/login", RouteMeta::public()),
            RouteRecord::new("/admin-dashboard", RouteMeta::protected(Role::Admin)),
            RouteRecord::new("/user-dashboard", RouteMeta::protected(Role::User)),
        ])
    }

    fn guard(store: Arc<MemoryStore>, policy: GuardFailurePolicy) -> (RouteGuard, Arc<RoleCache>) {
        let cache = Arc::new(RoleCache::new());
        (RouteGuard::new(cache.clone(), store, policy), cache)
    }

    async fn navigate(
        guard: &RouteGuard,
        table: &RouteTable,
        path: &str,
        identity: &FakeIdentity,
    ) -> NavigationDecision {
        match table.resolve(path) {
            Resolution::Matched(route) => guard.before_each(&route, None, identity).await,
            other => panic!("unexpected resolution {:?}", other),
        }
    }

    #[tokio::test]
    async fn public_route_is_always_admitted() {
        let store = Arc::new(MemoryStore::default());
        store.fail_reads(true);
        let (guard, _) = guard(store, GuardFailurePolicy::FailClosed);
        let table = table();

        for identity in [FakeIdentity::signed_out(), FakeIdentity::signed_in("u1")] {
            assert_eq!(
                navigate(&guard, &table, "/login", &identity).await,
                NavigationDecision::Proceed
            );
        }
    }

    #[tokio::test]
    async fn protected_route_without_user_redirects_to_login() {
        let (guard, _) = guard(Arc::new(MemoryStore::default()), GuardFailurePolicy::FailOpen);
        let decision = navigate(&guard, &table(), "/admin-dashboard", &FakeIdentity::signed_out()).await;
        assert_eq!(decision, NavigationDecision::Redirect(LOGIN_PATH.to_string()));
    }

    #[tokio::test]
    async fn matching_role_is_admitted_and_cached() {
        let store = Arc::new(MemoryStore::default());
        store.put_role("a1", Role::Admin);
        let (guard, cache) = guard(store.clone(), GuardFailurePolicy::FailOpen);
        let identity = FakeIdentity::signed_in("a1");

        let decision = navigate(&guard, &table(), "/admin-dashboard", &identity).await;
        assert_eq!(decision, NavigationDecision::Proceed);
        assert_eq!(cache.get("a1"), Some(Role::Admin));

        // A cache hit must not touch the store again.
        store.fail_reads(true);
        let decision = navigate(&guard, &table(), "/admin-dashboard", &identity).await;
        assert_eq!(decision, NavigationDecision::Proceed);
        assert_eq!(store.role_lookups(), 1);
    }

    #[tokio::test]
    async fn mismatched_role_goes_to_own_dashboard() {
        let store = Arc::new(MemoryStore::default());
        store.put_role("u1", Role::User);
        store.put_role("a1", Role::Admin);
        let (guard, _) = guard(store, GuardFailurePolicy::FailOpen);
        let table = table();

        let decision = navigate(&guard, &table, "/admin-dashboard", &FakeIdentity::signed_in("u1")).await;
        assert_eq!(decision, NavigationDecision::Redirect(USER_DASHBOARD_PATH.to_string()));

        let decision = navigate(&guard, &table, "/user-dashboard", &FakeIdentity::signed_in("a1")).await;
        assert_eq!(decision, NavigationDecision::Redirect(ADMIN_DASHBOARD_PATH.to_string()));
    }

    #[tokio::test]
    async fn missing_role_document_signs_out() {
        let (guard, cache) = guard(Arc::new(MemoryStore::default()), GuardFailurePolicy::FailOpen);
        let identity = FakeIdentity::signed_in("ghost");

        let decision = navigate(&guard, &table(), "/user-dashboard", &identity).await;

        assert_eq!(decision, NavigationDecision::Redirect(LOGIN_PATH.to_string()));
        assert_eq!(identity.sign_outs(), 1);
        assert!(identity.current_user().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn store_failure_fails_open_by_default() {
        let store = Arc::new(MemoryStore::default());
        store.fail_reads(true);
        let (guard, cache) = guard(store, GuardFailurePolicy::default());

        let decision = navigate(&guard, &table(), "/admin-dashboard", &FakeIdentity::signed_in("u1")).await;

        assert_eq!(decision, NavigationDecision::Proceed);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn store_failure_can_fail_closed() {
        let store = Arc::new(MemoryStore::default());
        store.fail_reads(true);
        let (guard, _) = guard(store, GuardFailurePolicy::FailClosed);

        let decision = navigate(&guard, &table(), "/admin-dashboard", &FakeIdentity::signed_in("u1")).await;

        assert_eq!(decision, NavigationDecision::Redirect(LOGIN_PATH.to_string()));
    }
}
