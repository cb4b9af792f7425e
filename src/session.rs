//! Credential Cache
//!
//! Per-actor ephemeral sessions so an upstream login survives across
//! independent command invocations. Sessions live in memory only,
//! expire after a fixed TTL, and are evicted lazily on read. The raw
//! secret is used for the exchange call and retained nowhere; the
//! refresh token never leaves this module.

use crate::client::ResilientClient;
use crate::clock::Clock;
use crate::{ActorKey, RelayError};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Stored proof of one actor's upstream authentication.
struct Session {
    access: String,
    #[allow(dead_code)]
    refresh: Option<String>,
    username: String,
    tenant: String,
    #[allow(dead_code)]
    created_at: Instant,
    expires_at: Instant,
}

/// Redacted descriptor returned by a successful login. Carries no
/// credential material.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginReceipt {
    pub username: String,
    pub tenant: String,
}

/// Identity of an authenticated actor, for display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserInfo {
    pub username: String,
    pub tenant: String,
}

/// Per-actor session store with TTL. At most one session per actor;
/// a new login replaces the old one entirely.
pub struct CredentialCache {
    sessions: DashMap<ActorKey, Session>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl CredentialCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
            clock,
        }
    }

    /// Drive the credential exchange through the tenant's client and
    /// cache the resulting session. On any failure nothing is stored
    /// and the client's classification is forwarded unchanged, so
    /// callers can tell a rejected password (`InvalidCredentials`)
    /// from a panel outage (`UpstreamUnavailable`).
    pub async fn login(
        &self,
        actor: ActorKey,
        username: &str,
        secret: &str,
        client: &ResilientClient,
    ) -> Result<LoginReceipt, RelayError> {
        let tokens = client.login(username, secret).await?;

        let now = self.clock.now();
        let session = Session {
            access: tokens.access,
            refresh: tokens.refresh,
            username: username.to_string(),
            tenant: client.domain().to_string(),
            created_at: now,
            expires_at: now + self.ttl,
        };

        // Last-write-wins: a re-login drops any previous session.
        self.sessions.insert(actor, session);
        tracing::info!(actor, username, tenant = client.domain(), "login succeeded");

        Ok(LoginReceipt {
            username: username.to_string(),
            tenant: client.domain().to_string(),
        })
    }

    /// Access token for `actor`, or `None` when there is no session
    /// or it has expired. Expired entries are evicted here and are
    /// never returned.
    pub fn get_token(&self, actor: ActorKey) -> Option<String> {
        if self.evict_if_expired(actor) {
            return None;
        }
        self.sessions.get(&actor).map(|s| s.access.clone())
    }

    pub fn is_authenticated(&self, actor: ActorKey) -> bool {
        self.get_token(actor).is_some()
    }

    /// Unconditional, idempotent session removal.
    pub fn logout(&self, actor: ActorKey) {
        if self.sessions.remove(&actor).is_some() {
            tracing::info!(actor, "logged out");
        }
    }

    /// Username and tenant of the authenticated actor, under the same
    /// expiry rule as `get_token`.
    pub fn get_user_info(&self, actor: ActorKey) -> Option<UserInfo> {
        if self.evict_if_expired(actor) {
            return None;
        }
        self.sessions.get(&actor).map(|s| UserInfo {
            username: s.username.clone(),
            tenant: s.tenant.clone(),
        })
    }

    /// Remaining session lifetime, for display. `None` without a live
    /// session.
    pub fn expires_in(&self, actor: ActorKey) -> Option<Duration> {
        if self.evict_if_expired(actor) {
            return None;
        }
        let session = self.sessions.get(&actor)?;
        Some(session.expires_at - self.clock.now())
    }

    /// Returns true when the actor's session existed but was expired,
    /// removing it as a side effect.
    fn evict_if_expired(&self, actor: ActorKey) -> bool {
        let expired = match self.sessions.get(&actor) {
            Some(session) => self.clock.now() >= session.expires_at,
            None => return false,
        };
        if expired {
            self.sessions.remove(&actor);
            tracing::debug!(actor, "expired session evicted");
        }
        expired
    }

    #[cfg(test)]
    fn insert_for_test(&self, actor: ActorKey, access: &str, tenant: &str) {
        let now = self.clock.now();
        self.sessions.insert(
            actor,
            Session {
                access: access.to_string(),
                refresh: None,
                username: "tester".to_string(),
                tenant: tenant.to_string(),
                created_at: now,
                expires_at: now + self.ttl,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;

    fn cache(ttl_secs: u64) -> (CredentialCache, Arc<MockClock>) {
        let clock = MockClock::new();
        let cache = CredentialCache::new(Duration::from_secs(ttl_secs), clock.clone());
        (cache, clock)
    }

    #[test]
    fn no_session_means_no_token() {
        let (cache, _) = cache(3600);
        assert_eq!(cache.get_token(1), None);
        assert!(!cache.is_authenticated(1));
        assert_eq!(cache.get_user_info(1), None);
    }

    #[test]
    fn live_session_yields_token_and_info() {
        let (cache, _) = cache(3600);
        cache.insert_for_test(1, "tok-abc", "example.com");

        assert_eq!(cache.get_token(1).as_deref(), Some("tok-abc"));
        assert!(cache.is_authenticated(1));

        let info = cache.get_user_info(1).unwrap();
        assert_eq!(info.username, "tester");
        assert_eq!(info.tenant, "example.com");
    }

    #[test]
    fn expired_session_behaves_like_none() {
        let (cache, clock) = cache(3600);
        cache.insert_for_test(1, "tok-abc", "example.com");

        clock.advance(Duration::from_secs(3600));

        assert_eq!(cache.get_token(1), None);
        assert!(!cache.is_authenticated(1));
        assert_eq!(cache.get_user_info(1), None);
    }

    #[test]
    fn expiry_evicts_on_read() {
        let (cache, clock) = cache(60);
        cache.insert_for_test(1, "tok-abc", "example.com");

        clock.advance(Duration::from_secs(61));
        assert_eq!(cache.get_token(1), None);
        assert!(cache.sessions.is_empty());
    }

    #[test]
    fn logout_is_idempotent() {
        let (cache, _) = cache(3600);
        cache.insert_for_test(1, "tok-abc", "example.com");

        cache.logout(1);
        assert_eq!(cache.get_token(1), None);

        cache.logout(1);
        assert_eq!(cache.get_token(1), None);
    }

    #[test]
    fn sessions_are_isolated_per_actor() {
        let (cache, _) = cache(3600);
        cache.insert_for_test(1, "tok-one", "example.com");
        cache.insert_for_test(2, "tok-two", "other.com");

        cache.logout(1);

        assert_eq!(cache.get_token(1), None);
        assert_eq!(cache.get_token(2).as_deref(), Some("tok-two"));
    }

    #[test]
    fn relogin_replaces_previous_session() {
        let (cache, clock) = cache(3600);
        cache.insert_for_test(1, "tok-old", "example.com");

        clock.advance(Duration::from_secs(1800));
        cache.insert_for_test(1, "tok-new", "fresh.com");

        assert_eq!(cache.get_token(1).as_deref(), Some("tok-new"));

        // The replacement carries a full TTL from its own creation.
        clock.advance(Duration::from_secs(1801));
        assert_eq!(cache.get_token(1).as_deref(), Some("tok-new"));
    }

    #[test]
    fn expires_in_counts_down() {
        let (cache, clock) = cache(3600);
        cache.insert_for_test(1, "tok-abc", "example.com");

        clock.advance(Duration::from_secs(600));
        assert_eq!(cache.expires_in(1), Some(Duration::from_secs(3000)));
    }
}
