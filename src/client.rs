//! Resilient Tenant Client
//!
//! HTTP executor for one tenant panel backend. Every tenant is
//! independently operated and independently healthy, so the client
//! carries no shared state: a failing tenant never affects another.
//!
//! Outcome classification per attempt:
//! - 2xx with a parseable JSON body is success;
//! - 404 is terminal ("absent"), returned immediately and never
//!   retried;
//! - everything else (connect failure, timeout, 5xx, unparseable
//!   body) is retryable with identical parameters up to
//!   `max_retry_attempts` total attempts.

use crate::domain::normalize_domain;
use crate::{ClientConfig, RelayError};
pub use reqwest::Method;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Leaderboard flavors exposed by the panel API.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RankKind {
    Pvp,
    Pk,
    Level,
    Clan,
    Rich,
    Online,
}

impl RankKind {
    fn path(self) -> &'static str {
        match self {
            RankKind::Pvp => "/server/top-pvp/",
            RankKind::Pk => "/server/top-pk/",
            RankKind::Level => "/server/top-level/",
            RankKind::Clan => "/server/top-clan/",
            RankKind::Rich => "/server/top-rich/",
            RankKind::Online => "/server/top-online/",
        }
    }
}

/// Token pair returned by the upstream credential exchange. Stays
/// inside the crate; the credential cache is the only consumer.
#[derive(Debug, Deserialize)]
pub(crate) struct LoginTokens {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

/// Per-tenant call executor with bounded timeout and retry.
pub struct ResilientClient {
    domain: String,
    base_url: String,
    http: reqwest::Client,
    max_attempts: u32,
    closed: AtomicBool,
}

impl ResilientClient {
    /// Create a client for a tenant panel, addressed as
    /// `https://{normalized-domain}/api/v1`.
    pub fn new(domain: &str, config: &ClientConfig) -> Result<Self, RelayError> {
        let domain = normalize_domain(domain);
        let base_url = format!("https://{domain}/api/v1");
        Self::with_base_url(&domain, &base_url, config)
    }

    /// Create a client against an explicit base address. Used for
    /// deployments behind nonstandard schemes or ports, and by tests
    /// pointing at a local stub server.
    pub fn with_base_url(
        domain: &str,
        base_url: &str,
        config: &ClientConfig,
    ) -> Result<Self, RelayError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            domain: normalize_domain(domain),
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            max_attempts: config.max_retry_attempts.max(1),
            closed: AtomicBool::new(false),
        })
    }

    /// Canonical tenant domain this client serves.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Release the transport. Idempotent; a closed client answers
    /// every call with `UpstreamUnavailable` without touching the
    /// network, and pooled connections drop with the handle.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!(domain = %self.domain, "tenant client closed");
        }
    }

    /// Whether the backend answers at all. Any HTTP response, status
    /// regardless, means the panel is up; only transport-level
    /// failure counts as down. A single probe, outside the retry
    /// loop.
    pub async fn check_health(&self) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }

        let url = format!("{}/health/", self.base_url);
        match self.http.get(&url).send().await {
            Ok(response) => {
                tracing::debug!(domain = %self.domain, status = %response.status(), "health probe answered");
                true
            }
            Err(err) => {
                tracing::warn!(domain = %self.domain, error = %err, "health probe failed");
                false
            }
        }
    }

    /// Issue one governed call and return the parsed body. The typed
    /// wrappers below cover the known panel surface; this is the
    /// escape hatch for endpoints they don't.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        token: Option<&str>,
    ) -> Result<Value, RelayError> {
        self.execute(method, path, query, None, token, false).await
    }

    // =========================================================================
    // Public panel queries
    // =========================================================================

    pub async fn server_status(&self) -> Result<Value, RelayError> {
        self.get("/server/status/").await
    }

    pub async fn players_online(&self) -> Result<Value, RelayError> {
        self.get("/server/players-online/").await
    }

    /// Fetch a leaderboard, normalized to a flat record list. The
    /// limit is clamped to the upstream-accepted 1..=20 range.
    pub async fn top(&self, kind: RankKind, limit: usize) -> Result<Vec<Value>, RelayError> {
        let limit = clamp_limit(limit);
        let value = self
            .get_with_query(kind.path(), &[("limit", limit.to_string())])
            .await?;
        Ok(into_records(value))
    }

    pub async fn search_character(&self, name: &str) -> Result<Value, RelayError> {
        self.get_with_query("/search/character/", &[("name", name.to_string())])
            .await
    }

    pub async fn search_item(&self, name: &str) -> Result<Value, RelayError> {
        self.get_with_query("/search/item/", &[("name", name.to_string())])
            .await
    }

    /// Clan details by name. Path separators are stripped from the
    /// name before it is spliced into the URL.
    pub async fn clan_detail(&self, clan_name: &str) -> Result<Value, RelayError> {
        let sanitized: String = clan_name
            .trim()
            .chars()
            .filter(|c| *c != '/' && *c != '\\')
            .collect();
        self.get(&format!("/clan/{sanitized}/")).await
    }

    /// Auction house listing, normalized like the leaderboards.
    pub async fn auction_items(&self, limit: usize) -> Result<Vec<Value>, RelayError> {
        let limit = clamp_limit(limit);
        let value = self
            .get_with_query("/auction/items/", &[("limit", limit.to_string())])
            .await?;
        Ok(into_records(value))
    }

    pub async fn grandboss_status(&self) -> Result<Value, RelayError> {
        self.get("/server/grandboss-status/").await
    }

    pub async fn raidboss_status(&self) -> Result<Value, RelayError> {
        self.get("/server/raidboss-status/").await
    }

    pub async fn boss_jewel_locations(&self, jewel_ids: &[u32]) -> Result<Value, RelayError> {
        let ids = jewel_ids
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");
        self.get_with_query("/server/boss-jewel-locations/", &[("ids", ids)])
            .await
    }

    pub async fn olympiad_ranking(&self) -> Result<Value, RelayError> {
        self.get("/server/olympiad-ranking/").await
    }

    pub async fn olympiad_heroes(&self) -> Result<Value, RelayError> {
        self.get("/server/olympiad-heroes/").await
    }

    pub async fn olympiad_current_heroes(&self) -> Result<Value, RelayError> {
        self.get("/server/olympiad-current-heroes/").await
    }

    pub async fn siege_status(&self) -> Result<Value, RelayError> {
        self.get("/server/siege/").await
    }

    pub async fn siege_participants(&self, castle_id: u32) -> Result<Value, RelayError> {
        self.get(&format!("/server/siege-participants/{castle_id}/"))
            .await
    }

    /// Panel-side binding record for one chat community.
    pub async fn community_info(&self, community_id: u64) -> Result<Value, RelayError> {
        self.get(&format!("/discord/server/{community_id}/")).await
    }

    // =========================================================================
    // Authenticated endpoints
    // =========================================================================

    /// Credential exchange. Explicit upstream rejection (400, 401 or
    /// 403) is `InvalidCredentials`, terminal on first sight;
    /// transport trouble keeps the usual retry classification.
    pub(crate) async fn login(
        &self,
        username: &str,
        secret: &str,
    ) -> Result<LoginTokens, RelayError> {
        let body = json!({ "username": username, "password": secret });
        let value = self
            .execute(Method::POST, "/auth/login/", &[], Some(body), None, true)
            .await?;

        serde_json::from_value(value).map_err(|err| {
            tracing::warn!(domain = %self.domain, error = %err, "login response missing token fields");
            RelayError::UpstreamUnavailable
        })
    }

    pub async fn user_profile(&self, token: &str) -> Result<Value, RelayError> {
        self.get_authed("/user/profile/", token).await
    }

    pub async fn user_dashboard(&self, token: &str) -> Result<Value, RelayError> {
        self.get_authed("/user/dashboard/", token).await
    }

    pub async fn user_stats(&self, token: &str) -> Result<Value, RelayError> {
        self.get_authed("/user/stats/", token).await
    }

    // =========================================================================
    // HTTP core
    // =========================================================================

    async fn get(&self, path: &str) -> Result<Value, RelayError> {
        self.execute(Method::GET, path, &[], None, None, false).await
    }

    async fn get_with_query(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Value, RelayError> {
        self.execute(Method::GET, path, query, None, None, false)
            .await
    }

    async fn get_authed(&self, path: &str, token: &str) -> Result<Value, RelayError> {
        self.execute(Method::GET, path, &[], None, Some(token), false)
            .await
    }

    /// Retry loop shared by every endpoint. Identical parameters per
    /// attempt; each attempt is bounded by the client-wide timeout,
    /// and a timed-out attempt consumes one attempt from the budget.
    async fn execute(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<Value>,
        token: Option<&str>,
        credential_exchange: bool,
    ) -> Result<Value, RelayError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RelayError::UpstreamUnavailable);
        }

        let url = format!("{}{}", self.base_url, path);

        for attempt in 1..=self.max_attempts {
            let mut request = self.http.request(method.clone(), &url);
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(ref body) = body {
                request = request.json(body);
            }
            if let Some(token) = token {
                request = request.bearer_auth(token);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status == StatusCode::NOT_FOUND {
                        tracing::warn!(%url, "endpoint absent upstream");
                        return Err(RelayError::UpstreamNotFound);
                    }

                    let rejected = status == StatusCode::BAD_REQUEST
                        || status == StatusCode::UNAUTHORIZED
                        || status == StatusCode::FORBIDDEN;
                    if credential_exchange && rejected {
                        tracing::info!(domain = %self.domain, %status, "credential exchange rejected");
                        return Err(RelayError::InvalidCredentials);
                    }

                    if status.is_success() {
                        match response.json::<Value>().await {
                            Ok(value) => return Ok(value),
                            Err(err) => {
                                tracing::warn!(%url, attempt, error = %err, "unparseable body");
                            }
                        }
                    } else {
                        tracing::warn!(%url, %status, attempt, "upstream error status");
                    }
                }
                Err(err) => {
                    tracing::warn!(%url, attempt, error = %err, "transport failure");
                }
            }
        }

        tracing::warn!(%url, attempts = self.max_attempts, "retry budget exhausted");
        Err(RelayError::UpstreamUnavailable)
    }
}

/// Clamp a caller-supplied record limit to the upstream-accepted range.
fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, 20)
}

/// List endpoints answer either a bare array or an object wrapping
/// the array under `results`. Collapse both shapes into one sequence
/// type before anything downstream sees the data.
fn into_records(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("results") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_kinds_map_to_distinct_paths() {
        let kinds = [
            RankKind::Pvp,
            RankKind::Pk,
            RankKind::Level,
            RankKind::Clan,
            RankKind::Rich,
            RankKind::Online,
        ];
        let mut paths: Vec<&str> = kinds.iter().map(|k| k.path()).collect();
        paths.sort_unstable();
        paths.dedup();
        assert_eq!(paths.len(), kinds.len());
    }

    #[test]
    fn records_accept_bare_sequence() {
        let value = json!([{"name": "a"}, {"name": "b"}]);
        assert_eq!(into_records(value).len(), 2);
    }

    #[test]
    fn records_accept_wrapped_sequence() {
        let value = json!({"count": 2, "results": [{"name": "a"}, {"name": "b"}]});
        assert_eq!(into_records(value).len(), 2);
    }

    #[test]
    fn records_tolerate_unexpected_shapes() {
        assert!(into_records(json!({"detail": "nope"})).is_empty());
        assert!(into_records(json!("scalar")).is_empty());
    }

    #[test]
    fn limit_is_clamped_to_upstream_range() {
        assert_eq!(clamp_limit(0), 1);
        assert_eq!(clamp_limit(10), 10);
        assert_eq!(clamp_limit(500), 20);
    }
}
