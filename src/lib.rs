//! Statrelay Governance Core
//!
//! Multi-tenant resource governance for a chat-integration relay that
//! forwards community commands to independently operated stats-panel
//! backends:
//!
//! - per-actor admission control (sliding-window rate limiting),
//! - short-lived credential caching so an upstream session survives
//!   across independent command invocations,
//! - resilient per-tenant API clients with bounded timeout and retry.
//!
//! # Flow
//!
//! ```text
//!  inbound command
//!        │
//!        ▼
//!  ┌────────────────────┐   denied    ┌──────────────────────────┐
//!  │ AdmissionController├────────────▶│ RateLimited { retry_after }│
//!  └─────────┬──────────┘             └──────────────────────────┘
//!            │ allowed
//!            ▼
//!  ┌────────────────────┐  normalize  ┌──────────────────────────┐
//!  │   TenantRegistry   ├────────────▶│ ResilientClient (per     │
//!  └─────────┬──────────┘   domain    │ tenant, timeout + retry) │
//!            │                        └──────────────────────────┘
//!            ▼
//!  ┌────────────────────┐
//!  │  CredentialCache   │  bearer token attached when the
//!  └────────────────────┘  operation needs identity
//! ```
//!
//! Everything is process-scoped and in-memory: limiter windows prune
//! lazily, sessions expire after a fixed TTL, client handles live
//! until shutdown. Nothing here persists or coordinates across
//! processes.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

pub mod admission;
pub mod client;
pub mod clock;
pub mod domain;
pub mod registry;
pub mod session;

// Re-exports
pub use admission::AdmissionController;
pub use client::{Method, RankKind, ResilientClient};
pub use clock::{Clock, SystemClock};
pub use domain::normalize_domain;
pub use registry::TenantRegistry;
pub use session::{CredentialCache, LoginReceipt, UserInfo};

/// Stable identity of a calling principal; rate-limit and session key.
pub type ActorKey = u64;

/// Name of a logical action under independent admission control.
pub type OperationKey = &'static str;

// =============================================================================
// Configuration
// =============================================================================

/// Top-level configuration for the governance core.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub rate_limit: RateLimitConfig,
    /// Cached session lifetime in seconds.
    pub session_ttl_secs: u64,
    pub client: ClientConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig::default(),
            session_ttl_secs: 3600,
            client: ClientConfig::default(),
        }
    }
}

/// Admission-control policy, per actor per operation.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window_seconds: 60,
        }
    }
}

/// Per-tenant client behavior.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Wall-clock bound on one request attempt, in seconds.
    pub request_timeout_secs: u64,
    /// Total attempts per call, first try included.
    pub max_retry_attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 10,
            max_retry_attempts: 3,
        }
    }
}

impl RelayConfig {
    /// Load configuration from `RELAY__`-prefixed environment
    /// variables (e.g. `RELAY__RATE_LIMIT__MAX_REQUESTS=20`), falling
    /// back to the defaults above for anything unset.
    pub fn from_env() -> Result<Self, RelayError> {
        let source = config::Environment::with_prefix("RELAY")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true);

        let cfg = config::Config::builder().add_source(source).build()?;
        Ok(cfg.try_deserialize()?)
    }
}

// =============================================================================
// Composition root
// =============================================================================

/// Owns the three shared-state components. The command layer holds
/// one of these and passes it by reference; there are no module-level
/// globals, so tests get isolated state per instance.
pub struct RelayCore {
    pub admission: AdmissionController,
    pub credentials: CredentialCache,
    pub tenants: TenantRegistry,
}

impl RelayCore {
    pub fn new(config: RelayConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Construct against an explicit clock. Production uses
    /// [`SystemClock`]; tests inject a controllable one.
    pub fn with_clock(config: RelayConfig, clock: Arc<dyn Clock>) -> Self {
        let admission = AdmissionController::new(
            config.rate_limit.max_requests,
            Duration::from_secs(config.rate_limit.window_seconds),
            clock.clone(),
        );
        let credentials =
            CredentialCache::new(Duration::from_secs(config.session_ttl_secs), clock);
        let tenants = TenantRegistry::new(config.client);

        Self {
            admission,
            credentials,
            tenants,
        }
    }

    /// Admission check in error-taxonomy form: denial carries the
    /// exact wait until the next call can succeed.
    pub fn admit(&self, actor: ActorKey, operation: OperationKey) -> Result<(), RelayError> {
        if self.admission.check(actor, operation) {
            Ok(())
        } else {
            Err(RelayError::RateLimited {
                retry_after: self.admission.retry_after(actor, operation),
            })
        }
    }

    /// Access token for operations that need identity; `None` becomes
    /// `Unauthenticated` so the front-end can prompt a re-login.
    pub fn require_token(&self, actor: ActorKey) -> Result<String, RelayError> {
        self.credentials
            .get_token(actor)
            .ok_or(RelayError::Unauthenticated)
    }

    /// Release all tenant clients. Idempotent; limiter and session
    /// state simply drops with the value.
    pub fn shutdown(&self) {
        self.tenants.shutdown();
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Failure taxonomy surfaced to the command layer.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Denied by admission control; transient, with an exact wait.
    #[error("rate limited, retry in {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// No valid session; the caller must drive a login.
    #[error("not authenticated")]
    Unauthenticated,

    /// Upstream 404. Terminal, never retried.
    #[error("not found upstream")]
    UpstreamNotFound,

    /// Timeout, connection failure, 5xx, or unparseable body, after
    /// the retry budget is exhausted.
    #[error("tenant backend unavailable")]
    UpstreamUnavailable,

    /// The credential exchange was explicitly rejected. Never
    /// retried; distinct from transient failure.
    #[error("credentials rejected")]
    InvalidCredentials,

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Client construction failure (TLS backend, invalid settings).
    /// Transport errors during requests are classified, not
    /// propagated raw.
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment_policy() {
        let config = RelayConfig::default();
        assert_eq!(config.rate_limit.max_requests, 10);
        assert_eq!(config.rate_limit.window_seconds, 60);
        assert_eq!(config.session_ttl_secs, 3600);
        assert_eq!(config.client.request_timeout_secs, 10);
        assert_eq!(config.client.max_retry_attempts, 3);
    }

    #[test]
    fn env_overrides_land_and_unset_keys_keep_defaults() {
        std::env::set_var("RELAY__RATE_LIMIT__MAX_REQUESTS", "20");
        std::env::set_var("RELAY__SESSION_TTL_SECS", "120");
        std::env::set_var("RELAY__CLIENT__MAX_RETRY_ATTEMPTS", "5");

        let config = RelayConfig::from_env().expect("env config loads");

        std::env::remove_var("RELAY__RATE_LIMIT__MAX_REQUESTS");
        std::env::remove_var("RELAY__SESSION_TTL_SECS");
        std::env::remove_var("RELAY__CLIENT__MAX_RETRY_ATTEMPTS");

        assert_eq!(config.rate_limit.max_requests, 20);
        assert_eq!(config.session_ttl_secs, 120);
        assert_eq!(config.client.max_retry_attempts, 5);

        // Untouched keys fall back to the deployment defaults.
        assert_eq!(config.rate_limit.window_seconds, 60);
        assert_eq!(config.client.request_timeout_secs, 10);
    }

    #[test]
    fn core_wires_components_from_config() {
        let core = RelayCore::new(RelayConfig {
            rate_limit: RateLimitConfig {
                max_requests: 2,
                window_seconds: 60,
            },
            ..RelayConfig::default()
        });

        assert!(core.admit(7, "status").is_ok());
        assert!(core.admit(7, "status").is_ok());
        match core.admit(7, "status") {
            Err(RelayError::RateLimited { retry_after }) => {
                assert!(retry_after <= Duration::from_secs(60));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn require_token_maps_missing_session() {
        let core = RelayCore::new(RelayConfig::default());
        assert!(matches!(
            core.require_token(9),
            Err(RelayError::Unauthenticated)
        ));
    }

    #[test]
    fn shutdown_is_idempotent() {
        let core = RelayCore::new(RelayConfig::default());
        core.tenants.get_or_create("example.com").unwrap();

        core.shutdown();
        core.shutdown();
        assert!(core.tenants.is_empty());
    }
}
