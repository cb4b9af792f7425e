//! Tenant Registry
//!
//! One client handle per normalized tenant domain, kept for the
//! process lifetime. Bounded in practice by the number of configured
//! tenants, so nothing is auto-evicted.

use crate::client::ResilientClient;
use crate::domain::normalize_domain;
use crate::{ClientConfig, RelayError};
use dashmap::DashMap;
use std::sync::Arc;

/// Cache of per-tenant clients keyed by canonical domain.
pub struct TenantRegistry {
    clients: DashMap<String, Arc<ResilientClient>>,
    config: ClientConfig,
}

impl TenantRegistry {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            clients: DashMap::new(),
            config,
        }
    }

    /// Resolve the client for a tenant, constructing one the first
    /// time a domain (in any spelling) is seen.
    pub fn get_or_create(&self, domain: &str) -> Result<Arc<ResilientClient>, RelayError> {
        let key = normalize_domain(domain);

        if let Some(existing) = self.clients.get(&key) {
            return Ok(existing.clone());
        }

        match self.clients.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => Ok(entry.get().clone()),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let client = Arc::new(ResilientClient::new(&key, &self.config)?);
                tracing::debug!(tenant = %key, "tenant client created");
                entry.insert(client.clone());
                Ok(client)
            }
        }
    }

    /// Number of distinct tenants seen so far.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Close every handle and drop the map. Idempotent; meant for
    /// process shutdown.
    pub fn shutdown(&self) {
        for entry in self.clients.iter() {
            entry.value().close();
        }
        self.clients.clear();
        tracing::info!("tenant registry shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TenantRegistry {
        TenantRegistry::new(ClientConfig::default())
    }

    #[test]
    fn same_domain_reuses_the_handle() {
        let registry = registry();

        let a = registry.get_or_create("example.com").unwrap();
        let b = registry.get_or_create("example.com").unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn equivalent_spellings_share_one_handle() {
        let registry = registry();

        let a = registry.get_or_create("HTTPS://Example.COM/").unwrap();
        let b = registry.get_or_create("www.example.com").unwrap();
        let c = registry.get_or_create("example.com").unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&b, &c));
        assert_eq!(registry.len(), 1);
        assert_eq!(a.domain(), "example.com");
    }

    #[test]
    fn distinct_domains_get_distinct_handles() {
        let registry = registry();

        let a = registry.get_or_create("example.com").unwrap();
        let b = registry.get_or_create("other.net").unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn shutdown_clears_and_is_idempotent() {
        let registry = registry();
        registry.get_or_create("example.com").unwrap();

        registry.shutdown();
        assert!(registry.is_empty());

        registry.shutdown();
        assert!(registry.is_empty());

        // The registry still works afterwards; a new handle is built.
        let fresh = registry.get_or_create("example.com").unwrap();
        assert_eq!(fresh.domain(), "example.com");
    }
}
