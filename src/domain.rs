//! Tenant Domain Normalization
//!
//! Tenants are addressed by panel domain. Operators type them in every
//! shape imaginable; everything downstream (registry keys, session
//! tenant tags, display) must agree on one canonical form.

/// Normalize a tenant-supplied address into a canonical host string.
///
/// Lower-cases, strips a leading `http://`/`https://` scheme, trailing
/// `/` characters, and a leading `www.` label. Pure and deterministic:
/// inputs normalizing equal are the same tenant everywhere.
pub fn normalize_domain(input: &str) -> String {
    let mut domain = input.trim().to_lowercase();

    if let Some(rest) = domain.strip_prefix("http://") {
        domain = rest.to_string();
    } else if let Some(rest) = domain.strip_prefix("https://") {
        domain = rest.to_string();
    }

    domain.truncate(domain.trim_end_matches('/').len());

    if let Some(rest) = domain.strip_prefix("www.") {
        domain = rest.to_string();
    }

    domain
}
