//! Canonical cache key for pooled sessions.

use serde::Serialize;

use crate::config::{AuthMechanism, ConnectionConfig, Partitioner};
use crate::error::ConfigError;

/// Canonical serialization of the connection-relevant settings.
///
/// Configs that differ only in broker order or surrounding whitespace map to
/// the same fingerprint; any other field difference maps to a different one.
/// Secrets are part of the key: two configs differing only by password must
/// not share a broker session. The key never leaves process memory and its
/// `Debug` form is redacted.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of a config.
    pub fn compute(config: &ConnectionConfig) -> Result<Self, ConfigError> {
        let mut brokers: Vec<String> = config
            .brokers
            .iter()
            .map(|broker| broker.trim().to_string())
            .collect();
        brokers.sort();

        // Field order is fixed by this struct, not by the caller.
        let canonical = Canonical {
            client_id: &config.client_id,
            brokers,
            mechanism: config.mechanism,
            username: config.username.as_deref(),
            password: config.password.as_ref().map(|p| p.expose_secret()),
            access_key_id: config.access_key_id.as_deref(),
            secret_access_key: config.secret_access_key.as_ref().map(|s| s.expose_secret()),
            authorization_identity: config.authorization_identity.as_deref(),
            tls_enabled: config.tls.enabled,
            tls_ca_cert: config.tls.ca_cert.as_deref(),
            tls_client_cert: config.tls.client_cert.as_deref(),
            tls_client_key: config.tls.client_key.as_ref().map(|k| k.expose_secret()),
            tls_reject_unauthorized: config.tls.reject_unauthorized,
            partitioner: config.partitioner,
        };
        Ok(Self(serde_json::to_string(&canonical)?))
    }
}

impl std::fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The canonical form embeds credentials; never print it.
        write!(f, "Fingerprint([REDACTED])")
    }
}

#[derive(Serialize)]
struct Canonical<'a> {
    client_id: &'a str,
    brokers: Vec<String>,
    mechanism: AuthMechanism,
    username: Option<&'a str>,
    password: Option<&'a str>,
    access_key_id: Option<&'a str>,
    secret_access_key: Option<&'a str>,
    authorization_identity: Option<&'a str>,
    tls_enabled: bool,
    tls_ca_cert: Option<&'a str>,
    tls_client_cert: Option<&'a str>,
    tls_client_key: Option<&'a str>,
    tls_reject_unauthorized: bool,
    partitioner: Partitioner,
}
