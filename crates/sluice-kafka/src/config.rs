//! Connection settings for a destination cluster.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::ConfigError;
use crate::types::SensitiveString;

// ============================================================================
// Enums
// ============================================================================

/// Authentication mechanism for the broker connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMechanism {
    /// SASL/PLAIN username and password
    #[default]
    Plain,
    /// SASL/SCRAM-SHA-256
    #[serde(rename = "scram-sha-256")]
    ScramSha256,
    /// SASL/SCRAM-SHA-512
    #[serde(rename = "scram-sha-512")]
    ScramSha512,
    /// Cloud IAM access-key authentication
    AwsIam,
    /// Mutual TLS with a client certificate and key
    ClientCert,
}

impl AuthMechanism {
    /// Whether this mechanism carries SASL username/password credentials.
    pub fn is_sasl(self) -> bool {
        matches!(self, Self::Plain | Self::ScramSha256 | Self::ScramSha512)
    }
}

/// Partitioner the producer uses for records without an explicit partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Partitioner {
    /// Hash keyed records, spread unkeyed records
    #[default]
    Default,
    /// Murmur2-compatible legacy placement
    Legacy,
}

// ============================================================================
// TLS
// ============================================================================

/// TLS flags and trust material.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct TlsOptions {
    /// Enable TLS with the system trust store
    #[serde(default)]
    pub enabled: bool,

    /// CA certificate used to verify the brokers (PEM, or just its base64 body)
    #[serde(default)]
    pub ca_cert: Option<String>,

    /// Client certificate for mutual TLS
    #[serde(default)]
    pub client_cert: Option<String>,

    /// Client private key for mutual TLS
    #[serde(default)]
    pub client_key: Option<SensitiveString>,

    /// Verify the broker certificate chain (default: true)
    #[serde(default = "default_true")]
    pub reject_unauthorized: bool,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            ca_cert: None,
            client_cert: None,
            client_key: None,
            reject_unauthorized: default_true(),
        }
    }
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Connection config
// ============================================================================

/// Settings identifying one broker connection.
///
/// Two configs with identical canonical form share a pooled session; see
/// [`Fingerprint`](crate::fingerprint::Fingerprint). Secrets are held as
/// [`SensitiveString`] so a serialized config never exposes them.
#[derive(Debug, Clone, Deserialize, Serialize, Validate, JsonSchema)]
pub struct ConnectionConfig {
    /// Client identity reported to the brokers
    #[validate(length(min = 1))]
    pub client_id: String,

    /// Broker endpoints as `host:port`
    #[validate(length(min = 1))]
    pub brokers: Vec<String>,

    /// Authentication mechanism
    #[serde(default)]
    pub mechanism: AuthMechanism,

    /// SASL username (PLAIN and SCRAM)
    #[serde(default)]
    pub username: Option<String>,

    /// SASL password (PLAIN and SCRAM)
    #[serde(default)]
    pub password: Option<SensitiveString>,

    /// IAM access key id
    #[serde(default)]
    pub access_key_id: Option<String>,

    /// IAM secret access key
    #[serde(default)]
    pub secret_access_key: Option<SensitiveString>,

    /// Identity to authorize as, when distinct from the IAM identity
    #[serde(default)]
    pub authorization_identity: Option<String>,

    /// TLS flags and trust material
    #[serde(default)]
    pub tls: TlsOptions,

    /// Partitioner for records without an explicit partition
    #[serde(default)]
    pub partitioner: Partitioner,
}

impl ConnectionConfig {
    /// Minimal config for the common SASL/PLAIN case.
    pub fn new(client_id: impl Into<String>, brokers: Vec<String>) -> Self {
        Self {
            client_id: client_id.into(),
            brokers,
            mechanism: AuthMechanism::default(),
            username: None,
            password: None,
            access_key_id: None,
            secret_access_key: None,
            authorization_identity: None,
            tls: TlsOptions::default(),
            partitioner: Partitioner::default(),
        }
    }

    /// Validate structure, credentials and broker addresses.
    ///
    /// Runs once per dispatch call, before any network activity. Blank
    /// strings count as absent, matching what settings UIs tend to submit.
    pub fn ensure_valid(&self) -> Result<(), ConfigError> {
        self.validate()?;
        self.check_credentials()?;
        for broker in &self.brokers {
            check_broker_address(broker)?;
        }
        Ok(())
    }

    fn check_credentials(&self) -> Result<(), ConfigError> {
        match self.mechanism {
            AuthMechanism::Plain | AuthMechanism::ScramSha256 | AuthMechanism::ScramSha512 => {
                let username_missing = self.username.as_deref().map_or(true, str::is_empty);
                let password_missing = self.password.as_ref().map_or(true, SensitiveString::is_empty);
                if username_missing || password_missing {
                    return Err(ConfigError::SaslCredentialsMissing);
                }
            }
            AuthMechanism::AwsIam => {
                let key_missing = self.access_key_id.as_deref().map_or(true, str::is_empty);
                let secret_missing = self
                    .secret_access_key
                    .as_ref()
                    .map_or(true, SensitiveString::is_empty);
                if key_missing || secret_missing {
                    return Err(ConfigError::IamCredentialsMissing);
                }
            }
            AuthMechanism::ClientCert => {
                let cert_missing = self.tls.client_cert.as_deref().map_or(true, str::is_empty);
                let key_missing = self
                    .tls
                    .client_key
                    .as_ref()
                    .map_or(true, SensitiveString::is_empty);
                if cert_missing || key_missing {
                    return Err(ConfigError::ClientCertMaterialMissing);
                }
            }
        }
        Ok(())
    }
}

/// Check one broker endpoint for `host:port` shape.
///
/// `rsplit_once` keeps IPv6 literals like `[::1]:9092` working.
fn check_broker_address(address: &str) -> Result<(), ConfigError> {
    let trimmed = address.trim();
    let Some((host, port)) = trimmed.rsplit_once(':') else {
        return Err(ConfigError::InvalidBroker {
            address: address.to_string(),
            reason: "expected host:port".to_string(),
        });
    };
    if host.is_empty() {
        return Err(ConfigError::InvalidBroker {
            address: address.to_string(),
            reason: "empty host".to_string(),
        });
    }
    if port.parse::<u16>().is_err() {
        return Err(ConfigError::InvalidBroker {
            address: address.to_string(),
            reason: format!("port {:?} is not a number in 0-65535", port),
        });
    }
    Ok(())
}
