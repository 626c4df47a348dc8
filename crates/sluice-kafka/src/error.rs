//! Error types for configuration and broker transport failures.

use thiserror::Error;

// ============================================================================
// Configuration errors
// ============================================================================

/// Rejected connection settings.
///
/// These surface before any network activity and abort a dispatch call as a
/// whole; per-message outcomes are never produced for them.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Structural validation failed (empty broker list, blank client id, ...)
    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),

    /// A SASL mechanism was selected without username and password
    #[error("username and password are required for PLAIN and SCRAM authentication")]
    SaslCredentialsMissing,

    /// IAM authentication was selected without an access key pair
    #[error("access key id and secret access key are required for IAM authentication")]
    IamCredentialsMissing,

    /// Client-certificate authentication was selected without key material
    #[error("client certificate and client key are required for mutual TLS authentication")]
    ClientCertMaterialMissing,

    /// A broker endpoint is not of the form `host:port`
    #[error("invalid broker address {address:?}: {reason}")]
    InvalidBroker { address: String, reason: String },

    /// The canonical form of the settings could not be rendered
    #[error("failed to canonicalize connection settings: {0}")]
    Canonicalize(#[from] serde_json::Error),
}

impl ConfigError {
    /// Stable machine-readable code, for callers that map errors to a
    /// settings UI rather than parsing messages.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Invalid(_) => "INVALID_CONFIGURATION",
            Self::SaslCredentialsMissing => "SASL_PARAMS_MISSING",
            Self::IamCredentialsMissing => "SASL_AWS_PARAMS_MISSING",
            Self::ClientCertMaterialMissing => "SSL_CLIENT_CERT_AUTH_PARAMS_MISSING",
            Self::InvalidBroker { .. } => "INVALID_BROKER_ADDRESS",
            Self::Canonicalize(_) => "INVALID_CONFIGURATION",
        }
    }
}

// ============================================================================
// Transport errors
// ============================================================================

/// Failure reported by a [`Producer`](crate::producer::Producer)
/// implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not reach the brokers or establish a session
    #[error("broker connection failed: {0}")]
    Connection(String),

    /// The brokers rejected our credentials
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The operation did not complete within the client timeout
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The transport cannot express the requested configuration
    #[error("unsupported by this transport: {0}")]
    Unsupported(String),

    /// The brokers rejected a produce request
    #[error("produce failed: {message}")]
    Produce {
        message: String,
        /// Whether the client flagged the failure as safe to retry
        retriable: bool,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl TransportError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    pub fn produce(message: impl Into<String>, retriable: bool) -> Self {
        Self::Produce {
            message: message.into(),
            retriable,
            source: None,
        }
    }

    pub fn produce_with_source(
        message: impl Into<String>,
        retriable: bool,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Produce {
            message: message.into(),
            retriable,
            source: Some(Box::new(source)),
        }
    }

    /// Whether retrying the same request later could reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Timeout(_) | Self::Produce { retriable: true, .. }
        )
    }

    /// Message of the innermost cause in the source chain.
    ///
    /// Delivery reports prefer this over the wrapper text so that the broker
    /// protocol error is what operators see.
    pub fn root_cause_message(&self) -> String {
        let mut current: &dyn std::error::Error = self;
        while let Some(source) = current.source() {
            current = source;
        }
        current.to_string()
    }
}

/// Binary disposition of a failed send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Likely transient; the same batch is worth retrying later
    Retriable,
    /// Misconfiguration or a rejected request; a retry will not help
    Permanent,
}

impl FailureClass {
    /// Classify a transport failure.
    ///
    /// Anything not positively known to be retriable is treated as
    /// permanent, so unknown error shapes cannot trigger retry storms.
    pub fn of(error: &TransportError) -> Self {
        if error.is_retryable() {
            Self::Retriable
        } else {
            Self::Permanent
        }
    }

    /// HTTP-style status code reported for this class.
    pub fn status_code(self) -> u16 {
        match self {
            Self::Retriable => 500,
            Self::Permanent => 400,
        }
    }
}
