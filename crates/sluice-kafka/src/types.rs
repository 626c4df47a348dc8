//! Shared value types.

use schemars::JsonSchema;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// A string that must never leak into logs or serialized output.
///
/// Holds SASL passwords, cloud secret keys and TLS private keys:
/// - `Debug` and `Display` print `[REDACTED]`
/// - serialization always emits `"***REDACTED***"`
/// - the real value is only reachable through [`expose_secret`](Self::expose_secret)
///
/// The intended exposure sites are fingerprint computation and transport
/// construction; everything else handles the wrapper.
#[derive(Clone)]
pub struct SensitiveString(SecretString);

impl SensitiveString {
    /// Wrap a secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::new(value.into().into_boxed_str()))
    }

    /// Expose the secret value. Use sparingly.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }

    /// Whether the wrapped value is the empty string.
    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }
}

impl std::fmt::Debug for SensitiveString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for SensitiveString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl From<String> for SensitiveString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SensitiveString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Always serializes as the redaction marker, never the value
impl Serialize for SensitiveString {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("***REDACTED***")
    }
}

/// Accepts the real value on the way in
impl<'de> Deserialize<'de> for SensitiveString {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::new(value))
    }
}

impl JsonSchema for SensitiveString {
    fn schema_name() -> String {
        "SensitiveString".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        // Plain string schema flagged as a password field
        let mut schema = gen.subschema_for::<String>();
        if let schemars::schema::Schema::Object(obj) = &mut schema {
            obj.format = Some("password".to_string());
            obj.metadata().description =
                Some("Sensitive value (passwords, keys). Redacted everywhere.".to_string());
        }
        schema
    }
}
