//! HTTP-surface security configuration.
//!
//! Peers are never authenticated; these settings only cover the operational endpoints
//! and browser origin policy.

use super::defaults::default_cors_origins;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Security configuration.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SecurityConfig {
    /// Allowed CORS origins (comma-separated, or "*" for any)
    #[serde(
        default = "default_cors_origins",
        deserialize_with = "deserialize_scalar_string"
    )]
    pub cors_origins: String,
    /// Bearer token required by the metrics endpoint. `None` leaves it open.
    #[serde(default, deserialize_with = "deserialize_optional_scalar_string")]
    pub metrics_auth_token: Option<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            cors_origins: default_cors_origins(),
            metrics_auth_token: None,
        }
    }
}

// Tokens and origin lists are text, but a JSON document may carry them as bare scalars.
fn scalar_to_string<E: serde::de::Error>(value: Value) -> Result<String, E> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(E::custom(format!("expected a string, found {other}"))),
    }
}

fn deserialize_scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    scalar_to_string(Value::deserialize(deserializer)?)
}

fn deserialize_optional_scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => scalar_to_string(value).map(Some),
    }
}
