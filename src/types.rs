//! Core types shared by the lifecycle engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the property conventionally used as resource identifier.
pub const ID_PROPERTY_NAME: &str = "id";

/// Name of the property conventionally used as resource status.
pub const STATUS_PROPERTY_NAME: &str = "status";

/// Synthetic status reported while polling a resource that no longer exists.
pub const DEFAULT_DESTROYED_STATUS: &str = "destroyed";

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Lifecycle operation a resource may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl Operation {
    /// HTTP method used on the wire for this operation.
    pub fn http_method(&self) -> &'static str {
        match self {
            Operation::Create => "POST",
            Operation::Read => "GET",
            Operation::Update => "PUT",
            Operation::Delete => "DELETE",
        }
    }

    /// Response status codes accepted as success.
    ///
    /// Delete additionally treats 404 as success; that is handled by the engine,
    /// not listed here.
    pub fn expected_statuses(&self) -> &'static [u16] {
        match self {
            Operation::Create => &[200, 201, 202],
            Operation::Read => &[200],
            Operation::Update => &[200, 202],
            Operation::Delete => &[200, 202, 204],
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.http_method())
    }
}

/// Engine-wide settings passed to [`crate::ResourceEngine`] at construction.
///
/// Every field has a default, so a config file only needs to list what it
/// overrides:
///
/// ```json
/// { "default_timeout_secs": 300, "poll_interval_ms": 2000 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Polling timeout used when an operation declares none.
    #[serde(rename = "default_timeout_secs", with = "duration_secs")]
    pub default_timeout: Duration,
    /// Pause between two status reads.
    #[serde(rename = "poll_interval_ms", with = "duration_millis")]
    pub poll_interval: Duration,
    /// Pause before the first status read.
    #[serde(rename = "poll_delay_ms", with = "duration_millis")]
    pub poll_delay: Duration,
    /// Status reported when a polled resource answers 404.
    pub destroyed_status: String,
    /// Maximum number of characters of a response body quoted in errors.
    pub body_excerpt_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(600),
            poll_interval: Duration::from_secs(5),
            poll_delay: Duration::from_secs(1),
            destroyed_status: DEFAULT_DESTROYED_STATUS.to_string(),
            body_excerpt_limit: 512,
        }
    }
}

impl EngineConfig {
    /// Set the fallback polling timeout.
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Set the pause between status reads.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the pause before the first status read.
    pub fn poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = delay;
        self
    }

    /// Set the synthetic status used for resources that answer 404.
    pub fn destroyed_status(mut self, status: impl Into<String>) -> Self {
        self.destroyed_status = status.into();
        self
    }

    /// Set how much of a response body is quoted in errors.
    pub fn body_excerpt_limit(mut self, limit: usize) -> Self {
        self.body_excerpt_limit = limit;
        self
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
