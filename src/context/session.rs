//! Session tickets.
//!
//! The gateway never implements the cryptography itself. A [`SessionCodec`]
//! turns an opaque ticket into a value mapping and back.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::error::GatewayError;

/// Decodes and encodes signed session tickets.
pub trait SessionCodec: Send + Sync + 'static {
    /// `None` when the ticket is missing, expired or forged.
    fn decode(&self, ticket: &str) -> Option<Value>;

    fn encode(&self, value: &Value, ttl: Duration) -> Result<String, GatewayError>;
}

/// Codec used when no session support is configured: every ticket decodes
/// to nothing and encoding fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSessionCodec;

impl SessionCodec for DisabledSessionCodec {
    fn decode(&self, _ticket: &str) -> Option<Value> {
        None
    }

    fn encode(&self, _value: &Value, _ttl: Duration) -> Result<String, GatewayError> {
        Err(GatewayError::context(
            "SessionDisabled",
            "no session codec is configured",
        ))
    }
}

/// A decoded session. Immutable; [`encode`](Self::encode) produces a new
/// ticket instead of changing this one.
#[derive(Clone)]
pub struct Session {
    value: Value,
    codec: Arc<dyn SessionCodec>,
}

impl Session {
    pub fn decode(ticket: &str, codec: Arc<dyn SessionCodec>) -> Self {
        let value = if ticket.is_empty() {
            None
        } else {
            codec.decode(ticket)
        };
        Self {
            value: value.unwrap_or_else(|| Value::Object(Map::new())),
            codec,
        }
    }

    /// Decoded value; an empty object when decoding failed.
    pub fn get(&self) -> &Value {
        &self.value
    }

    pub fn encode(&self, value: &Value, ttl: Duration) -> Result<String, GatewayError> {
        self.codec.encode(value, ttl)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}
