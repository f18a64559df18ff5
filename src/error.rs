//! Gateway error taxonomy.
//!
//! Every failure in the request pipeline is a [`GatewayError`]. The dispatcher
//! catches it once, logs it, and writes it to the client as an
//! [`ErrorEnvelope`]: `{"error": {"code": "...", "message": "..."}}`.
//!
//! # Code families
//! - `Gateway.*`        raised by the gateway itself (routing, body ingestion, handler faults)
//! - caller-defined     raised by application code through [`GatewayError::coded`]
//! - `Context.Error.*`  raised by context-layer helpers through [`GatewayError::context`]

use serde::Serialize;

/// Errors produced while serving a single request.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// No route matched the request path, even after the wildcard fallback.
    #[error("gateway route not found")]
    NotFound,

    /// A route exists for the path but is registered under another method.
    #[error("request method is not allowed for this route")]
    MethodNotAllowed,

    /// The matched route carries no handler.
    #[error("no handler is registered for this route")]
    HandlerNotFound,

    /// Declared content-length exceeds the configured body limit.
    #[error("request body too large: declared {declared} bytes, limit {limit}")]
    BodyDataTooLarge { declared: u64, limit: u64 },

    /// The client went away before the body was complete.
    #[error("request body transfer aborted")]
    BodyDataAborted,

    /// Transport error while reading the body.
    #[error("request body transfer failed: {0}")]
    BodyDataError(String),

    /// Received byte count disagrees with the declared content-length.
    #[error("request body size mismatch: declared {declared} bytes, received {received}")]
    BodyDataContentError { declared: u64, received: u64 },

    /// The body could not be decoded for its content type.
    #[error("request body could not be parsed: {0}")]
    BodyDataParseError(String),

    /// The handler did not finish within the configured deadline.
    #[error("handler timed out after {0} ms")]
    HandlerTimeout(u64),

    /// Uncaught failure inside handler logic.
    #[error("{0}")]
    HandlerError(String),

    /// Application error with a caller-defined code.
    #[error("{message}")]
    Coded {
        code: String,
        message: String,
        silent: bool,
    },

    /// Error raised by context-layer helpers; re-coded with a `Context.Error.` prefix.
    #[error("{message}")]
    Context {
        code: String,
        message: String,
        silent: bool,
    },
}

impl GatewayError {
    /// Application error with its own code. Logged unless marked [`silent`](Self::silent).
    pub fn coded(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Coded {
            code: code.into(),
            message: message.into(),
            silent: false,
        }
    }

    /// Context-layer error. The wire code becomes `Context.Error.<code>`.
    pub fn context(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Context {
            code: code.into(),
            message: message.into(),
            silent: false,
        }
    }

    /// Wrap any displayable failure from handler code.
    pub fn handler(err: impl std::fmt::Display) -> Self {
        Self::HandlerError(err.to_string())
    }

    /// Suppress the error log line for application and context errors.
    pub fn silent(mut self) -> Self {
        if let Self::Coded { silent, .. } | Self::Context { silent, .. } = &mut self {
            *silent = true;
        }
        self
    }

    /// Whether the raiser asked for this error not to be logged.
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            Self::Coded { silent: true, .. } | Self::Context { silent: true, .. }
        )
    }

    /// Machine-readable code written to the client.
    pub fn code(&self) -> String {
        match self {
            Self::NotFound => "Gateway.NotFound".into(),
            Self::MethodNotAllowed => "Gateway.MethodNotAllowed".into(),
            Self::HandlerNotFound => "Gateway.HandlerNotFound".into(),
            Self::BodyDataTooLarge { .. } => "Gateway.BodyDataTooLarge".into(),
            Self::BodyDataAborted => "Gateway.BodyDataAborted".into(),
            Self::BodyDataError(_) => "Gateway.BodyDataError".into(),
            Self::BodyDataContentError { .. } => "Gateway.BodyDataContentError".into(),
            Self::BodyDataParseError(_) => "Gateway.BodyDataParseError".into(),
            Self::HandlerTimeout(_) => "Gateway.HandlerTimeout".into(),
            Self::HandlerError(_) => "Gateway.HandlerError".into(),
            Self::Coded { code, .. } => code.clone(),
            Self::Context { code, .. } => format!("Context.Error.{code}"),
        }
    }

    /// True for failures raised while ingesting the request body.
    pub fn is_body_error(&self) -> bool {
        matches!(
            self,
            Self::BodyDataTooLarge { .. }
                | Self::BodyDataAborted
                | Self::BodyDataError(_)
                | Self::BodyDataContentError { .. }
                | Self::BodyDataParseError(_)
        )
    }
}

/// `{"code": ..., "message": ...}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Wire shape of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

impl From<&GatewayError> for ErrorEnvelope {
    fn from(err: &GatewayError) -> Self {
        Self {
            error: ErrorBody {
                code: err.code(),
                message: err.to_string(),
            },
        }
    }
}

impl ErrorEnvelope {
    pub fn to_value(&self) -> serde_json::Value {
        // Two string fields; serialization cannot fail.
        serde_json::to_value(self).unwrap_or_default()
    }
}
