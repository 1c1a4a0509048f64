//! Caller-facing error taxonomy shared by the RPC wire format and both
//! gateway protocols.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of failure a caller can observe.
///
/// Every layer narrows its own error type down to one of these before the
/// failure crosses a protocol boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The requested id does not exist. Expected, not exceptional.
    #[serde(rename = "NOT_FOUND")]
    NotFound,
    /// Store, transport, or timeout fault.
    #[serde(rename = "INTERNAL")]
    Internal,
    /// Malformed inbound payload rejected at a protocol boundary.
    #[serde(rename = "INVALID_ARGUMENT")]
    BadRequest,
}

impl ErrorKind {
    /// Stable code string used in RPC statuses, REST bodies, and GraphQL extensions.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::Internal => "INTERNAL",
            Self::BadRequest => "INVALID_ARGUMENT",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// An error as it travels between processes: a kind plus human-readable text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RpcStatus {
    pub kind: ErrorKind,
    pub message: String,
}

impl RpcStatus {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }
}
