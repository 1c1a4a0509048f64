//! Request/response envelopes for the domain service RPC contract.
//!
//! Per entity kind the contract has five methods: `Get`, `Search`, `Add`,
//! `Update`, and `Delete`. Responses carry the caller's `call_id` so a single
//! connection can multiplex many in-flight calls and receive the answers out
//! of order.
//!
//! `Subscribe` is the one call answered by more than one frame: an `Empty`
//! acknowledgement once the subscription is live, then every audit event
//! the service publishes as an `Event` result under the same call id until
//! the connection closes.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::RpcStatus;
use crate::types::{Entity, EntityFields, EntityId};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// A single method invocation against a domain service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum RpcCall {
    #[serde(rename = "GET")]
    Get { id: EntityId },

    #[serde(rename = "SEARCH")]
    Search,

    #[serde(rename = "ADD")]
    Add {
        #[serde(default)]
        name: String,
        #[serde(default)]
        team: String,
    },

    #[serde(rename = "UPDATE")]
    Update {
        id: EntityId,
        #[serde(default)]
        name: String,
        #[serde(default)]
        team: String,
    },

    #[serde(rename = "DELETE")]
    Delete { id: EntityId },

    /// Opens an audit event stream. No channels means every channel.
    #[serde(rename = "SUBSCRIBE")]
    Subscribe {
        #[serde(default)]
        channels: Vec<String>,
    },
}

impl RpcCall {
    /// Method name, used for logging.
    #[must_use]
    pub fn method(&self) -> &'static str {
        match self {
            Self::Get { .. } => "GET",
            Self::Search => "SEARCH",
            Self::Add { .. } => "ADD",
            Self::Update { .. } => "UPDATE",
            Self::Delete { .. } => "DELETE",
            Self::Subscribe { .. } => "SUBSCRIBE",
        }
    }

    #[must_use]
    pub fn add(fields: EntityFields) -> Self {
        Self::Add {
            name: fields.name,
            team: fields.team,
        }
    }

    #[must_use]
    pub fn update(id: EntityId, fields: EntityFields) -> Self {
        Self::Update {
            id,
            name: fields.name,
            team: fields.team,
        }
    }
}

/// Envelope for an outbound call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcRequest {
    /// Caller-assigned correlation id, echoed in the response.
    pub call_id: u64,
    pub call: RpcCall,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Outcome of a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RpcResult {
    #[serde(rename = "ENTITY")]
    Entity { entity: Entity },

    #[serde(rename = "ENTITIES")]
    Entities { entities: Vec<Entity> },

    #[serde(rename = "EMPTY")]
    Empty,

    #[serde(rename = "ERROR")]
    Error { status: RpcStatus },

    /// One audit event on a `Subscribe` stream.
    #[serde(rename = "EVENT")]
    #[serde(rename_all = "camelCase")]
    Event {
        channel: String,
        text: String,
        published_at_ms: u64,
    },
}

/// Envelope for a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcResponse {
    /// Correlation id of the request this answers. `0` when the request
    /// could not be decoded far enough to read its id.
    pub call_id: u64,
    pub result: RpcResult,
}

impl RpcResponse {
    #[must_use]
    pub fn error(call_id: u64, status: RpcStatus) -> Self {
        Self {
            call_id,
            result: RpcResult::Error { status },
        }
    }
}

// ---------------------------------------------------------------------------
// Encoding helpers
// ---------------------------------------------------------------------------

/// Failure to encode or decode a wire message.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("encode failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("decode failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Serializes a message as named `MsgPack`.
///
/// # Errors
///
/// Returns [`WireError::Encode`] if the value cannot be serialized.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, WireError> {
    Ok(rmp_serde::to_vec_named(value)?)
}

/// Deserializes a named `MsgPack` message.
///
/// # Errors
///
/// Returns [`WireError::Decode`] if the bytes are not a valid message of type `T`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, WireError> {
    Ok(rmp_serde::from_slice(bytes)?)
}
