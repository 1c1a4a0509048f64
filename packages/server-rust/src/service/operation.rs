//! Operation types flowing through the domain pipeline.

use gridline_core::{
    Entity, EntityFields, EntityId, EntityKind, ErrorKind, RpcCall, RpcResult, RpcStatus,
};

/// Where an operation entered the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerOrigin {
    /// Decoded from an inbound RPC frame.
    Rpc,
    /// Submitted in-process (embedded gateway, tests).
    Local,
}

/// Context carried with every operation through the pipeline.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub call_id: u64,
    pub kind: EntityKind,
    pub origin: CallerOrigin,
}

impl OperationContext {
    #[must_use]
    pub fn new(call_id: u64, kind: EntityKind) -> Self {
        Self {
            call_id,
            kind,
            origin: CallerOrigin::Local,
        }
    }

    #[must_use]
    pub fn with_origin(mut self, origin: CallerOrigin) -> Self {
        self.origin = origin;
        self
    }
}

/// The five canonical operations of a domain service.
#[derive(Debug)]
pub enum Operation {
    Get {
        ctx: OperationContext,
        id: EntityId,
    },
    List {
        ctx: OperationContext,
    },
    Create {
        ctx: OperationContext,
        fields: EntityFields,
    },
    Update {
        ctx: OperationContext,
        id: EntityId,
        fields: EntityFields,
    },
    Delete {
        ctx: OperationContext,
        id: EntityId,
    },
}

impl Operation {
    /// Maps a decoded RPC call onto an operation.
    ///
    /// `None` for `Subscribe`, which opens an event stream rather than
    /// invoking the domain service.
    #[must_use]
    pub fn from_call(ctx: OperationContext, call: RpcCall) -> Option<Self> {
        let op = match call {
            RpcCall::Get { id } => Self::Get { ctx, id },
            RpcCall::Search => Self::List { ctx },
            RpcCall::Add { name, team } => Self::Create {
                ctx,
                fields: EntityFields { name, team },
            },
            RpcCall::Update { id, name, team } => Self::Update {
                ctx,
                id,
                fields: EntityFields { name, team },
            },
            RpcCall::Delete { id } => Self::Delete { ctx, id },
            RpcCall::Subscribe { .. } => return None,
        };
        Some(op)
    }

    #[must_use]
    pub fn ctx(&self) -> &OperationContext {
        match self {
            Self::Get { ctx, .. }
            | Self::List { ctx }
            | Self::Create { ctx, .. }
            | Self::Update { ctx, .. }
            | Self::Delete { ctx, .. } => ctx,
        }
    }

    /// Short operation name for spans and logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Get { .. } => "get",
            Self::List { .. } => "list",
            Self::Create { .. } => "create",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
        }
    }
}

/// Successful response from a domain operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResponse {
    Entity(Entity),
    Entities(Vec<Entity>),
    Deleted,
}

impl From<OperationResponse> for RpcResult {
    fn from(resp: OperationResponse) -> Self {
        match resp {
            OperationResponse::Entity(entity) => RpcResult::Entity { entity },
            OperationResponse::Entities(entities) => RpcResult::Entities { entities },
            OperationResponse::Deleted => RpcResult::Empty,
        }
    }
}

/// Errors returned by domain operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperationError {
    #[error("{} not found", .kind.title())]
    NotFound { kind: EntityKind, id: EntityId },
    #[error("{0}")]
    Internal(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{actual} operation sent to the {expected} service")]
    WrongKind {
        expected: EntityKind,
        actual: EntityKind,
    },
}

impl OperationError {
    /// Caller-facing error kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::BadRequest(_) | Self::WrongKind { .. } => ErrorKind::BadRequest,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<OperationError> for RpcStatus {
    fn from(err: OperationError) -> Self {
        RpcStatus::new(err.kind(), err.to_string())
    }
}
