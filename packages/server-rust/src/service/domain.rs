//! Per-kind domain service.
//!
//! Implements the five canonical operations against the kind's store and
//! publishes exactly one audit event per invocation. Publishing is best
//! effort: a failed publish is logged and never changes the operation's
//! result. There are no retries; a store fault surfaces immediately as
//! `OperationError::Internal`.

use std::sync::Arc;
use std::task::{Context, Poll};

use gridline_core::audit::{self, AuditAction};
use gridline_core::{Entity, EntityFields, EntityId, EntityKind};
use tower::Service;
use tracing::{error, warn};

use super::config::{EmissionMode, ServiceConfig};
use super::middleware::OperationFuture;
use super::operation::{Operation, OperationError, OperationResponse};
use crate::storage::StoreError;
use crate::traits::{EntityStore, EventEmitter};

/// Stateless domain service for one entity kind.
pub struct DomainService {
    kind: EntityKind,
    store: Arc<dyn EntityStore>,
    emitter: Arc<dyn EventEmitter>,
    config: ServiceConfig,
}

impl DomainService {
    /// Creates a service over `store`, publishing to the store kind's channel.
    #[must_use]
    pub fn new(
        store: Arc<dyn EntityStore>,
        emitter: Arc<dyn EventEmitter>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            kind: store.kind(),
            store,
            emitter,
            config,
        }
    }

    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Publishes one audit text on this kind's channel.
    async fn emit(&self, text: String) {
        let channel = self.kind.channel();
        if let Err(err) = self.emitter.publish(channel, text).await {
            warn!(channel, error = %err, "Audit event not published");
        }
    }

    fn internal(&self, action: AuditAction, err: &StoreError) -> OperationError {
        error!(kind = %self.kind, ?action, error = %err, "Store operation failed");
        OperationError::Internal(audit::failure_summary(self.kind, action))
    }

    fn not_found(&self, id: &EntityId) -> OperationError {
        OperationError::NotFound {
            kind: self.kind,
            id: id.clone(),
        }
    }

    /// Looks up one entity. The search is audited whether or not it matches.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, `Internal` on a store fault.
    pub async fn get(&self, id: &EntityId) -> Result<Entity, OperationError> {
        match self.store.get_by_id(id).await {
            Ok(found) => {
                self.emit(audit::searched_one(self.kind, id)).await;
                found.ok_or_else(|| self.not_found(id))
            }
            Err(err) => {
                self.emit(audit::failure(self.kind, AuditAction::Fetch, &err))
                    .await;
                Err(self.internal(AuditAction::Fetch, &err))
            }
        }
    }

    /// Returns every entity. An empty store yields an empty list.
    ///
    /// # Errors
    ///
    /// `Internal` on a store fault.
    pub async fn list(&self) -> Result<Vec<Entity>, OperationError> {
        match self.store.list_all().await {
            Ok(entities) => {
                self.emit(audit::searched_all(self.kind)).await;
                Ok(entities)
            }
            Err(err) => {
                self.emit(audit::failure(self.kind, AuditAction::FetchAll, &err))
                    .await;
                Err(self.internal(AuditAction::FetchAll, &err))
            }
        }
    }

    /// Persists a new entity.
    ///
    /// In [`EmissionMode::PreFlight`] the draft is published before the
    /// insert and nothing is published afterwards; otherwise the event
    /// describes the outcome.
    ///
    /// # Errors
    ///
    /// `Internal` on a store fault.
    pub async fn create(&self, fields: EntityFields) -> Result<Entity, OperationError> {
        let pre_flight = self.config.emission_mode == EmissionMode::PreFlight;
        if pre_flight {
            self.emit(audit::create_attempt(&fields)).await;
        }

        match self.store.insert(fields).await {
            Ok(entity) => {
                if !pre_flight {
                    self.emit(audit::created(&entity)).await;
                }
                Ok(entity)
            }
            Err(err) => {
                if !pre_flight {
                    self.emit(audit::failure(self.kind, AuditAction::Add, &err))
                        .await;
                }
                Err(self.internal(AuditAction::Add, &err))
            }
        }
    }

    /// Overwrites both fields of an existing entity.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, `Internal` on a store fault.
    pub async fn update(
        &self,
        id: &EntityId,
        fields: EntityFields,
    ) -> Result<Entity, OperationError> {
        match self.store.update_by_id(id, fields).await {
            Ok(Some(entity)) => {
                self.emit(audit::updated(self.kind, id)).await;
                Ok(entity)
            }
            Ok(None) => {
                self.emit(audit::unknown_target(self.kind, AuditAction::Update, id))
                    .await;
                Err(self.not_found(id))
            }
            Err(err) => {
                self.emit(audit::failure(self.kind, AuditAction::Update, &err))
                    .await;
                Err(self.internal(AuditAction::Update, &err))
            }
        }
    }

    /// Removes an entity. A second delete of the same id is `NotFound`.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, `Internal` on a store fault.
    pub async fn delete(&self, id: &EntityId) -> Result<(), OperationError> {
        match self.store.delete_by_id(id).await {
            Ok(Some(_)) => {
                self.emit(audit::deleted(self.kind, id)).await;
                Ok(())
            }
            Ok(None) => {
                self.emit(audit::unknown_target(self.kind, AuditAction::Delete, id))
                    .await;
                Err(self.not_found(id))
            }
            Err(err) => {
                self.emit(audit::failure(self.kind, AuditAction::Delete, &err))
                    .await;
                Err(self.internal(AuditAction::Delete, &err))
            }
        }
    }

    /// Dispatches an operation to the matching method.
    ///
    /// # Errors
    ///
    /// `WrongKind` if the operation targets the other kind, otherwise the
    /// error of the dispatched method.
    pub async fn execute(&self, op: Operation) -> Result<OperationResponse, OperationError> {
        let target = op.ctx().kind;
        if target != self.kind {
            return Err(OperationError::WrongKind {
                expected: self.kind,
                actual: target,
            });
        }

        match op {
            Operation::Get { id, .. } => self.get(&id).await.map(OperationResponse::Entity),
            Operation::List { .. } => self.list().await.map(OperationResponse::Entities),
            Operation::Create { fields, .. } => {
                self.create(fields).await.map(OperationResponse::Entity)
            }
            Operation::Update { id, fields, .. } => self
                .update(&id, fields)
                .await
                .map(OperationResponse::Entity),
            Operation::Delete { id, .. } => {
                self.delete(&id).await.map(|()| OperationResponse::Deleted)
            }
        }
    }
}

impl Service<Operation> for Arc<DomainService> {
    type Response = OperationResponse;
    type Error = OperationError;
    type Future = OperationFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, op: Operation) -> Self::Future {
        let service = Arc::clone(self);
        Box::pin(async move { service.execute(op).await })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
