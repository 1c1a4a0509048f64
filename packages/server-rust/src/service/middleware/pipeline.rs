//! The per-kind operation stack.

use std::sync::Arc;

use tower::ServiceBuilder;

use super::observe::{Observe, ObserveLayer};
use crate::service::domain::DomainService;

pub type OperationPipeline = Observe<Arc<DomainService>>;

/// Wraps `service` so each call is traced.
///
/// Nothing in the stack bounds a call's duration: once dispatched, an
/// operation runs until the store answers and its audit event is out.
/// Clones share the same domain service.
#[must_use]
pub fn build_operation_pipeline(service: Arc<DomainService>) -> OperationPipeline {
    ServiceBuilder::new().layer(ObserveLayer).service(service)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use gridline_core::{EntityFields, EntityKind};
    use tower::ServiceExt;

    use super::*;
    use crate::events::EventBus;
    use crate::service::config::ServiceConfig;
    use crate::service::operation::{Operation, OperationContext, OperationResponse};
    use crate::storage::testing::SlowAckStore;
    use crate::storage::MemoryStore;
    use crate::traits::EntityStore;

    fn pipeline(store: Arc<dyn EntityStore>, bus: &Arc<EventBus>) -> OperationPipeline {
        let service = DomainService::new(store, Arc::clone(bus) as _, ServiceConfig::default());
        build_operation_pipeline(Arc::new(service))
    }

    #[tokio::test]
    async fn pipeline_routes_to_the_domain_service() {
        let bus = Arc::new(EventBus::new());
        let svc = pipeline(Arc::new(MemoryStore::new(EntityKind::Driver)), &bus);
        let ctx = OperationContext::new(42, EntityKind::Driver);

        let created = svc
            .clone()
            .oneshot(Operation::Create {
                ctx: ctx.clone(),
                fields: EntityFields::new("Max", "RedBull"),
            })
            .await
            .unwrap();
        assert!(matches!(created, OperationResponse::Entity(_)));

        let listed = svc.oneshot(Operation::List { ctx }).await.unwrap();
        let OperationResponse::Entities(all) = listed else {
            panic!("expected entity list");
        };
        assert_eq!(all.len(), 1);
        assert_eq!(bus.published_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_store_acknowledgement_still_completes_and_emits_once() {
        let bus = Arc::new(EventBus::new());
        let mut audit = bus.subscribe(&[]);
        let store = Arc::new(SlowAckStore::new(EntityKind::Rider, Duration::from_secs(45)));
        let svc = pipeline(Arc::clone(&store) as _, &bus);

        let created = svc
            .oneshot(Operation::Create {
                ctx: OperationContext::new(1, EntityKind::Rider),
                fields: EntityFields::new("Pecco", "Ducati"),
            })
            .await;

        assert!(matches!(created, Ok(OperationResponse::Entity(_))));
        assert_eq!(store.stored(), 1);
        assert_eq!(bus.published_count(), 1);
        assert!(audit.try_recv().unwrap().text.contains("Pecco"));
        assert!(audit.try_recv().is_none());
    }
}
