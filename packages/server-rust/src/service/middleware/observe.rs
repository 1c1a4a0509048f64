//! Per-call tracing.
//!
//! Every operation runs inside an `operation` span carrying its kind, name,
//! call id and origin. `duration_ms` and `outcome` (an error code, or `OK`)
//! are filled in when the call finishes.

use std::task::{Context, Poll};
use std::time::Instant;

use gridline_core::ErrorKind;
use tower::{Layer, Service};
use tracing::{debug, field, info_span, warn, Instrument, Span};

use super::OperationFuture;
use crate::service::operation::{Operation, OperationError, OperationResponse};

#[derive(Debug, Clone, Copy, Default)]
pub struct ObserveLayer;

impl<S> Layer<S> for ObserveLayer {
    type Service = Observe<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Observe { inner }
    }
}

#[derive(Debug, Clone)]
pub struct Observe<S> {
    inner: S,
}

impl<S> Service<Operation> for Observe<S>
where
    S: Service<Operation, Response = OperationResponse, Error = OperationError>,
    S::Future: Send + 'static,
{
    type Response = OperationResponse;
    type Error = OperationError;
    type Future = OperationFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, op: Operation) -> Self::Future {
        let ctx = op.ctx();
        let span = info_span!(
            "operation",
            kind = %ctx.kind,
            op = op.name(),
            call_id = ctx.call_id,
            origin = ?ctx.origin,
            duration_ms = field::Empty,
            outcome = field::Empty,
        );
        let inner = self.inner.call(op);

        Box::pin(
            async move {
                let started = Instant::now();
                let result = inner.await;
                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = started.elapsed().as_millis() as u64;

                let outcome = result.as_ref().map_or_else(|err| err.kind().code(), |_| "OK");
                let span = Span::current();
                span.record("duration_ms", duration_ms);
                span.record("outcome", outcome);

                match &result {
                    Err(err) if err.kind() == ErrorKind::Internal => {
                        warn!(error = %err, "Operation failed");
                    }
                    _ => debug!(duration_ms, outcome, "Operation complete"),
                }
                result
            }
            .instrument(span),
        )
    }
}
