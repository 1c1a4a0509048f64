//! RPC listener for one domain service.
//!
//! Follows the deferred startup pattern: `new()` wires the pipeline,
//! `start()` binds the TCP listener, and `serve()` accepts connections
//! until the shutdown future resolves.
//!
//! Each connection has one reader loop and one writer task. Every decoded
//! request is dispatched on its own task, so responses may leave out of
//! order; the client correlates them by call id. A `SUBSCRIBE` call turns
//! into a forwarder task that copies the service's audit events onto the
//! connection until it closes.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use gridline_core::{EntityKind, RpcCall, RpcRequest, RpcResponse, RpcResult, RpcStatus};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::codec::Framed;
use tower::ServiceExt;
use tracing::{debug, info, warn};

use super::codec::ServerCodec;
use super::config::RpcConfig;
use crate::events::EventBus;
use crate::lifecycle::Lifecycle;
use crate::service::{
    build_operation_pipeline, CallerOrigin, DomainService, Operation, OperationContext,
    OperationPipeline,
};

/// Outbound responses buffered per connection before dispatch tasks wait.
const OUTBOUND_CAPACITY: usize = 256;

/// Per-kind RPC server.
pub struct RpcServer {
    kind: EntityKind,
    config: RpcConfig,
    dispatcher: Dispatcher,
    listener: Option<TcpListener>,
}

impl RpcServer {
    /// Wraps `service` in the operation pipeline without binding any port.
    #[must_use]
    pub fn new(service: Arc<DomainService>, config: RpcConfig, lifecycle: Arc<Lifecycle>) -> Self {
        let kind = service.kind();
        Self {
            kind,
            dispatcher: Dispatcher {
                kind,
                pipeline: build_operation_pipeline(service),
                lifecycle,
                events: None,
            },
            config,
            listener: None,
        }
    }

    /// Offers `bus` to `SUBSCRIBE` callers. Without it the call is refused.
    #[must_use]
    pub fn with_event_stream(mut self, bus: Arc<EventBus>) -> Self {
        self.dispatcher.events = Some(bus);
        self
    }

    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Binds the configured address and returns the bound address, which
    /// carries the OS-assigned port when port 0 was requested.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<SocketAddr> {
        let listener = TcpListener::bind(self.config.bind).await?;
        let addr = listener.local_addr()?;
        info!(kind = %self.kind, %addr, "RPC listener bound");
        self.listener = Some(listener);
        Ok(addr)
    }

    /// Accepts connections until `shutdown` resolves, then drains.
    ///
    /// After the shutdown signal every connection stops reading new
    /// requests, finishes the calls it already accepted, and flushes their
    /// responses. The wait is bounded by `drain_timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first.
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send) -> anyhow::Result<()> {
        let Some(listener) = self.listener else {
            anyhow::bail!("start() must be called before serve()");
        };
        let kind = self.kind;
        let max_frame_len = self.config.max_frame_len;
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut connections = JoinSet::new();

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%kind, %peer, "RPC connection accepted");
                        connections.spawn(handle_connection(
                            stream,
                            peer,
                            max_frame_len,
                            self.dispatcher.clone(),
                            stop_rx.clone(),
                        ));
                    }
                    Err(err) => warn!(%kind, error = %err, "RPC accept failed"),
                },
            }
        }

        drop(listener);
        let _ = stop_tx.send(true);
        info!(%kind, connections = connections.len(), "RPC server draining");

        let drained = tokio::time::timeout(self.config.drain_timeout, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(%kind, "RPC drain timeout expired with calls remaining");
            connections.abort_all();
        }

        info!(%kind, "RPC server stopped");
        Ok(())
    }
}

/// Turns decoded requests into responses through the pipeline.
#[derive(Clone)]
struct Dispatcher {
    kind: EntityKind,
    pipeline: OperationPipeline,
    lifecycle: Arc<Lifecycle>,
    events: Option<Arc<EventBus>>,
}

impl Dispatcher {
    async fn dispatch(&self, request: RpcRequest) -> RpcResponse {
        let _guard = self.lifecycle.in_flight_guard();
        let call_id = request.call_id;
        let ctx = OperationContext::new(call_id, self.kind)
            .with_origin(CallerOrigin::Rpc);
        let Some(op) = Operation::from_call(ctx, request.call) else {
            return RpcResponse::error(call_id, RpcStatus::bad_request("not an operation"));
        };

        let result = match self.pipeline.clone().oneshot(op).await {
            Ok(resp) => RpcResult::from(resp),
            Err(err) => RpcResult::Error { status: err.into() },
        };
        RpcResponse { call_id, result }
    }
}

/// Copies audit events on `channels` to the connection as `EVENT` frames
/// tagged with the subscribing `call_id`, after one `EMPTY` frame
/// acknowledging that the subscription is live.
async fn stream_events(
    bus: Arc<EventBus>,
    channels: Vec<String>,
    call_id: u64,
    tx: mpsc::Sender<RpcResponse>,
    mut closed: watch::Receiver<bool>,
    peer: SocketAddr,
) {
    let filter: Vec<&str> = channels.iter().map(String::as_str).collect();
    let mut subscription = bus.subscribe(&filter);
    debug!(%peer, call_id, ?channels, "Audit stream opened");
    let ack = RpcResponse {
        call_id,
        result: RpcResult::Empty,
    };
    if tx.send(ack).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else { break };
                let frame = RpcResponse {
                    call_id,
                    result: RpcResult::Event {
                        channel: event.channel,
                        text: event.text,
                        published_at_ms: event.published_at_ms,
                    },
                };
                if tx.send(frame).await.is_err() {
                    break;
                }
            }
            changed = closed.changed() => {
                if changed.is_err() || *closed.borrow() {
                    break;
                }
            }
        }
    }
    debug!(%peer, call_id, "Audit stream closed");
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    max_frame_len: usize,
    dispatcher: Dispatcher,
    mut stop: watch::Receiver<bool>,
) {
    let _ = stream.set_nodelay(true);
    let framed = Framed::new(stream, ServerCodec::with_max_frame_len(max_frame_len));
    let (mut sink, mut frames) = framed.split();
    let (tx, mut rx) = mpsc::channel::<RpcResponse>(OUTBOUND_CAPACITY);
    let (closed_tx, closed_rx) = watch::channel(false);

    let writer = tokio::spawn(async move {
        while let Some(response) = rx.recv().await {
            if let Err(err) = sink.send(response).await {
                warn!(%peer, error = %err, "RPC write failed");
                break;
            }
        }
    });

    loop {
        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
            frame = frames.next() => match frame {
                None => break,
                Some(Err(err)) => {
                    warn!(%peer, error = %err, "RPC stream error, closing connection");
                    break;
                }
                Some(Ok(Err(err))) => {
                    debug!(%peer, error = %err, "Undecodable RPC request");
                    let status = RpcStatus::bad_request(format!("undecodable request: {err}"));
                    if tx.send(RpcResponse::error(0, status)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Ok(RpcRequest {
                    call_id,
                    call: RpcCall::Subscribe { channels },
                }))) => {
                    if let Some(bus) = dispatcher.events.clone() {
                        tokio::spawn(stream_events(
                            bus,
                            channels,
                            call_id,
                            tx.clone(),
                            closed_rx.clone(),
                            peer,
                        ));
                    } else {
                        let status = RpcStatus::bad_request("this service does not stream events");
                        if tx.send(RpcResponse::error(call_id, status)).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Ok(request))) => {
                    let dispatcher = dispatcher.clone();
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let response = dispatcher.dispatch(request).await;
                        let _ = tx.send(response).await;
                    });
                }
            },
        }
    }

    // The writer exits once every dispatch and stream task has dropped its sender.
    let _ = closed_tx.send(true);
    drop(tx);
    let _ = writer.await;
    debug!(%peer, "RPC connection closed");
}
