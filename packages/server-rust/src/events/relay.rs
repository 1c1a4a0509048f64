//! Carries a remote domain service's audit events onto a local bus.
//!
//! A gateway running apart from the services opens one `SUBSCRIBE` stream
//! per kind over the RPC protocol and replays every `EVENT` frame into its
//! own [`EventBus`], where the [`EventConsumer`](super::EventConsumer) picks
//! it up as if the service were in-process. A broken or refused stream is
//! retried after `retry_delay` until shutdown.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use gridline_core::{EntityKind, RpcCall, RpcRequest, RpcResponse, RpcResult};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use super::{AuditEvent, EventBus};
use crate::rpc::{ClientCodec, ClientPoolConfig};

/// Call id of the one subscription each relay connection carries.
const STREAM_CALL_ID: u64 = 1;

/// Default pause between stream attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Subscribes to one kind's channel on a remote service.
pub struct EventRelay {
    kind: EntityKind,
    endpoint: String,
    connect_timeout: Duration,
    max_frame_len: usize,
    retry_delay: Duration,
    bus: Arc<EventBus>,
}

impl EventRelay {
    /// A relay reaching the service the pool `config` points at.
    #[must_use]
    pub fn new(kind: EntityKind, config: &ClientPoolConfig, bus: Arc<EventBus>) -> Self {
        Self {
            kind,
            endpoint: config.endpoint.clone(),
            connect_timeout: config.connect_timeout,
            max_frame_len: config.max_frame_len,
            retry_delay: DEFAULT_RETRY_DELAY,
            bus,
        }
    }

    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Runs the relay on a background task until `shutdown` flips to `true`.
    #[must_use]
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while !*shutdown.borrow() {
                tokio::select! {
                    result = self.stream_once() => match result {
                        Ok(()) => debug!(kind = %self.kind, endpoint = %self.endpoint, "Audit stream ended"),
                        Err(err) => warn!(
                            kind = %self.kind,
                            endpoint = %self.endpoint,
                            error = %err,
                            "Audit stream unavailable"
                        ),
                    },
                    changed = shutdown.changed() => if changed.is_err() { break },
                }
                if *shutdown.borrow() {
                    break;
                }
                tokio::select! {
                    () = tokio::time::sleep(self.retry_delay) => {}
                    changed = shutdown.changed() => if changed.is_err() { break },
                }
            }
            debug!(kind = %self.kind, "Audit relay stopped");
        })
    }

    /// One connection's worth of streaming. Returns when the peer closes the
    /// stream or the local bus stops accepting events.
    async fn stream_once(&self) -> anyhow::Result<()> {
        let stream = tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect(self.endpoint.as_str()),
        )
        .await
        .map_err(|_| anyhow::anyhow!("connect to {} timed out", self.endpoint))??;
        let _ = stream.set_nodelay(true);

        let mut framed = Framed::new(stream, ClientCodec::with_max_frame_len(self.max_frame_len));
        framed
            .send(RpcRequest {
                call_id: STREAM_CALL_ID,
                call: RpcCall::Subscribe {
                    channels: vec![self.kind.channel().to_string()],
                },
            })
            .await?;

        while let Some(frame) = framed.next().await {
            let response = match frame? {
                Ok(response) => response,
                Err(err) => {
                    warn!(kind = %self.kind, error = %err, "Undecodable audit frame");
                    continue;
                }
            };
            match response {
                RpcResponse {
                    result: RpcResult::Empty,
                    ..
                } => info!(kind = %self.kind, endpoint = %self.endpoint, "Audit stream connected"),
                RpcResponse {
                    result:
                        RpcResult::Event {
                            channel,
                            text,
                            published_at_ms,
                        },
                    ..
                } => {
                    let event = AuditEvent {
                        kind: EntityKind::from_channel(&channel),
                        channel,
                        text,
                        published_at_ms,
                    };
                    if self.bus.forward(event).is_err() {
                        return Ok(());
                    }
                }
                RpcResponse {
                    result: RpcResult::Error { status },
                    ..
                } => anyhow::bail!("subscription refused: {}", status.message),
                RpcResponse { call_id, .. } => {
                    debug!(kind = %self.kind, call_id, "Unexpected frame on audit stream");
                }
            }
        }
        Ok(())
    }
}
