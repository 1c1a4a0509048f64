//! One multiplexed RPC connection.
//!
//! Requests from many tasks share one TCP stream. A writer task drains an
//! mpsc queue into the socket; a reader task routes each response to the
//! waiting caller through a `DashMap<u64, oneshot::Sender>` keyed by call id.
//! When the stream breaks, every pending call fails with
//! [`RpcError::Transport`] and the next call reconnects.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use gridline_core::{RpcCall, RpcRequest, RpcResult};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use super::codec::ClientCodec;
use super::config::ClientPoolConfig;
use super::RpcError;

type PendingCalls = DashMap<u64, oneshot::Sender<RpcResult>>;

const OUTBOUND_CAPACITY: usize = 256;

/// Lazily connected, multiplexed channel to one RPC endpoint.
pub struct RpcChannel {
    endpoint: String,
    call_timeout: Duration,
    connect_timeout: Duration,
    max_frame_len: usize,
    next_call_id: AtomicU64,
    connection: Mutex<Option<Connection>>,
}

impl RpcChannel {
    /// Creates a channel. Nothing connects until the first call.
    #[must_use]
    pub fn new(config: &ClientPoolConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            call_timeout: config.call_timeout,
            connect_timeout: config.connect_timeout,
            max_frame_len: config.max_frame_len,
            next_call_id: AtomicU64::new(1),
            connection: Mutex::new(None),
        }
    }

    /// Whether a live connection is currently held.
    pub async fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .await
            .as_ref()
            .is_some_and(|conn| conn.handle.alive.load(Ordering::SeqCst))
    }

    /// Calls awaiting a response on the current connection.
    pub async fn pending_count(&self) -> usize {
        self.connection
            .lock()
            .await
            .as_ref()
            .map_or(0, |conn| conn.handle.pending.len())
    }

    /// Sends one call and waits for its result, bounded by the call timeout.
    ///
    /// # Errors
    ///
    /// [`RpcError::Transport`] if the endpoint cannot be reached or the
    /// connection breaks before the response arrives, [`RpcError::Timeout`]
    /// if the deadline passes first.
    pub async fn call(&self, call: RpcCall) -> Result<RpcResult, RpcError> {
        #[allow(clippy::cast_possible_truncation)]
        let timeout_ms = self.call_timeout.as_millis() as u64;
        match tokio::time::timeout(self.call_timeout, self.call_inner(call)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(RpcError::Timeout { timeout_ms }),
        }
    }

    async fn call_inner(&self, call: RpcCall) -> Result<RpcResult, RpcError> {
        let handle = self.connection_handle().await?;
        let call_id = self.next_call_id.fetch_add(1, Ordering::Relaxed);

        let (tx, rx) = oneshot::channel();
        handle.pending.insert(call_id, tx);
        let _pending = PendingGuard {
            pending: Arc::clone(&handle.pending),
            call_id,
        };

        // A reader that died before the insert has already cleared the map.
        if !handle.alive.load(Ordering::SeqCst) {
            return Err(RpcError::Transport("connection closed".into()));
        }

        let method = call.method();
        handle
            .outbound
            .send(RpcRequest { call_id, call })
            .await
            .map_err(|_| RpcError::Transport("connection closed".into()))?;
        debug!(endpoint = %self.endpoint, call_id, method, "RPC call sent");

        rx.await
            .map_err(|_| RpcError::Transport("connection lost before response".into()))
    }

    /// Returns the live connection, reconnecting if the previous one broke.
    async fn connection_handle(&self) -> Result<ConnectionHandle, RpcError> {
        let mut slot = self.connection.lock().await;
        if let Some(conn) = slot.as_ref() {
            if conn.handle.alive.load(Ordering::SeqCst) {
                return Ok(conn.handle.clone());
            }
            debug!(endpoint = %self.endpoint, "RPC connection lost, reconnecting");
        }

        let conn = self.connect().await?;
        let handle = conn.handle.clone();
        *slot = Some(conn);
        Ok(handle)
    }

    async fn connect(&self) -> Result<Connection, RpcError> {
        let stream = tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect(self.endpoint.as_str()),
        )
        .await
        .map_err(|_| RpcError::Transport(format!("connect to {} timed out", self.endpoint)))?
        .map_err(|e| RpcError::Transport(format!("connect to {}: {e}", self.endpoint)))?;
        let _ = stream.set_nodelay(true);

        let framed = Framed::new(stream, ClientCodec::with_max_frame_len(self.max_frame_len));
        let (mut sink, mut frames) = framed.split();
        let (outbound, mut queue) = mpsc::channel::<RpcRequest>(OUTBOUND_CAPACITY);
        let pending: Arc<PendingCalls> = Arc::new(DashMap::new());
        let alive = Arc::new(AtomicBool::new(true));

        let writer_pending = Arc::clone(&pending);
        let writer_alive = Arc::clone(&alive);
        let endpoint = self.endpoint.clone();
        tokio::spawn(async move {
            while let Some(request) = queue.recv().await {
                if let Err(err) = sink.send(request).await {
                    warn!(%endpoint, error = %err, "RPC write failed");
                    fail_all(&writer_alive, &writer_pending);
                    break;
                }
            }
        });

        let reader_pending = Arc::clone(&pending);
        let reader_alive = Arc::clone(&alive);
        let endpoint = self.endpoint.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = frames.next().await {
                match frame {
                    Ok(Ok(response)) => {
                        if let Some((_, waiter)) = reader_pending.remove(&response.call_id) {
                            let _ = waiter.send(response.result);
                        } else {
                            debug!(%endpoint, call_id = response.call_id, "Response for unknown call");
                        }
                    }
                    Ok(Err(err)) => warn!(%endpoint, error = %err, "Undecodable RPC response"),
                    Err(err) => {
                        warn!(%endpoint, error = %err, "RPC stream error");
                        break;
                    }
                }
            }
            debug!(%endpoint, "RPC connection closed by peer");
            fail_all(&reader_alive, &reader_pending);
        });

        debug!(endpoint = %self.endpoint, "RPC connection established");
        Ok(Connection {
            handle: ConnectionHandle {
                outbound,
                pending,
                alive,
            },
            reader,
        })
    }
}

/// Marks the connection dead and drops every waiter.
fn fail_all(alive: &AtomicBool, pending: &PendingCalls) {
    alive.store(false, Ordering::SeqCst);
    pending.clear();
}

#[derive(Clone)]
struct ConnectionHandle {
    outbound: mpsc::Sender<RpcRequest>,
    pending: Arc<PendingCalls>,
    alive: Arc<AtomicBool>,
}

struct Connection {
    handle: ConnectionHandle,
    reader: JoinHandle<()>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Removes an abandoned call (timeout, cancellation) from the pending map.
struct PendingGuard {
    pending: Arc<PendingCalls>,
    call_id: u64,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.pending.remove(&self.call_id);
    }
}

#[cfg(test)]
mod tests {
    use gridline_core::{Entity, EntityFields, EntityId, RpcResponse};
    use tokio::net::TcpListener;

    use super::*;
    use crate::rpc::codec::ServerCodec;

    fn config_for(endpoint: String) -> ClientPoolConfig {
        ClientPoolConfig {
            call_timeout: Duration::from_millis(500),
            ..ClientPoolConfig::default()
        }
        .with_endpoint(endpoint)
    }

    fn entity(id: &str) -> Entity {
        Entity::new(EntityId::from(id), EntityFields::new(id, "team"))
    }

    async fn wait_disconnected(channel: &RpcChannel) {
        for _ in 0..200 {
            if !channel.is_connected().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("channel still connected");
    }

    #[tokio::test]
    async fn responses_are_correlated_out_of_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Reads two requests, answers them in reverse order.
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = Framed::new(stream, ServerCodec::new());
            let first = conn.next().await.unwrap().unwrap().unwrap();
            let second = conn.next().await.unwrap().unwrap().unwrap();
            for req in [second, first] {
                let RpcCall::Get { id } = req.call else {
                    panic!("expected get");
                };
                conn.send(RpcResponse {
                    call_id: req.call_id,
                    result: RpcResult::Entity {
                        entity: entity(id.as_str()),
                    },
                })
                .await
                .unwrap();
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        let channel = Arc::new(RpcChannel::new(&config_for(addr.to_string())));
        // Establish the connection so both calls share it.
        let _ = channel.connection_handle().await.unwrap();

        let a = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.call(RpcCall::Get { id: "a".into() }).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let b = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.call(RpcCall::Get { id: "b".into() }).await })
        };

        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();
        assert_eq!(a, RpcResult::Entity { entity: entity("a") });
        assert_eq!(b, RpcResult::Entity { entity: entity("b") });
    }

    #[tokio::test]
    async fn broken_connection_reconnects_on_next_call() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Answers exactly one request per connection, then hangs up.
        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                let mut conn = Framed::new(stream, ServerCodec::new());
                if let Some(Ok(Ok(req))) = conn.next().await {
                    conn.send(RpcResponse {
                        call_id: req.call_id,
                        result: RpcResult::Empty,
                    })
                    .await
                    .unwrap();
                }
            }
        });

        let channel = RpcChannel::new(&config_for(addr.to_string()));
        let first = channel
            .call(RpcCall::Delete { id: "x".into() })
            .await
            .unwrap();
        assert_eq!(first, RpcResult::Empty);

        wait_disconnected(&channel).await;

        let second = channel
            .call(RpcCall::Delete { id: "y".into() })
            .await
            .unwrap();
        assert_eq!(second, RpcResult::Empty);
    }

    #[tokio::test]
    async fn peer_hangup_fails_pending_call_with_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = Framed::new(stream, ServerCodec::new());
            let _ = conn.next().await;
            drop(conn);
        });

        let channel = RpcChannel::new(&config_for(addr.to_string()));
        let err = channel.call(RpcCall::Search).await.unwrap_err();
        assert!(matches!(err, RpcError::Transport(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn silent_peer_times_out_and_clears_pending() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = Framed::new(stream, ServerCodec::new());
            while conn.next().await.is_some() {}
        });

        let config = ClientPoolConfig {
            call_timeout: Duration::from_millis(100),
            ..ClientPoolConfig::default()
        }
        .with_endpoint(addr.to_string());
        let channel = RpcChannel::new(&config);

        let err = channel.call(RpcCall::Search).await.unwrap_err();
        assert_eq!(err, RpcError::Timeout { timeout_ms: 100 });
        assert_eq!(channel.pending_count().await, 0);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let channel = RpcChannel::new(&config_for(addr.to_string()));
        let err = channel.call(RpcCall::Search).await.unwrap_err();
        assert!(matches!(err, RpcError::Transport(_)), "got {err:?}");
    }
}
