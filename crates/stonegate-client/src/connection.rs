use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use stonegate_core::{encode_request, parse_rpc_result, RpcRequest};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::correlator::{Outcome, PendingTable, Registration};
use crate::error::{ClientError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

const SINK_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// One open socket with its reader and the calls sent over it.
struct Connection {
    sink: AsyncMutex<WsSink>,
    reader: JoinHandle<()>,
    pending: Arc<PendingTable>,
}

impl Connection {
    fn is_open(&self) -> bool {
        !self.pending.is_closed() && !self.reader.is_finished()
    }

    fn register(&self) -> Result<(String, oneshot::Receiver<Outcome>)> {
        loop {
            let id = format!("rs_{}", Uuid::new_v4().simple());
            match self.pending.register(&id) {
                Registration::Waiting(outcome) => return Ok((id, outcome)),
                Registration::Duplicate => continue,
                Registration::Closed => return Err(ClientError::Closed),
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Client for one backend connection.
///
/// The socket is opened lazily by the first call (or [`connect`]) and
/// re-opened on the next call after the peer goes away. Writes from
/// concurrent callers are serialized, one frame per request.
///
/// [`connect`]: StoneGateClient::connect
pub struct StoneGateClient {
    config: ClientConfig,
    current: Mutex<Option<Arc<Connection>>>,
    /// Serializes handshakes; never taken by `close`.
    connecting: AsyncMutex<()>,
    /// Bumped and notified by `close` to abandon in-flight handshakes.
    close_epoch: AtomicU64,
    closing: Notify,
}

impl StoneGateClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            current: Mutex::new(None),
            connecting: AsyncMutex::new(()),
            close_epoch: AtomicU64::new(0),
            closing: Notify::new(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Number of calls still waiting for their response.
    pub fn pending_calls(&self) -> usize {
        self.current()
            .as_ref()
            .map_or(0, |connection| connection.pending.len())
    }

    pub async fn connect(&self) -> Result<()> {
        self.connection().await.map(|_| ())
    }

    fn current(&self) -> MutexGuard<'_, Option<Arc<Connection>>> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn open_connection(&self) -> Option<Arc<Connection>> {
        self.current()
            .as_ref()
            .filter(|connection| connection.is_open())
            .cloned()
    }

    async fn connection(&self) -> Result<Arc<Connection>> {
        if let Some(connection) = self.open_connection() {
            return Ok(connection);
        }
        let _handshake = self.connecting.lock().await;
        if let Some(connection) = self.open_connection() {
            return Ok(connection);
        }

        let closing = self.closing.notified();
        let epoch = self.close_epoch.load(Ordering::Acquire);
        debug!(url = %self.config.ws_url, "connecting");
        let ws = tokio::select! {
            connected = connect_async(self.config.ws_url.as_str()) => connected?.0,
            _ = closing => {
                debug!(url = %self.config.ws_url, "connect_abandoned");
                return Err(ClientError::Closed);
            }
        };

        let (sink, stream) = ws.split();
        let pending = Arc::new(PendingTable::default());
        let connection = Arc::new(Connection {
            sink: AsyncMutex::new(sink),
            reader: tokio::spawn(read_loop(stream, pending.clone())),
            pending,
        });

        let mut current = self.current();
        if self.close_epoch.load(Ordering::Acquire) != epoch {
            return Err(ClientError::Closed);
        }
        *current = Some(connection.clone());
        drop(current);
        info!(url = %self.config.ws_url, "connected");
        Ok(connection)
    }

    /// Sends one request and waits for the response carrying its id.
    ///
    /// `timeout` bounds the whole call, connecting included. On `ok: true`
    /// the `result` member is returned (null when absent). On timeout the
    /// pending entry is released, so a response arriving later is ignored
    /// by the reader.
    pub async fn call(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
        if method.trim().is_empty() {
            return Err(ClientError::Validation("method must not be empty".to_string()));
        }
        if !(params.is_object() || params.is_null()) {
            return Err(ClientError::Validation(format!(
                "params for {method} must be a JSON object"
            )));
        }

        let deadline = Instant::now() + timeout;
        let connection = match timeout_at(deadline, self.connection()).await {
            Ok(connection) => connection?,
            Err(_) => {
                warn!(method, ?timeout, url = %self.config.ws_url, "connect_timeout");
                return Err(timed_out(method, timeout));
            }
        };
        let (id, outcome) = connection.register()?;
        let frame = match encode_request(&RpcRequest::new(id.clone(), method, params)) {
            Ok(frame) => frame,
            Err(err) => {
                connection.pending.forget(&id);
                return Err(ClientError::Validation(err.to_string()));
            }
        };

        debug!(%id, method, "rpc_send");
        let sink = &connection.sink;
        let send = async move { sink.lock().await.send(Message::Text(frame)).await };
        match timeout_at(deadline, send).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                connection.pending.forget(&id);
                warn!(%id, method, error = %err, "rpc_send_failed");
                return Err(err.into());
            }
            Err(_) => {
                connection.pending.forget(&id);
                warn!(%id, method, ?timeout, "rpc_send_timeout");
                return Err(timed_out(method, timeout));
            }
        }

        match timeout_at(deadline, outcome).await {
            Ok(Ok(Ok(response))) => response.into_result().map_err(ClientError::Rpc),
            Ok(Ok(Err(err))) => Err(err),
            Ok(Err(_)) => Err(ClientError::Closed),
            Err(_) => {
                connection.pending.forget(&id);
                warn!(%id, method, ?timeout, "rpc_timeout");
                Err(timed_out(method, timeout))
            }
        }
    }

    /// Abandons any handshake in progress, stops the reader, closes the
    /// socket and fails every outstanding call with [`ClientError::Closed`].
    pub async fn close(&self) {
        self.close_epoch.fetch_add(1, Ordering::AcqRel);
        self.closing.notify_waiters();

        let Some(connection) = self.current().take() else {
            return;
        };
        connection.reader.abort();
        let failed = connection.pending.fail_all(|| ClientError::Closed);
        if failed > 0 {
            info!(failed, "closed_with_pending_calls");
        }
        let closed = tokio::time::timeout(SINK_CLOSE_TIMEOUT, async {
            connection.sink.lock().await.close().await
        })
        .await;
        match closed {
            Ok(Ok(())) => {}
            Ok(Err(err)) => debug!(error = %err, "close_failed"),
            Err(_) => debug!("close_timed_out"),
        }
    }
}

fn timed_out(method: &str, timeout: Duration) -> ClientError {
    ClientError::Timeout {
        operation: format!("rpc {method}"),
        timeout,
    }
}

async fn read_loop(mut stream: SplitStream<WsStream>, pending: Arc<PendingTable>) {
    while let Some(message) = stream.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    debug!("frame_dropped: binary frame is not utf-8");
                    continue;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => {
                warn!(error = %err, "reader_error");
                break;
            }
        };
        dispatch_frame(&pending, &text);
    }
    let failed = pending.fail_all(|| ClientError::Closed);
    info!(failed, "reader_closed");
}

fn dispatch_frame(pending: &PendingTable, text: &str) {
    match parse_rpc_result(text) {
        Ok(response) => {
            let id = response.id.clone();
            if !pending.resolve(response) {
                debug!(%id, "rpc_stale_response");
            }
        }
        Err(err) => debug!(error = %err, "frame_dropped"),
    }
}
