#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use stonegate_client::{ClientConfig, StoneGateClient};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

/// Server side of one accepted WebSocket connection.
pub struct Session {
    ws: WebSocketStream<TcpStream>,
}

impl Session {
    /// Next JSON text frame from the client, or `None` once it hangs up.
    pub async fn recv_request(&mut self) -> Option<Value> {
        loop {
            match self.ws.next().await? {
                Ok(Message::Text(text)) => match serde_json::from_str(&text) {
                    Ok(value) => return Some(value),
                    Err(_) => continue,
                },
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
    }

    pub async fn send_json(&mut self, frame: Value) {
        self.send_text(&frame.to_string()).await;
    }

    pub async fn send_text(&mut self, text: &str) {
        self.ws
            .send(Message::Text(text.to_string()))
            .await
            .expect("send frame");
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

pub fn request_id(request: &Value) -> String {
    request["id"].as_str().expect("request id").to_string()
}

pub fn ok_frame(id: &str, result: Value) -> Value {
    json!({"type": "rpc_result", "id": id, "ok": true, "result": result})
}

pub fn err_frame(id: &str, code: &str, message: &str, details: Value) -> Value {
    json!({
        "type": "rpc_result",
        "id": id,
        "ok": false,
        "error": {"code": code, "message": message, "details": details}
    })
}

pub struct FakeBackend {
    pub url: String,
    accepted: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl FakeBackend {
    /// Connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::parse(&self.url).expect("backend url")
    }

    pub fn client(&self) -> StoneGateClient {
        StoneGateClient::new(self.config())
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Runs `handler` for every accepted connection, passing the zero-based
/// connection index.
pub async fn spawn_backend<H, Fut>(handler: H) -> FakeBackend
where
    H: Fn(usize, Session) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let accepted = Arc::new(AtomicUsize::new(0));
    let handler = Arc::new(handler);

    let counter = accepted.clone();
    let task = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let index = counter.fetch_add(1, Ordering::SeqCst);
            let handler = handler.clone();
            tokio::spawn(async move {
                if let Ok(ws) = accept_async(stream).await {
                    handler(index, Session { ws }).await;
                }
            });
        }
    });

    FakeBackend {
        url: format!("ws://{addr}/status"),
        accepted,
        task,
    }
}

/// Accepts TCP connections and holds them open without ever answering the
/// WebSocket handshake.
pub struct StalledBackend {
    pub url: String,
    accepted: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl StalledBackend {
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn client(&self) -> StoneGateClient {
        StoneGateClient::new(ClientConfig::parse(&self.url).expect("backend url"))
    }

    /// Waits until at least `count` sockets are held.
    pub async fn wait_accepted(&self, count: usize) {
        for _ in 0..300 {
            if self.accepted() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {count} connections, saw {}", self.accepted());
    }
}

impl Drop for StalledBackend {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub async fn spawn_stalled_backend() -> StalledBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let accepted = Arc::new(AtomicUsize::new(0));

    let counter = accepted.clone();
    let task = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    StalledBackend {
        url: format!("ws://{addr}/status"),
        accepted,
        task,
    }
}

pub type Reply = Result<Value, (String, String, Value)>;

/// Request log shared between a routed backend and the test body.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<(String, Value)>>>);

impl CallLog {
    pub fn push(&self, method: &str, params: &Value) {
        self.0
            .lock()
            .expect("log")
            .push((method.to_string(), params.clone()));
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.0.lock().expect("log").clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.calls().into_iter().map(|(method, _)| method).collect()
    }
}

/// Answers each request in arrival order with whatever `route` returns and
/// records every `(method, params)` pair in the returned log.
pub async fn serve_rpc<R>(route: R) -> (FakeBackend, CallLog)
where
    R: Fn(&str, &Value) -> Reply + Send + Sync + 'static,
{
    let log = CallLog::default();
    let route = Arc::new(route);
    let server_log = log.clone();
    let backend = spawn_backend(move |_, mut session| {
        let route = route.clone();
        let log = server_log.clone();
        async move {
            while let Some(request) = session.recv_request().await {
                let id = request_id(&request);
                let method = request["method"].as_str().unwrap_or_default().to_string();
                let params = request.get("params").cloned().unwrap_or(Value::Null);
                log.push(&method, &params);
                let frame = match route(&method, &params) {
                    Ok(result) => ok_frame(&id, result),
                    Err((code, message, details)) => err_frame(&id, &code, &message, details),
                };
                session.send_json(frame).await;
            }
        }
    })
    .await;
    (backend, log)
}

pub fn rpc_err(code: &str, message: &str, details: Value) -> Reply {
    Err((code.to_string(), message.to_string(), details))
}
