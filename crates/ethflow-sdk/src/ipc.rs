//! Newline-delimited JSON-RPC 2.0 over a Unix domain socket
//!
//! One background task reads the socket. Responses complete the request
//! with the same id; `eth_subscription` notifications go to the channel
//! registered for their subscription id. Notifications that arrive before
//! `eth_subscribe` has returned are buffered and replayed on registration.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::client::RpcClient;
use crate::transport::{rpc_error, Transport};
use crate::SdkError;

/// `ChainClient` over IPC
pub type IpcClient = RpcClient;

/// Notifications kept per unknown subscription id
const MAX_ORPHANS: usize = 256;

/// Unknown subscription ids buffered at once
const MAX_ORPHAN_IDS: usize = 64;

/// IPC connection settings
#[derive(Debug, Clone)]
pub struct IpcConfig {
    /// Per-request deadline; `None` waits as long as the connection lives
    pub request_timeout: Option<Duration>,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self { request_timeout: Some(Duration::from_secs(30)) }
    }
}

type PendingReply = oneshot::Sender<Result<Value, SdkError>>;

#[derive(Default)]
struct Routes {
    pending: HashMap<u64, PendingReply>,
    subscriptions: HashMap<String, mpsc::UnboundedSender<Value>>,
    orphans: HashMap<String, Vec<Value>>,
    /// Ids whose `eth_unsubscribe` is in flight
    cancelled: HashSet<String>,
    closed: bool,
}

impl Routes {
    /// Hold a notification for a subscription not registered yet
    fn buffer_orphan(&mut self, id: &str, result: Value) {
        if self.cancelled.contains(id) {
            return;
        }
        if !self.orphans.contains_key(id) && self.orphans.len() >= MAX_ORPHAN_IDS {
            tracing::warn!(%id, "too many unknown subscriptions, dropping notification");
            return;
        }
        let buffered = self.orphans.entry(id.to_string()).or_default();
        if buffered.len() < MAX_ORPHANS {
            buffered.push(result);
        }
    }

    /// Stop routing `id`; late notifications are dropped until [`Self::unsubscribed`]
    fn cancel(&mut self, id: &str) {
        self.subscriptions.remove(id);
        self.orphans.remove(id);
        self.cancelled.insert(id.to_string());
    }

    /// The node acknowledged (or refused) `eth_unsubscribe`
    fn unsubscribed(&mut self, id: &str) {
        self.cancelled.remove(id);
        self.orphans.remove(id);
    }
}

struct Shared {
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    routes: Mutex<Routes>,
    next_id: AtomicU64,
    config: IpcConfig,
}

/// IPC transport
pub struct IpcTransport {
    shared: Arc<Shared>,
    reader: JoinHandle<()>,
}

impl IpcTransport {
    /// Connect to a node's IPC endpoint
    pub async fn connect(path: impl AsRef<Path>, config: IpcConfig) -> Result<Self, SdkError> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path)
            .await
            .map_err(|e| SdkError::Transport(format!("connect {}: {e}", path.display())))?;
        let (read_half, write_half) = stream.into_split();

        let shared = Arc::new(Shared {
            writer: tokio::sync::Mutex::new(write_half),
            routes: Mutex::new(Routes::default()),
            next_id: AtomicU64::new(1),
            config,
        });
        let reader = tokio::spawn(read_loop(read_half, Arc::clone(&shared)));
        tracing::info!(path = %path.display(), "IPC connected");
        Ok(Self { shared, reader })
    }
}

impl Drop for IpcTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl Shared {
    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value, SdkError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        {
            let mut routes = self.routes.lock();
            if routes.closed {
                return Err(SdkError::Transport("IPC connection closed".to_string()));
            }
            routes.pending.insert(id, tx);
        }

        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let mut line = serde_json::to_vec(&request)?;
        line.push(b'\n');
        tracing::debug!(id, method, "IPC request");

        let written = {
            let mut writer = self.writer.lock().await;
            match writer.write_all(&line).await {
                Ok(()) => writer.flush().await,
                Err(e) => Err(e),
            }
        };
        if let Err(e) = written {
            self.routes.lock().pending.remove(&id);
            return Err(SdkError::Transport(format!("write: {e}")));
        }

        let reply = match self.config.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(reply) => reply,
                Err(_) => {
                    self.routes.lock().pending.remove(&id);
                    return Err(SdkError::Timeout(format!("{method} after {limit:?}")));
                }
            },
            None => rx.await,
        };
        reply.map_err(|_| SdkError::Transport("IPC connection closed".to_string()))?
    }
}

async fn read_loop(read_half: OwnedReadHalf, shared: Arc<Shared>) {
    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => match serde_json::from_str::<Value>(&line) {
                Ok(message) => dispatch(&shared, message),
                Err(e) => tracing::warn!(error = %e, "unparsable IPC message"),
            },
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "IPC read failed");
                break;
            }
        }
    }

    let mut routes = shared.routes.lock();
    routes.closed = true;
    let failed = routes.pending.len();
    for (_, reply) in routes.pending.drain() {
        let _ = reply.send(Err(SdkError::Transport("IPC connection closed".to_string())));
    }
    routes.subscriptions.clear();
    tracing::info!(failed, "IPC connection closed");
}

fn dispatch(shared: &Shared, message: Value) {
    if message.get("method").and_then(Value::as_str) == Some("eth_subscription") {
        let params = &message["params"];
        let Some(id) = params.get("subscription").and_then(Value::as_str) else {
            tracing::warn!("notification without subscription id");
            return;
        };
        let result = params.get("result").cloned().unwrap_or(Value::Null);

        let mut routes = shared.routes.lock();
        if let Some(tx) = routes.subscriptions.get(id) {
            if tx.send(result).is_err() {
                routes.subscriptions.remove(id);
            }
        } else {
            routes.buffer_orphan(id, result);
        }
        return;
    }

    let Some(id) = message.get("id").and_then(Value::as_u64) else {
        tracing::warn!("IPC message without numeric id");
        return;
    };
    let Some(reply) = shared.routes.lock().pending.remove(&id) else {
        tracing::debug!(id, "response for unknown request");
        return;
    };
    let outcome = match message.get("error") {
        Some(error) if !error.is_null() => Err(rpc_error(error)),
        _ => Ok(message.get("result").cloned().unwrap_or(Value::Null)),
    };
    tracing::debug!(id, ok = outcome.is_ok(), "IPC response");
    let _ = reply.send(outcome);
}

#[async_trait]
impl Transport for IpcTransport {
    async fn request_json(&self, method: &str, params: Vec<Value>) -> Result<Value, SdkError> {
        self.shared.request(method, params).await
    }

    async fn subscribe(
        &self,
        params: Vec<Value>,
    ) -> Result<(String, mpsc::UnboundedReceiver<Value>), SdkError> {
        let id = self.shared.request("eth_subscribe", params).await?;
        let id = id
            .as_str()
            .ok_or_else(|| SdkError::Serialization(format!("subscription id: {id}")))?
            .to_string();

        let (tx, rx) = mpsc::unbounded_channel();
        let mut routes = self.shared.routes.lock();
        for early in routes.orphans.remove(&id).unwrap_or_default() {
            let _ = tx.send(early);
        }
        routes.subscriptions.insert(id.clone(), tx);
        tracing::debug!(%id, "subscribed");
        Ok((id, rx))
    }

    fn unsubscribe(&self, id: &str) {
        let handle = tokio::runtime::Handle::try_current();
        {
            let mut routes = self.shared.routes.lock();
            if routes.closed || handle.is_err() {
                routes.subscriptions.remove(id);
                routes.unsubscribed(id);
                return;
            }
            routes.cancel(id);
        }
        let Ok(handle) = handle else {
            return;
        };
        let shared = Arc::clone(&self.shared);
        let id = id.to_string();
        handle.spawn(async move {
            if let Err(e) = shared.request("eth_unsubscribe", vec![Value::String(id.clone())]).await {
                tracing::debug!(%id, error = %e, "eth_unsubscribe failed");
            }
            shared.routes.lock().unsubscribed(&id);
        });
    }
}

impl RpcClient {
    /// Connect over IPC with default settings
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, SdkError> {
        Self::connect_with(path, IpcConfig::default()).await
    }

    /// Connect over IPC
    pub async fn connect_with(path: impl AsRef<Path>, config: IpcConfig) -> Result<Self, SdkError> {
        let transport = IpcTransport::connect(path, config).await?;
        Ok(Self::with_transport(transport))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UnixListener;

    /// Echo server answering every request with its method name
    async fn serve_echo(listener: UnixListener) {
        let (stream, _) = listener.accept().await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        while let Some(line) = lines.next_line().await.unwrap() {
            let req: Value = serde_json::from_str(&line).unwrap();
            let resp = json!({"jsonrpc": "2.0", "id": req["id"], "result": req["method"]});
            write.write_all(format!("{resp}\n").as_bytes()).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_request_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.ipc");
        let listener = UnixListener::bind(&path).unwrap();
        tokio::spawn(serve_echo(listener));

        let transport = IpcTransport::connect(&path, IpcConfig::default()).await.unwrap();
        let (a, b) = tokio::join!(
            transport.request_json("eth_chainId", vec![]),
            transport.request_json("eth_blockNumber", vec![]),
        );
        assert_eq!(a.unwrap(), json!("eth_chainId"));
        assert_eq!(b.unwrap(), json!("eth_blockNumber"));
    }

    #[tokio::test]
    async fn test_connection_loss_fails_pending() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.ipc");
        let listener = UnixListener::bind(&path).unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut lines = BufReader::new(stream).lines();
            // read one request, then hang up without answering
            let _ = lines.next_line().await;
        });

        let transport = IpcTransport::connect(&path, IpcConfig { request_timeout: None }).await.unwrap();
        let err = transport.request_json("eth_chainId", vec![]).await.unwrap_err();
        assert!(matches!(err, SdkError::Transport(_)));
        let err = transport.request_json("eth_chainId", vec![]).await.unwrap_err();
        assert!(matches!(err, SdkError::Transport(_)));
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.ipc");
        let listener = UnixListener::bind(&path).unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        let config = IpcConfig { request_timeout: Some(Duration::from_millis(50)) };
        let transport = IpcTransport::connect(&path, config).await.unwrap();
        let err = transport.request_json("eth_chainId", vec![]).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_orphans_are_capped() {
        let mut routes = Routes::default();
        for n in 0..MAX_ORPHANS + 10 {
            routes.buffer_orphan("0xa", json!(n));
        }
        assert_eq!(routes.orphans["0xa"].len(), MAX_ORPHANS);

        for n in 0..MAX_ORPHAN_IDS * 2 {
            routes.buffer_orphan(&format!("0x{n:x}00"), json!(n));
        }
        assert_eq!(routes.orphans.len(), MAX_ORPHAN_IDS);
        // known ids keep buffering at the id cap
        routes.buffer_orphan("0xa", json!("late"));
        assert_eq!(routes.orphans["0xa"].len(), MAX_ORPHANS);
    }

    #[test]
    fn test_cancelled_ids_are_released() {
        let mut routes = Routes::default();
        routes.buffer_orphan("0xb", json!(1));
        routes.cancel("0xb");
        routes.buffer_orphan("0xb", json!(2));
        assert!(!routes.orphans.contains_key("0xb"));

        routes.unsubscribed("0xb");
        assert!(routes.cancelled.is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_clears_cancelled_after_reply() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.ipc");
        let listener = UnixListener::bind(&path).unwrap();
        tokio::spawn(serve_echo(listener));

        let transport = IpcTransport::connect(&path, IpcConfig::default()).await.unwrap();
        // the echo server hands back the method name as subscription id
        let (id, _rx) = transport.subscribe(vec![json!("newHeads")]).await.unwrap();
        assert_eq!(id, "eth_subscribe");

        transport.unsubscribe(&id);
        assert!(transport.shared.routes.lock().cancelled.contains(&id));
        tokio::time::timeout(Duration::from_secs(5), async {
            while !transport.shared.routes.lock().cancelled.is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(transport.shared.routes.lock().subscriptions.is_empty());
    }

    #[tokio::test]
    async fn test_connect_missing_socket() {
        let dir = tempfile::tempdir().unwrap();
        let err = IpcTransport::connect(dir.path().join("absent.ipc"), IpcConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SdkError::Transport(_)));
    }
}
