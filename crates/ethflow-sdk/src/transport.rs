//! Transport layer for RPC communication

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::types::parse_data;
use crate::SdkError;

/// Transport trait for RPC communication (object-safe)
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send an RPC request and get the JSON result
    async fn request_json(&self, method: &str, params: Vec<Value>) -> Result<Value, SdkError>;

    /// `eth_subscribe`; returns the subscription id and its notification stream
    async fn subscribe(
        &self,
        params: Vec<Value>,
    ) -> Result<(String, mpsc::UnboundedReceiver<Value>), SdkError>;

    /// Stop routing notifications for `id` and tell the node, without waiting
    fn unsubscribe(&self, id: &str);
}

/// Helper to deserialize response
pub fn deserialize_response<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, SdkError> {
    serde_json::from_value(value).map_err(|e| SdkError::Serialization(e.to_string()))
}

/// Map a JSON-RPC error object
///
/// Code 3 with hex `data` is a revert and keeps its payload.
pub fn rpc_error(error: &Value) -> SdkError {
    let code = error.get("code").and_then(Value::as_i64).unwrap_or(-32603);
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    if code == 3 {
        if let Some(data) = error.get("data").and_then(Value::as_str) {
            if let Ok(data) = parse_data(data) {
                return SdkError::Reverted(data.to_vec());
            }
        }
    }
    SdkError::Rpc { code, message }
}

/// Stream of subscription items
///
/// Dropping it unregisters the subscription.
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
    _guard: Option<SubscriptionGuard>,
}

struct SubscriptionGuard(Option<Box<dyn FnOnce() + Send + Sync>>);

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(on_drop) = self.0.take() {
            on_drop();
        }
    }
}

impl<T: Send + 'static> Subscription<T> {
    /// Wrap a receiver with no cleanup
    pub fn new(rx: mpsc::UnboundedReceiver<T>) -> Self {
        Self { rx, _guard: None }
    }

    /// Wrap a receiver; `on_drop` runs once when the subscription goes away
    pub fn with_guard(rx: mpsc::UnboundedReceiver<T>, on_drop: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self { rx, _guard: Some(SubscriptionGuard(Some(Box::new(on_drop)))) }
    }

    /// Next item; `None` once the producer is gone
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Next item if one is buffered
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Transform items on a forwarding task, skipping those `f` rejects
    ///
    /// Must be called inside a tokio runtime.
    pub fn filter_map<U, F>(self, mut f: F) -> Subscription<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> Option<U> + Send + 'static,
    {
        let Subscription { mut rx, _guard } = self;
        let (tx, out) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            // keep the upstream registered until the forwarder stops
            let _guard = _guard;
            loop {
                tokio::select! {
                    item = rx.recv() => match item {
                        Some(item) => {
                            if let Some(mapped) = f(item) {
                                if tx.send(mapped).is_err() {
                                    break;
                                }
                            }
                        }
                        None => break,
                    },
                    _ = tx.closed() => break,
                }
            }
        });
        Subscription::new(out)
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

/// Mock transport for testing
///
/// Answers from canned responses and records every request, including the
/// `eth_unsubscribe` sent when a subscription is dropped.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<MockInner>,
}

struct MockInner {
    responses: Mutex<HashMap<String, Value>>,
    default_responses: HashMap<String, Value>,
    requests: Mutex<Vec<(String, Vec<Value>)>>,
    subscriptions: Mutex<HashMap<String, mpsc::UnboundedSender<Value>>>,
    next_subscription: AtomicU64,
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        let mut defaults = HashMap::new();
        defaults.insert("eth_chainId".to_string(), Value::String("0x539".to_string())); // 1337
        defaults.insert("eth_gasPrice".to_string(), Value::String("0x77359400".to_string())); // 2 gwei
        defaults.insert("eth_maxPriorityFeePerGas".to_string(), Value::String("0x3b9aca00".to_string()));
        defaults.insert("eth_blockNumber".to_string(), Value::String("0x100".to_string()));
        defaults.insert("eth_getBalance".to_string(), Value::String("0xde0b6b3a7640000".to_string())); // 1 ETH
        defaults.insert("eth_getTransactionCount".to_string(), Value::String("0x0".to_string()));
        defaults.insert("eth_estimateGas".to_string(), Value::String("0x5208".to_string())); // 21000
        defaults.insert("eth_call".to_string(), Value::String("0x".to_string()));
        defaults.insert("eth_getCode".to_string(), Value::String("0x".to_string()));
        defaults.insert("eth_getTransactionReceipt".to_string(), Value::Null);
        defaults.insert("eth_getTransactionByHash".to_string(), Value::Null);
        defaults.insert("eth_getLogs".to_string(), Value::Array(vec![]));

        Self {
            inner: Arc::new(MockInner {
                responses: Mutex::new(HashMap::new()),
                default_responses: defaults,
                requests: Mutex::new(Vec::new()),
                subscriptions: Mutex::new(HashMap::new()),
                next_subscription: AtomicU64::new(1),
            }),
        }
    }

    /// Set a mock response for a specific method
    pub fn set_response(&self, method: &str, response: Value) {
        self.inner.responses.lock().insert(method.to_string(), response);
    }

    /// Clear custom responses
    pub fn clear_responses(&self) {
        self.inner.responses.lock().clear();
    }

    /// Requests seen so far, oldest first
    pub fn requests(&self) -> Vec<(String, Vec<Value>)> {
        self.inner.requests.lock().clone()
    }

    /// Params of the last request for `method`
    pub fn last_params(&self, method: &str) -> Option<Vec<Value>> {
        self.inner
            .requests
            .lock()
            .iter()
            .rev()
            .find(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
    }

    /// Deliver a notification; `false` if the subscription is gone
    pub fn notify(&self, subscription: &str, result: Value) -> bool {
        self.inner
            .subscriptions
            .lock()
            .get(subscription)
            .is_some_and(|tx| tx.send(result).is_ok())
    }

    /// Currently registered subscription ids
    pub fn active_subscriptions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.subscriptions.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn record(&self, method: &str, params: &[Value]) {
        self.inner.requests.lock().push((method.to_string(), params.to_vec()));
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request_json(&self, method: &str, params: Vec<Value>) -> Result<Value, SdkError> {
        self.record(method, &params);

        // Check custom responses first
        let custom_response = self.inner.responses.lock().get(method).cloned();
        let response = custom_response.or_else(|| self.inner.default_responses.get(method).cloned());

        match response {
            Some(Value::Object(obj)) if obj.contains_key("error") => {
                Err(rpc_error(&obj["error"]))
            }
            Some(response) => Ok(response),
            None => Err(SdkError::Rpc {
                code: -32601,
                message: format!("Method not found: {}", method),
            }),
        }
    }

    async fn subscribe(
        &self,
        params: Vec<Value>,
    ) -> Result<(String, mpsc::UnboundedReceiver<Value>), SdkError> {
        self.record("eth_subscribe", &params);
        let id = format!("0x{:x}", self.inner.next_subscription.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.subscriptions.lock().insert(id.clone(), tx);
        Ok((id, rx))
    }

    fn unsubscribe(&self, id: &str) {
        self.record("eth_unsubscribe", &[Value::String(id.to_string())]);
        self.inner.subscriptions.lock().remove(id);
    }
}
