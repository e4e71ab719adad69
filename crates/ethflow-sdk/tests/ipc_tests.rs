//! `IpcClient` against an in-process fake node
#![cfg(unix)]

use std::time::Duration;

use ethflow_sdk::{ChainClient, FilterQuery, IpcClient, SdkError, Address};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::mpsc;

/// Serves one connection: answers known methods and, after `eth_subscribe`,
/// pushes a notification before and after the reply is read. Every request
/// method is reported on `seen`.
async fn fake_node(listener: UnixListener, seen: mpsc::UnboundedSender<String>) {
    let (stream, _) = listener.accept().await.unwrap();
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let req: Value = serde_json::from_str(&line).unwrap();
        let method = req["method"].as_str().unwrap().to_string();
        let _ = seen.send(method.clone());
        let id = req["id"].clone();
        let mut out = Vec::new();
        match method.as_str() {
            "eth_chainId" => out.push(json!({"jsonrpc": "2.0", "id": id, "result": "0x539"})),
            "eth_getBalance" => out.push(json!({"jsonrpc": "2.0", "id": id, "result": "0x7ce66c50e2840000"})),
            "eth_subscribe" => {
                out.push(json!({"jsonrpc": "2.0", "id": id, "result": "0xabc"}));
                for block in [1, 2] {
                    out.push(json!({
                        "jsonrpc": "2.0",
                        "method": "eth_subscription",
                        "params": {
                            "subscription": "0xabc",
                            "result": {"address": Address::ZERO, "topics": [], "data": "0x", "blockNumber": format!("0x{block:x}")}
                        }
                    }));
                }
            }
            "eth_unsubscribe" => out.push(json!({"jsonrpc": "2.0", "id": id, "result": true})),
            _ => out.push(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32601, "message": format!("the method {method} does not exist")}
            })),
        }
        for msg in out {
            write.write_all(format!("{msg}\n").as_bytes()).await.unwrap();
        }
    }
}

async fn connect() -> (tempfile::TempDir, IpcClient, mpsc::UnboundedReceiver<String>) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("geth.ipc");
    let listener = UnixListener::bind(&path).unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(fake_node(listener, tx));
    let client = IpcClient::connect(&path).await.unwrap();
    (dir, client, rx)
}

#[tokio::test]
async fn test_ipc_queries() {
    let (_dir, client, _seen) = connect().await;
    assert_eq!(client.chain_id().await.unwrap(), 1337);
    let balance = client.balance_at(&Address::ZERO, None).await.unwrap();
    assert_eq!(balance, ethflow_sdk::U256::from(9_000_000_000_000_000_000u64));
}

#[tokio::test]
async fn test_ipc_error_object() {
    let (_dir, client, _seen) = connect().await;
    let err = client.block_number().await.unwrap_err();
    assert!(matches!(err, SdkError::Rpc { code: -32601, .. }));
}

#[tokio::test]
async fn test_ipc_subscription_routing_and_unsubscribe() {
    let (_dir, client, mut seen) = connect().await;
    let mut sub = client.subscribe_filter_logs(&FilterQuery::new()).await.unwrap();

    let first = tokio::time::timeout(Duration::from_secs(2), sub.recv()).await.unwrap().unwrap();
    let second = tokio::time::timeout(Duration::from_secs(2), sub.recv()).await.unwrap().unwrap();
    assert_eq!((first.block_number, second.block_number), (1, 2));

    drop(sub);
    let unsubscribed = tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(method) = seen.recv().await {
            if method == "eth_unsubscribe" {
                return true;
            }
        }
        false
    })
    .await
    .unwrap();
    assert!(unsubscribed);
}
