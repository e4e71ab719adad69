//! JSON mapping of `RpcClient` over the mock transport

use ethflow_sdk::{
    ChainClient, FilterQuery, MockTransport, RpcClient, SdkError, TxBuilder, Wallet, Address, H256, U256,
};
use serde_json::{json, Value};

fn signed_transfer() -> ethflow_sdk::SignedTransaction {
    let wallet = Wallet::from_private_key_hex(
        "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
    )
    .unwrap();
    TxBuilder::new(1337)
        .nonce(7)
        .gas_limit(21_000)
        .max_fee_per_gas(3_000_000_000u64)
        .max_priority_fee_per_gas(1_000_000_000u64)
        .to(Address::from_bytes([0x42; 20]))
        .value(1_000u64)
        .sign(&wallet)
        .unwrap()
}

fn tx_json(tx: &ethflow_sdk::SignedTransaction, block_hash: Value) -> Value {
    let sig = tx.signature();
    json!({
        "hash": tx.hash(),
        "blockHash": block_hash,
        "type": "0x2",
        "chainId": format!("0x{:x}", tx.chain_id()),
        "nonce": format!("0x{:x}", tx.nonce()),
        "maxPriorityFeePerGas": tx.max_priority_fee_per_gas(),
        "maxFeePerGas": tx.max_fee_per_gas(),
        "gas": format!("0x{:x}", tx.gas_limit()),
        "to": tx.to(),
        "value": tx.value(),
        "input": "0x",
        "accessList": [],
        "yParity": format!("0x{:x}", sig.y_parity()),
        "v": format!("0x{:x}", sig.y_parity()),
        "r": sig.r.to_u256(),
        "s": sig.s.to_u256(),
    })
}

#[tokio::test]
async fn test_custom_chain_id() {
    let transport = MockTransport::new();
    transport.set_response("eth_chainId", Value::String("0x5".to_string()));
    let client = RpcClient::with_transport(transport);
    assert_eq!(client.chain_id().await.unwrap(), 5);
}

#[tokio::test]
async fn test_send_transaction_raw_hex() {
    let (client, transport) = RpcClient::new_mock();
    let tx = signed_transfer();
    transport.set_response("eth_sendRawTransaction", json!(tx.hash()));

    let hash = client.send_transaction(&tx).await.unwrap();
    assert_eq!(hash, tx.hash());
    let params = transport.last_params("eth_sendRawTransaction").unwrap();
    assert_eq!(params[0], json!(format!("0x{}", hex::encode(tx.encode_raw()))));
}

#[tokio::test]
async fn test_send_rejection_maps_to_rpc() {
    let (client, transport) = RpcClient::new_mock();
    transport.set_response(
        "eth_sendRawTransaction",
        json!({"error": {"code": -32000, "message": "replacement transaction underpriced"}}),
    );
    let err = client.send_transaction(&signed_transfer()).await.unwrap_err();
    assert!(matches!(err, SdkError::Rpc { code: -32000, .. }));
}

#[tokio::test]
async fn test_transaction_by_hash_pending_and_mined() {
    let (client, transport) = RpcClient::new_mock();
    let tx = signed_transfer();

    transport.set_response("eth_getTransactionByHash", tx_json(&tx, Value::Null));
    let (fetched, pending) = client.transaction_by_hash(&tx.hash()).await.unwrap().unwrap();
    assert!(pending);
    assert_eq!(fetched, tx);

    transport.set_response("eth_getTransactionByHash", tx_json(&tx, json!(H256::from_bytes([1; 32]))));
    let (_, pending) = client.transaction_by_hash(&tx.hash()).await.unwrap().unwrap();
    assert!(!pending);
}

#[tokio::test]
async fn test_transaction_by_hash_rejects_tampered_fields() {
    let (client, transport) = RpcClient::new_mock();
    let tx = signed_transfer();
    let mut value = tx_json(&tx, Value::Null);
    value["value"] = json!(U256::from(2_000u64));
    transport.set_response("eth_getTransactionByHash", value);

    let err = client.transaction_by_hash(&tx.hash()).await.unwrap_err();
    assert!(matches!(err, SdkError::InvalidTransaction(_)));
}

#[tokio::test]
async fn test_header_base_fee() {
    let (client, transport) = RpcClient::new_mock();
    transport.set_response(
        "eth_getBlockByNumber",
        json!({
            "number": "0x2",
            "hash": H256::from_bytes([3; 32]),
            "parentHash": H256::from_bytes([2; 32]),
            "miner": Address::ZERO,
            "timestamp": "0x64",
            "gasLimit": "0x1c9c380",
            "gasUsed": "0x5208",
            "baseFeePerGas": "0x342770c0",
            "transactionsRoot": H256::ZERO,
        }),
    );
    let header = client.header_by_number(Some(2)).await.unwrap().unwrap();
    assert_eq!(header.number, 2);
    assert_eq!(header.base_fee_per_gas, U256::from(875_000_000u64));
    assert_eq!(transport.last_params("eth_getBlockByNumber").unwrap(), vec![json!("0x2"), json!(false)]);

    transport.set_response("eth_getBlockByNumber", Value::Null);
    assert!(client.header_by_number(Some(99)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_filter_logs_query_and_parse() {
    let (client, transport) = RpcClient::new_mock();
    let contract = Address::from_bytes([5; 20]);
    let topic = H256::from_bytes([6; 32]);
    transport.set_response(
        "eth_getLogs",
        json!([{
            "address": contract,
            "topics": [topic],
            "data": "0x",
            "blockNumber": "0x3",
            "blockHash": H256::from_bytes([7; 32]),
            "transactionHash": H256::from_bytes([8; 32]),
            "transactionIndex": "0x0",
            "logIndex": "0x1",
            "removed": false
        }]),
    );

    let query = FilterQuery::new().address(contract).event(topic).from_block(1);
    let logs = client.filter_logs(&query).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].block_number, 3);
    assert_eq!(logs[0].log_index, 1);

    let params = transport.last_params("eth_getLogs").unwrap();
    assert_eq!(params[0]["address"], json!([contract]));
    assert_eq!(params[0]["fromBlock"], json!("0x1"));
}

#[tokio::test]
async fn test_log_subscription_lifecycle() {
    let (client, transport) = RpcClient::new_mock();
    let contract = Address::from_bytes([5; 20]);
    let mut sub = client.subscribe_filter_logs(&FilterQuery::new().address(contract)).await.unwrap();

    let id = transport.active_subscriptions().pop().unwrap();
    assert_eq!(transport.last_params("eth_subscribe").unwrap()[0], json!("logs"));

    assert!(transport.notify(&id, json!({"garbage": true})));
    assert!(transport.notify(
        &id,
        json!({"address": contract, "topics": [], "data": "0x2a", "blockNumber": "0x9"}),
    ));
    let log = sub.recv().await.unwrap();
    assert_eq!(log.block_number, 9);
    assert_eq!(log.data.as_ref(), &[0x2a]);

    drop(sub);
    // the forwarding task drops the upstream guard once it sees the close
    for _ in 0..50 {
        if transport.active_subscriptions().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(transport.active_subscriptions().is_empty());
    assert_eq!(transport.last_params("eth_unsubscribe"), Some(vec![json!(id)]));
}
