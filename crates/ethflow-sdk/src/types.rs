//! SDK types

use bytes::Bytes;
use ethflow_crypto::Signature;
use ethflow_primitives::{Address, H256, U256};
use ethflow_types::{AccessListItem, DynamicFeeTx, Header, Log, Receipt, SignedTransaction, TxStatus};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::SdkError;

/// Block identifier for RPC queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockId {
    /// Block number
    Number(u64),
    /// Latest block
    #[default]
    Latest,
    /// Pending block (includes pending transactions)
    Pending,
    /// Earliest block (genesis)
    Earliest,
}

impl From<Option<u64>> for BlockId {
    fn from(number: Option<u64>) -> Self {
        number.map_or(BlockId::Latest, BlockId::Number)
    }
}

impl Serialize for BlockId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            BlockId::Number(n) => serializer.serialize_str(&format!("0x{:x}", n)),
            BlockId::Latest => serializer.serialize_str("latest"),
            BlockId::Pending => serializer.serialize_str("pending"),
            BlockId::Earliest => serializer.serialize_str("earliest"),
        }
    }
}

/// Message for `eth_call` and `eth_estimateGas`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallMsg {
    /// Sender address
    pub from: Option<Address>,
    /// Recipient; `None` simulates a creation
    pub to: Option<Address>,
    /// Gas limit; the backend picks one when unset
    pub gas: Option<u64>,
    /// Legacy gas price
    pub gas_price: Option<U256>,
    /// Fee cap
    pub gas_fee_cap: Option<U256>,
    /// Tip cap
    pub gas_tip_cap: Option<U256>,
    /// Value to transfer
    pub value: Option<U256>,
    /// Input data
    pub data: Bytes,
}

impl CallMsg {
    /// Call `to` with `data`
    pub fn new(to: Address, data: impl Into<Bytes>) -> Self {
        Self { to: Some(to), data: data.into(), ..Default::default() }
    }

    /// Set the sender
    pub fn from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    /// Set the value
    pub fn value(mut self, value: U256) -> Self {
        self.value = Some(value);
        self
    }
}

impl Serialize for CallMsg {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if let Some(from) = &self.from {
            map.serialize_entry("from", from)?;
        }
        if let Some(to) = &self.to {
            map.serialize_entry("to", to)?;
        }
        if let Some(gas) = &self.gas {
            map.serialize_entry("gas", &format!("0x{:x}", gas))?;
        }
        if let Some(gas_price) = &self.gas_price {
            map.serialize_entry("gasPrice", gas_price)?;
        }
        if let Some(fee_cap) = &self.gas_fee_cap {
            map.serialize_entry("maxFeePerGas", fee_cap)?;
        }
        if let Some(tip_cap) = &self.gas_tip_cap {
            map.serialize_entry("maxPriorityFeePerGas", tip_cap)?;
        }
        if let Some(value) = &self.value {
            map.serialize_entry("value", value)?;
        }
        if !self.data.is_empty() {
            map.serialize_entry("data", &format!("0x{}", hex::encode(&self.data)))?;
        }
        map.end()
    }
}

/// Log filter
///
/// `topics` is positional: entry `i` constrains topic `i`, `None` matches
/// anything, and `Some(alternatives)` matches any listed value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterQuery {
    /// First block, inclusive
    pub from_block: Option<u64>,
    /// Last block, inclusive
    pub to_block: Option<u64>,
    /// Emitting contracts; empty matches any
    pub addresses: Vec<Address>,
    /// Positional topic constraints
    pub topics: Vec<Option<Vec<H256>>>,
}

impl FilterQuery {
    /// Match everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to an emitting contract
    pub fn address(mut self, address: Address) -> Self {
        self.addresses.push(address);
        self
    }

    /// Start at `block`
    pub fn from_block(mut self, block: u64) -> Self {
        self.from_block = Some(block);
        self
    }

    /// Stop at `block`
    pub fn to_block(mut self, block: u64) -> Self {
        self.to_block = Some(block);
        self
    }

    /// Constrain topic `index` to any of `values`; an empty set matches anything
    pub fn topic(mut self, index: usize, values: Vec<H256>) -> Self {
        if self.topics.len() <= index {
            self.topics.resize(index + 1, None);
        }
        self.topics[index] = if values.is_empty() { None } else { Some(values) };
        self
    }

    /// Constrain the event signature
    pub fn event(self, topic0: H256) -> Self {
        self.topic(0, vec![topic0])
    }

    /// Whether a placed log satisfies the filter
    pub fn matches(&self, log: &Log) -> bool {
        if self.from_block.is_some_and(|from| log.block_number < from) {
            return false;
        }
        if self.to_block.is_some_and(|to| log.block_number > to) {
            return false;
        }
        if !self.addresses.is_empty() && !self.addresses.contains(&log.address) {
            return false;
        }
        self.topics.iter().enumerate().all(|(i, position)| match position {
            None => true,
            Some(alternatives) => log.topics.get(i).is_some_and(|t| alternatives.contains(t)),
        })
    }
}

impl Serialize for FilterQuery {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if let Some(from) = self.from_block {
            map.serialize_entry("fromBlock", &BlockId::Number(from))?;
        }
        if let Some(to) = self.to_block {
            map.serialize_entry("toBlock", &BlockId::Number(to))?;
        }
        if !self.addresses.is_empty() {
            map.serialize_entry("address", &self.addresses)?;
        }
        if !self.topics.is_empty() {
            map.serialize_entry("topics", &self.topics)?;
        }
        map.end()
    }
}

/// Parse a `0x` quantity
pub fn parse_quantity(s: &str) -> Result<u64, SdkError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(digits, 16).map_err(|e| SdkError::InvalidHex(format!("{s}: {e}")))
}

/// Parse `0x` data; `0x` alone is empty
pub fn parse_data(s: &str) -> Result<Bytes, SdkError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    Ok(Bytes::from(hex::decode(digits)?))
}

mod quantity {
    use serde::{de, Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        let s = String::deserialize(d)?;
        super::parse_quantity(&s).map_err(de::Error::custom)
    }

    pub mod option {
        use serde::{de, Deserialize, Deserializer};

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
            Option::<String>::deserialize(d)?
                .map(|s| super::super::parse_quantity(&s).map_err(de::Error::custom))
                .transpose()
        }
    }
}

mod data {
    use bytes::Bytes;
    use serde::{de, Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Bytes, D::Error> {
        let s = String::deserialize(d)?;
        super::parse_data(&s).map_err(de::Error::custom)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RpcLog {
    address: Address,
    topics: Vec<H256>,
    #[serde(with = "data")]
    data: Bytes,
    #[serde(default, with = "quantity::option")]
    block_number: Option<u64>,
    #[serde(default)]
    block_hash: Option<H256>,
    #[serde(default)]
    transaction_hash: Option<H256>,
    #[serde(default, with = "quantity::option")]
    transaction_index: Option<u64>,
    #[serde(default, with = "quantity::option")]
    log_index: Option<u64>,
    #[serde(default)]
    removed: bool,
}

impl From<RpcLog> for Log {
    fn from(log: RpcLog) -> Self {
        Log {
            address: log.address,
            topics: log.topics,
            data: log.data,
            block_number: log.block_number.unwrap_or_default(),
            block_hash: log.block_hash.unwrap_or_default(),
            transaction_hash: log.transaction_hash.unwrap_or_default(),
            transaction_index: log.transaction_index.unwrap_or_default(),
            log_index: log.log_index.unwrap_or_default(),
            removed: log.removed,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RpcReceipt {
    transaction_hash: H256,
    #[serde(with = "quantity")]
    transaction_index: u64,
    block_hash: H256,
    #[serde(with = "quantity")]
    block_number: u64,
    from: Address,
    to: Option<Address>,
    contract_address: Option<Address>,
    #[serde(with = "quantity")]
    gas_used: u64,
    #[serde(with = "quantity")]
    cumulative_gas_used: u64,
    effective_gas_price: U256,
    #[serde(with = "quantity")]
    status: u64,
    logs: Vec<RpcLog>,
}

impl From<RpcReceipt> for Receipt {
    fn from(r: RpcReceipt) -> Self {
        Receipt {
            status: TxStatus::from(r.status == 1),
            transaction_hash: r.transaction_hash,
            transaction_index: r.transaction_index,
            block_hash: r.block_hash,
            block_number: r.block_number,
            from: r.from,
            to: r.to,
            contract_address: r.contract_address,
            gas_used: r.gas_used,
            cumulative_gas_used: r.cumulative_gas_used,
            effective_gas_price: r.effective_gas_price,
            logs: r.logs.into_iter().map(Log::from).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RpcHeader {
    #[serde(with = "quantity")]
    number: u64,
    parent_hash: H256,
    miner: Address,
    #[serde(with = "quantity")]
    timestamp: u64,
    #[serde(with = "quantity")]
    gas_limit: u64,
    #[serde(with = "quantity")]
    gas_used: u64,
    #[serde(default)]
    base_fee_per_gas: Option<U256>,
    transactions_root: H256,
}

impl From<RpcHeader> for Header {
    fn from(h: RpcHeader) -> Self {
        Header {
            number: h.number,
            parent_hash: h.parent_hash,
            coinbase: h.miner,
            timestamp: h.timestamp,
            gas_limit: h.gas_limit,
            gas_used: h.gas_used,
            base_fee_per_gas: h.base_fee_per_gas.unwrap_or_default(),
            transactions_root: h.transactions_root,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcAccessListItem {
    address: Address,
    storage_keys: Vec<H256>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RpcTransaction {
    hash: H256,
    #[serde(default)]
    block_hash: Option<H256>,
    #[serde(rename = "type", with = "quantity")]
    tx_type: u64,
    #[serde(with = "quantity")]
    chain_id: u64,
    #[serde(with = "quantity")]
    nonce: u64,
    max_priority_fee_per_gas: U256,
    max_fee_per_gas: U256,
    #[serde(with = "quantity")]
    gas: u64,
    to: Option<Address>,
    value: U256,
    #[serde(with = "data")]
    input: Bytes,
    #[serde(default)]
    access_list: Vec<RpcAccessListItem>,
    #[serde(default, with = "quantity::option")]
    y_parity: Option<u64>,
    #[serde(with = "quantity")]
    v: u64,
    r: U256,
    s: U256,
}

impl RpcTransaction {
    /// Rebuild the signed envelope; the second value is `true` while pending
    pub(crate) fn into_signed(self) -> Result<(SignedTransaction, bool), SdkError> {
        if self.tx_type != 2 {
            return Err(SdkError::InvalidTransaction(format!(
                "unsupported transaction type {}",
                self.tx_type
            )));
        }
        let parity = self.y_parity.unwrap_or(self.v);
        let parity = u8::try_from(parity)
            .map_err(|_| SdkError::InvalidTransaction(format!("invalid y parity {parity}")))?;
        let tx = DynamicFeeTx {
            chain_id: self.chain_id,
            nonce: self.nonce,
            max_priority_fee_per_gas: self.max_priority_fee_per_gas,
            max_fee_per_gas: self.max_fee_per_gas,
            gas_limit: self.gas,
            to: self.to,
            value: self.value,
            data: self.input,
            access_list: self
                .access_list
                .into_iter()
                .map(|item| AccessListItem { address: item.address, storage_keys: item.storage_keys })
                .collect(),
        };
        let signature = Signature::new(H256::from_u256(self.r), H256::from_u256(self.s), parity);
        let signed = SignedTransaction::new(tx, signature);
        if signed.hash() != self.hash {
            return Err(SdkError::InvalidTransaction(format!(
                "hash mismatch: node reports {}, envelope hashes to {}",
                self.hash,
                signed.hash()
            )));
        }
        Ok((signed, self.block_hash.is_none()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn placed_log(address: Address, topics: Vec<H256>, block: u64) -> Log {
        Log { block_number: block, ..Log::new(address, topics, Bytes::new()) }
    }

    #[test]
    fn test_block_id_serialize() {
        assert_eq!(serde_json::to_string(&BlockId::Latest).unwrap(), "\"latest\"");
        assert_eq!(serde_json::to_string(&BlockId::Number(100)).unwrap(), "\"0x64\"");
        assert_eq!(serde_json::to_string(&BlockId::Pending).unwrap(), "\"pending\"");
        assert_eq!(BlockId::from(Some(3)), BlockId::Number(3));
        assert_eq!(BlockId::from(None), BlockId::Latest);
    }

    #[test]
    fn test_call_msg_serialize() {
        let msg = CallMsg::new(Address::ZERO, vec![0x01, 0x02]).value(U256::from(1000));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["to"], json!(Address::ZERO.to_hex()));
        assert_eq!(json["data"], json!("0x0102"));
        assert_eq!(json["value"], json!("0x3e8"));
        assert!(json.get("from").is_none());
    }

    #[test]
    fn test_filter_query_topics() {
        let contract = Address::from_bytes([1; 20]);
        let sig = H256::from_bytes([0xaa; 32]);
        let who = H256::from_bytes([0xbb; 32]);
        let query = FilterQuery::new().address(contract).event(sig).topic(1, vec![who]);

        assert!(query.matches(&placed_log(contract, vec![sig, who], 1)));
        assert!(!query.matches(&placed_log(contract, vec![sig, sig], 1)));
        assert!(!query.matches(&placed_log(contract, vec![sig], 1)));
        assert!(!query.matches(&placed_log(Address::ZERO, vec![sig, who], 1)));
    }

    #[test]
    fn test_filter_query_wildcards_and_range() {
        let sig = H256::from_bytes([0xaa; 32]);
        let query = FilterQuery::new().topic(1, vec![sig]).from_block(2).to_block(4);
        assert_eq!(query.topics, vec![None, Some(vec![sig])]);
        assert!(query.matches(&placed_log(Address::ZERO, vec![H256::ZERO, sig], 3)));
        assert!(!query.matches(&placed_log(Address::ZERO, vec![H256::ZERO, sig], 5)));
        assert!(!query.matches(&placed_log(Address::ZERO, vec![H256::ZERO, sig], 1)));
        assert!(FilterQuery::new().matches(&placed_log(Address::ZERO, vec![], 0)));
    }

    #[test]
    fn test_filter_query_serialize() {
        let query = FilterQuery::new().from_block(1).topic(1, vec![H256::ZERO]);
        let json = serde_json::to_value(&query).unwrap();
        assert_eq!(json["fromBlock"], json!("0x1"));
        assert_eq!(json["topics"][0], serde_json::Value::Null);
        assert_eq!(json["topics"][1][0], json!(H256::ZERO.to_hex()));
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_quantity("0x100").unwrap(), 256);
        assert_eq!(parse_quantity("100").unwrap(), 256);
        assert!(parse_quantity("0xzz").is_err());
        assert!(parse_data("0x").unwrap().is_empty());
        assert_eq!(parse_data("0x1234").unwrap().as_ref(), &[0x12, 0x34]);
    }

    #[test]
    fn test_receipt_from_json() {
        let value = json!({
            "transactionHash": H256::from_bytes([1; 32]),
            "transactionIndex": "0x0",
            "blockHash": H256::from_bytes([2; 32]),
            "blockNumber": "0x5",
            "from": Address::from_bytes([3; 20]),
            "to": null,
            "contractAddress": Address::from_bytes([4; 20]),
            "gasUsed": "0x5208",
            "cumulativeGasUsed": "0x5208",
            "effectiveGasPrice": "0x3b9aca00",
            "status": "0x1",
            "logs": [{
                "address": Address::from_bytes([4; 20]),
                "topics": [H256::from_bytes([5; 32])],
                "data": "0x01",
                "blockNumber": "0x5",
                "logIndex": "0x0"
            }]
        });
        let receipt: Receipt = serde_json::from_value::<RpcReceipt>(value).unwrap().into();
        assert!(receipt.is_success());
        assert_eq!(receipt.block_number, 5);
        assert_eq!(receipt.gas_used, 21000);
        assert_eq!(receipt.contract_address, Some(Address::from_bytes([4; 20])));
        assert_eq!(receipt.effective_gas_price, U256::from(1_000_000_000u64));
        assert_eq!(receipt.logs[0].data.as_ref(), &[0x01]);
        assert_eq!(receipt.logs[0].block_number, 5);
    }
}
