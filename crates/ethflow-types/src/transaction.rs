//! EIP-1559 transactions

use bytes::Bytes;
use ethflow_crypto::{keccak256, recover_address, Signature};
use ethflow_primitives::{Address, H256, U256};
use rlp::{Rlp, RlpStream};

use crate::error::TxError;

/// Base cost of any transaction
pub const TX_BASE_GAS: u64 = 21_000;
/// Extra cost of a contract creation
pub const TX_CREATE_GAS: u64 = 32_000;
/// Cost per zero calldata byte
pub const TX_DATA_ZERO_GAS: u64 = 4;
/// Cost per non-zero calldata byte
pub const TX_DATA_NONZERO_GAS: u64 = 16;

/// EIP-2718 transaction type
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TxType {
    /// EIP-1559 dynamic fee transaction
    DynamicFee = 2,
}

impl TxType {
    /// Parse the leading type byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            2 => Some(TxType::DynamicFee),
            _ => None,
        }
    }
}

/// Access list entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessListItem {
    /// Account address
    pub address: Address,
    /// Pre-declared storage keys
    pub storage_keys: Vec<H256>,
}

/// Unsigned EIP-1559 transaction
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DynamicFeeTx {
    /// Chain the signature is bound to
    pub chain_id: u64,
    /// Sender sequence number
    pub nonce: u64,
    /// Tip cap
    pub max_priority_fee_per_gas: U256,
    /// Fee cap
    pub max_fee_per_gas: U256,
    /// Gas limit
    pub gas_limit: u64,
    /// Recipient; `None` deploys `data` as init code
    pub to: Option<Address>,
    /// Value in wei
    pub value: U256,
    /// Calldata or init code
    pub data: Bytes,
    /// Access list
    pub access_list: Vec<AccessListItem>,
}

impl DynamicFeeTx {
    fn append_fields(&self, s: &mut RlpStream) {
        s.append(&self.chain_id);
        s.append(&self.nonce);
        s.append(&self.max_priority_fee_per_gas);
        s.append(&self.max_fee_per_gas);
        s.append(&self.gas_limit);
        match &self.to {
            Some(to) => s.append(to),
            None => s.append_empty_data(),
        };
        s.append(&self.value);
        s.append(&self.data.to_vec());
        s.begin_list(self.access_list.len());
        for item in &self.access_list {
            s.begin_list(2);
            s.append(&item.address);
            s.append_list::<H256, H256>(&item.storage_keys);
        }
    }

    fn decode_fields(rlp: &Rlp) -> Result<Self, rlp::DecoderError> {
        let to_item = rlp.at(5)?;
        let to = if to_item.is_empty() { None } else { Some(to_item.as_val()?) };
        let mut access_list = Vec::new();
        for item in rlp.at(8)?.iter() {
            access_list.push(AccessListItem {
                address: item.val_at(0)?,
                storage_keys: item.list_at(1)?,
            });
        }
        Ok(DynamicFeeTx {
            chain_id: rlp.val_at(0)?,
            nonce: rlp.val_at(1)?,
            max_priority_fee_per_gas: rlp.val_at(2)?,
            max_fee_per_gas: rlp.val_at(3)?,
            gas_limit: rlp.val_at(4)?,
            to,
            value: rlp.val_at(6)?,
            data: Bytes::from(rlp.val_at::<Vec<u8>>(7)?),
            access_list,
        })
    }

    /// Hash the signer commits to: `keccak(0x02 || rlp(fields))`
    pub fn signing_hash(&self) -> H256 {
        let mut s = RlpStream::new_list(9);
        self.append_fields(&mut s);
        let mut buf = vec![TxType::DynamicFee as u8];
        buf.extend_from_slice(&s.out());
        keccak256(&buf)
    }
}

/// Signed, immutable EIP-1559 transaction
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTransaction {
    tx: DynamicFeeTx,
    signature: Signature,
    hash: H256,
}

impl SignedTransaction {
    /// Attach a signature and compute the envelope hash
    pub fn new(tx: DynamicFeeTx, signature: Signature) -> Self {
        let hash = keccak256(&encode_envelope(&tx, &signature));
        Self { tx, signature, hash }
    }

    /// Raw `0x02 || rlp(...)` envelope, as broadcast
    pub fn encode_raw(&self) -> Vec<u8> {
        encode_envelope(&self.tx, &self.signature)
    }

    /// Parse a raw envelope
    pub fn decode_raw(raw: &[u8]) -> Result<Self, TxError> {
        let (&type_byte, body) = raw.split_first().ok_or(TxError::Empty)?;
        if TxType::from_byte(type_byte).is_none() {
            return Err(TxError::UnsupportedType(type_byte));
        }
        let rlp = Rlp::new(body);
        let info = rlp.payload_info()?;
        if info.header_len + info.value_len != body.len() {
            return Err(TxError::TrailingBytes);
        }
        if rlp.item_count()? != 12 {
            return Err(TxError::Rlp("expected 12 fields".to_string()));
        }
        let tx = DynamicFeeTx::decode_fields(&rlp)?;
        let parity: u8 = rlp.val_at(9)?;
        if parity > 1 {
            return Err(TxError::Rlp(format!("invalid y parity {}", parity)));
        }
        let r: U256 = rlp.val_at(10)?;
        let s: U256 = rlp.val_at(11)?;
        let signature = Signature::new(H256::from_u256(r), H256::from_u256(s), parity);
        Ok(Self::new(tx, signature))
    }

    /// Envelope hash
    pub fn hash(&self) -> H256 {
        self.hash
    }

    /// Unsigned body
    pub fn tx(&self) -> &DynamicFeeTx {
        &self.tx
    }

    /// Signature
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Address that produced the signature over the current body.
    ///
    /// A body altered after signing recovers to some other address.
    pub fn recover_sender(&self) -> Result<Address, TxError> {
        if !self.signature.is_low_s() {
            return Err(TxError::Signature(ethflow_crypto::CryptoError::HighS));
        }
        Ok(recover_address(&self.tx.signing_hash(), &self.signature)?)
    }

    /// Chain id
    pub fn chain_id(&self) -> u64 {
        self.tx.chain_id
    }

    /// Nonce
    pub fn nonce(&self) -> u64 {
        self.tx.nonce
    }

    /// Gas limit
    pub fn gas_limit(&self) -> u64 {
        self.tx.gas_limit
    }

    /// Tip cap
    pub fn max_priority_fee_per_gas(&self) -> U256 {
        self.tx.max_priority_fee_per_gas
    }

    /// Fee cap
    pub fn max_fee_per_gas(&self) -> U256 {
        self.tx.max_fee_per_gas
    }

    /// Recipient
    pub fn to(&self) -> Option<Address> {
        self.tx.to
    }

    /// Value in wei
    pub fn value(&self) -> U256 {
        self.tx.value
    }

    /// Calldata or init code
    pub fn data(&self) -> &Bytes {
        &self.tx.data
    }

    /// Whether this deploys a contract
    pub fn is_contract_creation(&self) -> bool {
        self.tx.to.is_none()
    }

    /// Upper bound on what the sender pays: `value + gas_limit * fee_cap`
    pub fn max_cost(&self) -> U256 {
        self.tx.value
            .saturating_add(U256::from(self.tx.gas_limit).saturating_mul(self.tx.max_fee_per_gas))
    }

    /// Price per gas actually paid under `base_fee`.
    ///
    /// `None` when the fee cap is below the base fee; such a transaction
    /// cannot be included.
    pub fn effective_gas_price(&self, base_fee: U256) -> Option<U256> {
        let fee_cap = self.tx.max_fee_per_gas;
        if base_fee > fee_cap {
            return None;
        }
        let tip = self.tx.max_priority_fee_per_gas.min(fee_cap - base_fee);
        Some(base_fee + tip)
    }

    /// Tip per gas paid to the block producer under `base_fee`
    pub fn effective_tip(&self, base_fee: U256) -> Option<U256> {
        self.effective_gas_price(base_fee).map(|price| price - base_fee)
    }
}

fn encode_envelope(tx: &DynamicFeeTx, signature: &Signature) -> Vec<u8> {
    let mut s = RlpStream::new_list(12);
    tx.append_fields(&mut s);
    s.append(&signature.y_parity());
    s.append(&signature.r.to_u256());
    s.append(&signature.s.to_u256());
    let mut buf = vec![TxType::DynamicFee as u8];
    buf.extend_from_slice(&s.out());
    buf
}

/// Address of a contract created by `sender` at `nonce`
pub fn contract_address(sender: &Address, nonce: u64) -> Address {
    let mut s = RlpStream::new_list(2);
    s.append(sender);
    s.append(&nonce);
    let hash = keccak256(&s.out());
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&hash.as_bytes()[12..]);
    Address::from_bytes(bytes)
}

/// Gas charged before any execution
pub fn intrinsic_gas(data: &[u8], is_create: bool) -> u64 {
    let data_gas: u64 = data
        .iter()
        .map(|&b| if b == 0 { TX_DATA_ZERO_GAS } else { TX_DATA_NONZERO_GAS })
        .sum();
    let create_gas = if is_create { TX_CREATE_GAS } else { 0 };
    TX_BASE_GAS + create_gas + data_gas
}
