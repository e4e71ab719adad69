//! Transaction builder

use bytes::Bytes;
use ethflow_primitives::{Address, U256};
use ethflow_types::{DynamicFeeTx, SignedTransaction};

use crate::{SdkError, Signer};

/// Fluent builder for EIP-1559 transactions
#[derive(Debug, Clone, Default)]
pub struct TxBuilder {
    chain_id: u64,
    nonce: Option<u64>,
    gas_limit: Option<u64>,
    max_fee_per_gas: Option<U256>,
    max_priority_fee_per_gas: Option<U256>,
    to: Option<Address>,
    value: U256,
    data: Bytes,
}

impl TxBuilder {
    /// Start a transaction bound to `chain_id`
    pub fn new(chain_id: u64) -> Self {
        Self { chain_id, ..Default::default() }
    }

    /// Set the nonce
    pub fn nonce(mut self, nonce: u64) -> Self {
        self.nonce = Some(nonce);
        self
    }

    /// Set the gas limit
    pub fn gas_limit(mut self, limit: u64) -> Self {
        self.gas_limit = Some(limit);
        self
    }

    /// Set the fee cap
    pub fn max_fee_per_gas(mut self, fee: impl Into<U256>) -> Self {
        self.max_fee_per_gas = Some(fee.into());
        self
    }

    /// Set the tip cap
    pub fn max_priority_fee_per_gas(mut self, fee: impl Into<U256>) -> Self {
        self.max_priority_fee_per_gas = Some(fee.into());
        self
    }

    /// Set the recipient; leave unset to deploy
    pub fn to(mut self, address: Address) -> Self {
        self.to = Some(address);
        self
    }

    /// Set the value in wei
    pub fn value(mut self, value: impl Into<U256>) -> Self {
        self.value = value.into();
        self
    }

    /// Set calldata or init code
    pub fn data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = data.into();
        self
    }

    /// Validate and produce the unsigned transaction
    ///
    /// # Errors
    ///
    /// - `InvalidChainId` if the chain id is 0
    /// - `MissingField` if nonce, gas limit or either fee is unset
    /// - `TipAboveFeeCap` if the tip exceeds the fee cap
    pub fn build(&self) -> Result<DynamicFeeTx, SdkError> {
        if self.chain_id == 0 {
            return Err(SdkError::InvalidChainId(
                "Chain ID cannot be 0 - replay protection requires a valid chain ID".to_string(),
            ));
        }
        let nonce = self.nonce.ok_or(SdkError::MissingField("nonce".to_string()))?;
        let gas_limit = self.gas_limit.ok_or(SdkError::MissingField("gas_limit".to_string()))?;
        let max_fee = self
            .max_fee_per_gas
            .ok_or(SdkError::MissingField("max_fee_per_gas".to_string()))?;
        let max_priority = self
            .max_priority_fee_per_gas
            .ok_or(SdkError::MissingField("max_priority_fee_per_gas".to_string()))?;
        if max_priority > max_fee {
            return Err(SdkError::TipAboveFeeCap);
        }

        Ok(DynamicFeeTx {
            chain_id: self.chain_id,
            nonce,
            max_priority_fee_per_gas: max_priority,
            max_fee_per_gas: max_fee,
            gas_limit,
            to: self.to,
            value: self.value,
            data: self.data.clone(),
            access_list: vec![],
        })
    }

    /// Build and sign
    pub fn sign(&self, signer: &dyn Signer) -> Result<SignedTransaction, SdkError> {
        let tx = self.build()?;
        signer.sign_transaction(tx)
    }
}
