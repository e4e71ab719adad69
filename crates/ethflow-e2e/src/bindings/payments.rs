use std::sync::Arc;

use bytes::Bytes;
use ethflow_primitives::{Address, U256};
use ethflow_sdk::abi::{encode_function_call, function_selector, ParamType, Token};
use ethflow_sdk::{BoundContract, CallOpts, ChainClient, SdkError, TransactOpts};
use ethflow_types::SignedTransaction;

use super::deploy_artifact;
use crate::contracts::{self, CURRENT_BALANCE, GET_PAYMENT, PAY};
use crate::E2EResult;

/// One recorded payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    /// Message passed to `pay`
    pub message: String,
    /// Payer
    pub from: Address,
    /// Wei attached
    pub amount: U256,
    /// Timestamp of the including block
    pub timestamp: U256,
}

impl Payment {
    fn param_type() -> ParamType {
        ParamType::Tuple(vec![
            ParamType::String,
            ParamType::Address,
            ParamType::Uint(256),
            ParamType::Uint(256),
        ])
    }

    fn from_token(token: Token) -> Result<Self, SdkError> {
        let malformed = || SdkError::AbiDecode("malformed Payment tuple".to_string());
        let mut fields = token.into_tuple().ok_or_else(malformed)?.into_iter();
        let mut next = || fields.next().ok_or_else(malformed);
        Ok(Self {
            message: next()?.into_string().ok_or_else(malformed)?,
            from: next()?.into_address().ok_or_else(malformed)?,
            amount: next()?.into_uint().ok_or_else(malformed)?,
            timestamp: next()?.into_uint().ok_or_else(malformed)?,
        })
    }
}

/// Binding for the Payments contract
#[derive(Debug, Clone)]
pub struct Payments {
    contract: BoundContract,
}

impl Payments {
    /// Deploy; the binding is usable once the deployment is mined
    pub async fn deploy(
        opts: &TransactOpts,
        client: Arc<dyn ChainClient>,
    ) -> E2EResult<(Address, SignedTransaction, Self)> {
        let (address, tx) = deploy_artifact(opts, client.as_ref(), contracts::payments_bytecode()).await?;
        Ok((address, tx, Self::at(address, client)))
    }

    /// Bind to a deployed instance
    pub fn at(address: Address, client: Arc<dyn ChainClient>) -> Self {
        Self { contract: BoundContract::new(address, client) }
    }

    /// Contract address
    pub fn address(&self) -> Address {
        self.contract.address()
    }

    /// `pay(message)`; the amount is `opts.value`
    pub async fn pay(&self, opts: &TransactOpts, message: &str) -> Result<SignedTransaction, SdkError> {
        let calldata = encode_function_call(function_selector(PAY), &[Token::string(message)]);
        self.contract.transact(opts, Bytes::from(calldata)).await
    }

    /// `currentBalance()`
    pub async fn current_balance(&self, opts: &CallOpts) -> Result<U256, SdkError> {
        let out = self
            .contract
            .call(opts, function_selector(CURRENT_BALANCE), &[], &[ParamType::Uint(256)])
            .await?;
        out.into_iter()
            .next()
            .and_then(Token::into_uint)
            .ok_or_else(|| SdkError::AbiDecode("currentBalance output".to_string()))
    }

    /// `getPayment(from, index)`; reverts past the last payment
    pub async fn get_payment(
        &self,
        opts: &CallOpts,
        from: Address,
        index: u64,
    ) -> Result<Payment, SdkError> {
        let args = [Token::Address(from), Token::Uint(U256::from(index))];
        let out = self
            .contract
            .call(opts, function_selector(GET_PAYMENT), &args, &[Payment::param_type()])
            .await?;
        let token = out
            .into_iter()
            .next()
            .ok_or_else(|| SdkError::AbiDecode("getPayment output".to_string()))?;
        Payment::from_token(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethflow_sdk::abi::encode;

    #[test]
    fn test_payment_from_token() {
        let token = Token::Tuple(vec![
            Token::string("hi"),
            Token::Address(Address::from_bytes([7; 20])),
            Token::Uint(U256::from(5u64)),
            Token::Uint(U256::from(1_700_000_000u64)),
        ]);
        let payment = Payment::from_token(token).unwrap();
        assert_eq!(payment.message, "hi");
        assert_eq!(payment.amount, U256::from(5u64));
    }

    #[test]
    fn test_payment_decodes_contract_layout() {
        // head offset, string offset, from, amount, timestamp, len, data
        let mut out = Vec::new();
        for word in [0x20u64, 0x80, 0, 9, 42, 2] {
            let mut bytes = [0u8; 32];
            U256::from(word).to_big_endian(&mut bytes);
            out.extend_from_slice(&bytes);
        }
        let mut data = [0u8; 32];
        data[..2].copy_from_slice(b"ok");
        out.extend_from_slice(&data);

        let tokens = ethflow_sdk::abi::decode(&[Payment::param_type()], &out).unwrap();
        let payment = Payment::from_token(tokens.into_iter().next().unwrap()).unwrap();
        assert_eq!(payment.message, "ok");
        assert_eq!(payment.amount, U256::from(9u64));
        assert_eq!(payment.timestamp, U256::from(42u64));

        let token = Token::Tuple(vec![
            Token::string("ok"),
            Token::Address(Address::ZERO),
            Token::Uint(U256::from(9u64)),
            Token::Uint(U256::from(42u64)),
        ]);
        assert_eq!(encode(&[token]), out);
    }
}
