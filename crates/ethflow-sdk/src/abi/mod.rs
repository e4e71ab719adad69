//! Solidity ABI encoding and decoding
//!
//! ```rust
//! use ethflow_sdk::abi::{decode, encode_function_call, function_selector, ParamType, Token};
//! use ethflow_primitives::{Address, U256};
//!
//! let selector = function_selector("transfer(address,uint256)");
//! let data = encode_function_call(selector, &[Token::Address(Address::ZERO), Token::Uint(U256::from(1000))]);
//! assert_eq!(data.len(), 4 + 64);
//!
//! let balance = decode(&[ParamType::Uint(256)], &[0u8; 32]).unwrap();
//! assert_eq!(balance, vec![Token::Uint(U256::zero())]);
//! ```

mod decode;
mod encode;
mod types;

pub use decode::decode;
pub use encode::{encode, encode_function_call, event_topic, function_selector, parse_type};
pub use types::{ParamType, Token, I256};
