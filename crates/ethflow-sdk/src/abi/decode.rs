//! ABI decoding

use ethflow_primitives::{Address, U256};

use super::types::{ParamType, Token, I256};
use crate::SdkError;

/// Decode a parameter list
pub fn decode(types: &[ParamType], data: &[u8]) -> Result<Vec<Token>, SdkError> {
    decode_params(types, data)
}

/// `data` starts at the list's head; dynamic offsets are relative to it
fn decode_params(types: &[ParamType], data: &[u8]) -> Result<Vec<Token>, SdkError> {
    let mut tokens = Vec::with_capacity(types.len());
    let mut cursor = 0;
    for param_type in types {
        let (token, consumed) = decode_token(param_type, data, cursor)?;
        tokens.push(token);
        cursor += consumed;
    }
    Ok(tokens)
}

/// Returns the token and the number of head bytes it occupied
fn decode_token(
    param_type: &ParamType,
    data: &[u8],
    offset: usize,
) -> Result<(Token, usize), SdkError> {
    if param_type.is_dynamic() {
        let tail = read_offset(data, offset)?;
        let token = decode_dynamic(param_type, &data[tail..])?;
        return Ok((token, 32));
    }

    match param_type {
        ParamType::Address => {
            let word = read_word(data, offset)?;
            Ok((Token::Address(Address::from_word(&word)), 32))
        }
        ParamType::Uint(_) => {
            let word = read_word(data, offset)?;
            Ok((Token::Uint(U256::from_big_endian(&word)), 32))
        }
        ParamType::Int(_) => {
            let word = read_word(data, offset)?;
            Ok((Token::Int(I256::from_word(U256::from_big_endian(&word))), 32))
        }
        ParamType::Bool => {
            let word = read_word(data, offset)?;
            match U256::from_big_endian(&word) {
                v if v.is_zero() => Ok((Token::Bool(false), 32)),
                v if v == U256::one() => Ok((Token::Bool(true), 32)),
                _ => Err(SdkError::AbiDecode("invalid bool".to_string())),
            }
        }
        ParamType::FixedBytes(size) => {
            let word = read_word(data, offset)?;
            Ok((Token::FixedBytes(word[..(*size).min(32)].to_vec()), 32))
        }
        ParamType::FixedArray(inner, size) => {
            let types = vec![(**inner).clone(); *size];
            let tokens = decode_params(&types, &data[offset.min(data.len())..])?;
            Ok((Token::FixedArray(tokens), head_size(&types)))
        }
        ParamType::Tuple(types) => {
            let tokens = decode_params(types, &data[offset.min(data.len())..])?;
            Ok((Token::Tuple(tokens), head_size(types)))
        }
        // dynamic kinds handled above
        ParamType::Bytes | ParamType::String | ParamType::Array(_) => {
            Err(SdkError::AbiDecode("unexpected dynamic type".to_string()))
        }
    }
}

/// `data` starts at the dynamic value
fn decode_dynamic(param_type: &ParamType, data: &[u8]) -> Result<Token, SdkError> {
    match param_type {
        ParamType::Bytes => Ok(Token::Bytes(read_bytes(data)?)),
        ParamType::String => {
            let s = String::from_utf8(read_bytes(data)?)
                .map_err(|e| SdkError::AbiDecode(format!("Invalid UTF-8: {e}")))?;
            Ok(Token::String(s))
        }
        ParamType::Array(inner) => {
            let len = read_len(data, 0)?;
            let types = vec![(**inner).clone(); len];
            Ok(Token::Array(decode_params(&types, &data[32..])?))
        }
        ParamType::FixedArray(inner, size) => {
            let types = vec![(**inner).clone(); *size];
            Ok(Token::FixedArray(decode_params(&types, data)?))
        }
        ParamType::Tuple(types) => Ok(Token::Tuple(decode_params(types, data)?)),
        other => Err(SdkError::AbiDecode(format!("{} is not dynamic", other.signature()))),
    }
}

fn head_size(types: &[ParamType]) -> usize {
    types
        .iter()
        .map(|t| match t {
            _ if t.is_dynamic() => 32,
            ParamType::FixedArray(inner, size) => head_size(&vec![(**inner).clone(); *size]),
            ParamType::Tuple(inner) => head_size(inner),
            _ => 32,
        })
        .sum()
}

fn read_word(data: &[u8], offset: usize) -> Result<[u8; 32], SdkError> {
    check_length(data, offset.saturating_add(32))?;
    let mut word = [0u8; 32];
    word.copy_from_slice(&data[offset..offset + 32]);
    Ok(word)
}

fn read_len(data: &[u8], offset: usize) -> Result<usize, SdkError> {
    let value = U256::from_big_endian(&read_word(data, offset)?);
    if value > U256::from(data.len()) {
        return Err(SdkError::AbiDecode(format!("length {value} exceeds data")));
    }
    Ok(value.as_usize())
}

fn read_offset(data: &[u8], offset: usize) -> Result<usize, SdkError> {
    let tail = read_len(data, offset)?;
    check_length(data, tail)?;
    Ok(tail)
}

fn read_bytes(data: &[u8]) -> Result<Vec<u8>, SdkError> {
    let len = read_len(data, 0)?;
    check_length(data, 32 + len)?;
    Ok(data[32..32 + len].to_vec())
}

fn check_length(data: &[u8], required: usize) -> Result<(), SdkError> {
    if data.len() < required {
        return Err(SdkError::AbiDecode(format!(
            "Insufficient data: need {} bytes, have {}",
            required,
            data.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::encode;

    #[test]
    fn test_decode_address_and_uint() {
        let addr = Address::from_hex("0x742d35Cc6634C0532925a3b844Bc9e7595f0aB3d").unwrap();
        let mut encoded = [0u8; 64];
        encoded[12..32].copy_from_slice(addr.as_bytes());
        encoded[63] = 100;

        let tokens = decode(&[ParamType::Address, ParamType::Uint(256)], &encoded).unwrap();
        assert_eq!(tokens, vec![Token::Address(addr), Token::Uint(U256::from(100))]);
    }

    #[test]
    fn test_decode_string() {
        let mut encoded = vec![0u8; 96];
        encoded[31] = 32;
        encoded[63] = 5;
        encoded[64..69].copy_from_slice(b"hello");

        let tokens = decode(&[ParamType::String], &encoded).unwrap();
        assert_eq!(tokens[0], Token::String("hello".to_string()));
    }

    #[test]
    fn test_decode_payment_tuple() {
        let payment = Token::Tuple(vec![
            Token::string("hello!"),
            Token::Address(Address::from_bytes([0x22; 20])),
            Token::Uint(U256::from(900)),
            Token::Uint(U256::from(1_700_000_000u64)),
        ]);
        let encoded = encode(&[payment.clone()]);
        let ty = ParamType::Tuple(vec![
            ParamType::String,
            ParamType::Address,
            ParamType::Uint(256),
            ParamType::Uint(256),
        ]);
        assert_eq!(decode(&[ty], &encoded).unwrap(), vec![payment]);
    }

    #[test]
    fn test_decode_nested_dynamic_array() {
        let value = Token::Array(vec![Token::string("a"), Token::string("bc")]);
        let encoded = encode(&[Token::Uint(U256::from(1)), value.clone()]);
        let tokens = decode(
            &[ParamType::Uint(256), ParamType::Array(Box::new(ParamType::String))],
            &encoded,
        )
        .unwrap();
        assert_eq!(tokens[1], value);
    }

    #[test]
    fn test_decode_static_tuple_after_dynamic() {
        let types = [
            ParamType::String,
            ParamType::Tuple(vec![ParamType::Uint(256), ParamType::Bool]),
            ParamType::Address,
        ];
        let tokens = vec![
            Token::string("x"),
            Token::Tuple(vec![Token::Uint(U256::from(3)), Token::Bool(true)]),
            Token::Address(Address::from_bytes([9; 20])),
        ];
        assert_eq!(decode(&types, &encode(&tokens)).unwrap(), tokens);
    }

    #[test]
    fn test_decode_insufficient_data() {
        assert!(decode(&[ParamType::Uint(256)], &[0u8; 16]).is_err());
        // offset pointing past the end
        let mut bad = [0u8; 32];
        bad[31] = 0x40;
        assert!(decode(&[ParamType::String], &bad).is_err());
    }

    #[test]
    fn test_decode_int_negative() {
        let tokens = decode(&[ParamType::Int(256)], &[0xffu8; 32]).unwrap();
        assert_eq!(tokens[0], Token::Int(I256::from_i128(-1)));
    }

    #[test]
    fn test_decode_invalid_bool() {
        let mut encoded = [0u8; 32];
        encoded[31] = 2;
        assert!(decode(&[ParamType::Bool], &encoded).is_err());
    }
}
