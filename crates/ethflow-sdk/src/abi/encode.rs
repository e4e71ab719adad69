//! ABI encoding

use ethflow_crypto::keccak256;
use ethflow_primitives::{H256, U256};

use super::types::{ParamType, Token};
use crate::SdkError;

/// Encode tokens as a parameter list
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    encode_params(tokens)
}

/// Selector followed by encoded parameters
pub fn encode_function_call(selector: [u8; 4], tokens: &[Token]) -> Vec<u8> {
    let mut result = selector.to_vec();
    result.extend(encode(tokens));
    result
}

/// Head/tail encoding; dynamic offsets are relative to the start of this list
fn encode_params(tokens: &[Token]) -> Vec<u8> {
    let head_size: usize = tokens.iter().map(|t| head_length(&t.type_of())).sum();

    let mut head = Vec::with_capacity(head_size);
    let mut tail = Vec::new();

    for token in tokens {
        if token.type_of().is_dynamic() {
            head.extend(word(U256::from(head_size + tail.len())));
            tail.extend(encode_token(token));
        } else {
            head.extend(encode_token(token));
        }
    }

    head.extend(tail);
    head
}

fn head_length(param_type: &ParamType) -> usize {
    match param_type {
        ParamType::FixedArray(inner, size) if !inner.is_dynamic() => head_length(inner) * size,
        ParamType::Tuple(types) if !param_type.is_dynamic() => types.iter().map(head_length).sum(),
        _ => 32,
    }
}

fn encode_token(token: &Token) -> Vec<u8> {
    match token {
        Token::Address(addr) => addr.to_word().to_vec(),
        Token::Uint(value) => word(*value),
        Token::Int(value) => word(value.to_word()),
        Token::Bool(b) => word(U256::from(*b as u8)),
        Token::FixedBytes(data) => {
            let mut buf = [0u8; 32];
            let len = data.len().min(32);
            buf[..len].copy_from_slice(&data[..len]);
            buf.to_vec()
        }
        Token::Bytes(data) => encode_bytes(data),
        Token::String(s) => encode_bytes(s.as_bytes()),
        Token::Array(tokens) => {
            let mut result = word(U256::from(tokens.len()));
            result.extend(encode_params(tokens));
            result
        }
        Token::FixedArray(tokens) | Token::Tuple(tokens) => encode_params(tokens),
    }
}

fn word(value: U256) -> Vec<u8> {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    bytes.to_vec()
}

fn encode_bytes(data: &[u8]) -> Vec<u8> {
    let mut result = word(U256::from(data.len()));
    let mut padded = vec![0u8; data.len().div_ceil(32) * 32];
    padded[..data.len()].copy_from_slice(data);
    result.extend(padded);
    result
}

/// First 4 bytes of keccak256 of the signature
pub fn function_selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    let mut selector = [0u8; 4];
    selector.copy_from_slice(&hash.as_bytes()[..4]);
    selector
}

/// topic0 of an event: keccak256 of the signature
pub fn event_topic(signature: &str) -> H256 {
    keccak256(signature.as_bytes())
}

/// Parse a type string such as `uint256`, `string[]` or `(address,uint256)`
pub fn parse_type(s: &str) -> Result<ParamType, SdkError> {
    let s = s.trim();

    if let Some(inner) = s.strip_suffix(']') {
        let open = inner
            .rfind('[')
            .ok_or_else(|| SdkError::AbiEncode(format!("Unknown type: {s}")))?;
        let element = parse_type(&inner[..open])?;
        let size = &inner[open + 1..];
        if size.is_empty() {
            return Ok(ParamType::Array(Box::new(element)));
        }
        let size = size
            .parse()
            .map_err(|_| SdkError::AbiEncode(format!("Invalid array size: {size}")))?;
        return Ok(ParamType::FixedArray(Box::new(element), size));
    }

    if let Some(body) = s.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        return split_top_level(body)
            .into_iter()
            .filter(|part| !part.trim().is_empty())
            .map(parse_type)
            .collect::<Result<Vec<_>, _>>()
            .map(ParamType::Tuple);
    }

    match s {
        "address" => return Ok(ParamType::Address),
        "bool" => return Ok(ParamType::Bool),
        "string" => return Ok(ParamType::String),
        "bytes" => return Ok(ParamType::Bytes),
        _ => {}
    }

    if let Some(rest) = s.strip_prefix("uint") {
        return Ok(ParamType::Uint(parse_bits(rest, "uint")?));
    }
    if let Some(rest) = s.strip_prefix("int") {
        return Ok(ParamType::Int(parse_bits(rest, "int")?));
    }
    if let Some(rest) = s.strip_prefix("bytes") {
        let size: usize = rest
            .parse()
            .map_err(|_| SdkError::AbiEncode(format!("Invalid bytes size: {rest}")))?;
        if size == 0 || size > 32 {
            return Err(SdkError::AbiEncode(format!("Invalid bytes size: {size}")));
        }
        return Ok(ParamType::FixedBytes(size));
    }

    Err(SdkError::AbiEncode(format!("Unknown type: {s}")))
}

fn parse_bits(rest: &str, kind: &str) -> Result<usize, SdkError> {
    if rest.is_empty() {
        return Ok(256);
    }
    let bits: usize = rest
        .parse()
        .map_err(|_| SdkError::AbiEncode(format!("Invalid {kind} size: {rest}")))?;
    if bits == 0 || bits > 256 || bits % 8 != 0 {
        return Err(SdkError::AbiEncode(format!("Invalid {kind} size: {bits}")));
    }
    Ok(bits)
}

/// Split on commas that are not inside parentheses
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethflow_primitives::Address;

    #[test]
    fn test_encode_address() {
        let addr = Address::from_hex("0x742d35Cc6634C0532925a3b844Bc9e7595f0aB3d").unwrap();
        let encoded = encode(&[Token::Address(addr)]);
        assert_eq!(encoded.len(), 32);
        assert_eq!(&encoded[12..32], addr.as_bytes());
    }

    #[test]
    fn test_encode_string() {
        let encoded = encode(&[Token::string("hello!")]);
        // offset, length, one padded word
        assert_eq!(encoded.len(), 96);
        assert_eq!(encoded[31], 0x20);
        assert_eq!(encoded[63], 6);
        assert_eq!(&encoded[64..70], b"hello!");
    }

    #[test]
    fn test_encode_dynamic_tuple() {
        // ("hi", 0x11.., 5): outer offset, then tuple head (offset, addr, uint), then string
        let addr = Address::from_bytes([0x11; 20]);
        let encoded = encode(&[Token::Tuple(vec![
            Token::string("hi"),
            Token::Address(addr),
            Token::Uint(U256::from(5)),
        ])]);
        assert_eq!(encoded.len(), 32 + 96 + 64);
        assert_eq!(U256::from_big_endian(&encoded[..32]), U256::from(32));
        assert_eq!(U256::from_big_endian(&encoded[32..64]), U256::from(96));
        assert_eq!(&encoded[76..96], addr.as_bytes());
        assert_eq!(encoded[127], 5);
        assert_eq!(encoded[159], 2);
    }

    #[test]
    fn test_encode_negative_int() {
        let encoded = encode(&[Token::Int(crate::abi::I256::from_i128(-1))]);
        assert_eq!(encoded, vec![0xff; 32]);
    }

    #[test]
    fn test_function_selector() {
        assert_eq!(function_selector("transfer(address,uint256)"), [0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(function_selector("balanceOf(address)"), [0x70, 0xa0, 0x82, 0x31]);
    }

    #[test]
    fn test_event_topic() {
        assert_eq!(
            event_topic("Transfer(address,address,uint256)").to_hex(),
            "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn test_parse_type() {
        assert_eq!(parse_type("address").unwrap(), ParamType::Address);
        assert_eq!(parse_type("uint").unwrap(), ParamType::Uint(256));
        assert_eq!(parse_type("uint8").unwrap(), ParamType::Uint(8));
        assert_eq!(parse_type("bytes32").unwrap(), ParamType::FixedBytes(32));
        assert_eq!(
            parse_type("string[]").unwrap(),
            ParamType::Array(Box::new(ParamType::String))
        );
        assert_eq!(
            parse_type("uint256[3]").unwrap(),
            ParamType::FixedArray(Box::new(ParamType::Uint(256)), 3)
        );
        assert_eq!(
            parse_type("(string,(address,bool))").unwrap(),
            ParamType::Tuple(vec![
                ParamType::String,
                ParamType::Tuple(vec![ParamType::Address, ParamType::Bool]),
            ])
        );
        assert!(parse_type("uint7").is_err());
        assert!(parse_type("bytes33").is_err());
        assert!(parse_type("foo").is_err());
    }
}
