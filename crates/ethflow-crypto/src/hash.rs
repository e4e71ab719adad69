//! Keccak-256 hashing

use ethflow_primitives::{Address, H256};
use sha3::{Digest, Keccak256};

/// Compute the Keccak-256 hash of `data`
pub fn keccak256(data: &[u8]) -> H256 {
    let digest: [u8; 32] = Keccak256::digest(data).into();
    H256::from_bytes(digest)
}

/// Format an address with EIP-55 mixed-case checksum
pub fn to_checksum_address(address: &Address) -> String {
    let lower = hex::encode(address.as_bytes());
    let hash = keccak256(lower.as_bytes());

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let byte = hash.as_bytes()[i / 2];
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}
