//! secp256k1 ECDSA over 32-byte prehashes

use ethflow_primitives::{Address, H256};
use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{RecoveryId, Signature as K256Signature, SigningKey, VerifyingKey};

use crate::{keccak256, CryptoError};

/// n/2 for the secp256k1 group order
const SECP256K1_HALF_ORDER: [u8; 32] = [
    0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0x5D, 0x57, 0x6E, 0x73, 0x57, 0xA4, 0x50, 0x1D, 0xDF, 0xE9, 0x2F, 0x46, 0x68, 0x1B, 0x20, 0xA0,
];

/// Verifying key
pub type PublicKey = VerifyingKey;

/// Signing key
pub type PrivateKey = SigningKey;

/// Recoverable signature
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signature {
    /// r scalar
    pub r: H256,
    /// s scalar, always in the lower half of the order when produced by [`sign`]
    pub s: H256,
    /// 27 or 28
    pub v: u8,
}

impl Signature {
    /// Build from parts; `v` may be given as a parity bit (0/1) or as 27/28
    pub fn new(r: H256, s: H256, v: u8) -> Self {
        let v = if v < 27 { v + 27 } else { v };
        Signature { r, s, v }
    }

    /// Parity bit used by typed transaction envelopes
    pub fn y_parity(&self) -> u8 {
        self.v.saturating_sub(27)
    }

    /// 65-byte `r || s || v` form
    pub fn to_bytes(&self) -> [u8; 65] {
        let mut bytes = [0u8; 65];
        bytes[..32].copy_from_slice(self.r.as_bytes());
        bytes[32..64].copy_from_slice(self.s.as_bytes());
        bytes[64] = self.v;
        bytes
    }

    /// Whether `s <= n/2` (EIP-2)
    pub fn is_low_s(&self) -> bool {
        self.s.as_bytes() <= &SECP256K1_HALF_ORDER
    }

    fn to_k256(&self) -> Result<(K256Signature, RecoveryId), CryptoError> {
        let r: k256::FieldBytes = (*self.r.as_bytes()).into();
        let s: k256::FieldBytes = (*self.s.as_bytes()).into();
        let sig = K256Signature::from_scalars(r, s)
            .map_err(|e| CryptoError::MalformedSignature(e.to_string()))?;
        let parity = self.y_parity();
        let recid = RecoveryId::from_byte(parity).ok_or(CryptoError::RecoveryId(self.v))?;
        Ok((sig, recid))
    }
}

/// Sign a prehash, normalizing to low-s
pub fn sign(hash: &H256, key: &PrivateKey) -> Result<Signature, CryptoError> {
    let (mut sig, mut recid) = key
        .sign_prehash_recoverable(hash.as_bytes())
        .map_err(|e| CryptoError::Signing(e.to_string()))?;

    if let Some(normalized) = sig.normalize_s() {
        sig = normalized;
        recid = RecoveryId::from_byte(recid.to_byte() ^ 1)
            .ok_or_else(|| CryptoError::Signing("recovery id out of range".to_string()))?;
    }

    let (r, s) = sig.split_bytes();
    Ok(Signature {
        r: H256::from_bytes(r.into()),
        s: H256::from_bytes(s.into()),
        v: recid.to_byte() + 27,
    })
}

/// Verify against a known key; high-s signatures are rejected
pub fn verify(hash: &H256, signature: &Signature, key: &PublicKey) -> Result<bool, CryptoError> {
    if !signature.is_low_s() {
        return Ok(false);
    }
    let (sig, _) = signature.to_k256()?;
    Ok(key.verify_prehash(hash.as_bytes(), &sig).is_ok())
}

/// Recover the signer's public key
pub fn recover_public_key(hash: &H256, signature: &Signature) -> Result<PublicKey, CryptoError> {
    let (sig, recid) = signature.to_k256()?;
    VerifyingKey::recover_from_prehash(hash.as_bytes(), &sig, recid)
        .map_err(|e| CryptoError::Unrecoverable(e.to_string()))
}

/// Recover the signer's address
pub fn recover_address(hash: &H256, signature: &Signature) -> Result<Address, CryptoError> {
    recover_public_key(hash, signature).map(|key| public_key_to_address(&key))
}

/// Address of a public key: last 20 bytes of keccak(x || y)
pub fn public_key_to_address(key: &PublicKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&hash.as_bytes()[12..]);
    Address::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn test_key() -> SigningKey {
        let bytes =
            hex::decode("ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80").unwrap();
        SigningKey::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_known_address() {
        let key = test_key();
        assert_eq!(
            public_key_to_address(key.verifying_key()).to_hex(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn test_sign_verify_recover() {
        let key = SigningKey::random(&mut OsRng);
        let hash = keccak256(b"payload");
        let sig = sign(&hash, &key).unwrap();

        assert!(sig.is_low_s());
        assert!(sig.v == 27 || sig.v == 28);
        assert!(verify(&hash, &sig, key.verifying_key()).unwrap());
        assert_eq!(
            recover_address(&hash, &sig).unwrap(),
            public_key_to_address(key.verifying_key())
        );
    }

    #[test]
    fn test_low_s_always() {
        let hash = keccak256(b"low-s");
        for _ in 0..16 {
            let key = SigningKey::random(&mut OsRng);
            assert!(sign(&hash, &key).unwrap().is_low_s());
        }
    }

    #[test]
    fn test_high_s_rejected() {
        let key = test_key();
        let hash = keccak256(b"x");
        let mut sig = sign(&hash, &key).unwrap();
        sig.s = H256::from_bytes([0xff; 32]);
        assert!(!verify(&hash, &sig, key.verifying_key()).unwrap());
    }

    #[test]
    fn test_different_hash_recovers_different_address() {
        let key = test_key();
        let sig = sign(&keccak256(b"one"), &key).unwrap();
        let other = recover_address(&keccak256(b"two"), &sig);
        let signer = public_key_to_address(key.verifying_key());
        assert!(other.map(|a| a != signer).unwrap_or(true));
    }

    #[test]
    fn test_parity_forms() {
        let sig = Signature::new(H256::ZERO, H256::ZERO, 1);
        assert_eq!(sig.v, 28);
        assert_eq!(sig.y_parity(), 1);
        assert_eq!(Signature::new(H256::ZERO, H256::ZERO, 27).y_parity(), 0);
    }
}
