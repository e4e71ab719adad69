//! Key ownership and signing

use ethflow_crypto::{keccak256, public_key_to_address, sign, PrivateKey, PublicKey, Signature};
use ethflow_primitives::{Address, H256};
use ethflow_types::{DynamicFeeTx, SignedTransaction};
use k256::ecdsa::SigningKey;
use rand::rngs::OsRng;
use zeroize::Zeroize;

use crate::SdkError;

/// Anything that can sign on behalf of an address
pub trait Signer: Send + Sync {
    /// Address the signatures recover to
    fn address(&self) -> Address;

    /// Sign a 32-byte prehash
    fn sign_hash(&self, hash: &H256) -> Result<Signature, SdkError>;

    /// Sign an EIP-1559 transaction
    fn sign_transaction(&self, tx: DynamicFeeTx) -> Result<SignedTransaction, SdkError> {
        let signature = self.sign_hash(&tx.signing_hash())?;
        Ok(SignedTransaction::new(tx, signature))
    }
}

/// Wallet holding a secp256k1 private key
///
/// Clone is intentionally not implemented to prevent accidental key duplication.
/// The signing key is wiped from memory on drop.
pub struct Wallet {
    private_key: PrivateKey,
    address: Address,
}

impl Wallet {
    /// Fresh random key
    pub fn new_random() -> Self {
        Self::from_signing_key(SigningKey::random(&mut OsRng))
    }

    fn from_signing_key(private_key: PrivateKey) -> Self {
        let address = public_key_to_address(private_key.verifying_key());
        Self { private_key, address }
    }

    /// From a 32-byte secret
    pub fn from_private_key(key: &[u8; 32]) -> Result<Self, SdkError> {
        let private_key = SigningKey::from_slice(key)
            .map_err(|e| SdkError::InvalidPrivateKey(e.to_string()))?;
        Ok(Self::from_signing_key(private_key))
    }

    /// From hex, with or without `0x`
    pub fn from_private_key_hex(hex: &str) -> Result<Self, SdkError> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let mut bytes = hex::decode(hex)?;
        if bytes.len() != 32 {
            let len = bytes.len();
            bytes.zeroize();
            return Err(SdkError::InvalidPrivateKey(format!("Expected 32 bytes, got {len}")));
        }

        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes);
        bytes.zeroize();

        let result = Self::from_private_key(&key);
        key.zeroize();
        result
    }

    /// Wallet address
    pub fn address(&self) -> Address {
        self.address
    }

    /// Public key
    pub fn public_key(&self) -> &PublicKey {
        self.private_key.verifying_key()
    }

    /// Raw secret, for the keystore only
    pub(crate) fn secret_bytes(&self) -> [u8; 32] {
        self.private_key.to_bytes().into()
    }

    /// Sign a 32-byte prehash
    pub fn sign_hash(&self, hash: &H256) -> Result<Signature, SdkError> {
        sign(hash, &self.private_key).map_err(|e| SdkError::SigningFailed(e.to_string()))
    }

    /// Sign with the `\x19Ethereum Signed Message:\n{len}` prefix
    pub fn sign_message(&self, message: &[u8]) -> Result<Signature, SdkError> {
        let mut data = format!("\x19Ethereum Signed Message:\n{}", message.len()).into_bytes();
        data.extend_from_slice(message);
        self.sign_hash(&keccak256(&data))
    }

    /// Sign an EIP-1559 transaction
    pub fn sign_transaction(&self, tx: DynamicFeeTx) -> Result<SignedTransaction, SdkError> {
        Signer::sign_transaction(self, tx)
    }
}

impl Signer for Wallet {
    fn address(&self) -> Address {
        self.address
    }

    fn sign_hash(&self, hash: &H256) -> Result<Signature, SdkError> {
        Wallet::sign_hash(self, hash)
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet").field("address", &self.address).finish_non_exhaustive()
    }
}
