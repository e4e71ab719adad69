//! Directory of Web3 Secret Storage (v3) key files
//!
//! Keys are encrypted with aes-128-ctr under a scrypt-derived key; the MAC is
//! `keccak256(derived[16..32] ++ ciphertext)`. Files are named
//! `UTC--<timestamp>--<address>`.

use std::fs;
use std::path::{Path, PathBuf};

use aes::cipher::{KeyIvInit, StreamCipher};
use ethflow_crypto::keccak256;
use ethflow_primitives::Address;
use ethflow_types::{DynamicFeeTx, SignedTransaction};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use zeroize::Zeroize;

use crate::{SdkError, Wallet};

type Aes128Ctr = ctr::Ctr64BE<aes::Aes128>;

const DKLEN: u32 = 32;

/// Keystore failures
#[derive(Debug, Error)]
pub enum KeystoreError {
    /// Filesystem error
    #[error("keystore io: {0}")]
    Io(#[from] std::io::Error),

    /// Key file is not valid v3 JSON
    #[error("malformed key file {path}: {reason}")]
    Malformed {
        /// Offending file
        path: PathBuf,
        /// Parse failure
        reason: String,
    },

    /// MAC mismatch
    #[error("Invalid password or corrupted keystore")]
    InvalidPassphrase,

    /// No key file for the address
    #[error("no key for address {0}")]
    AccountNotFound(Address),

    /// Importing a key that is already stored
    #[error("account already exists: {0}")]
    AlreadyExists(Address),

    /// Cipher or KDF other than aes-128-ctr / scrypt
    #[error("unsupported {0}")]
    Unsupported(String),

    /// Key derivation or key material failure
    #[error("keystore crypto: {0}")]
    Crypto(String),
}

/// scrypt cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScryptParams {
    /// log2(N)
    pub log_n: u8,
    /// Block size
    pub r: u32,
    /// Parallelism
    pub p: u32,
}

impl ScryptParams {
    /// N = 2^18, r = 8, p = 1
    pub const fn standard() -> Self {
        Self { log_n: 18, r: 8, p: 1 }
    }

    /// N = 2^12, r = 8, p = 6; for tests and dev chains
    pub const fn light() -> Self {
        Self { log_n: 12, r: 8, p: 6 }
    }

    fn to_scrypt(self) -> Result<scrypt::Params, KeystoreError> {
        scrypt::Params::new(self.log_n, self.r, self.p, DKLEN as usize)
            .map_err(|e| KeystoreError::Crypto(format!("Invalid scrypt params: {e}")))
    }
}

impl Default for ScryptParams {
    fn default() -> Self {
        Self::standard()
    }
}

/// Web3 keystore file (v3)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeystoreV3 {
    /// Always 3
    pub version: u32,
    /// Random UUID
    pub id: String,
    /// Address, lowercase hex without `0x`
    pub address: String,
    /// Encrypted key
    pub crypto: KeystoreCrypto,
}

/// Cipher section of a key file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeystoreCrypto {
    /// Cipher name
    pub cipher: String,
    /// Hex ciphertext
    pub ciphertext: String,
    /// Cipher parameters
    pub cipherparams: CipherParams,
    /// KDF name
    pub kdf: String,
    /// KDF parameters
    pub kdfparams: KdfParams,
    /// Hex MAC
    pub mac: String,
}

/// aes-128-ctr parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CipherParams {
    /// Hex IV
    pub iv: String,
}

/// scrypt parameters as stored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KdfParams {
    /// Derived key length
    pub dklen: u32,
    /// N
    pub n: u32,
    /// r
    pub r: u32,
    /// p
    pub p: u32,
    /// Hex salt
    pub salt: String,
}

/// Encrypt a secret key
pub fn encrypt_key(
    secret: &[u8; 32],
    passphrase: &str,
    address: &Address,
    params: ScryptParams,
) -> Result<KeystoreV3, KeystoreError> {
    let mut salt = [0u8; 32];
    let mut iv = [0u8; 16];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut iv);

    let mut derived = derive_key(passphrase, &salt, params)?;

    let mut ciphertext = secret.to_vec();
    let mut cipher = Aes128Ctr::new(derived[..16].into(), iv.as_slice().into());
    cipher.apply_keystream(&mut ciphertext);
    let mac = compute_mac(&derived, &ciphertext);
    derived.zeroize();

    Ok(KeystoreV3 {
        version: 3,
        id: Uuid::new_v4().to_string(),
        address: hex::encode(address.as_bytes()),
        crypto: KeystoreCrypto {
            cipher: "aes-128-ctr".to_string(),
            ciphertext: hex::encode(&ciphertext),
            cipherparams: CipherParams { iv: hex::encode(iv) },
            kdf: "scrypt".to_string(),
            kdfparams: KdfParams {
                dklen: DKLEN,
                n: 1u32 << params.log_n,
                r: params.r,
                p: params.p,
                salt: hex::encode(salt),
            },
            mac: hex::encode(mac),
        },
    })
}

/// Decrypt a key file, checking the MAC first
pub fn decrypt_key(keystore: &KeystoreV3, passphrase: &str) -> Result<[u8; 32], KeystoreError> {
    let crypto = &keystore.crypto;
    if crypto.cipher != "aes-128-ctr" {
        return Err(KeystoreError::Unsupported(format!("cipher {}", crypto.cipher)));
    }
    if crypto.kdf != "scrypt" {
        return Err(KeystoreError::Unsupported(format!("kdf {}", crypto.kdf)));
    }
    let n = crypto.kdfparams.n;
    if !n.is_power_of_two() || crypto.kdfparams.dklen != DKLEN {
        return Err(KeystoreError::Unsupported(format!("scrypt n={n} dklen={}", crypto.kdfparams.dklen)));
    }
    let params = ScryptParams { log_n: n.trailing_zeros() as u8, r: crypto.kdfparams.r, p: crypto.kdfparams.p };

    let salt = decode_field("salt", &crypto.kdfparams.salt)?;
    let iv = decode_field("iv", &crypto.cipherparams.iv)?;
    let ciphertext = decode_field("ciphertext", &crypto.ciphertext)?;
    let expected_mac = decode_field("mac", &crypto.mac)?;
    if iv.len() != 16 {
        return Err(KeystoreError::Crypto(format!("IV must be 16 bytes, got {}", iv.len())));
    }

    let mut derived = derive_key(passphrase, &salt, params)?;
    if compute_mac(&derived, &ciphertext).as_slice() != expected_mac.as_slice() {
        derived.zeroize();
        return Err(KeystoreError::InvalidPassphrase);
    }

    let mut plaintext = ciphertext;
    let mut cipher = Aes128Ctr::new(derived[..16].into(), iv.as_slice().into());
    cipher.apply_keystream(&mut plaintext);
    derived.zeroize();

    if plaintext.len() != 32 {
        plaintext.zeroize();
        return Err(KeystoreError::Crypto("Decrypted key has invalid length".to_string()));
    }
    let mut secret = [0u8; 32];
    secret.copy_from_slice(&plaintext);
    plaintext.zeroize();
    Ok(secret)
}

fn derive_key(passphrase: &str, salt: &[u8], params: ScryptParams) -> Result<[u8; 32], KeystoreError> {
    let mut derived = [0u8; 32];
    scrypt::scrypt(passphrase.as_bytes(), salt, &params.to_scrypt()?, &mut derived)
        .map_err(|e| KeystoreError::Crypto(format!("Scrypt failed: {e}")))?;
    Ok(derived)
}

fn compute_mac(derived: &[u8; 32], ciphertext: &[u8]) -> [u8; 32] {
    let mut data = Vec::with_capacity(16 + ciphertext.len());
    data.extend_from_slice(&derived[16..]);
    data.extend_from_slice(ciphertext);
    *keccak256(&data).as_bytes()
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, KeystoreError> {
    hex::decode(value).map_err(|e| KeystoreError::Crypto(format!("Invalid {name}: {e}")))
}

/// A stored key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Address of the key
    pub address: Address,
    /// Key file
    pub path: PathBuf,
}

/// Key directory
#[derive(Debug, Clone)]
pub struct KeyStore {
    dir: PathBuf,
    params: ScryptParams,
}

impl KeyStore {
    /// Open (creating if needed) a key directory
    pub fn open(dir: impl AsRef<Path>, params: ScryptParams) -> Result<Self, KeystoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, params })
    }

    /// Key directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Generate and store a new key
    pub fn new_account(&self, passphrase: &str) -> Result<Account, KeystoreError> {
        let wallet = Wallet::new_random();
        let mut secret = wallet.secret_bytes();
        let result = self.store(&secret, &wallet.address(), passphrase);
        secret.zeroize();
        result
    }

    /// Store an existing secret key
    pub fn import_key(&self, secret: &[u8; 32], passphrase: &str) -> Result<Account, KeystoreError> {
        let wallet = Wallet::from_private_key(secret)
            .map_err(|e| KeystoreError::Crypto(e.to_string()))?;
        let address = wallet.address();
        if self.find(&address).is_ok() {
            return Err(KeystoreError::AlreadyExists(address));
        }
        self.store(secret, &address, passphrase)
    }

    fn store(&self, secret: &[u8; 32], address: &Address, passphrase: &str) -> Result<Account, KeystoreError> {
        let keystore = encrypt_key(secret, passphrase, address, self.params)?;
        let json = serde_json::to_vec_pretty(&keystore).map_err(|e| KeystoreError::Malformed {
            path: self.dir.clone(),
            reason: e.to_string(),
        })?;
        let path = self.dir.join(key_file_name(address));
        fs::write(&path, json)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        }
        tracing::info!(%address, path = %path.display(), "stored key");
        Ok(Account { address: *address, path })
    }

    /// All readable key files, sorted by path
    pub fn accounts(&self) -> Result<Vec<Account>, KeystoreError> {
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| !n.starts_with('.') && !n.ends_with('~'))
            })
            .collect();
        paths.sort();

        let mut accounts = Vec::with_capacity(paths.len());
        for path in paths {
            match read_key_file(&path) {
                Ok(keystore) => match Address::from_hex(&keystore.address) {
                    Ok(address) => accounts.push(Account { address, path }),
                    Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping key file"),
                },
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping key file"),
            }
        }
        Ok(accounts)
    }

    /// Key file for an address
    pub fn find(&self, address: &Address) -> Result<Account, KeystoreError> {
        self.accounts()?
            .into_iter()
            .find(|a| a.address == *address)
            .ok_or(KeystoreError::AccountNotFound(*address))
    }

    /// Decrypt the key for `address`
    pub fn unlock(&self, address: &Address, passphrase: &str) -> Result<Wallet, KeystoreError> {
        let account = self.find(address)?;
        let keystore = read_key_file(&account.path)?;
        let mut secret = decrypt_key(&keystore, passphrase)?;
        let wallet = Wallet::from_private_key(&secret).map_err(|e| KeystoreError::Crypto(e.to_string()));
        secret.zeroize();
        let wallet = wallet?;
        if wallet.address() != *address {
            return Err(KeystoreError::Crypto(format!(
                "key file for {address} decrypts to {}",
                wallet.address()
            )));
        }
        tracing::debug!(%address, "unlocked account");
        Ok(wallet)
    }

    /// Unlock, sign, and drop the key again
    pub fn sign_tx_with_passphrase(
        &self,
        address: &Address,
        passphrase: &str,
        tx: DynamicFeeTx,
    ) -> Result<SignedTransaction, SdkError> {
        let wallet = self.unlock(address, passphrase)?;
        wallet.sign_transaction(tx)
    }
}

fn read_key_file(path: &Path) -> Result<KeystoreV3, KeystoreError> {
    let content = fs::read(path)?;
    serde_json::from_slice(&content).map_err(|e| KeystoreError::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// `UTC--<RFC3339 with dashes>--<address hex>`
fn key_file_name(address: &Address) -> String {
    let ts = chrono::Utc::now().format("%Y-%m-%dT%H-%M-%S%.9fZ");
    format!("UTC--{}--{}", ts, hex::encode(address.as_bytes()))
}
