//! Keystore directory behavior

use ethflow_sdk::keystore::{decrypt_key, KeystoreV3};
use ethflow_sdk::{Address, KeyStore, KeystoreError, ScryptParams, SdkError, TxBuilder};

const TEST_KEY: [u8; 32] = [0x11; 32];

fn open() -> (tempfile::TempDir, KeyStore) {
    let dir = tempfile::tempdir().unwrap();
    let ks = KeyStore::open(dir.path().join("keys"), ScryptParams::light()).unwrap();
    (dir, ks)
}

#[test]
fn test_new_account_unlocks() {
    let (_dir, ks) = open();
    let account = ks.new_account("secret").unwrap();

    assert!(account.path.starts_with(ks.dir()));
    let name = account.path.file_name().unwrap().to_str().unwrap().to_string();
    assert!(name.starts_with("UTC--"));
    assert!(name.ends_with(&hex::encode(account.address.as_bytes())));

    let wallet = ks.unlock(&account.address, "secret").unwrap();
    assert_eq!(wallet.address(), account.address);
}

#[test]
fn test_wrong_passphrase() {
    let (_dir, ks) = open();
    let account = ks.new_account("secret").unwrap();
    let err = ks.unlock(&account.address, "guess").unwrap_err();
    assert!(matches!(err, KeystoreError::InvalidPassphrase));
    assert_eq!(err.to_string(), "Invalid password or corrupted keystore");
}

#[test]
fn test_import_and_duplicate() {
    let (_dir, ks) = open();
    let account = ks.import_key(&TEST_KEY, "pw").unwrap();
    assert!(matches!(ks.import_key(&TEST_KEY, "pw"), Err(KeystoreError::AlreadyExists(a)) if a == account.address));
    assert_eq!(ks.find(&account.address).unwrap(), account);
}

#[test]
fn test_accounts_sorted_and_skip_junk() {
    let (_dir, ks) = open();
    let a = ks.new_account("a").unwrap();
    let b = ks.new_account("b").unwrap();
    std::fs::write(ks.dir().join("README"), "not a key").unwrap();
    std::fs::write(ks.dir().join(".hidden"), "{}").unwrap();

    let accounts = ks.accounts().unwrap();
    assert_eq!(accounts.len(), 2);
    let mut expected = vec![a, b];
    expected.sort_by(|x, y| x.path.cmp(&y.path));
    assert_eq!(accounts, expected);
}

#[test]
fn test_unknown_account() {
    let (_dir, ks) = open();
    let missing = Address::from_bytes([9; 20]);
    assert!(matches!(ks.unlock(&missing, "pw"), Err(KeystoreError::AccountNotFound(a)) if a == missing));
}

#[test]
fn test_file_is_v3_json() {
    let (_dir, ks) = open();
    let account = ks.import_key(&TEST_KEY, "pw").unwrap();
    let keystore: KeystoreV3 = serde_json::from_slice(&std::fs::read(&account.path).unwrap()).unwrap();
    assert_eq!(keystore.version, 3);
    assert_eq!(keystore.crypto.cipher, "aes-128-ctr");
    assert_eq!(keystore.crypto.kdf, "scrypt");
    assert_eq!(keystore.crypto.kdfparams.n, 4096);
    assert_eq!(decrypt_key(&keystore, "pw").unwrap(), TEST_KEY);
}

#[test]
fn test_sign_tx_with_passphrase() {
    let (_dir, ks) = open();
    let account = ks.new_account("pw").unwrap();
    let tx = TxBuilder::new(1337)
        .nonce(0)
        .gas_limit(21_000)
        .max_fee_per_gas(2u64)
        .max_priority_fee_per_gas(1u64)
        .to(Address::ZERO)
        .build()
        .unwrap();

    let signed = ks.sign_tx_with_passphrase(&account.address, "pw", tx.clone()).unwrap();
    assert_eq!(signed.recover_sender().unwrap(), account.address);

    let err = ks.sign_tx_with_passphrase(&account.address, "nope", tx).unwrap_err();
    assert!(matches!(err, SdkError::Keystore(KeystoreError::InvalidPassphrase)));
}
