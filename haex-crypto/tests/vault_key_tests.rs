use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use haex_crypto::{
    decrypt_from_storage, decrypt_with_key, encrypt_for_storage, encrypt_with_key, CryptoError,
    EncryptedVaultKey, VaultKey, VaultKeyCache, KEY_SIZE, NONCE_SIZE, PBKDF2_ITERATIONS, SALT_SIZE,
};
use haex_types::VaultId;
use sha2::Sha256;

#[test]
fn generated_keys_are_distinct() {
    let a = VaultKey::generate();
    let b = VaultKey::generate();
    assert_ne!(a.as_bytes(), b.as_bytes());
}

#[test]
fn round_trip_returns_original_key_exactly() {
    let key = VaultKey::generate();
    let encrypted = encrypt_for_storage(&key, "correct-horse").unwrap();
    let decrypted = decrypt_from_storage(&encrypted, "correct-horse").unwrap();
    assert_eq!(decrypted.as_bytes(), key.as_bytes());
    assert_eq!(decrypted.as_bytes().len(), KEY_SIZE);
}

#[test]
fn wrong_password_is_authentication_failure() {
    let key = VaultKey::generate();
    let encrypted = encrypt_for_storage(&key, "correct-horse").unwrap();
    let result = decrypt_from_storage(&encrypted, "wrong-password");
    assert!(matches!(result, Err(CryptoError::AuthenticationFailure)));
}

#[test]
fn tampered_ciphertext_is_authentication_failure() {
    let key = VaultKey::generate();
    let mut encrypted = encrypt_for_storage(&key, "pw").unwrap();
    encrypted.encrypted_vault_key[0] ^= 0xff;
    let result = decrypt_from_storage(&encrypted, "pw");
    assert!(matches!(result, Err(CryptoError::AuthenticationFailure)));
}

#[test]
fn tampered_salt_is_authentication_failure() {
    let key = VaultKey::generate();
    let mut encrypted = encrypt_for_storage(&key, "pw").unwrap();
    encrypted.salt[0] ^= 0xff;
    let result = decrypt_from_storage(&encrypted, "pw");
    assert!(matches!(result, Err(CryptoError::AuthenticationFailure)));
}

#[test]
fn stored_key_of_wrong_length_reports_plaintext_length() {
    // A record that authenticates but wraps a 16-byte blob instead of a key.
    let password = "pw";
    let salt = [7u8; SALT_SIZE];
    let nonce = [9u8; NONCE_SIZE];
    let mut kek = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, PBKDF2_ITERATIONS, &mut kek);
    let cipher = Aes256Gcm::new_from_slice(&kek).unwrap();
    let encrypted_vault_key = cipher
        .encrypt(Nonce::from_slice(&nonce), [0u8; 16].as_slice())
        .unwrap();

    let encrypted = EncryptedVaultKey {
        encrypted_vault_key,
        salt,
        nonce,
    };
    let result = decrypt_from_storage(&encrypted, password);
    assert!(matches!(
        result,
        Err(CryptoError::InvalidKeyLength {
            expected: 32,
            actual: 16
        })
    ));
}

#[test]
fn same_password_never_produces_identical_ciphertext() {
    let key = VaultKey::generate();
    let a = encrypt_for_storage(&key, "pw").unwrap();
    let b = encrypt_for_storage(&key, "pw").unwrap();
    assert_ne!(a.salt, b.salt);
    assert_ne!(a.nonce, b.nonce);
    assert_ne!(a.encrypted_vault_key, b.encrypted_vault_key);
}

#[test]
fn payload_round_trip_with_fresh_nonces() {
    let key = VaultKey::generate();
    let (nonce_a, ct_a) = encrypt_with_key(&key, b"entry-a").unwrap();
    let (nonce_b, ct_b) = encrypt_with_key(&key, b"entry-a").unwrap();
    assert_ne!(nonce_a, nonce_b);
    assert_ne!(ct_a, ct_b);
    assert_eq!(decrypt_with_key(&key, &nonce_a, &ct_a).unwrap(), b"entry-a");
    assert_eq!(decrypt_with_key(&key, &nonce_b, &ct_b).unwrap(), b"entry-a");
}

#[test]
fn payload_with_wrong_key_fails_closed() {
    let key = VaultKey::generate();
    let other = VaultKey::generate();
    let (nonce, ct) = encrypt_with_key(&key, b"secret").unwrap();
    let result = decrypt_with_key(&other, &nonce, &ct);
    assert!(matches!(result, Err(CryptoError::AuthenticationFailure)));
}

#[test]
fn payload_with_bad_nonce_length_is_rejected() {
    let key = VaultKey::generate();
    let (_, ct) = encrypt_with_key(&key, b"secret").unwrap();
    let result = decrypt_with_key(&key, &[0u8; 5], &ct);
    assert!(matches!(
        result,
        Err(CryptoError::InvalidNonceLength { expected: 12, actual: 5 })
    ));
}

#[tokio::test]
async fn cache_insert_get_evict() {
    let cache = VaultKeyCache::new();
    let vault = VaultId::new();
    let key = VaultKey::generate();

    assert!(cache.get(&vault).await.is_none());
    cache.insert(vault, key.clone()).await;
    assert_eq!(cache.get(&vault).await.unwrap().as_bytes(), key.as_bytes());
    assert_eq!(cache.len().await, 1);

    cache.evict(&vault).await;
    assert!(cache.get(&vault).await.is_none());
    assert!(cache.is_empty().await);
}

#[tokio::test]
async fn cache_clear_removes_all_entries() {
    let cache = VaultKeyCache::new();
    cache.insert(VaultId::new(), VaultKey::generate()).await;
    cache.insert(VaultId::new(), VaultKey::generate()).await;
    assert_eq!(cache.len().await, 2);
    cache.clear().await;
    assert!(cache.is_empty().await);
}
