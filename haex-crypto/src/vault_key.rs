//! Vault-key generation and password-based protection.
//!
//! The vault's 32-byte symmetric key is wrapped for remote storage with a
//! key-encryption key derived from the user's password via PBKDF2-HMAC-SHA256
//! (600,000 iterations) and sealed with AES-256-GCM. Salt and nonce are
//! always freshly random, so encrypting the same key under the same password
//! twice never yields identical ciphertext.

use crate::error::{CryptoError, CryptoResult};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Vault key size in bytes (AES-256).
pub const KEY_SIZE: usize = 32;
/// PBKDF2 salt size in bytes.
pub const SALT_SIZE: usize = 32;
/// AES-GCM nonce size in bytes.
pub const NONCE_SIZE: usize = 12;
/// PBKDF2-HMAC-SHA256 iteration count.
pub const PBKDF2_ITERATIONS: u32 = 600_000;

/// The vault's symmetric key. Zeroized on drop, never persisted plaintext.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct VaultKey([u8; KEY_SIZE]);

impl VaultKey {
    /// Generates a fresh key from OS randomness.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.write_str("VaultKey(..)")
    }
}

/// Password-encrypted vault key as stored remotely, one per (backend, vault).
///
/// Written once on backend enablement and treated as immutable — there is
/// no rotation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncryptedVaultKey {
    pub encrypted_vault_key: Vec<u8>,
    pub salt: [u8; SALT_SIZE],
    pub nonce: [u8; NONCE_SIZE],
}

fn derive_kek(password: &str, salt: &[u8; SALT_SIZE]) -> [u8; KEY_SIZE] {
    let mut kek = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut kek);
    kek
}

/// Encrypts a vault key for remote storage under a password-derived KEK.
pub fn encrypt_for_storage(key: &VaultKey, password: &str) -> CryptoResult<EncryptedVaultKey> {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let mut kek = derive_kek(password, &salt);
    let cipher = Aes256Gcm::new_from_slice(&kek)
        .map_err(|e| CryptoError::Encryption(format!("bad KEK length: {e}")))?;
    kek.zeroize();

    let encrypted_vault_key = cipher
        .encrypt(Nonce::from_slice(&nonce), key.as_bytes().as_slice())
        .map_err(|_| CryptoError::Encryption("vault key seal failed".to_string()))?;

    Ok(EncryptedVaultKey {
        encrypted_vault_key,
        salt,
        nonce,
    })
}

/// Decrypts a stored vault key.
///
/// Fails with [`CryptoError::AuthenticationFailure`] on GCM tag mismatch;
/// never returns substitute bytes.
pub fn decrypt_from_storage(encrypted: &EncryptedVaultKey, password: &str) -> CryptoResult<VaultKey> {
    let mut kek = derive_kek(password, &encrypted.salt);
    let cipher = Aes256Gcm::new_from_slice(&kek)
        .map_err(|e| CryptoError::Encryption(format!("bad KEK length: {e}")))?;
    kek.zeroize();

    let mut plaintext = cipher
        .decrypt(
            Nonce::from_slice(&encrypted.nonce),
            encrypted.encrypted_vault_key.as_slice(),
        )
        .map_err(|_| CryptoError::AuthenticationFailure)?;

    if plaintext.len() != KEY_SIZE {
        let actual = plaintext.len();
        plaintext.zeroize();
        return Err(CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual,
        });
    }

    let mut bytes = [0u8; KEY_SIZE];
    bytes.copy_from_slice(&plaintext);
    plaintext.zeroize();
    Ok(VaultKey::from_bytes(bytes))
}

/// Encrypts an arbitrary payload under the vault key with a fresh nonce.
///
/// Used for per-entry log encryption: each entry gets its own nonce so one
/// corrupt envelope cannot prevent decrypting the rest of a batch.
pub fn encrypt_with_key(key: &VaultKey, plaintext: &[u8]) -> CryptoResult<([u8; NONCE_SIZE], Vec<u8>)> {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::Encryption(format!("bad key length: {e}")))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::Encryption("payload seal failed".to_string()))?;

    Ok((nonce, ciphertext))
}

/// Decrypts a payload sealed with [`encrypt_with_key`].
pub fn decrypt_with_key(key: &VaultKey, nonce: &[u8], ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
    if nonce.len() != NONCE_SIZE {
        return Err(CryptoError::InvalidNonceLength {
            expected: NONCE_SIZE,
            actual: nonce.len(),
        });
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::Encryption(format!("bad key length: {e}")))?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::AuthenticationFailure)
}
