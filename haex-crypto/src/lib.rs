//! Vault-key protection for haex.
//!
//! Provides:
//! - PBKDF2-HMAC-SHA256 key derivation from the vault password
//! - AES-256-GCM authenticated encryption for the vault key and log entries
//! - an in-memory, explicitly-evicted vault-key cache
//!
//! # Architecture
//!
//! A two-tier key scheme: the user's password derives a key-encryption key
//! (never stored), which wraps the random 32-byte vault key. The wrapped
//! key travels to each sync backend; the plaintext key lives only in the
//! in-process [`VaultKeyCache`] while the vault is open. Log entries are
//! encrypted individually under the vault key, each with a fresh nonce.

mod cache;
mod error;
mod vault_key;

pub use cache::{CachedVaultKey, VaultKeyCache};
pub use error::{CryptoError, CryptoResult};
pub use vault_key::{
    decrypt_from_storage, decrypt_with_key, encrypt_for_storage, encrypt_with_key,
    EncryptedVaultKey, VaultKey, KEY_SIZE, NONCE_SIZE, PBKDF2_ITERATIONS, SALT_SIZE,
};
