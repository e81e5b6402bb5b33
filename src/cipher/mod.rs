//! Cipher abstraction over the tunnel byte stream
//!
//! Two variants with different wire semantics coexist behind one trait: the
//! substitution table is length-preserving and never fails, AES-GCM changes
//! the length (nonce + tag) and rejects tampered input. `overhead()` lets
//! the channel pick the matching frame discipline.

mod aead;
mod table;

pub use aead::AeadCipher;
pub use table::TableCipher;

use crate::{Error, Result};
use std::sync::Arc;

/// Byte-stream transform shared read-only by all sessions of one agent.
pub trait Cipher: Send + Sync {
    /// Transform plaintext into its wire form.
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Recover plaintext from its wire form. Fails for the AEAD variant on
    /// truncated or tampered input; total for the table variant.
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;

    /// Fixed per-message expansion on the wire. 0 means length-preserving,
    /// in which case the stream carries no frame headers.
    fn overhead(&self) -> usize;
}

/// Supported cipher variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherKind {
    Table,
    Aes128Gcm,
    Aes192Gcm,
    Aes256Gcm,
}

impl CipherKind {
    /// Secret length in bytes before hex encoding
    pub fn key_size(&self) -> usize {
        match self {
            CipherKind::Table => table::TABLE_LEN,
            CipherKind::Aes128Gcm => 16,
            CipherKind::Aes192Gcm => 24,
            CipherKind::Aes256Gcm => 32,
        }
    }

    /// Generate a fresh hex-encoded secret for this variant
    pub fn generate_secret(&self) -> Result<String> {
        match self {
            CipherKind::Table => Ok(TableCipher::generate().to_hex()),
            _ => {
                let key = AeadCipher::generate_key(self.key_size())?;
                Ok(hex::encode(key))
            }
        }
    }

    /// Build a cipher from a hex-encoded secret
    pub fn build(&self, secret: &str) -> Result<Arc<dyn Cipher>> {
        match self {
            CipherKind::Table => Ok(Arc::new(TableCipher::from_hex(secret)?)),
            _ => {
                let cipher = AeadCipher::from_hex(secret)?;
                if cipher.key_size() != self.key_size() {
                    return Err(Error::crypto(format!(
                        "secret is a {}-byte key, {} expects {}",
                        cipher.key_size(),
                        self.as_str(),
                        self.key_size()
                    )));
                }
                Ok(Arc::new(cipher))
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CipherKind::Table => "table",
            CipherKind::Aes128Gcm => "aes-128-gcm",
            CipherKind::Aes192Gcm => "aes-192-gcm",
            CipherKind::Aes256Gcm => "aes-256-gcm",
        }
    }
}

impl TryFrom<&str> for CipherKind {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "table" => Ok(CipherKind::Table),
            "aes-128-gcm" => Ok(CipherKind::Aes128Gcm),
            "aes-192-gcm" => Ok(CipherKind::Aes192Gcm),
            "aes-256-gcm" => Ok(CipherKind::Aes256Gcm),
            _ => Err(Error::config(format!("Unsupported cipher: {}", s))),
        }
    }
}
