//! AES-GCM cipher variant
//!
//! Every `encrypt` draws a fresh random nonce and prepends it to the sealed
//! ciphertext, so the wire form is `nonce || ciphertext || tag` and output
//! length exceeds input length by a fixed overhead.

use super::Cipher;
use crate::{Error, Result};
use aes::Aes192;
use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm, Nonce};

type Aes192Gcm = AesGcm<Aes192, U12>;

/// GCM nonce size in bytes
pub const NONCE_SIZE: usize = 12;
/// GCM authentication tag size in bytes
pub const TAG_SIZE: usize = 16;

enum Keyed {
    Aes128(Aes128Gcm),
    Aes192(Aes192Gcm),
    Aes256(Aes256Gcm),
}

/// Authenticated cipher keyed with 16, 24 or 32 bytes
pub struct AeadCipher {
    keyed: Keyed,
    key_size: usize,
}

impl AeadCipher {
    pub fn new(key: &[u8]) -> Result<Self> {
        let keyed = match key.len() {
            16 => Keyed::Aes128(Aes128Gcm::new_from_slice(key).map_err(key_err)?),
            24 => Keyed::Aes192(Aes192Gcm::new_from_slice(key).map_err(key_err)?),
            32 => Keyed::Aes256(Aes256Gcm::new_from_slice(key).map_err(key_err)?),
            n => {
                return Err(Error::crypto(format!(
                    "invalid key size {}, must be 16, 24 or 32 bytes",
                    n
                )))
            }
        };
        Ok(AeadCipher {
            keyed,
            key_size: key.len(),
        })
    }

    pub fn from_hex(secret: &str) -> Result<Self> {
        let key = hex::decode(secret.trim())
            .map_err(|e| Error::crypto(format!("invalid key: {}", e)))?;
        Self::new(&key)
    }

    /// Draw a uniformly random key of the chosen size
    pub fn generate_key(size: usize) -> Result<Vec<u8>> {
        if size != 16 && size != 24 && size != 32 {
            return Err(Error::crypto(format!(
                "invalid key size {}, must be 16, 24 or 32 bytes",
                size
            )));
        }
        let mut key = vec![0u8; size];
        getrandom::getrandom(&mut key).map_err(|e| Error::crypto(e.to_string()))?;
        Ok(key)
    }

    pub fn key_size(&self) -> usize {
        self.key_size
    }
}

fn key_err(e: aes::cipher::InvalidLength) -> Error {
    Error::crypto(format!("invalid key: {}", e))
}

impl Cipher for AeadCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce = [0u8; NONCE_SIZE];
        getrandom::getrandom(&mut nonce).map_err(|e| Error::crypto(e.to_string()))?;
        let nonce = Nonce::from(nonce);

        let sealed = match &self.keyed {
            Keyed::Aes128(c) => c.encrypt(&nonce, plaintext),
            Keyed::Aes192(c) => c.encrypt(&nonce, plaintext),
            Keyed::Aes256(c) => c.encrypt(&nonce, plaintext),
        }
        .map_err(|_| Error::crypto("encryption failed"))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < NONCE_SIZE {
            return Err(Error::crypto("ciphertext too short"));
        }
        let (nonce, sealed) = ciphertext.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce);

        match &self.keyed {
            Keyed::Aes128(c) => c.decrypt(nonce, sealed),
            Keyed::Aes192(c) => c.decrypt(nonce, sealed),
            Keyed::Aes256(c) => c.decrypt(nonce, sealed),
        }
        .map_err(|_| Error::crypto("authentication failed"))
    }

    fn overhead(&self) -> usize {
        NONCE_SIZE + TAG_SIZE
    }
}
