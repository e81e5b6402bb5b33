//! Keyed byte-substitution cipher
//!
//! The key is a random permutation of the 256 byte values with no fixed
//! point (a derangement), so no byte ever travels as itself. This is an
//! obfuscation layer, not cryptographically secure.

use super::Cipher;
use crate::{Error, Result};
use rand::seq::SliceRandom;

/// Number of entries in the substitution table
pub const TABLE_LEN: usize = 256;

/// Substitution-table cipher with its inverse derived once at construction
pub struct TableCipher {
    table: [u8; TABLE_LEN],
    inverse: [u8; TABLE_LEN],
}

impl TableCipher {
    /// Draw uniformly random permutations until one is a derangement.
    /// About 1.58 draws are expected; the loop is bounded by probability,
    /// not recursion depth.
    pub fn generate() -> Self {
        let mut table = [0u8; TABLE_LEN];
        for (i, b) in table.iter_mut().enumerate() {
            *b = i as u8;
        }

        let mut rng = rand::thread_rng();
        loop {
            table.shuffle(&mut rng);
            if table.iter().enumerate().all(|(i, &v)| v as usize != i) {
                break;
            }
        }

        Self::from_table(table).expect("shuffled identity is a permutation")
    }

    /// Parse a table from its 512-character hex serialization
    pub fn from_hex(secret: &str) -> Result<Self> {
        let bytes = hex::decode(secret.trim())
            .map_err(|e| Error::crypto(format!("invalid table secret: {}", e)))?;
        if bytes.len() != TABLE_LEN {
            return Err(Error::crypto(format!(
                "invalid table secret: expected {} bytes, got {}",
                TABLE_LEN,
                bytes.len()
            )));
        }
        let mut table = [0u8; TABLE_LEN];
        table.copy_from_slice(&bytes);
        Self::from_table(table)
    }

    /// Hex serialization of the table, 512 characters
    pub fn to_hex(&self) -> String {
        hex::encode(self.table)
    }

    fn from_table(table: [u8; TABLE_LEN]) -> Result<Self> {
        let mut inverse = [0u8; TABLE_LEN];
        let mut seen = [false; TABLE_LEN];
        for (i, &v) in table.iter().enumerate() {
            if seen[v as usize] {
                return Err(Error::crypto(
                    "invalid table secret: not a permutation of the byte values",
                ));
            }
            seen[v as usize] = true;
            inverse[v as usize] = i as u8;
        }
        Ok(TableCipher { table, inverse })
    }
}

impl Cipher for TableCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        Ok(plaintext.iter().map(|&b| self.table[b as usize]).collect())
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        Ok(ciphertext
            .iter()
            .map(|&b| self.inverse[b as usize])
            .collect())
    }

    fn overhead(&self) -> usize {
        0
    }
}
