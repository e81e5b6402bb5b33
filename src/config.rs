//! JSON configuration persistence
//!
//! Both binaries share one config shape: listen address, remote address
//! (client only), cipher variant and hex secret. A missing file is
//! replaced with generated defaults and written back, so a fresh install
//! prints a usable secret on first start.

use crate::cipher::{Cipher, CipherKind};
use crate::common::net::parse_socket_addr;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Local listen address
    pub listen: String,

    /// Remote agent address, used by the client only
    pub remote: String,

    /// Cipher variant: "table", "aes-128-gcm", "aes-192-gcm", "aes-256-gcm"
    pub cipher: String,

    /// Hex-encoded secret shared by both agents
    pub secret: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen: "0.0.0.0:7448".to_string(),
            remote: String::new(),
            cipher: CipherKind::Table.as_str().to_string(),
            secret: String::new(),
        }
    }
}

impl Config {
    /// Load from file, or start from defaults if it does not exist. An
    /// empty secret is filled with a freshly generated one and the result
    /// is persisted back.
    pub fn load_or_init<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            info!("reading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            Config::default()
        };

        if config.secret.is_empty() {
            config.secret = config.cipher_kind()?.generate_secret()?;
            info!(
                "generated a new {} secret, stored in {}",
                config.cipher,
                path.display()
            );
        }

        config.save(path)?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn cipher_kind(&self) -> Result<CipherKind> {
        CipherKind::try_from(self.cipher.as_str())
    }

    /// Build the shared cipher from the configured variant and secret
    pub fn build_cipher(&self) -> Result<Arc<dyn Cipher>> {
        self.cipher_kind()?.build(&self.secret)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        parse_socket_addr(&self.listen)
    }

    pub fn remote_addr(&self) -> Result<SocketAddr> {
        if self.remote.is_empty() {
            return Err(Error::config("remote address is not configured"));
        }
        parse_socket_addr(&self.remote)
    }
}
