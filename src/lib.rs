//! Veilsocks - encrypted SOCKS5 tunneling relay
//!
//! A pair of agents tunnels SOCKS5 traffic over an obfuscated/encrypted TCP
//! stream. The client agent accepts plain SOCKS5 connections from a local
//! application and forwards every byte encrypted to the server agent, which
//! decrypts the stream, performs the SOCKS5 CONNECT handshake itself, dials
//! the real destination and relays the payload back encrypted.
//!
//! # Architecture
//!
//! ```text
//! app --SOCKS5--> [LocalAgent] ==encrypted==> [RemoteAgent] --TCP--> destination
//!                      |                           |
//!                 SecureChannel               SecureChannel
//!                 (encode/decode copy)        + Handshake + Relay
//! ```
//!
//! Two cipher variants are supported: a keyed byte-substitution table
//! (length-preserving obfuscation, not cryptographically secure) and
//! AES-GCM (authenticated, length-changing, framed on the wire).

pub mod agent;
pub mod channel;
pub mod cipher;
pub mod common;
pub mod config;
pub mod dns;
pub mod handshake;
pub mod relay;
pub mod socks;

pub use common::error::{Error, Result};
pub use config::Config;

/// Veilsocks version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Read buffer size used by the copy loops
pub const BUF_SIZE: usize = 1024;

/// Default deadline applied to a session once its upstream leg is
/// established. A session that outlives it is torn down with a timeout.
/// Agents can override it per instance.
pub const SESSION_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);
