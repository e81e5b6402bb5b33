//! SOCKS5 protocol subset (RFC 1928)
//!
//! Only the pieces the tunnel needs: greeting validation, CONNECT request
//! parsing and the two canonical replies. Messages arrive as whole
//! decrypted buffers from the secure channel, so parsing works on byte
//! slices rather than on the connection.

use crate::common::net::Address;
use crate::{Error, Result};
use std::net::{Ipv4Addr, Ipv6Addr};

// SOCKS5 version
pub const SOCKS5_VERSION: u8 = 0x05;

// SOCKS5 commands
pub const CMD_CONNECT: u8 = 0x01;
pub const CMD_BIND: u8 = 0x02;
pub const CMD_UDP_ASSOCIATE: u8 = 0x03;

// SOCKS5 address types
pub const ATYP_IPV4: u8 = 0x01;
pub const ATYP_DOMAIN: u8 = 0x03;
pub const ATYP_IPV6: u8 = 0x04;

/// Reply to the greeting: no authentication required
pub const NO_AUTH_REPLY: [u8; 2] = [SOCKS5_VERSION, 0x00];

/// Fixed success reply with a zeroed bound address; the real destination is
/// never echoed back.
pub const SUCCESS_REPLY: [u8; 10] = [SOCKS5_VERSION, 0x00, 0x00, ATYP_IPV4, 0, 0, 0, 0, 0, 0];

/// SOCKS5 command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Bind,
    UdpAssociate,
}

impl TryFrom<u8> for Command {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            CMD_CONNECT => Ok(Command::Connect),
            CMD_BIND => Ok(Command::Bind),
            CMD_UDP_ASSOCIATE => Ok(Command::UdpAssociate),
            _ => Err(Error::protocol(format!(
                "Unknown SOCKS5 command: {}",
                value
            ))),
        }
    }
}

/// Validate the method-negotiation greeting `VER NMETHODS METHODS...`.
/// The method list itself is accepted unconditionally; only the version
/// byte is checked.
pub fn validate_greeting(msg: &[u8]) -> Result<()> {
    if msg.is_empty() {
        return Err(Error::protocol("empty greeting"));
    }
    if msg[0] != SOCKS5_VERSION {
        return Err(Error::protocol(format!(
            "Unsupported SOCKS version: {}",
            msg[0]
        )));
    }
    Ok(())
}

/// Parsed CONNECT request, transient and scoped to the handshake
#[derive(Debug)]
pub struct Socks5Request {
    pub command: Command,
    pub address: Address,
    pub port: u16,
}

impl Socks5Request {
    /// Parse `VER CMD RSV ATYP DST.ADDR DST.PORT` from one decrypted
    /// message. The shortest valid request (IPv4) is 10 bytes; anything
    /// below 7 cannot even carry an address.
    pub fn parse(msg: &[u8]) -> Result<Self> {
        if msg.len() < 7 {
            return Err(Error::protocol(format!(
                "malformed request: {} bytes, expected at least 7",
                msg.len()
            )));
        }
        if msg[0] != SOCKS5_VERSION {
            return Err(Error::protocol(format!(
                "Unsupported SOCKS version: {}",
                msg[0]
            )));
        }
        let command = Command::try_from(msg[1])?;

        // msg[2] is the reserved byte, ignored
        let (address, port_off) = match msg[3] {
            ATYP_IPV4 => {
                if msg.len() < 4 + 4 + 2 {
                    return Err(Error::protocol("malformed request: truncated IPv4 address"));
                }
                let ip = Ipv4Addr::new(msg[4], msg[5], msg[6], msg[7]);
                (Address::Ipv4(ip), 8)
            }
            ATYP_DOMAIN => {
                let len = msg[4] as usize;
                if msg.len() < 5 + len + 2 {
                    return Err(Error::protocol("malformed request: truncated domain name"));
                }
                let domain = std::str::from_utf8(&msg[5..5 + len])
                    .map_err(|e| Error::protocol(format!("invalid domain name: {}", e)))?;
                (Address::Domain(domain.to_string()), 5 + len)
            }
            ATYP_IPV6 => {
                if msg.len() < 4 + 16 + 2 {
                    return Err(Error::protocol("malformed request: truncated IPv6 address"));
                }
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&msg[4..20]);
                (Address::Ipv6(Ipv6Addr::from(octets)), 20)
            }
            t => {
                return Err(Error::protocol(format!("Unknown address type: {}", t)));
            }
        };

        let port = u16::from_be_bytes([msg[port_off], msg[port_off + 1]]);
        Ok(Socks5Request {
            command,
            address,
            port,
        })
    }
}
