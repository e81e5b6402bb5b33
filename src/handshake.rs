//! Server-side SOCKS5 handshake state machine
//!
//! Consumes decrypted messages from the peer, validates the greeting,
//! parses the CONNECT request, dials the destination and emits the
//! encrypted protocol replies. Terminates by handing the dialed upstream
//! back to the session for relaying.

use crate::channel::SecureChannel;
use crate::common::net::configure_tcp_stream;
use crate::dns::Resolver;
use crate::socks::{validate_greeting, Command, Socks5Request, NO_AUTH_REPLY, SUCCESS_REPLY};
use crate::{Error, Result};
use bytes::BytesMut;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

/// Handshake progress. `Failed` is terminal and reachable from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    AwaitingGreeting,
    AwaitingRequest,
    Dialing,
    Relaying,
    Failed,
}

pub struct Handshake {
    channel: SecureChannel,
    state: HandshakeState,
}

impl Handshake {
    pub fn new(channel: SecureChannel) -> Self {
        Handshake {
            channel,
            state: HandshakeState::AwaitingGreeting,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Drive the state machine to completion over the peer halves. On
    /// success the connection to the destination is returned and the state
    /// is `Relaying`; any failure aborts the session with state `Failed`.
    pub async fn run<R, W>(
        &mut self,
        peer_rd: &mut R,
        peer_wr: &mut W,
        resolver: &Resolver,
    ) -> Result<TcpStream>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        match self.drive(peer_rd, peer_wr, resolver).await {
            Ok(upstream) => {
                self.state = HandshakeState::Relaying;
                Ok(upstream)
            }
            Err(e) => {
                self.state = HandshakeState::Failed;
                Err(e)
            }
        }
    }

    async fn drive<R, W>(
        &mut self,
        peer_rd: &mut R,
        peer_wr: &mut W,
        resolver: &Resolver,
    ) -> Result<TcpStream>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut msg = BytesMut::new();

        // Greeting: version check only, the method list is accepted
        // unconditionally and answered with "no authentication required".
        if self.channel.decode_read(peer_rd, &mut msg).await? == 0 {
            return Err(Error::connection("peer closed before greeting"));
        }
        validate_greeting(&msg)?;
        self.channel.encode_write(peer_wr, &NO_AUTH_REPLY).await?;
        self.state = HandshakeState::AwaitingRequest;

        msg.clear();
        if self.channel.decode_read(peer_rd, &mut msg).await? == 0 {
            return Err(Error::connection("peer closed before request"));
        }
        let request = Socks5Request::parse(&msg)?;
        if request.command != Command::Connect {
            return Err(Error::unsupported(format!(
                "only CONNECT is supported, got {:?}",
                request.command
            )));
        }
        self.state = HandshakeState::Dialing;

        // Domains are resolved here; resolution failure aborts before any
        // dial attempt.
        let ip = match request.address.to_ip() {
            Some(ip) => ip,
            None => resolver.resolve(&request.address.to_host()).await?,
        };
        let dst = SocketAddr::new(ip, request.port);
        debug!(
            "dialing {} (requested {})",
            dst,
            request.address.to_string_with_port(request.port)
        );

        // No retry; a failed dial aborts without sending a reply.
        let upstream = TcpStream::connect(dst)
            .await
            .map_err(|e| Error::connection(format!("dial {} failed: {}", dst, e)))?;
        configure_tcp_stream(&upstream);

        self.channel.encode_write(peer_wr, &SUCCESS_REPLY).await?;
        Ok(upstream)
    }
}
