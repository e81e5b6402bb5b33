//! Server-side agent
//!
//! Accepts encrypted connections from client agents, drives the SOCKS5
//! handshake on the decrypted stream, dials the requested destination and
//! relays payload in both directions.

use super::ListenHook;
use crate::channel::SecureChannel;
use crate::cipher::Cipher;
use crate::common::net::configure_tcp_stream;
use crate::dns::Resolver;
use crate::handshake::Handshake;
use crate::{relay, Result, SESSION_TIMEOUT};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub struct RemoteAgent {
    listen_addr: SocketAddr,
    channel: SecureChannel,
    resolver: Arc<Resolver>,
    session_timeout: Duration,
    running: AtomicBool,
    on_listening: Option<ListenHook>,
}

impl RemoteAgent {
    pub fn new(cipher: Arc<dyn Cipher>, listen_addr: SocketAddr) -> Result<Self> {
        Ok(RemoteAgent {
            listen_addr,
            channel: SecureChannel::new(cipher),
            resolver: Arc::new(Resolver::new()?),
            session_timeout: SESSION_TIMEOUT,
            running: AtomicBool::new(false),
            on_listening: None,
        })
    }

    pub fn set_on_listening(&mut self, hook: impl Fn(SocketAddr) + Send + Sync + 'static) {
        self.on_listening = Some(Box::new(hook));
    }

    /// Override the per-session deadline. Defaults to [`SESSION_TIMEOUT`].
    pub fn set_session_timeout(&mut self, deadline: Duration) {
        self.session_timeout = deadline;
    }

    /// Bind the listener and accept until stopped. Failures are
    /// connection-scoped; the loop survives everything but `stop()`.
    pub async fn listen(&self) -> Result<()> {
        let listener = TcpListener::bind(self.listen_addr).await?;
        let addr = listener.local_addr()?;
        info!("server agent listening on {}", addr);

        self.running.store(true, Ordering::SeqCst);
        if let Some(hook) = &self.on_listening {
            hook(addr);
        }

        while self.running.load(Ordering::SeqCst) {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    configure_tcp_stream(&stream);
                    let channel = self.channel.clone();
                    let resolver = self.resolver.clone();
                    let deadline = self.session_timeout;
                    tokio::spawn(async move {
                        Self::handle_connection(channel, resolver, stream, peer_addr, deadline)
                            .await;
                    });
                }
                Err(e) => {
                    if self.running.load(Ordering::SeqCst) {
                        error!("accept error: {}", e);
                    }
                }
            }
        }

        Ok(())
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn handle_connection(
        channel: SecureChannel,
        resolver: Arc<Resolver>,
        stream: TcpStream,
        peer_addr: SocketAddr,
        deadline: Duration,
    ) {
        let session = Uuid::new_v4();
        debug!(%session, %peer_addr, "accepted connection");

        if let Err(e) = Self::process(channel, resolver, stream, session, deadline).await {
            // tampered or garbage ciphertext is reported louder than
            // ordinary connection churn
            if e.is_crypto() {
                warn!(%session, %peer_addr, "session aborted: {}", e);
            } else {
                debug!(%session, %peer_addr, "session ended: {}", e);
            }
        }
    }

    async fn process(
        channel: SecureChannel,
        resolver: Arc<Resolver>,
        mut stream: TcpStream,
        session: Uuid,
        deadline: Duration,
    ) -> Result<()> {
        let upstream = {
            let (mut rd, mut wr) = stream.split();
            let mut handshake = Handshake::new(channel.clone());
            handshake.run(&mut rd, &mut wr, &resolver).await?
        };

        // deadline runs from upstream establishment
        match timeout(deadline, relay::run(&channel, stream, upstream)).await {
            Ok((sent, received)) => {
                debug!(%session, sent, received, "session finished");
            }
            Err(_) => {
                debug!(%session, "session deadline elapsed");
            }
        }
        Ok(())
    }
}
