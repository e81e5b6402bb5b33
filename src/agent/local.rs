//! Client-side agent
//!
//! Accepts plain SOCKS5 connections from a local application and relays
//! every byte encrypted to the remote agent. No SOCKS parsing happens
//! here; the remote side drives the handshake on the decrypted stream.

use super::ListenHook;
use crate::channel::SecureChannel;
use crate::cipher::Cipher;
use crate::common::net::configure_tcp_stream;
use crate::{relay, Result, SESSION_TIMEOUT};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub struct LocalAgent {
    listen_addr: SocketAddr,
    remote_addr: SocketAddr,
    channel: SecureChannel,
    session_timeout: Duration,
    running: AtomicBool,
    on_listening: Option<ListenHook>,
}

impl LocalAgent {
    pub fn new(cipher: Arc<dyn Cipher>, listen_addr: SocketAddr, remote_addr: SocketAddr) -> Self {
        LocalAgent {
            listen_addr,
            remote_addr,
            channel: SecureChannel::new(cipher),
            session_timeout: SESSION_TIMEOUT,
            running: AtomicBool::new(false),
            on_listening: None,
        }
    }

    pub fn set_on_listening(&mut self, hook: impl Fn(SocketAddr) + Send + Sync + 'static) {
        self.on_listening = Some(Box::new(hook));
    }

    /// Override the per-session deadline. Defaults to [`SESSION_TIMEOUT`].
    pub fn set_session_timeout(&mut self, deadline: Duration) {
        self.session_timeout = deadline;
    }

    /// Bind the listener and accept until stopped. Accept errors are
    /// logged and skipped; they never end the loop.
    pub async fn listen(&self) -> Result<()> {
        let listener = TcpListener::bind(self.listen_addr).await?;
        let addr = listener.local_addr()?;
        info!("client agent listening on {}, remote {}", addr, self.remote_addr);

        self.running.store(true, Ordering::SeqCst);
        if let Some(hook) = &self.on_listening {
            hook(addr);
        }

        while self.running.load(Ordering::SeqCst) {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    configure_tcp_stream(&stream);
                    let channel = self.channel.clone();
                    let remote_addr = self.remote_addr;
                    let deadline = self.session_timeout;
                    tokio::spawn(async move {
                        Self::handle_connection(channel, stream, peer_addr, remote_addr, deadline)
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
        app: TcpStream,
        peer_addr: SocketAddr,
        remote_addr: SocketAddr,
        deadline: Duration,
    ) {
        let session = Uuid::new_v4();
        debug!(%session, %peer_addr, "accepted connection");

        let server = match TcpStream::connect(remote_addr).await {
            Ok(s) => s,
            Err(e) => {
                warn!(%session, "dial remote {} failed: {}", remote_addr, e);
                return;
            }
        };
        configure_tcp_stream(&server);

        match timeout(deadline, relay::run(&channel, server, app)).await {
            Ok((sent, received)) => {
                debug!(%session, sent, received, "session finished");
            }
            Err(_) => {
                debug!(%session, "session deadline elapsed");
            }
        }
    }
}
