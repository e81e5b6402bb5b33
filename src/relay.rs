//! Bidirectional relay orchestration
//!
//! One direction runs as its own task, the other inline on the session's
//! task. When the inline direction finishes, or the whole session is
//! cancelled (the agents enforce a deadline by dropping the relay future),
//! the spawned one is aborted and both connections drop, so neither
//! direction outlives the session.

use crate::channel::SecureChannel;
use crate::Result;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Aborts the wrapped task when dropped. Holding the spawned direction in
/// this guard ties its lifetime to the relay future itself, so cancelling
/// the session (deadline, caller shutdown) also stops the spawned copy.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Relay between the encrypted peer leg and the cleartext leg until either
/// side reaches end-of-stream or errors. Returns (bytes sent toward the
/// encrypted side, bytes received from it), both counted as plaintext.
pub async fn run(channel: &SecureChannel, encrypted: TcpStream, clear: TcpStream) -> (u64, u64) {
    let (mut enc_rd, mut enc_wr) = encrypted.into_split();
    let (mut clear_rd, mut clear_wr) = clear.into_split();

    let encode_ch = channel.clone();
    let mut encode = AbortOnDrop(tokio::spawn(async move {
        encode_ch.encode_copy(&mut clear_rd, &mut enc_wr).await
    }));

    let received = finish("decode", channel.decode_copy(&mut enc_rd, &mut clear_wr).await);

    // close-on-either-exit: the peer half-close that ended the inline
    // direction must also end the spawned one
    encode.0.abort();
    let sent = match (&mut encode.0).await {
        Ok(res) => finish("encode", res),
        Err(_) => 0,
    };

    (sent, received)
}

fn finish(direction: &str, res: Result<u64>) -> u64 {
    match res {
        Ok(n) => n,
        Err(e) if e.is_crypto() => {
            warn!("{} relay aborted on cipher failure: {}", direction, e);
            0
        }
        Err(e) => {
            debug!("{} relay ended: {}", direction, e);
            0
        }
    }
}
