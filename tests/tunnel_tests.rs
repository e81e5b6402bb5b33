//! End-to-end tunnel tests
//!
//! Runs both agents on loopback with an echo server standing in for the
//! real destination, and drives real SOCKS5 exchanges through them.

use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use veilsocks::agent::{LocalAgent, RemoteAgent};
use veilsocks::channel::SecureChannel;
use veilsocks::cipher::{AeadCipher, Cipher, TableCipher};
use veilsocks::socks::{NO_AUTH_REPLY, SUCCESS_REPLY};

/// Destination that echoes whatever it receives
async fn spawn_echo_destination() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let (mut conn, _) = match listener.accept().await {
                Ok(v) => v,
                Err(_) => break,
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                loop {
                    match conn.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if conn.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });
    addr
}

async fn spawn_remote_agent(cipher: Arc<dyn Cipher>) -> SocketAddr {
    let mut agent = RemoteAgent::new(cipher, "127.0.0.1:0".parse().unwrap()).unwrap();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    agent.set_on_listening(move |addr| {
        let _ = tx.send(addr);
    });
    tokio::spawn(async move {
        let _ = agent.listen().await;
    });
    rx.recv().await.unwrap()
}

async fn spawn_local_agent(cipher: Arc<dyn Cipher>, remote: SocketAddr) -> SocketAddr {
    let mut agent = LocalAgent::new(cipher, "127.0.0.1:0".parse().unwrap(), remote);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    agent.set_on_listening(move |addr| {
        let _ = tx.send(addr);
    });
    tokio::spawn(async move {
        let _ = agent.listen().await;
    });
    rx.recv().await.unwrap()
}

fn connect_request(dst: SocketAddr) -> Vec<u8> {
    let mut req = vec![0x05, 0x01, 0x00, 0x01];
    match dst {
        SocketAddr::V4(v4) => req.extend_from_slice(&v4.ip().octets()),
        SocketAddr::V6(_) => unreachable!("tests use IPv4 loopback"),
    }
    req.extend_from_slice(&dst.port().to_be_bytes());
    req
}

/// Speak the encrypted protocol straight to the remote agent, playing the
/// client agent's role by hand.
#[tokio::test]
async fn test_remote_agent_encrypted_handshake_and_echo() {
    let cipher: Arc<dyn Cipher> = Arc::new(TableCipher::generate());
    let channel = SecureChannel::new(cipher.clone());

    let dst = spawn_echo_destination().await;
    let server_addr = spawn_remote_agent(cipher).await;

    let mut conn = TcpStream::connect(server_addr).await.unwrap();

    channel
        .encode_write(&mut conn, &[0x05, 0x01, 0x00])
        .await
        .unwrap();
    let mut msg = BytesMut::new();
    channel.decode_read(&mut conn, &mut msg).await.unwrap();
    assert_eq!(&msg[..], NO_AUTH_REPLY);

    channel
        .encode_write(&mut conn, &connect_request(dst))
        .await
        .unwrap();
    msg.clear();
    channel.decode_read(&mut conn, &mut msg).await.unwrap();
    assert_eq!(&msg[..], SUCCESS_REPLY);

    channel
        .encode_write(&mut conn, b"echo through the tunnel")
        .await
        .unwrap();
    msg.clear();
    channel.decode_read(&mut conn, &mut msg).await.unwrap();
    assert_eq!(&msg[..], b"echo through the tunnel");
}

/// Full chain: plain SOCKS5 app -> local agent -> remote agent -> echo
async fn full_tunnel_roundtrip(cipher: Arc<dyn Cipher>) {
    let dst = spawn_echo_destination().await;
    let server_addr = spawn_remote_agent(cipher.clone()).await;
    let local_addr = spawn_local_agent(cipher, server_addr).await;

    let mut app = TcpStream::connect(local_addr).await.unwrap();

    app.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut reply = [0u8; 2];
    app.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, NO_AUTH_REPLY);

    app.write_all(&connect_request(dst)).await.unwrap();
    let mut reply = [0u8; 10];
    app.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, SUCCESS_REPLY);

    app.write_all(b"hello across the relay").await.unwrap();
    let mut echoed = [0u8; 22];
    app.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"hello across the relay");
}

#[tokio::test]
async fn test_full_tunnel_table_cipher() {
    full_tunnel_roundtrip(Arc::new(TableCipher::generate())).await;
}

#[tokio::test]
async fn test_full_tunnel_aead_cipher() {
    full_tunnel_roundtrip(Arc::new(AeadCipher::new(&[0xAB; 32]).unwrap())).await;
}

/// A client keyed differently from the server never gets past the
/// greeting; the server drops the session instead of replying.
#[tokio::test]
async fn test_mismatched_keys_tear_down_session() {
    fn rotation(offset: u8) -> Arc<dyn Cipher> {
        let table: Vec<u8> = (0..=255u8).map(|i| i.wrapping_add(offset)).collect();
        Arc::new(TableCipher::from_hex(&hex::encode(table)).unwrap())
    }

    let server_addr = spawn_remote_agent(rotation(1)).await;
    let channel = SecureChannel::new(rotation(2));

    let mut conn = TcpStream::connect(server_addr).await.unwrap();
    channel
        .encode_write(&mut conn, &[0x05, 0x01, 0x00])
        .await
        .unwrap();

    // the server aborts without a greeting reply; we observe EOF
    let mut buf = [0u8; 2];
    let n = conn.read(&mut buf).await.unwrap();
    assert_eq!(n, 0);
}

/// Once the session deadline fires the relay must go quiet in both
/// directions, even with both connections still open.
#[tokio::test]
async fn test_session_deadline_tears_down_relay() {
    let cipher: Arc<dyn Cipher> = Arc::new(TableCipher::generate());
    let channel = SecureChannel::new(cipher.clone());

    let dst = spawn_echo_destination().await;
    let mut agent = RemoteAgent::new(cipher, "127.0.0.1:0".parse().unwrap()).unwrap();
    agent.set_session_timeout(Duration::from_millis(300));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    agent.set_on_listening(move |addr| {
        let _ = tx.send(addr);
    });
    tokio::spawn(async move {
        let _ = agent.listen().await;
    });
    let server_addr = rx.recv().await.unwrap();

    let mut conn = TcpStream::connect(server_addr).await.unwrap();
    channel
        .encode_write(&mut conn, &[0x05, 0x01, 0x00])
        .await
        .unwrap();
    let mut msg = BytesMut::new();
    channel.decode_read(&mut conn, &mut msg).await.unwrap();
    channel
        .encode_write(&mut conn, &connect_request(dst))
        .await
        .unwrap();
    msg.clear();
    channel.decode_read(&mut conn, &mut msg).await.unwrap();
    assert_eq!(&msg[..], SUCCESS_REPLY);

    // the session works within the deadline
    channel.encode_write(&mut conn, b"before").await.unwrap();
    msg.clear();
    channel.decode_read(&mut conn, &mut msg).await.unwrap();
    assert_eq!(&msg[..], b"before");

    tokio::time::sleep(Duration::from_millis(800)).await;

    // after the deadline nothing is forwarded either way; the peer leg
    // observes EOF or a reset instead of an echo
    let _ = channel.encode_write(&mut conn, b"after").await;
    msg.clear();
    if let Ok(n) = channel.decode_read(&mut conn, &mut msg).await {
        assert_eq!(n, 0);
    }
    assert!(msg.is_empty());
}

#[tokio::test]
async fn test_aead_tampering_tears_down_session() {
    let cipher: Arc<dyn Cipher> = Arc::new(AeadCipher::new(&[0x11; 16]).unwrap());
    let channel = SecureChannel::new(cipher.clone());
    let server_addr = spawn_remote_agent(cipher).await;

    let mut conn = TcpStream::connect(server_addr).await.unwrap();

    // a correctly framed greeting with one ciphertext byte flipped
    let mut wire = channel.cipher().encrypt(&[0x05, 0x01, 0x00]).unwrap();
    let last = wire.len() - 1;
    wire[last] ^= 0x01;
    conn.write_all(&(wire.len() as u16).to_be_bytes())
        .await
        .unwrap();
    conn.write_all(&wire).await.unwrap();

    let mut buf = [0u8; 2];
    let n = conn.read(&mut buf).await.unwrap();
    assert_eq!(n, 0);
}
