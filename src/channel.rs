//! Secure channel primitives
//!
//! `SecureChannel` binds a shared cipher to the encrypt-then-write and
//! read-then-decrypt operations and to the continuous copy loops that the
//! relay runs in both directions.
//!
//! Wire framing depends on the cipher. The length-preserving table cipher
//! writes the transformed bytes as-is, so one raw read is one logical
//! message. The AEAD variant changes message length, so each message is
//! framed as a 2-byte big-endian ciphertext length followed by the
//! ciphertext; callers always consume the decrypted length, never the raw
//! byte count.

use crate::cipher::Cipher;
use crate::{Error, Result, BUF_SIZE};
use bytes::BytesMut;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Pairs a connection with a cipher. Cheap to clone; all clones share the
/// same read-only cipher.
#[derive(Clone)]
pub struct SecureChannel {
    cipher: Arc<dyn Cipher>,
}

impl SecureChannel {
    pub fn new(cipher: Arc<dyn Cipher>) -> Self {
        SecureChannel { cipher }
    }

    pub fn cipher(&self) -> &Arc<dyn Cipher> {
        &self.cipher
    }

    fn framed(&self) -> bool {
        self.cipher.overhead() > 0
    }

    /// Encrypt the full buffer and write its wire form. Returns the
    /// plaintext length; short writes surface as I/O errors.
    pub async fn encode_write<W>(&self, dst: &mut W, payload: &[u8]) -> Result<usize>
    where
        W: AsyncWrite + Unpin,
    {
        let wire = self.cipher.encrypt(payload)?;
        if self.framed() {
            let len = u16::try_from(wire.len()).map_err(|_| {
                Error::protocol(format!("message too large to frame: {} bytes", wire.len()))
            })?;
            dst.write_all(&len.to_be_bytes()).await?;
        }
        dst.write_all(&wire).await?;
        Ok(payload.len())
    }

    /// Read one message from the connection and append its plaintext to
    /// `out`. Returns the decrypted length; 0 means clean end-of-stream.
    pub async fn decode_read<R>(&self, src: &mut R, out: &mut BytesMut) -> Result<usize>
    where
        R: AsyncRead + Unpin,
    {
        let wire = if self.framed() {
            let mut len = [0u8; 2];
            // EOF before the first header byte is a clean close; a torn
            // header is not.
            if src.read(&mut len[..1]).await? == 0 {
                return Ok(0);
            }
            src.read_exact(&mut len[1..]).await?;
            let mut frame = vec![0u8; u16::from_be_bytes(len) as usize];
            src.read_exact(&mut frame).await?;
            frame
        } else {
            let mut buf = vec![0u8; BUF_SIZE];
            let n = src.read(&mut buf).await?;
            if n == 0 {
                return Ok(0);
            }
            buf.truncate(n);
            buf
        };

        let plain = self.cipher.decrypt(&wire)?;
        let n = plain.len();
        out.extend_from_slice(&plain);
        Ok(n)
    }

    /// Read raw bytes from `src`, encrypt, write to `dst` until `src`
    /// reaches end-of-stream. Returns the plaintext bytes forwarded.
    pub async fn encode_copy<R, W>(&self, src: &mut R, dst: &mut W) -> Result<u64>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buf = [0u8; BUF_SIZE];
        let mut total: u64 = 0;
        loop {
            let n = src.read(&mut buf).await?;
            if n == 0 {
                return Ok(total);
            }
            self.encode_write(dst, &buf[..n]).await?;
            total += n as u64;
        }
    }

    /// Read encrypted messages from `src`, decrypt, write the plaintext to
    /// `dst` until `src` reaches end-of-stream. A decrypt failure aborts
    /// immediately. Returns the plaintext bytes forwarded.
    pub async fn decode_copy<R, W>(&self, src: &mut R, dst: &mut W) -> Result<u64>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut out = BytesMut::with_capacity(BUF_SIZE);
        let mut total: u64 = 0;
        loop {
            let n = self.decode_read(src, &mut out).await?;
            if n == 0 {
                return Ok(total);
            }
            dst.write_all(&out).await?;
            out.clear();
            total += n as u64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::{AeadCipher, TableCipher};
    use tokio::io::duplex;

    fn table_channel() -> SecureChannel {
        SecureChannel::new(Arc::new(TableCipher::generate()))
    }

    fn aead_channel() -> SecureChannel {
        SecureChannel::new(Arc::new(AeadCipher::new(&[9u8; 32]).unwrap()))
    }

    #[tokio::test]
    async fn test_write_read_roundtrip_table() {
        let ch = table_channel();
        let (mut a, mut b) = duplex(4096);

        let n = ch.encode_write(&mut a, b"ping").await.unwrap();
        assert_eq!(n, 4);

        let mut out = BytesMut::new();
        let n = ch.decode_read(&mut b, &mut out).await.unwrap();
        assert_eq!(n, 4);
        assert_eq!(&out[..], b"ping");
    }

    #[tokio::test]
    async fn test_write_read_roundtrip_aead() {
        let ch = aead_channel();
        let (mut a, mut b) = duplex(4096);

        ch.encode_write(&mut a, b"first").await.unwrap();
        ch.encode_write(&mut a, b"second message").await.unwrap();

        let mut out = BytesMut::new();
        // framing keeps message boundaries despite both frames being
        // buffered back to back
        assert_eq!(ch.decode_read(&mut b, &mut out).await.unwrap(), 5);
        assert_eq!(&out[..], b"first");
        out.clear();
        assert_eq!(ch.decode_read(&mut b, &mut out).await.unwrap(), 14);
        assert_eq!(&out[..], b"second message");
    }

    #[tokio::test]
    async fn test_decode_read_clean_eof() {
        for ch in [table_channel(), aead_channel()] {
            let (a, mut b) = duplex(64);
            drop(a);
            let mut out = BytesMut::new();
            assert_eq!(ch.decode_read(&mut b, &mut out).await.unwrap(), 0);
        }
    }

    #[tokio::test]
    async fn test_decode_read_rejects_tampered_frame() {
        let ch = aead_channel();
        let (mut a, mut b) = duplex(4096);

        let mut wire = ch.cipher().encrypt(b"payload").unwrap();
        wire[3] ^= 0xFF;
        a.write_all(&(wire.len() as u16).to_be_bytes()).await.unwrap();
        a.write_all(&wire).await.unwrap();

        let mut out = BytesMut::new();
        let err = ch.decode_read(&mut b, &mut out).await.unwrap_err();
        assert!(err.is_crypto());
    }

    #[tokio::test]
    async fn test_copy_loops_end_to_end() {
        for ch in [table_channel(), aead_channel()] {
            // payload larger than one copy buffer
            let payload: Vec<u8> = (0..3000u32).map(|i| i as u8).collect();

            let (mut src_w, mut src_r) = duplex(8192);
            let (mut wire_w, mut wire_r) = duplex(8192);
            let (mut dst_w, mut dst_r) = duplex(8192);

            src_w.write_all(&payload).await.unwrap();
            drop(src_w);

            let sent = ch.encode_copy(&mut src_r, &mut wire_w).await.unwrap();
            assert_eq!(sent, payload.len() as u64);
            drop(wire_w);

            let received = ch.decode_copy(&mut wire_r, &mut dst_w).await.unwrap();
            assert_eq!(received, payload.len() as u64);
            drop(dst_w);

            let mut out = Vec::new();
            dst_r.read_to_end(&mut out).await.unwrap();
            assert_eq!(out, payload);
        }
    }
}
