//! Encrypted frame codec on top of [`FramedChannel`].
//!
//! After the handshake, every message in either direction is a frame:
//! `[2-byte length, low byte first]` + AES-CBC ciphertext of
//! `8-byte session nonce ‖ UTF-8 JSON`. The one exception is the
//! handshake response itself, which is a raw RSA block with no length
//! prefix (its length is implicit in the modulus size).
//!
//! The session nonce is the tag the client chose during the
//! handshake; it binds every frame to this session and is compared in
//! constant time. It is not replay protection.

use serde_json::Value;
use vestibule_crypto::symmetric::{self, InitVector, SymmetricKey};
use vestibule_types::{Result, SessionNonce, VestibuleError};

use crate::framed::FramedChannel;

/// Hard ceiling on one frame's ciphertext: what the 2-byte length
/// field can carry. Exceeding it is a fatal protocol error.
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

// ---------------------------------------------------------------------------
// SessionSecret
// ---------------------------------------------------------------------------

/// Negotiated key material for one connection.
///
/// Set exactly once, immediately after the handshake, and never
/// replaced for the connection's lifetime.
struct SessionSecret {
    key: SymmetricKey,
    iv: InitVector,
    nonce: SessionNonce,
}

// ---------------------------------------------------------------------------
// SecureChannel
// ---------------------------------------------------------------------------

/// Frame-level view of one client connection.
pub struct SecureChannel {
    framed: FramedChannel,
    secret: Option<SessionSecret>,
}

impl SecureChannel {
    /// Wraps a framed channel; no secret is installed yet.
    pub fn new(framed: FramedChannel) -> Self {
        Self {
            framed,
            secret: None,
        }
    }

    /// Connection id for log correlation.
    pub fn conn_id(&self) -> u64 {
        self.framed.conn_id()
    }

    /// Reads the client hello: one id byte and the 8-byte session
    /// nonce.
    pub fn read_client_hello(&mut self) -> Result<(u8, SessionNonce)> {
        let client_id = self.framed.read_u8()?;
        let raw = self.framed.read_exact(SessionNonce::LEN)?;
        let mut nonce = [0u8; SessionNonce::LEN];
        nonce.copy_from_slice(&raw);
        Ok((client_id, SessionNonce::from_bytes(nonce)))
    }

    /// Writes the unframed handshake response (raw RSA ciphertext).
    pub fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        self.framed.write_all(data)?;
        self.framed.flush()
    }

    /// Installs the negotiated key material.
    ///
    /// # Errors
    ///
    /// Returns [`VestibuleError::Protocol`] if a secret was already
    /// installed — the key/IV must not change mid-connection.
    pub fn install_secret(
        &mut self,
        key: SymmetricKey,
        iv: InitVector,
        nonce: SessionNonce,
    ) -> Result<()> {
        if self.secret.is_some() {
            return Err(VestibuleError::Protocol {
                reason: "session secret installed twice".into(),
            });
        }
        self.secret = Some(SessionSecret { key, iv, nonce });
        Ok(())
    }

    /// Encrypts and sends one frame.
    ///
    /// # Errors
    ///
    /// [`VestibuleError::Protocol`] if no secret is installed or the
    /// ciphertext exceeds [`MAX_FRAME_LEN`] (the channel is killed);
    /// transport errors pass through from the write.
    pub fn send_frame(&mut self, payload: &Value) -> Result<()> {
        let secret = self.secret.as_ref().ok_or_else(|| VestibuleError::Protocol {
            reason: "send before handshake completed".into(),
        })?;

        let body = serde_json::to_vec(payload).map_err(|e| VestibuleError::Protocol {
            reason: format!("response serialization failed: {e}"),
        })?;

        let mut plaintext = Vec::with_capacity(SessionNonce::LEN + body.len());
        plaintext.extend_from_slice(secret.nonce.as_bytes());
        plaintext.extend_from_slice(&body);

        let ciphertext = symmetric::encrypt(&secret.key, &secret.iv, &plaintext);

        if ciphertext.len() > MAX_FRAME_LEN {
            self.framed.kill();
            return Err(VestibuleError::Protocol {
                reason: format!(
                    "frame of {} bytes exceeds the {MAX_FRAME_LEN}-byte ceiling",
                    ciphertext.len()
                ),
            });
        }

        let len = ciphertext.len() as u16;
        self.framed.write_all(&[(len & 0xFF) as u8, (len >> 8) as u8])?;
        self.framed.write_all(&ciphertext)?;
        self.framed.flush()
    }

    /// Receives and decrypts one frame, verifying and stripping the
    /// leading session nonce.
    ///
    /// Any failure — timeout, I/O, decrypt, tag mismatch, bad JSON —
    /// kills the channel before the error is returned.
    pub fn recv_frame(&mut self) -> Result<Value> {
        let secret = self.secret.as_ref().ok_or_else(|| VestibuleError::Protocol {
            reason: "receive before handshake completed".into(),
        })?;
        let key = secret.key.clone();
        let iv = secret.iv;
        let nonce = secret.nonce;

        let low = self.framed.read_u8()?;
        let high = self.framed.read_u8()?;
        let len = usize::from(low) | (usize::from(high) << 8);

        let ciphertext = self.framed.read_exact(len)?;

        let plaintext = match symmetric::decrypt(&key, &iv, &ciphertext) {
            Ok(p) => p,
            Err(e) => {
                self.framed.kill();
                return Err(e);
            }
        };

        if plaintext.len() < SessionNonce::LEN {
            self.framed.kill();
            return Err(VestibuleError::Protocol {
                reason: "frame shorter than the session tag".into(),
            });
        }

        let (tag, body) = plaintext.split_at(SessionNonce::LEN);
        if !constant_time_eq(tag, nonce.as_bytes()) {
            self.framed.kill();
            return Err(VestibuleError::Protocol {
                reason: "session tag mismatch".into(),
            });
        }

        match serde_json::from_slice(body) {
            Ok(value) => Ok(value),
            Err(e) => {
                self.framed.kill();
                Err(VestibuleError::Protocol {
                    reason: format!("frame is not valid JSON: {e}"),
                })
            }
        }
    }

    /// Kills the underlying channel. Idempotent.
    pub fn kill(&mut self) {
        self.framed.kill();
    }

    /// Returns `true` once the channel has been killed.
    pub fn is_killed(&self) -> bool {
        self.framed.is_killed()
    }
}

// ---------------------------------------------------------------------------
// Constant-time comparison
// ---------------------------------------------------------------------------

/// Compares two byte slices in constant time.
///
/// Returns `true` iff `a` and `b` are equal in both length and
/// content. The comparison time depends only on the lengths, not on
/// the content, preventing timing side-channels on the session tag.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
