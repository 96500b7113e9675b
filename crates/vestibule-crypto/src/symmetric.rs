//! AES-256-CBC symmetric encryption with PKCS7 padding.
//!
//! All frame encryption on a connection uses one (key, IV) pair that
//! is negotiated during the handshake and never changes for the
//! connection's lifetime. Keys are generated from OS entropy and
//! zeroized on drop.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::rngs::OsRng;
use rand::RngCore;
use vestibule_types::{Result, VestibuleError};
use zeroize::Zeroize;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// AES block size in bytes. Ciphertext lengths are always a multiple
/// of this.
pub const BLOCK_LEN: usize = 16;

// ---------------------------------------------------------------------------
// SymmetricKey
// ---------------------------------------------------------------------------

/// 256-bit AES key negotiated for one connection.
///
/// Zeroized on drop. No `Display`, and `Debug` is redacted — key
/// material stays out of logs.
#[derive(Clone, Eq, PartialEq)]
pub struct SymmetricKey([u8; 32]);

impl SymmetricKey {
    /// Fixed byte length of a symmetric key.
    pub const LEN: usize = 32;

    /// Creates a [`SymmetricKey`] from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the underlying 32-byte array.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SymmetricKey(..)")
    }
}

// ---------------------------------------------------------------------------
// InitVector
// ---------------------------------------------------------------------------

/// 128-bit CBC initialization vector negotiated alongside the key.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct InitVector([u8; 16]);

impl InitVector {
    /// Fixed byte length of an initialization vector.
    pub const LEN: usize = 16;

    /// Creates an [`InitVector`] from raw bytes.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Returns the underlying 16-byte array.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl std::fmt::Debug for InitVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InitVector(..)")
    }
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Generates a fresh 256-bit key from OS entropy.
pub fn generate_key() -> SymmetricKey {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    SymmetricKey(bytes)
}

/// Generates a fresh 128-bit initialization vector from OS entropy.
pub fn generate_iv() -> InitVector {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    InitVector(bytes)
}

// ---------------------------------------------------------------------------
// Encrypt / Decrypt
// ---------------------------------------------------------------------------

/// Encrypts `plaintext` with AES-256-CBC, PKCS7-padded.
///
/// The output length is the plaintext length rounded up to the next
/// block boundary (a full extra block when already aligned).
pub fn encrypt(key: &SymmetricKey, iv: &InitVector, plaintext: &[u8]) -> Vec<u8> {
    Aes256CbcEnc::new(key.as_bytes().into(), iv.as_bytes().into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// Decrypts `ciphertext` with AES-256-CBC and strips the PKCS7 padding.
///
/// # Errors
///
/// Returns [`VestibuleError::Crypto`] if the ciphertext is empty, not
/// block-aligned, or fails unpadding (wrong key, wrong IV, tampered
/// data). Callers on the connection path treat this as fatal.
pub fn decrypt(key: &SymmetricKey, iv: &InitVector, ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
        return Err(VestibuleError::Crypto {
            reason: format!(
                "ciphertext length {} is not a positive multiple of the block size",
                ciphertext.len()
            ),
        });
    }

    Aes256CbcDec::new(key.as_bytes().into(), iv.as_bytes().into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| VestibuleError::Crypto {
            reason: "AES-CBC unpadding failed".into(),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
