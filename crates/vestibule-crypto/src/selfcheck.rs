//! Startup self-check of the crypto stack.
//!
//! Probes every primitive the transport depends on before the
//! listener binds: symmetric round-trip, random generator
//! distinctness, and an asymmetric encryption against the configured
//! anonymous key. A deployment whose crypto environment is broken
//! must fail fast here rather than per-connection.

use rsa::traits::PublicKeyParts;
use rsa::RsaPublicKey;
use vestibule_types::{Result, VestibuleError};

use crate::{asymmetric, symmetric};

/// Runs all startup probes.
///
/// # Errors
///
/// Returns [`VestibuleError::Crypto`] naming the failing primitive.
/// The process must not accept connections after a failure.
pub fn startup_self_check(anon_key: &RsaPublicKey) -> Result<()> {
    probe_symmetric()?;
    probe_randomness()?;
    probe_asymmetric(anon_key)?;
    Ok(())
}

/// Fixed-input AES-CBC round-trip.
fn probe_symmetric() -> Result<()> {
    let key = symmetric::SymmetricKey::from_bytes([0x24; 32]);
    let iv = symmetric::InitVector::from_bytes([0x42; 16]);
    let probe = b"vestibule crypto self-check";

    let ciphertext = symmetric::encrypt(&key, &iv, probe);
    let decrypted = symmetric::decrypt(&key, &iv, &ciphertext)?;

    if decrypted.as_slice() != probe.as_slice() {
        return Err(VestibuleError::Crypto {
            reason: "self-check: AES round-trip produced different plaintext".into(),
        });
    }
    Ok(())
}

/// Two draws from the generator must differ; a stuck entropy source
/// would otherwise hand every connection the same key.
fn probe_randomness() -> Result<()> {
    if symmetric::generate_key() == symmetric::generate_key() {
        return Err(VestibuleError::Crypto {
            reason: "self-check: random generator returned identical keys".into(),
        });
    }
    Ok(())
}

/// Encrypts a handshake-sized blob under the anonymous key and checks
/// the ciphertext is exactly one RSA block.
fn probe_asymmetric(anon_key: &RsaPublicKey) -> Result<()> {
    let blob = [0u8; symmetric::SymmetricKey::LEN + symmetric::InitVector::LEN];
    let ciphertext = asymmetric::encrypt(anon_key, &blob)?;

    if ciphertext.len() != anon_key.size() {
        return Err(VestibuleError::Crypto {
            reason: format!(
                "self-check: RSA ciphertext is {} bytes, expected the {}-byte modulus",
                ciphertext.len(),
                anon_key.size()
            ),
        });
    }
    Ok(())
}
