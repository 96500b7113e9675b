//! RSA PKCS#1 v1.5 encryption and the public-key spec codec.
//!
//! The handshake encrypts exactly one 48-byte blob (key ‖ IV) under
//! the client's public key. Keys are distributed out-of-band as a
//! [`PublicKeySpec`] — base64 big-endian modulus and exponent — the
//! same shape the kiosk app and admin clients store.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::rngs::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use vestibule_types::{PublicKeySpec, Result, VestibuleError};

/// PKCS#1 v1.5 reserves 11 bytes of every modulus-sized block for
/// padding; plaintext must fit in what remains.
const PKCS1_OVERHEAD: usize = 11;

// ---------------------------------------------------------------------------
// Key spec codec
// ---------------------------------------------------------------------------

/// Builds a usable RSA public key from its out-of-band spec.
///
/// Tolerates the leading sign byte some encoders (notably Java's
/// `BigInteger.toByteArray`) prepend to the modulus.
///
/// # Errors
///
/// Returns [`VestibuleError::Crypto`] if either component is not valid
/// base64 or the resulting numbers do not form a usable key.
pub fn public_key_from_spec(spec: &PublicKeySpec) -> Result<RsaPublicKey> {
    let modulus = decode_component(&spec.modulus, "modulus")?;
    let exponent = decode_component(&spec.exponent, "exponent")?;

    RsaPublicKey::new(
        BigUint::from_bytes_be(&modulus),
        BigUint::from_bytes_be(&exponent),
    )
    .map_err(|e| VestibuleError::Crypto {
        reason: format!("unusable RSA public key: {e}"),
    })
}

/// Encodes a public key back into its wire/storage spec.
pub fn spec_from_public_key(key: &RsaPublicKey) -> PublicKeySpec {
    PublicKeySpec::new(
        BASE64.encode(key.n().to_bytes_be()),
        BASE64.encode(key.e().to_bytes_be()),
    )
}

fn decode_component(base64: &str, which: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(base64.trim())
        .map_err(|e| VestibuleError::Crypto {
            reason: format!("public key {which} is not valid base64: {e}"),
        })
}

// ---------------------------------------------------------------------------
// Encrypt / Decrypt
// ---------------------------------------------------------------------------

/// Encrypts `data` under `key` with RSA PKCS#1 v1.5.
///
/// The ciphertext length always equals the modulus size in bytes —
/// the handshake relies on this to send it without a length prefix.
///
/// # Errors
///
/// Returns [`VestibuleError::Crypto`] if the plaintext exceeds the
/// modulus capacity or the operation fails.
pub fn encrypt(key: &RsaPublicKey, data: &[u8]) -> Result<Vec<u8>> {
    if data.len() + PKCS1_OVERHEAD > key.size() {
        return Err(VestibuleError::Crypto {
            reason: format!(
                "plaintext of {} bytes exceeds the {}-byte RSA block",
                data.len(),
                key.size()
            ),
        });
    }

    key.encrypt(&mut OsRng, Pkcs1v15Encrypt, data)
        .map_err(|e| VestibuleError::Crypto {
            reason: format!("RSA encryption failed: {e}"),
        })
}

/// Decrypts a modulus-sized ciphertext with the private key.
///
/// # Errors
///
/// Returns [`VestibuleError::Crypto`] on any padding or key failure.
pub fn decrypt(key: &RsaPrivateKey, data: &[u8]) -> Result<Vec<u8>> {
    key.decrypt(Pkcs1v15Encrypt, data)
        .map_err(|e| VestibuleError::Crypto {
            reason: format!("RSA decryption failed: {e}"),
        })
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Generates a fresh RSA keypair and the matching public spec.
///
/// Used by provisioning tooling and tests; the server itself never
/// generates asymmetric keys at request time.
pub fn generate_keypair(bits: usize) -> Result<(RsaPrivateKey, PublicKeySpec)> {
    let private = RsaPrivateKey::new(&mut OsRng, bits).map_err(|e| VestibuleError::Crypto {
        reason: format!("RSA key generation failed: {e}"),
    })?;
    let spec = spec_from_public_key(&private.to_public_key());
    Ok((private, spec))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // 1024-bit keys keep the test suite fast; production deployments
    // provision larger keys out-of-band.
    const TEST_BITS: usize = 1024;

    #[test]
    fn encrypt_decrypt_roundtrip() -> std::result::Result<(), VestibuleError> {
        let (private, spec) = generate_keypair(TEST_BITS)?;
        let public = public_key_from_spec(&spec)?;

        let plaintext = [0x42u8; 48];
        let ciphertext = encrypt(&public, &plaintext)?;
        assert_eq!(ciphertext.len(), public.size());

        let decrypted = decrypt(&private, &ciphertext)?;
        assert_eq!(decrypted.as_slice(), plaintext.as_slice());
        Ok(())
    }

    #[test]
    fn spec_roundtrip() -> std::result::Result<(), VestibuleError> {
        let (private, spec) = generate_keypair(TEST_BITS)?;
        let rebuilt = public_key_from_spec(&spec)?;
        assert_eq!(rebuilt, private.to_public_key());
        assert_eq!(spec_from_public_key(&rebuilt), spec);
        Ok(())
    }

    #[test]
    fn sign_byte_prefixed_modulus_accepted() -> std::result::Result<(), VestibuleError> {
        // Java's BigInteger.toByteArray() prepends 0x00 when the top
        // bit of the modulus is set; the parser must tolerate it.
        let (_, spec) = generate_keypair(TEST_BITS)?;
        let mut raw = BASE64.decode(&spec.modulus).expect("own encoding");
        raw.insert(0, 0x00);
        let padded = PublicKeySpec::new(BASE64.encode(&raw), spec.exponent.clone());

        assert_eq!(
            public_key_from_spec(&padded)?,
            public_key_from_spec(&spec)?
        );
        Ok(())
    }

    #[test]
    fn invalid_base64_rejected() {
        let spec = PublicKeySpec::new("not-base64!!", "AQAB");
        assert!(public_key_from_spec(&spec).is_err());
    }

    #[test]
    fn oversized_plaintext_rejected() -> std::result::Result<(), VestibuleError> {
        let (_, spec) = generate_keypair(TEST_BITS)?;
        let public = public_key_from_spec(&spec)?;
        let too_big = vec![0u8; public.size()];
        assert!(encrypt(&public, &too_big).is_err());
        Ok(())
    }

    #[test]
    fn wrong_private_key_fails_decrypt() -> std::result::Result<(), VestibuleError> {
        let (_, spec) = generate_keypair(TEST_BITS)?;
        let (other_private, _) = generate_keypair(TEST_BITS)?;
        let public = public_key_from_spec(&spec)?;

        let ciphertext = encrypt(&public, b"blob")?;
        assert!(decrypt(&other_private, &ciphertext).is_err());
        Ok(())
    }
}
