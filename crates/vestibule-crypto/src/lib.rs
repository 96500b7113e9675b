//! Cryptographic primitives for the Vestibule check-in backend.
//!
//! This crate is the **sole** location for all cryptographic operations.
//! No other crate in the workspace may perform raw crypto directly.
//!
//! # Modules
//!
//! - [`symmetric`] — AES-256-CBC encryption/decryption, key and IV generation
//! - [`asymmetric`] — RSA PKCS#1 v1.5 encryption/decryption, key spec codec
//! - [`selfcheck`] — startup probe of every primitive the transport needs
//!
//! Per-operation failures (bad key, corrupt ciphertext, padding
//! violation) surface as `Err(VestibuleError::Crypto { .. })`. They are
//! never fatal inside this crate; callers on the connection path must
//! treat them as connection-fatal.

pub mod asymmetric;
pub mod selfcheck;
pub mod symmetric;
