//! Core shared types for the Vestibule check-in backend.
//!
//! This crate defines all fundamental types used across the workspace.
//! No other crate should define shared types — everything lives here.

pub mod config;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Permissions
// ---------------------------------------------------------------------------

/// Permission bitmask for a connected principal.
///
/// Each set bit denotes one capability. Handlers declare the bits that
/// may access them; a principal passes the gate when its own bitmask
/// intersects the required one.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permissions(u32);

impl Permissions {
    /// Anonymous kiosk login. Not stored for any principal; assumed for
    /// every connection that did not authenticate as an administrator.
    pub const DEFAULT_LOGIN: Permissions = Permissions(0b1);

    /// Verified administrator, allowed to access and modify critical
    /// visitor information.
    pub const ADMIN: Permissions = Permissions(0b10);

    /// Allowed to reset another administrator's key and account.
    pub const RESET_ADMIN: Permissions = Permissions(0b100);

    /// An empty bitmask (no capabilities).
    pub const NONE: Permissions = Permissions(0);

    /// Creates a bitmask from raw bits.
    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Returns `true` if any bit is shared with `required`.
    ///
    /// This is the permission-gate predicate: a check against a
    /// required mask passes iff the two masks intersect.
    pub fn intersects(&self, required: Permissions) -> bool {
        self.0 & required.0 != 0
    }

    /// Returns `true` if no bit is set.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for Permissions {
    type Output = Permissions;

    fn bitor(self, rhs: Permissions) -> Permissions {
        Permissions(self.0 | rhs.0)
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.intersects(Self::DEFAULT_LOGIN) {
            names.push("default_login");
        }
        if self.intersects(Self::ADMIN) {
            names.push("admin");
        }
        if self.intersects(Self::RESET_ADMIN) {
            names.push("reset_admin");
        }
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

// ---------------------------------------------------------------------------
// SessionNonce
// ---------------------------------------------------------------------------

/// 8-byte opaque nonce chosen by the client during the handshake.
///
/// Prefixed verbatim to the plaintext of every frame on the connection
/// as a session-binding tag. Lives only in connection-local memory and
/// must never be logged or persisted, which is why the `Debug`
/// rendering is redacted and no `Display` exists.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct SessionNonce([u8; 8]);

impl SessionNonce {
    /// Fixed byte length of a session nonce.
    pub const LEN: usize = 8;

    /// Creates a [`SessionNonce`] from raw bytes.
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Returns the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl fmt::Debug for SessionNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Redacted: nonce bytes stay out of logs.
        write!(f, "SessionNonce(..)")
    }
}

// ---------------------------------------------------------------------------
// Timestamp
// ---------------------------------------------------------------------------

/// UTC timestamp in ISO 8601 format.
///
/// All timestamps use UTC so auth-code expiry comparisons are
/// deterministic regardless of the appliance's timezone.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a `Timestamp` representing the current UTC time.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a `Timestamp` from a `DateTime<Utc>`.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the inner `DateTime<Utc>`.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Returns `true` if this timestamp lies in the past.
    pub fn is_past(&self) -> bool {
        self.0 < Utc::now()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl FromStr for Timestamp {
    type Err = VestibuleError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let dt = DateTime::parse_from_rfc3339(s)
            .map_err(|e| VestibuleError::Config {
                reason: format!("invalid ISO 8601 timestamp: {e}"),
            })?
            .with_timezone(&Utc);
        Ok(Self(dt))
    }
}

// ---------------------------------------------------------------------------
// PublicKeySpec
// ---------------------------------------------------------------------------

/// JSON-encodable RSA public key: base64 big-endian modulus + exponent.
///
/// This is the out-of-band key distribution format — admin keys are
/// stored in this shape by the directory collaborator, and the
/// anonymous kiosk key arrives in it via configuration. The crypto
/// crate converts between this spec and usable key material.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PublicKeySpec {
    /// Base64-encoded big-endian modulus bytes.
    pub modulus: String,
    /// Base64-encoded big-endian public exponent bytes.
    pub exponent: String,
}

impl PublicKeySpec {
    /// Creates a spec from already-encoded components.
    pub fn new(modulus: impl Into<String>, exponent: impl Into<String>) -> Self {
        Self {
            modulus: modulus.into(),
            exponent: exponent.into(),
        }
    }

    /// Returns `true` if both components are present.
    pub fn is_complete(&self) -> bool {
        !self.modulus.trim().is_empty() && !self.exponent.trim().is_empty()
    }
}

// ---------------------------------------------------------------------------
// AdminIdentity
// ---------------------------------------------------------------------------

/// Resolved administrative principal bound to a connection.
///
/// Loaded once at handshake time as an immutable snapshot. Mutations
/// (e.g. issuing a new auth code) go through the directory
/// collaborator as a fresh write; the snapshot itself is never shared
/// mutably across threads.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdminIdentity {
    /// Principal id. The wire carries it as a single byte, so valid
    /// administrator ids occupy 1–255 (0 is the anonymous kiosk).
    pub id: u8,

    /// Capability bitmask for this principal.
    pub permissions: Permissions,

    /// Currently issued one-time auth code, if any.
    pub auth_code: Option<i64>,

    /// Expiry of the issued auth code, if any.
    pub auth_code_expiry: Option<Timestamp>,

    /// Frozen accounts fail every admin gate until thawed.
    pub frozen: bool,

    /// The principal's RSA public key, distributed out-of-band.
    pub public_key: PublicKeySpec,
}

// ---------------------------------------------------------------------------
// VestibuleError
// ---------------------------------------------------------------------------

/// Central error type for the Vestibule backend.
///
/// All crates in the workspace convert their internal errors into
/// variants of this enum, ensuring a unified error handling surface.
#[derive(Debug, Error)]
pub enum VestibuleError {
    /// A cryptographic operation failed (key parse, encrypt, decrypt,
    /// padding violation). Always connection-fatal at the caller.
    #[error("crypto error: {reason}")]
    Crypto {
        /// Human-readable description of the cryptographic failure.
        reason: String,
    },

    /// An I/O operation on the socket failed.
    #[error("transport error: {reason}")]
    Transport {
        /// Human-readable description of the transport failure.
        reason: String,
    },

    /// A read attempt exceeded the configured per-read timeout.
    #[error("read timed out: {reason}")]
    Timeout {
        /// Which read gave up, and after how long.
        reason: String,
    },

    /// A wire-level protocol violation (malformed JSON, nonce
    /// mismatch, oversized frame, bad framing).
    #[error("protocol error: {reason}")]
    Protocol {
        /// Human-readable description of the protocol violation.
        reason: String,
    },

    /// Authentication failed during the handshake (unknown principal,
    /// unusable public key). Deliberately collapsed to one generic
    /// failure on the wire so the client learns nothing about which
    /// step rejected it.
    #[error("authentication failed: {reason}")]
    Auth {
        /// Internal description; never sent to the client.
        reason: String,
    },

    /// A configuration value is invalid or missing.
    #[error("config error: {reason}")]
    Config {
        /// Human-readable description of the configuration problem.
        reason: String,
    },

    /// The directory collaborator failed.
    #[error("storage error: {reason}")]
    Storage {
        /// Human-readable description of the storage failure.
        reason: String,
    },
}

/// Convenience result type using [`VestibuleError`].
pub type Result<T> = std::result::Result<T, VestibuleError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_bits_match_wire_values() {
        assert_eq!(Permissions::DEFAULT_LOGIN.bits(), 0b1);
        assert_eq!(Permissions::ADMIN.bits(), 0b10);
        assert_eq!(Permissions::RESET_ADMIN.bits(), 0b100);
    }

    #[test]
    fn permissions_intersect() {
        let granted = Permissions::ADMIN | Permissions::RESET_ADMIN;
        assert!(granted.intersects(Permissions::ADMIN));
        assert!(granted.intersects(Permissions::RESET_ADMIN));
        assert!(!granted.intersects(Permissions::DEFAULT_LOGIN));
    }

    #[test]
    fn empty_permissions_intersect_nothing() {
        assert!(!Permissions::NONE.intersects(Permissions::ADMIN));
        assert!(Permissions::NONE.is_empty());
    }

    #[test]
    fn permissions_display_names() {
        assert_eq!(Permissions::NONE.to_string(), "none");
        assert_eq!(
            (Permissions::ADMIN | Permissions::RESET_ADMIN).to_string(),
            "admin|reset_admin"
        );
    }

    #[test]
    fn session_nonce_debug_is_redacted() {
        let nonce = SessionNonce::from_bytes([0xAB; 8]);
        let rendered = format!("{nonce:?}");
        assert!(!rendered.contains("AB"));
        assert!(!rendered.contains("171"));
    }

    #[test]
    fn session_nonce_roundtrip() {
        let bytes = [1, 2, 3, 4, 5, 6, 7, 8];
        let nonce = SessionNonce::from_bytes(bytes);
        assert_eq!(nonce.as_bytes(), &bytes);
    }

    #[test]
    fn timestamp_now_parses_back() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let ts = Timestamp::now();
        let parsed: Timestamp = ts.to_string().parse()?;
        assert_eq!(ts.as_datetime(), parsed.as_datetime());
        Ok(())
    }

    #[test]
    fn timestamp_ordering() {
        let early = Timestamp::from_datetime(
            DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        );
        let late = Timestamp::now();
        assert!(early < late);
        assert!(early.is_past());
    }

    #[test]
    fn public_key_spec_completeness() {
        assert!(PublicKeySpec::new("AQAB", "AQAB").is_complete());
        assert!(!PublicKeySpec::new("", "AQAB").is_complete());
        assert!(!PublicKeySpec::new("AQAB", "  ").is_complete());
    }

    #[test]
    fn admin_identity_serde_roundtrip() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let admin = AdminIdentity {
            id: 7,
            permissions: Permissions::ADMIN,
            auth_code: Some(123456),
            auth_code_expiry: Some(Timestamp::now()),
            frozen: false,
            public_key: PublicKeySpec::new("bW9k", "AQAB"),
        };
        let json = serde_json::to_string(&admin)?;
        let parsed: AdminIdentity = serde_json::from_str(&json)?;
        assert_eq!(parsed.id, 7);
        assert_eq!(parsed.permissions, Permissions::ADMIN);
        assert_eq!(parsed.auth_code, Some(123456));
        assert!(!parsed.frozen);
        Ok(())
    }

    #[test]
    fn error_display() {
        let err = VestibuleError::Auth {
            reason: "unknown principal".into(),
        };
        assert!(err.to_string().contains("unknown principal"));
    }
}
