//! Server configuration with sensible defaults.
//!
//! All operational parameters of the transport core are centralized
//! here. The daemon loads this from a JSON file and CLI flags; tests
//! construct it directly.

use serde::{Deserialize, Serialize};

use crate::{PublicKeySpec, Result, VestibuleError};

/// Transport-core configuration.
///
/// The anonymous kiosk public key (`applogin_pubk`) has no usable
/// default — deployments must provide it, and [`validate`]
/// (ServerConfig::validate) rejects a config without one.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub bind_addr: String,

    /// TCP port the listener binds to. Port 0 requests an ephemeral
    /// port (used by tests).
    pub port: u16,

    /// Per-read timeout in milliseconds, measured from the start of
    /// each read attempt. A connection whose peer stays silent longer
    /// than this is killed.
    #[serde(rename = "connection_timeout")]
    pub connection_timeout_ms: u64,

    /// RSA public key of the anonymous kiosk identity (client id 0),
    /// distributed out-of-band. The wire key keeps the historical
    /// capitalisation used by existing kiosk provisioning files.
    #[serde(rename = "applogin_pubK")]
    pub applogin_pubk: PublicKeySpec,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".into(),
            port: 4750,
            connection_timeout_ms: 5_000,
            applogin_pubk: PublicKeySpec::new("", ""),
        }
    }
}

impl ServerConfig {
    /// Validates all configuration values.
    ///
    /// Returns an error if any value is outside its acceptable range
    /// or the anonymous public key is missing.
    pub fn validate(&self) -> Result<()> {
        if self.bind_addr.trim().is_empty() {
            return Err(VestibuleError::Config {
                reason: "bind_addr must not be empty".into(),
            });
        }

        if self.connection_timeout_ms == 0 {
            return Err(VestibuleError::Config {
                reason: "connection_timeout must be greater than 0".into(),
            });
        }

        if !self.applogin_pubk.is_complete() {
            return Err(VestibuleError::Config {
                reason: "applogin_pubk must carry a base64 modulus and exponent".into(),
            });
        }

        Ok(())
    }
}
