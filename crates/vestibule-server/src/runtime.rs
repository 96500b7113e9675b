//! Shared runtime dependencies, built once at startup.
//!
//! One [`ServerContext`] is constructed by the daemon and passed by
//! reference into the listener and every connection — explicit
//! dependency injection instead of process-wide singletons. The
//! anonymous kiosk key is parsed here so a bad configuration fails
//! before the listener binds.

use std::sync::Arc;
use std::time::Duration;

use rsa::RsaPublicKey;
use vestibule_crypto::asymmetric;
use vestibule_directory::Directory;
use vestibule_types::config::ServerConfig;
use vestibule_types::Result;

use crate::handler::HandlerRegistry;

/// Immutable bundle of everything the transport needs at runtime.
pub struct ServerContext {
    /// Validated transport configuration.
    pub config: ServerConfig,
    /// The principal-directory collaborator.
    pub directory: Arc<dyn Directory>,
    /// Endpoint registry; read-only after construction.
    pub registry: HandlerRegistry,
    /// Pre-parsed anonymous kiosk key (client id 0).
    anon_key: RsaPublicKey,
}

impl ServerContext {
    /// Validates the config, parses the anonymous key, and bundles
    /// the dependencies.
    ///
    /// # Errors
    ///
    /// [`vestibule_types::VestibuleError::Config`] for an invalid
    /// config, [`vestibule_types::VestibuleError::Crypto`] for an
    /// unusable anonymous key.
    pub fn new(
        config: ServerConfig,
        directory: Arc<dyn Directory>,
        registry: HandlerRegistry,
    ) -> Result<Self> {
        config.validate()?;
        let anon_key = asymmetric::public_key_from_spec(&config.applogin_pubk)?;
        Ok(Self {
            config,
            directory,
            registry,
            anon_key,
        })
    }

    /// The anonymous kiosk public key.
    pub fn anon_key(&self) -> &RsaPublicKey {
        &self.anon_key
    }

    /// Per-read timeout from configuration.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.config.connection_timeout_ms)
    }
}
