//! Accept loop: one thread per connection.
//!
//! The listener binds the configured address, then accepts in a loop.
//! Each accepted socket gets a random connection id (log correlation
//! only) and its own thread running a
//! [`crate::connection::SecureConnection`] to completion. Shutting
//! down sets a flag and pokes the bound port with a throwaway
//! connection so a blocked `accept` wakes up.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use vestibule_types::{Result, VestibuleError};

use crate::connection::SecureConnection;
use crate::runtime::ServerContext;

/// TCP listener owning the accept loop.
pub struct Listener {
    listener: TcpListener,
    context: Arc<ServerContext>,
    shutdown: Arc<AtomicBool>,
    local_addr: SocketAddr,
}

/// Cloneable handle that can stop a running [`Listener`].
#[derive(Clone)]
pub struct ListenerHandle {
    shutdown: Arc<AtomicBool>,
    local_addr: SocketAddr,
}

impl Listener {
    /// Binds the configured `bind_addr:port`.
    ///
    /// # Errors
    ///
    /// Returns [`VestibuleError::Transport`] if the bind fails.
    pub fn bind(context: Arc<ServerContext>) -> Result<Self> {
        let addr = format!("{}:{}", context.config.bind_addr, context.config.port);
        let listener = TcpListener::bind(&addr).map_err(|e| VestibuleError::Transport {
            reason: format!("failed to bind {addr}: {e}"),
        })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| VestibuleError::Transport {
                reason: format!("failed to read bound address: {e}"),
            })?;

        tracing::info!(%local_addr, "listener bound");

        Ok(Self {
            listener,
            context,
            shutdown: Arc::new(AtomicBool::new(false)),
            local_addr,
        })
    }

    /// The actually bound address (resolves port 0 to the ephemeral
    /// port the OS picked).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns a handle that can stop this listener from another
    /// thread.
    pub fn handle(&self) -> ListenerHandle {
        ListenerHandle {
            shutdown: Arc::clone(&self.shutdown),
            local_addr: self.local_addr,
        }
    }

    /// Runs the accept loop until [`ListenerHandle::shutdown`] fires.
    pub fn run(self) -> Result<()> {
        loop {
            let (stream, peer) = match self.listener.accept() {
                Ok(accepted) => accepted,
                Err(e) => {
                    if self.shutdown.load(Ordering::SeqCst) {
                        break;
                    }
                    tracing::warn!(error = %e, "accept failed");
                    continue;
                }
            };

            if self.shutdown.load(Ordering::SeqCst) {
                // The wake-up poke, or a client racing shutdown.
                break;
            }

            let conn_id: u64 = rand::random();
            let context = Arc::clone(&self.context);

            let spawned = std::thread::Builder::new()
                .name(format!("conn-{conn_id:016x}"))
                .spawn(move || {
                    tracing::debug!(conn = conn_id, %peer, "accepted connection");
                    match SecureConnection::new(stream, conn_id, context) {
                        Ok(connection) => {
                            connection.run();
                        }
                        Err(e) => {
                            tracing::warn!(conn = conn_id, error = %e, "failed to set up connection");
                        }
                    }
                });

            if let Err(e) = spawned {
                tracing::error!(conn = conn_id, error = %e, "failed to spawn connection thread");
            }
        }

        tracing::info!("listener stopped");
        Ok(())
    }
}

impl ListenerHandle {
    /// Stops the listener: sets the shutdown flag and unblocks the
    /// accept loop with a throwaway connection.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // Wake the accept loop; failure means it is not blocked on
        // accept anymore, which is just as good.
        let _ = TcpStream::connect_timeout(&self.local_addr, Duration::from_millis(200));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerRegistry;
    use vestibule_crypto::asymmetric;
    use vestibule_directory::MemoryDirectory;
    use vestibule_types::config::ServerConfig;

    fn test_context() -> Arc<ServerContext> {
        let (_, spec) = asymmetric::generate_keypair(1024).expect("keypair");
        let config = ServerConfig {
            bind_addr: "127.0.0.1".into(),
            port: 0,
            connection_timeout_ms: 200,
            applogin_pubk: spec,
        };
        Arc::new(
            ServerContext::new(
                config,
                Arc::new(MemoryDirectory::new()),
                HandlerRegistry::new(),
            )
            .expect("server context"),
        )
    }

    #[test]
    fn binds_ephemeral_port() -> std::result::Result<(), VestibuleError> {
        let listener = Listener::bind(test_context())?;
        assert_ne!(listener.local_addr().port(), 0);
        Ok(())
    }

    #[test]
    fn shutdown_unblocks_accept_loop() -> std::result::Result<(), VestibuleError> {
        let listener = Listener::bind(test_context())?;
        let handle = listener.handle();

        let join = std::thread::spawn(move || listener.run());

        // Give the loop a moment to block on accept, then stop it.
        std::thread::sleep(Duration::from_millis(50));
        handle.shutdown();

        join.join().expect("listener thread")?;
        Ok(())
    }
}
