//! One client connection, end to end.
//!
//! [`SecureConnection`] drives the state machine
//! `Handshaking → AwaitingEnvelope → CheckingPermissions → Executing
//! → Closed`; any failure transitions straight to `Closed`. The
//! protocol is single-shot: one envelope, one handler, then teardown.
//! Every exit path — success, permission failure, protocol failure,
//! I/O error — routes through the same teardown, which kills the
//! socket, releases the directory handle, and records a terminal
//! [`ConnectionStatus`].

use std::fmt;
use std::net::TcpStream;
use std::sync::Arc;

use rsa::RsaPublicKey;
use serde_json::{json, Map, Value};
use vestibule_crypto::{asymmetric, symmetric};
use vestibule_types::{AdminIdentity, Result, VestibuleError};
use zeroize::Zeroize;

use crate::checks::run_checks;
use crate::context::{LazyDirectory, RequestContext};
use crate::framed::FramedChannel;
use crate::handler::EndpointId;
use crate::runtime::ServerContext;
use crate::secure::SecureChannel;

// ---------------------------------------------------------------------------
// ConnectionStatus
// ---------------------------------------------------------------------------

/// Terminal status of a connection, recorded for observability.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionStatus {
    /// Request completed without problems.
    Success,
    /// I/O failure or read timeout.
    Io,
    /// Message could not be decrypted or parsed.
    Parse,
    /// Handshake failed: unknown principal or unusable key material.
    AuthError,
    /// Envelope named an endpoint with no registered handler.
    NoHandler,
    /// A permission check rejected the request.
    Permission,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::Io => "io",
            Self::Parse => "parse",
            Self::AuthError => "auth_error",
            Self::NoHandler => "no_handler",
            Self::Permission => "permission",
        };
        write!(f, "{name}")
    }
}

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// Where in its lifecycle the connection currently is.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ConnectionState {
    Handshaking,
    AwaitingEnvelope,
    CheckingPermissions,
    Executing,
    Closed,
}

// ---------------------------------------------------------------------------
// SecureConnection
// ---------------------------------------------------------------------------

/// Orchestrates one client connection: handshake, envelope, permission
/// pipeline, handler, teardown.
pub struct SecureConnection {
    channel: SecureChannel,
    context: Arc<ServerContext>,
    storage: LazyDirectory,
    admin: Option<AdminIdentity>,
    state: ConnectionState,
}

impl SecureConnection {
    /// Wraps an accepted socket.
    ///
    /// `conn_id` is random, used only to correlate log lines.
    pub fn new(stream: TcpStream, conn_id: u64, context: Arc<ServerContext>) -> Result<Self> {
        let framed = FramedChannel::new(stream, context.read_timeout(), conn_id)?;
        Ok(Self {
            channel: SecureChannel::new(framed),
            storage: LazyDirectory::new(Arc::clone(&context.directory)),
            context,
            admin: None,
            state: ConnectionState::Handshaking,
        })
    }

    /// Runs the connection to completion and returns its terminal
    /// status. Consumes the connection: the protocol is single-shot.
    pub fn run(mut self) -> ConnectionStatus {
        let status = self.process();
        self.teardown(status)
    }

    // -- lifecycle ----------------------------------------------------------

    fn process(&mut self) -> ConnectionStatus {
        let conn = self.channel.conn_id();

        if let Err(e) = self.handshake() {
            tracing::debug!(conn, error = %e, "handshake failed");
            return ConnectionStatus::AuthError;
        }

        self.state = ConnectionState::AwaitingEnvelope;
        let envelope = match self.channel.recv_frame() {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(conn, error = %e, "failed to read envelope");
                return status_for_error(&e);
            }
        };

        let Some(endpoint) = parse_endpoint(&envelope) else {
            tracing::debug!(conn, "envelope named no valid endpoint");
            self.send_preprocessing_error("handler", None);
            return ConnectionStatus::NoHandler;
        };

        let data = object_field(&envelope, "data");
        let auth = object_field(&envelope, "auth");

        // Handler lookup borrows the registry from a local Arc clone
        // so the connection stays free for mutable use below.
        let context = Arc::clone(&self.context);
        let Some(handler) = context.registry.get(endpoint) else {
            tracing::debug!(conn, endpoint, "no handler for endpoint");
            self.send_preprocessing_error("handler", None);
            return ConnectionStatus::NoHandler;
        };

        self.state = ConnectionState::CheckingPermissions;
        let admin = self.admin.clone();
        let mut ctx = RequestContext::new(
            &mut self.channel,
            &mut self.storage,
            admin.as_ref(),
            data,
            auth,
        );

        let checks = handler.permission_checks();
        if let Err(failure) = run_checks(&checks, &ctx) {
            ctx.destruct();
            tracing::debug!(conn, endpoint, code = %failure.code, "permission check failed");
            self.send_preprocessing_error(&failure.code, failure.detail);
            return ConnectionStatus::Permission;
        }

        self.state = ConnectionState::Executing;
        let result = handler.execute(&mut ctx);
        ctx.destruct();

        match result {
            Ok(()) => {
                tracing::debug!(conn, endpoint, "request completed, disconnecting");
                ConnectionStatus::Success
            }
            Err(e) => {
                tracing::debug!(conn, endpoint, error = %e, "handler failed");
                status_for_error(&e)
            }
        }
    }

    /// Establishes the secure session with the remote client.
    ///
    /// On any failure the caller collapses the reason into one generic
    /// auth error — the client must not learn which step rejected it.
    fn handshake(&mut self) -> Result<()> {
        let conn = self.channel.conn_id();

        let (client_id, nonce) = self.channel.read_client_hello()?;
        tracing::debug!(conn, client = client_id, "received client hello");

        let remote_key = self.resolve_public_key(client_id)?;

        let key = symmetric::generate_key();
        let iv = symmetric::generate_iv();

        let mut blob = [0u8; symmetric::SymmetricKey::LEN + symmetric::InitVector::LEN];
        blob[..symmetric::SymmetricKey::LEN].copy_from_slice(key.as_bytes());
        blob[symmetric::SymmetricKey::LEN..].copy_from_slice(iv.as_bytes());

        let ciphertext = asymmetric::encrypt(&remote_key, &blob);
        blob.zeroize();
        let ciphertext = ciphertext?;

        // The only unframed message in the protocol: length is
        // implicit in the RSA modulus size.
        self.channel.send_raw(&ciphertext)?;

        self.channel.install_secret(key, iv, nonce)?;
        tracing::debug!(conn, "handshake complete");
        Ok(())
    }

    /// Resolves the client's RSA public key.
    ///
    /// Id 0 is the anonymous kiosk key from configuration. Any other
    /// id is looked up in the directory; the opened handle and the
    /// identity snapshot are retained for the request.
    fn resolve_public_key(&mut self, client_id: u8) -> Result<RsaPublicKey> {
        if client_id == 0 {
            return Ok(self.context.anon_key().clone());
        }

        let conn = self.storage.open_or_reuse()?;
        let admin = conn
            .find_admin(client_id)?
            .ok_or_else(|| VestibuleError::Auth {
                reason: format!("no principal with id {client_id}"),
            })?;

        let key = asymmetric::public_key_from_spec(&admin.public_key)?;
        self.admin = Some(admin);
        Ok(key)
    }

    /// Sends a `{status: 2, error, data}` pre-processing reply.
    ///
    /// Delivery is best-effort: the connection is closing anyway, so
    /// a send failure is only logged.
    fn send_preprocessing_error(&mut self, error: &str, detail: Option<Value>) {
        let reply = json!({
            "status": 2,
            "error": error,
            "data": detail.unwrap_or_else(|| json!({})),
        });
        if let Err(e) = self.channel.send_frame(&reply) {
            tracing::debug!(
                conn = self.channel.conn_id(),
                error = %e,
                "failed to deliver pre-processing error"
            );
        }
    }

    /// The one teardown routine every exit path goes through.
    fn teardown(&mut self, status: ConnectionStatus) -> ConnectionStatus {
        let from = self.state;
        self.state = ConnectionState::Closed;
        self.channel.kill();
        self.storage.destruct();
        tracing::debug!(
            conn = self.channel.conn_id(),
            %status,
            from = ?from,
            "connection closed"
        );
        status
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Extracts the endpoint id; anything absent, negative, or out of the
/// u16 range counts as "no such handler".
fn parse_endpoint(envelope: &Value) -> Option<EndpointId> {
    envelope
        .get("endpoint")
        .and_then(Value::as_u64)
        .and_then(|id| EndpointId::try_from(id).ok())
}

/// Returns the named object field, or an empty map when absent or not
/// an object — payloads are optional in the envelope.
fn object_field(envelope: &Value, key: &str) -> Map<String, Value> {
    envelope
        .get(key)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

/// Maps an error to the terminal status recorded for observability.
fn status_for_error(e: &VestibuleError) -> ConnectionStatus {
    match e {
        VestibuleError::Transport { .. } | VestibuleError::Timeout { .. } => ConnectionStatus::Io,
        VestibuleError::Protocol { .. } | VestibuleError::Crypto { .. } => ConnectionStatus::Parse,
        VestibuleError::Auth { .. } => ConnectionStatus::AuthError,
        VestibuleError::Config { .. } | VestibuleError::Storage { .. } => ConnectionStatus::Io,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
