//! Secure transport and request dispatch for the Vestibule backend.
//!
//! This crate reimplements, at a small scale, what a TLS-plus-RPC
//! stack normally provides: a per-connection RSA-then-AES handshake,
//! a length-prefixed encrypted framing protocol, an endpoint-routed
//! request envelope, and an ordered permission-check pipeline gating
//! each handler — all thread-per-connection over blocking sockets.
//!
//! # Modules
//!
//! - [`framed`] — byte-level socket wrapper with per-read timeouts
//! - [`secure`] — encrypted frame codec and session secret
//! - [`connection`] — per-connection state machine and teardown
//! - [`context`] — per-request façade handed to checks and handlers
//! - [`checks`] — ordered, short-circuiting permission pipeline
//! - [`handler`] — handler contract and endpoint registry
//! - [`handlers`] — built-in ping/status handlers
//! - [`listener`] — accept loop, one thread per connection
//! - [`runtime`] — dependency bundle built once at startup

pub mod checks;
pub mod connection;
pub mod context;
pub mod framed;
pub mod handler;
pub mod handlers;
pub mod listener;
pub mod runtime;
pub mod secure;

pub use checks::{CheckFailure, CheckOutcome, PermissionCheck};
pub use connection::{ConnectionStatus, SecureConnection};
pub use context::RequestContext;
pub use handler::{EndpointId, HandlerRegistry, RequestHandler};
pub use listener::{Listener, ListenerHandle};
pub use runtime::ServerContext;
