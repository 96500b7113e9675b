//! Built-in request handlers.
//!
//! Only the handlers with no relational business logic live in the
//! core: a ping echo for connectivity checks and a status report.
//! Deployment-specific handlers are registered by the daemon
//! alongside these.

use std::time::Instant;

use serde_json::json;
use vestibule_types::{Permissions, Result};

use crate::checks::PermissionCheck;
use crate::context::RequestContext;
use crate::handler::RequestHandler;

/// Conventional endpoint id of [`PingHandler`].
pub const ENDPOINT_PING: u16 = 0;

/// Conventional endpoint id of [`StatusHandler`].
pub const ENDPOINT_STATUS: u16 = 1;

// ---------------------------------------------------------------------------
// PingHandler
// ---------------------------------------------------------------------------

/// Connectivity probe: responds with `pong` and echoes an optional
/// `payload` string.
pub struct PingHandler;

impl RequestHandler for PingHandler {
    fn permission_checks(&self) -> Vec<PermissionCheck> {
        vec![PermissionCheck::RequireBits(Permissions::DEFAULT_LOGIN)]
    }

    fn execute(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let mut reply = json!({ "pong": true });
        if let Some(payload) = ctx.data_str("payload") {
            reply["payload"] = json!(payload);
        }
        ctx.send_response(reply)
    }
}

// ---------------------------------------------------------------------------
// StatusHandler
// ---------------------------------------------------------------------------

/// Reports server version, uptime, and whether the requester is an
/// authenticated administrator.
///
/// Anonymous kiosks may ask; admins get the same answer but must not
/// be frozen and must present a valid auth code, enforced through the
/// conditional wrappers.
pub struct StatusHandler {
    started_at: Instant,
}

impl StatusHandler {
    /// Creates a status handler clocked from now.
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
        }
    }
}

impl Default for StatusHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestHandler for StatusHandler {
    fn permission_checks(&self) -> Vec<PermissionCheck> {
        vec![
            PermissionCheck::RequireBits(Permissions::DEFAULT_LOGIN | Permissions::ADMIN),
            PermissionCheck::IfAdmin(Box::new(PermissionCheck::AdminNotFrozen)),
            PermissionCheck::IfAdmin(Box::new(PermissionCheck::AdminAuthCode)),
        ]
    }

    fn execute(&self, ctx: &mut RequestContext<'_>) -> Result<()> {
        let reply = json!({
            "version": env!("CARGO_PKG_VERSION"),
            "uptime_secs": self.started_at.elapsed().as_secs(),
            "authenticated": ctx.admin().is_some(),
        });
        ctx.send_response(reply)
    }
}
