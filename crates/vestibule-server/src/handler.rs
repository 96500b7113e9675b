//! Request handler contract and endpoint registry.
//!
//! A handler is one unit of business logic: it declares the ordered
//! permission checks that gate it and executes against a
//! [`RequestContext`]. The registry maps endpoint ids to handlers; it
//! is built once at startup and read-only afterwards, which is what
//! makes concurrent lookup from connection threads safe.

use std::collections::HashMap;

use vestibule_types::{Result, VestibuleError};

use crate::checks::PermissionCheck;
use crate::context::RequestContext;

/// Integer key selecting which handler processes a request.
pub type EndpointId = u16;

// ---------------------------------------------------------------------------
// RequestHandler
// ---------------------------------------------------------------------------

/// One registered business-logic unit.
pub trait RequestHandler: Send + Sync {
    /// The ordered permission checks gating this handler. Evaluated
    /// with short-circuit-on-first-failure semantics before
    /// [`execute`](RequestHandler::execute) runs.
    fn permission_checks(&self) -> Vec<PermissionCheck>;

    /// Executes the request. May call
    /// [`RequestContext::wait_for_message`] to exchange further frames
    /// with the client before finishing.
    ///
    /// # Errors
    ///
    /// Any error tears the connection down; the protocol is
    /// single-shot and nothing is retried.
    fn execute(&self, ctx: &mut RequestContext<'_>) -> Result<()>;
}

// ---------------------------------------------------------------------------
// HandlerRegistry
// ---------------------------------------------------------------------------

/// Endpoint id → handler map, populated once at startup.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<EndpointId, Box<dyn RequestHandler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under an endpoint id.
    ///
    /// # Errors
    ///
    /// Returns [`VestibuleError::Config`] if the id is already taken —
    /// endpoint ids must be unique, and a collision is a wiring bug
    /// worth failing startup over.
    pub fn register(
        &mut self,
        id: EndpointId,
        handler: Box<dyn RequestHandler>,
    ) -> Result<()> {
        if self.handlers.contains_key(&id) {
            return Err(VestibuleError::Config {
                reason: format!("endpoint {id} registered twice"),
            });
        }
        self.handlers.insert(id, handler);
        Ok(())
    }

    /// Looks up the handler for an endpoint id.
    pub fn get(&self, id: EndpointId) -> Option<&dyn RequestHandler> {
        self.handlers.get(&id).map(Box::as_ref)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
