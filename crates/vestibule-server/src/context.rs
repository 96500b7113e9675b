//! Per-request façade handed to permission checks and handlers.
//!
//! A [`RequestContext`] wraps everything one request may touch: typed
//! access into the envelope payloads, the response/error senders, the
//! blocking "wait for the next client frame" operation, the bound
//! identity snapshot, and a lazily opened directory handle. It never
//! owns the connection — it borrows the channel and the directory
//! slot from the [`crate::connection::SecureConnection`] that built it.

use serde_json::{json, Map, Value};
use std::sync::Arc;
use vestibule_directory::{Directory, DirectoryConn};
use vestibule_types::{AdminIdentity, Result, VestibuleError};

use crate::secure::SecureChannel;

// ---------------------------------------------------------------------------
// LazyDirectory
// ---------------------------------------------------------------------------

/// Open-or-reuse slot for the per-connection directory handle.
///
/// The handshake may already have opened a handle (admin lookup); a
/// handler that needs the directory reuses it, and one is opened on
/// first use otherwise. [`destruct`](LazyDirectory::destruct) is
/// idempotent and runs on every connection exit path.
pub struct LazyDirectory {
    directory: Arc<dyn Directory>,
    conn: Option<Box<dyn DirectoryConn>>,
}

impl LazyDirectory {
    /// Creates an empty slot over the given directory.
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self {
            directory,
            conn: None,
        }
    }

    /// Returns the open handle, opening one on first use.
    pub fn open_or_reuse(&mut self) -> Result<&mut dyn DirectoryConn> {
        if self.conn.is_none() {
            self.conn = Some(self.directory.open()?);
        }
        match self.conn.as_mut() {
            Some(conn) => Ok(conn.as_mut()),
            None => Err(VestibuleError::Storage {
                reason: "directory handle unavailable".into(),
            }),
        }
    }

    /// Returns `true` if a handle is currently open.
    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Closes and releases the handle if one was opened. Idempotent;
    /// close failures are logged, never propagated.
    pub fn destruct(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            if let Err(e) = conn.close() {
                tracing::warn!(error = %e, "failed to close directory handle");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// RequestContext
// ---------------------------------------------------------------------------

/// Everything a permission check or handler may use for one request.
pub struct RequestContext<'a> {
    channel: &'a mut SecureChannel,
    storage: &'a mut LazyDirectory,
    admin: Option<&'a AdminIdentity>,
    data: Map<String, Value>,
    auth: Map<String, Value>,
}

impl<'a> RequestContext<'a> {
    /// Builds a context from the parsed envelope payloads.
    pub fn new(
        channel: &'a mut SecureChannel,
        storage: &'a mut LazyDirectory,
        admin: Option<&'a AdminIdentity>,
        data: Map<String, Value>,
        auth: Map<String, Value>,
    ) -> Self {
        Self {
            channel,
            storage,
            admin,
            data,
            auth,
        }
    }

    /// Connection id for log correlation.
    pub fn conn_id(&self) -> u64 {
        self.channel.conn_id()
    }

    // -- payload access -----------------------------------------------------

    /// Raw value from the data payload.
    pub fn data_value(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Integer field from the data payload; absent or miscast → `None`.
    pub fn data_i64(&self, key: &str) -> Option<i64> {
        self.data.get(key).and_then(Value::as_i64)
    }

    /// String field from the data payload; absent or miscast → `None`.
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    /// Boolean field from the data payload; absent or miscast → `None`.
    pub fn data_bool(&self, key: &str) -> Option<bool> {
        self.data.get(key).and_then(Value::as_bool)
    }

    /// Raw value from the auth payload.
    pub fn auth_value(&self, key: &str) -> Option<&Value> {
        self.auth.get(key)
    }

    /// Integer field from the auth payload; absent or miscast → `None`.
    pub fn auth_i64(&self, key: &str) -> Option<i64> {
        self.auth.get(key).and_then(Value::as_i64)
    }

    // -- identity -----------------------------------------------------------

    /// The bound administrative identity, if this connection
    /// authenticated as one.
    pub fn admin(&self) -> Option<&AdminIdentity> {
        self.admin
    }

    // -- responses ----------------------------------------------------------

    /// Sends a success response: `{status: 1, data: ...}`.
    pub fn send_response(&mut self, data: Value) -> Result<()> {
        self.channel.send_frame(&json!({
            "status": 1,
            "data": data,
        }))
    }

    /// Sends a business error: `{status: 0, errorcode, data?}`.
    pub fn send_error(&mut self, code: &str, detail: Option<Value>) -> Result<()> {
        let mut reply = json!({
            "status": 0,
            "errorcode": code,
        });
        if let Some(detail) = detail {
            reply["data"] = detail;
        }
        self.channel.send_frame(&reply)
    }

    /// Sends the canonical "required field missing" business error.
    pub fn send_error_missing_field(&mut self, field: &str) -> Result<()> {
        self.send_error("missing", Some(json!({ "field": field })))
    }

    /// Blocks until the client sends its next frame.
    ///
    /// Still bound by the channel's per-read timeout; a handler that
    /// calls this against a silent client gets a timeout error.
    pub fn wait_for_message(&mut self) -> Result<Value> {
        self.channel.recv_frame()
    }

    // -- collaborators ------------------------------------------------------

    /// Opens or reuses the per-connection directory handle.
    pub fn directory(&mut self) -> Result<&mut dyn DirectoryConn> {
        self.storage.open_or_reuse()
    }

    /// Releases the directory handle. Called unconditionally by the
    /// owning connection's teardown on every exit path; handlers never
    /// need to call it themselves.
    pub fn destruct(&mut self) {
        self.storage.destruct();
    }
}

impl std::fmt::Debug for RequestContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("conn", &self.channel.conn_id())
            .field("admin", &self.admin.map(|a| a.id))
            .field("data_keys", &self.data.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
