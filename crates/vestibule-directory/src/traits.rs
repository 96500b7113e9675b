//! Directory traits: the abstract interface for principal lookup.
//!
//! These traits keep the transport storage-agnostic. The production
//! appliance backs them with its relational database; tests and
//! storage-less deployments use [`crate::MemoryDirectory`].

use vestibule_types::{AdminIdentity, Result};

/// Factory for directory connections.
///
/// One handle is opened lazily per client connection and closed
/// unconditionally at teardown. Implementations must be thread-safe:
/// every client connection thread calls [`open`](Directory::open)
/// independently.
pub trait Directory: Send + Sync {
    /// Opens a fresh connection to the directory.
    fn open(&self) -> Result<Box<dyn DirectoryConn>>;
}

/// One open directory connection, owned by a single client connection.
///
/// Not `Sync`: the handle never leaves the thread that opened it.
pub trait DirectoryConn: Send {
    /// Looks up an administrative principal by its wire id.
    ///
    /// Returns `Ok(None)` when no such principal exists — the caller
    /// decides whether that is an authentication failure.
    fn find_admin(&mut self, id: u8) -> Result<Option<AdminIdentity>>;

    /// Closes the connection. Idempotent; further lookups fail.
    fn close(&mut self) -> Result<()>;

    /// Returns `true` once [`close`](DirectoryConn::close) has run.
    fn is_closed(&self) -> bool;
}
