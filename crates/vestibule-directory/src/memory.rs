//! In-memory implementation of the directory traits.
//!
//! Primarily for tests, and for appliance deployments that seed a
//! small fixed admin list from a JSON file instead of running a
//! relational backend. Thread-safe via `RwLock`; open/close counters
//! make connection lifecycle observable from the outside.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use vestibule_types::{AdminIdentity, Result, VestibuleError};

use crate::traits::{Directory, DirectoryConn};

/// In-memory principal directory.
///
/// Cloning is cheap and shares the underlying admin table, so the
/// same directory can be handed to the listener and inspected by a
/// test afterwards.
#[derive(Clone)]
pub struct MemoryDirectory {
    inner: Arc<Inner>,
}

struct Inner {
    /// Admins indexed by wire id.
    admins: RwLock<HashMap<u8, AdminIdentity>>,
    /// Total connections handed out.
    opened: AtomicU64,
    /// Total connections closed.
    closed: AtomicU64,
}

impl MemoryDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                admins: RwLock::new(HashMap::new()),
                opened: AtomicU64::new(0),
                closed: AtomicU64::new(0),
            }),
        }
    }

    /// Creates a directory pre-seeded with the given admins.
    pub fn with_admins(admins: impl IntoIterator<Item = AdminIdentity>) -> Self {
        let dir = Self::new();
        for admin in admins {
            dir.insert(admin);
        }
        dir
    }

    /// Parses a JSON array of admins (the daemon's `admins_file`
    /// format) into a seeded directory.
    pub fn from_json(json: &str) -> Result<Self> {
        let admins: Vec<AdminIdentity> =
            serde_json::from_str(json).map_err(|e| VestibuleError::Storage {
                reason: format!("invalid admin seed file: {e}"),
            })?;
        Ok(Self::with_admins(admins))
    }

    /// Inserts or replaces one admin.
    pub fn insert(&self, admin: AdminIdentity) {
        self.inner
            .admins
            .write()
            .expect("admin table lock poisoned")
            .insert(admin.id, admin);
    }

    /// Number of connections handed out so far.
    pub fn opened_count(&self) -> u64 {
        self.inner.opened.load(Ordering::SeqCst)
    }

    /// Number of connections closed so far.
    pub fn closed_count(&self) -> u64 {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl Directory for MemoryDirectory {
    fn open(&self) -> Result<Box<dyn DirectoryConn>> {
        self.inner.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryConn {
            inner: Arc::clone(&self.inner),
            closed: false,
        }))
    }
}

/// One open handle onto a [`MemoryDirectory`].
struct MemoryConn {
    inner: Arc<Inner>,
    closed: bool,
}

impl DirectoryConn for MemoryConn {
    fn find_admin(&mut self, id: u8) -> Result<Option<AdminIdentity>> {
        if self.closed {
            return Err(VestibuleError::Storage {
                reason: "lookup on a closed directory connection".into(),
            });
        }
        let admins = self
            .inner
            .admins
            .read()
            .map_err(|_| VestibuleError::Storage {
                reason: "admin table lock poisoned".into(),
            })?;
        Ok(admins.get(&id).cloned())
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.inner.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
