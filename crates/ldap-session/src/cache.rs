//! Session cache: one live session per client identity.
//!
//! The cache is shared mutable state; every client identity gets its own
//! slot behind an async mutex. Holding the slot lock for the whole
//! connect/bind sequence means concurrent first-time callers wait for one
//! connect instead of racing to establish duplicate sessions.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::Mutex as AsyncMutex;

use crate::transport::DirectorySession;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one client instance, used only as a cache key.
///
/// Drawn from a process-wide sequence at construction time, so identities
/// are deterministic and unique for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl ClientId {
    pub(crate) fn next() -> Self {
        ClientId(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// A bind identity: DN plus password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub bind_dn: String,
    pub password: String,
}

impl Credentials {
    pub fn new(bind_dn: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            bind_dn: bind_dn.into(),
            password: password.into(),
        }
    }

    /// The anonymous bind identity.
    pub fn anonymous() -> Self {
        Self::new("", "")
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("bind_dn", &self.bind_dn)
            .field("password", &"***REDACTED***")
            .finish()
    }
}

/// A live transport connection together with the credentials of its most
/// recent bind.
pub struct Session {
    wire: Box<dyn DirectorySession>,
    last_bind: Option<Credentials>,
}

impl Session {
    pub(crate) fn new(wire: Box<dyn DirectorySession>) -> Self {
        Self {
            wire,
            last_bind: None,
        }
    }

    pub(crate) fn wire(&mut self) -> &mut dyn DirectorySession {
        self.wire.as_mut()
    }

    /// Whether a bind must be (re-)issued for the given credentials.
    pub(crate) fn needs_bind(&self, credentials: &Credentials) -> bool {
        self.last_bind.as_ref() != Some(credentials)
    }

    pub(crate) fn record_bind(&mut self, credentials: Credentials) {
        self.last_bind = Some(credentials);
    }

    pub fn last_bind(&self) -> Option<&Credentials> {
        self.last_bind.as_ref()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("last_bind", &self.last_bind)
            .finish()
    }
}

/// A client's cache slot: its current session, or none.
pub type SessionSlot = Arc<AsyncMutex<Option<Session>>>;

/// Thread-safe store mapping client identities to their session slots.
#[derive(Default)]
pub struct SessionCache {
    slots: StdMutex<HashMap<ClientId, SessionSlot>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot for a client identity, created on first use. The returned
    /// handle stays valid for the life of the cache.
    pub(crate) fn slot(&self, id: ClientId) -> SessionSlot {
        let mut slots = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        slots.entry(id).or_default().clone()
    }

    /// Whether a live session is currently cached for the identity. Slots
    /// locked by an in-flight operation count as live.
    pub fn has_live_session(&self, id: ClientId) -> bool {
        let slots = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match slots.get(&id) {
            Some(slot) => slot.try_lock().map(|guard| guard.is_some()).unwrap_or(true),
            None => false,
        }
    }
}

impl fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("SessionCache")
            .field("slots", &slots.len())
            .finish()
    }
}
