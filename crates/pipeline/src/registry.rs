//! Connection registry and per-connection state
//!
//! One `ConnectionState` per live producer, keyed by an opaque
//! `Handle`. Handles come from a monotonic counter, so a retired handle
//! is never reissued to a later connection. All map access goes through
//! a single registry-wide mutex; per-handle mutation happens inside
//! `with_state` while that lock is held, which also serializes the
//! (undefined) case of two threads driving the same handle.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::{PipelineError, Result};

/// Opaque identifier of a live producer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of closing a delimiter scope.
#[derive(Debug, PartialEq, Eq)]
pub enum ScopeClose {
    /// Depth reached zero; the scope's pending commands flush.
    Flushed(Vec<String>),
    /// A nested scope closed; depth is still positive.
    StillNested,
    /// Close with no matching open - protocol violation.
    Underflow,
}

/// Per-connection aggregation state.
///
/// Only the scope bookkeeping lives here; the static block size is a
/// property of the shared aggregator, not of any one connection.
#[derive(Debug, Default)]
pub struct ConnectionState {
    nesting_depth: u32,
    pending: Vec<String>,
}

impl ConnectionState {
    fn new() -> Self {
        Self::default()
    }

    /// Count of currently open, unmatched delimiter scopes.
    #[inline]
    pub fn nesting_depth(&self) -> u32 {
        self.nesting_depth
    }

    /// True while no delimiter scope is open.
    #[inline]
    pub fn at_top_level(&self) -> bool {
        self.nesting_depth == 0
    }

    /// Append a command to the scope-pending sequence.
    pub fn push_pending(&mut self, command: String) {
        self.pending.push(command);
    }

    /// Open a delimiter scope.
    pub fn open_scope(&mut self) {
        self.nesting_depth += 1;
    }

    /// Close a delimiter scope.
    ///
    /// Only the transition to depth zero flushes; nested closes just
    /// decrement. Depth never goes below zero - that case is reported
    /// as `Underflow` with state unchanged.
    pub fn close_scope(&mut self) -> ScopeClose {
        match self.nesting_depth {
            0 => ScopeClose::Underflow,
            1 => {
                self.nesting_depth = 0;
                ScopeClose::Flushed(std::mem::take(&mut self.pending))
            }
            _ => {
                self.nesting_depth -= 1;
                ScopeClose::StillNested
            }
        }
    }

    /// Take whatever is pending, regardless of depth (disconnect path).
    pub fn take_pending(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending)
    }
}

/// Thread-safe map of live connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    next_handle: AtomicU64,
    connections: Mutex<HashMap<Handle, ConnectionState>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection and return its fresh handle.
    pub fn create(&self) -> Handle {
        let handle = Handle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.connections
            .lock()
            .insert(handle, ConnectionState::new());
        handle
    }

    /// Run `f` against the state registered under `handle`.
    pub fn with_state<R>(
        &self,
        handle: Handle,
        f: impl FnOnce(&mut ConnectionState) -> R,
    ) -> Result<R> {
        let mut connections = self.connections.lock();
        let state = connections
            .get_mut(&handle)
            .ok_or(PipelineError::UnknownHandle(handle))?;
        Ok(f(state))
    }

    /// Remove a connection, returning its final state if present.
    pub fn remove(&self, handle: Handle) -> Option<ConnectionState> {
        self.connections.lock().remove(&handle)
    }

    /// Handles of every currently registered connection.
    pub fn handles(&self) -> Vec<Handle> {
        self.connections.lock().keys().copied().collect()
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    /// True when no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }
}
