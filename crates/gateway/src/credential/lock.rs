// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Non-blocking per-scope refresh locks.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::credential::Scope;

/// Set of scopes with a refresh in flight. Process-local.
#[derive(Clone, Default)]
pub struct ScopeLocks {
    held: Arc<Mutex<HashSet<Scope>>>,
}

impl ScopeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `scope` without waiting. `None` when another task holds it.
    pub fn try_acquire(&self, scope: Scope) -> Option<ScopeGuard> {
        // Poisoned counts as contended; callers fall back to the stale token.
        let mut held = self.held.lock().ok()?;
        if !held.insert(scope) {
            return None;
        }
        Some(ScopeGuard { held: Arc::clone(&self.held), scope })
    }

    pub fn is_held(&self, scope: Scope) -> bool {
        self.held.lock().map(|h| h.contains(&scope)).unwrap_or(true)
    }
}

/// Releases the scope on drop.
pub struct ScopeGuard {
    held: Arc<Mutex<HashSet<Scope>>>,
    scope: Scope,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if let Ok(mut held) = self.held.lock() {
            held.remove(&self.scope);
        }
    }
}
