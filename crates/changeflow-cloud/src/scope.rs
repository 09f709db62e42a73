//! Per-scope mutual exclusion
//!
//! Fetching a token and spending it are two remote calls. Two local
//! operations interleaving those calls within one scope would fetch the same
//! token and race to consume it, so at most one attempt per scope is in
//! flight at a time.

use crate::token::Scope;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One lock per distinct scope, created lazily and kept for the process
/// lifetime.
#[derive(Debug, Clone, Default)]
pub struct ScopeSerializer {
    locks: Arc<DashMap<Scope, Arc<Mutex<()>>>>,
}

/// Exclusive access to one scope. Released on drop.
#[derive(Debug)]
pub struct ScopeGuard {
    scope: Scope,
    _guard: OwnedMutexGuard<()>,
}

impl ScopeGuard {
    pub fn scope(&self) -> &Scope {
        &self.scope
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        tracing::trace!(scope = %self.scope, "released scope");
    }
}

impl ScopeSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, scope: &Scope) -> Arc<Mutex<()>> {
        // The map shard lock is dropped before the caller awaits the scope lock.
        self.locks
            .entry(scope.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Wait for exclusive access to `scope`.
    ///
    /// Waiters are admitted in FIFO order. Dropping the returned future
    /// while it waits leaves the scope untouched.
    pub async fn acquire(&self, scope: &Scope) -> ScopeGuard {
        let lock = self.lock_for(scope);
        let guard = lock.lock_owned().await;
        tracing::trace!(scope = %scope, "acquired scope");
        ScopeGuard {
            scope: scope.clone(),
            _guard: guard,
        }
    }

    /// Run `f` while holding `scope`. The scope is released whether `f`
    /// completes, fails, or is dropped mid-flight.
    pub async fn with_scope<F, Fut, T>(&self, scope: &Scope, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.acquire(scope).await;
        f().await
    }

    /// Number of scopes that have been used so far
    pub fn scope_count(&self) -> usize {
        self.locks.len()
    }
}
