//! Per-key mutual exclusion for document read-modify-write cycles.
//!
//! Keys are document paths. Acquisition is scoped: the returned
//! [`LockGuard`] releases the key when dropped, on every exit path
//! (early return, `?`, panic unwinding, or a cancelled future).
//! Idle keys are removed from the table on release.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Waiting for a key exceeded the caller's deadline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Timed out waiting for lock on '{key}'")]
pub struct LockTimeout {
    pub key: String,
}

impl From<LockTimeout> for crate::error::CoreError {
    fn from(err: LockTimeout) -> Self {
        Self::Conflict(err.to_string())
    }
}

/// Table of per-key async mutexes.
#[derive(Debug, Default)]
pub struct LockManager {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Holds a key until dropped.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    key: String,
    manager: &'a LockManager,
}

impl LockGuard<'_> {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.manager.forget_if_idle(&self.key);
    }
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    /// Drop the table entry when nobody holds or waits on it.
    fn forget_if_idle(&self, key: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        if locks.get(key).is_some_and(|m| Arc::strong_count(m) == 1) {
            locks.remove(key);
        }
    }

    /// Wait until `key` is free and take it.
    pub async fn acquire(&self, key: &str) -> LockGuard<'_> {
        let mutex = self.entry(key);
        let guard = mutex.lock_owned().await;
        tracing::trace!(key, "Lock acquired");
        LockGuard {
            guard: Some(guard),
            key: key.to_string(),
            manager: self,
        }
    }

    /// Like [`acquire`](Self::acquire) but gives up after `timeout`.
    pub async fn acquire_timeout(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Result<LockGuard<'_>, LockTimeout> {
        match tokio::time::timeout(timeout, self.acquire(key)).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                self.forget_if_idle(key);
                tracing::warn!(key, timeout_ms = timeout.as_millis() as u64, "Lock wait timed out");
                Err(LockTimeout {
                    key: key.to_string(),
                })
            }
        }
    }

    /// Run `critical` while holding `key`.
    pub async fn with_lock<F, T>(&self, key: &str, critical: F) -> T
    where
        F: Future<Output = T>,
    {
        let _guard = self.acquire(key).await;
        critical.await
    }

    /// Whether `key` is currently held.
    pub fn is_locked(&self, key: &str) -> bool {
        let locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        locks.get(key).is_some_and(|m| m.try_lock().is_err())
    }

    /// Number of keys currently tracked (held or awaited).
    pub fn tracked_keys(&self) -> usize {
        self.locks.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}
