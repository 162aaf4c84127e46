//! Shared-store registry
//!
//! A call UI surface is often mirrored across several screens (in-app view,
//! picture-in-picture, notification expansion) that must observe the same
//! aggregator instance. The registry holds one value per stable key,
//! reference-counted by the scope ids bound to it; the value is dropped when
//! the last scope unbinds. The registry is passed explicitly, never held in
//! a global.

use parking_lot::Mutex;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{UiCoreError, UiCoreResult};

/// Stable identifier of a shared store (type + configuration identity).
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct StoreKey(pub String);

impl StoreKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }
}

impl std::fmt::Display for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one bound consumer scope (a screen, a PiP window).
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct ScopeId(pub String);

impl ScopeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

struct Entry {
    value: Arc<dyn Any + Send + Sync>,
    bound: HashSet<ScopeId>,
}

/// Reference-counted registry of shared stores.
#[derive(Default)]
pub struct StoreRegistry {
    entries: Mutex<HashMap<StoreKey, Entry>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `scope` to the store under `key`, creating the store with
    /// `init` when this is the first binding. Returns the shared value.
    pub fn bind<T, F>(&self, key: StoreKey, scope: ScopeId, init: F) -> UiCoreResult<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        let mut entries = self.entries.lock();
        let entry = entries.entry(key.clone()).or_insert_with(|| {
            info!(key = %key, "creating shared store");
            Entry {
                value: Arc::new(init()),
                bound: HashSet::new(),
            }
        });
        entry.bound.insert(scope);
        entry
            .value
            .clone()
            .downcast::<T>()
            .map_err(|_| UiCoreError::store_type_mismatch(key.0))
    }

    /// Get the store under `key` without binding a scope.
    pub fn get<T>(&self, key: &StoreKey) -> UiCoreResult<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let entries = self.entries.lock();
        let entry = entries
            .get(key)
            .ok_or_else(|| UiCoreError::store_not_found(key.0.clone()))?;
        entry
            .value
            .clone()
            .downcast::<T>()
            .map_err(|_| UiCoreError::store_type_mismatch(key.0.clone()))
    }

    /// Unbind `scope` from the store under `key`. When the last scope
    /// unbinds, the store is dropped. Returns true if the store was torn
    /// down by this call.
    pub fn unbind(&self, key: &StoreKey, scope: &ScopeId) -> bool {
        let mut entries = self.entries.lock();
        let remaining = match entries.get_mut(key) {
            Some(entry) => {
                entry.bound.remove(scope);
                entry.bound.len()
            }
            None => return false,
        };
        if remaining == 0 {
            entries.remove(key);
            info!(key = %key, "last scope unbound, dropping shared store");
            true
        } else {
            debug!(key = %key, remaining, "scope unbound");
            false
        }
    }

    /// Number of scopes currently bound to the store under `key`.
    pub fn bound_count(&self, key: &StoreKey) -> usize {
        self.entries
            .lock()
            .get(key)
            .map(|e| e.bound.len())
            .unwrap_or(0)
    }
}
