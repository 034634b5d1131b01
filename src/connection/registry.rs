//! Connection registry keyed by effective URL

use super::handle::{ConnectionHandle, ConnectionKey};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Maps connection keys to live handles.
///
/// `set` is last-writer-wins. Deduplicating callers should use
/// [`ConnectionRegistry::insert_with`], which performs the presence check
/// and the insert under one write lock.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    entries: Arc<RwLock<HashMap<ConnectionKey, ConnectionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn has(&self, key: &str) -> bool {
        self.entries.read().await.contains_key(key)
    }

    pub async fn get(&self, key: &str) -> Option<ConnectionHandle> {
        self.entries.read().await.get(key).cloned()
    }

    /// Insert or overwrite; returns the displaced handle
    pub async fn set(&self, key: ConnectionKey, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        self.entries.write().await.insert(key, handle)
    }

    pub async fn remove(&self, key: &str) -> Option<ConnectionHandle> {
        self.entries.write().await.remove(key)
    }

    /// Remove only if the key still maps to this exact connection
    pub async fn remove_if(&self, key: &str, handle: &ConnectionHandle) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(current) if current.ptr_eq(handle) => {
                entries.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Return the existing handle for `key`, or insert the one built by `make`.
    ///
    /// `make` runs under the write lock and may refuse by returning `Err`.
    /// The boolean is true when a new handle was inserted.
    pub async fn insert_with<F, E>(&self, key: ConnectionKey, make: F) -> Result<(ConnectionHandle, bool), E>
    where
        F: FnOnce() -> Result<ConnectionHandle, E>,
    {
        let mut entries = self.entries.write().await;
        if let Some(existing) = entries.get(&key) {
            return Ok((existing.clone(), false));
        }
        let handle = make()?;
        entries.insert(key, handle.clone());
        Ok((handle, true))
    }

    pub async fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&ConnectionKey, &ConnectionHandle),
    {
        for (key, handle) in self.entries.read().await.iter() {
            f(key, handle);
        }
    }

    /// Remove and return every entry
    pub async fn drain(&self) -> Vec<(ConnectionKey, ConnectionHandle)> {
        self.entries.write().await.drain().collect()
    }

    pub async fn keys(&self) -> Vec<ConnectionKey> {
        let mut keys: Vec<_> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
