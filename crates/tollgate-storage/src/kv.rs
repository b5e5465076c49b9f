//! Namespaced key-value store trait and its backends.
//!
//! Keys live inside a namespace so that one physical store can hold approval
//! records next to unrelated data. The approval engine uses a single
//! namespace (`system:approval` by default) and one key per session.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::{StorageError, StorageResult};

/// Reject empty names and the null byte, which separates namespace from key
/// in the on-disk encoding.
fn validate_segment(kind: &str, value: &str) -> StorageResult<()> {
    if value.is_empty() {
        return Err(StorageError::InvalidKey(format!("{kind} must not be empty")));
    }
    if value.contains('\0') {
        return Err(StorageError::InvalidKey(format!(
            "{kind} must not contain null bytes"
        )));
    }
    Ok(())
}

/// Raw key-value store.
///
/// Implementations must make `set` and `delete` atomic per key: a concurrent
/// `get` observes either the old value or the new one, never a mix.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Get a value. Returns `None` if the key does not exist.
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Set a value, replacing any existing one.
    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()>;

    /// Delete a key. Returns `true` if it existed.
    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool>;

    /// List every key in a namespace, in no particular order.
    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>>;
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// In-memory key-value store for tests and ephemeral data.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    data: RwLock<BTreeMap<String, BTreeMap<String, Vec<u8>>>>,
}

impl MemoryKvStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let data = self
            .data
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        Ok(data.get(namespace).and_then(|ns| ns.get(key)).cloned())
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        let mut data = self
            .data
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        data.entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        let mut data = self
            .data
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        let Some(ns) = data.get_mut(namespace) else {
            return Ok(false);
        };
        let existed = ns.remove(key).is_some();
        if ns.is_empty() {
            data.remove(namespace);
        }
        Ok(existed)
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        let data = self
            .data
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        Ok(data
            .get(namespace)
            .map(|ns| ns.keys().cloned().collect())
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// SurrealKV backend (behind `kv` feature)
// ---------------------------------------------------------------------------

/// Durable key-value store backed by `SurrealKV`.
///
/// Keys are encoded as `"{namespace}\0{key}"`; every write runs in its own
/// transaction.
///
/// ```rust,ignore
/// use tollgate_storage::SurrealKvStore;
///
/// let store = SurrealKvStore::open("/var/lib/tollgate/kv")?;
/// ```
#[cfg(feature = "kv")]
pub struct SurrealKvStore {
    tree: surrealkv::Tree,
}

#[cfg(feature = "kv")]
impl std::fmt::Debug for SurrealKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurrealKvStore").finish_non_exhaustive()
    }
}

#[cfg(feature = "kv")]
fn encode_key(namespace: &str, key: &str) -> Vec<u8> {
    let mut buf = namespace_start(namespace);
    buf.extend_from_slice(key.as_bytes());
    buf
}

/// Inclusive lower bound of a namespace: `"{namespace}\0"`.
#[cfg(feature = "kv")]
fn namespace_start(namespace: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(namespace.len().saturating_add(1));
    buf.extend_from_slice(namespace.as_bytes());
    buf.push(0);
    buf
}

/// Exclusive upper bound of a namespace: `"{namespace}\x01"`.
#[cfg(feature = "kv")]
fn namespace_end(namespace: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(namespace.len().saturating_add(1));
    buf.extend_from_slice(namespace.as_bytes());
    buf.push(1);
    buf
}

#[cfg(feature = "kv")]
fn backend_err(e: &surrealkv::Error) -> StorageError {
    StorageError::Internal(e.to_string())
}

#[cfg(feature = "kv")]
impl SurrealKvStore {
    /// Open (or create) a store in `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] if the store cannot be opened.
    pub fn open(path: impl AsRef<std::path::Path>) -> StorageResult<Self> {
        let tree = surrealkv::TreeBuilder::new()
            .with_path(path.as_ref().to_path_buf())
            .build()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        tracing::debug!(path = %path.as_ref().display(), "opened SurrealKV store");
        Ok(Self { tree })
    }

    /// Flush pending writes and close the store.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] if the flush fails.
    pub async fn close(&self) -> StorageResult<()> {
        self.tree.close().await.map_err(|ref e| backend_err(e))
    }
}

#[cfg(feature = "kv")]
#[async_trait]
impl KvStore for SurrealKvStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_segment("namespace", namespace)?;
        validate_segment("key", key)?;
        let tx = self
            .tree
            .begin_with_mode(surrealkv::Mode::ReadOnly)
            .map_err(|ref e| backend_err(e))?;
        tx.get(&encode_key(namespace, key))
            .map_err(|ref e| backend_err(e))
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        validate_segment("namespace", namespace)?;
        validate_segment("key", key)?;
        let mut tx = self.tree.begin().map_err(|ref e| backend_err(e))?;
        tx.set(&encode_key(namespace, key), &value)
            .map_err(|ref e| backend_err(e))?;
        tx.commit().await.map_err(|ref e| backend_err(e))
    }

    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        validate_segment("namespace", namespace)?;
        validate_segment("key", key)?;
        let encoded = encode_key(namespace, key);
        let mut tx = self.tree.begin().map_err(|ref e| backend_err(e))?;
        let existed = tx.get(&encoded).map_err(|ref e| backend_err(e))?.is_some();
        if existed {
            tx.delete(&encoded).map_err(|ref e| backend_err(e))?;
            tx.commit().await.map_err(|ref e| backend_err(e))?;
        }
        Ok(existed)
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        validate_segment("namespace", namespace)?;
        let start = namespace_start(namespace);
        let end = namespace_end(namespace);
        let prefix_len = start.len();

        let tx = self
            .tree
            .begin_with_mode(surrealkv::Mode::ReadOnly)
            .map_err(|ref e| backend_err(e))?;
        let mut iter = tx.range(&start, &end).map_err(|ref e| backend_err(e))?;
        iter.seek_first().map_err(|ref e| backend_err(e))?;

        let mut keys = Vec::new();
        while iter.valid() {
            let raw = iter.key();
            match raw.get(prefix_len..).map(std::str::from_utf8) {
                Some(Ok(key)) if !key.is_empty() => keys.push(key.to_string()),
                _ => tracing::warn!(namespace, "skipping undecodable key"),
            }
            iter.next().map_err(|ref e| backend_err(e))?;
        }
        Ok(keys)
    }
}

// ---------------------------------------------------------------------------
// Scoped view
// ---------------------------------------------------------------------------

/// A [`KvStore`] with its namespace pre-bound.
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use tollgate_storage::{MemoryKvStore, ScopedKvStore};
///
/// let scoped = ScopedKvStore::new(Arc::new(MemoryKvStore::new()), "system:approval")?;
/// scoped.set_json("session-1", &record).await?;
/// ```
#[derive(Clone)]
pub struct ScopedKvStore {
    inner: Arc<dyn KvStore>,
    namespace: String,
}

impl std::fmt::Debug for ScopedKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedKvStore")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl ScopedKvStore {
    /// Scope `store` to `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] if the namespace is empty or
    /// contains null bytes.
    pub fn new(store: Arc<dyn KvStore>, namespace: impl Into<String>) -> StorageResult<Self> {
        let namespace = namespace.into();
        validate_segment("namespace", &namespace)?;
        Ok(Self {
            inner: store,
            namespace,
        })
    }

    /// The bound namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Delete a key. Returns `true` if it existed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] for an invalid key, or the
    /// backend's error.
    pub async fn delete(&self, key: &str) -> StorageResult<bool> {
        validate_segment("key", key)?;
        self.inner.delete(&self.namespace, key).await
    }

    /// List every key in the namespace.
    ///
    /// # Errors
    ///
    /// Returns the backend's error.
    pub async fn list_keys(&self) -> StorageResult<Vec<String>> {
        self.inner.list_keys(&self.namespace).await
    }

    /// Read and deserialize a JSON value. Returns `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if the stored bytes are not a
    /// valid `T`.
    pub async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> StorageResult<Option<T>> {
        validate_segment("key", key)?;
        self.inner
            .get(&self.namespace, key)
            .await?
            .map(|bytes| {
                serde_json::from_slice(&bytes)
                    .map_err(|e| StorageError::Serialization(e.to_string()))
            })
            .transpose()
    }

    /// Serialize a value as JSON and store it under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if serialization fails, or the
    /// backend's error.
    pub async fn set_json<T: serde::Serialize>(&self, key: &str, value: &T) -> StorageResult<()> {
        validate_segment("key", key)?;
        let bytes =
            serde_json::to_vec(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.inner.set(&self.namespace, key, bytes).await
    }
}
