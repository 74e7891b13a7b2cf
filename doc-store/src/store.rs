use std::cmp::Ordering;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

use crate::StoreResult;

/// Blob storage operations - must be implemented by all object store backends
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store a blob at `path`, replacing any previous content
    async fn put(
        &self,
        path: &str,
        content_type: Option<&str>,
        bytes: Bytes,
    ) -> StoreResult<PutResult>;

    /// Resolve a long-lived URL clients can fetch the blob from.
    ///
    /// Fails with [`StoreError::NotFound`](crate::StoreError::NotFound) when
    /// there is no blob at `path`.
    async fn download_url(&self, path: &str) -> StoreResult<String>;

    /// Fetch a whole blob, failing if it is larger than `max_bytes`
    async fn get(&self, path: &str, max_bytes: u64) -> StoreResult<Bytes>;

    /// Delete a blob.
    ///
    /// Deleting a missing blob fails with
    /// [`StoreError::NotFound`](crate::StoreError::NotFound).
    async fn delete(&self, path: &str) -> StoreResult<()>;
}

/// Keyed JSON record storage with Realtime-Database path semantics
#[async_trait]
pub trait DocumentDatabase: Send + Sync {
    /// Write (or overwrite) the value at `path`
    async fn set(&self, path: &str, record: Value) -> StoreResult<()>;

    /// Read the value at `path` once
    async fn get(&self, path: &str) -> StoreResult<Snapshot>;

    /// Remove the value at `path`
    async fn delete(&self, path: &str) -> StoreResult<()>;
}

/// Result of a successful put operation
#[derive(Debug, Clone)]
pub struct PutResult {
    pub etag: Option<String>,
    pub size_bytes: u64,
}

/// One-shot read of a database location
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    key: String,
    value: Value,
}

impl Snapshot {
    pub fn new<K: Into<String>>(key: K, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    /// Snapshot of `value` read at `path`; the key is the last path segment
    pub fn at_path(path: &str, value: Value) -> Self {
        let key = path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default();
        Self::new(key, value)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn exists(&self) -> bool {
        !self.value.is_null()
    }

    /// Child snapshots in database order: integer keys ascending, then the
    /// remaining keys lexicographically
    pub fn children(&self) -> Vec<Snapshot> {
        let mut children: Vec<Snapshot> = match &self.value {
            Value::Object(map) => map
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| Snapshot::new(k.clone(), v.clone()))
                .collect(),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .filter(|(_, v)| !v.is_null())
                .map(|(i, v)| Snapshot::new(i.to_string(), v.clone()))
                .collect(),
            _ => Vec::new(),
        };
        children.sort_by(|a, b| compare_keys(&a.key, &b.key));
        children
    }

    pub fn children_count(&self) -> usize {
        match &self.value {
            Value::Object(map) => map.values().filter(|v| !v.is_null()).count(),
            Value::Array(items) => items.iter().filter(|v| !v.is_null()).count(),
            _ => 0,
        }
    }
}

fn compare_keys(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
