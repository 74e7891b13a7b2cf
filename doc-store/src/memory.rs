//! In-process backends for tests and local development.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::{DocumentDatabase, ObjectStore, PutResult, Snapshot, StoreError, StoreResult};

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Bytes,
    content_type: Option<String>,
}

/// Object store keeping blobs in a map; download URLs are `<base_url>/<path>`
#[derive(Clone)]
pub struct MemoryObjectStore {
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
    base_url: String,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::with_base_url("memory://objects")
    }

    pub fn with_base_url<S: Into<String>>(base_url: S) -> Self {
        Self {
            objects: Arc::new(RwLock::new(HashMap::new())),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects.read().contains_key(path)
    }

    pub fn content_type(&self, path: &str) -> Option<String> {
        self.objects
            .read()
            .get(path)
            .and_then(|o| o.content_type.clone())
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        path: &str,
        content_type: Option<&str>,
        bytes: Bytes,
    ) -> StoreResult<PutResult> {
        let size_bytes = bytes.len() as u64;
        self.objects.write().insert(
            path.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.map(str::to_string),
            },
        );
        Ok(PutResult {
            etag: None,
            size_bytes,
        })
    }

    async fn download_url(&self, path: &str) -> StoreResult<String> {
        if !self.contains(path) {
            return Err(StoreError::not_found(path));
        }
        Ok(format!("{}/{}", self.base_url, path))
    }

    async fn get(&self, path: &str, max_bytes: u64) -> StoreResult<Bytes> {
        let objects = self.objects.read();
        let object = objects.get(path).ok_or_else(|| StoreError::not_found(path))?;
        let size = object.bytes.len() as u64;
        if size > max_bytes {
            return Err(StoreError::too_large(path, size, max_bytes));
        }
        Ok(object.bytes.clone())
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        self.objects
            .write()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(path))
    }
}

/// Document database holding a single JSON tree.
///
/// Writes create intermediate nodes and drop nested `null` members. Writing
/// `null` (or an object holding only nulls) deletes, and deletes prune
/// parents left empty. Missing locations read as `null`.
#[derive(Clone, Default)]
pub struct MemoryDocumentDatabase {
    root: Arc<RwLock<Value>>,
}

impl MemoryDocumentDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the whole tree
    pub fn export(&self) -> Value {
        self.root.read().clone()
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn is_empty_node(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Drop `null` members and the objects they leave empty, as the database does on write
fn without_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let map: Map<String, Value> = map
                .into_iter()
                .map(|(key, child)| (key, without_nulls(child)))
                .filter(|(_, child)| !is_empty_node(child))
                .collect();
            if map.is_empty() {
                Value::Null
            } else {
                Value::Object(map)
            }
        }
        other => other,
    }
}

fn remove_at(node: &mut Value, segs: &[&str]) {
    let Some((first, rest)) = segs.split_first() else {
        *node = Value::Null;
        return;
    };

    let now_empty = match node {
        Value::Object(map) => {
            if rest.is_empty() {
                map.remove(*first);
            } else if let Some(child) = map.get_mut(*first) {
                remove_at(child, rest);
                if is_empty_node(child) {
                    map.remove(*first);
                }
            }
            map.is_empty()
        }
        _ => false,
    };

    if now_empty {
        *node = Value::Null;
    }
}

#[async_trait]
impl DocumentDatabase for MemoryDocumentDatabase {
    async fn set(&self, path: &str, record: Value) -> StoreResult<()> {
        let segs = segments(path);
        let record = without_nulls(record);
        let mut root = self.root.write();

        if record.is_null() {
            remove_at(&mut root, &segs);
            return Ok(());
        }

        let mut node = &mut *root;
        for seg in segs {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            node = &mut node[seg];
        }
        *node = record;
        Ok(())
    }

    async fn get(&self, path: &str) -> StoreResult<Snapshot> {
        let root = self.root.read();
        let mut node = Some(&*root);
        for seg in segments(path) {
            node = node.and_then(|n| n.get(seg));
        }
        Ok(Snapshot::at_path(path, node.cloned().unwrap_or(Value::Null)))
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        let segs = segments(path);
        remove_at(&mut self.root.write(), &segs);
        Ok(())
    }
}
