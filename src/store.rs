use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::documents::Fields;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocKey {
    pub collection: String,
    pub id: String,
}

impl DocKey {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub key: DocKey,
    pub fields: Fields,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document store is unavailable")]
    Unavailable,
    #[error("write to {key} rejected: {reason}")]
    Rejected { key: DocKey, reason: String },
    #[error("failed to read/write store file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("store file {path} has invalid format: {message}")]
    Format { path: PathBuf, message: String },
}

/// Delivers the full document (or `None` once deleted) on every change.
pub type DocSubscription = mpsc::UnboundedReceiver<Option<Document>>;
/// Delivers every document of a collection on every change to any of them.
pub type CollectionSubscription = mpsc::UnboundedReceiver<Vec<Document>>;

/// Document-oriented remote store keyed by collection and id.
///
/// Subscriptions receive the current state immediately and then one full
/// snapshot per change. Callers treat the store as eventually consistent.
pub trait DocumentStore: Send + Sync {
    fn probe(&self) -> Result<(), StoreError>;
    fn get(&self, key: &DocKey) -> Result<Option<Document>, StoreError>;
    /// Top-level field merge: fields not named in `fields` are untouched.
    fn set_merge(&self, key: &DocKey, fields: Fields) -> Result<(), StoreError>;
    fn delete(&self, key: &DocKey) -> Result<(), StoreError>;
    fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError>;
    fn subscribe_doc(&self, key: &DocKey) -> Result<DocSubscription, StoreError>;
    fn subscribe_collection(&self, collection: &str) -> Result<CollectionSubscription, StoreError>;
}

#[derive(Default)]
struct StoreInner {
    docs: BTreeMap<DocKey, Fields>,
    doc_subscribers: Vec<(DocKey, mpsc::UnboundedSender<Option<Document>>)>,
    collection_subscribers: Vec<(String, mpsc::UnboundedSender<Vec<Document>>)>,
}

impl StoreInner {
    fn document(&self, key: &DocKey) -> Option<Document> {
        self.docs.get(key).map(|fields| Document {
            key: key.clone(),
            fields: fields.clone(),
        })
    }

    fn collection(&self, collection: &str) -> Vec<Document> {
        self.docs
            .iter()
            .filter(|(key, _)| key.collection == collection)
            .map(|(key, fields)| Document {
                key: key.clone(),
                fields: fields.clone(),
            })
            .collect()
    }

    fn notify(&mut self, key: &DocKey) {
        let document = self.document(key);
        self.doc_subscribers.retain(|(watched, tx)| {
            if watched != key {
                return !tx.is_closed();
            }
            tx.send(document.clone()).is_ok()
        });

        if self
            .collection_subscribers
            .iter()
            .any(|(collection, _)| *collection == key.collection)
        {
            let snapshot = self.collection(&key.collection);
            self.collection_subscribers.retain(|(collection, tx)| {
                if *collection != key.collection {
                    return !tx.is_closed();
                }
                tx.send(snapshot.clone()).is_ok()
            });
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredDocument {
    collection: String,
    id: String,
    fields: Fields,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u8,
    documents: Vec<StoredDocument>,
}

/// In-process store shared by every session of one host. Optionally backed
/// by a JSON file written on `persist`.
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
    file_path: Option<PathBuf>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            file_path: None,
        }
    }

    /// Loads documents from `path` if it exists. Unreadable or malformed
    /// files start an empty store.
    pub fn with_file(path: PathBuf) -> Self {
        let docs = match load_documents(&path) {
            Ok(docs) => docs,
            Err(error) => {
                warn!(error = %error, "store_load_failed");
                BTreeMap::new()
            }
        };
        Self {
            inner: Mutex::new(StoreInner {
                docs,
                ..StoreInner::default()
            }),
            file_path: Some(path),
        }
    }

    pub fn document_count(&self) -> usize {
        self.lock().docs.len()
    }

    pub fn persist(&self) -> Result<(), StoreError> {
        let Some(path) = self.file_path.as_ref() else {
            return Ok(());
        };
        let payload = {
            let inner = self.lock();
            StoreFile {
                version: 1,
                documents: inner
                    .docs
                    .iter()
                    .map(|(key, fields)| StoredDocument {
                        collection: key.collection.clone(),
                        id: key.id.clone(),
                        fields: fields.clone(),
                    })
                    .collect(),
            }
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let text = serde_json::to_string_pretty(&payload).map_err(|error| StoreError::Format {
            path: path.clone(),
            message: error.to_string(),
        })?;
        fs::write(path, text).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("store lock poisoned; recovered inner value");
            poisoned.into_inner()
        })
    }
}

impl DocumentStore for MemoryStore {
    fn probe(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn get(&self, key: &DocKey) -> Result<Option<Document>, StoreError> {
        Ok(self.lock().document(key))
    }

    fn set_merge(&self, key: &DocKey, fields: Fields) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let current = inner.docs.entry(key.clone()).or_default();
        for (field, value) in fields {
            current.insert(field, value);
        }
        inner.notify(key);
        Ok(())
    }

    fn delete(&self, key: &DocKey) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.docs.remove(key).is_some() {
            debug!(key = %key, "document_deleted");
            inner.notify(key);
        }
        Ok(())
    }

    fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        Ok(self.lock().collection(collection))
    }

    fn subscribe_doc(&self, key: &DocKey) -> Result<DocSubscription, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        // Receiver is alive, so the initial send cannot fail.
        let _ = tx.send(inner.document(key));
        inner.doc_subscribers.push((key.clone(), tx));
        Ok(rx)
    }

    fn subscribe_collection(&self, collection: &str) -> Result<CollectionSubscription, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        let _ = tx.send(inner.collection(collection));
        inner
            .collection_subscribers
            .push((collection.to_string(), tx));
        Ok(rx)
    }
}

fn load_documents(path: &Path) -> Result<BTreeMap<DocKey, Fields>, StoreError> {
    let text = match fs::read_to_string(path) {
        Ok(value) => value,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let raw: Value = serde_json::from_str(&text).map_err(|error| StoreError::Format {
        path: path.to_path_buf(),
        message: error.to_string(),
    })?;
    let parsed: StoreFile = serde_json::from_value(raw).map_err(|error| StoreError::Format {
        path: path.to_path_buf(),
        message: error.to_string(),
    })?;
    if parsed.version != 1 {
        return Err(StoreError::Format {
            path: path.to_path_buf(),
            message: format!("unsupported version {}", parsed.version),
        });
    }

    let mut docs = BTreeMap::new();
    for stored in parsed.documents {
        if stored.collection.trim().is_empty() || stored.id.trim().is_empty() {
            continue;
        }
        docs.insert(DocKey::new(stored.collection, stored.id), stored.fields);
    }
    Ok(docs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().expect("object literal")
    }

    #[test]
    fn set_merge_keeps_untouched_fields() {
        let store = MemoryStore::new();
        let key = DocKey::new("players", "p1");
        store
            .set_merge(&key, fields(json!({ "x": 1, "hugs": 3 })))
            .expect("first write");
        store
            .set_merge(&key, fields(json!({ "x": 2 })))
            .expect("second write");

        let doc = store.get(&key).expect("get").expect("document exists");
        assert_eq!(doc.fields["x"], json!(2));
        assert_eq!(doc.fields["hugs"], json!(3));
    }

    #[test]
    fn doc_subscription_gets_current_state_then_changes() {
        let store = MemoryStore::new();
        let key = DocKey::new("worlds", "default_world");
        let mut rx = store.subscribe_doc(&key).expect("subscribe");
        assert_eq!(rx.try_recv().expect("initial delivery"), None);

        store
            .set_merge(&key, fields(json!({ "lastUpdated": 5 })))
            .expect("write");
        let delivered = rx.try_recv().expect("change delivery").expect("document");
        assert_eq!(delivered.fields["lastUpdated"], json!(5));

        store.delete(&key).expect("delete");
        assert_eq!(rx.try_recv().expect("delete delivery"), None);
    }

    #[test]
    fn collection_subscription_only_fires_for_its_collection() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe_collection("players").expect("subscribe");
        assert!(rx.try_recv().expect("initial delivery").is_empty());

        store
            .set_merge(&DocKey::new("worlds", "w"), fields(json!({ "a": 1 })))
            .expect("unrelated write");
        assert!(rx.try_recv().is_err());

        store
            .set_merge(&DocKey::new("players", "p1"), fields(json!({ "online": true })))
            .expect("player write");
        let snapshot = rx.try_recv().expect("collection delivery");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].key.id, "p1");
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let store = MemoryStore::new();
        let key = DocKey::new("worlds", "w");
        drop(store.subscribe_doc(&key).expect("subscribe"));
        store
            .set_merge(&key, fields(json!({ "a": 1 })))
            .expect("write");
        assert!(store.lock().doc_subscribers.is_empty());
    }

    #[test]
    fn persisted_documents_survive_reload() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("store.json");

        let store = MemoryStore::with_file(path.clone());
        store
            .set_merge(&DocKey::new("players", "p1"), fields(json!({ "hugs": 4 })))
            .expect("write");
        store.persist().expect("persist");

        let reloaded = MemoryStore::with_file(path);
        let doc = reloaded
            .get(&DocKey::new("players", "p1"))
            .expect("get")
            .expect("document survives");
        assert_eq!(doc.fields["hugs"], json!(4));
    }

    #[test]
    fn unsupported_file_version_starts_empty() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("store.json");
        fs::write(&path, r#"{ "version": 9, "documents": [] }"#).expect("write file");

        assert!(matches!(
            load_documents(&path),
            Err(StoreError::Format { .. })
        ));
        assert_eq!(MemoryStore::with_file(path).document_count(), 0);
    }
}
