use crate::{CoreError, Document, DocumentStore, Query, Transaction};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Collection {
    // Bumped on every write so a transaction that scanned the collection
    // can detect phantoms.
    version: u64,
    docs: BTreeMap<String, (u64, Value)>,
}

#[derive(Debug, Default)]
struct Inner {
    collections: HashMap<String, Collection>,
}

impl Inner {
    fn doc_version(&self, collection: &str, id: &str) -> u64 {
        self.collections
            .get(collection)
            .and_then(|c| c.docs.get(id))
            .map(|(v, _)| *v)
            .unwrap_or(0)
    }

    fn collection_version(&self, collection: &str) -> u64 {
        self.collections
            .get(collection)
            .map(|c| c.version)
            .unwrap_or(0)
    }

    fn get(&self, collection: &str, id: &str) -> Option<Document> {
        self.collections
            .get(collection)
            .and_then(|c| c.docs.get(id))
            .map(|(version, data)| Document {
                id: id.to_string(),
                version: *version,
                data: data.clone(),
            })
    }

    fn query(&self, collection: &str, query: &Query) -> Vec<Document> {
        let candidates = match self.collections.get(collection) {
            Some(c) => c
                .docs
                .iter()
                .filter(|(_, (_, data))| query.matches(data))
                .map(|(id, (version, data))| Document {
                    id: id.clone(),
                    version: *version,
                    data: data.clone(),
                })
                .collect(),
            None => Vec::new(),
        };
        query.apply(candidates)
    }

    fn write(&mut self, collection: &str, id: &str, data: Value) -> Document {
        let coll = self.collections.entry(collection.to_string()).or_default();
        coll.version += 1;
        let version = coll.docs.get(id).map(|(v, _)| v + 1).unwrap_or(1);
        coll.docs.insert(id.to_string(), (version, data.clone()));
        Document {
            id: id.to_string(),
            version,
            data,
        }
    }

    fn remove(&mut self, collection: &str, id: &str) -> bool {
        match self.collections.get_mut(collection) {
            Some(coll) => {
                let removed = coll.docs.remove(id).is_some();
                if removed {
                    coll.version += 1;
                }
                removed
            }
            None => false,
        }
    }
}

/// In-memory implementation of the DocumentStore port for tests and
/// single-process mode. Transactions use optimistic concurrency: every
/// document or collection read through the handle is re-checked under the
/// write lock at commit time.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    inner: Arc<RwLock<Inner>>,
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, CoreError> {
        Ok(self.inner.read().await.get(collection, id))
    }

    async fn create(&self, collection: &str, id: &str, data: Value) -> Result<Document, CoreError> {
        let mut inner = self.inner.write().await;
        if inner.doc_version(collection, id) > 0 {
            return Err(CoreError::AlreadyExists(format!("{}/{}", collection, id)));
        }
        Ok(inner.write(collection, id, data))
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<Document, CoreError> {
        Ok(self.inner.write().await.write(collection, id, data))
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, CoreError> {
        Ok(self.inner.write().await.remove(collection, id))
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, CoreError> {
        Ok(self.inner.read().await.query(collection, query))
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>, CoreError> {
        Ok(Box::new(InMemoryTransaction {
            inner: self.inner.clone(),
            doc_reads: HashMap::new(),
            collection_reads: HashMap::new(),
            writes: Vec::new(),
        }))
    }
}

#[derive(Debug)]
enum PendingWrite {
    Create(String, String, Value),
    Set(String, String, Value),
    Delete(String, String),
}

struct InMemoryTransaction {
    inner: Arc<RwLock<Inner>>,
    doc_reads: HashMap<(String, String), u64>,
    collection_reads: HashMap<String, u64>,
    writes: Vec<PendingWrite>,
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn get(&mut self, collection: &str, id: &str) -> Result<Option<Document>, CoreError> {
        let inner = self.inner.read().await;
        let doc = inner.get(collection, id);
        self.doc_reads
            .entry((collection.to_string(), id.to_string()))
            .or_insert_with(|| doc.as_ref().map(|d| d.version).unwrap_or(0));
        Ok(doc)
    }

    async fn query(&mut self, collection: &str, query: &Query) -> Result<Vec<Document>, CoreError> {
        let inner = self.inner.read().await;
        self.collection_reads
            .entry(collection.to_string())
            .or_insert_with(|| inner.collection_version(collection));
        Ok(inner.query(collection, query))
    }

    fn create(&mut self, collection: &str, id: &str, data: Value) {
        self.writes.push(PendingWrite::Create(
            collection.to_string(),
            id.to_string(),
            data,
        ));
    }

    fn set(&mut self, collection: &str, id: &str, data: Value) {
        self.writes
            .push(PendingWrite::Set(collection.to_string(), id.to_string(), data));
    }

    fn delete(&mut self, collection: &str, id: &str) {
        self.writes
            .push(PendingWrite::Delete(collection.to_string(), id.to_string()));
    }

    async fn commit(self: Box<Self>) -> Result<(), CoreError> {
        let InMemoryTransaction {
            inner: lock,
            doc_reads,
            collection_reads,
            writes,
        } = *self;
        let mut inner = lock.write().await;

        for ((collection, id), expected) in &doc_reads {
            let actual = inner.doc_version(collection, id);
            if actual != *expected {
                return Err(CoreError::Concurrency(format!(
                    "{}/{} changed (expected version {}, found {})",
                    collection, id, expected, actual
                )));
            }
        }
        for (collection, expected) in &collection_reads {
            let actual = inner.collection_version(collection);
            if actual != *expected {
                return Err(CoreError::Concurrency(format!(
                    "collection {} changed (expected version {}, found {})",
                    collection, expected, actual
                )));
            }
        }
        // Validate creates before touching anything so the commit stays atomic.
        for write in &writes {
            if let PendingWrite::Create(collection, id, _) = write {
                if inner.doc_version(collection, id) > 0 {
                    return Err(CoreError::AlreadyExists(format!("{}/{}", collection, id)));
                }
            }
        }

        for write in writes {
            match write {
                PendingWrite::Create(collection, id, data) | PendingWrite::Set(collection, id, data) => {
                    inner.write(&collection, &id, data);
                }
                PendingWrite::Delete(collection, id) => {
                    inner.remove(&collection, &id);
                }
            }
        }
        Ok(())
    }
}
