use async_trait::async_trait;
use std::{error::Error as StdError, future::Future, time::Duration};
use tracing::warn;

// Declare modules
pub mod adapters;
pub mod crypto;
pub mod document;
pub mod domain;

pub use document::{Document, Filter, OrderBy, Query};

// Define a common error type for the core library
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid argument: {0}")]
    Validation(String),
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("Concurrency conflict: {0}")]
    Concurrency(String),
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Decryption error: {0}")]
    Decryption(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Infrastructure error: {0}")]
    Infrastructure(#[from] Box<dyn StdError + Send + Sync>),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

impl From<crypto::CryptoError> for CoreError {
    fn from(err: crypto::CryptoError) -> Self {
        match err {
            crypto::CryptoError::InvalidInput(msg) => CoreError::Validation(msg),
            crypto::CryptoError::DecryptionFailed(msg) => CoreError::Decryption(msg),
            crypto::CryptoError::EncryptionFailed(msg) => CoreError::Internal(msg),
            crypto::CryptoError::InvalidKey(msg) => CoreError::Configuration(msg),
        }
    }
}

// Marker trait for commands
pub trait Command: Send + Sync + 'static {}

// Port for handling commands. Handlers return whatever the caller needs
// to render (the updated profile, the created appointment, ...).
pub trait CommandHandler<C: Command>: Send + Sync {
    type Output: Send;

    fn handle(&self, command: C) -> impl Future<Output = Result<Self::Output, CoreError>> + Send;
}

// Port for the document database
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, CoreError>;

    /// Insert a new document. Fails with `AlreadyExists` if the key is taken.
    async fn create(
        &self,
        collection: &str,
        id: &str,
        data: serde_json::Value,
    ) -> Result<Document, CoreError>;

    /// Insert or replace a document.
    async fn set(
        &self,
        collection: &str,
        id: &str,
        data: serde_json::Value,
    ) -> Result<Document, CoreError>;

    /// Returns whether a document was removed.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool, CoreError>;

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, CoreError>;

    /// Open a transaction. Reads through the handle are tracked and
    /// re-validated on commit.
    async fn begin(&self) -> Result<Box<dyn Transaction>, CoreError>;
}

// Unit of work over a DocumentStore. Writes are buffered until commit.
#[async_trait]
pub trait Transaction: Send {
    async fn get(&mut self, collection: &str, id: &str) -> Result<Option<Document>, CoreError>;

    async fn query(&mut self, collection: &str, query: &Query)
        -> Result<Vec<Document>, CoreError>;

    fn create(&mut self, collection: &str, id: &str, data: serde_json::Value);

    fn set(&mut self, collection: &str, id: &str, data: serde_json::Value);

    fn delete(&mut self, collection: &str, id: &str);

    /// Atomically apply buffered writes if nothing read by this
    /// transaction changed since it was read. Fails with `Concurrency`
    /// otherwise.
    async fn commit(self: Box<Self>) -> Result<(), CoreError>;
}

pub const MAX_TRANSACTION_ATTEMPTS: u32 = 5;

/// Run `f` inside a fresh transaction, retrying the whole unit when the
/// commit loses a race. `f` receives the transaction by value and hands it
/// back together with its result so the future owns it.
pub async fn run_in_transaction<T, F, Fut>(
    store: &dyn DocumentStore,
    operation: &str,
    mut f: F,
) -> Result<T, CoreError>
where
    F: FnMut(Box<dyn Transaction>) -> Fut,
    Fut: Future<Output = Result<(Box<dyn Transaction>, T), CoreError>>,
{
    let mut attempt = 1;
    loop {
        let tx = store.begin().await?;
        let (tx, value) = f(tx).await?;
        match tx.commit().await {
            Ok(()) => return Ok(value),
            Err(CoreError::Concurrency(reason)) if attempt < MAX_TRANSACTION_ATTEMPTS => {
                warn!(
                    operation,
                    attempt, "transaction conflict, retrying: {}", reason
                );
                tokio::time::sleep(Duration::from_millis(10 * u64::from(attempt))).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

// Port for publishing events to a message bus
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        event_type: &str,
        event_payload: &[u8],
    ) -> Result<(), CoreError>;
}

// Port for caching data
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CoreError>;
    async fn set(&self, key: &str, value: &[u8], ttl_seconds: Option<u64>)
        -> Result<(), CoreError>;
    async fn delete(&self, key: &str) -> Result<(), CoreError>;
}

// Port for the managed key service
#[async_trait]
pub trait KeyProvider: Send + Sync {
    async fn data_key(&self) -> Result<crypto::EncryptionKey, CoreError>;
}

// Port for the mobile push gateway
#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send(&self, tokens: &[String], title: &str, body: &str) -> Result<(), CoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::in_memory_store::InMemoryDocumentStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_run_in_transaction_commits() {
        let store = InMemoryDocumentStore::default();
        let value = run_in_transaction(&store, "test", |mut tx| async move {
            tx.set("things", "a", json!({"n": 1}));
            Ok::<_, CoreError>((tx, 7))
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
        assert!(store.get("things", "a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_run_in_transaction_retries_after_conflict() {
        let store = InMemoryDocumentStore::default();
        store.set("counters", "c", json!({"n": 0})).await.unwrap();
        let attempts = Arc::new(AtomicU32::new(0));

        let result = run_in_transaction(&store, "increment", |mut tx| {
            let attempts = attempts.clone();
            let store = store.clone();
            async move {
                let doc = tx.get("counters", "c").await?.unwrap();
                let n = doc.data["n"].as_i64().unwrap();
                // Simulate a concurrent writer on the first attempt only.
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    store.set("counters", "c", json!({"n": 100})).await?;
                }
                tx.set("counters", "c", json!({"n": n + 1}));
                Ok::<_, CoreError>((tx, ()))
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        let doc = store.get("counters", "c").await.unwrap().unwrap();
        assert_eq!(doc.data["n"], 101);
    }

    #[tokio::test]
    async fn test_run_in_transaction_propagates_closure_error() {
        let store = InMemoryDocumentStore::default();
        let result: Result<(), CoreError> =
            run_in_transaction(&store, "fail", |_tx| async move {
                Err(CoreError::NotFound("nothing".into()))
            })
            .await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }
}
