use core_lib::{CoreError, Document, DocumentStore, Query, Transaction};
use serde::de::DeserializeOwned;

// Declare sub-modules within the application layer
pub mod authz;
pub mod commands;
pub mod dispatcher;
pub mod identity;
pub mod middleware;
pub mod query;

/// Load and decode a document, failing with `NotFound` when absent.
pub(crate) async fn load<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
    what: &str,
) -> Result<T, CoreError> {
    store
        .get(collection, id)
        .await?
        .ok_or_else(|| CoreError::NotFound(what.to_string()))?
        .decode()
}

/// Transactional read; the version observed is checked at commit.
pub(crate) async fn fetch<T: DeserializeOwned>(
    tx: &mut dyn Transaction,
    collection: &str,
    id: &str,
) -> Result<Option<T>, CoreError> {
    match tx.get(collection, id).await? {
        Some(doc) => Ok(Some(doc.decode()?)),
        None => Ok(None),
    }
}

pub(crate) fn decode_all<T: DeserializeOwned>(docs: Vec<Document>) -> Result<Vec<T>, CoreError> {
    docs.iter().map(|doc| doc.decode()).collect()
}

/// Transactional emptiness check; any later insert into the collection
/// invalidates the transaction.
pub(crate) async fn query_is_empty(
    tx: &mut dyn Transaction,
    collection: &str,
) -> Result<bool, CoreError> {
    Ok(tx
        .query(collection, &Query::new().limit(1))
        .await?
        .is_empty())
}
