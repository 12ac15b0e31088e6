//! DatabaseAdapter Trait - Persistence Abstraction Layer
//!
//! This module defines the `DatabaseAdapter` contract implemented once per
//! back-end (`DocumentStore`, `RelationalStore`) and the scoped
//! `DatabaseTransaction` handle handed to transaction callbacks.
//!
//! # Architecture
//!
//! - **Abstraction Point**: Between services (integrity engine, record
//!   creation, analytics) and a concrete store
//! - **Identical Surface**: Both adapters expose the same CRUD, batch, query,
//!   and transaction semantics; documented asymmetries are batch atomicity and
//!   offset support
//! - **Dyn-compatible**: Consumers hold `Arc<dyn DatabaseAdapter>`; generic
//!   conveniences live on `DatabaseAdapterExt`
//!
//! # Design Decisions
//!
//! 1. **Async-First**: Every operation is async I/O; there is no adapter-level
//!    thread pool, retry, timeout, or cancellation
//! 2. **Not-found on reads is a value**: `find_one`/`find_by_field` return
//!    `None`, `exists` returns `false`, `delete` of a missing id is `Ok(())`
//! 3. **Post-update state**: `update` returns the full merged record,
//!    re-fetched from the store
//! 4. **Scoped transactions**: the handle is closed when the callback
//!    resolves; later use returns `AdapterError::TransactionClosed`
//!
//! # Examples
//!
//! ```rust,no_run
//! use recordspace_core::db::{DatabaseAdapter, DatabaseAdapterExt, DocumentStore};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = DocumentStore::new_in_memory().await?;
//!
//!     let pov = store
//!         .create("povs", json!({"name": "Acme"}).as_object().cloned().unwrap())
//!         .await?;
//!
//!     let renamed = store
//!         .transaction(|tx| async move {
//!             let patch = json!({"name": "Acme Corp"}).as_object().cloned().unwrap();
//!             tx.update("povs", &pov.id, patch).await
//!         })
//!         .await?;
//!
//!     assert_eq!(renamed.get_str("name"), Some("Acme Corp"));
//!     Ok(())
//! }
//! ```

use crate::db::error::{AdapterError, AdapterResult};
use crate::db::factory::DeploymentMode;
use crate::models::{QueryOptions, Record};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

/// Shared handle passed to a transaction callback
pub type TransactionHandle = Arc<dyn DatabaseTransaction>;

/// Type-erased transaction callback accepted by `DatabaseAdapter::run_transaction`
pub type TransactionWork<'a> =
    Box<dyn FnOnce(TransactionHandle) -> BoxFuture<'a, AdapterResult<()>> + Send + 'a>;

/// Operations available inside a transaction
///
/// Every call is applied atomically with the others issued through the same
/// handle, or not at all. Reads observe writes made earlier through the same
/// handle.
#[async_trait]
pub trait DatabaseTransaction: Send + Sync {
    async fn find_one(&self, collection: &str, id: &str) -> AdapterResult<Option<Record>>;

    async fn create(&self, collection: &str, data: Map<String, Value>) -> AdapterResult<Record>;

    async fn update(
        &self,
        collection: &str,
        id: &str,
        data: Map<String, Value>,
    ) -> AdapterResult<Record>;

    async fn delete(&self, collection: &str, id: &str) -> AdapterResult<()>;
}

/// Abstraction layer for record persistence
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; a single instance is shared by every
/// consumer in the process.
#[async_trait]
pub trait DatabaseAdapter: Send + Sync {
    /// Which back-end this adapter talks to
    fn mode(&self) -> DeploymentMode;

    //
    // READS
    //

    /// Records matching every filter; ordering and limit apply after filtering
    ///
    /// `QueryOptions::default()` returns the whole collection, unordered.
    async fn find_many(&self, collection: &str, options: &QueryOptions)
        -> AdapterResult<Vec<Record>>;

    /// Record by id, `None` when missing
    async fn find_one(&self, collection: &str, id: &str) -> AdapterResult<Option<Record>>;

    /// First record whose `field` equals `value`
    ///
    /// "First" is back-end defined; use `find_many` with `order_by` when it matters.
    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: Value,
    ) -> AdapterResult<Option<Record>> {
        let options = QueryOptions::new().where_eq(field, value).limit(1);
        Ok(self.find_many(collection, &options).await?.into_iter().next())
    }

    async fn exists(&self, collection: &str, id: &str) -> AdapterResult<bool> {
        Ok(self.find_one(collection, id).await?.is_some())
    }

    /// Number of matching records, using the back-end's native count path
    async fn count(&self, collection: &str, options: &QueryOptions) -> AdapterResult<u64>;

    //
    // WRITES
    //

    /// Create a record; assigns `id` (when absent) and both timestamps
    async fn create(&self, collection: &str, data: Map<String, Value>) -> AdapterResult<Record>;

    /// Shallow partial update; returns the full post-update record
    ///
    /// Fails with `AdapterError::RecordNotFound` when the record is missing.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        data: Map<String, Value>,
    ) -> AdapterResult<Record>;

    /// Delete a record; deleting a missing id succeeds
    async fn delete(&self, collection: &str, id: &str) -> AdapterResult<()>;

    //
    // BATCH OPERATIONS
    //
    // Atomicity differs per back-end: the document store commits each chunk
    // as one atomic block, the relational store writes row by row and reports
    // `AdapterError::PartialBatch` on failure.
    //

    async fn create_many(
        &self,
        collection: &str,
        items: Vec<Map<String, Value>>,
    ) -> AdapterResult<Vec<Record>>;

    async fn update_many(
        &self,
        collection: &str,
        updates: Vec<(String, Map<String, Value>)>,
    ) -> AdapterResult<Vec<Record>>;

    async fn delete_many(&self, collection: &str, ids: &[String]) -> AdapterResult<()>;

    //
    // TRANSACTIONS
    //

    /// Run `work` with a fresh transaction handle
    ///
    /// Commits when `work` resolves `Ok`, aborts and propagates the error
    /// otherwise. Prefer `DatabaseAdapterExt::transaction` for typed results.
    async fn run_transaction(&self, work: TransactionWork<'_>) -> AdapterResult<()>;

    //
    // LIFECYCLE
    //

    /// Idempotent
    async fn connect(&self) -> AdapterResult<()>;

    /// Idempotent
    async fn disconnect(&self) -> AdapterResult<()>;

    fn is_connected(&self) -> bool;
}

/// Generic conveniences over any `DatabaseAdapter`
pub trait DatabaseAdapterExt: DatabaseAdapter {
    /// Run a transaction callback returning a typed value
    ///
    /// ```rust,no_run
    /// # use recordspace_core::db::{DatabaseAdapter, DatabaseAdapterExt, AdapterError};
    /// # async fn example(adapter: &dyn DatabaseAdapter) -> Result<(), AdapterError> {
    /// let deleted = adapter
    ///     .transaction(|tx| async move {
    ///         if tx.find_one("trrs", "T1").await?.is_none() {
    ///             return Ok(false);
    ///         }
    ///         tx.delete("trrs", "T1").await?;
    ///         Ok(true)
    ///     })
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    fn transaction<'a, T, F, Fut>(&'a self, f: F) -> impl Future<Output = AdapterResult<T>> + Send + 'a
    where
        T: Send + 'a,
        F: FnOnce(TransactionHandle) -> Fut + Send + 'a,
        Fut: Future<Output = AdapterResult<T>> + Send + 'a,
    {
        async move {
            let slot: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));
            let output = Arc::clone(&slot);
            let work: TransactionWork<'a> = Box::new(
                move |tx: TransactionHandle| -> BoxFuture<'a, AdapterResult<()>> {
                    Box::pin(async move {
                        let value = f(tx).await?;
                        *output.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
                        Ok(())
                    })
                },
            );
            self.run_transaction(work).await?;

            let value = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
            value.ok_or(AdapterError::TransactionClosed)
        }
    }

    /// `find_one` deserialized into a caller type
    fn find_one_as<'a, T>(
        &'a self,
        collection: &'a str,
        id: &'a str,
    ) -> impl Future<Output = AdapterResult<Option<T>>> + Send + 'a
    where
        T: DeserializeOwned + Send + 'a,
    {
        async move {
            match self.find_one(collection, id).await? {
                Some(record) => Ok(Some(record.into_typed()?)),
                None => Ok(None),
            }
        }
    }

    /// `find_many` deserialized into a caller type
    fn find_many_as<'a, T>(
        &'a self,
        collection: &'a str,
        options: &'a QueryOptions,
    ) -> impl Future<Output = AdapterResult<Vec<T>>> + Send + 'a
    where
        T: DeserializeOwned + Send + 'a,
    {
        async move {
            self.find_many(collection, options)
                .await?
                .into_iter()
                .map(|record| record.into_typed().map_err(AdapterError::from))
                .collect()
        }
    }
}

impl<A: DatabaseAdapter + ?Sized> DatabaseAdapterExt for A {}
