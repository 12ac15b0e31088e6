//! Database Layer
//!
//! Persistence abstraction shared by every RecordSpace service:
//!
//! - `DatabaseAdapter` / `DatabaseTransaction` - the back-end neutral contract
//! - `DocumentStore` - embedded SurrealDB, SCHEMALESS collections
//! - `RelationalStore` - libsql tables resolved through `ModelRegistry`
//! - `AdapterFactory` - deployment-mode resolution and the shared instance
//! - `BackendParityRunner` - replays operations on both back-ends and compares
//!
//! # Architecture
//!
//! Services receive an `Arc<dyn DatabaseAdapter>` and never name a concrete
//! store. The two adapters differ only where documented: batch atomicity
//! (per chunk vs. per row) and offset pagination (relational only).

mod adapter;
mod document_store;
mod error;
mod factory;
pub mod metrics;
mod model_registry;
mod parity;
mod relational_store;

pub use adapter::{
    DatabaseAdapter, DatabaseAdapterExt, DatabaseTransaction, TransactionHandle, TransactionWork,
};
pub use document_store::{DocumentStore, MAX_BATCH_WRITES};
pub use error::{AdapterError, AdapterResult};
pub use factory::{
    parse_database_url, AdapterFactory, DeploymentMode, FactoryConfig, ModeSource,
    DATABASE_URL_ENV, DEPLOYMENT_MODE_ENV,
};
pub use model_registry::ModelRegistry;
pub use parity::{comparable, BackendParityRunner, ParityOutcome};
pub use relational_store::RelationalStore;
