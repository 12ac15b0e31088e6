//! Backend Parity Runner
//!
//! Replays one operation against a document-store adapter and a relational
//! adapter, fails if the two results differ, and records both latencies.
//! Cross-backend conformance tests are built on it.
//!
//! Results usually need normalizing before comparison: generated ids and
//! timestamps differ per back-end. `comparable` strips the system timestamps
//! and orders records by id.
//!
//! # Example
//!
//! ```rust,no_run
//! use recordspace_core::db::{
//!     comparable, BackendParityRunner, DatabaseAdapter, DocumentStore, RelationalStore,
//! };
//! use recordspace_core::models::QueryOptions;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let relational = RelationalStore::new("parity.db");
//!     relational.connect().await?;
//!     let runner = BackendParityRunner::new(
//!         Arc::new(DocumentStore::new_in_memory().await?),
//!         Arc::new(relational),
//!     );
//!
//!     let outcome = runner
//!         .run("list_trrs", |adapter| async move {
//!             let records = adapter.find_many("trrs", &QueryOptions::default()).await?;
//!             Ok(comparable(records))
//!         })
//!         .await?;
//!     println!("{} TRRs, Δ {:.1}%", outcome.result.len(), outcome.delta_percent);
//!     Ok(())
//! }
//! ```

use crate::db::adapter::DatabaseAdapter;
use crate::db::error::AdapterResult;
use crate::db::factory::DeploymentMode;
use crate::db::metrics::{delta_percent, LatencyCollector};
use crate::models::Record;
use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Outcome of one parity run
#[derive(Debug)]
pub struct ParityOutcome<T> {
    pub document_duration: Duration,
    pub relational_duration: Duration,
    /// Positive means the relational adapter was slower
    pub delta_percent: f64,
    /// The (identical) result both adapters produced
    pub result: T,
}

pub struct BackendParityRunner {
    document: Arc<dyn DatabaseAdapter>,
    relational: Arc<dyn DatabaseAdapter>,
    metrics: Mutex<LatencyCollector>,
}

impl BackendParityRunner {
    pub fn new(document: Arc<dyn DatabaseAdapter>, relational: Arc<dyn DatabaseAdapter>) -> Self {
        Self {
            document,
            relational,
            metrics: Mutex::new(LatencyCollector::new()),
        }
    }

    /// Run `op` on the document adapter, then the relational adapter
    ///
    /// # Errors
    ///
    /// Fails when either adapter's operation fails or the results differ.
    pub async fn run<F, Fut, T>(&self, operation: &str, op: F) -> Result<ParityOutcome<T>>
    where
        F: Fn(Arc<dyn DatabaseAdapter>) -> Fut + Send + Sync,
        Fut: Future<Output = AdapterResult<T>> + Send,
        T: PartialEq + std::fmt::Debug + Send,
    {
        let started = Instant::now();
        let document_result = op(Arc::clone(&self.document))
            .await
            .with_context(|| format!("{} failed for {}", DeploymentMode::DocumentStore, operation))?;
        let document_duration = started.elapsed();

        let started = Instant::now();
        let relational_result = op(Arc::clone(&self.relational))
            .await
            .with_context(|| format!("{} failed for {}", DeploymentMode::SelfHosted, operation))?;
        let relational_duration = started.elapsed();

        if document_result != relational_result {
            anyhow::bail!(
                "Adapters diverged for '{}'\ndocument-store: {:?}\nself-hosted: {:?}",
                operation,
                document_result,
                relational_result
            );
        }

        self.metrics
            .lock()
            .await
            .record(operation, document_duration, relational_duration);
        tracing::debug!(
            operation,
            document_ms = document_duration.as_secs_f64() * 1000.0,
            relational_ms = relational_duration.as_secs_f64() * 1000.0,
            "parity run matched"
        );

        Ok(ParityOutcome {
            document_duration,
            relational_duration,
            delta_percent: delta_percent(document_duration, relational_duration),
            result: document_result,
        })
    }

    /// Snapshot of the collected latencies
    pub async fn metrics(&self) -> LatencyCollector {
        self.metrics.lock().await.clone()
    }

    pub async fn report(&self) -> String {
        self.metrics.lock().await.report()
    }
}

/// Records as `(id, data)` pairs ordered by id, timestamps dropped
pub fn comparable(records: Vec<Record>) -> Vec<(String, Map<String, Value>)> {
    let mut pairs: Vec<(String, Map<String, Value>)> = records
        .into_iter()
        .map(|record| (record.id, record.data))
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    pairs
}
