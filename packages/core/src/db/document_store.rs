//! DocumentStore - DatabaseAdapter Implementation for SurrealDB
//!
//! This module implements the `DatabaseAdapter` contract against an embedded
//! SurrealDB instance used as a schemaless collection store.
//!
//! # Design Principles
//!
//! 1. **SCHEMALESS tables**: one table per collection, created implicitly on first write
//! 2. **Record IDs**: `collection:⟨id⟩`; the id is mirrored into a reserved `_id`
//!    field and every `SELECT` omits the native `id`, so results are plain JSON
//! 3. **Atomic batches**: batch writes run as one `BEGIN … COMMIT` block per
//!    chunk of `MAX_BATCH_WRITES`
//! 4. **Optimistic transactions**: reads through a transaction handle record
//!    the `updatedAt` they saw; writes are staged and committed in one block
//!    that re-checks those versions first
//!
//! # Limitations
//!
//! - `QueryOptions::offset` is not supported and fails with
//!   `AdapterError::Unsupported`
//! - Caller fields named `_id` and `_nulls` are reserved and overwritten
//! - Explicit nulls are stored as NONE; their paths are kept in `_nulls` and
//!   restored on read
//! - Atomicity of `create_many`/`update_many`/`delete_many` holds per chunk;
//!   a failure in a later chunk reports `AdapterError::PartialBatch`
//!
//! # Examples
//!
//! ```rust,no_run
//! use recordspace_core::db::{DatabaseAdapter, DocumentStore};
//! use recordspace_core::models::QueryOptions;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = DocumentStore::new_in_memory().await?;
//!     store.connect().await?;
//!
//!     let options = QueryOptions::new().where_eq("projectId", json!("P1"));
//!     let trrs = store.find_many("trrs", &options).await?;
//!     println!("{} TRRs in P1", trrs.len());
//!     Ok(())
//! }
//! ```

use crate::db::adapter::{DatabaseAdapter, DatabaseTransaction, TransactionHandle, TransactionWork};
use crate::db::error::{AdapterError, AdapterResult};
use crate::db::factory::DeploymentMode;
use crate::models::{
    format_timestamp, merge_patch, prepare_create, validate_collection, validate_field_path,
    ComparisonOp, QueryFilter, QueryOptions, Record, CREATED_AT_FIELD, ID_FIELD,
    UPDATED_AT_FIELD,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use surrealdb::engine::local::{Db, Mem, RocksDb};
use surrealdb::Surreal;

/// Maximum writes committed in one atomic block
pub const MAX_BATCH_WRITES: usize = 500;

/// Reserved field mirroring the record key inside each document
const KEY_FIELD: &str = "_id";

/// Reserved field listing the paths of explicit nulls; SurrealDB stores a
/// bound JSON null as NONE, which drops the field
const NULLS_FIELD: &str = "_nulls";

const BACKEND: &str = "document store";
const NAMESPACE: &str = "recordspace";
const DATABASE: &str = "records";
const CONFLICT_MARKER: &str = "transaction conflict";
const CANCELLED_MARKER: &str = "failed transaction";

/// Query text plus named bindings
#[derive(Debug)]
struct SurrealQuery {
    sql: String,
    bindings: Vec<(String, Value)>,
}

impl SurrealQuery {
    async fn run(self, db: &Surreal<Db>) -> AdapterResult<surrealdb::Response> {
        let mut query = db.query(self.sql);
        for binding in self.bindings {
            query = query.bind(binding);
        }
        Ok(query.await?.check()?)
    }
}

/// A single statement inside an atomic block
#[derive(Debug, Clone)]
enum WriteOp {
    Create {
        collection: String,
        key: String,
        document: Value,
    },
    Replace {
        collection: String,
        key: String,
        document: Value,
    },
    Delete {
        collection: String,
        key: String,
    },
    /// Abort the block unless the stored `updatedAt` still equals `version`
    ExpectVersion {
        collection: String,
        key: String,
        version: String,
    },
}

impl WriteOp {
    /// Id reported as committed once the block succeeds
    fn written_key(&self) -> Option<&str> {
        match self {
            WriteOp::Create { key, .. } | WriteOp::Replace { key, .. } | WriteOp::Delete { key, .. } => {
                Some(key)
            }
            WriteOp::ExpectVersion { .. } => None,
        }
    }
}

fn field_expr(field: &str) -> AdapterResult<String> {
    let path = if field == ID_FIELD { KEY_FIELD } else { field };
    validate_field_path(path)?;
    Ok(path
        .split('.')
        .map(|segment| format!("`{}`", segment))
        .collect::<Vec<_>>()
        .join("."))
}

fn render_filter(
    filter: &QueryFilter,
    index: usize,
    bindings: &mut Vec<(String, Value)>,
) -> AdapterResult<String> {
    let expr = field_expr(&filter.field)?;
    let param = format!("f{}", index);

    let clause = match (filter.operator, &filter.value) {
        // Absent fields are NONE, explicit nulls are NULL; both count as null
        (ComparisonOp::Eq, Value::Null) => format!("({expr} = NULL OR {expr} = NONE)"),
        (ComparisonOp::Ne, Value::Null) => format!("({expr} != NULL AND {expr} != NONE)"),
        (ComparisonOp::In, _) => {
            bindings.push((param.clone(), Value::Array(filter.in_values())));
            format!("{expr} IN ${param}")
        }
        (ComparisonOp::ArrayContains, value) => {
            bindings.push((param.clone(), value.clone()));
            format!("{expr} CONTAINS ${param}")
        }
        (ComparisonOp::Eq, value) => {
            bindings.push((param.clone(), value.clone()));
            format!("{expr} = ${param}")
        }
        (ComparisonOp::Ne, value) => {
            bindings.push((param.clone(), value.clone()));
            format!("{expr} != ${param}")
        }
        // Ordering only holds between values of the same JSON type, so
        // missing, null and differently typed fields never match a range
        (_, Value::Null) => "false".to_string(),
        (op, value) => {
            let symbol = match op {
                ComparisonOp::Gt => ">",
                ComparisonOp::Lt => "<",
                ComparisonOp::Gte => ">=",
                _ => "<=",
            };
            let type_check = match value {
                Value::Bool(_) => "type::is::bool",
                Value::Number(_) => "type::is::number",
                Value::String(_) => "type::is::string",
                Value::Array(_) => "type::is::array",
                _ => "type::is::object",
            };
            bindings.push((param.clone(), value.clone()));
            format!("({type_check}({expr}) AND {expr} {symbol} ${param})")
        }
    };
    Ok(clause)
}

fn where_clause(
    filters: &[QueryFilter],
    bindings: &mut Vec<(String, Value)>,
) -> AdapterResult<String> {
    if filters.is_empty() {
        return Ok(String::new());
    }
    let clauses = filters
        .iter()
        .enumerate()
        .map(|(index, filter)| render_filter(filter, index, bindings))
        .collect::<AdapterResult<Vec<_>>>()?;
    Ok(format!(" WHERE {}", clauses.join(" AND ")))
}

fn build_select(collection: &str, options: &QueryOptions) -> AdapterResult<SurrealQuery> {
    validate_collection(collection)?;
    if options.offset.unwrap_or(0) > 0 {
        return Err(AdapterError::unsupported(BACKEND, "offset pagination"));
    }

    let mut bindings = vec![("collection".to_string(), Value::from(collection))];
    let mut sql = String::from("SELECT * OMIT id FROM type::table($collection)");
    sql.push_str(&where_clause(&options.filters, &mut bindings)?);

    if let Some(order_by) = &options.order_by {
        sql.push_str(&format!(
            " ORDER BY {} {}",
            field_expr(order_by)?,
            options.order_direction.as_sql()
        ));
    }
    if let Some(limit) = options.limit {
        sql.push_str(" LIMIT $limit");
        bindings.push(("limit".to_string(), Value::from(limit as u64)));
    }
    sql.push(';');

    Ok(SurrealQuery { sql, bindings })
}

fn build_count(collection: &str, options: &QueryOptions) -> AdapterResult<SurrealQuery> {
    validate_collection(collection)?;

    let mut bindings = vec![("collection".to_string(), Value::from(collection))];
    let mut sql = String::from("SELECT count() AS total FROM type::table($collection)");
    sql.push_str(&where_clause(&options.filters, &mut bindings)?);
    sql.push_str(" GROUP ALL;");

    Ok(SurrealQuery { sql, bindings })
}

fn build_atomic_block(ops: &[WriteOp]) -> SurrealQuery {
    let mut sql = String::from("BEGIN TRANSACTION;\n");
    let mut bindings = Vec::new();

    for (i, op) in ops.iter().enumerate() {
        match op {
            WriteOp::Create {
                collection,
                key,
                document,
            } => {
                sql.push_str(&format!(
                    "CREATE type::thing($c{i}, $k{i}) CONTENT $d{i} RETURN NONE;\n"
                ));
                bindings.push((format!("c{i}"), Value::from(collection.as_str())));
                bindings.push((format!("k{i}"), Value::from(key.as_str())));
                bindings.push((format!("d{i}"), document.clone()));
            }
            WriteOp::Replace {
                collection,
                key,
                document,
            } => {
                sql.push_str(&format!(
                    "UPDATE type::thing($c{i}, $k{i}) CONTENT $d{i} RETURN NONE;\n"
                ));
                bindings.push((format!("c{i}"), Value::from(collection.as_str())));
                bindings.push((format!("k{i}"), Value::from(key.as_str())));
                bindings.push((format!("d{i}"), document.clone()));
            }
            WriteOp::Delete { collection, key } => {
                sql.push_str(&format!("DELETE type::thing($c{i}, $k{i}) RETURN NONE;\n"));
                bindings.push((format!("c{i}"), Value::from(collection.as_str())));
                bindings.push((format!("k{i}"), Value::from(key.as_str())));
            }
            WriteOp::ExpectVersion {
                collection,
                key,
                version,
            } => {
                sql.push_str(&format!(
                    "LET $cur{i} = (SELECT VALUE `{UPDATED_AT_FIELD}` FROM type::thing($c{i}, $k{i}));\n\
                     IF $cur{i} != [$v{i}] {{ THROW \"{CONFLICT_MARKER}\"; }};\n"
                ));
                bindings.push((format!("c{i}"), Value::from(collection.as_str())));
                bindings.push((format!("k{i}"), Value::from(key.as_str())));
                bindings.push((format!("v{i}"), Value::from(version.as_str())));
            }
        }
    }
    sql.push_str("COMMIT TRANSACTION;");

    SurrealQuery { sql, bindings }
}

/// Path of every explicit null in `data`; object keys are strings and array
/// positions are numbers
fn null_paths(data: &Map<String, Value>) -> Vec<Value> {
    fn visit(value: &Value, prefix: &mut Vec<Value>, out: &mut Vec<Value>) {
        match value {
            Value::Null => out.push(Value::Array(prefix.clone())),
            Value::Object(map) => {
                for (key, child) in map {
                    prefix.push(Value::from(key.as_str()));
                    visit(child, prefix, out);
                    prefix.pop();
                }
            }
            Value::Array(items) => {
                for (index, child) in items.iter().enumerate() {
                    prefix.push(Value::from(index));
                    visit(child, prefix, out);
                    prefix.pop();
                }
            }
            _ => {}
        }
    }

    let mut out = Vec::new();
    let mut prefix = Vec::new();
    for (key, value) in data {
        prefix.push(Value::from(key.as_str()));
        visit(value, &mut prefix, &mut out);
        prefix.pop();
    }
    out
}

fn restore_null(target: &mut Value, path: &[Value]) {
    let Some((segment, rest)) = path.split_first() else {
        return;
    };
    match target {
        Value::Object(map) => {
            let Some(key) = segment.as_str() else {
                return;
            };
            if rest.is_empty() {
                map.insert(key.to_string(), Value::Null);
            } else if let Some(child) = map.get_mut(key) {
                restore_null(child, rest);
            }
        }
        Value::Array(items) => {
            let Some(item) = segment
                .as_u64()
                .and_then(|i| usize::try_from(i).ok())
                .and_then(|i| items.get_mut(i))
            else {
                return;
            };
            if rest.is_empty() {
                *item = Value::Null;
            } else {
                restore_null(item, rest);
            }
        }
        _ => {}
    }
}

/// Stored shape: caller data plus `_id`, formatted timestamps and the
/// `_nulls` list when the data holds explicit nulls
fn record_to_document(record: &Record) -> Value {
    let mut document = record.data.clone();

    let nulls = null_paths(&record.data);
    if !nulls.is_empty() {
        document.insert(NULLS_FIELD.to_string(), Value::Array(nulls));
    }

    document.insert(KEY_FIELD.to_string(), Value::from(record.id.as_str()));
    document.insert(
        CREATED_AT_FIELD.to_string(),
        Value::from(format_timestamp(&record.created_at)),
    );
    document.insert(
        UPDATED_AT_FIELD.to_string(),
        Value::from(format_timestamp(&record.updated_at)),
    );
    Value::Object(document)
}

fn document_to_record(collection: &str, document: Value) -> AdapterResult<Record> {
    let Value::Object(mut map) = document else {
        return Err(AdapterError::corrupt_record(
            collection,
            "document is not an object",
        ));
    };
    let key = match map.remove(KEY_FIELD) {
        Some(Value::String(key)) => key,
        _ => {
            return Err(AdapterError::corrupt_record(
                collection,
                format!("document is missing its `{}` field", KEY_FIELD),
            ))
        }
    };
    map.insert(ID_FIELD.to_string(), Value::String(key.clone()));

    let nulls = map.remove(NULLS_FIELD);
    let mut document = Value::Object(map);
    if let Some(Value::Array(paths)) = nulls {
        for path in paths {
            if let Value::Array(segments) = path {
                restore_null(&mut document, &segments);
            }
        }
    }

    serde_json::from_value(document)
        .map_err(|e| AdapterError::corrupt_record(collection, format!("{}: {}", key, e)))
}

async fn fetch_document(
    db: &Surreal<Db>,
    collection: &str,
    id: &str,
) -> AdapterResult<Option<Record>> {
    validate_collection(collection)?;
    let query = SurrealQuery {
        sql: "SELECT * OMIT id FROM type::thing($collection, $key);".to_string(),
        bindings: vec![
            ("collection".to_string(), Value::from(collection)),
            ("key".to_string(), Value::from(id)),
        ],
    };
    let mut response = query.run(db).await?;
    let documents: Vec<Value> = response.take(0)?;

    documents
        .into_iter()
        .next()
        .map(|document| document_to_record(collection, document))
        .transpose()
}

/// Run one atomic block; conflicts thrown by `ExpectVersion` map to
/// `AdapterError::TransactionConflict`
async fn execute_atomic(db: &Surreal<Db>, ops: &[WriteOp]) -> AdapterResult<()> {
    if ops.is_empty() {
        return Ok(());
    }

    let block = build_atomic_block(ops);
    let mut query = db.query(block.sql);
    for binding in block.bindings {
        query = query.bind(binding);
    }
    let mut response = query.await?;

    let mut errors: Vec<(usize, surrealdb::Error)> = response.take_errors().into_iter().collect();
    if errors.is_empty() {
        return Ok(());
    }
    errors.sort_by_key(|(index, _)| *index);

    if errors
        .iter()
        .any(|(_, e)| e.to_string().contains(CONFLICT_MARKER))
    {
        let keys: Vec<String> = ops
            .iter()
            .filter_map(|op| match op {
                WriteOp::ExpectVersion {
                    collection, key, ..
                } => Some(format!("{}/{}", collection, key)),
                _ => None,
            })
            .collect();
        return Err(AdapterError::TransactionConflict(format!(
            "records changed since read: {}",
            keys.join(", ")
        )));
    }

    // Statements cancelled by the failed block all carry the same generic
    // error; report the one that caused the rollback
    let position = errors
        .iter()
        .position(|(_, e)| !e.to_string().contains(CANCELLED_MARKER))
        .unwrap_or(0);
    let (_, cause) = errors.swap_remove(position);
    Err(cause.into())
}

/// Split ops into blocks of at most `MAX_BATCH_WRITES` writes; an
/// `ExpectVersion` stays in the block of the write that follows it
fn chunk_ops(ops: &[WriteOp]) -> Vec<&[WriteOp]> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut writes = 0;
    for (index, op) in ops.iter().enumerate() {
        if op.written_key().is_some() {
            writes += 1;
            if writes == MAX_BATCH_WRITES {
                chunks.push(&ops[start..=index]);
                start = index + 1;
                writes = 0;
            }
        }
    }
    if start < ops.len() {
        chunks.push(&ops[start..]);
    }
    chunks
}

/// Run write ops chunk by chunk, reporting committed ids on a later failure
async fn execute_chunked(db: &Surreal<Db>, ops: &[WriteOp]) -> AdapterResult<()> {
    let mut committed: Vec<String> = Vec::new();
    for chunk in chunk_ops(ops) {
        if let Err(e) = execute_atomic(db, chunk).await {
            if committed.is_empty() {
                return Err(e);
            }
            return Err(AdapterError::partial_batch(committed, e));
        }
        for key in chunk.iter().filter_map(WriteOp::written_key) {
            if !committed.iter().any(|done| done == key) {
                committed.push(key.to_string());
            }
        }
    }
    Ok(())
}

/// DocumentStore implements DatabaseAdapter for embedded SurrealDB
pub struct DocumentStore {
    /// SurrealDB connection (embedded engine)
    db: Arc<Surreal<Db>>,

    /// Lifecycle flag only; the embedded engine has no connection handshake
    connected: AtomicBool,
}

impl DocumentStore {
    /// Create a store backed by on-disk RocksDB at `db_path`
    ///
    /// # Errors
    ///
    /// Returns error if the RocksDB engine cannot be opened at `db_path`.
    pub async fn new(db_path: PathBuf) -> AdapterResult<Self> {
        let db = Surreal::new::<RocksDb>(db_path).await?;
        Self::initialize(db).await
    }

    /// Create a store backed by the in-memory engine (contents vanish on drop)
    pub async fn new_in_memory() -> AdapterResult<Self> {
        let db = Surreal::new::<Mem>(()).await?;
        Self::initialize(db).await
    }

    async fn initialize(db: Surreal<Db>) -> AdapterResult<Self> {
        db.use_ns(NAMESPACE).use_db(DATABASE).await?;
        Ok(Self {
            db: Arc::new(db),
            connected: AtomicBool::new(false),
        })
    }

    /// Merge a batch of patches in order, failing before any write
    ///
    /// A repeated id is merged onto its previous result. The returned ops
    /// guard each id with the `updatedAt` read here, so a concurrent write
    /// between the read and the commit fails the block.
    async fn merged_updates(
        &self,
        collection: &str,
        updates: Vec<(String, Map<String, Value>)>,
    ) -> AdapterResult<(Vec<WriteOp>, Vec<Record>)> {
        let mut latest: HashMap<String, Record> = HashMap::new();
        let mut ops = Vec::with_capacity(updates.len() * 2);
        let mut merged = Vec::with_capacity(updates.len());

        for (id, patch) in updates {
            let current = match latest.remove(&id) {
                Some(record) => record,
                None => {
                    let record = fetch_document(&self.db, collection, &id)
                        .await?
                        .ok_or_else(|| AdapterError::record_not_found(collection, &id))?;
                    ops.push(WriteOp::ExpectVersion {
                        collection: collection.to_string(),
                        key: id.clone(),
                        version: format_timestamp(&record.updated_at),
                    });
                    record
                }
            };
            let next = merge_patch(current, patch);
            ops.push(WriteOp::Replace {
                collection: collection.to_string(),
                key: id.clone(),
                document: record_to_document(&next),
            });
            latest.insert(id, next.clone());
            merged.push(next);
        }
        Ok((ops, merged))
    }
}

#[derive(Debug, Deserialize)]
struct CountRow {
    total: u64,
}

#[async_trait]
impl DatabaseAdapter for DocumentStore {
    fn mode(&self) -> DeploymentMode {
        DeploymentMode::DocumentStore
    }

    async fn find_many(
        &self,
        collection: &str,
        options: &QueryOptions,
    ) -> AdapterResult<Vec<Record>> {
        let query = build_select(collection, options)?;
        tracing::debug!(collection, sql = %query.sql, "document find_many");

        let mut response = query.run(&self.db).await?;
        let documents: Vec<Value> = response.take(0)?;
        documents
            .into_iter()
            .map(|document| document_to_record(collection, document))
            .collect()
    }

    async fn find_one(&self, collection: &str, id: &str) -> AdapterResult<Option<Record>> {
        fetch_document(&self.db, collection, id).await
    }

    async fn count(&self, collection: &str, options: &QueryOptions) -> AdapterResult<u64> {
        let query = build_count(collection, options)?;
        let mut response = query.run(&self.db).await?;
        let rows: Vec<CountRow> = response.take(0)?;
        Ok(rows.first().map(|row| row.total).unwrap_or(0))
    }

    async fn create(&self, collection: &str, data: Map<String, Value>) -> AdapterResult<Record> {
        validate_collection(collection)?;
        let record = prepare_create(data);

        let query = SurrealQuery {
            sql: "CREATE type::thing($collection, $key) CONTENT $content RETURN NONE;".to_string(),
            bindings: vec![
                ("collection".to_string(), Value::from(collection)),
                ("key".to_string(), Value::from(record.id.as_str())),
                ("content".to_string(), record_to_document(&record)),
            ],
        };
        query.run(&self.db).await?;
        tracing::debug!(collection, id = %record.id, "document create");

        fetch_document(&self.db, collection, &record.id)
            .await?
            .ok_or_else(|| AdapterError::record_not_found(collection, &record.id))
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        data: Map<String, Value>,
    ) -> AdapterResult<Record> {
        let current = fetch_document(&self.db, collection, id)
            .await?
            .ok_or_else(|| AdapterError::record_not_found(collection, id))?;
        let next = merge_patch(current, data);

        let query = SurrealQuery {
            sql: "UPDATE type::thing($collection, $key) CONTENT $content RETURN NONE;".to_string(),
            bindings: vec![
                ("collection".to_string(), Value::from(collection)),
                ("key".to_string(), Value::from(id)),
                ("content".to_string(), record_to_document(&next)),
            ],
        };
        query.run(&self.db).await?;
        tracing::debug!(collection, id, "document update");

        // Re-fetch so callers see exactly what the store holds
        fetch_document(&self.db, collection, id)
            .await?
            .ok_or_else(|| AdapterError::record_not_found(collection, id))
    }

    async fn delete(&self, collection: &str, id: &str) -> AdapterResult<()> {
        validate_collection(collection)?;
        let query = SurrealQuery {
            sql: "DELETE type::thing($collection, $key) RETURN NONE;".to_string(),
            bindings: vec![
                ("collection".to_string(), Value::from(collection)),
                ("key".to_string(), Value::from(id)),
            ],
        };
        query.run(&self.db).await?;
        tracing::debug!(collection, id, "document delete");
        Ok(())
    }

    async fn create_many(
        &self,
        collection: &str,
        items: Vec<Map<String, Value>>,
    ) -> AdapterResult<Vec<Record>> {
        validate_collection(collection)?;
        let records: Vec<Record> = items.into_iter().map(prepare_create).collect();
        let ops: Vec<WriteOp> = records
            .iter()
            .map(|record| WriteOp::Create {
                collection: collection.to_string(),
                key: record.id.clone(),
                document: record_to_document(record),
            })
            .collect();

        execute_chunked(&self.db, &ops).await?;
        tracing::debug!(collection, count = records.len(), "document create_many");
        Ok(records)
    }

    async fn update_many(
        &self,
        collection: &str,
        updates: Vec<(String, Map<String, Value>)>,
    ) -> AdapterResult<Vec<Record>> {
        let (ops, records) = self.merged_updates(collection, updates).await?;
        execute_chunked(&self.db, &ops).await?;
        tracing::debug!(collection, count = records.len(), "document update_many");
        Ok(records)
    }

    async fn delete_many(&self, collection: &str, ids: &[String]) -> AdapterResult<()> {
        validate_collection(collection)?;
        let ops: Vec<WriteOp> = ids
            .iter()
            .map(|id| WriteOp::Delete {
                collection: collection.to_string(),
                key: id.clone(),
            })
            .collect();
        execute_chunked(&self.db, &ops).await
    }

    async fn run_transaction(&self, work: TransactionWork<'_>) -> AdapterResult<()> {
        let tx = Arc::new(DocumentTransaction::new(Arc::clone(&self.db)));
        let handle: TransactionHandle = tx.clone();

        let outcome = work(handle).await;
        let staged = tx.close();

        match outcome {
            Ok(()) => {
                let ops = staged.into_commit_ops();
                tracing::debug!(statements = ops.len(), "document transaction commit");
                execute_atomic(&self.db, &ops).await
            }
            Err(e) => {
                tracing::debug!(error = %e, "document transaction aborted");
                Err(e)
            }
        }
    }

    async fn connect(&self) -> AdapterResult<()> {
        if !self.connected.swap(true, Ordering::SeqCst) {
            tracing::info!("Document store connected");
        }
        Ok(())
    }

    async fn disconnect(&self) -> AdapterResult<()> {
        if self.connected.swap(false, Ordering::SeqCst) {
            tracing::info!("Document store disconnected");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

type RecordKey = (String, String);

/// Staged state of an open document transaction
#[derive(Default)]
struct StagedTransaction {
    open: bool,
    /// Transaction-local view: `Some` = written, `None` = deleted
    overlay: HashMap<RecordKey, Option<Record>>,
    /// `updatedAt` observed by reads, re-checked at commit
    observed: HashMap<RecordKey, String>,
    writes: Vec<WriteOp>,
}

impl StagedTransaction {
    fn into_commit_ops(self) -> Vec<WriteOp> {
        if self.writes.is_empty() {
            return Vec::new();
        }
        let mut ops: Vec<WriteOp> = self
            .observed
            .into_iter()
            .map(|((collection, key), version)| WriteOp::ExpectVersion {
                collection,
                key,
                version,
            })
            .collect();
        ops.extend(self.writes);
        ops
    }
}

struct DocumentTransaction {
    db: Arc<Surreal<Db>>,
    state: Mutex<StagedTransaction>,
}

impl DocumentTransaction {
    fn new(db: Arc<Surreal<Db>>) -> Self {
        Self {
            db,
            state: Mutex::new(StagedTransaction {
                open: true,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StagedTransaction> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the state, failing if the callback already returned
    fn open_state(&self) -> AdapterResult<MutexGuard<'_, StagedTransaction>> {
        let state = self.lock();
        if state.open {
            Ok(state)
        } else {
            Err(AdapterError::TransactionClosed)
        }
    }

    fn close(&self) -> StagedTransaction {
        let mut state = self.lock();
        std::mem::take(&mut *state)
    }

    fn stage(&self, key: RecordKey, value: Option<Record>, op: WriteOp) -> AdapterResult<()> {
        let mut state = self.open_state()?;
        state.overlay.insert(key, value);
        state.writes.push(op);
        Ok(())
    }
}

#[async_trait]
impl DatabaseTransaction for DocumentTransaction {
    async fn find_one(&self, collection: &str, id: &str) -> AdapterResult<Option<Record>> {
        let key = (collection.to_string(), id.to_string());
        {
            let state = self.open_state()?;
            if let Some(local) = state.overlay.get(&key) {
                return Ok(local.clone());
            }
        }

        let fetched = fetch_document(&self.db, collection, id).await?;

        {
            let mut state = self.open_state()?;
            if let Some(record) = &fetched {
                state
                    .observed
                    .entry(key)
                    .or_insert_with(|| format_timestamp(&record.updated_at));
            }
        }
        Ok(fetched)
    }

    async fn create(&self, collection: &str, data: Map<String, Value>) -> AdapterResult<Record> {
        validate_collection(collection)?;
        let record = prepare_create(data);
        let op = WriteOp::Create {
            collection: collection.to_string(),
            key: record.id.clone(),
            document: record_to_document(&record),
        };
        self.stage(
            (collection.to_string(), record.id.clone()),
            Some(record.clone()),
            op,
        )?;
        Ok(record)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        data: Map<String, Value>,
    ) -> AdapterResult<Record> {
        let current = self
            .find_one(collection, id)
            .await?
            .ok_or_else(|| AdapterError::record_not_found(collection, id))?;
        let next = merge_patch(current, data);
        let op = WriteOp::Replace {
            collection: collection.to_string(),
            key: id.to_string(),
            document: record_to_document(&next),
        };
        self.stage(
            (collection.to_string(), id.to_string()),
            Some(next.clone()),
            op,
        )?;
        Ok(next)
    }

    async fn delete(&self, collection: &str, id: &str) -> AdapterResult<()> {
        validate_collection(collection)?;
        let op = WriteOp::Delete {
            collection: collection.to_string(),
            key: id.to_string(),
        };
        self.stage((collection.to_string(), id.to_string()), None, op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderDirection;
    use serde_json::json;

    #[test]
    fn test_select_translation() {
        let options = QueryOptions::new()
            .where_eq("projectId", json!("P1"))
            .filter("trrIds", ComparisonOp::ArrayContains, json!("T1"))
            .filter("status", ComparisonOp::In, json!(["open", "blocked"]))
            .order_by("createdAt", OrderDirection::Desc)
            .limit(5);

        let query = build_select("povs", &options).unwrap();
        assert_eq!(
            query.sql,
            "SELECT * OMIT id FROM type::table($collection) \
             WHERE `projectId` = $f0 AND `trrIds` CONTAINS $f1 AND `status` IN $f2 \
             ORDER BY `createdAt` DESC LIMIT $limit;"
        );
        assert!(query
            .bindings
            .contains(&("f2".to_string(), json!(["open", "blocked"]))));
        assert!(query.bindings.contains(&("limit".to_string(), json!(5))));
    }

    #[test]
    fn test_id_filter_targets_key_field() {
        let options = QueryOptions::new().filter("id", ComparisonOp::Ne, json!("T1"));
        let query = build_select("trrs", &options).unwrap();
        assert!(query.sql.contains("`_id` != $f0"));
    }

    #[test]
    fn test_null_equality_matches_absent_fields() {
        let options = QueryOptions::new().where_eq("povId", Value::Null);
        let query = build_select("trrs", &options).unwrap();
        assert!(query.sql.contains("(`povId` = NULL OR `povId` = NONE)"));
    }

    #[test]
    fn test_range_filters_require_matching_type() {
        let options = QueryOptions::new()
            .filter("priority", ComparisonOp::Lt, json!(2))
            .filter("dueDate", ComparisonOp::Gte, json!("2025-01-01"));
        let query = build_select("trrs", &options).unwrap();
        assert!(query
            .sql
            .contains("(type::is::number(`priority`) AND `priority` < $f0)"));
        assert!(query
            .sql
            .contains("(type::is::string(`dueDate`) AND `dueDate` >= $f1)"));

        let options = QueryOptions::new().filter("priority", ComparisonOp::Lte, Value::Null);
        let query = build_select("trrs", &options).unwrap();
        assert!(query.sql.contains("WHERE false"));
    }

    #[test]
    fn test_offset_is_rejected() {
        let options = QueryOptions::new().offset(10);
        let err = build_select("trrs", &options).unwrap_err();
        assert!(matches!(err, AdapterError::Unsupported { .. }));

        // Zero offset is a no-op, not an error
        assert!(build_select("trrs", &QueryOptions::new().offset(0)).is_ok());
    }

    #[test]
    fn test_invalid_identifiers_are_rejected() {
        assert!(build_select("trrs;", &QueryOptions::new()).is_err());
        let options = QueryOptions::new().where_eq("a` = 1 OR `b", json!(1));
        assert!(matches!(
            build_select("trrs", &options),
            Err(AdapterError::InvalidField(_))
        ));
    }

    #[test]
    fn test_count_translation_ignores_paging() {
        let options = QueryOptions::new()
            .where_eq("projectId", json!("P1"))
            .limit(1);
        let query = build_count("trrs", &options).unwrap();
        assert_eq!(
            query.sql,
            "SELECT count() AS total FROM type::table($collection) WHERE `projectId` = $f0 GROUP ALL;"
        );
    }

    #[test]
    fn test_atomic_block_wraps_statements() {
        let ops = vec![
            WriteOp::ExpectVersion {
                collection: "trrs".to_string(),
                key: "T1".to_string(),
                version: "2025-01-01T00:00:00.000000Z".to_string(),
            },
            WriteOp::Delete {
                collection: "trrs".to_string(),
                key: "T1".to_string(),
            },
        ];
        let block = build_atomic_block(&ops);
        assert!(block.sql.starts_with("BEGIN TRANSACTION;"));
        assert!(block.sql.ends_with("COMMIT TRANSACTION;"));
        assert!(block.sql.contains("THROW \"transaction conflict\""));
        assert!(block.sql.contains("DELETE type::thing($c1, $k1) RETURN NONE;"));
        assert_eq!(ops[0].written_key(), None);
        assert_eq!(ops[1].written_key(), Some("T1"));
    }

    #[test]
    fn test_document_round_trip() {
        let record = prepare_create(
            json!({"id": "V1", "projectId": "P1"})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let document = record_to_document(&record);
        assert_eq!(document["_id"], "V1");
        assert!(document.get("id").is_none());

        let back = document_to_record("povs", document).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_explicit_nulls_survive_dropped_fields() {
        let record = prepare_create(
            json!({
                "id": "T1",
                "povId": null,
                "plan": {"owner": null, "steps": [null, {"by": null}]}
            })
            .as_object()
            .cloned()
            .unwrap(),
        );
        let document = record_to_document(&record);
        let nulls = document["_nulls"].as_array().unwrap();
        assert_eq!(nulls.len(), 4);
        for path in [
            json!(["povId"]),
            json!(["plan", "owner"]),
            json!(["plan", "steps", 0]),
            json!(["plan", "steps", 1, "by"]),
        ] {
            assert!(nulls.contains(&path), "missing {}", path);
        }

        // What SurrealDB hands back once NONE fields are gone
        let mut stored = document.clone();
        let map = stored.as_object_mut().unwrap();
        map.remove("povId");
        map["plan"] = json!({"steps": [null, {}]});

        let back = document_to_record("trrs", stored).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_documents_without_nulls_carry_no_null_list() {
        let record = prepare_create(json!({"id": "V1"}).as_object().cloned().unwrap());
        assert!(record_to_document(&record).get("_nulls").is_none());
    }

    #[tokio::test]
    async fn test_batch_update_fails_on_write_after_read() {
        let store = DocumentStore::new_in_memory().await.unwrap();
        store
            .create("trrs", json!({"id": "T1"}).as_object().cloned().unwrap())
            .await
            .unwrap();

        let (ops, merged) = store
            .merged_updates(
                "trrs",
                vec![
                    ("T1".to_string(), json!({"status": "open"}).as_object().cloned().unwrap()),
                    ("T1".to_string(), json!({"owner": "u1"}).as_object().cloned().unwrap()),
                ],
            )
            .await
            .unwrap();
        assert_eq!(ops.len(), 3);
        assert!(matches!(&ops[0], WriteOp::ExpectVersion { key, .. } if key == "T1"));
        assert_eq!(merged[1].get_str("status"), Some("open"));
        assert_eq!(merged[1].get_str("owner"), Some("u1"));

        // A write landing between the read and the commit
        store
            .update("trrs", "T1", json!({"status": "blocked"}).as_object().cloned().unwrap())
            .await
            .unwrap();

        let err = execute_chunked(&store.db, &ops).await.unwrap_err();
        assert!(matches!(err, AdapterError::TransactionConflict(_)), "{}", err);
        let stored = fetch_document(&store.db, "trrs", "T1").await.unwrap().unwrap();
        assert_eq!(stored.get_str("status"), Some("blocked"));
        assert!(stored.get("owner").is_none());
    }

    #[test]
    fn test_chunks_keep_version_checks_with_their_write() {
        let replace = |key: &str| WriteOp::Replace {
            collection: "trrs".to_string(),
            key: key.to_string(),
            document: json!({}),
        };
        let expect = |key: &str| WriteOp::ExpectVersion {
            collection: "trrs".to_string(),
            key: key.to_string(),
            version: "v".to_string(),
        };

        let mut ops = Vec::new();
        for i in 0..MAX_BATCH_WRITES - 1 {
            ops.push(replace(&format!("T{}", i)));
        }
        ops.push(expect("A"));
        ops.push(replace("A"));
        ops.push(expect("B"));
        ops.push(replace("B"));

        let chunks = chunk_ops(&ops);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), MAX_BATCH_WRITES + 1);
        assert!(matches!(chunks[0].last(), Some(WriteOp::Replace { key, .. }) if key == "A"));
        assert!(matches!(&chunks[1][0], WriteOp::ExpectVersion { key, .. } if key == "B"));
        assert!(chunk_ops(&[]).is_empty());
    }

    #[test]
    fn test_document_without_key_is_corrupt() {
        let err = document_to_record("povs", json!({"projectId": "P1"})).unwrap_err();
        assert!(matches!(err, AdapterError::CorruptRecord { .. }));
    }
}
