//! RelationalStore - DatabaseAdapter Implementation for libsql
//!
//! Stores each collection in a table resolved through `ModelRegistry`. System
//! fields are typed columns; caller fields live in a JSON `data` column and
//! are queried with `json_extract`/`json_each`.
//!
//! # Connection Handling
//!
//! Every operation opens its own connection with a 5-second busy timeout, so
//! concurrent async callers serialize on the SQLite lock instead of failing.
//! Transactions pin one connection for their whole lifetime.
//!
//! # Batch Semantics
//!
//! `create_many`, `update_many` and `delete_many` write row by row and are not
//! atomic: a failure part way reports `AdapterError::PartialBatch` with the ids
//! already committed. Use `create_many_atomic` when all-or-nothing is needed.

use crate::db::adapter::{DatabaseAdapter, DatabaseTransaction, TransactionHandle, TransactionWork};
use crate::db::error::{AdapterError, AdapterResult};
use crate::db::factory::DeploymentMode;
use crate::db::model_registry::ModelRegistry;
use crate::models::{
    format_timestamp, merge_patch, prepare_create, validate_field_path, ComparisonOp,
    QueryFilter, QueryOptions, Record, CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::params::Params;
use libsql::{Builder, Connection, Database, Row, Rows};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::RwLock;

const RECORD_COLUMNS: &str = "id, data, created_at, updated_at";

/// SQL text plus positional parameters
#[derive(Debug)]
struct SqlQuery {
    sql: String,
    params: Vec<libsql::Value>,
}

/// JSON scalar → SQL value, matching what `json_extract` yields for the same JSON
fn to_sql_value(value: &Value) -> libsql::Value {
    match value {
        Value::Null => libsql::Value::Null,
        Value::Bool(b) => libsql::Value::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => libsql::Value::Integer(i),
            None => libsql::Value::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => libsql::Value::Text(s.clone()),
        other => libsql::Value::Text(other.to_string()),
    }
}

/// Where a filtered field lives: a TEXT system column or a path in `data`
enum FieldRef<'a> {
    Column(&'static str),
    Json(&'a str),
}

impl<'a> FieldRef<'a> {
    fn parse(field: &'a str) -> AdapterResult<Self> {
        Ok(match field {
            ID_FIELD => FieldRef::Column("id"),
            CREATED_AT_FIELD => FieldRef::Column("created_at"),
            UPDATED_AT_FIELD => FieldRef::Column("updated_at"),
            path => {
                validate_field_path(path)?;
                FieldRef::Json(path)
            }
        })
    }

    fn value_expr(&self) -> String {
        match self {
            FieldRef::Column(column) => column.to_string(),
            FieldRef::Json(path) => format!("json_extract(data, '$.{}')", path),
        }
    }

    fn type_expr(&self) -> Option<String> {
        match self {
            FieldRef::Column(_) => None,
            FieldRef::Json(path) => Some(format!("json_type(data, '$.{}')", path)),
        }
    }
}

fn column_expr(field: &str) -> AdapterResult<String> {
    Ok(FieldRef::parse(field)?.value_expr())
}

/// `json_type` names for values of the same JSON type as `value`
fn json_types(value: &Value) -> &'static str {
    match value {
        Value::Null => "'null'",
        Value::Bool(_) => "'true', 'false'",
        Value::Number(_) => "'integer', 'real'",
        Value::String(_) => "'text'",
        Value::Array(_) => "'array'",
        Value::Object(_) => "'object'",
    }
}

/// Comparison that only holds between values of the same JSON type
///
/// `json_extract` turns booleans into 0/1, so the type check is what keeps
/// `true` from matching a stored `1`. System columns only hold text.
fn typed_comparison(
    value_expr: &str,
    type_expr: Option<&str>,
    symbol: &str,
    value: &Value,
    params: &mut Vec<libsql::Value>,
) -> String {
    match type_expr {
        Some(type_expr) => {
            params.push(to_sql_value(value));
            format!(
                "({} IN ({}) AND {} {} ?)",
                type_expr,
                json_types(value),
                value_expr,
                symbol
            )
        }
        None if value.is_string() => {
            params.push(to_sql_value(value));
            format!("{} {} ?", value_expr, symbol)
        }
        None => "0".to_string(),
    }
}

/// Equality where null also matches an absent field
fn equals(
    value_expr: &str,
    type_expr: Option<&str>,
    value: &Value,
    params: &mut Vec<libsql::Value>,
) -> String {
    if value.is_null() {
        format!("{} IS NULL", value_expr)
    } else {
        typed_comparison(value_expr, type_expr, "=", value, params)
    }
}

fn render_filter(filter: &QueryFilter, params: &mut Vec<libsql::Value>) -> AdapterResult<String> {
    if filter.operator == ComparisonOp::ArrayContains {
        validate_field_path(&filter.field)?;
        let matches = equals("json_each.value", Some("json_each.type"), &filter.value, params);
        return Ok(format!(
            "EXISTS (SELECT 1 FROM json_each(data, '$.{}') WHERE {})",
            filter.field, matches
        ));
    }

    let field = FieldRef::parse(&filter.field)?;
    let value_expr = field.value_expr();
    let type_expr = field.type_expr();
    let type_expr = type_expr.as_deref();

    let clause = match (filter.operator, &filter.value) {
        (ComparisonOp::In, _) => {
            let values = filter.in_values();
            if values.is_empty() {
                // Empty IN-list matches nothing
                "0".to_string()
            } else {
                let alternatives: Vec<String> = values
                    .iter()
                    .map(|value| equals(&value_expr, type_expr, value, params))
                    .collect();
                format!("({})", alternatives.join(" OR "))
            }
        }
        (ComparisonOp::Eq, value) => equals(&value_expr, type_expr, value, params),
        // Negated equality keeps rows where the field is absent, like the
        // document store
        (ComparisonOp::Ne, Value::Null) => format!("{} IS NOT NULL", value_expr),
        (ComparisonOp::Ne, value) => format!(
            "NOT COALESCE({}, 0)",
            equals(&value_expr, type_expr, value, params)
        ),
        (op, value) => {
            let symbol = match op {
                ComparisonOp::Gt => ">",
                ComparisonOp::Lt => "<",
                ComparisonOp::Gte => ">=",
                _ => "<=",
            };
            typed_comparison(&value_expr, type_expr, symbol, value, params)
        }
    };
    Ok(clause)
}

fn where_clause(filters: &[QueryFilter], params: &mut Vec<libsql::Value>) -> AdapterResult<String> {
    if filters.is_empty() {
        return Ok(String::new());
    }
    let clauses = filters
        .iter()
        .map(|filter| render_filter(filter, params))
        .collect::<AdapterResult<Vec<_>>>()?;
    Ok(format!(" WHERE {}", clauses.join(" AND ")))
}

fn build_select(table: &str, options: &QueryOptions) -> AdapterResult<SqlQuery> {
    let mut params = Vec::new();
    let mut sql = format!("SELECT {} FROM \"{}\"", RECORD_COLUMNS, table);
    sql.push_str(&where_clause(&options.filters, &mut params)?);

    if let Some(order_by) = &options.order_by {
        sql.push_str(&format!(
            " ORDER BY {} {}",
            column_expr(order_by)?,
            options.order_direction.as_sql()
        ));
    }

    match (options.limit, options.offset) {
        (Some(limit), offset) => {
            sql.push_str(" LIMIT ?");
            params.push(libsql::Value::Integer(limit as i64));
            if let Some(offset) = offset {
                sql.push_str(" OFFSET ?");
                params.push(libsql::Value::Integer(offset as i64));
            }
        }
        (None, Some(offset)) => {
            // SQLite requires a LIMIT before OFFSET; -1 means unbounded
            sql.push_str(" LIMIT -1 OFFSET ?");
            params.push(libsql::Value::Integer(offset as i64));
        }
        (None, None) => {}
    }

    Ok(SqlQuery { sql, params })
}

fn build_count(table: &str, options: &QueryOptions) -> AdapterResult<SqlQuery> {
    let mut params = Vec::new();
    let mut sql = format!("SELECT COUNT(*) FROM \"{}\"", table);
    sql.push_str(&where_clause(&options.filters, &mut params)?);
    Ok(SqlQuery { sql, params })
}

fn parse_timestamp(collection: &str, value: &str) -> AdapterResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            AdapterError::corrupt_record(collection, format!("bad timestamp '{}': {}", value, e))
        })
}

fn row_to_record(collection: &str, row: &Row) -> AdapterResult<Record> {
    let id: String = row.get(0)?;
    let data_json: String = row.get(1)?;
    let created_at: String = row.get(2)?;
    let updated_at: String = row.get(3)?;

    let data: Map<String, Value> = serde_json::from_str(&data_json)
        .map_err(|e| AdapterError::corrupt_record(collection, format!("{}: {}", id, e)))?;

    Ok(Record {
        created_at: parse_timestamp(collection, &created_at)?,
        updated_at: parse_timestamp(collection, &updated_at)?,
        id,
        data,
    })
}

async fn collect_records(collection: &str, mut rows: Rows) -> AdapterResult<Vec<Record>> {
    let mut records = Vec::new();
    while let Some(row) = rows.next().await? {
        records.push(row_to_record(collection, &row)?);
    }
    Ok(records)
}

/// Run a PRAGMA; they return rows, so `query` is used instead of `execute`
async fn execute_pragma(conn: &Connection, pragma: &str) -> AdapterResult<()> {
    let mut stmt = conn.prepare(pragma).await?;
    let _ = stmt.query(()).await?;
    Ok(())
}

//
// ROW OPERATIONS
// Shared by the adapter and by transactions; each takes the connection to use.
//

async fn fetch_row(
    conn: &Connection,
    collection: &str,
    table: &str,
    id: &str,
) -> AdapterResult<Option<Record>> {
    let sql = format!("SELECT {} FROM \"{}\" WHERE id = ?", RECORD_COLUMNS, table);
    let mut rows = conn.query(&sql, [id]).await?;
    match rows.next().await? {
        Some(row) => Ok(Some(row_to_record(collection, &row)?)),
        None => Ok(None),
    }
}

async fn insert_row(conn: &Connection, table: &str, record: &Record) -> AdapterResult<()> {
    let sql = format!(
        "INSERT INTO \"{}\" ({}) VALUES (?, ?, ?, ?)",
        table, RECORD_COLUMNS
    );
    conn.execute(
        &sql,
        Params::Positional(vec![
            libsql::Value::Text(record.id.clone()),
            libsql::Value::Text(serde_json::to_string(&record.data)?),
            libsql::Value::Text(format_timestamp(&record.created_at)),
            libsql::Value::Text(format_timestamp(&record.updated_at)),
        ]),
    )
    .await?;
    Ok(())
}

async fn replace_row(conn: &Connection, table: &str, record: &Record) -> AdapterResult<()> {
    let sql = format!(
        "UPDATE \"{}\" SET data = ?, updated_at = ? WHERE id = ?",
        table
    );
    conn.execute(
        &sql,
        Params::Positional(vec![
            libsql::Value::Text(serde_json::to_string(&record.data)?),
            libsql::Value::Text(format_timestamp(&record.updated_at)),
            libsql::Value::Text(record.id.clone()),
        ]),
    )
    .await?;
    Ok(())
}

async fn delete_row(conn: &Connection, table: &str, id: &str) -> AdapterResult<()> {
    let sql = format!("DELETE FROM \"{}\" WHERE id = ?", table);
    conn.execute(&sql, [id]).await?;
    Ok(())
}

/// Fetch, merge and write back; returns the stored post-update record
async fn update_row(
    conn: &Connection,
    collection: &str,
    table: &str,
    id: &str,
    patch: Map<String, Value>,
) -> AdapterResult<Record> {
    let current = fetch_row(conn, collection, table, id)
        .await?
        .ok_or_else(|| AdapterError::record_not_found(collection, id))?;
    replace_row(conn, table, &merge_patch(current, patch)).await?;

    fetch_row(conn, collection, table, id)
        .await?
        .ok_or_else(|| AdapterError::record_not_found(collection, id))
}

/// RelationalStore implements DatabaseAdapter for a local libsql database
pub struct RelationalStore {
    db_path: PathBuf,
    registry: ModelRegistry,

    /// `None` while disconnected
    db: RwLock<Option<Arc<Database>>>,
    connected: AtomicBool,

    /// Tables known to exist, so lazy creation runs once per table
    known_tables: Mutex<HashSet<String>>,
}

impl RelationalStore {
    /// Store at `db_path` with the default collection mappings
    ///
    /// Nothing is opened until `connect()`.
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self::with_registry(db_path, ModelRegistry::default())
    }

    pub fn with_registry(db_path: impl Into<PathBuf>, registry: ModelRegistry) -> Self {
        Self {
            db_path: db_path.into(),
            registry,
            db: RwLock::new(None),
            connected: AtomicBool::new(false),
            known_tables: Mutex::new(HashSet::new()),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Get an async connection with busy timeout configured
    async fn connect_with_timeout(&self) -> AdapterResult<Connection> {
        let db = self
            .db
            .read()
            .await
            .clone()
            .ok_or(AdapterError::NotConnected)?;
        let conn = db.connect()?;
        execute_pragma(&conn, "PRAGMA busy_timeout = 5000").await?;
        Ok(conn)
    }

    /// Resolve the table for `collection`, creating it on first use
    async fn ensure_table(&self, conn: &Connection, collection: &str) -> AdapterResult<String> {
        let table = self.registry.table_for(collection)?;
        let known = self
            .known_tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&table);
        if !known {
            conn.execute(&ModelRegistry::create_table_sql(&table), ())
                .await?;
            self.known_tables
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(table.clone());
        }
        Ok(table)
    }

    /// Insert every item in one SQL transaction; nothing is written on failure
    pub async fn create_many_atomic(
        &self,
        collection: &str,
        items: Vec<Map<String, Value>>,
    ) -> AdapterResult<Vec<Record>> {
        let conn = self.connect_with_timeout().await?;
        let table = self.ensure_table(&conn, collection).await?;
        let records: Vec<Record> = items.into_iter().map(prepare_create).collect();

        conn.execute("BEGIN IMMEDIATE", ()).await?;
        for record in &records {
            if let Err(e) = insert_row(&conn, &table, record).await {
                let _rollback = conn.execute("ROLLBACK", ()).await;
                return Err(e);
            }
        }
        if let Err(e) = conn.execute("COMMIT", ()).await {
            let _rollback = conn.execute("ROLLBACK", ()).await;
            return Err(e.into());
        }

        tracing::debug!(collection, count = records.len(), "relational create_many_atomic");
        Ok(records)
    }
}

#[async_trait]
impl DatabaseAdapter for RelationalStore {
    fn mode(&self) -> DeploymentMode {
        DeploymentMode::SelfHosted
    }

    async fn find_many(
        &self,
        collection: &str,
        options: &QueryOptions,
    ) -> AdapterResult<Vec<Record>> {
        let conn = self.connect_with_timeout().await?;
        let table = self.ensure_table(&conn, collection).await?;
        let query = build_select(&table, options)?;
        tracing::debug!(collection, sql = %query.sql, "relational find_many");

        let rows = conn.query(&query.sql, Params::Positional(query.params)).await?;
        collect_records(collection, rows).await
    }

    async fn find_one(&self, collection: &str, id: &str) -> AdapterResult<Option<Record>> {
        let conn = self.connect_with_timeout().await?;
        let table = self.ensure_table(&conn, collection).await?;
        fetch_row(&conn, collection, &table, id).await
    }

    async fn count(&self, collection: &str, options: &QueryOptions) -> AdapterResult<u64> {
        let conn = self.connect_with_timeout().await?;
        let table = self.ensure_table(&conn, collection).await?;
        let query = build_count(&table, options)?;

        let mut rows = conn.query(&query.sql, Params::Positional(query.params)).await?;
        let total: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(total.max(0) as u64)
    }

    async fn create(&self, collection: &str, data: Map<String, Value>) -> AdapterResult<Record> {
        let conn = self.connect_with_timeout().await?;
        let table = self.ensure_table(&conn, collection).await?;
        let record = prepare_create(data);
        insert_row(&conn, &table, &record).await?;
        tracing::debug!(collection, id = %record.id, "relational create");

        fetch_row(&conn, collection, &table, &record.id)
            .await?
            .ok_or_else(|| AdapterError::record_not_found(collection, &record.id))
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        data: Map<String, Value>,
    ) -> AdapterResult<Record> {
        let conn = self.connect_with_timeout().await?;
        let table = self.ensure_table(&conn, collection).await?;
        let record = update_row(&conn, collection, &table, id, data).await?;
        tracing::debug!(collection, id, "relational update");
        Ok(record)
    }

    async fn delete(&self, collection: &str, id: &str) -> AdapterResult<()> {
        let conn = self.connect_with_timeout().await?;
        let table = self.ensure_table(&conn, collection).await?;
        delete_row(&conn, &table, id).await?;
        tracing::debug!(collection, id, "relational delete");
        Ok(())
    }

    async fn create_many(
        &self,
        collection: &str,
        items: Vec<Map<String, Value>>,
    ) -> AdapterResult<Vec<Record>> {
        let conn = self.connect_with_timeout().await?;
        let table = self.ensure_table(&conn, collection).await?;

        let mut created: Vec<Record> = Vec::with_capacity(items.len());
        for item in items {
            let record = prepare_create(item);
            if let Err(e) = insert_row(&conn, &table, &record).await {
                return Err(partial_failure(
                    created.iter().map(|r| r.id.clone()).collect(),
                    e,
                ));
            }
            created.push(record);
        }
        Ok(created)
    }

    async fn update_many(
        &self,
        collection: &str,
        updates: Vec<(String, Map<String, Value>)>,
    ) -> AdapterResult<Vec<Record>> {
        let conn = self.connect_with_timeout().await?;
        let table = self.ensure_table(&conn, collection).await?;

        let mut updated: Vec<Record> = Vec::with_capacity(updates.len());
        for (id, patch) in updates {
            match update_row(&conn, collection, &table, &id, patch).await {
                Ok(record) => updated.push(record),
                Err(e) => {
                    return Err(partial_failure(
                        updated.iter().map(|r| r.id.clone()).collect(),
                        e,
                    ))
                }
            }
        }
        Ok(updated)
    }

    async fn delete_many(&self, collection: &str, ids: &[String]) -> AdapterResult<()> {
        let conn = self.connect_with_timeout().await?;
        let table = self.ensure_table(&conn, collection).await?;

        for (position, id) in ids.iter().enumerate() {
            if let Err(e) = delete_row(&conn, &table, id).await {
                return Err(partial_failure(ids[..position].to_vec(), e));
            }
        }
        Ok(())
    }

    async fn run_transaction(&self, work: TransactionWork<'_>) -> AdapterResult<()> {
        let conn = self.connect_with_timeout().await?;
        // IMMEDIATE takes the write lock up front so read-then-write
        // callbacks cannot deadlock against each other
        conn.execute("BEGIN IMMEDIATE", ()).await?;

        let tx = Arc::new(RelationalTransaction {
            conn: tokio::sync::Mutex::new(Some(conn)),
            registry: self.registry.clone(),
        });
        let handle: TransactionHandle = tx.clone();

        let outcome = work(handle).await;
        let conn = tx.close().await.ok_or(AdapterError::TransactionClosed)?;

        match outcome {
            Ok(()) => {
                if let Err(e) = conn.execute("COMMIT", ()).await {
                    let _rollback = conn.execute("ROLLBACK", ()).await;
                    return Err(e.into());
                }
                tracing::debug!("relational transaction committed");
                Ok(())
            }
            Err(e) => {
                let _rollback = conn.execute("ROLLBACK", ()).await;
                tracing::debug!(error = %e, "relational transaction rolled back");
                Err(e)
            }
        }
    }

    async fn connect(&self) -> AdapterResult<()> {
        let mut guard = self.db.write().await;
        if guard.is_some() {
            return Ok(());
        }

        if let Some(parent) = self.db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Builder::new_local(&self.db_path).build().await?;
        let conn = db.connect()?;
        execute_pragma(&conn, "PRAGMA journal_mode = WAL").await?;
        execute_pragma(&conn, "PRAGMA busy_timeout = 5000").await?;

        let mut known = HashSet::new();
        for table in self.registry.tables() {
            conn.execute(&ModelRegistry::create_table_sql(table), ())
                .await?;
            known.insert(table.to_string());
        }
        *self
            .known_tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = known;

        *guard = Some(Arc::new(db));
        self.connected.store(true, Ordering::SeqCst);
        tracing::info!(path = %self.db_path.display(), "Relational store connected");
        Ok(())
    }

    async fn disconnect(&self) -> AdapterResult<()> {
        let mut guard = self.db.write().await;
        let Some(db) = guard.take() else {
            return Ok(());
        };
        self.connected.store(false, Ordering::SeqCst);

        // Flush the WAL so the file is self-contained after close
        let conn = db.connect()?;
        execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)").await?;
        self.known_tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        tracing::info!(path = %self.db_path.display(), "Relational store disconnected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

fn partial_failure(committed: Vec<String>, error: AdapterError) -> AdapterError {
    if committed.is_empty() {
        error
    } else {
        AdapterError::partial_batch(committed, error)
    }
}

/// Transaction pinned to one connection; `None` once the callback returned
struct RelationalTransaction {
    conn: tokio::sync::Mutex<Option<Connection>>,
    registry: ModelRegistry,
}

impl RelationalTransaction {
    async fn close(&self) -> Option<Connection> {
        self.conn.lock().await.take()
    }

    /// Table for `collection`; DDL is allowed inside SQLite transactions
    async fn table(&self, conn: &Connection, collection: &str) -> AdapterResult<String> {
        let table = self.registry.table_for(collection)?;
        conn.execute(&ModelRegistry::create_table_sql(&table), ())
            .await?;
        Ok(table)
    }
}

#[async_trait]
impl DatabaseTransaction for RelationalTransaction {
    async fn find_one(&self, collection: &str, id: &str) -> AdapterResult<Option<Record>> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(AdapterError::TransactionClosed)?;
        let table = self.table(conn, collection).await?;
        fetch_row(conn, collection, &table, id).await
    }

    async fn create(&self, collection: &str, data: Map<String, Value>) -> AdapterResult<Record> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(AdapterError::TransactionClosed)?;
        let table = self.table(conn, collection).await?;
        let record = prepare_create(data);
        insert_row(conn, &table, &record).await?;
        Ok(record)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        data: Map<String, Value>,
    ) -> AdapterResult<Record> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(AdapterError::TransactionClosed)?;
        let table = self.table(conn, collection).await?;
        update_row(conn, collection, &table, id, data).await
    }

    async fn delete(&self, collection: &str, id: &str) -> AdapterResult<()> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(AdapterError::TransactionClosed)?;
        let table = self.table(conn, collection).await?;
        delete_row(conn, &table, id).await
    }
}
