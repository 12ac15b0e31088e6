//! Shared fixtures for integration tests

#![allow(dead_code)]

use anyhow::Result;
use recordspace_core::db::{DatabaseAdapter, DocumentStore, RelationalStore};
use serde_json::{Map, Value};
use std::sync::Arc;
use tempfile::TempDir;

/// A connected adapter plus whatever keeps its storage alive
pub struct TestBackend {
    pub name: &'static str,
    pub adapter: Arc<dyn DatabaseAdapter>,
    _temp_dir: Option<TempDir>,
}

pub async fn document_backend() -> Result<TestBackend> {
    let store = DocumentStore::new_in_memory().await?;
    store.connect().await?;
    Ok(TestBackend {
        name: "document-store",
        adapter: Arc::new(store),
        _temp_dir: None,
    })
}

pub async fn relational_backend() -> Result<TestBackend> {
    let temp_dir = TempDir::new()?;
    let store = RelationalStore::new(temp_dir.path().join("records.db"));
    store.connect().await?;
    Ok(TestBackend {
        name: "self-hosted",
        adapter: Arc::new(store),
        _temp_dir: Some(temp_dir),
    })
}

/// Both adapters, freshly created and connected
pub async fn backends() -> Result<Vec<TestBackend>> {
    Ok(vec![document_backend().await?, relational_backend().await?])
}

/// JSON object literal → record data
pub fn obj(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}
