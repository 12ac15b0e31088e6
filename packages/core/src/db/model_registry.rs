//! Collection → Table Registry
//!
//! Maps logical collection names used by services onto relational tables.
//! Every registered table has the same shape:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS "<table>" (
//!     id         TEXT PRIMARY KEY,
//!     data       TEXT NOT NULL,  -- caller fields as a JSON object
//!     created_at TEXT NOT NULL,
//!     updated_at TEXT NOT NULL
//! )
//! ```
//!
//! Collections without an explicit mapping use their own name as the table
//! name, so new collections work without registration.

use crate::db::error::AdapterResult;
use crate::models::{collections, validate_collection};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    tables: HashMap<String, String>,
}

impl ModelRegistry {
    /// Registry without any mapping (every collection passes through)
    pub fn empty() -> Self {
        Self {
            tables: HashMap::new(),
        }
    }

    /// Map `collection` onto `table`, replacing any previous mapping
    pub fn register(&mut self, collection: &str, table: &str) -> AdapterResult<()> {
        validate_collection(collection)?;
        validate_collection(table)?;
        self.tables
            .insert(collection.to_string(), table.to_string());
        Ok(())
    }

    /// Table backing `collection`
    pub fn table_for(&self, collection: &str) -> AdapterResult<String> {
        validate_collection(collection)?;
        Ok(self
            .tables
            .get(collection)
            .cloned()
            .unwrap_or_else(|| collection.to_string()))
    }

    /// Tables created eagerly on connect
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.values().map(String::as_str)
    }

    pub(crate) fn create_table_sql(table: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS \"{table}\" (\
             id TEXT PRIMARY KEY, \
             data TEXT NOT NULL, \
             created_at TEXT NOT NULL, \
             updated_at TEXT NOT NULL)"
        )
    }
}

impl Default for ModelRegistry {
    /// Registry with the platform's engagement collections
    fn default() -> Self {
        let tables = [
            (collections::PROJECTS, "project"),
            (collections::POVS, "pov"),
            (collections::TRRS, "trr"),
            (collections::SCENARIOS, "scenario"),
            (collections::ACTIVITY_LOGS, "activity_log"),
        ]
        .into_iter()
        .map(|(collection, table)| (collection.to_string(), table.to_string()))
        .collect();

        Self { tables }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::AdapterError;

    #[test]
    fn test_default_mappings() {
        let registry = ModelRegistry::default();
        assert_eq!(registry.table_for("povs").unwrap(), "pov");
        assert_eq!(registry.table_for("activityLogs").unwrap(), "activity_log");
        assert_eq!(registry.tables().count(), 5);
    }

    #[test]
    fn test_unmapped_collection_passes_through() {
        let registry = ModelRegistry::default();
        assert_eq!(registry.table_for("customers").unwrap(), "customers");
    }

    #[test]
    fn test_register_rejects_bad_table_names() {
        let mut registry = ModelRegistry::empty();
        assert!(matches!(
            registry.register("notes", "note\"; DROP"),
            Err(AdapterError::InvalidCollection(_))
        ));
        registry.register("notes", "note").unwrap();
        assert_eq!(registry.table_for("notes").unwrap(), "note");
    }
}
