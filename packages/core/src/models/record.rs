//! Record Data Structures
//!
//! This module defines the backend-neutral `Record` struct returned by every
//! `DatabaseAdapter` operation.
//!
//! # Architecture
//!
//! - **System fields**: `id`, `createdAt`, `updatedAt` are owned by the adapter
//!   and stamped at write time, never taken from the caller
//! - **Caller fields**: everything else lives in `data` and is opaque to the
//!   adapter (schemaless on the document store, a JSON column on the relational store)
//! - **Flat wire shape**: serialises as `{"id", "createdAt", "updatedAt", ...data}`
//!
//! # Examples
//!
//! ```rust
//! use recordspace_core::models::Record;
//! use serde_json::json;
//!
//! let record: Record = serde_json::from_value(json!({
//!     "id": "T1",
//!     "createdAt": "2025-01-03T10:00:00.000000Z",
//!     "updatedAt": "2025-01-03T10:00:00.000000Z",
//!     "projectId": "P1",
//!     "povId": "V1"
//! })).unwrap();
//!
//! assert_eq!(record.get_str("povId"), Some("V1"));
//! ```

use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Field name of the record identifier
pub const ID_FIELD: &str = "id";

/// Field name of the creation timestamp
pub const CREATED_AT_FIELD: &str = "createdAt";

/// Field name of the last-modification timestamp
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Fields the adapter owns; callers cannot set them through `create` or `update`
pub const SYSTEM_FIELDS: [&str; 3] = [ID_FIELD, CREATED_AT_FIELD, UPDATED_AT_FIELD];

/// Any persisted entity
///
/// `data` holds every caller-owned field. System fields are typed so both
/// adapters agree on their representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Opaque identifier (caller-supplied on create, otherwise a UUID v4)
    pub id: String,

    /// Stamped once by the adapter that created the record
    pub created_at: DateTime<Utc>,

    /// Re-stamped by every update, strictly increasing per record
    pub updated_at: DateTime<Utc>,

    /// Caller-owned fields
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl Record {
    /// Get a caller field by dotted path (e.g. `testPlan.scenarios`)
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.data.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Get a caller field as a string; `null` and non-strings read as `None`
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    /// Get a caller field as a list of string ids
    ///
    /// Missing fields, `null`, and non-array values read as an empty list.
    /// Non-string array entries are skipped.
    pub fn get_str_list(&self, path: &str) -> Vec<String> {
        self.get(path)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Deserialize the full record (system fields included) into a caller type
    pub fn into_typed<T: DeserializeOwned>(self) -> serde_json::Result<T> {
        serde_json::from_value(serde_json::to_value(self)?)
    }

    /// Serialize a caller type into record data, dropping any system fields
    pub fn data_from_typed<T: Serialize>(value: &T) -> serde_json::Result<Map<String, Value>> {
        match serde_json::to_value(value)? {
            Value::Object(mut map) => {
                for field in [CREATED_AT_FIELD, UPDATED_AT_FIELD] {
                    map.remove(field);
                }
                Ok(map)
            }
            other => Err(serde::ser::Error::custom(format!(
                "expected a JSON object for record data, got {}",
                other
            ))),
        }
    }

    /// Full flat JSON representation
    pub fn to_value(&self) -> Value {
        let mut map = self.data.clone();
        map.insert(ID_FIELD.to_string(), Value::String(self.id.clone()));
        map.insert(
            CREATED_AT_FIELD.to_string(),
            Value::String(format_timestamp(&self.created_at)),
        );
        map.insert(
            UPDATED_AT_FIELD.to_string(),
            Value::String(format_timestamp(&self.updated_at)),
        );
        Value::Object(map)
    }
}

/// Current time truncated to the microsecond precision both stores round-trip
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Next `updatedAt` value, strictly later than `previous` even on coarse clocks
pub(crate) fn next_timestamp(previous: &DateTime<Utc>) -> DateTime<Utc> {
    let candidate = now();
    if candidate > *previous {
        candidate
    } else {
        *previous + Duration::microseconds(1)
    }
}

/// Canonical storage encoding: RFC3339, UTC, fixed microseconds
///
/// Fixed width keeps lexicographic order equal to chronological order.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Build the record an adapter persists for `create`
///
/// Honours a caller-supplied string `id`, otherwise generates a UUID v4.
/// Caller-supplied timestamps are discarded.
pub(crate) fn prepare_create(mut data: Map<String, Value>) -> Record {
    let id = match data.remove(ID_FIELD) {
        Some(Value::String(id)) if !id.is_empty() => id,
        _ => Uuid::new_v4().to_string(),
    };
    data.remove(CREATED_AT_FIELD);
    data.remove(UPDATED_AT_FIELD);

    let stamp = now();
    Record {
        id,
        created_at: stamp,
        updated_at: stamp,
        data,
    }
}

/// Apply a shallow top-level patch and re-stamp `updatedAt`
pub(crate) fn merge_patch(mut current: Record, patch: Map<String, Value>) -> Record {
    for (key, value) in patch {
        if SYSTEM_FIELDS.contains(&key.as_str()) {
            continue;
        }
        current.data.insert(key, value);
    }
    current.updated_at = next_timestamp(&current.updated_at);
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_prepare_create_generates_id_and_strips_timestamps() {
        let record = prepare_create(object(json!({
            "name": "Acme POV",
            "createdAt": "1999-01-01T00:00:00Z"
        })));

        assert!(Uuid::parse_str(&record.id).is_ok());
        assert_eq!(record.created_at, record.updated_at);
        assert!(!record.data.contains_key("createdAt"));
        assert_eq!(record.get_str("name"), Some("Acme POV"));
    }

    #[test]
    fn test_prepare_create_honours_caller_id() {
        let record = prepare_create(object(json!({"id": "P1", "name": "Project"})));
        assert_eq!(record.id, "P1");
        assert!(!record.data.contains_key("id"));
    }

    #[test]
    fn test_merge_patch_ignores_system_fields() {
        let created = prepare_create(object(json!({"id": "T1", "status": "draft"})));
        let merged = merge_patch(
            created.clone(),
            object(json!({"id": "other", "status": "final", "povId": null})),
        );

        assert_eq!(merged.id, "T1");
        assert_eq!(merged.get_str("status"), Some("final"));
        assert_eq!(merged.get("povId"), Some(&Value::Null));
        assert!(merged.updated_at > created.updated_at);
        assert_eq!(merged.created_at, created.created_at);
    }

    #[test]
    fn test_next_timestamp_is_strictly_later() {
        let future = Utc::now() + Duration::hours(1);
        let next = next_timestamp(&future);
        assert_eq!(next, future + Duration::microseconds(1));
    }

    #[test]
    fn test_flat_serialization_round_trip() {
        let record = prepare_create(object(json!({
            "id": "V1",
            "testPlan": {"scenarios": ["S1", "S2"]}
        })));

        let value = record.to_value();
        assert_eq!(value["id"], "V1");
        assert_eq!(value["testPlan"]["scenarios"][1], "S2");

        let parsed: Record = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, record);
        assert_eq!(parsed.get_str_list("testPlan.scenarios"), vec!["S1", "S2"]);
    }
}
