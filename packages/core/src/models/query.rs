//! Backend-Neutral Query Model
//!
//! Filters, ordering, and pagination shared by every `DatabaseAdapter`.
//! Each adapter translates a `QueryOptions` into its native predicate form;
//! filters always combine with logical AND.
//!
//! # Examples
//!
//! ```rust
//! use recordspace_core::models::{ComparisonOp, OrderDirection, QueryOptions};
//! use serde_json::json;
//!
//! let options = QueryOptions::new()
//!     .where_eq("projectId", json!("P1"))
//!     .filter("status", ComparisonOp::In, json!(["active", "blocked"]))
//!     .order_by("createdAt", OrderDirection::Desc)
//!     .limit(20);
//!
//! assert_eq!(options.filters.len(), 2);
//! ```

use crate::db::AdapterError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// The seven supported comparators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "array-contains")]
    ArrayContains,
}

impl ComparisonOp {
    /// Wire spelling of the operator
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "==",
            ComparisonOp::Ne => "!=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Lt => "<",
            ComparisonOp::Gte => ">=",
            ComparisonOp::Lte => "<=",
            ComparisonOp::In => "in",
            ComparisonOp::ArrayContains => "array-contains",
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComparisonOp {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "==" => Ok(ComparisonOp::Eq),
            "!=" => Ok(ComparisonOp::Ne),
            ">" => Ok(ComparisonOp::Gt),
            "<" => Ok(ComparisonOp::Lt),
            ">=" => Ok(ComparisonOp::Gte),
            "<=" => Ok(ComparisonOp::Lte),
            "in" => Ok(ComparisonOp::In),
            "array-contains" => Ok(ComparisonOp::ArrayContains),
            other => Err(AdapterError::UnknownOperator(other.to_string())),
        }
    }
}

/// A single field comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFilter {
    /// Dotted field path (`projectId`, `testPlan.scenarios`)
    pub field: String,
    pub operator: ComparisonOp,
    pub value: Value,
}

impl QueryFilter {
    pub fn new(field: impl Into<String>, operator: ComparisonOp, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// Values an `in` filter matches against; a scalar is treated as a one-element list
    pub(crate) fn in_values(&self) -> Vec<Value> {
        match &self.value {
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl OrderDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

/// Query parameters for `find_many` and `count`
///
/// `Default` means no predicate, unordered, unbounded: every record of the
/// collection is returned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptions {
    #[serde(default)]
    pub filters: Vec<QueryFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<String>,
    #[serde(default)]
    pub order_direction: OrderDirection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Not honoured by the document store; see `DocumentStore`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: impl Into<String>, operator: ComparisonOp, value: Value) -> Self {
        self.filters.push(QueryFilter::new(field, operator, value));
        self
    }

    pub fn where_eq(self, field: impl Into<String>, value: Value) -> Self {
        self.filter(field, ComparisonOp::Eq, value)
    }

    /// Append filters imposed by the caller's context (access-control scope,
    /// tenant), combined with AND like every other filter
    pub fn scoped(mut self, scope: impl IntoIterator<Item = QueryFilter>) -> Self {
        self.filters.extend(scope);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: OrderDirection) -> Self {
        self.order_by = Some(field.into());
        self.order_direction = direction;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validate a dotted field path; every segment must be an identifier
///
/// Field paths are spliced into native query text on both back-ends, so
/// anything outside `[A-Za-z_][A-Za-z0-9_]*` per segment is rejected.
pub fn validate_field_path(path: &str) -> Result<(), AdapterError> {
    if !path.is_empty() && path.split('.').all(is_identifier) {
        Ok(())
    } else {
        Err(AdapterError::InvalidField(path.to_string()))
    }
}

/// Validate a collection name (single identifier)
pub fn validate_collection(collection: &str) -> Result<(), AdapterError> {
    if is_identifier(collection) {
        Ok(())
    } else {
        Err(AdapterError::InvalidCollection(collection.to_string()))
    }
}
