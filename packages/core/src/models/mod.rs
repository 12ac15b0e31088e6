//! Data Models
//!
//! This module contains the core data structures used throughout RecordSpace:
//!
//! - `Record` - Backend-neutral persisted entity (system fields + caller data)
//! - `QueryOptions` / `QueryFilter` - Backend-neutral query description
//! - `Project`, `Pov`, `Trr`, `Scenario` - Typed views over engagement records
//!
//! Adapters only ever see `Record` and `QueryOptions`; typed views are
//! resolved by the caller through serde.

mod entities;
mod query;
mod record;

pub use entities::{collections, fields, EntityKind, Pov, Project, Scenario, TestPlan, Trr};
pub use query::{
    validate_collection, validate_field_path, ComparisonOp, OrderDirection, QueryFilter,
    QueryOptions,
};
pub use record::{Record, CREATED_AT_FIELD, ID_FIELD, SYSTEM_FIELDS, UPDATED_AT_FIELD};

pub(crate) use record::{format_timestamp, merge_patch, prepare_create};
