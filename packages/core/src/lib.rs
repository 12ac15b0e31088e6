//! RecordSpace Core Persistence Layer
//!
//! This crate provides the persistence abstraction and referential-integrity
//! layer for the RecordSpace engagement platform (projects, POVs, TRRs,
//! scenarios).
//!
//! # Architecture
//!
//! - **One contract, two back-ends**: `DatabaseAdapter` over embedded SurrealDB
//!   (document store) and libsql (relational store)
//! - **Backend-neutral queries**: `QueryOptions` filters, ordering, pagination
//! - **Integrity in the application**: no store enforces the cross-references
//!   between records; `RelationshipService` maintains, validates and repairs them
//!
//! # Modules
//!
//! - [`models`] - Records, query model, typed engagement entities
//! - [`db`] - Adapter contract, both adapters, factory, parity runner
//! - [`services`] - Relationship integrity engine

pub mod db;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use db::{AdapterError, AdapterFactory, AdapterResult, DatabaseAdapter, DeploymentMode};
pub use models::{QueryOptions, Record};
pub use services::RelationshipService;
