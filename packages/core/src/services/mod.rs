//! Business Services
//!
//! - `RelationshipService` - maintains, validates and repairs the references
//!   between projects, POVs, TRRs and scenarios
//!
//! Services depend only on `DatabaseAdapter`, never on a concrete store.

pub mod error;
pub mod relationship_service;

pub use error::{AssociationError, AssociationResult};
pub use relationship_service::{
    RelationshipGraph, RelationshipService, RepairReport, ValidationReport,
};
