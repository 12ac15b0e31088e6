//! Integrity Engine Result Types
//!
//! Expected validation failures of association operations are values, not
//! errors: they come back as `AssociationResult::Failure`. Storage failures
//! propagate separately as `AdapterError`.

use crate::models::EntityKind;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use thiserror::Error;

/// Why an association was refused
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssociationError {
    /// One side of the association does not exist
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: String },

    /// Child and parent belong to different projects
    #[error(
        "{child_kind} {child_id} belongs to project {child_project} \
         but {parent_kind} {parent_id} belongs to project {parent_project}"
    )]
    ProjectMismatch {
        child_kind: EntityKind,
        child_id: String,
        child_project: String,
        parent_kind: EntityKind,
        parent_id: String,
        parent_project: String,
    },
}

impl AssociationError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}

/// Outcome of an association operation
///
/// Serializes as `{"success": true}` or `{"success": false, "error": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssociationResult {
    Success,
    Failure(AssociationError),
}

impl AssociationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, AssociationResult::Success)
    }

    pub fn error(&self) -> Option<&AssociationError> {
        match self {
            AssociationResult::Success => None,
            AssociationResult::Failure(error) => Some(error),
        }
    }
}

impl From<AssociationError> for AssociationResult {
    fn from(error: AssociationError) -> Self {
        AssociationResult::Failure(error)
    }
}

impl Serialize for AssociationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AssociationResult::Success => {
                let mut state = serializer.serialize_struct("AssociationResult", 1)?;
                state.serialize_field("success", &true)?;
                state.end()
            }
            AssociationResult::Failure(error) => {
                let mut state = serializer.serialize_struct("AssociationResult", 2)?;
                state.serialize_field("success", &false)?;
                state.serialize_field("error", &error.to_string())?;
                state.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_result_wire_shape() {
        assert_eq!(
            serde_json::to_value(AssociationResult::Success).unwrap(),
            json!({"success": true})
        );

        let failure: AssociationResult = AssociationError::not_found(EntityKind::Pov, "V9").into();
        assert!(!failure.is_success());
        assert_eq!(
            serde_json::to_value(&failure).unwrap(),
            json!({"success": false, "error": "POV V9 not found"})
        );
    }

    #[test]
    fn test_mismatch_message() {
        let error = AssociationError::ProjectMismatch {
            child_kind: EntityKind::Trr,
            child_id: "T1".into(),
            child_project: "P1".into(),
            parent_kind: EntityKind::Pov,
            parent_id: "V2".into(),
            parent_project: "P2".into(),
        };
        assert_eq!(
            error.to_string(),
            "TRR T1 belongs to project P1 but POV V2 belongs to project P2"
        );
    }
}
