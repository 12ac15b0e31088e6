//! Engagement Entities
//!
//! Typed views over the four record kinds whose cross-references the
//! relationship integrity engine maintains. Only the identifying and
//! relationship fields are modelled; every other field stays in the record's
//! `data` and is preserved untouched by the engine.
//!
//! Reference fields:
//!
//! | Kind     | Scalar refs            | Array refs                   |
//! |----------|------------------------|------------------------------|
//! | Project  | -                      | `povIds`, `trrIds`           |
//! | POV      | `projectId`            | `trrIds`, `testPlan.scenarios` |
//! | TRR      | `projectId`, `povId`   | -                            |
//! | Scenario | `projectId`, `povId`   | -                            |

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Collection names used by the platform
pub mod collections {
    pub const PROJECTS: &str = "projects";
    pub const POVS: &str = "povs";
    pub const TRRS: &str = "trrs";
    pub const SCENARIOS: &str = "scenarios";
    pub const ACTIVITY_LOGS: &str = "activityLogs";
}

/// Reference field names
pub mod fields {
    pub const PROJECT_ID: &str = "projectId";
    pub const POV_ID: &str = "povId";
    pub const POV_IDS: &str = "povIds";
    pub const TRR_IDS: &str = "trrIds";
    pub const TEST_PLAN: &str = "testPlan";
    pub const SCENARIOS: &str = "scenarios";
    pub const TEST_PLAN_SCENARIOS: &str = "testPlan.scenarios";
}

/// `null` and missing arrays both read as empty
fn nullable_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Kind of record in the relationship graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Project,
    Pov,
    Trr,
    Scenario,
}

impl EntityKind {
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::Project => collections::PROJECTS,
            EntityKind::Pov => collections::POVS,
            EntityKind::Trr => collections::TRRS,
            EntityKind::Scenario => collections::SCENARIOS,
        }
    }

    /// Human-readable label used in validation messages
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Project => "Project",
            EntityKind::Pov => "POV",
            EntityKind::Trr => "TRR",
            EntityKind::Scenario => "Scenario",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable_vec")]
    pub pov_ids: Vec<String>,
    #[serde(default, deserialize_with = "nullable_vec")]
    pub trr_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestPlan {
    #[serde(default, deserialize_with = "nullable_vec")]
    pub scenarios: Vec<String>,
}

/// Proof-of-value trial
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pov {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default, deserialize_with = "nullable_vec")]
    pub trr_ids: Vec<String>,
    #[serde(default)]
    pub test_plan: Option<TestPlan>,
}

impl Pov {
    pub fn scenario_ids(&self) -> &[String] {
        self.test_plan
            .as_ref()
            .map(|plan| plan.scenarios.as_slice())
            .unwrap_or_default()
    }
}

/// Technical risk review
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trr {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub pov_id: Option<String>,
}

/// Reusable demo/test procedure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub pov_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_arrays_read_as_empty() {
        let project: Project = serde_json::from_value(json!({
            "id": "P1",
            "povIds": null
        }))
        .unwrap();
        assert!(project.pov_ids.is_empty());
        assert!(project.trr_ids.is_empty());
    }

    #[test]
    fn test_pov_scenario_ids() {
        let pov: Pov = serde_json::from_value(json!({
            "id": "V1",
            "projectId": "P1",
            "testPlan": {"scenarios": ["S1"], "owner": "se-team"},
            "customer": "Acme"
        }))
        .unwrap();
        assert_eq!(pov.scenario_ids(), ["S1".to_string()]);

        let bare: Pov = serde_json::from_value(json!({"id": "V2"})).unwrap();
        assert!(bare.scenario_ids().is_empty());
    }

    #[test]
    fn test_kind_collections() {
        assert_eq!(EntityKind::Trr.collection(), "trrs");
        assert_eq!(EntityKind::Pov.to_string(), "POV");
    }
}
