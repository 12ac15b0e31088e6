//! Relationship Integrity Engine
//!
//! Maintains, validates and repairs the id references between projects,
//! POVs, TRRs and scenarios. No store enforces these references, so every
//! rule lives here and runs on top of the `DatabaseAdapter` contract only.
//!
//! # Reference Model
//!
//! - Child scalars: `pov.projectId`, `trr.projectId`, `trr.povId`,
//!   `scenario.projectId`, `scenario.povId`
//! - Parent arrays: `project.povIds`, `project.trrIds`, `pov.trrIds`,
//!   `pov.testPlan.scenarios`
//!
//! # Graph
//!
//! `get_project_relationship_graph` recomputes the graph from storage on
//! every call. There is no cached or persisted copy to invalidate.
//!
//! # Severity
//!
//! - **Error**: a reference to a record that does not exist, or that belongs
//!   to another project
//! - **Warning**: a TRR/scenario with no POV, or a POV whose array does not
//!   list a child pointing at it

use crate::db::{AdapterResult, DatabaseAdapter, DatabaseAdapterExt, TransactionHandle};
use crate::models::{
    collections, fields, EntityKind, OrderDirection, Pov, Project, QueryOptions, Record,
    Scenario, Trr, CREATED_AT_FIELD,
};
use crate::services::error::{AssociationError, AssociationResult};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Parent-side id array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefArray {
    ProjectPovs,
    ProjectTrrs,
    PovTrrs,
    PovScenarios,
}

impl RefArray {
    fn path(self) -> &'static str {
        match self {
            RefArray::ProjectPovs => fields::POV_IDS,
            RefArray::ProjectTrrs | RefArray::PovTrrs => fields::TRR_IDS,
            RefArray::PovScenarios => fields::TEST_PLAN_SCENARIOS,
        }
    }

    fn ids(self, record: &Record) -> Vec<String> {
        record.get_str_list(self.path())
    }

    /// Patch replacing the array; `testPlan` keeps its other fields
    fn patch(self, record: &Record, ids: Vec<String>) -> Map<String, Value> {
        let mut patch = Map::new();
        match self {
            RefArray::PovScenarios => {
                let mut plan = record
                    .data
                    .get(fields::TEST_PLAN)
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                plan.insert(fields::SCENARIOS.to_string(), Value::from(ids));
                patch.insert(fields::TEST_PLAN.to_string(), Value::Object(plan));
            }
            other => {
                patch.insert(other.path().to_string(), Value::from(ids));
            }
        }
        patch
    }
}

/// One association operation: which scalar points at which parent array
#[derive(Debug, Clone, Copy)]
struct Link {
    action: &'static str,
    child: EntityKind,
    parent: EntityKind,
    child_field: &'static str,
    array: RefArray,
    /// Parent is project-scoped; child and parent must share a project
    same_project: bool,
}

const POV_TO_PROJECT: Link = Link {
    action: "associate_pov_with_project",
    child: EntityKind::Pov,
    parent: EntityKind::Project,
    child_field: fields::PROJECT_ID,
    array: RefArray::ProjectPovs,
    same_project: false,
};

const TRR_TO_PROJECT: Link = Link {
    action: "associate_trr_with_project",
    child: EntityKind::Trr,
    parent: EntityKind::Project,
    child_field: fields::PROJECT_ID,
    array: RefArray::ProjectTrrs,
    same_project: false,
};

const TRR_TO_POV: Link = Link {
    action: "associate_trr_with_pov",
    child: EntityKind::Trr,
    parent: EntityKind::Pov,
    child_field: fields::POV_ID,
    array: RefArray::PovTrrs,
    same_project: true,
};

const SCENARIO_TO_POV: Link = Link {
    action: "associate_scenario_with_pov",
    child: EntityKind::Scenario,
    parent: EntityKind::Pov,
    child_field: fields::POV_ID,
    array: RefArray::PovScenarios,
    same_project: true,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuditEntry<'a> {
    action: &'a str,
    entity_type: EntityKind,
    entity_id: &'a str,
    related_type: EntityKind,
    related_id: &'a str,
}

/// In-memory join of one project's records
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipGraph {
    pub project: Project,
    pub povs: Vec<Pov>,
    pub trrs: Vec<Trr>,
    pub scenarios: Vec<Scenario>,
    /// From `pov.trrIds`
    pub pov_to_trrs: BTreeMap<String, Vec<String>>,
    /// From `pov.testPlan.scenarios`
    pub pov_to_scenarios: BTreeMap<String, Vec<String>>,
    /// From `trr.povId`
    pub trr_to_pov: BTreeMap<String, String>,
    /// From `scenario.povId`
    pub scenario_to_pov: BTreeMap<String, String>,
}

/// A parent-side array as loaded into the graph
struct ParentArray<'g> {
    parent: EntityKind,
    parent_id: &'g str,
    child: EntityKind,
    array: RefArray,
    ids: &'g [String],
}

impl RelationshipGraph {
    fn build(project: Project, povs: Vec<Pov>, trrs: Vec<Trr>, scenarios: Vec<Scenario>) -> Self {
        let pov_to_trrs = povs
            .iter()
            .map(|pov| (pov.id.clone(), pov.trr_ids.clone()))
            .collect();
        let pov_to_scenarios = povs
            .iter()
            .map(|pov| (pov.id.clone(), pov.scenario_ids().to_vec()))
            .collect();
        let trr_to_pov = trrs
            .iter()
            .filter_map(|trr| Some((trr.id.clone(), trr.pov_id.clone()?)))
            .collect();
        let scenario_to_pov = scenarios
            .iter()
            .filter_map(|scenario| Some((scenario.id.clone(), scenario.pov_id.clone()?)))
            .collect();

        Self {
            project,
            povs,
            trrs,
            scenarios,
            pov_to_trrs,
            pov_to_scenarios,
            trr_to_pov,
            scenario_to_pov,
        }
    }

    /// Ids of project-scoped records of `kind`
    pub fn ids_of(&self, kind: EntityKind) -> HashSet<&str> {
        match kind {
            EntityKind::Project => HashSet::from([self.project.id.as_str()]),
            EntityKind::Pov => self.povs.iter().map(|p| p.id.as_str()).collect(),
            EntityKind::Trr => self.trrs.iter().map(|t| t.id.as_str()).collect(),
            EntityKind::Scenario => self.scenarios.iter().map(|s| s.id.as_str()).collect(),
        }
    }

    /// Whether the POV's own array lists `child_id`
    fn pov_lists(&self, pov_id: &str, child: EntityKind, child_id: &str) -> bool {
        let index = match child {
            EntityKind::Trr => &self.pov_to_trrs,
            _ => &self.pov_to_scenarios,
        };
        index
            .get(pov_id)
            .is_some_and(|ids| ids.iter().any(|id| id == child_id))
    }

    /// `(kind, id, povId)` for every TRR and scenario
    fn pov_refs(&self) -> Vec<(EntityKind, &str, Option<&str>)> {
        let trrs = self
            .trrs
            .iter()
            .map(|t| (EntityKind::Trr, t.id.as_str(), t.pov_id.as_deref()));
        let scenarios = self
            .scenarios
            .iter()
            .map(|s| (EntityKind::Scenario, s.id.as_str(), s.pov_id.as_deref()));
        trrs.chain(scenarios).collect()
    }

    fn parent_arrays(&self) -> Vec<ParentArray<'_>> {
        let mut arrays = vec![
            ParentArray {
                parent: EntityKind::Project,
                parent_id: &self.project.id,
                child: EntityKind::Pov,
                array: RefArray::ProjectPovs,
                ids: &self.project.pov_ids,
            },
            ParentArray {
                parent: EntityKind::Project,
                parent_id: &self.project.id,
                child: EntityKind::Trr,
                array: RefArray::ProjectTrrs,
                ids: &self.project.trr_ids,
            },
        ];
        for pov in &self.povs {
            arrays.push(ParentArray {
                parent: EntityKind::Pov,
                parent_id: &pov.id,
                child: EntityKind::Trr,
                array: RefArray::PovTrrs,
                ids: &pov.trr_ids,
            });
            arrays.push(ParentArray {
                parent: EntityKind::Pov,
                parent_id: &pov.id,
                child: EntityKind::Scenario,
                array: RefArray::PovScenarios,
                ids: pov.scenario_ids(),
            });
        }
        arrays
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RepairReport {
    /// Persisted writes
    pub fixed: usize,
    pub errors: Vec<String>,
}

/// Where a referenced id resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    InProject,
    OtherProject,
    Missing,
}

/// Relationship integrity engine over any `DatabaseAdapter`
pub struct RelationshipService {
    adapter: Arc<dyn DatabaseAdapter>,
}

impl RelationshipService {
    pub fn new(adapter: Arc<dyn DatabaseAdapter>) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &Arc<dyn DatabaseAdapter> {
        &self.adapter
    }

    //
    // ASSOCIATIONS
    //

    pub async fn associate_pov_with_project(
        &self,
        pov_id: &str,
        project_id: &str,
    ) -> AdapterResult<AssociationResult> {
        self.associate(POV_TO_PROJECT, pov_id, project_id).await
    }

    pub async fn associate_trr_with_project(
        &self,
        trr_id: &str,
        project_id: &str,
    ) -> AdapterResult<AssociationResult> {
        self.associate(TRR_TO_PROJECT, trr_id, project_id).await
    }

    /// Attach a TRR to a POV of the same project
    ///
    /// A TRR without a project inherits the POV's project.
    pub async fn associate_trr_with_pov(
        &self,
        trr_id: &str,
        pov_id: &str,
    ) -> AdapterResult<AssociationResult> {
        self.associate(TRR_TO_POV, trr_id, pov_id).await
    }

    /// Attach a scenario to a POV's test plan
    pub async fn associate_scenario_with_pov(
        &self,
        scenario_id: &str,
        pov_id: &str,
    ) -> AdapterResult<AssociationResult> {
        self.associate(SCENARIO_TO_POV, scenario_id, pov_id).await
    }

    async fn associate(
        &self,
        link: Link,
        child_id: &str,
        parent_id: &str,
    ) -> AdapterResult<AssociationResult> {
        let (child, parent) = (child_id.to_string(), parent_id.to_string());
        let result = self
            .adapter
            .transaction(move |tx| link_records(tx, link, child, parent))
            .await?;

        match &result {
            AssociationResult::Success => {
                tracing::debug!(action = link.action, child_id, parent_id, "association applied")
            }
            AssociationResult::Failure(reason) => {
                tracing::debug!(action = link.action, %reason, "association refused")
            }
        }
        Ok(result)
    }

    //
    // GRAPH
    //

    /// Load the project's records and index their references
    ///
    /// Returns `None` when the project does not exist.
    pub async fn get_project_relationship_graph(
        &self,
        project_id: &str,
    ) -> AdapterResult<Option<RelationshipGraph>> {
        let project: Option<Project> = self
            .adapter
            .find_one_as(collections::PROJECTS, project_id)
            .await?;
        let Some(project) = project else {
            return Ok(None);
        };

        let scope = QueryOptions::new()
            .where_eq(fields::PROJECT_ID, Value::from(project_id))
            .order_by(CREATED_AT_FIELD, OrderDirection::Asc);
        let povs: Vec<Pov> = self.adapter.find_many_as(collections::POVS, &scope).await?;
        let trrs: Vec<Trr> = self.adapter.find_many_as(collections::TRRS, &scope).await?;
        let scenarios: Vec<Scenario> = self
            .adapter
            .find_many_as(collections::SCENARIOS, &scope)
            .await?;

        Ok(Some(RelationshipGraph::build(project, povs, trrs, scenarios)))
    }

    async fn resolve(
        &self,
        kind: EntityKind,
        id: &str,
        in_project: &HashSet<&str>,
    ) -> AdapterResult<Resolution> {
        if in_project.contains(id) {
            Ok(Resolution::InProject)
        } else if self.adapter.exists(kind.collection(), id).await? {
            Ok(Resolution::OtherProject)
        } else {
            Ok(Resolution::Missing)
        }
    }

    //
    // VALIDATION
    //

    pub async fn validate_relationships(&self, project_id: &str) -> AdapterResult<ValidationReport> {
        let Some(graph) = self.get_project_relationship_graph(project_id).await? else {
            return Ok(ValidationReport {
                valid: false,
                errors: vec![format!("Project {} not found", project_id)],
                warnings: Vec::new(),
            });
        };

        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let povs = graph.ids_of(EntityKind::Pov);

        for (kind, id, pov_id) in graph.pov_refs() {
            let Some(pov_id) = pov_id else {
                warnings.push(format!("{} {} is not associated with a POV", kind, id));
                continue;
            };
            match self.resolve(EntityKind::Pov, pov_id, &povs).await? {
                Resolution::InProject => {
                    if !graph.pov_lists(pov_id, kind, id) {
                        warnings.push(format!("POV {} does not list {} {}", pov_id, kind, id));
                    }
                }
                Resolution::OtherProject => errors.push(format!(
                    "{} {} references POV {} from another project",
                    kind, id, pov_id
                )),
                Resolution::Missing => errors.push(format!(
                    "{} {} references non-existent POV {}",
                    kind, id, pov_id
                )),
            }
        }

        for array in graph.parent_arrays() {
            let in_project = graph.ids_of(array.child);
            for child_id in array.ids {
                match self.resolve(array.child, child_id, &in_project).await? {
                    Resolution::InProject => {}
                    Resolution::OtherProject => errors.push(format!(
                        "{} {} lists {} {} from another project",
                        array.parent, array.parent_id, array.child, child_id
                    )),
                    Resolution::Missing => errors.push(format!(
                        "{} {} lists non-existent {} {}",
                        array.parent, array.parent_id, array.child, child_id
                    )),
                }
            }
        }

        Ok(ValidationReport {
            valid: errors.is_empty(),
            errors,
            warnings,
        })
    }

    //
    // REPAIR
    //

    /// Null dangling scalars and drop dangling array entries, one write each
    ///
    /// References to records in another project are left alone: they are
    /// reported by validation but are not dangling.
    pub async fn repair_relationships(&self, project_id: &str) -> AdapterResult<RepairReport> {
        let Some(graph) = self.get_project_relationship_graph(project_id).await? else {
            return Ok(RepairReport {
                fixed: 0,
                errors: vec![format!("Project {} not found", project_id)],
            });
        };

        let mut report = RepairReport::default();
        let povs = graph.ids_of(EntityKind::Pov);

        for (kind, id, pov_id) in graph.pov_refs() {
            let Some(pov_id) = pov_id else {
                continue;
            };
            if self.resolve(EntityKind::Pov, pov_id, &povs).await? != Resolution::Missing {
                continue;
            }
            let mut patch = Map::new();
            patch.insert(fields::POV_ID.to_string(), Value::Null);
            self.apply_fix(&mut report, kind, id, patch, pov_id).await;
        }

        for array in graph.parent_arrays() {
            let in_project = graph.ids_of(array.child);
            let mut dangling: Vec<&str> = Vec::new();
            for child_id in array.ids {
                if self.resolve(array.child, child_id, &in_project).await? == Resolution::Missing {
                    dangling.push(child_id);
                }
            }
            if dangling.is_empty() {
                continue;
            }

            // Rebuild from the stored record so nested siblings survive
            let Some(parent) = self
                .adapter
                .find_one(array.parent.collection(), array.parent_id)
                .await?
            else {
                continue;
            };
            let kept: Vec<String> = array
                .array
                .ids(&parent)
                .into_iter()
                .filter(|id| !dangling.contains(&id.as_str()))
                .collect();
            let patch = array.array.patch(&parent, kept);
            self.apply_fix(
                &mut report,
                array.parent,
                array.parent_id,
                patch,
                &dangling.join(", "),
            )
            .await;
        }

        Ok(report)
    }

    async fn apply_fix(
        &self,
        report: &mut RepairReport,
        kind: EntityKind,
        id: &str,
        patch: Map<String, Value>,
        removed: &str,
    ) {
        match self.adapter.update(kind.collection(), id, patch).await {
            Ok(_) => {
                report.fixed += 1;
                tracing::warn!(entity = %kind, id, removed, "Removed dangling reference");
            }
            Err(e) => report
                .errors
                .push(format!("Failed to repair {} {}: {}", kind, id, e)),
        }
    }
}

/// Body of every association, run inside one transaction
async fn link_records(
    tx: TransactionHandle,
    link: Link,
    child_id: String,
    parent_id: String,
) -> AdapterResult<AssociationResult> {
    let Some(child) = tx.find_one(link.child.collection(), &child_id).await? else {
        return Ok(AssociationError::not_found(link.child, child_id).into());
    };
    let Some(parent) = tx.find_one(link.parent.collection(), &parent_id).await? else {
        return Ok(AssociationError::not_found(link.parent, parent_id).into());
    };

    let child_project = child.get_str(fields::PROJECT_ID).map(str::to_string);
    let parent_project = parent.get_str(fields::PROJECT_ID).map(str::to_string);

    if link.same_project {
        if let (Some(child_project), Some(parent_project)) = (&child_project, &parent_project) {
            if child_project != parent_project {
                return Ok(AssociationError::ProjectMismatch {
                    child_kind: link.child,
                    child_id,
                    child_project: child_project.clone(),
                    parent_kind: link.parent,
                    parent_id,
                    parent_project: parent_project.clone(),
                }
                .into());
            }
        }
    }

    // Child side
    let current = child.get_str(link.child_field).map(str::to_string);
    let mut child_patch = Map::new();
    if current.as_deref() != Some(parent_id.as_str()) {
        child_patch.insert(link.child_field.to_string(), Value::from(parent_id.as_str()));
    }
    if link.same_project && child_project.is_none() {
        if let Some(project) = &parent_project {
            child_patch.insert(fields::PROJECT_ID.to_string(), Value::from(project.as_str()));
        }
    }
    if !child_patch.is_empty() {
        tx.update(link.child.collection(), &child_id, child_patch)
            .await?;
    }

    // Parent side, only when the id is absent
    let mut ids = link.array.ids(&parent);
    if !ids.contains(&child_id) {
        ids.push(child_id.clone());
        tx.update(
            link.parent.collection(),
            &parent_id,
            link.array.patch(&parent, ids),
        )
        .await?;
    }

    // Previous parent no longer owns the child
    if let Some(previous) = current.filter(|previous| *previous != parent_id) {
        if let Some(old_parent) = tx.find_one(link.parent.collection(), &previous).await? {
            let ids = link.array.ids(&old_parent);
            if ids.contains(&child_id) {
                let kept: Vec<String> = ids.into_iter().filter(|id| *id != child_id).collect();
                tx.update(
                    link.parent.collection(),
                    &previous,
                    link.array.patch(&old_parent, kept),
                )
                .await?;
            }
        }
    }

    let entry = Record::data_from_typed(&AuditEntry {
        action: link.action,
        entity_type: link.child,
        entity_id: &child_id,
        related_type: link.parent,
        related_id: &parent_id,
    })?;
    tx.create(collections::ACTIVITY_LOGS, entry).await?;

    Ok(AssociationResult::Success)
}
