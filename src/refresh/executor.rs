use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};
use crate::lineage::PlannedOrder;
use crate::reference::TableReference;
use crate::warehouse::{ViewDefinition, Warehouse};

/// Terminal state of one node in a refresh run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// Dry run: the view would have been rebuilt.
    Pending,
    Skipped(String),
    Refreshed,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeOutcome {
    pub reference: TableReference,
    #[serde(flatten)]
    pub outcome: RefreshOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub starting_reference: TableReference,
    pub planned_order: Vec<TableReference>,
    /// One entry per planned node, in plan order.
    pub outcomes: Vec<NodeOutcome>,
    pub cyclic: Vec<TableReference>,
    pub unresolved: BTreeMap<TableReference, String>,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RefreshReport {
    pub fn refreshed(&self) -> BTreeSet<&TableReference> {
        self.outcomes
            .iter()
            .filter(|o| o.outcome == RefreshOutcome::Refreshed)
            .map(|o| &o.reference)
            .collect()
    }

    pub fn failed(&self) -> BTreeMap<&TableReference, &str> {
        self.outcomes
            .iter()
            .filter_map(|o| match &o.outcome {
                RefreshOutcome::Failed(message) => Some((&o.reference, message.as_str())),
                _ => None,
            })
            .collect()
    }

    pub fn skipped(&self) -> BTreeMap<&TableReference, &str> {
        self.outcomes
            .iter()
            .filter_map(|o| match &o.outcome {
                RefreshOutcome::Skipped(reason) => Some((&o.reference, reason.as_str())),
                _ => None,
            })
            .collect()
    }

    pub fn pending(&self) -> BTreeSet<&TableReference> {
        self.outcomes
            .iter()
            .filter(|o| o.outcome == RefreshOutcome::Pending)
            .map(|o| &o.reference)
            .collect()
    }

    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(|o| matches!(o.outcome, RefreshOutcome::Failed(_)))
    }

    pub fn outcome_of(&self, reference: &TableReference) -> Option<&RefreshOutcome> {
        self.outcomes
            .iter()
            .find(|o| &o.reference == reference)
            .map(|o| &o.outcome)
    }
}

/// Rebuilds views one at a time from their own saved SQL.
pub struct RefreshExecutor<'a, W: Warehouse + ?Sized> {
    warehouse: &'a W,
}

impl<'a, W: Warehouse + ?Sized> RefreshExecutor<'a, W> {
    pub fn new(warehouse: &'a W) -> Self {
        Self { warehouse }
    }

    /// Visits every planned node; per-node failures end up in the report.
    pub async fn execute(
        &self,
        start: &TableReference,
        plan: &PlannedOrder,
        dry_run: bool,
    ) -> RefreshReport {
        let started_at = Utc::now();
        let mut outcomes = Vec::with_capacity(plan.order.len());

        for (idx, reference) in plan.order.iter().enumerate() {
            debug!("[{}/{}] {}", idx + 1, plan.order.len(), reference);
            let outcome = self.refresh_one(reference, dry_run).await;

            match &outcome {
                RefreshOutcome::Refreshed => info!("Refreshed {}", reference),
                RefreshOutcome::Failed(message) => warn!("Failed to refresh {}: {}", reference, message),
                RefreshOutcome::Skipped(reason) => debug!("Skipped {}: {}", reference, reason),
                RefreshOutcome::Pending => debug!("Would refresh {}", reference),
            }

            outcomes.push(NodeOutcome {
                reference: reference.clone(),
                outcome,
            });
        }

        RefreshReport {
            starting_reference: start.clone(),
            planned_order: plan.order.clone(),
            outcomes,
            cyclic: plan.cyclic.clone(),
            unresolved: BTreeMap::new(),
            dry_run,
            started_at,
            finished_at: Utc::now(),
        }
    }

    async fn refresh_one(&self, reference: &TableReference, dry_run: bool) -> RefreshOutcome {
        let definition = match self.warehouse.get_definition(reference).await {
            Ok(def) => def,
            Err(e) => return RefreshOutcome::Failed(e.to_string()),
        };

        let statement = match refresh_statement(&definition) {
            Ok(sql) => sql,
            Err(reason) => return RefreshOutcome::Skipped(reason.to_string()),
        };

        if dry_run {
            return RefreshOutcome::Pending;
        }

        match self.warehouse.run_query(&statement).await {
            Ok(()) => RefreshOutcome::Refreshed,
            Err(e) => RefreshOutcome::Failed(e.to_string()),
        }
    }
}

/// `CREATE OR REPLACE VIEW` replaying the view's current SQL, or the reason it
/// cannot be rebuilt.
pub fn refresh_statement(definition: &ViewDefinition) -> std::result::Result<String, &'static str> {
    if !definition.is_view() {
        return Err("not a view");
    }
    if definition.use_legacy_sql {
        return Err("legacy SQL view");
    }

    match definition.sql_text.as_deref().map(str::trim) {
        Some(sql) if !sql.is_empty() => Ok(format!(
            "CREATE OR REPLACE VIEW {} AS\n{}",
            definition.reference.quoted(),
            sql
        )),
        _ => Err("view has no SQL definition"),
    }
}
