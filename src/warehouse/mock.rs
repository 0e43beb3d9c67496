//! In-memory warehouse for tests and offline demos.
//!
//! Holds a fixed catalog of tables and views, records every statement passed
//! to `run_query`, and can be told to fail specific lookups or refreshes.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;
use crate::error::{BigQueryError, BqWizardError, Result};
use crate::reference::{DatasetReference, TableReference};
use super::{ViewDefinition, ViewSource, Warehouse};

#[derive(Default)]
pub struct MockWarehouse {
    catalog: BTreeMap<TableReference, ViewDefinition>,
    lookup_errors: HashMap<TableReference, String>,
    search_errors: HashMap<DatasetReference, String>,
    statement_errors: Vec<(String, String)>,
    executed: Mutex<Vec<String>>,
    lookups: Mutex<Vec<TableReference>>,
}

impl MockWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, reference: TableReference) -> Self {
        self.catalog.insert(reference.clone(), ViewDefinition::table(reference));
        self
    }

    pub fn with_view(mut self, reference: TableReference, sql: impl Into<String>) -> Self {
        self.catalog.insert(reference.clone(), ViewDefinition::view(reference, sql));
        self
    }

    pub fn with_definition(mut self, definition: ViewDefinition) -> Self {
        self.catalog.insert(definition.reference.clone(), definition);
        self
    }

    /// `get_definition` for `reference` fails with `message` even if it is in the catalog.
    pub fn fail_lookup(mut self, reference: TableReference, message: impl Into<String>) -> Self {
        self.lookup_errors.insert(reference, message.into());
        self
    }

    /// `search_view_definitions` on `dataset` fails with `message`.
    pub fn fail_search(mut self, dataset: DatasetReference, message: impl Into<String>) -> Self {
        self.search_errors.insert(dataset, message.into());
        self
    }

    /// Any statement containing `needle` fails with `message`.
    pub fn fail_statement(mut self, needle: impl Into<String>, message: impl Into<String>) -> Self {
        self.statement_errors.push((needle.into(), message.into()));
        self
    }

    /// Statements accepted by `run_query`, in call order.
    pub async fn executed(&self) -> Vec<String> {
        self.executed.lock().await.clone()
    }

    /// References passed to `get_definition`, in call order.
    pub async fn lookups(&self) -> Vec<TableReference> {
        self.lookups.lock().await.clone()
    }
}

#[async_trait]
impl Warehouse for MockWarehouse {
    async fn get_definition(&self, reference: &TableReference) -> Result<ViewDefinition> {
        self.lookups.lock().await.push(reference.clone());

        if let Some(message) = self.lookup_errors.get(reference) {
            return Err(BqWizardError::QueryExecution(message.clone()));
        }

        self.catalog
            .get(reference)
            .cloned()
            .ok_or_else(|| BqWizardError::BigQuery(BigQueryError::TableNotFound {
                project: reference.project.clone(),
                dataset: reference.dataset.clone(),
                table: reference.table.clone(),
            }))
    }

    async fn list_tables(&self, dataset: &DatasetReference) -> Result<Vec<TableReference>> {
        let tables: Vec<TableReference> = self.catalog
            .keys()
            .filter(|r| r.project == dataset.project && r.dataset == dataset.dataset)
            .cloned()
            .collect();

        if tables.is_empty() {
            return Err(BqWizardError::BigQuery(BigQueryError::DatasetNotFound {
                project: dataset.project.clone(),
                dataset: dataset.dataset.clone(),
            }));
        }

        Ok(tables)
    }

    async fn search_view_definitions(
        &self,
        dataset: &DatasetReference,
        pattern: &str,
    ) -> Result<Vec<ViewSource>> {
        if let Some(message) = self.search_errors.get(dataset) {
            return Err(BqWizardError::QueryExecution(message.clone()));
        }

        Ok(self.catalog
            .values()
            .filter(|d| d.reference.project == dataset.project && d.reference.dataset == dataset.dataset)
            .filter_map(|d| match (&d.sql_text, d.is_view()) {
                (Some(sql), true) if sql.contains(pattern) => Some(ViewSource {
                    reference: d.reference.clone(),
                    sql_text: sql.clone(),
                }),
                _ => None,
            })
            .collect())
    }

    async fn run_query(&self, sql: &str) -> Result<()> {
        if let Some((_, message)) = self.statement_errors.iter().find(|(needle, _)| sql.contains(needle.as_str())) {
            return Err(BqWizardError::QueryExecution(message.clone()));
        }

        self.executed.lock().await.push(sql.to_string());
        Ok(())
    }
}
