mod client;
mod mock;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use crate::error::Result;
use crate::reference::{DatasetReference, TableReference};

pub use client::BqClient;
pub use mock::MockWarehouse;

/// Object kind as reported by the tables API `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TableKind {
    Table,
    View,
    MaterializedView,
    External,
    Snapshot,
    Other(String),
}

impl TableKind {
    pub fn from_api(kind: &str) -> Self {
        match kind.to_ascii_uppercase().as_str() {
            "TABLE" => TableKind::Table,
            "VIEW" => TableKind::View,
            "MATERIALIZED_VIEW" => TableKind::MaterializedView,
            "EXTERNAL" => TableKind::External,
            "SNAPSHOT" => TableKind::Snapshot,
            other => TableKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableKind::Table => write!(f, "TABLE"),
            TableKind::View => write!(f, "VIEW"),
            TableKind::MaterializedView => write!(f, "MATERIALIZED_VIEW"),
            TableKind::External => write!(f, "EXTERNAL"),
            TableKind::Snapshot => write!(f, "SNAPSHOT"),
            TableKind::Other(name) => write!(f, "{}", name),
        }
    }
}

/// Current metadata of a table or view. `sql_text` is only set for views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewDefinition {
    pub reference: TableReference,
    pub kind: TableKind,
    pub sql_text: Option<String>,
    pub use_legacy_sql: bool,
}

impl ViewDefinition {
    pub fn table(reference: TableReference) -> Self {
        Self {
            reference,
            kind: TableKind::Table,
            sql_text: None,
            use_legacy_sql: false,
        }
    }

    pub fn view(reference: TableReference, sql: impl Into<String>) -> Self {
        Self {
            reference,
            kind: TableKind::View,
            sql_text: Some(sql.into()),
            use_legacy_sql: false,
        }
    }

    pub fn is_view(&self) -> bool {
        self.kind == TableKind::View
    }
}

/// A view found by a catalog search, with its saved SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewSource {
    pub reference: TableReference,
    pub sql_text: String,
}

/// The warehouse metadata/query operations the refresh engine relies on.
///
/// Calls are awaited one at a time by every caller in this crate.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Fails with an error whose `is_not_found()` is true when the object does not exist.
    async fn get_definition(&self, reference: &TableReference) -> Result<ViewDefinition>;

    async fn list_tables(&self, dataset: &DatasetReference) -> Result<Vec<TableReference>>;

    /// Views in `dataset` whose SQL text contains `pattern`.
    async fn search_view_definitions(
        &self,
        dataset: &DatasetReference,
        pattern: &str,
    ) -> Result<Vec<ViewSource>>;

    /// Runs a statement and returns once the job has completed.
    async fn run_query(&self, sql: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_kind_from_api() {
        assert_eq!(TableKind::from_api("VIEW"), TableKind::View);
        assert_eq!(TableKind::from_api("materialized_view"), TableKind::MaterializedView);
        assert_eq!(TableKind::from_api("TABLE"), TableKind::Table);
        assert_eq!(TableKind::from_api("CLONE"), TableKind::Other("CLONE".to_string()));
        assert_eq!(TableKind::from_api("CLONE").to_string(), "CLONE");
    }

    #[test]
    fn test_view_definition_constructors() {
        let r = TableReference::new("p", "d", "v");
        let view = ViewDefinition::view(r.clone(), "SELECT 1");
        assert!(view.is_view());
        assert_eq!(view.sql_text.as_deref(), Some("SELECT 1"));

        let table = ViewDefinition::table(r);
        assert!(!table.is_view());
        assert!(table.sql_text.is_none());
    }
}
