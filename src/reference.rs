//! Canonical `project.dataset.table` references.

use std::cmp::Ordering;
use std::fmt;
use serde::{Serialize, Serializer};
use crate::error::{BqWizardError, Result};

/// Fully-qualified table or view reference.
///
/// Equality and ordering follow the canonical string form so that sets of
/// references iterate in the same order the CLI prints them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableReference {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

/// Defaults substituted into partially-qualified references.
#[derive(Debug, Clone, Default)]
pub struct ReferenceContext {
    pub project: String,
    pub dataset: Option<String>,
}

impl ReferenceContext {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            dataset: None,
        }
    }

    pub fn with_dataset(mut self, dataset: impl Into<String>) -> Self {
        self.dataset = Some(dataset.into());
        self
    }
}

impl TableReference {
    pub fn new(project: impl Into<String>, dataset: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            dataset: dataset.into(),
            table: table.into(),
        }
    }

    /// Parse a 1-, 2- or 3-part identifier, filling missing parts from `context`.
    ///
    /// Backticks are accepted around the whole identifier or around single
    /// segments. A 1-part identifier needs `context.dataset`.
    pub fn parse(input: &str, context: &ReferenceContext) -> Result<Self> {
        let segments = split_segments(input)?;

        match segments.as_slice() {
            [project, dataset, table] => Ok(Self::new(*project, *dataset, *table)),
            [dataset, table] => {
                if context.project.is_empty() {
                    return Err(BqWizardError::malformed(input, "no default project to qualify it with"));
                }
                Ok(Self::new(context.project.as_str(), *dataset, *table))
            }
            [table] => match &context.dataset {
                Some(dataset) if !context.project.is_empty() => {
                    Ok(Self::new(context.project.as_str(), dataset.as_str(), *table))
                }
                _ => Err(BqWizardError::malformed(input, "expected dataset.table or project.dataset.table")),
            },
            _ => Err(BqWizardError::malformed(input, "more than 3 dot-separated segments")),
        }
    }

    pub fn fqn(&self) -> String {
        format!("{}.{}.{}", self.project, self.dataset, self.table)
    }

    pub fn dataset_reference(&self) -> DatasetReference {
        DatasetReference::new(self.project.as_str(), self.dataset.as_str())
    }

    /// Backtick-quoted form for use inside generated SQL.
    pub fn quoted(&self) -> String {
        format!("`{}`", self.fqn())
    }
}

fn split_segments(input: &str) -> Result<Vec<&str>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(BqWizardError::malformed(input, "empty reference"));
    }

    let segments: Vec<&str> = trimmed
        .split('.')
        .map(|s| s.trim().trim_matches('`').trim())
        .collect();

    if segments.iter().any(|s| s.is_empty()) {
        return Err(BqWizardError::malformed(input, "empty segment"));
    }
    if segments.iter().any(|s| s.contains('`') || s.contains(char::is_whitespace)) {
        return Err(BqWizardError::malformed(input, "unexpected quote or whitespace inside a segment"));
    }

    Ok(segments)
}

impl fmt::Display for TableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

impl Ord for TableReference {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fqn().cmp(&other.fqn())
    }
}

impl PartialOrd for TableReference {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for TableReference {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatasetReference {
    pub project: String,
    pub dataset: String,
}

impl DatasetReference {
    pub fn new(project: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            dataset: dataset.into(),
        }
    }

    /// Parse `dataset` or `project.dataset`.
    pub fn parse(input: &str, default_project: &str) -> Result<Self> {
        let segments = split_segments(input)?;
        match segments.as_slice() {
            [project, dataset] => Ok(Self::new(*project, *dataset)),
            [dataset] if !default_project.is_empty() => Ok(Self::new(default_project, *dataset)),
            [_] => Err(BqWizardError::malformed(input, "no default project to qualify it with")),
            _ => Err(BqWizardError::malformed(input, "expected dataset or project.dataset")),
        }
    }

    pub fn table(&self, table: impl Into<String>) -> TableReference {
        TableReference::new(self.project.as_str(), self.dataset.as_str(), table)
    }
}

impl fmt::Display for DatasetReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.project, self.dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ReferenceContext {
        ReferenceContext::new("default-proj")
    }

    #[test]
    fn test_parse_three_part() {
        let r = TableReference::parse("p.d.t", &ctx()).unwrap();
        assert_eq!(r, TableReference::new("p", "d", "t"));
        assert_eq!(r.fqn(), "p.d.t");
    }

    #[test]
    fn test_parse_two_part_uses_default_project() {
        let r = TableReference::parse("sales.orders", &ctx()).unwrap();
        assert_eq!(r.to_string(), "default-proj.sales.orders");
    }

    #[test]
    fn test_parse_one_part_needs_dataset() {
        let err = TableReference::parse("onlytable", &ctx()).unwrap_err();
        assert!(matches!(err, BqWizardError::MalformedReference { .. }));

        let r = TableReference::parse("onlytable", &ctx().with_dataset("sales")).unwrap();
        assert_eq!(r.to_string(), "default-proj.sales.onlytable");
    }

    #[test]
    fn test_parse_backticks() {
        let whole = TableReference::parse("`my-proj.d.t`", &ctx()).unwrap();
        let per_segment = TableReference::parse("`my-proj`.`d`.`t`", &ctx()).unwrap();
        assert_eq!(whole, per_segment);
        assert_eq!(whole.quoted(), "`my-proj.d.t`");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["a.b.c.d", "a..b", ".a.b", "a.b.", "", "   ", "a.b c.d"] {
            assert!(
                TableReference::parse(bad, &ctx()).is_err(),
                "expected '{}' to be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_ordering_follows_canonical_string() {
        let a = TableReference::new("a-b", "x", "y");
        let b = TableReference::new("a", "x", "y");
        // '-' sorts before '.' in the canonical form
        assert!(a < b);
        assert_eq!(a.fqn().cmp(&b.fqn()), a.cmp(&b));
    }

    #[test]
    fn test_serializes_as_string() {
        let r = TableReference::new("p", "d", "t");
        assert_eq!(serde_json::to_string(&r).unwrap(), "\"p.d.t\"");
    }

    #[test]
    fn test_dataset_reference_parse() {
        assert_eq!(
            DatasetReference::parse("sales", "proj").unwrap(),
            DatasetReference::new("proj", "sales")
        );
        assert_eq!(
            DatasetReference::parse("other.sales", "proj").unwrap().to_string(),
            "other.sales"
        );
        assert!(DatasetReference::parse("a.b.c", "proj").is_err());
        assert!(DatasetReference::parse("sales", "").is_err());
    }
}
