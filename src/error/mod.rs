mod bq_error;
mod parser;

use thiserror::Error;

pub use bq_error::{BigQueryError, QueryErrorLocation};
pub use parser::{parse_bq_error, ErrorContext};

#[derive(Error, Debug)]
pub enum BqWizardError {
    #[error("BigQuery error: {0}")]
    BigQuery(#[from] BigQueryError),

    #[error("BigQuery client error: {0}")]
    Client(String),

    #[error("Reference not found: {0}")]
    ReferenceNotFound(String),

    #[error("Malformed reference '{reference}': {reason}")]
    MalformedReference {
        reference: String,
        reason: String,
    },

    #[error("Query execution failed: {0}")]
    QueryExecution(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BqWizardError {
    pub fn malformed(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        BqWizardError::MalformedReference {
            reference: reference.into(),
            reason: reason.into(),
        }
    }

    /// True when the warehouse reported the object (or its dataset) as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            BqWizardError::ReferenceNotFound(_)
                | BqWizardError::BigQuery(BigQueryError::TableNotFound { .. })
                | BqWizardError::BigQuery(BigQueryError::DatasetNotFound { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, BqWizardError>;
