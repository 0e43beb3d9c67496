use std::fmt;

#[derive(Debug, Clone)]
pub enum BigQueryError {
    AuthenticationFailed {
        reason: String,
    },

    InvalidQuery {
        sql_preview: String,
        message: String,
        location: Option<QueryErrorLocation>,
    },

    TableNotFound {
        project: String,
        dataset: String,
        table: String,
    },

    DatasetNotFound {
        project: String,
        dataset: String,
    },

    AccessDenied {
        resource: String,
        required_permission: Option<String>,
    },

    QuotaExceeded {
        quota_type: String,
        message: String,
    },

    JobIncomplete {
        operation: String,
    },

    ConnectionFailed {
        reason: String,
    },

    InvalidCredentials {
        path: Option<String>,
        reason: String,
    },

    Unknown {
        code: Option<String>,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryErrorLocation {
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl BigQueryError {
    pub fn suggestion(&self) -> String {
        match self {
            BigQueryError::AuthenticationFailed { .. } => {
                "Authenticate first:\n  \
                 • Run: gcloud auth application-default login\n  \
                 • Or point GOOGLE_APPLICATION_CREDENTIALS at a service account key".to_string()
            }

            BigQueryError::InvalidQuery { .. } => {
                "The stored view SQL no longer compiles:\n  \
                 • An upstream column may have been renamed or dropped\n  \
                 • Fix the view definition, then refresh again".to_string()
            }

            BigQueryError::TableNotFound { project, dataset, table } => {
                format!(
                    "Check the reference:\n  \
                     • Run: bq show {project}:{dataset}.{table}\n  \
                     • Views may still name a table that was dropped or renamed"
                )
            }

            BigQueryError::DatasetNotFound { project, dataset } => {
                format!(
                    "Check the dataset:\n  \
                     • Run: bq show {project}:{dataset}\n  \
                     • Pass project.dataset.table if it lives in another project"
                )
            }

            BigQueryError::AccessDenied { resource, required_permission } => {
                let perm = required_permission.as_deref().unwrap_or("bigquery.tables.update");
                format!(
                    "Missing access to {resource}:\n  \
                     • Required permission: {perm}\n  \
                     • Refreshing a view needs bigquery.tables.update on its dataset"
                )
            }

            BigQueryError::QuotaExceeded { quota_type, .. } => {
                format!(
                    "Quota '{quota_type}' exceeded:\n  \
                     • Wait a few minutes and rerun the refresh\n  \
                     • Lower --max-depth to refresh fewer views per run"
                )
            }

            BigQueryError::JobIncomplete { operation } => {
                format!(
                    "The '{operation}' job did not finish before the API returned:\n  \
                     • Check the job in the BigQuery console\n  \
                     • Rerun the refresh once it has completed"
                )
            }

            BigQueryError::ConnectionFailed { .. } => {
                "Connection failed:\n  \
                 • Check network access to bigquery.googleapis.com\n  \
                 • Verify the BigQuery API is enabled for the project".to_string()
            }

            BigQueryError::InvalidCredentials { path, .. } => {
                let path_info = path.as_ref()
                    .map(|p| format!(" ({p})"))
                    .unwrap_or_default();
                format!(
                    "Invalid credentials{path_info}:\n  \
                     • Check GOOGLE_APPLICATION_CREDENTIALS\n  \
                     • Run: gcloud auth application-default login"
                )
            }

            BigQueryError::Unknown { .. } => {
                "Unexpected BigQuery response:\n  \
                 • Rerun with --verbose for details\n  \
                 • Check https://status.cloud.google.com/".to_string()
            }
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            BigQueryError::AuthenticationFailed { .. } => "AUTH_FAILED",
            BigQueryError::InvalidQuery { .. } => "INVALID_QUERY",
            BigQueryError::TableNotFound { .. } => "TABLE_NOT_FOUND",
            BigQueryError::DatasetNotFound { .. } => "DATASET_NOT_FOUND",
            BigQueryError::AccessDenied { .. } => "ACCESS_DENIED",
            BigQueryError::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            BigQueryError::JobIncomplete { .. } => "JOB_INCOMPLETE",
            BigQueryError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            BigQueryError::InvalidCredentials { .. } => "INVALID_CREDENTIALS",
            BigQueryError::Unknown { .. } => "UNKNOWN",
        }
    }
}

impl fmt::Display for BigQueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BigQueryError::AuthenticationFailed { reason } => {
                write!(f, "Authentication failed: {reason}")
            }

            BigQueryError::InvalidQuery { message, sql_preview, location } => {
                write!(f, "Invalid SQL: {message}")?;
                if let Some(QueryErrorLocation { line: Some(line), column }) = location {
                    write!(f, " (line {line}")?;
                    if let Some(col) = column {
                        write!(f, ", column {col}")?;
                    }
                    write!(f, ")")?;
                }
                if !sql_preview.is_empty() {
                    write!(f, "\n\nSQL preview:\n  {sql_preview}")?;
                }
                Ok(())
            }

            BigQueryError::TableNotFound { project, dataset, table } => {
                write!(f, "Table not found: {project}.{dataset}.{table}")
            }

            BigQueryError::DatasetNotFound { project, dataset } => {
                write!(f, "Dataset not found: {project}.{dataset}")
            }

            BigQueryError::AccessDenied { resource, required_permission } => {
                write!(f, "Access denied to {resource}")?;
                if let Some(perm) = required_permission {
                    write!(f, " (requires {perm})")?;
                }
                Ok(())
            }

            BigQueryError::QuotaExceeded { quota_type, message } => {
                write!(f, "Quota exceeded ({quota_type}): {message}")
            }

            BigQueryError::JobIncomplete { operation } => {
                write!(f, "Job for {operation} did not complete")
            }

            BigQueryError::ConnectionFailed { reason } => {
                write!(f, "Connection failed: {reason}")
            }

            BigQueryError::InvalidCredentials { reason, path } => {
                write!(f, "Invalid credentials: {reason}")?;
                if let Some(p) = path {
                    write!(f, " (path: {p})")?;
                }
                Ok(())
            }

            BigQueryError::Unknown { code: Some(c), message } => {
                write!(f, "BigQuery error [{c}]: {message}")
            }

            BigQueryError::Unknown { code: None, message } => {
                write!(f, "BigQuery error: {message}")
            }
        }
    }
}

impl std::error::Error for BigQueryError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(BigQueryError::TableNotFound {
            project: "p".into(),
            dataset: "d".into(),
            table: "t".into(),
        }.error_code(), "TABLE_NOT_FOUND");

        assert_eq!(BigQueryError::JobIncomplete {
            operation: "run_query".into(),
        }.error_code(), "JOB_INCOMPLETE");

        assert_eq!(BigQueryError::Unknown {
            code: None,
            message: "m".into(),
        }.error_code(), "UNKNOWN");
    }

    #[test]
    fn test_display_invalid_query_with_location() {
        let err = BigQueryError::InvalidQuery {
            sql_preview: "CREATE OR REPLACE VIEW `p.d.v` AS SELECT x FROM".into(),
            message: "Unrecognized name: x".into(),
            location: Some(QueryErrorLocation {
                line: Some(1),
                column: Some(42),
            }),
        };
        let display = err.to_string();
        assert!(display.contains("Invalid SQL: Unrecognized name: x"));
        assert!(display.contains("line 1, column 42"));
        assert!(display.contains("CREATE OR REPLACE VIEW"));
    }

    #[test]
    fn test_display_invalid_query_without_location() {
        let err = BigQueryError::InvalidQuery {
            sql_preview: "".into(),
            message: "Syntax error".into(),
            location: None,
        };
        assert_eq!(err.to_string(), "Invalid SQL: Syntax error");
    }

    #[test]
    fn test_display_table_not_found() {
        let err = BigQueryError::TableNotFound {
            project: "my-project".into(),
            dataset: "sales".into(),
            table: "orders".into(),
        };
        assert_eq!(err.to_string(), "Table not found: my-project.sales.orders");
        assert!(err.suggestion().contains("bq show my-project:sales.orders"));
    }

    #[test]
    fn test_display_access_denied() {
        let err = BigQueryError::AccessDenied {
            resource: "p.d.v".into(),
            required_permission: Some("bigquery.tables.update".into()),
        };
        assert_eq!(err.to_string(), "Access denied to p.d.v (requires bigquery.tables.update)");
    }

    #[test]
    fn test_display_unknown() {
        let with_code = BigQueryError::Unknown {
            code: Some("backendError".into()),
            message: "try again".into(),
        };
        assert_eq!(with_code.to_string(), "BigQuery error [backendError]: try again");

        let without_code = BigQueryError::Unknown {
            code: None,
            message: "try again".into(),
        };
        assert_eq!(without_code.to_string(), "BigQuery error: try again");
    }

    #[test]
    fn test_suggestion_quota_mentions_max_depth() {
        let err = BigQueryError::QuotaExceeded {
            quota_type: "rate limit".into(),
            message: "too many table updates".into(),
        };
        assert!(err.suggestion().contains("--max-depth"));
    }
}
