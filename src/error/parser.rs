use gcp_bigquery_client::error::{BQError, ResponseError};
use regex::Regex;
use super::bq_error::{BigQueryError, QueryErrorLocation};
use crate::reference::TableReference;

const SQL_PREVIEW_CHARS: usize = 500;

pub fn parse_bq_error(error: BQError, context: ErrorContext) -> BigQueryError {
    match &error {
        BQError::ResponseError { error: resp } => parse_response_error(resp, context),

        BQError::RequestError(req_err) => BigQueryError::ConnectionFailed {
            reason: req_err.to_string(),
        },

        BQError::NoToken => BigQueryError::AuthenticationFailed {
            reason: "No authentication token available".to_string(),
        },

        BQError::AuthError(auth_err) => BigQueryError::AuthenticationFailed {
            reason: format!("{:?}", auth_err),
        },

        BQError::YupAuthError(yup_err) => BigQueryError::AuthenticationFailed {
            reason: yup_err.to_string(),
        },

        BQError::InvalidServiceAccountKey(io_err) => BigQueryError::InvalidCredentials {
            path: std::env::var("GOOGLE_APPLICATION_CREDENTIALS").ok(),
            reason: io_err.to_string(),
        },

        BQError::InvalidServiceAccountAuthenticator(io_err) => BigQueryError::InvalidCredentials {
            path: std::env::var("GOOGLE_APPLICATION_CREDENTIALS").ok(),
            reason: io_err.to_string(),
        },

        BQError::InvalidApplicationDefaultCredentialsAuthenticator(io_err) => {
            BigQueryError::AuthenticationFailed {
                reason: format!("Application default credentials unusable: {}", io_err),
            }
        }

        BQError::ConnectionPoolError(msg) => BigQueryError::ConnectionFailed {
            reason: msg.clone(),
        },

        _ => BigQueryError::Unknown {
            code: None,
            message: error.to_string(),
        },
    }
}

fn parse_response_error(resp: &ResponseError, context: ErrorContext) -> BigQueryError {
    let status = resp.error.code;
    let message = &resp.error.message;
    let reason = resp.error.errors.first().and_then(|e| e.get("reason").map(|s| s.as_str()));

    match (status, reason) {
        (400, Some("invalidQuery")) | (400, Some("invalid")) => BigQueryError::InvalidQuery {
            sql_preview: context.sql.unwrap_or_default(),
            message: message.clone(),
            location: extract_query_location(message),
        },

        (403, Some("accessDenied")) => BigQueryError::AccessDenied {
            resource: context.resource.unwrap_or_else(|| "resource".to_string()),
            required_permission: extract_required_permission(message),
        },

        (403, Some("quotaExceeded")) | (403, Some("rateLimitExceeded")) => {
            BigQueryError::QuotaExceeded {
                quota_type: extract_quota_type(message).unwrap_or_else(|| "API".to_string()),
                message: message.clone(),
            }
        }

        (404, _) => parse_not_found_error(message, &context),

        (500..=599, _) => BigQueryError::Unknown {
            code: Some(format!("HTTP_{}", status)),
            message: format!("BigQuery server error: {}", message),
        },

        _ => BigQueryError::Unknown {
            code: reason.map(|s| s.to_string()),
            message: message.clone(),
        },
    }
}

fn parse_not_found_error(message: &str, context: &ErrorContext) -> BigQueryError {
    // "Not found: Table my-project:my_dataset.my_table"
    if let Some(caps) = Regex::new(r"(?i)table\s+([^:\s]+):([^.\s]+)\.(\S+)")
        .ok()
        .and_then(|re| re.captures(message))
    {
        return BigQueryError::TableNotFound {
            project: caps[1].to_string(),
            dataset: caps[2].to_string(),
            table: caps[3].to_string(),
        };
    }

    // "Not found: Dataset my-project:my_dataset"
    if let Some(caps) = Regex::new(r"(?i)dataset\s+([^:\s]+):(\S+)")
        .ok()
        .and_then(|re| re.captures(message))
    {
        return BigQueryError::DatasetNotFound {
            project: caps[1].to_string(),
            dataset: caps[2].to_string(),
        };
    }

    match (&context.project, &context.dataset, &context.table) {
        (Some(project), Some(dataset), Some(table)) => BigQueryError::TableNotFound {
            project: project.clone(),
            dataset: dataset.clone(),
            table: table.clone(),
        },
        (Some(project), Some(dataset), None) => BigQueryError::DatasetNotFound {
            project: project.clone(),
            dataset: dataset.clone(),
        },
        _ => BigQueryError::Unknown {
            code: Some("notFound".to_string()),
            message: message.to_string(),
        },
    }
}

fn extract_query_location(message: &str) -> Option<QueryErrorLocation> {
    // BigQuery reports positions as "at [line:column]"
    let re = Regex::new(r"\[(\d+):(\d+)\]").ok()?;
    let caps = re.captures(message)?;
    Some(QueryErrorLocation {
        line: caps[1].parse().ok(),
        column: caps[2].parse().ok(),
    })
}

fn extract_required_permission(message: &str) -> Option<String> {
    let re = Regex::new(r"(bigquery\.[a-zA-Z.]*[a-zA-Z])").ok()?;
    re.captures(message).map(|caps| caps[1].to_string())
}

fn extract_quota_type(message: &str) -> Option<String> {
    let msg_lower = message.to_lowercase();

    if msg_lower.contains("table update") || msg_lower.contains("table metadata") {
        Some("table metadata updates".to_string())
    } else if msg_lower.contains("concurrent") {
        Some("concurrent queries".to_string())
    } else if msg_lower.contains("rate") {
        Some("rate limit".to_string())
    } else {
        None
    }
}

#[derive(Debug, Default, Clone)]
pub struct ErrorContext {
    pub sql: Option<String>,
    pub operation: Option<String>,
    pub resource: Option<String>,
    pub project: Option<String>,
    pub dataset: Option<String>,
    pub table: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        let full_sql = sql.into();
        self.sql = Some(if full_sql.chars().count() > SQL_PREVIEW_CHARS {
            let preview: String = full_sql.chars().take(SQL_PREVIEW_CHARS).collect();
            format!("{}...", preview)
        } else {
            full_sql
        });
        self
    }

    pub fn with_operation(mut self, op: impl Into<String>) -> Self {
        self.operation = Some(op.into());
        self
    }

    pub fn with_dataset(mut self, project: impl Into<String>, dataset: impl Into<String>) -> Self {
        let project = project.into();
        let dataset = dataset.into();
        self.resource = Some(format!("{}.{}", project, dataset));
        self.project = Some(project);
        self.dataset = Some(dataset);
        self
    }

    pub fn with_reference(mut self, reference: &TableReference) -> Self {
        self.project = Some(reference.project.clone());
        self.dataset = Some(reference.dataset.clone());
        self.table = Some(reference.table.clone());
        self.resource = Some(reference.fqn());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_query_location() {
        let loc = extract_query_location("Unrecognized name: amount at [3:15]").unwrap();
        assert_eq!(loc.line, Some(3));
        assert_eq!(loc.column, Some(15));
        assert!(extract_query_location("no position here").is_none());
    }

    #[test]
    fn test_extract_required_permission() {
        let msg = "Access Denied: Table p:d.v: Permission bigquery.tables.update denied";
        assert_eq!(extract_required_permission(msg), Some("bigquery.tables.update".to_string()));
        assert!(extract_required_permission("denied for unknown reason").is_none());
    }

    #[test]
    fn test_extract_quota_type() {
        assert_eq!(
            extract_quota_type("Exceeded rate limits: too many table update operations"),
            Some("table metadata updates".to_string())
        );
        assert_eq!(
            extract_quota_type("Too many concurrent queries"),
            Some("concurrent queries".to_string())
        );
        assert!(extract_quota_type("something else").is_none());
    }

    #[test]
    fn test_sql_preview_truncated_on_char_boundary() {
        let sql = "SELECT 'é' ".repeat(100);
        let ctx = ErrorContext::new().with_sql(sql);
        let preview = ctx.sql.unwrap();
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), SQL_PREVIEW_CHARS + 3);
    }

    #[test]
    fn test_context_with_reference() {
        let reference = TableReference::new("proj", "sales", "orders_v");
        let ctx = ErrorContext::new()
            .with_operation("get_definition")
            .with_reference(&reference);
        assert_eq!(ctx.resource, Some("proj.sales.orders_v".to_string()));
        assert_eq!(ctx.table, Some("orders_v".to_string()));
    }

    #[test]
    fn test_not_found_table_from_message() {
        let err = parse_not_found_error("Not found: Table my-project:sales.orders", &ErrorContext::new());
        match err {
            BigQueryError::TableNotFound { project, dataset, table } => {
                assert_eq!(project, "my-project");
                assert_eq!(dataset, "sales");
                assert_eq!(table, "orders");
            }
            other => panic!("Expected TableNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_not_found_dataset_from_message() {
        let err = parse_not_found_error("Not found: Dataset my-project:sales", &ErrorContext::new());
        assert!(matches!(err, BigQueryError::DatasetNotFound { .. }));
    }

    #[test]
    fn test_not_found_falls_back_to_context() {
        let ctx = ErrorContext::new().with_reference(&TableReference::new("p", "d", "t"));
        let err = parse_not_found_error("Resource missing", &ctx);
        assert_eq!(err.to_string(), "Table not found: p.d.t");

        let err = parse_not_found_error("Resource missing", &ErrorContext::new());
        assert_eq!(err.error_code(), "UNKNOWN");
    }
}
