//! Screening and execution shared by the direct and natural-language endpoints

use std::sync::Arc;

use staffql_duck::{DuckEngine, EngineError, QueryResult};
use staffql_sql::{apply_limit, forbidden_keyword, LimitPolicy};
use thiserror::Error;
use tracing::{debug, warn};

use crate::llm::TranslateError;

/// Detail returned when a caller's SQL hits the keyword denylist
pub const DISALLOWED_SQL: &str = "disallowed SQL request";

/// Detail returned when translated SQL hits the keyword denylist
pub const DISALLOWED_GENERATED_SQL: &str = "disallowed generated SQL request";

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("{message}")]
    Rejected {
        message: &'static str,
        keyword: &'static str,
    },

    #[error(transparent)]
    Translate(#[from] TranslateError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Query task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl QueryError {
    pub fn is_rejection(&self) -> bool {
        matches!(self, QueryError::Rejected { .. })
    }
}

/// Reject unsafe SQL, then append the row limit if the statement has none
///
/// `message` becomes the error text on rejection.
pub fn screen(
    sql: &str,
    limit: Option<i64>,
    policy: LimitPolicy,
    message: &'static str,
) -> Result<String, QueryError> {
    if let Some(keyword) = forbidden_keyword(sql) {
        warn!(keyword, sql, "Rejected SQL");
        return Err(QueryError::Rejected { message, keyword });
    }
    Ok(apply_limit(sql, limit, policy))
}

/// Execute `sql` on a blocking thread
pub async fn run(engine: Arc<DuckEngine>, sql: String) -> Result<QueryResult, QueryError> {
    debug!(sql = %sql, "Executing SQL");
    let result = tokio::task::spawn_blocking(move || engine.execute(&sql)).await??;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use staffql_duck::{EngineOptions, Scalar};

    fn engine() -> Arc<DuckEngine> {
        let engine = DuckEngine::from_batch(
            "CREATE TABLE data (id INTEGER, salact DOUBLE);
             INSERT INTO data SELECT range, range * 1000.0 FROM range(250);",
            &EngineOptions::default(),
        )
        .unwrap();
        Arc::new(engine)
    }

    #[test]
    fn test_screen_rejects_with_message() {
        let err = screen("drop table data", Some(100), LimitPolicy::WhenPresent, DISALLOWED_SQL).unwrap_err();
        assert!(err.is_rejection());
        assert_eq!(err.to_string(), "disallowed SQL request");
        assert!(matches!(err, QueryError::Rejected { keyword: "DROP", .. }));
    }

    #[test]
    fn test_screen_appends_limit() {
        let sql = screen("SELECT * FROM data", Some(7), LimitPolicy::WhenPresent, DISALLOWED_SQL).unwrap();
        assert_eq!(sql, "SELECT * FROM data LIMIT 7");
    }

    #[tokio::test]
    async fn test_run_applies_default_limit() {
        let sql = screen("SELECT * FROM data", Some(100), LimitPolicy::WhenPresent, DISALLOWED_SQL).unwrap();
        let result = run(engine(), sql).await.unwrap();
        assert_eq!(result.row_count, 100);
    }

    #[tokio::test]
    async fn test_run_without_limit_returns_everything() {
        let sql = screen("SELECT * FROM data", None, LimitPolicy::WhenPresent, DISALLOWED_SQL).unwrap();
        let result = run(engine(), sql).await.unwrap();
        assert_eq!(result.row_count, 250);
    }

    #[tokio::test]
    async fn test_run_surfaces_engine_error() {
        let err = run(engine(), "SELEC 1".to_string()).await.unwrap_err();
        assert!(matches!(err, QueryError::Engine(_)));
        assert!(!err.is_rejection());
    }

    #[tokio::test]
    async fn test_existing_limit_left_alone() {
        let sql = screen("SELECT salact FROM data ORDER BY id LIMIT 2", Some(100), LimitPolicy::WhenPresent, DISALLOWED_SQL)
            .unwrap();
        let result = run(engine(), sql).await.unwrap();
        assert_eq!(result.row_count, 2);
        assert_eq!(result.rows[1].get("salact"), Some(&Scalar::Float(1000.0)));
    }
}
