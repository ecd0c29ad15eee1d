//! Query execution engine.
//!
//! Executes validated read-only statements with:
//! - Row limits (enforced via streaming - only fetches needed rows)
//! - Query timeouts
//! - JSON row conversion
//!
//! The executor never sees unvalidated SQL: callers must pass every
//! statement through the guard first.

use crate::db::types::{row_column_metadata, row_to_json_map};
use crate::error::{AgentError, AgentResult};
use crate::models::{
    DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_ROW_LIMIT, MAX_ROW_LIMIT, QueryRequest, QueryResult,
};
use futures_util::StreamExt;
use sqlx::PgPool;
use sqlx::postgres::PgRow;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Query executor that handles read-only statement execution.
pub struct QueryExecutor {
    default_timeout: Duration,
    default_limit: u32,
}

impl QueryExecutor {
    /// Create a new query executor with default settings.
    pub fn new() -> Self {
        Self {
            default_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS as u64),
            default_limit: DEFAULT_ROW_LIMIT,
        }
    }

    /// Create a new query executor with custom settings.
    pub fn with_defaults(timeout_secs: u64, row_limit: u32) -> Self {
        Self {
            default_timeout: Duration::from_secs(timeout_secs),
            default_limit: row_limit.min(MAX_ROW_LIMIT),
        }
    }

    /// Execute a validated SELECT and return results.
    pub async fn execute_query(
        &self,
        pool: &PgPool,
        request: &QueryRequest,
    ) -> AgentResult<QueryResult> {
        let start = Instant::now();
        // Clamp limit to [1, MAX_ROW_LIMIT] to avoid edge case where limit=0
        // marks all results as "truncated"
        let row_limit = request
            .limit
            .map(|l| l.clamp(1, MAX_ROW_LIMIT))
            .unwrap_or(self.default_limit);
        let query_timeout = request
            .timeout_secs
            .map(|t| Duration::from_secs(t as u64))
            .unwrap_or(self.default_timeout);

        debug!(
            sql = %request.sql,
            limit = row_limit,
            timeout_secs = query_timeout.as_secs(),
            "Executing query"
        );

        let rows = fetch_rows(pool, &request.sql, row_limit, query_timeout).await?;
        process_rows(rows, row_limit, start)
    }
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream rows from the database, fetching at most `limit + 1` so truncation
/// can be reported without pulling the full result set.
async fn fetch_rows(
    pool: &PgPool,
    sql: &str,
    limit: u32,
    query_timeout: Duration,
) -> AgentResult<Vec<PgRow>> {
    let fetch = async {
        let mut stream = sqlx::query(sql).fetch(pool);
        let mut rows: Vec<PgRow> = Vec::new();
        while let Some(row) = stream.next().await {
            rows.push(row.map_err(AgentError::from)?);
            if rows.len() > limit as usize {
                break;
            }
        }
        Ok::<_, AgentError>(rows)
    };

    match timeout(query_timeout, fetch).await {
        Ok(result) => result,
        Err(_) => Err(AgentError::timeout(
            "query execution",
            query_timeout.as_secs(),
        )),
    }
}

/// Convert fetched rows into a QueryResult.
fn process_rows(rows: Vec<PgRow>, row_limit: u32, start: Instant) -> AgentResult<QueryResult> {
    let execution_time_ms = start.elapsed().as_millis() as u64;

    if rows.is_empty() {
        return Ok(QueryResult::empty(execution_time_ms));
    }

    let columns = row_column_metadata(&rows[0]);
    let total_rows = rows.len();
    let truncated = total_rows > row_limit as usize;
    let rows_to_take = (row_limit as usize).min(total_rows);

    let json_rows: Vec<serde_json::Map<String, serde_json::Value>> = rows
        .iter()
        .take(rows_to_take)
        .map(row_to_json_map)
        .collect();

    if truncated {
        warn!(
            total_rows = total_rows,
            limit = row_limit,
            "Query result truncated"
        );
    }

    Ok(QueryResult {
        columns,
        rows: json_rows,
        truncated,
        execution_time_ms,
    })
}
