//! Error types for the NL-to-SQL assistant.
//!
//! This module defines all error types using `thiserror` for ergonomic error
//! handling. Each pipeline stage fails closed: a malformed or unsafe artifact
//! is never passed to the next stage, and every failure names the stage that
//! produced it so the UI can surface an actionable message.

use thiserror::Error;

/// Pipeline stage identifier, used to attribute failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// Mechanical schema analysis (no model involved)
    Analysis,
    /// Stage 1: model-assisted schema selection
    SchemaSelection,
    /// Stage 2: SQL generation
    SqlGeneration,
    /// Stage 3: SQL validation and correction
    Validation,
    /// Query execution against the database
    Execution,
}

impl StageKind {
    /// Stable name used in logs and HTTP error bodies.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::SchemaSelection => "schema_selection",
            Self::SqlGeneration => "sql_generation",
            Self::Validation => "validation",
            Self::Execution => "execution",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("No relevant schema found for the question")]
    NoRelevantSchema,

    #[error("Model unavailable in {stage}: {message}")]
    ModelUnavailable { stage: StageKind, message: String },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Unparsable model response in {stage}: {detail}")]
    UnparsableResponse { stage: StageKind, detail: String },

    #[error("Unsafe SQL rejected: {reason}")]
    UnsafeSql { statement: String, reason: String },

    #[error("Execution failed: {message}")]
    Execution {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
    },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AgentError {
    /// Create a model unavailable error for a stage.
    pub fn model_unavailable(stage: StageKind, message: impl Into<String>) -> Self {
        Self::ModelUnavailable {
            stage,
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create an unparsable response error for a stage.
    pub fn unparsable(stage: StageKind, detail: impl Into<String>) -> Self {
        Self::UnparsableResponse {
            stage,
            detail: detail.into(),
        }
    }

    /// Create an unsafe SQL error.
    pub fn unsafe_sql(statement: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsafeSql {
            statement: statement.into(),
            reason: reason.into(),
        }
    }

    /// Create an execution error with optional SQL state.
    pub fn execution(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Execution {
            message: message.into(),
            sql_state,
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// The stage this error is attributed to, when one applies.
    pub fn stage(&self) -> Option<StageKind> {
        match self {
            Self::NoRelevantSchema => Some(StageKind::Analysis),
            Self::ModelUnavailable { stage, .. } => Some(*stage),
            Self::UnparsableResponse { stage, .. } => Some(*stage),
            Self::UnsafeSql { .. } => Some(StageKind::Validation),
            Self::Execution { .. } => Some(StageKind::Execution),
            _ => None,
        }
    }

    /// Check if this error is retryable. Only transient external failures
    /// qualify; a single bounded retry is policy, never more.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ModelUnavailable { .. } | Self::Timeout { .. } | Self::Connection { .. }
        )
    }
}

/// Convert sqlx errors to AgentError.
impl From<sqlx::Error> for AgentError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => AgentError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                AgentError::execution(db_err.message(), code)
            }
            sqlx::Error::RowNotFound => AgentError::execution("No rows returned", None),
            sqlx::Error::PoolTimedOut => AgentError::timeout("connection pool acquire", 30),
            sqlx::Error::PoolClosed => {
                AgentError::connection("Connection pool is closed", "Reconnect to the database")
            }
            sqlx::Error::Io(io_err) => AgentError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => AgentError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => AgentError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                AgentError::execution(format!("Column not found: {}", col), None)
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => AgentError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                AgentError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => AgentError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => AgentError::internal("Database worker crashed"),
            _ => AgentError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for pipeline operations.
pub type AgentResult<T> = Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AgentError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_error_retryable() {
        assert!(AgentError::timeout("llm call", 30).is_retryable());
        assert!(AgentError::model_unavailable(StageKind::SqlGeneration, "503").is_retryable());
        assert!(!AgentError::NoRelevantSchema.is_retryable());
        assert!(!AgentError::unsafe_sql("DROP TABLE x", "not read-only").is_retryable());
    }

    #[test]
    fn test_stage_attribution() {
        assert_eq!(
            AgentError::NoRelevantSchema.stage(),
            Some(StageKind::Analysis)
        );
        assert_eq!(
            AgentError::unparsable(StageKind::SchemaSelection, "no list").stage(),
            Some(StageKind::SchemaSelection)
        );
        assert_eq!(
            AgentError::unsafe_sql("x", "y").stage(),
            Some(StageKind::Validation)
        );
        assert!(AgentError::invalid_input("bad").stage().is_none());
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(StageKind::SchemaSelection.name(), "schema_selection");
        assert_eq!(StageKind::SqlGeneration.name(), "sql_generation");
        assert_eq!(StageKind::Validation.name(), "validation");
    }

    #[test]
    fn test_unparsable_names_stage_in_message() {
        let err = AgentError::unparsable(StageKind::Validation, "missing SQL block");
        assert!(err.to_string().contains("validation"));
    }
}
