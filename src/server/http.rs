//! HTTP API for the chat UI.
//!
//! The two-step confirmation the UI presents is structural here: generation
//! and execution are separate endpoints, and execution re-validates the
//! submitted statement from scratch. Executing is never implicit after
//! generating.

use crate::analyzer::normalize_question;
use crate::auth::{AuthConfig, auth_middleware};
use crate::error::{AgentError, AgentResult};
use crate::guard;
use crate::models::{ColumnMetadata, GeneratedQuery, MAX_ROW_LIMIT, QueryRequest};
use crate::server::PipelineContext;
use crate::server::render::{self, OutputFormat};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

/// HTTP server for the assistant API.
pub struct HttpServer {
    ctx: Arc<PipelineContext>,
    auth: Arc<AuthConfig>,
    host: String,
    port: u16,
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    question: String,
}

#[derive(Debug, Deserialize)]
struct ExecuteRequest {
    sql: String,
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    timeout_secs: Option<u32>,
    #[serde(default)]
    format: OutputFormat,
}

#[derive(Debug, Serialize)]
struct ExecuteResponse {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    columns: Vec<ColumnMetadata>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    rows: Vec<serde_json::Map<String, JsonValue>>,
    /// Pre-formatted output when format is table or markdown
    #[serde(skip_serializing_if = "Option::is_none")]
    formatted: Option<String>,
    truncated: bool,
    row_count: usize,
    execution_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<String>,
}

#[derive(Debug, Serialize)]
struct SchemaEntry {
    table_name: String,
    schema_name: String,
    comment: String,
    column_count: usize,
}

/// Error wrapper so handlers can use `?` and still produce the stage-tagged
/// JSON error body the UI renders.
struct ApiError(AgentError);

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = match &err {
            AgentError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            AgentError::NoRelevantSchema => StatusCode::UNPROCESSABLE_ENTITY,
            AgentError::UnsafeSql { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AgentError::UnparsableResponse { .. } => StatusCode::BAD_GATEWAY,
            AgentError::ModelUnavailable { .. } => StatusCode::BAD_GATEWAY,
            AgentError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            AgentError::Execution { .. } => StatusCode::BAD_REQUEST,
            AgentError::Connection { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AgentError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": err.to_string(),
            "stage": err.stage().map(|s| s.name()),
        });

        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

impl HttpServer {
    pub fn new(
        ctx: Arc<PipelineContext>,
        auth: AuthConfig,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            ctx,
            auth: Arc::new(auth),
            host: host.into(),
            port,
        }
    }

    /// Get the bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn router(&self) -> Router {
        let api = Router::new()
            .route("/api/generate", post(generate))
            .route("/api/execute", post(execute))
            .route("/api/schema", get(schema))
            .route("/api/schema/refresh", post(refresh_schema))
            .with_state(self.ctx.clone());

        let api = if self.auth.is_enabled() {
            info!(tokens = self.auth.token_count(), "API authentication enabled");
            api.layer(middleware::from_fn_with_state(
                self.auth.clone(),
                auth_middleware,
            ))
        } else {
            api
        };

        // Liveness stays unauthenticated
        api.route("/healthz", get(health))
    }

    /// Serve until SIGINT/SIGTERM, then close the pipeline context.
    pub async fn run(&self) -> AgentResult<()> {
        let bind_addr = self.bind_addr();
        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            AgentError::connection(
                format!("Failed to bind to {}: {}", bind_addr, e),
                "Check that the port is available",
            )
        })?;

        info!(addr = %bind_addr, "HTTP API ready");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(wait_for_signal())
            .await
            .map_err(|e| AgentError::internal(format!("HTTP server error: {}", e)))?;

        self.ctx.close().await;
        info!("Server shutdown complete");
        Ok(())
    }
}

async fn health() -> Json<JsonValue> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Step one of the two-step flow: question in, validated SQL out.
async fn generate(
    State(ctx): State<Arc<PipelineContext>>,
    Json(request): Json<GenerateRequest>,
) -> ApiResult<GeneratedQuery> {
    let question = request.question.trim();
    if question.is_empty() {
        return Err(AgentError::invalid_input("Question must not be empty").into());
    }

    let request_id = uuid::Uuid::new_v4();
    info!(%request_id, question_len = question.len(), "Generate request");

    let snapshot = ctx.snapshot.read().await;

    let key = normalize_question(question);
    let mechanical = match ctx.cache.get(&key) {
        Some(cached) => cached,
        None => {
            let analyzed = ctx.analyzer.analyze(question, &snapshot)?;
            ctx.cache.insert(key, analyzed.clone());
            analyzed
        }
    };

    let generated = ctx
        .orchestrator
        .generate_with_context(question, &snapshot, mechanical)
        .await?;

    Ok(Json(generated))
}

/// Step two: execute a statement the user confirmed. The statement is
/// re-validated from scratch; nothing from the generate step is trusted.
async fn execute(
    State(ctx): State<Arc<PipelineContext>>,
    Json(request): Json<ExecuteRequest>,
) -> ApiResult<ExecuteResponse> {
    guard::validate_read_only(&request.sql)?;

    // No fabricated tables: everything referenced must be known to the
    // Metadata Store.
    {
        let snapshot = ctx.snapshot.read().await;
        for table in guard::referenced_tables(&request.sql)? {
            let known = snapshot
                .tables
                .iter()
                .any(|t| t.table_name.eq_ignore_ascii_case(&table));
            if !known {
                return Err(AgentError::unsafe_sql(
                    &request.sql,
                    format!("references table '{}' not present in the metadata store", table),
                )
                .into());
            }
        }
    }

    let warning = request.limit.and_then(|requested| {
        (requested > MAX_ROW_LIMIT).then(|| {
            format!(
                "Requested limit {} exceeds maximum allowed ({}). Results capped to {} rows.",
                requested, MAX_ROW_LIMIT, MAX_ROW_LIMIT
            )
        })
    });

    let query = QueryRequest {
        sql: request.sql,
        limit: request.limit,
        timeout_secs: request.timeout_secs,
    };

    let result = ctx.executor.execute_query(&ctx.pool, &query).await?;

    info!(
        row_count = result.row_count(),
        truncated = result.truncated,
        execution_time_ms = result.execution_time_ms,
        "Query executed"
    );

    let row_count = result.row_count();
    let response = match request.format {
        OutputFormat::Json => ExecuteResponse {
            columns: result.columns.clone(),
            rows: result.rows.clone(),
            formatted: None,
            truncated: result.truncated,
            row_count,
            execution_time_ms: result.execution_time_ms,
            warning,
        },
        OutputFormat::Table => ExecuteResponse {
            columns: Vec::new(),
            rows: Vec::new(),
            formatted: Some(render::format_as_table(&result)),
            truncated: result.truncated,
            row_count,
            execution_time_ms: result.execution_time_ms,
            warning,
        },
        OutputFormat::Markdown => ExecuteResponse {
            columns: Vec::new(),
            rows: Vec::new(),
            formatted: Some(render::format_as_markdown(&result)),
            truncated: result.truncated,
            row_count,
            execution_time_ms: result.execution_time_ms,
            warning,
        },
    };

    Ok(Json(response))
}

/// Table catalog for the UI sidebar.
async fn schema(State(ctx): State<Arc<PipelineContext>>) -> ApiResult<Vec<SchemaEntry>> {
    let snapshot = ctx.snapshot.read().await;
    let entries = snapshot
        .tables
        .iter()
        .map(|t| SchemaEntry {
            table_name: t.table_name.clone(),
            schema_name: t.schema_name.clone(),
            comment: t.comment.clone(),
            column_count: snapshot.columns_of(&t.table_name).len(),
        })
        .collect();
    Ok(Json(entries))
}

/// Re-read the Metadata Store (after administrators edit comments).
async fn refresh_schema(State(ctx): State<Arc<PipelineContext>>) -> ApiResult<JsonValue> {
    let count = ctx.refresh_snapshot().await?;
    info!(tables = count, "Metadata snapshot refreshed");
    Ok(Json(serde_json::json!({ "tables": count })))
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_signal() {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
