//! HTTP surface and per-process pipeline context.

pub mod http;
pub mod render;

pub use http::HttpServer;

use crate::analyzer::{AnalysisCache, SchemaAnalyzer};
use crate::config::Config;
use crate::db::metadata::{MetadataSnapshot, MetadataStore};
use crate::db::QueryExecutor;
use crate::error::AgentResult;
use crate::llm::OpenAiClient;
use crate::pipeline::Orchestrator;
use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::info;

/// Everything one pipeline run needs, constructed once per process and
/// passed explicitly instead of living in globals. Teardown closes the pool.
pub struct PipelineContext {
    pub pool: PgPool,
    pub store: MetadataStore,
    pub snapshot: RwLock<MetadataSnapshot>,
    pub analyzer: SchemaAnalyzer,
    pub cache: AnalysisCache,
    pub orchestrator: Orchestrator<OpenAiClient>,
    pub executor: QueryExecutor,
    pub default_row_limit: u32,
}

impl PipelineContext {
    /// Connect, load the metadata snapshot, and assemble the context.
    pub async fn initialize(config: &Config) -> AgentResult<Self> {
        let pool = crate::db::pool::connect(&config.database_url, &config.pool_options()).await?;

        let store = MetadataStore::new(config.db_schema.clone())?;
        let snapshot = store.load(&pool).await?;

        let analyzer = SchemaAnalyzer::new(config.analyzer_budget());
        let model = OpenAiClient::new(config.llm_config())?;
        let orchestrator = Orchestrator::new(model, analyzer.clone());

        Ok(Self {
            pool,
            store,
            snapshot: RwLock::new(snapshot),
            analyzer,
            cache: AnalysisCache::new(config.cache_capacity),
            orchestrator,
            executor: QueryExecutor::with_defaults(config.query_timeout, config.row_limit),
            default_row_limit: config.row_limit,
        })
    }

    /// Re-read the Metadata Store, replacing the shared snapshot.
    pub async fn refresh_snapshot(&self) -> AgentResult<usize> {
        let fresh = self.store.load(&self.pool).await?;
        let count = fresh.tables.len();
        *self.snapshot.write().await = fresh;
        Ok(count)
    }

    /// Explicit teardown on shutdown.
    pub async fn close(&self) {
        info!("Closing database connections");
        self.pool.close().await;
    }
}
