//! NL-to-SQL assistant server - main entry point.

use clap::Parser;
use nl2sql_server::auth::AuthConfig;
use nl2sql_server::config::Config;
use nl2sql_server::server::{HttpServer, PipelineContext};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();

    init_tracing(&config);

    if config.llm_api_key.is_empty() {
        warn!("No LLM API key configured; model calls will be rejected by the service");
    }

    info!(
        schema = %config.db_schema,
        model = %config.llm_model,
        "Starting NL-to-SQL assistant v{}",
        env!("CARGO_PKG_VERSION")
    );

    let ctx = match PipelineContext::initialize(&config).await {
        Ok(ctx) => Arc::new(ctx),
        Err(e) => {
            error!(error = %e, "Failed to initialize pipeline context");
            return Err(e.into());
        }
    };

    let auth = AuthConfig::from_tokens(config.auth_tokens.clone())?;

    let server = HttpServer::new(ctx, auth, &config.http_host, config.http_port);
    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    Ok(())
}
