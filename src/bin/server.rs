//! HTTP Server for natural-language queries
//! Serves `POST /analyze` backed by Gemini intent generation and a read-only SQLite store

use anyhow::{Context, Result};
use clap::Parser;
use nl_query::analyze::AnalyzeService;
use nl_query::config::AppConfig;
use nl_query::executor::SqliteExecutor;
use nl_query::llm::GeminiClient;
use nl_query::{QueryPipeline, SchemaContract};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "server")]
#[command(about = "Answer natural-language questions about a tabular dataset over HTTP")]
struct Args {
    /// Address to listen on (or set BIND_ADDR)
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Path to the schema contract JSON (or set SCHEMA_CONTRACT_PATH)
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Path to the SQLite database (or set DATABASE_PATH)
    #[arg(long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    nl_query::observability::init_tracing();

    let args = Args::parse();
    let mut config = AppConfig::from_env()?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(schema) = args.schema {
        config.schema_path = schema;
    }
    if let Some(database) = args.database {
        config.database_path = database;
    }

    let schema = Arc::new(SchemaContract::load(&config.schema_path)?);
    let executor = SqliteExecutor::open(&config.database_path)
        .with_context(|| format!("opening {}", config.database_path.display()))?;

    if config.gemini_api_key.is_some() {
        info!("Gemini API key found, using model {}", config.gemini_model);
    } else {
        warn!("GEMINI_API_KEY not set; /analyze requests will fail until it is configured");
    }
    let generator = GeminiClient::new(
        &schema,
        config.gemini_api_key.clone(),
        config.gemini_model.clone(),
        config.gemini_base_url.clone(),
    );

    let service = Arc::new(AnalyzeService::new(
        QueryPipeline::new(Arc::clone(&schema)),
        Arc::new(generator),
        Arc::new(executor),
    ));

    let listener = TcpListener::bind(config.bind_addr).await?;
    nl_query::http::serve(listener, service).await?;
    Ok(())
}
