use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use nl_query::config::DEFAULT_SCHEMA_PATH;
use nl_query::pipeline::BuildOutcome;
use nl_query::session::{HttpAnalyzeClient, QuerySession, QueryState};
use nl_query::{Intent, QueryPipeline, SchemaContract};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "nlq")]
#[command(about = "Natural-language queries over a tabular dataset")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate an intent JSON file and print the SQL it compiles to
    Compile {
        /// Path to the intent JSON
        intent: PathBuf,

        /// Path to the schema contract JSON
        #[arg(short, long, default_value = DEFAULT_SCHEMA_PATH)]
        schema: PathBuf,
    },
    /// Ask a question through a running server
    Ask {
        /// The question in natural language
        question: String,

        /// Base URL of the analyze server
        #[arg(long, default_value = "http://localhost:8080")]
        server: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    nl_query::observability::init_tracing();

    match Args::parse().command {
        Command::Compile { intent, schema } => compile(&intent, &schema),
        Command::Ask { question, server } => ask(&question, &server).await,
    }
}

fn compile(intent_path: &Path, schema_path: &Path) -> Result<()> {
    let schema = Arc::new(SchemaContract::load(schema_path)?);
    let intent: Intent = serde_json::from_str(&std::fs::read_to_string(intent_path)?)?;

    let outcome = BuildOutcome::from(QueryPipeline::new(schema).build_query(&intent));
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if !outcome.success {
        bail!("intent could not be compiled");
    }
    Ok(())
}

async fn ask(question: &str, server: &str) -> Result<()> {
    info!("Asking {}: {}", server, question);
    let session = QuerySession::new(HttpAnalyzeClient::new(server));

    match session.submit(question).await {
        QueryState::Complete { result, elapsed } => {
            println!("SQL:  {}", result.sql);
            println!("View: {} ({})", result.view(), result.view_reason());
            println!("{}", serde_json::to_string_pretty(&result.data)?);
            println!("{} row(s) in {} ms", result.metadata.row_count, elapsed.as_millis());
            Ok(())
        }
        QueryState::Failed { category, message } => {
            eprintln!("{}", message);
            eprintln!("{}", category.solution());
            bail!("query failed")
        }
        other => bail!("query ended in unexpected state {:?}", other),
    }
}
