//! Logging setup and per-request query records

use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the default `info` level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Outcome of one `/analyze` request.
#[derive(Debug, Clone, Serialize)]
pub struct QueryLogEntry {
    pub request_id: String,
    pub question: String,
    pub success: bool,
    pub sql: Option<String>,
    pub rows_returned: Option<usize>,
    pub execution_time_ms: u64,
    pub error_message: Option<String>,
}

impl QueryLogEntry {
    pub fn emit(&self) {
        let record = serde_json::to_string(self).unwrap_or_default();
        if self.success {
            tracing::info!(request_id = %self.request_id, "query completed: {}", record);
        } else {
            tracing::warn!(request_id = %self.request_id, "query failed: {}", record);
        }
    }
}
