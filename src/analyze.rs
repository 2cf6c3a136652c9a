//! Analyze service
//!
//! Question in, rendered-ready answer out: generate an intent, build the
//! query, execute it and pick a view. Independent of the HTTP transport.

use crate::error::QueryError;
use crate::executor::QueryExecutor;
use crate::llm::IntentGenerator;
use crate::observability::QueryLogEntry;
use crate::pipeline::QueryPipeline;
use crate::view::{explain_view, select_view};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Body of `POST /analyze`.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(rename = "NLInput")]
    pub nl_input: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzeResponse {
    pub status: u16,
    pub body: Value,
}

impl AnalyzeResponse {
    fn failure(status: u16, error: &QueryError, intent: Option<Value>) -> Self {
        let mut body = json!({ "success": false, "error": error.to_string() });
        if let Some(intent) = intent {
            body["intent"] = intent;
        }
        Self { status, body }
    }
}

#[derive(Clone)]
pub struct AnalyzeService {
    pipeline: QueryPipeline,
    generator: Arc<dyn IntentGenerator>,
    executor: Arc<dyn QueryExecutor>,
}

impl AnalyzeService {
    pub fn new(
        pipeline: QueryPipeline,
        generator: Arc<dyn IntentGenerator>,
        executor: Arc<dyn QueryExecutor>,
    ) -> Self {
        Self { pipeline, generator, executor }
    }

    pub async fn analyze(&self, question: &str) -> AnalyzeResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        let started = Instant::now();
        info!(request_id = %request_id, "Analyzing: {}", question);

        let response = self.run(question).await;

        let success = response.status == 200;
        QueryLogEntry {
            request_id,
            question: question.to_string(),
            success,
            sql: response.body.get("sql").and_then(Value::as_str).map(String::from),
            rows_returned: response
                .body
                .pointer("/metadata/rowCount")
                .and_then(Value::as_u64)
                .map(|n| n as usize),
            execution_time_ms: started.elapsed().as_millis() as u64,
            error_message: response.body.get("error").and_then(Value::as_str).map(String::from),
        }
        .emit();

        response
    }

    async fn run(&self, question: &str) -> AnalyzeResponse {
        let intent = match self.generator.generate(question).await {
            Ok(intent) => intent,
            Err(e) => return AnalyzeResponse::failure(500, &e, None),
        };
        let intent_json = serde_json::to_value(&intent).unwrap_or(Value::Null);

        let compiled = match self.pipeline.build_query(&intent) {
            Ok(compiled) => compiled,
            Err(e) if e.is_client_error() => return AnalyzeResponse::failure(400, &e, Some(intent_json)),
            Err(e) => return AnalyzeResponse::failure(500, &e, None),
        };

        let executor = Arc::clone(&self.executor);
        let query = compiled.clone();
        let executed = tokio::task::spawn_blocking(move || executor.execute(&query))
            .await
            .unwrap_or_else(|e| Err(QueryError::Execution(format!("Query task failed: {}", e))));
        let result = match executed {
            Ok(result) => result,
            Err(e) => return AnalyzeResponse::failure(500, &e, None),
        };

        let view = select_view(&intent, &result.rows);
        let view_reason = explain_view(&intent, &result.rows);

        AnalyzeResponse {
            status: 200,
            body: json!({
                "success": true,
                "intent": intent_json,
                "sql": compiled.sql,
                "params": compiled.params,
                "data": result.rows,
                "metadata": {
                    "rowCount": result.row_count,
                    "view": view,
                    "viewReason": view_reason,
                },
            }),
        }
    }
}
