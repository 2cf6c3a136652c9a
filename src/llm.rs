//! Intent generation
//!
//! Turns a natural-language question into an [`Intent`] with one call to a
//! hosted language model. The output is untrusted: it must go through the
//! validator before it is compiled.

use crate::error::{QueryError, Result};
use crate::intent::{AggregationSpec, FieldSpec, FilterSpec, Intent, OrderBySpec};
use crate::schema::SchemaContract;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info};

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[async_trait]
pub trait IntentGenerator: Send + Sync {
    async fn generate(&self, question: &str) -> Result<Intent>;
}

const INTENT_SHAPE: &str = r#"{
  "table": "<table name>",
  "fields": [{"column": "<column or *>", "alias": "<optional identifier>"}],
  "filters": [{"column": "<column>", "operator": "= | != | > | >= | < | <= | LIKE | IN | BETWEEN | IS NULL | IS NOT NULL", "value": "<scalar, or array for IN / BETWEEN>", "logicalOperator": "AND | OR (joins this filter to the next)"}],
  "aggregations": [{"function": "COUNT | COUNT_DISTINCT | SUM | AVG | MIN | MAX", "column": "<column, or * for COUNT>", "alias": "<optional identifier>"}],
  "groupBy": ["<column>"],
  "orderBy": [{"column": "<column>", "direction": "ASC | DESC"}],
  "limit": "<non-negative integer>",
  "offset": "<non-negative integer>",
  "distinct": "<boolean>"
}"#;

/// System instruction sent with every question.
pub fn build_system_prompt(schema: &SchemaContract) -> String {
    let tables = serde_json::to_string_pretty(&schema.tables_json()).unwrap_or_default();
    format!(
        r#"You are a Senior Data Engineer specializing in translating natural language questions into structured data query intents.

### CONTEXT
We are working with a SQLite database. You must generate a JSON intent object that will later be translated into safe, parameterized SQL.

### DATABASE SCHEMA
Available tables and columns:
{tables}

### TARGET SCHEMA (INTENT SCHEMA)
Your output MUST be a single JSON object of this shape. Every key except "table" is optional:
{INTENT_SHAPE}

### RULES
1. ONLY output valid JSON. No explanations, no markdown blocks, no SQL.
2. Use ONLY the tables and columns defined in the DATABASE SCHEMA.
3. All queries are READ-ONLY (SELECT). NEVER attempt to generate write operations.
4. For "count", use the aggregation function "COUNT" with column "*" and provide an alias.
5. For averages or sums, use the "aggregations" field with appropriate aliases.
6. Only include a "limit" if the user explicitly asks for a specific number (e.g., "top 10", "first 5").
7. If the user asks for aggregations only (e.g., "How many students?"), omit the "fields" array entirely.

### EXAMPLE
User: "Show me students from Canada with QPA above 3.5"
Intent:
{{"table": "students", "fields": [{{"column": "name"}}, {{"column": "qpa"}}, {{"column": "country"}}], "filters": [{{"column": "country", "operator": "=", "value": "Canada"}}, {{"column": "qpa", "operator": ">", "value": 3.5}}]}}
"#
    )
}

/// Parse model output into an intent, tolerating markdown code fences.
pub fn parse_intent_response(response: &str) -> Result<Intent> {
    let cleaned = response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let value: Value = serde_json::from_str(cleaned)
        .map_err(|e| QueryError::Upstream(format!("Failed to generate intent from AI: {}", e)))?;
    serde_json::from_value(value.clone()).map_err(|e| {
        let detail = locate_intent_error(&value).unwrap_or_else(|| e.to_string());
        QueryError::Upstream(format!("Failed to generate intent from AI: {}", detail))
    })
}

/// Name the first intent entry that does not deserialize, e.g. `filters[1]: unknown variant ...`.
fn locate_intent_error(value: &Value) -> Option<String> {
    fn first_bad<T: DeserializeOwned>(value: &Value, key: &str) -> Option<String> {
        value
            .get(key)?
            .as_array()?
            .iter()
            .enumerate()
            .find_map(|(idx, item)| {
                serde_json::from_value::<T>(item.clone())
                    .err()
                    .map(|e| format!("{}[{}]: {}", key, idx, e))
            })
    }

    first_bad::<FieldSpec>(value, "fields")
        .or_else(|| first_bad::<FilterSpec>(value, "filters"))
        .or_else(|| first_bad::<AggregationSpec>(value, "aggregations"))
        .or_else(|| first_bad::<OrderBySpec>(value, "orderBy"))
        .or_else(|| {
            ["limit", "offset"].iter().find_map(|key| match value.get(*key) {
                None | Some(Value::Null) => None,
                Some(v) => serde_json::from_value::<u64>(v.clone())
                    .err()
                    .map(|e| format!("{}: {}", key, e)),
            })
        })
}

#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    system_prompt: Arc<str>,
}

impl GeminiClient {
    pub fn new(schema: &SchemaContract, api_key: Option<String>, model: String, base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            system_prompt: build_system_prompt(schema).into(),
        }
    }

    fn request_body(&self, question: &str) -> serde_json::Value {
        serde_json::json!({
            "systemInstruction": { "parts": [{ "text": &*self.system_prompt }] },
            "contents": [{ "role": "user", "parts": [{ "text": question }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "temperature": 0.1,
            },
        })
    }
}

#[async_trait]
impl IntentGenerator for GeminiClient {
    async fn generate(&self, question: &str) -> Result<Intent> {
        let api_key = self.api_key.as_deref().filter(|k| !k.is_empty()).ok_or_else(|| {
            QueryError::Upstream("GEMINI_API_KEY is not defined in environment variables.".to_string())
        })?;

        info!("Generating intent with {}", self.model);
        let response = self
            .http
            .post(format!("{}/models/{}:generateContent", self.base_url, self.model))
            .header("x-goog-api-key", api_key)
            .json(&self.request_body(question))
            .send()
            .await
            .map_err(|e| QueryError::Upstream(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!("Intent generation failed ({}): {}", status, error_text);
            return Err(QueryError::Upstream(format!("LLM API error ({}): {}", status, error_text)));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| QueryError::Upstream(format!("Failed to read LLM response: {}", e)))?;
        let text = body
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(|t| t.as_str())
            .ok_or_else(|| QueryError::Upstream("Failed to generate intent from AI: empty response".to_string()))?;

        debug!("Raw intent response: {}", text);
        parse_intent_response(text)
    }
}

/// User-facing classes of upstream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamCategory {
    Configuration,
    QuotaExceeded,
    Unavailable,
    Network,
    Generic,
}

impl UpstreamCategory {
    /// First matching rule wins.
    pub fn classify(message: &str) -> Self {
        if message.contains("GEMINI_API_KEY") || message.contains("API key") {
            UpstreamCategory::Configuration
        } else if message.contains("quota") || message.contains("limit") || message.contains("429") {
            UpstreamCategory::QuotaExceeded
        } else if message.contains("503") || message.contains("unavailable") {
            UpstreamCategory::Unavailable
        } else {
            UpstreamCategory::Generic
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            UpstreamCategory::Configuration => {
                "The AI service is not configured. Please check your API key settings."
            }
            UpstreamCategory::QuotaExceeded => {
                "The AI service has reached its usage limit for today. Please try again later or contact support."
            }
            UpstreamCategory::Unavailable => {
                "The AI service is temporarily unavailable. Please try again in a few moments."
            }
            UpstreamCategory::Network => {
                "Unable to connect to the server. Please check your connection and ensure the server is running."
            }
            UpstreamCategory::Generic => "Failed to analyze query. Please try rephrasing your question.",
        }
    }

    pub fn solution(self) -> &'static str {
        match self {
            UpstreamCategory::QuotaExceeded => {
                "The service will reset automatically. You can try again later or contact your administrator."
            }
            UpstreamCategory::Unavailable | UpstreamCategory::Network => {
                "This is usually temporary. Please wait a moment and try your query again."
            }
            UpstreamCategory::Configuration | UpstreamCategory::Generic => {
                "Try rephrasing your question or check that your database connection is active."
            }
        }
    }
}
