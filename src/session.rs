//! Client query lifecycle
//!
//! `Idle -> Identifying -> Retrieving -> Complete | Failed | Cancelled`
//!
//! One query is in flight per session. Submitting a new question cancels the
//! outstanding one through its abort token before the new call starts.

use crate::compiler::SqlParam;
use crate::intent::Intent;
use crate::llm::UpstreamCategory;
use crate::view::{explain_view, select_view, Row, ViewType};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub row_count: usize,
    #[serde(default)]
    pub view: Option<ViewType>,
    #[serde(default)]
    pub view_reason: Option<String>,
}

/// Successful `/analyze` payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnalysisResult {
    pub intent: Intent,
    pub sql: String,
    #[serde(default)]
    pub params: Vec<SqlParam>,
    pub data: Vec<Row>,
    pub metadata: ResponseMetadata,
}

impl AnalysisResult {
    /// The server's view choice, or the local rule when the server sent none.
    pub fn view(&self) -> ViewType {
        self.metadata
            .view
            .unwrap_or_else(|| select_view(&self.intent, &self.data))
    }

    pub fn view_reason(&self) -> String {
        self.metadata
            .view_reason
            .clone()
            .unwrap_or_else(|| explain_view(&self.intent, &self.data))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The server answered with `success: false`.
    #[error("{0}")]
    Server(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected response: {0}")]
    Unexpected(String),
}

#[async_trait]
pub trait AnalyzeClient: Send + Sync {
    async fn analyze(&self, question: &str) -> Result<AnalysisResult, ClientError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryState {
    Idle,
    /// Marker published as a query starts. The server identifies the intent
    /// and retrieves rows in the same `/analyze` call, so this is replaced by
    /// `Retrieving` before the call is made.
    Identifying,
    /// The `/analyze` call is in flight. Cancellation lands here.
    Retrieving,
    Complete { result: AnalysisResult, elapsed: Duration },
    Failed { category: UpstreamCategory, message: String },
    Cancelled,
}

impl QueryState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueryState::Complete { .. } | QueryState::Failed { .. } | QueryState::Cancelled
        )
    }

    fn failed(err: ClientError) -> Self {
        let (category, message) = match err {
            ClientError::Server(msg) => match UpstreamCategory::classify(&msg) {
                UpstreamCategory::Generic if !msg.is_empty() => (UpstreamCategory::Generic, msg),
                category => (category, category.message().to_string()),
            },
            ClientError::Network(_) => (UpstreamCategory::Network, UpstreamCategory::Network.message().to_string()),
            ClientError::Unexpected(_) => (
                UpstreamCategory::Generic,
                "An unexpected error occurred. Please try again or contact support if this persists.".to_string(),
            ),
        };
        QueryState::Failed { category, message }
    }
}

struct InFlight {
    generation: u64,
    token: Option<CancellationToken>,
}

pub struct QuerySession<C> {
    client: C,
    in_flight: Mutex<InFlight>,
    state: watch::Sender<QueryState>,
}

impl<C: AnalyzeClient> QuerySession<C> {
    pub fn new(client: C) -> Self {
        let (state, _) = watch::channel(QueryState::Idle);
        Self {
            client,
            in_flight: Mutex::new(InFlight { generation: 0, token: None }),
            state,
        }
    }

    pub fn state(&self) -> QueryState {
        self.state.borrow().clone()
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<QueryState> {
        self.state.subscribe()
    }

    /// Run one question to a terminal state, superseding any query in flight.
    pub async fn submit(&self, question: &str) -> QueryState {
        let (generation, token) = {
            let mut in_flight = self.lock();
            if let Some(previous) = in_flight.token.take() {
                debug!("Cancelling query {} in favour of a new one", in_flight.generation);
                previous.cancel();
            }
            in_flight.generation += 1;
            let token = CancellationToken::new();
            in_flight.token = Some(token.clone());
            (in_flight.generation, token)
        };

        let started = Instant::now();
        // One network call covers both phases.
        self.transition(generation, QueryState::Identifying);
        self.transition(generation, QueryState::Retrieving);

        let outcome = tokio::select! {
            _ = token.cancelled() => QueryState::Cancelled,
            reply = self.client.analyze(question) => match reply {
                Ok(result) => QueryState::Complete { result, elapsed: started.elapsed() },
                Err(e) => {
                    warn!("Query {} failed: {}", generation, e);
                    QueryState::failed(e)
                }
            },
        };

        if let QueryState::Complete { elapsed, .. } = &outcome {
            info!("Query {} completed in {} ms", generation, elapsed.as_millis());
        }
        self.finish(generation, outcome.clone());
        outcome
    }

    /// User stop: abort the query in flight, if any.
    pub fn cancel(&self) {
        let mut in_flight = self.lock();
        if let Some(token) = in_flight.token.take() {
            token.cancel();
            self.state.send_replace(QueryState::Cancelled);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InFlight> {
        self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publish a state only while `generation` is still the current query.
    fn transition(&self, generation: u64, state: QueryState) {
        let in_flight = self.lock();
        if in_flight.generation == generation && in_flight.token.is_some() {
            self.state.send_replace(state);
        }
    }

    fn finish(&self, generation: u64, state: QueryState) {
        let mut in_flight = self.lock();
        if in_flight.generation == generation && in_flight.token.is_some() {
            in_flight.token = None;
            self.state.send_replace(state);
        }
    }
}

/// `AnalyzeClient` over HTTP against the analyze server.
pub struct HttpAnalyzeClient {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpAnalyzeClient {
    pub fn new(server_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: format!("{}/analyze", server_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl AnalyzeClient for HttpAnalyzeClient {
    async fn analyze(&self, question: &str) -> Result<AnalysisResult, ClientError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&serde_json::json!({ "NLInput": question }))
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ClientError::Unexpected(e.to_string()))?;

        if body.get("success").and_then(|s| s.as_bool()) == Some(true) {
            serde_json::from_value(body).map_err(|e| ClientError::Unexpected(e.to_string()))
        } else {
            let error = body.get("error").and_then(|e| e.as_str()).unwrap_or_default();
            Err(ClientError::Server(error.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::Notify;

    enum Reply {
        Ok,
        Err(ClientError),
        Hang,
    }

    struct ScriptedClient {
        replies: HashMap<&'static str, Reply>,
        started: Arc<Notify>,
    }

    fn result() -> AnalysisResult {
        serde_json::from_value(serde_json::json!({
            "success": true,
            "intent": {"table": "students", "fields": [{"column": "name"}]},
            "sql": "SELECT name FROM students",
            "params": [],
            "data": [{"name": "Ada"}],
            "metadata": {"rowCount": 1, "view": "table"}
        }))
        .unwrap()
    }

    #[async_trait]
    impl AnalyzeClient for ScriptedClient {
        async fn analyze(&self, question: &str) -> Result<AnalysisResult, ClientError> {
            self.started.notify_one();
            match self.replies.get(question) {
                Some(Reply::Ok) => Ok(result()),
                Some(Reply::Err(e)) => Err(e.clone()),
                Some(Reply::Hang) | None => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(ClientError::Unexpected("hung call finished".to_string()))
                }
            }
        }
    }

    fn session(replies: Vec<(&'static str, Reply)>) -> (Arc<QuerySession<ScriptedClient>>, Arc<Notify>) {
        let started = Arc::new(Notify::new());
        let client = ScriptedClient { replies: replies.into_iter().collect(), started: Arc::clone(&started) };
        (Arc::new(QuerySession::new(client)), started)
    }

    #[test]
    fn test_view_prefers_server_metadata() {
        let mut result = result();
        result.metadata.view = Some(ViewType::Summary);
        result.metadata.view_reason = Some("Summary view selected: chosen by server".to_string());
        assert_eq!(result.view(), ViewType::Summary);
        assert_eq!(result.view_reason(), "Summary view selected: chosen by server");

        result.metadata.view = None;
        result.metadata.view_reason = None;
        assert_eq!(result.view(), ViewType::Table);
        assert_eq!(result.view_reason(), "Table view selected: Query returns 1 individual records");
    }

    #[tokio::test]
    async fn test_completes_with_elapsed_time() {
        let (session, _) = session(vec![("names", Reply::Ok)]);
        assert_eq!(session.state(), QueryState::Idle);

        let state = session.submit("names").await;
        match &state {
            QueryState::Complete { result, .. } => assert_eq!(result.metadata.row_count, 1),
            other => panic!("unexpected state: {:?}", other),
        }
        assert_eq!(session.state(), state);
    }

    #[tokio::test]
    async fn test_new_query_cancels_previous() {
        let (session, started) = session(vec![("slow", Reply::Hang), ("fast", Reply::Ok)]);

        let first = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.submit("slow").await }
        });
        started.notified().await;
        assert_eq!(session.state(), QueryState::Retrieving);

        let second = session.submit("fast").await;
        assert!(matches!(second, QueryState::Complete { .. }));
        assert_eq!(first.await.unwrap(), QueryState::Cancelled);
        // The superseded query must not overwrite the newer result.
        assert!(matches!(session.state(), QueryState::Complete { .. }));
    }

    #[tokio::test]
    async fn test_user_cancel_is_not_a_failure() {
        let (session, started) = session(vec![("slow", Reply::Hang)]);

        let pending = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.submit("slow").await }
        });
        started.notified().await;
        session.cancel();

        assert_eq!(pending.await.unwrap(), QueryState::Cancelled);
        assert_eq!(session.state(), QueryState::Cancelled);
        assert!(session.state().is_terminal());
    }

    #[tokio::test]
    async fn test_failures_are_categorised() {
        let (session, _) = session(vec![
            ("quota", Reply::Err(ClientError::Server("LLM API error (429): quota exceeded".into()))),
            ("key", Reply::Err(ClientError::Server("GEMINI_API_KEY is not defined".into()))),
            ("bad", Reply::Err(ClientError::Server("Intent validation failed: nope".into()))),
            ("down", Reply::Err(ClientError::Network("connection refused".into()))),
        ]);

        let expect = |state: QueryState, category: UpstreamCategory| match state {
            QueryState::Failed { category: got, message } => {
                assert_eq!(got, category);
                message
            }
            other => panic!("unexpected state: {:?}", other),
        };

        expect(session.submit("quota").await, UpstreamCategory::QuotaExceeded);
        expect(session.submit("key").await, UpstreamCategory::Configuration);
        let message = expect(session.submit("bad").await, UpstreamCategory::Generic);
        assert_eq!(message, "Intent validation failed: nope");
        expect(session.submit("down").await, UpstreamCategory::Network);
    }
}
