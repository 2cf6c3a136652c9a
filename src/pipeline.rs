//! Query Pipeline
//!
//! Validate, then compile. The only entry point callers should use to turn an
//! intent into SQL.

use crate::compiler::{CompiledQuery, SqlCompiler, SqlParam};
use crate::error::{QueryError, Result};
use crate::intent::Intent;
use crate::schema::SchemaContract;
use crate::validator::IntentValidator;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct QueryPipeline {
    validator: IntentValidator,
    compiler: SqlCompiler,
}

impl QueryPipeline {
    pub fn new(schema: Arc<SchemaContract>) -> Self {
        Self {
            validator: IntentValidator::new(schema),
            compiler: SqlCompiler::new(),
        }
    }

    pub fn validator(&self) -> &IntentValidator {
        &self.validator
    }

    /// Returns `QueryError::Validation` without compiling when the intent is
    /// invalid, and `QueryError::Compilation` when SQL generation fails.
    pub fn build_query(&self, intent: &Intent) -> Result<CompiledQuery> {
        let validated = self.validator.accept(intent).map_err(|result| {
            warn!("Intent for '{}' rejected: {}", intent.table, result.errors.join("; "));
            QueryError::Validation(result.errors)
        })?;

        let compiled = self.compiler.compile(&validated)?;
        info!("Compiled intent for '{}': {}", intent.table, compiled.sql);
        Ok(compiled)
    }
}

/// Wire form of a build: `{success, sql?, params?, error?}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<SqlParam>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<CompiledQuery>> for BuildOutcome {
    fn from(result: Result<CompiledQuery>) -> Self {
        match result {
            Ok(CompiledQuery { sql, params }) => Self {
                success: true,
                sql: Some(sql),
                params: Some(params),
                error: None,
            },
            Err(e) => Self {
                success: false,
                sql: None,
                params: None,
                error: Some(e.to_string()),
            },
        }
    }
}
