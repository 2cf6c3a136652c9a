//! SQL Compiler - Deterministic SQL generation from a validated intent
//!
//! Identifiers (table, columns, aliases) are written into the SQL text as-is;
//! this is only safe because [`ValidatedIntent`] can only be produced by the
//! validator. Every user-supplied value becomes a positional `?` parameter.
//!
//! Clause order is fixed: SELECT, FROM, WHERE, GROUP BY, ORDER BY, LIMIT, OFFSET.
//! The same intent always compiles to the same SQL text and parameter list.

use crate::error::{QueryError, Result};
use crate::intent::{AggregateFunction, FilterOperator, FilterSpec, WILDCARD};
use crate::validator::ValidatedIntent;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// A scalar bound to one `?` placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlParam {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlParam {
    fn from_json(value: &Value, column: &str) -> Result<Self> {
        match value {
            Value::Null => Ok(SqlParam::Null),
            Value::Bool(b) => Ok(SqlParam::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(SqlParam::Integer(i)),
                None => n
                    .as_f64()
                    .map(SqlParam::Real)
                    .ok_or_else(|| QueryError::Compilation(format!("Unrepresentable number for '{}'", column))),
            },
            Value::String(s) => Ok(SqlParam::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => Err(QueryError::Compilation(format!(
                "Filter on '{}' expects a scalar value, got {}",
                column, value
            ))),
        }
    }
}

impl From<&str> for SqlParam {
    fn from(s: &str) -> Self {
        SqlParam::Text(s.to_string())
    }
}

impl From<i64> for SqlParam {
    fn from(i: i64) -> Self {
        SqlParam::Integer(i)
    }
}

impl From<f64> for SqlParam {
    fn from(f: f64) -> Self {
        SqlParam::Real(f)
    }
}

/// SQL text plus the values for its placeholders, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl CompiledQuery {
    pub fn placeholder_count(&self) -> usize {
        self.sql.matches('?').count()
    }
}

/// SQL Compiler - Deterministic SQL generation
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlCompiler;

impl SqlCompiler {
    pub fn new() -> Self {
        Self
    }

    /// Compile a validated intent to a parameterized query
    pub fn compile(&self, intent: &ValidatedIntent<'_>) -> Result<CompiledQuery> {
        let mut params = Vec::new();

        let mut sql_parts = vec![self.build_select_clause(intent), format!("FROM {}", intent.table)];

        if let Some(where_clause) = self.build_where_clause(&intent.filters, &mut params)? {
            sql_parts.push(where_clause);
        }
        if !intent.group_by.is_empty() {
            sql_parts.push(format!("GROUP BY {}", intent.group_by.join(", ")));
        }
        if let Some(order_by_clause) = self.build_order_by_clause(intent) {
            sql_parts.push(order_by_clause);
        }
        // Zero is treated the same as absent for both LIMIT and OFFSET.
        if let Some(limit) = intent.limit.filter(|&n| n > 0) {
            sql_parts.push(format!("LIMIT {}", limit));
        }
        if let Some(offset) = intent.offset.filter(|&n| n > 0) {
            sql_parts.push(format!("OFFSET {}", offset));
        }

        let compiled = CompiledQuery { sql: sql_parts.join(" "), params };
        if compiled.placeholder_count() != compiled.params.len() {
            return Err(QueryError::Compilation(format!(
                "Placeholder count {} does not match parameter count {}",
                compiled.placeholder_count(),
                compiled.params.len()
            )));
        }

        debug!("Generated SQL: {} ({} params)", compiled.sql, compiled.params.len());
        Ok(compiled)
    }

    /// Fields first, then aggregations, each in the order given.
    fn build_select_clause(&self, intent: &ValidatedIntent<'_>) -> String {
        let mut select_parts = Vec::with_capacity(intent.fields.len() + intent.aggregations.len());

        for field in &intent.fields {
            match field.alias() {
                _ if field.column == WILDCARD => select_parts.push(WILDCARD.to_string()),
                Some(alias) => select_parts.push(format!("{} AS {}", field.column, alias)),
                None => select_parts.push(field.column.clone()),
            }
        }

        for agg in &intent.aggregations {
            let expr = match agg.function {
                AggregateFunction::CountDistinct => format!("COUNT(DISTINCT {})", agg.column),
                func => format!("{}({})", func.name(), agg.column),
            };
            let alias = agg.alias().map(|a| format!(" AS {}", a)).unwrap_or_default();
            select_parts.push(format!("{}{}", expr, alias));
        }

        let keyword = if intent.distinct { "SELECT DISTINCT" } else { "SELECT" };
        format!("{} {}", keyword, select_parts.join(", "))
    }

    /// The connector between filter i-1 and filter i comes from filter i-1.
    fn build_where_clause(&self, filters: &[FilterSpec], params: &mut Vec<SqlParam>) -> Result<Option<String>> {
        if filters.is_empty() {
            return Ok(None);
        }

        let mut where_parts = Vec::with_capacity(filters.len() * 2);
        for (idx, filter) in filters.iter().enumerate() {
            if idx > 0 {
                let connector = filters[idx - 1].logical_operator.unwrap_or_default();
                where_parts.push(connector.as_sql().to_string());
            }
            where_parts.push(self.build_filter_condition(filter, params)?);
        }

        Ok(Some(format!("WHERE {}", where_parts.join(" "))))
    }

    /// Build filter condition
    fn build_filter_condition(&self, filter: &FilterSpec, params: &mut Vec<SqlParam>) -> Result<String> {
        let column = &filter.column;
        match filter.operator {
            FilterOperator::IsNull | FilterOperator::IsNotNull => {
                Ok(format!("{} {}", column, filter.operator.as_sql()))
            }
            FilterOperator::In => {
                let values = self.require_array(filter)?;
                if values.is_empty() {
                    return Err(QueryError::Compilation(format!(
                        "IN filter on '{}' requires at least one value",
                        column
                    )));
                }
                let placeholders = vec!["?"; values.len()].join(", ");
                for value in values {
                    params.push(SqlParam::from_json(value, column)?);
                }
                Ok(format!("{} IN ({})", column, placeholders))
            }
            FilterOperator::Between => {
                let values = self.require_array(filter)?;
                let [low, high] = values else {
                    return Err(QueryError::Compilation(format!(
                        "BETWEEN filter on '{}' requires exactly two values, got {}",
                        column,
                        values.len()
                    )));
                };
                params.push(SqlParam::from_json(low, column)?);
                params.push(SqlParam::from_json(high, column)?);
                Ok(format!("{} BETWEEN ? AND ?", column))
            }
            op => {
                let value = filter.value.as_ref().ok_or_else(|| {
                    QueryError::Compilation(format!("Operator {} on '{}' requires a value", op, column))
                })?;
                params.push(SqlParam::from_json(value, column)?);
                Ok(format!("{} {} ?", column, op.as_sql()))
            }
        }
    }

    fn require_array<'f>(&self, filter: &'f FilterSpec) -> Result<&'f [Value]> {
        match filter.value.as_ref() {
            Some(Value::Array(values)) => Ok(values),
            _ => Err(QueryError::Compilation(format!(
                "{} operator on '{}' requires an array value",
                filter.operator, filter.column
            ))),
        }
    }

    /// Build ORDER BY clause
    fn build_order_by_clause(&self, intent: &ValidatedIntent<'_>) -> Option<String> {
        if intent.order_by.is_empty() {
            return None;
        }
        let parts: Vec<String> = intent
            .order_by
            .iter()
            .map(|spec| format!("{} {}", spec.column, spec.direction.unwrap_or_default().as_sql()))
            .collect();
        Some(format!("ORDER BY {}", parts.join(", ")))
    }
}
