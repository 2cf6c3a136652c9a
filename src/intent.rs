//! Query Intent - structured description of a question
//!
//! Produced by the intent generator (untrusted), checked by the validator,
//! then compiled. Nothing downstream mutates an intent.

use serde::{Deserialize, Serialize};

/// Column name that selects every column (fields) or counts rows (COUNT).
pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    pub table: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<FilterSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aggregations: Vec<AggregationSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_by: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<OrderBySpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub distinct: bool,
}

impl Intent {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            fields: Vec::new(),
            filters: Vec::new(),
            aggregations: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            distinct: false,
        }
    }

    /// Whether any selected field or aggregation is renamed.
    pub fn has_alias(&self) -> bool {
        self.fields.iter().any(|f| f.alias().is_some())
            || self.aggregations.iter().any(|a| a.alias().is_some())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub column: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl FieldSpec {
    pub fn new(column: impl Into<String>) -> Self {
        Self { column: column.into(), alias: None }
    }

    /// Alias, ignoring empty strings.
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref().filter(|a| !a.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    GtEq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    LtEq,
    #[serde(rename = "LIKE")]
    Like,
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "BETWEEN")]
    Between,
    #[serde(rename = "IS NULL")]
    IsNull,
    #[serde(rename = "IS NOT NULL")]
    IsNotNull,
}

impl FilterOperator {
    pub fn as_sql(self) -> &'static str {
        match self {
            FilterOperator::Eq => "=",
            FilterOperator::NotEq => "!=",
            FilterOperator::Gt => ">",
            FilterOperator::GtEq => ">=",
            FilterOperator::Lt => "<",
            FilterOperator::LtEq => "<=",
            FilterOperator::Like => "LIKE",
            FilterOperator::In => "IN",
            FilterOperator::Between => "BETWEEN",
            FilterOperator::IsNull => "IS NULL",
            FilterOperator::IsNotNull => "IS NOT NULL",
        }
    }

    /// `>`, `>=`, `<`, `<=`
    pub fn is_range_comparison(self) -> bool {
        matches!(
            self,
            FilterOperator::Gt | FilterOperator::GtEq | FilterOperator::Lt | FilterOperator::LtEq
        )
    }
}

impl std::fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOperator {
    #[default]
    #[serde(rename = "AND", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "or")]
    Or,
}

impl LogicalOperator {
    pub fn as_sql(self) -> &'static str {
        match self {
            LogicalOperator::And => "AND",
            LogicalOperator::Or => "OR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSpec {
    pub column: String,

    pub operator: FilterOperator,

    /// Scalar, or an array for `IN` / `BETWEEN`. Absent for `IS NULL` / `IS NOT NULL`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,

    /// Connector placed between this filter and the next one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logical_operator: Option<LogicalOperator>,
}

impl FilterSpec {
    pub fn new(column: impl Into<String>, operator: FilterOperator, value: serde_json::Value) -> Self {
        Self {
            column: column.into(),
            operator,
            value: Some(value),
            logical_operator: None,
        }
    }

    pub fn then(mut self, connector: LogicalOperator) -> Self {
        self.logical_operator = Some(connector);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregateFunction {
    Count,
    CountDistinct,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn name(self) -> &'static str {
        match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::CountDistinct => "COUNT_DISTINCT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
        }
    }

    pub fn requires_numeric(self) -> bool {
        matches!(self, AggregateFunction::Sum | AggregateFunction::Avg)
    }
}

impl std::fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationSpec {
    pub function: AggregateFunction,

    pub column: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl AggregationSpec {
    pub fn new(function: AggregateFunction, column: impl Into<String>) -> Self {
        Self { function, column: column.into(), alias: None }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref().filter(|a| !a.is_empty())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    #[serde(rename = "ASC", alias = "asc")]
    Asc,
    #[serde(rename = "DESC", alias = "desc")]
    Desc,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBySpec {
    pub column: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<SortDirection>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_full_intent() {
        let intent: Intent = serde_json::from_value(json!({
            "table": "students",
            "fields": [{"column": "country"}],
            "filters": [
                {"column": "qpa", "operator": ">=", "value": 3.0, "logicalOperator": "OR"},
                {"column": "country", "operator": "IS NOT NULL"}
            ],
            "aggregations": [{"function": "COUNT_DISTINCT", "column": "name", "alias": "names"}],
            "groupBy": ["country"],
            "orderBy": [{"column": "country", "direction": "DESC"}],
            "limit": 10,
            "offset": 5,
            "distinct": true
        }))
        .unwrap();

        assert_eq!(intent.filters[0].operator, FilterOperator::GtEq);
        assert_eq!(intent.filters[0].logical_operator, Some(LogicalOperator::Or));
        assert_eq!(intent.filters[1].value, None);
        assert_eq!(intent.aggregations[0].function, AggregateFunction::CountDistinct);
        assert_eq!(intent.group_by, vec!["country".to_string()]);
        assert_eq!(intent.order_by[0].direction, Some(SortDirection::Desc));
        assert_eq!((intent.limit, intent.offset, intent.distinct), (Some(10), Some(5), true));
    }

    #[test]
    fn test_optional_sections_default_empty() {
        let intent: Intent = serde_json::from_str(r#"{"table":"students"}"#).unwrap();
        assert_eq!(intent, Intent::new("students"));
        assert_eq!(serde_json::to_value(&intent).unwrap(), json!({"table": "students"}));
    }

    #[test]
    fn test_unknown_operator_is_rejected() {
        let parsed: Result<Intent, _> = serde_json::from_value(json!({
            "table": "students",
            "filters": [{"column": "qpa", "operator": "~=", "value": 1}]
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_empty_alias_is_ignored() {
        let mut intent = Intent::new("students");
        intent.fields.push(FieldSpec { column: "name".into(), alias: Some(String::new()) });
        assert!(!intent.has_alias());
        intent.aggregations.push(AggregationSpec::new(AggregateFunction::Count, "*").with_alias("n"));
        assert!(intent.has_alias());
    }
}
