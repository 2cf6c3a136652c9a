//! Intent Validator - Prevents Hallucination
//!
//! Checks a candidate intent against the schema contract before any SQL is
//! generated. An unknown table stops validation immediately; every other
//! problem is collected so the caller sees the full list at once.
//!
//! A successful validation yields a [`ValidatedIntent`], the only input the
//! SQL compiler accepts.

use crate::intent::{AggregateFunction, FilterOperator, Intent, WILDCARD};
use crate::schema::{ColumnType, SchemaContract};
use regex::Regex;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

lazy_static::lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// Validation result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    fn from_errors(errors: Vec<String>) -> Self {
        Self { valid: errors.is_empty(), errors }
    }
}

/// An intent that passed validation against a schema contract.
///
/// Cannot be constructed outside this module.
#[derive(Debug, Clone, Copy)]
pub struct ValidatedIntent<'a> {
    intent: &'a Intent,
}

impl<'a> ValidatedIntent<'a> {
    pub fn intent(&self) -> &'a Intent {
        self.intent
    }
}

impl std::ops::Deref for ValidatedIntent<'_> {
    type Target = Intent;

    fn deref(&self) -> &Intent {
        self.intent
    }
}

#[derive(Debug, Clone)]
pub struct IntentValidator {
    schema: Arc<SchemaContract>,
}

impl IntentValidator {
    pub fn new(schema: Arc<SchemaContract>) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &SchemaContract {
        &self.schema
    }

    /// Validate and, on success, seal the intent for compilation.
    pub fn accept<'a>(&self, intent: &'a Intent) -> std::result::Result<ValidatedIntent<'a>, ValidationResult> {
        let result = self.validate(intent);
        if result.valid {
            Ok(ValidatedIntent { intent })
        } else {
            Err(result)
        }
    }

    /// Validate intent against the schema contract.
    ///
    /// Checks:
    /// 1. The table exists (short-circuits when it does not)
    /// 2. Something is selected, and every field column is known
    /// 3. Filter columns are known and operators match column types
    /// 4. Aggregation columns are known and numeric where required
    /// 5. Group-by and order-by columns are known
    /// 6. Aliases are plain identifiers
    pub fn validate(&self, intent: &Intent) -> ValidationResult {
        let Some(columns) = self.schema.columns_of(&intent.table) else {
            debug!("Rejecting intent for unknown table '{}'", intent.table);
            return ValidationResult::from_errors(vec![format!(
                "Table '{}' does not exist in schema",
                intent.table
            )]);
        };
        let column_type = |name: &str| columns.get(name).map(|c| c.column_type);

        let mut errors = Vec::new();

        if intent.fields.is_empty() && intent.aggregations.is_empty() {
            errors.push(
                "Fields array is required and cannot be empty when no aggregations are given".to_string(),
            );
        }
        for (idx, field) in intent.fields.iter().enumerate() {
            if field.column != WILDCARD && column_type(&field.column).is_none() {
                errors.push(format!("Invalid column '{}' in fields[{}]", field.column, idx));
            }
            if let Some(alias) = field.alias() {
                if !IDENTIFIER.is_match(alias) {
                    errors.push(format!("Invalid alias '{}' in fields[{}]", alias, idx));
                }
            }
        }

        for (idx, filter) in intent.filters.iter().enumerate() {
            let Some(ty) = column_type(&filter.column) else {
                errors.push(format!("Invalid column '{}' in filters[{}]", filter.column, idx));
                continue;
            };
            if filter.operator == FilterOperator::Like && ty != ColumnType::String {
                errors.push(format!(
                    "LIKE operator not valid for {} column '{}' in filters[{}]",
                    ty, filter.column, idx
                ));
            }
            if filter.operator.is_range_comparison() && !ty.is_ordered() {
                errors.push(format!(
                    "Operator '{}' not valid for {} column '{}' in filters[{}]",
                    filter.operator, ty, filter.column, idx
                ));
            }
        }

        for (idx, agg) in intent.aggregations.iter().enumerate() {
            if agg.column == WILDCARD {
                if agg.function != AggregateFunction::Count {
                    errors.push(format!(
                        "{} cannot be applied to '*' in aggregations[{}]",
                        agg.function, idx
                    ));
                }
            } else {
                match column_type(&agg.column) {
                    None => {
                        errors.push(format!("Invalid column '{}' in aggregations[{}]", agg.column, idx));
                    }
                    Some(ty) if agg.function.requires_numeric() && !ty.is_numeric() => {
                        errors.push(format!(
                            "{} requires numeric column, got '{}' ({}) in aggregations[{}]",
                            agg.function, agg.column, ty, idx
                        ));
                    }
                    Some(_) => {}
                }
            }
            if let Some(alias) = agg.alias() {
                if !IDENTIFIER.is_match(alias) {
                    errors.push(format!("Invalid alias '{}' in aggregations[{}]", alias, idx));
                }
            }
        }

        for (idx, col) in intent.group_by.iter().enumerate() {
            if column_type(col).is_none() {
                errors.push(format!("Invalid column '{}' in groupBy[{}]", col, idx));
            }
        }

        for (idx, order) in intent.order_by.iter().enumerate() {
            if column_type(&order.column).is_none() {
                errors.push(format!("Invalid column '{}' in orderBy[{}]", order.column, idx));
            }
        }

        if !errors.is_empty() {
            debug!("Intent for '{}' failed validation with {} error(s)", intent.table, errors.len());
        }
        ValidationResult::from_errors(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{AggregationSpec, FieldSpec, FilterSpec, OrderBySpec};
    use crate::schema::tests::students_contract;
    use serde_json::json;

    fn validator() -> IntentValidator {
        IntentValidator::new(Arc::new(students_contract()))
    }

    fn select(columns: &[&str]) -> Intent {
        let mut intent = Intent::new("students");
        intent.fields = columns.iter().map(|c| FieldSpec::new(*c)).collect();
        intent
    }

    #[test]
    fn test_unknown_table_short_circuits() {
        let mut intent = Intent::new("teachers");
        intent.fields.push(FieldSpec::new("nonexistent"));
        intent.group_by.push("also_missing".to_string());

        let result = validator().validate(&intent);
        assert!(!result.valid);
        assert_eq!(result.errors, vec!["Table 'teachers' does not exist in schema".to_string()]);
    }

    #[test]
    fn test_valid_select() {
        let result = validator().validate(&select(&["name", "qpa", "*"]));
        assert!(result.valid, "{:?}", result.errors);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_empty_selection_is_rejected() {
        let result = validator().validate(&Intent::new("students"));
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("Fields array is required"));
    }

    #[test]
    fn test_aggregations_without_fields_are_allowed() {
        let mut intent = Intent::new("students");
        intent.aggregations.push(AggregationSpec::new(AggregateFunction::Count, "*").with_alias("total"));
        assert!(validator().validate(&intent).valid);
    }

    #[test]
    fn test_errors_accumulate_across_sections() {
        let mut intent = select(&["name", "bogus"]);
        intent.filters.push(FilterSpec::new("missing", FilterOperator::Eq, json!(1)));
        intent.aggregations.push(AggregationSpec::new(AggregateFunction::Max, "ghost"));
        intent.group_by = vec!["country".into(), "phantom".into()];

        let result = validator().validate(&intent);
        assert_eq!(
            result.errors,
            vec![
                "Invalid column 'bogus' in fields[1]".to_string(),
                "Invalid column 'missing' in filters[0]".to_string(),
                "Invalid column 'ghost' in aggregations[0]".to_string(),
                "Invalid column 'phantom' in groupBy[1]".to_string(),
            ]
        );
    }

    #[test]
    fn test_like_requires_string_column() {
        let mut intent = select(&["name"]);
        intent.filters.push(FilterSpec::new("name", FilterOperator::Like, json!("A%")));
        intent.filters.push(FilterSpec::new("qpa", FilterOperator::Like, json!("3%")));

        let result = validator().validate(&intent);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("LIKE"));
        assert!(result.errors[0].contains("filters[1]"));
    }

    #[test]
    fn test_range_comparison_types() {
        let mut intent = select(&["name"]);
        intent.filters.push(FilterSpec::new("qpa", FilterOperator::Gt, json!(3.5)));
        intent.filters.push(FilterSpec::new("id", FilterOperator::LtEq, json!(10)));
        intent.filters.push(FilterSpec::new("enrolled_on", FilterOperator::GtEq, json!("2024-01-01")));
        intent.filters.push(FilterSpec::new("country", FilterOperator::Lt, json!("M")));

        let result = validator().validate(&intent);
        assert_eq!(
            result.errors,
            vec!["Operator '<' not valid for string column 'country' in filters[3]".to_string()]
        );
    }

    #[test]
    fn test_numeric_aggregations() {
        let mut intent = Intent::new("students");
        intent.aggregations.push(AggregationSpec::new(AggregateFunction::Avg, "qpa"));
        intent.aggregations.push(AggregationSpec::new(AggregateFunction::Sum, "name"));
        intent.aggregations.push(AggregationSpec::new(AggregateFunction::Min, "name"));

        let result = validator().validate(&intent);
        assert_eq!(
            result.errors,
            vec!["SUM requires numeric column, got 'name' (string) in aggregations[1]".to_string()]
        );
    }

    #[test]
    fn test_wildcard_only_counts() {
        let mut intent = Intent::new("students");
        intent.aggregations.push(AggregationSpec::new(AggregateFunction::Count, "*"));
        intent.aggregations.push(AggregationSpec::new(AggregateFunction::Sum, "*"));
        intent.aggregations.push(AggregationSpec::new(AggregateFunction::CountDistinct, "*"));

        let result = validator().validate(&intent);
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors[0].starts_with("SUM cannot be applied"));
        assert!(result.errors[1].starts_with("COUNT_DISTINCT cannot be applied"));
    }

    #[test]
    fn test_order_by_and_alias_checks() {
        let mut intent = select(&["name"]);
        intent.fields[0].alias = Some("student name; DROP TABLE students".to_string());
        intent.order_by.push(OrderBySpec { column: "rank".to_string(), direction: None });

        let result = validator().validate(&intent);
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors[0].starts_with("Invalid alias"));
        assert_eq!(result.errors[1], "Invalid column 'rank' in orderBy[0]");
    }

    #[test]
    fn test_accept_seals_only_valid_intents() {
        let good = select(&["name"]);
        let sealed = validator().accept(&good).unwrap();
        assert_eq!(sealed.table, "students");

        let bad = Intent::new("nowhere");
        assert!(validator().accept(&bad).is_err());
    }

    #[test]
    fn test_validation_does_not_mutate() {
        let mut intent = select(&["name", "bogus"]);
        intent.filters.push(FilterSpec::new("qpa", FilterOperator::Like, json!("x")));
        let before = intent.clone();
        let _ = validator().validate(&intent);
        assert_eq!(intent, before);
    }
}
