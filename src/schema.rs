//! Schema Contract
//!
//! Static allow-list of tables, columns and column types. Loaded once at
//! startup and shared read-only; every identifier that reaches generated
//! SQL text must be present here.

use crate::error::{QueryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Integer,
    Number,
    Date,
}

impl ColumnType {
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Number)
    }

    /// Types that support `>`, `>=`, `<`, `<=`.
    pub fn is_ordered(self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Number | ColumnType::Date)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Integer => "integer",
            ColumnType::Number => "number",
            ColumnType::Date => "date",
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub columns: BTreeMap<String, ColumnSchema>,
}

/// `{ "tables": { "<name>": { "columns": { "<col>": { "type": "..." } } } } }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaContract {
    tables: BTreeMap<String, TableSchema>,
}

impl SchemaContract {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| QueryError::Schema(format!("Failed to read {}: {}", path.display(), e)))?;
        let contract = Self::from_json(&content)
            .map_err(|e| QueryError::Schema(format!("Failed to parse {}: {}", path.display(), e)))?;
        tracing::info!(
            "Loaded schema contract from {} ({} tables)",
            path.display(),
            contract.tables.len()
        );
        Ok(contract)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let contract: SchemaContract = serde_json::from_str(json)?;
        if contract.tables.is_empty() {
            return Err(QueryError::Schema("Schema contract defines no tables".to_string()));
        }
        Ok(contract)
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn columns_of(&self, table: &str) -> Option<&BTreeMap<String, ColumnSchema>> {
        self.tables.get(table).map(|t| &t.columns)
    }

    pub fn column_type(&self, table: &str, column: &str) -> Option<ColumnType> {
        self.columns_of(table)?.get(column).map(|c| c.column_type)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Tables as a JSON value, for embedding in the intent generation prompt.
    pub fn tables_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.tables).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const STUDENTS_CONTRACT: &str = r#"{
        "tables": {
            "students": {
                "columns": {
                    "id": { "type": "integer" },
                    "name": { "type": "string" },
                    "country": { "type": "string" },
                    "qpa": { "type": "number" },
                    "enrolled_on": { "type": "date" }
                }
            },
            "courses": {
                "columns": {
                    "code": { "type": "string" },
                    "credits": { "type": "integer" }
                }
            }
        }
    }"#;

    pub(crate) fn students_contract() -> SchemaContract {
        SchemaContract::from_json(STUDENTS_CONTRACT).unwrap()
    }

    #[test]
    fn test_lookup() {
        let contract = students_contract();
        assert!(contract.table_exists("students"));
        assert!(!contract.table_exists("teachers"));
        assert_eq!(contract.column_type("students", "qpa"), Some(ColumnType::Number));
        assert_eq!(contract.column_type("students", "missing"), None);
        assert_eq!(contract.columns_of("courses").map(|c| c.len()), Some(2));
    }

    #[test]
    fn test_rejects_unknown_type() {
        let json = r#"{"tables":{"t":{"columns":{"c":{"type":"blob"}}}}}"#;
        assert!(SchemaContract::from_json(json).is_err());
    }

    #[test]
    fn test_rejects_empty_contract() {
        assert!(matches!(
            SchemaContract::from_json(r#"{"tables":{}}"#),
            Err(QueryError::Schema(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema_contract.json");
        std::fs::write(&path, STUDENTS_CONTRACT).unwrap();
        let contract = SchemaContract::load(&path).unwrap();
        assert_eq!(contract.table_names().collect::<Vec<_>>(), vec!["courses", "students"]);

        let missing = SchemaContract::load(dir.path().join("nope.json"));
        assert!(matches!(missing, Err(QueryError::Schema(_))));
    }
}
