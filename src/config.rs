//! Process configuration
//!
//! Read once at startup from the environment (after `.env` is loaded).
//! Command-line arguments on the binaries override these values.

use crate::error::{QueryError, Result};
use crate::llm::{DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL};
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_SCHEMA_PATH: &str = "schemas/schema_contract.json";
pub const DEFAULT_DATABASE_PATH: &str = "data/student_records.db";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub schema_path: PathBuf,
    pub database_path: PathBuf,
    pub bind_addr: SocketAddr,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
}

impl AppConfig {
    /// Load `.env` (if present) and read the environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind = get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind
            .parse()
            .map_err(|e| QueryError::Config(format!("Invalid BIND_ADDR '{}': {}", bind, e)))?;

        Ok(Self {
            schema_path: get("SCHEMA_CONTRACT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SCHEMA_PATH)),
            database_path: get("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH)),
            bind_addr,
            gemini_api_key: get("GEMINI_API_KEY"),
            gemini_model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            gemini_base_url: get("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.schema_path, PathBuf::from(DEFAULT_SCHEMA_PATH));
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.gemini_api_key, None);
        assert_eq!(config.gemini_model, DEFAULT_GEMINI_MODEL);
    }

    #[test]
    fn test_overrides_and_blank_values() {
        let config = AppConfig::from_lookup(lookup(&[
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("GEMINI_API_KEY", "   "),
            ("GEMINI_MODEL", "gemini-2.0-flash"),
            ("DATABASE_PATH", "/tmp/records.db"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(config.gemini_api_key, None);
        assert_eq!(config.gemini_model, "gemini-2.0-flash");
        assert_eq!(config.database_path, PathBuf::from("/tmp/records.db"));
    }

    #[test]
    fn test_invalid_bind_addr() {
        let result = AppConfig::from_lookup(lookup(&[("BIND_ADDR", "not-an-address")]));
        assert!(matches!(result, Err(QueryError::Config(_))));
    }
}
