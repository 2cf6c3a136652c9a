pub mod analyze;
pub mod compiler;
pub mod config;
pub mod error;
pub mod executor;
pub mod http;
pub mod intent;
pub mod llm;
pub mod observability;
pub mod pipeline;
pub mod schema;
pub mod session;
pub mod validator;
pub mod view;

pub use compiler::{CompiledQuery, SqlCompiler, SqlParam};
pub use error::{QueryError, Result};
pub use intent::Intent;
pub use pipeline::QueryPipeline;
pub use schema::SchemaContract;
pub use validator::{IntentValidator, ValidatedIntent, ValidationResult};
pub use view::{explain_view, select_view, ViewType};
