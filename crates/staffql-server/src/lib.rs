//! staffql HTTP server
//!
//! Answers SQL and natural-language questions about the employee dataset
//! loaded into DuckDB. Natural-language questions are translated to SQL by
//! an Ollama model; every statement, typed or generated, passes the same
//! keyword screen before it reaches the engine.

pub mod api;
pub mod config;
pub mod error;
pub mod llm;
pub mod logging;
pub mod metrics;
pub mod query;

pub use api::{router, AppState};
pub use config::Config;
pub use error::ApiError;
pub use llm::{OllamaTranslator, SqlTranslator, TranslateError};
