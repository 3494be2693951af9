pub mod error;
pub mod evaluation;
pub mod ingest;
pub mod user_config;
