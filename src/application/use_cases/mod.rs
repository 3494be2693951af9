pub mod evaluation_query;
pub mod ingestion;
pub mod pii_redactor;
pub mod quota_tracker;
pub mod sampling;
pub mod settings;
