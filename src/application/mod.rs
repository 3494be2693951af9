pub mod use_cases;

pub use use_cases::evaluation_query::EvaluationQueryService;
pub use use_cases::ingestion::IngestionPipeline;
pub use use_cases::sampling::SamplingDecider;
pub use use_cases::settings::SettingsService;
