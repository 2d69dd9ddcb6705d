pub mod config;
pub mod domain;
pub mod errors;
pub mod ingest;
pub mod mining;
pub mod pipeline;
pub mod prepare;
pub mod recommend;

pub use chrono;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use domain::catalog::{Catalog, CatalogEntry, ProductId};
pub use domain::receipt::{PreparedRow, SalesReceipt, TransactionKey};
pub use errors::{ApplicationError, DomainError, PipelineStage, StageFailure};
pub use ingest::{CsvDatasetSource, DatasetSource, RawDataset};
pub use mining::{
    AprioriMiner, AssociationRule, BasketEncoder, BasketSet, FrequentItemsets, MiningParams,
    RuleFilter, RuleGenerator, RuleMetric,
};
pub use pipeline::{PipelineSettings, RecommendationPipeline, RuleRecord, RunSummary, TrainingOutput};
pub use recommend::{
    PopularityAggregator, PopularityRecord, Recommendation, RecommendationAssembler,
    RecommendationTable,
};
