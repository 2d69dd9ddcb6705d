//! Recommendation artifacts built from mined rules and prepared rows.

pub mod assembler;
pub mod popularity;

pub use assembler::{CategoryLookup, Recommendation, RecommendationAssembler, RecommendationTable};
pub use popularity::{PopularityAggregator, PopularityRecord};
