//! End-to-end training run: ingest, prepare, count popularity, encode baskets, mine,
//! derive rules, and assemble per-antecedent recommendations.

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::domain::catalog::Catalog;
use crate::errors::{DomainError, PipelineStage, StageFailure};
use crate::ingest::DatasetSource;
use crate::mining::basket::{BasketEncoder, ItemUniverse};
use crate::mining::itemsets::{AprioriMiner, MiningParams};
use crate::mining::rules::{AssociationRule, RuleFilter, RuleGenerator};
use crate::prepare::{prepare, PreparationRules, PreparationStats};
use crate::recommend::{
    CategoryLookup, PopularityAggregator, PopularityRecord, RecommendationAssembler,
    RecommendationTable,
};

/// Validated knobs for one run.
#[derive(Clone, Debug)]
pub struct PipelineSettings {
    pub preparation: PreparationRules,
    pub mining: MiningParams,
    pub rules: RuleFilter,
    pub unknown_category: String,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self, DomainError> {
        Ok(Self {
            preparation: PreparationRules::from_config(&config.preparation),
            mining: MiningParams::new(config.mining.min_support)?
                .with_max_len(config.mining.max_itemset_len),
            rules: RuleFilter::new(config.rules.metric, config.rules.min_threshold)?,
            unknown_category: config.recommendations.unknown_category.clone(),
        })
    }
}

/// A rule as persisted: item sets spelled out as sorted product names.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleRecord {
    pub antecedents: Vec<String>,
    pub consequents: Vec<String>,
    pub antecedent_support: f64,
    pub consequent_support: f64,
    pub support: f64,
    pub confidence: f64,
    pub lift: f64,
    pub leverage: f64,
    pub conviction: Option<f64>,
}

impl RuleRecord {
    pub fn from_rule(rule: &AssociationRule, universe: &ItemUniverse) -> Self {
        Self {
            antecedents: universe.names(&rule.antecedent),
            consequents: universe.names(&rule.consequent),
            antecedent_support: rule.antecedent_support,
            consequent_support: rule.consequent_support,
            support: rule.support,
            confidence: rule.confidence,
            lift: rule.lift,
            leverage: rule.leverage,
            conviction: rule.conviction,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub preparation: PreparationStats,
    pub baskets: usize,
    pub distinct_products: usize,
    pub frequent_itemsets: usize,
    pub longest_itemset: usize,
    pub rules: usize,
    pub recommendation_keys: usize,
    pub popularity_records: usize,
}

#[derive(Clone, Debug)]
pub struct TrainingOutput {
    pub popularity: Vec<PopularityRecord>,
    pub rules: Vec<RuleRecord>,
    pub recommendations: RecommendationTable,
    pub summary: RunSummary,
}

pub struct RecommendationPipeline {
    settings: PipelineSettings,
    run_id: String,
}

impl RecommendationPipeline {
    pub fn new(settings: PipelineSettings) -> Self {
        Self { settings, run_id: Uuid::new_v4().to_string() }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    /// Runs every stage in order; the first failure stops the run and names its stage.
    pub fn run(&self, source: &dyn DatasetSource) -> Result<TrainingOutput, StageFailure> {
        let run_id = self.run_id.as_str();
        info!(event_name = "pipeline.run.started", run_id, "training run started");

        let raw = source.load().map_err(|error| self.fail(PipelineStage::Ingest, error))?;
        info!(
            event_name = "pipeline.ingest.completed",
            run_id,
            receipts = raw.receipts.len(),
            catalog_entries = raw.catalog.len(),
            "input tables loaded"
        );

        let catalog =
            Catalog::new(raw.catalog).map_err(|error| self.fail(PipelineStage::Prepare, error))?;
        let prepared = prepare(&raw.receipts, &catalog, &self.settings.preparation);
        info!(
            event_name = "pipeline.prepare.completed",
            run_id,
            rows = prepared.stats.rows_retained,
            transactions = prepared.stats.transactions_retained,
            unmatched = prepared.stats.unmatched_products,
            outside_allow_list = prepared.stats.outside_allow_list,
            transactions_dropped = prepared.stats.transactions_dropped,
            "transactions filtered"
        );

        let popularity = PopularityAggregator::aggregate(&prepared.rows);
        info!(
            event_name = "pipeline.popularity.completed",
            run_id,
            records = popularity.len(),
            "popularity counted"
        );

        let baskets = BasketEncoder::encode(&prepared.rows);
        info!(
            event_name = "pipeline.encode.completed",
            run_id,
            baskets = baskets.len(),
            products = baskets.universe().len(),
            "baskets encoded"
        );

        let itemsets = AprioriMiner::new(self.settings.mining).mine(&baskets);
        info!(
            event_name = "pipeline.mine.completed",
            run_id,
            itemsets = itemsets.len(),
            longest = itemsets.max_len(),
            min_support = self.settings.mining.min_support,
            "frequent itemsets mined"
        );

        let rules = RuleGenerator::new(self.settings.rules)
            .generate(&itemsets)
            .map_err(|error| self.fail(PipelineStage::Rules, error))?;
        info!(event_name = "pipeline.rules.completed", run_id, rules = rules.len(), "rules derived");

        let categories =
            CategoryLookup::from_rows(&prepared.rows, self.settings.unknown_category.as_str());
        let recommendations =
            RecommendationAssembler::new(categories).assemble(&rules, baskets.universe());
        info!(
            event_name = "pipeline.assemble.completed",
            run_id,
            keys = recommendations.len(),
            entries = recommendations.recommendation_count(),
            "recommendations assembled"
        );

        let rule_records: Vec<RuleRecord> =
            rules.iter().map(|rule| RuleRecord::from_rule(rule, baskets.universe())).collect();

        let summary = RunSummary {
            run_id: self.run_id.clone(),
            preparation: prepared.stats,
            baskets: baskets.len(),
            distinct_products: baskets.universe().len(),
            frequent_itemsets: itemsets.len(),
            longest_itemset: itemsets.max_len(),
            rules: rule_records.len(),
            recommendation_keys: recommendations.len(),
            popularity_records: popularity.len(),
        };

        Ok(TrainingOutput { popularity, rules: rule_records, recommendations, summary })
    }

    fn fail(
        &self,
        stage: PipelineStage,
        error: impl Into<crate::errors::ApplicationError>,
    ) -> StageFailure {
        let failure = StageFailure::new(stage, error);
        tracing::error!(
            event_name = "pipeline.run.failed",
            run_id = self.run_id.as_str(),
            stage = stage.as_str(),
            error_class = failure.error_class(),
            error = %failure.source,
            "training run failed"
        );
        failure
    }
}
