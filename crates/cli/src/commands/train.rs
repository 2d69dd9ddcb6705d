use std::path::{Path, PathBuf};

use basketry_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use basketry_core::errors::{PipelineStage, StageFailure};
use basketry_core::ingest::CsvDatasetSource;
use basketry_core::pipeline::{PipelineSettings, RecommendationPipeline, RunSummary};
use basketry_db::artifacts::{ArtifactManifest, ArtifactWriter};
use clap::Args;
use serde::Serialize;
use thiserror::Error;
use tokio::runtime::Runtime;

use crate::commands::CommandResult;
use crate::logging;

#[derive(Debug, Clone, Default, Args)]
pub struct TrainArgs {
    #[arg(long, help = "Path to a basketry.toml config file")]
    pub config: Option<PathBuf>,
    #[arg(long, help = "Sales receipts CSV")]
    pub transactions: Option<PathBuf>,
    #[arg(long, help = "Product catalog CSV")]
    pub catalog: Option<PathBuf>,
    #[arg(long, help = "Directory that receives the artifact set")]
    pub output_dir: Option<PathBuf>,
    #[arg(long, help = "Minimum itemset support in (0, 1]")]
    pub min_support: Option<f64>,
}

impl TrainArgs {
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                transactions_path: self.transactions.clone(),
                catalog_path: self.catalog.clone(),
                output_dir: self.output_dir.clone(),
                min_support: self.min_support,
                log_level: None,
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("configuration issue: {0}")]
    Settings(String),
    #[error(transparent)]
    Stage(#[from] StageFailure),
}

impl TrainingError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Settings(_) => "config_validation",
            Self::Stage(failure) => failure.error_class(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Settings(_) => 2,
            Self::Stage(failure) => match failure.stage {
                PipelineStage::Ingest => 4,
                PipelineStage::Persist => 6,
                _ => 5,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TrainingReport {
    pub output_dir: String,
    pub summary: RunSummary,
    pub manifest: ArtifactManifest,
}

/// One full run: read the configured inputs, train, and commit into `output_dir`.
pub fn execute(
    config: &AppConfig,
    output_dir: &Path,
    runtime: &Runtime,
) -> Result<TrainingReport, TrainingError> {
    let settings = PipelineSettings::from_config(config)
        .map_err(|error| TrainingError::Settings(error.to_string()))?;
    let source = CsvDatasetSource::from_config(&config.input);

    let output = RecommendationPipeline::new(settings).run(&source)?;
    let manifest = runtime
        .block_on(ArtifactWriter::new(output_dir).commit(&output))
        .map_err(|error| StageFailure::new(PipelineStage::Persist, error))?;

    Ok(TrainingReport {
        output_dir: output_dir.display().to_string(),
        summary: output.summary,
        manifest,
    })
}

pub fn run(args: &TrainArgs) -> CommandResult {
    let config = match AppConfig::load(args.load_options()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "train",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };
    logging::init(&config.logging);

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "train",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    match execute(&config, &config.artifacts.output_dir, &runtime) {
        Ok(report) => {
            let message = format!(
                "trained {} rules and {} recommendation keys from {} baskets into `{}`",
                report.summary.rules,
                report.summary.recommendation_keys,
                report.summary.baskets,
                report.output_dir
            );
            CommandResult::success("train", message, report)
        }
        Err(error) => {
            CommandResult::failure("train", error.error_class(), error.to_string(), error.exit_code())
        }
    }
}

#[cfg(test)]
mod tests {
    use basketry_core::errors::{ApplicationError, DomainError, PipelineStage, StageFailure};

    use super::TrainingError;

    #[test]
    fn exit_codes_follow_the_failing_stage() {
        let ingest = TrainingError::from(StageFailure::new(
            PipelineStage::Ingest,
            ApplicationError::Input("transactions table is unreadable".to_string()),
        ));
        let rules = TrainingError::from(StageFailure::new(
            PipelineStage::Rules,
            DomainError::InvariantViolation("subset missing".to_string()),
        ));
        let persist = TrainingError::from(StageFailure::new(
            PipelineStage::Persist,
            ApplicationError::Persistence("disk full".to_string()),
        ));

        assert_eq!((ingest.exit_code(), ingest.error_class()), (4, "input_unavailable"));
        assert_eq!((rules.exit_code(), rules.error_class()), (5, "invariant_violation"));
        assert_eq!((persist.exit_code(), persist.error_class()), (6, "persistence"));
        assert_eq!(TrainingError::Settings("bad".to_string()).exit_code(), 2);
    }
}
