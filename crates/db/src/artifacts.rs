//! Writes the trained artifact set (popularity CSV, recommendation JSON, rule table,
//! manifest) as one unit.
//!
//! Everything is written into a sibling staging directory first. Only once every file is
//! complete does the staging directory replace the live output directory, so readers see
//! either the previous set or the new one and never a mix.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use basketry_core::errors::ApplicationError;
use basketry_core::pipeline::{RuleRecord, TrainingOutput};
use basketry_core::recommend::{PopularityRecord, RecommendationTable};

use crate::connection::{connect_artifact, open_artifact_read_only};
use crate::repositories::{RepositoryError, RuleTableRepository, SqlRuleTableRepository};
use crate::schema;

pub const POPULARITY_FILE: &str = "popularity_recommendation.csv";
pub const RECOMMENDATIONS_FILE: &str = "apriori_recommendations.json";
pub const RULES_DB_FILE: &str = "rules_basket.db";
pub const MANIFEST_FILE: &str = "manifest.json";

pub const ARTIFACT_FILES: [&str; 4] =
    [POPULARITY_FILE, RECOMMENDATIONS_FILE, RULES_DB_FILE, MANIFEST_FILE];

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("output directory `{0}` has no usable name")]
    InvalidOutputDir(PathBuf),
    #[error("i/o failure on `{path}`: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("csv failure: {0}")]
    Csv(#[from] csv::Error),
    #[error("json failure: {0}")]
    Json(#[from] serde_json::Error),
    #[error("rule table failure: {0}")]
    Repository(#[from] RepositoryError),
    #[error("rule table database failure: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<ArtifactError> for ApplicationError {
    fn from(error: ArtifactError) -> Self {
        ApplicationError::Persistence(error.to_string())
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> ArtifactError + '_ {
    move |source| ArtifactError::Io { path: path.to_path_buf(), source }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDigest {
    pub file: String,
    pub records: usize,
    pub blake3: String,
}

/// Content digests of one committed artifact set. Carries no timestamps or run ids, so
/// identical input yields an identical manifest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub popularity: ArtifactDigest,
    pub recommendations: ArtifactDigest,
    /// Digest of the rule rows in canonical JSON form, not of the SQLite file bytes.
    pub rules: ArtifactDigest,
}

impl ArtifactManifest {
    pub fn same_content(&self, other: &Self) -> bool {
        self == other
    }
}

#[derive(Clone, Debug)]
pub struct ArtifactWriter {
    output_dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self { output_dir: output_dir.into() }
    }

    pub async fn commit(&self, output: &TrainingOutput) -> Result<ArtifactManifest, ArtifactError> {
        let name = self
            .output_dir
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| ArtifactError::InvalidOutputDir(self.output_dir.clone()))?;
        let parent = match self.output_dir.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        tokio::fs::create_dir_all(&parent).await.map_err(io_error(&parent))?;

        let staging = parent.join(format!(".{name}.staging-{}", Uuid::new_v4()));
        tokio::fs::create_dir(&staging).await.map_err(io_error(&staging))?;

        let manifest = match write_artifacts(&staging, output).await {
            Ok(manifest) => manifest,
            Err(error) => {
                discard(&staging).await;
                return Err(error);
            }
        };

        let backup = parent.join(format!(".{name}.previous-{}", Uuid::new_v4()));
        if let Err(error) = swap_into_place(&staging, &self.output_dir, &backup).await {
            discard(&staging).await;
            return Err(error);
        }

        info!(
            event_name = "artifacts.commit.completed",
            output_dir = %self.output_dir.display(),
            rules = manifest.rules.records,
            recommendation_keys = manifest.recommendations.records,
            popularity_records = manifest.popularity.records,
            "artifact set committed"
        );
        Ok(manifest)
    }
}

async fn write_artifacts(
    staging: &Path,
    output: &TrainingOutput,
) -> Result<ArtifactManifest, ArtifactError> {
    let popularity = write_popularity(&staging.join(POPULARITY_FILE), &output.popularity).await?;
    let recommendations =
        write_recommendations(&staging.join(RECOMMENDATIONS_FILE), &output.recommendations)
            .await?;
    let rules = write_rules(&staging.join(RULES_DB_FILE), &output.rules).await?;

    let manifest = ArtifactManifest { popularity, recommendations, rules };
    let manifest_path = staging.join(MANIFEST_FILE);
    let mut bytes = serde_json::to_vec_pretty(&manifest)?;
    bytes.push(b'\n');
    tokio::fs::write(&manifest_path, bytes).await.map_err(io_error(&manifest_path))?;

    Ok(manifest)
}

async fn write_popularity(
    path: &Path,
    records: &[PopularityRecord],
) -> Result<ArtifactDigest, ArtifactError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["product", "product_category", "number_of_transactions"])?;
    for record in records {
        writer.write_record([
            record.product.as_str(),
            record.product_category.as_str(),
            record.number_of_transactions.to_string().as_str(),
        ])?;
    }
    let bytes = writer.into_inner().map_err(|error| ArtifactError::Io {
        path: path.to_path_buf(),
        source: error.into_error(),
    })?;

    tokio::fs::write(path, &bytes).await.map_err(io_error(path))?;
    Ok(digest(POPULARITY_FILE, records.len(), &bytes))
}

async fn write_recommendations(
    path: &Path,
    table: &RecommendationTable,
) -> Result<ArtifactDigest, ArtifactError> {
    let mut bytes = serde_json::to_vec_pretty(table)?;
    bytes.push(b'\n');

    tokio::fs::write(path, &bytes).await.map_err(io_error(path))?;
    Ok(digest(RECOMMENDATIONS_FILE, table.len(), &bytes))
}

async fn write_rules(path: &Path, rules: &[RuleRecord]) -> Result<ArtifactDigest, ArtifactError> {
    let pool = connect_artifact(path).await?;
    let written = async {
        schema::ensure_schema(&pool).await?;
        SqlRuleTableRepository::new(pool.clone()).replace_all(rules).await?;
        Ok::<(), ArtifactError>(())
    }
    .await;
    pool.close().await;
    written?;

    let canonical = serde_json::to_vec(rules)?;
    Ok(digest(RULES_DB_FILE, rules.len(), &canonical))
}

fn digest(file: &str, records: usize, bytes: &[u8]) -> ArtifactDigest {
    ArtifactDigest {
        file: file.to_string(),
        records,
        blake3: blake3::hash(bytes).to_hex().to_string(),
    }
}

async fn swap_into_place(
    staging: &Path,
    output_dir: &Path,
    backup: &Path,
) -> Result<(), ArtifactError> {
    let had_previous = tokio::fs::try_exists(output_dir).await.map_err(io_error(output_dir))?;
    if had_previous {
        tokio::fs::rename(output_dir, backup).await.map_err(io_error(output_dir))?;
    }

    if let Err(source) = tokio::fs::rename(staging, output_dir).await {
        if had_previous {
            if let Err(restore) = tokio::fs::rename(backup, output_dir).await {
                warn!(
                    event_name = "artifacts.commit.restore_failed",
                    backup = %backup.display(),
                    error = %restore,
                    "previous artifacts could not be moved back"
                );
            }
        }
        return Err(ArtifactError::Io { path: output_dir.to_path_buf(), source });
    }

    if had_previous {
        if let Err(error) = tokio::fs::remove_dir_all(backup).await {
            warn!(
                event_name = "artifacts.commit.cleanup_failed",
                backup = %backup.display(),
                error = %error,
                "previous artifacts left behind"
            );
        }
    }
    Ok(())
}

async fn discard(staging: &Path) {
    if let Err(error) = tokio::fs::remove_dir_all(staging).await {
        warn!(
            event_name = "artifacts.commit.cleanup_failed",
            staging = %staging.display(),
            error = %error,
            "staging directory left behind"
        );
    }
}

pub async fn read_manifest(output_dir: &Path) -> Result<ArtifactManifest, ArtifactError> {
    let path = output_dir.join(MANIFEST_FILE);
    let bytes = tokio::fs::read(&path).await.map_err(io_error(&path))?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub async fn read_popularity(output_dir: &Path) -> Result<Vec<PopularityRecord>, ArtifactError> {
    let path = output_dir.join(POPULARITY_FILE);
    let bytes = tokio::fs::read(&path).await.map_err(io_error(&path))?;
    let mut reader = csv::Reader::from_reader(bytes.as_slice());
    let records = reader.deserialize().collect::<Result<Vec<PopularityRecord>, _>>()?;
    Ok(records)
}

pub async fn read_recommendations(
    output_dir: &Path,
) -> Result<RecommendationTable, ArtifactError> {
    let path = output_dir.join(RECOMMENDATIONS_FILE);
    let bytes = tokio::fs::read(&path).await.map_err(io_error(&path))?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub async fn read_rules(output_dir: &Path) -> Result<Vec<RuleRecord>, ArtifactError> {
    let pool = open_artifact_read_only(&output_dir.join(RULES_DB_FILE)).await?;
    let rules = SqlRuleTableRepository::new(pool.clone()).list_all().await;
    pool.close().await;
    Ok(rules?)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use basketry_core::chrono::NaiveDate;
    use basketry_core::config::AppConfig;
    use basketry_core::domain::catalog::{CatalogEntry, ProductId};
    use basketry_core::domain::receipt::SalesReceipt;
    use basketry_core::ingest::RawDataset;
    use basketry_core::pipeline::{PipelineSettings, RecommendationPipeline, TrainingOutput};
    use tempfile::TempDir;

    use super::{
        read_manifest, read_popularity, read_recommendations, read_rules, ArtifactError,
        ArtifactWriter, ARTIFACT_FILES,
    };
    use crate::repositories::RepositoryError;

    fn receipt(transaction_id: u64, product_id: &str) -> SalesReceipt {
        SalesReceipt {
            transaction_id,
            transaction_date: NaiveDate::from_ymd_opt(2019, 4, 3).expect("date"),
            sales_outlet_id: 3,
            customer_id: 42,
            product_id: ProductId(product_id.to_string()),
            quantity: 1,
        }
    }

    fn training_output() -> TrainingOutput {
        let entry = |id: &str, category: &str, product: &str| CatalogEntry {
            product_id: ProductId(id.to_string()),
            product_category: category.to_string(),
            product: product.to_string(),
        };
        let dataset = RawDataset {
            receipts: vec![
                receipt(1, "40"),
                receipt(1, "69"),
                receipt(2, "40"),
                receipt(2, "69"),
                receipt(3, "40"),
                receipt(3, "33"),
            ],
            catalog: vec![
                entry("40", "Coffee", "Latte Rg"),
                entry("69", "Bakery", "Croissant"),
                entry("33", "Coffee", "Espresso shot"),
            ],
        };
        let settings = PipelineSettings::from_config(&AppConfig::default()).expect("settings");
        RecommendationPipeline::new(settings).run(&dataset).expect("pipeline")
    }

    fn sibling_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .expect("read dir")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn commit_writes_every_artifact_and_reads_back() {
        let root = TempDir::new().expect("temp dir");
        let output_dir = root.path().join("recommendation_objects");
        let output = training_output();

        let manifest = ArtifactWriter::new(&output_dir).commit(&output).await.expect("commit");

        for file in ARTIFACT_FILES {
            assert!(output_dir.join(file).is_file(), "{file} should exist");
        }
        assert_eq!(sibling_entries(root.path()), vec!["recommendation_objects".to_string()]);
        assert_eq!(read_manifest(&output_dir).await.expect("manifest"), manifest);
        assert_eq!(read_popularity(&output_dir).await.expect("popularity"), output.popularity);
        assert_eq!(
            read_recommendations(&output_dir).await.expect("recommendations"),
            output.recommendations
        );
        assert_eq!(read_rules(&output_dir).await.expect("rules"), output.rules);
    }

    #[tokio::test]
    async fn identical_output_gives_identical_manifest() {
        let root = TempDir::new().expect("temp dir");
        let output_dir = root.path().join("objects");

        let first =
            ArtifactWriter::new(&output_dir).commit(&training_output()).await.expect("first");
        let second =
            ArtifactWriter::new(&output_dir).commit(&training_output()).await.expect("second");

        assert!(first.same_content(&second));
        assert_eq!(sibling_entries(root.path()), vec!["objects".to_string()]);
    }

    #[tokio::test]
    async fn failed_commit_leaves_previous_artifacts_in_place() {
        let root = TempDir::new().expect("temp dir");
        let output_dir = root.path().join("objects");
        let writer = ArtifactWriter::new(&output_dir);
        let good = writer.commit(&training_output()).await.expect("first commit");
        let csv_before =
            std::fs::read(output_dir.join(super::POPULARITY_FILE)).expect("csv before");

        let mut broken = training_output();
        broken.popularity.clear();
        broken.rules[0].lift = f64::NAN;
        let error = writer.commit(&broken).await.expect_err("NaN lift cannot be stored");

        assert!(matches!(
            error,
            ArtifactError::Repository(RepositoryError::InvalidRecord { position: 0, .. })
        ));
        assert_eq!(read_manifest(&output_dir).await.expect("manifest"), good);
        assert_eq!(
            std::fs::read(output_dir.join(super::POPULARITY_FILE)).expect("csv after"),
            csv_before
        );
        assert_eq!(sibling_entries(root.path()), vec!["objects".to_string()]);
    }

    #[tokio::test]
    async fn popularity_csv_has_the_expected_header() {
        let root = TempDir::new().expect("temp dir");
        let output_dir = root.path().join("objects");
        ArtifactWriter::new(&output_dir).commit(&training_output()).await.expect("commit");

        let csv = std::fs::read_to_string(output_dir.join(super::POPULARITY_FILE)).expect("csv");
        let mut lines = csv.lines();

        assert_eq!(lines.next(), Some("product,product_category,number_of_transactions"));
        assert_eq!(lines.next(), Some("Croissant,Bakery,2"));
    }
}
