use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mining::rules::RuleMetric;

pub const CONFIG_FILE_CANDIDATES: [&str; 2] = ["basketry.toml", "config/basketry.toml"];

pub const DEFAULT_ALLOWED_PRODUCTS: [&str; 18] = [
    "Cappuccino",
    "Latte",
    "Espresso shot",
    "Dark chocolate",
    "Sugar Free Vanilla syrup",
    "Chocolate syrup",
    "Carmel syrup",
    "Hazelnut syrup",
    "Ginger Scone",
    "Chocolate Croissant",
    "Jumbo Savory Scone",
    "Cranberry Scone",
    "Hazelnut Biscotti",
    "Croissant",
    "Almond Croissant",
    "Oatmeal Scone",
    "Chocolate Chip Biscotti",
    "Ginger Biscotti",
];

pub const DEFAULT_SIZE_SUFFIXES: [&str; 3] = [" Rg", " Sm", " Lg"];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub input: InputConfig,
    pub preparation: PreparationConfig,
    pub mining: MiningConfig,
    pub rules: RulesConfig,
    pub recommendations: RecommendationConfig,
    pub artifacts: ArtifactConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct InputConfig {
    pub transactions_path: PathBuf,
    pub catalog_path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct PreparationConfig {
    pub size_suffixes: Vec<String>,
    pub allowed_products: Vec<String>,
    pub min_items_per_transaction: usize,
}

#[derive(Clone, Debug)]
pub struct MiningConfig {
    pub min_support: f64,
    pub max_itemset_len: Option<usize>,
}

#[derive(Clone, Debug)]
pub struct RulesConfig {
    pub metric: RuleMetric,
    pub min_threshold: f64,
}

#[derive(Clone, Debug)]
pub struct RecommendationConfig {
    pub unknown_category: String,
}

#[derive(Clone, Debug)]
pub struct ArtifactConfig {
    pub output_dir: PathBuf,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub transactions_path: Option<PathBuf>,
    pub catalog_path: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub min_support: Option<f64>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            input: InputConfig {
                transactions_path: PathBuf::from("dataset/201904 sales reciepts.csv"),
                catalog_path: PathBuf::from("dataset/product.csv"),
            },
            preparation: PreparationConfig {
                size_suffixes: DEFAULT_SIZE_SUFFIXES.iter().map(|s| s.to_string()).collect(),
                allowed_products: DEFAULT_ALLOWED_PRODUCTS.iter().map(|s| s.to_string()).collect(),
                min_items_per_transaction: 2,
            },
            mining: MiningConfig { min_support: 0.05, max_itemset_len: None },
            rules: RulesConfig { metric: RuleMetric::Lift, min_threshold: 1.0 },
            recommendations: RecommendationConfig { unknown_category: "Unknown".to_string() },
            artifacts: ArtifactConfig { output_dir: PathBuf::from("api/recommendation_objects") },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options
                .config_path
                .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_CANDIDATES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(input) = patch.input {
            if let Some(transactions_path) = input.transactions_path {
                self.input.transactions_path = transactions_path;
            }
            if let Some(catalog_path) = input.catalog_path {
                self.input.catalog_path = catalog_path;
            }
        }

        if let Some(preparation) = patch.preparation {
            if let Some(size_suffixes) = preparation.size_suffixes {
                self.preparation.size_suffixes = size_suffixes;
            }
            if let Some(allowed_products) = preparation.allowed_products {
                self.preparation.allowed_products = allowed_products;
            }
            if let Some(min_items) = preparation.min_items_per_transaction {
                self.preparation.min_items_per_transaction = min_items;
            }
        }

        if let Some(mining) = patch.mining {
            if let Some(min_support) = mining.min_support {
                self.mining.min_support = min_support;
            }
            if let Some(max_itemset_len) = mining.max_itemset_len {
                self.mining.max_itemset_len = Some(max_itemset_len);
            }
        }

        if let Some(rules) = patch.rules {
            if let Some(metric) = rules.metric {
                self.rules.metric = metric;
            }
            if let Some(min_threshold) = rules.min_threshold {
                self.rules.min_threshold = min_threshold;
            }
        }

        if let Some(recommendations) = patch.recommendations {
            if let Some(unknown_category) = recommendations.unknown_category {
                self.recommendations.unknown_category = unknown_category;
            }
        }

        if let Some(artifacts) = patch.artifacts {
            if let Some(output_dir) = artifacts.output_dir {
                self.artifacts.output_dir = output_dir;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("BASKETRY_INPUT_TRANSACTIONS_PATH") {
            self.input.transactions_path = PathBuf::from(value);
        }
        if let Some(value) = read_env("BASKETRY_INPUT_CATALOG_PATH") {
            self.input.catalog_path = PathBuf::from(value);
        }

        if let Some(value) = read_env("BASKETRY_PREPARATION_ALLOWED_PRODUCTS") {
            self.preparation.allowed_products = split_list(&value);
        }
        if let Some(value) = read_env("BASKETRY_PREPARATION_MIN_ITEMS_PER_TRANSACTION") {
            self.preparation.min_items_per_transaction =
                parse_usize("BASKETRY_PREPARATION_MIN_ITEMS_PER_TRANSACTION", &value)?;
        }

        if let Some(value) = read_env("BASKETRY_MINING_MIN_SUPPORT") {
            self.mining.min_support = parse_f64("BASKETRY_MINING_MIN_SUPPORT", &value)?;
        }
        if let Some(value) = read_env("BASKETRY_MINING_MAX_ITEMSET_LEN") {
            self.mining.max_itemset_len =
                Some(parse_usize("BASKETRY_MINING_MAX_ITEMSET_LEN", &value)?);
        }

        if let Some(value) = read_env("BASKETRY_RULES_METRIC") {
            self.rules.metric = value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                key: "BASKETRY_RULES_METRIC".to_string(),
                value: value.clone(),
            })?;
        }
        if let Some(value) = read_env("BASKETRY_RULES_MIN_THRESHOLD") {
            self.rules.min_threshold = parse_f64("BASKETRY_RULES_MIN_THRESHOLD", &value)?;
        }

        if let Some(value) = read_env("BASKETRY_RECOMMENDATIONS_UNKNOWN_CATEGORY") {
            self.recommendations.unknown_category = value;
        }

        if let Some(value) = read_env("BASKETRY_ARTIFACTS_OUTPUT_DIR") {
            self.artifacts.output_dir = PathBuf::from(value);
        }

        let log_level =
            read_env("BASKETRY_LOGGING_LEVEL").or_else(|| read_env("BASKETRY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("BASKETRY_LOGGING_FORMAT").or_else(|| read_env("BASKETRY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(transactions_path) = overrides.transactions_path {
            self.input.transactions_path = transactions_path;
        }
        if let Some(catalog_path) = overrides.catalog_path {
            self.input.catalog_path = catalog_path;
        }
        if let Some(output_dir) = overrides.output_dir {
            self.artifacts.output_dir = output_dir;
        }
        if let Some(min_support) = overrides.min_support {
            self.mining.min_support = min_support;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_input(&self.input)?;
        validate_preparation(&self.preparation)?;
        validate_mining(&self.mining)?;
        validate_rules(&self.rules)?;
        validate_recommendations(&self.recommendations)?;
        validate_artifacts(&self.artifacts)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    CONFIG_FILE_CANDIDATES.iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_input(input: &InputConfig) -> Result<(), ConfigError> {
    if input.transactions_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "input.transactions_path must point at the sales receipts CSV".to_string(),
        ));
    }
    if input.catalog_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "input.catalog_path must point at the product catalog CSV".to_string(),
        ));
    }
    Ok(())
}

fn validate_preparation(preparation: &PreparationConfig) -> Result<(), ConfigError> {
    if preparation.size_suffixes.iter().any(|suffix| suffix.is_empty()) {
        return Err(ConfigError::Validation(
            "preparation.size_suffixes must not contain empty entries".to_string(),
        ));
    }

    if preparation.allowed_products.iter().all(|product| product.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "preparation.allowed_products must name at least one product".to_string(),
        ));
    }

    if preparation.min_items_per_transaction < 2 {
        return Err(ConfigError::Validation(format!(
            "preparation.min_items_per_transaction must be at least 2, got {}",
            preparation.min_items_per_transaction
        )));
    }

    Ok(())
}

fn validate_mining(mining: &MiningConfig) -> Result<(), ConfigError> {
    let support = mining.min_support;
    if !support.is_finite() || support <= 0.0 || support > 1.0 {
        return Err(ConfigError::Validation(format!(
            "mining.min_support must be in range (0, 1], got {support}"
        )));
    }

    if mining.max_itemset_len == Some(0) {
        return Err(ConfigError::Validation(
            "mining.max_itemset_len must be greater than zero when set".to_string(),
        ));
    }

    Ok(())
}

fn validate_rules(rules: &RulesConfig) -> Result<(), ConfigError> {
    rules.metric.validate_threshold(rules.min_threshold).map_err(|error| {
        ConfigError::Validation(format!("rules.min_threshold rejected: {error}"))
    })
}

fn validate_recommendations(recommendations: &RecommendationConfig) -> Result<(), ConfigError> {
    if recommendations.unknown_category.trim().is_empty() {
        return Err(ConfigError::Validation(
            "recommendations.unknown_category must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_artifacts(artifacts: &ArtifactConfig) -> Result<(), ConfigError> {
    if artifacts.output_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "artifacts.output_dir must name a directory".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.trim().parse::<f64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    input: Option<InputPatch>,
    preparation: Option<PreparationPatch>,
    mining: Option<MiningPatch>,
    rules: Option<RulesPatch>,
    recommendations: Option<RecommendationPatch>,
    artifacts: Option<ArtifactPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct InputPatch {
    transactions_path: Option<PathBuf>,
    catalog_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct PreparationPatch {
    size_suffixes: Option<Vec<String>>,
    allowed_products: Option<Vec<String>>,
    min_items_per_transaction: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct MiningPatch {
    min_support: Option<f64>,
    max_itemset_len: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct RulesPatch {
    metric: Option<RuleMetric>,
    min_threshold: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RecommendationPatch {
    unknown_category: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ArtifactPatch {
    output_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
