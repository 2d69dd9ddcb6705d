use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use basketry_core::config::{resolve_config_path, AppConfig, LoadOptions};
use clap::Args;
use serde::Serialize;
use toml::Value;

use crate::commands::CommandResult;

#[derive(Debug, Clone, Default, Args)]
pub struct ConfigArgs {
    #[arg(long, help = "Path to a basketry.toml config file")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct ConfigEntry {
    pub key: &'static str,
    pub value: String,
    pub source: String,
}

pub fn run(args: &ConfigArgs) -> CommandResult {
    let config = match AppConfig::load(LoadOptions {
        config_path: args.config.clone(),
        require_file: args.config.is_some(),
        ..LoadOptions::default()
    }) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            );
        }
    };

    let config_file_path = resolve_config_path(args.config.as_deref());
    let doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, doc.as_ref(), config_file_path.as_deref())
    };

    let entries = vec![
        entry(
            "input.transactions_path",
            config.input.transactions_path.display().to_string(),
            source("input.transactions_path", &["BASKETRY_INPUT_TRANSACTIONS_PATH"]),
        ),
        entry(
            "input.catalog_path",
            config.input.catalog_path.display().to_string(),
            source("input.catalog_path", &["BASKETRY_INPUT_CATALOG_PATH"]),
        ),
        entry(
            "preparation.size_suffixes",
            format!("{:?}", config.preparation.size_suffixes),
            source("preparation.size_suffixes", &[]),
        ),
        entry(
            "preparation.allowed_products",
            format!("{} products", config.preparation.allowed_products.len()),
            source("preparation.allowed_products", &["BASKETRY_PREPARATION_ALLOWED_PRODUCTS"]),
        ),
        entry(
            "preparation.min_items_per_transaction",
            config.preparation.min_items_per_transaction.to_string(),
            source(
                "preparation.min_items_per_transaction",
                &["BASKETRY_PREPARATION_MIN_ITEMS_PER_TRANSACTION"],
            ),
        ),
        entry(
            "mining.min_support",
            config.mining.min_support.to_string(),
            source("mining.min_support", &["BASKETRY_MINING_MIN_SUPPORT"]),
        ),
        entry(
            "mining.max_itemset_len",
            config
                .mining
                .max_itemset_len
                .map(|len| len.to_string())
                .unwrap_or_else(|| "<unbounded>".to_string()),
            source("mining.max_itemset_len", &["BASKETRY_MINING_MAX_ITEMSET_LEN"]),
        ),
        entry(
            "rules.metric",
            config.rules.metric.to_string(),
            source("rules.metric", &["BASKETRY_RULES_METRIC"]),
        ),
        entry(
            "rules.min_threshold",
            config.rules.min_threshold.to_string(),
            source("rules.min_threshold", &["BASKETRY_RULES_MIN_THRESHOLD"]),
        ),
        entry(
            "recommendations.unknown_category",
            config.recommendations.unknown_category.clone(),
            source(
                "recommendations.unknown_category",
                &["BASKETRY_RECOMMENDATIONS_UNKNOWN_CATEGORY"],
            ),
        ),
        entry(
            "artifacts.output_dir",
            config.artifacts.output_dir.display().to_string(),
            source("artifacts.output_dir", &["BASKETRY_ARTIFACTS_OUTPUT_DIR"]),
        ),
        entry(
            "logging.level",
            config.logging.level.clone(),
            source("logging.level", &["BASKETRY_LOGGING_LEVEL", "BASKETRY_LOG_LEVEL"]),
        ),
        entry(
            "logging.format",
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
            source("logging.format", &["BASKETRY_LOGGING_FORMAT", "BASKETRY_LOG_FORMAT"]),
        ),
    ];

    CommandResult::success(
        "config",
        "effective config (source precedence: env > file > default)",
        entries,
    )
}

fn entry(key: &'static str, value: String, source: String) -> ConfigEntry {
    ConfigEntry { key, value, source }
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    // Blank values are ignored by the loader, so they do not count as a source.
    let is_set = |key: &str| env::var(key).is_ok_and(|value| !value.trim().is_empty());
    if let Some(env_key) = env_keys.iter().find(|key| is_set(key)) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}
