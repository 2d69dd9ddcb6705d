use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use basketry_core::config::{AppConfig, LoadOptions};
use basketry_core::mining::canonical_key;
use basketry_core::recommend::{PopularityAggregator, PopularityRecord, Recommendation};
use basketry_db::artifacts::{read_manifest, read_popularity, read_recommendations};
use clap::Args;
use serde::Serialize;

use crate::commands::CommandResult;

const SUGGESTIONS_PER_KEY: usize = 3;

#[derive(Debug, Clone, Args)]
pub struct ShowArgs {
    #[arg(long, help = "Path to a basketry.toml config file")]
    pub config: Option<PathBuf>,
    #[arg(long, help = "Artifact directory to read instead of the configured one")]
    pub output_dir: Option<PathBuf>,
    #[arg(long = "product", help = "Antecedent product; repeat for multi-product keys")]
    pub products: Vec<String>,
    #[arg(long, default_value_t = 5, help = "Number of popular products and keys to list")]
    pub limit: usize,
}

impl Default for ShowArgs {
    fn default() -> Self {
        Self { config: None, output_dir: None, products: Vec::new(), limit: 5 }
    }
}

#[derive(Debug, Serialize)]
struct KeyedSuggestions {
    key: String,
    suggestions: Vec<Recommendation>,
}

#[derive(Debug, Serialize)]
struct ShowDetails {
    output_dir: String,
    recommendation_keys: usize,
    most_popular: Vec<PopularityRecord>,
    recommendations: Vec<KeyedSuggestions>,
}

pub fn run(args: &ShowArgs) -> CommandResult {
    let output_dir = match args.output_dir.clone() {
        Some(dir) => dir,
        None => match AppConfig::load(LoadOptions {
            config_path: args.config.clone(),
            require_file: args.config.is_some(),
            ..LoadOptions::default()
        }) {
            Ok(config) => config.artifacts.output_dir,
            Err(error) => {
                return CommandResult::failure(
                    "show",
                    "config_validation",
                    format!("config validation failed: {error}"),
                    2,
                );
            }
        },
    };

    match load_details(&output_dir, args) {
        Ok(details) => {
            let message = format!(
                "{} recommendation keys in `{}`",
                details.recommendation_keys, details.output_dir
            );
            CommandResult::success("show", message, details)
        }
        Err(error) => CommandResult::failure("show", "artifacts_unavailable", format!("{error:#}"), 6),
    }
}

fn load_details(output_dir: &Path, args: &ShowArgs) -> Result<ShowDetails> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to initialize async runtime")?;

    let (popularity, table) = runtime.block_on(async {
        read_manifest(output_dir)
            .await
            .with_context(|| format!("no artifact manifest in `{}`", output_dir.display()))?;
        let popularity = read_popularity(output_dir).await.context("reading popularity table")?;
        let table =
            read_recommendations(output_dir).await.context("reading recommendation table")?;
        Ok::<_, anyhow::Error>((popularity, table))
    })?;

    let recommendations = if args.products.is_empty() {
        table
            .iter()
            .take(args.limit)
            .map(|(key, list)| KeyedSuggestions {
                key: key.to_string(),
                suggestions: list.iter().take(SUGGESTIONS_PER_KEY).cloned().collect(),
            })
            .collect()
    } else {
        let key = lookup_key(&args.products);
        let suggestions = table.get(&key).map(<[Recommendation]>::to_vec).unwrap_or_default();
        vec![KeyedSuggestions { key, suggestions }]
    };

    Ok(ShowDetails {
        output_dir: output_dir.display().to_string(),
        recommendation_keys: table.len(),
        most_popular: PopularityAggregator::ranked(&popularity).into_iter().take(args.limit).collect(),
        recommendations,
    })
}

fn lookup_key(products: &[String]) -> String {
    let names: Vec<&str> = products.iter().map(|product| product.trim()).collect();
    canonical_key(&names)
}

#[cfg(test)]
mod tests {
    use super::lookup_key;

    #[test]
    fn product_order_does_not_change_the_lookup_key() {
        let forward = lookup_key(&["Latte".to_string(), "Croissant".to_string()]);
        let reverse = lookup_key(&[" Croissant".to_string(), "Latte".to_string()]);

        assert_eq!(forward, "Croissant_Latte");
        assert_eq!(forward, reverse);
    }
}
