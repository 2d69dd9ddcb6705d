use std::path::{Path, PathBuf};
use std::time::Instant;

use basketry_core::config::{AppConfig, LoadOptions};
use basketry_core::pipeline::PipelineSettings;
use basketry_db::artifacts::ARTIFACT_FILES;
use clap::Args;
use serde::Serialize;
use uuid::Uuid;

use crate::commands::train::{self, TrainingReport};
use crate::commands::CommandResult;
use crate::logging;

#[derive(Debug, Clone, Default, Args)]
pub struct SmokeArgs {
    #[arg(long, help = "Path to a basketry.toml config file")]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: SmokeStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeCheck>,
}

const LATER_CHECKS: [&str; 4] =
    ["input_files", "first_training_run", "artifacts_present", "deterministic_rerun"];

/// Trains twice into a scratch directory and compares manifests. The configured output
/// directory is never touched.
pub fn run(args: &SmokeArgs) -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    let loaded = timed_check(|| {
        let config = AppConfig::load(LoadOptions {
            config_path: args.config.clone(),
            require_file: args.config.is_some(),
            ..LoadOptions::default()
        })
        .map_err(|error| error.to_string())?;
        PipelineSettings::from_config(&config).map_err(|error| error.to_string())?;
        Ok::<_, String>(config)
    });
    let config = match loaded {
        Ok((elapsed_ms, config)) => {
            checks.push(pass("config_validation", elapsed_ms, "configuration loaded and validated"));
            config
        }
        Err((elapsed_ms, error)) => {
            checks.push(fail("config_validation", elapsed_ms, error));
            checks.extend(LATER_CHECKS.iter().copied().map(skipped));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };
    logging::init(&config.logging);

    let inputs_started = Instant::now();
    let missing: Vec<String> = [&config.input.transactions_path, &config.input.catalog_path]
        .into_iter()
        .filter(|path| !path.is_file())
        .map(|path| path.display().to_string())
        .collect();
    let inputs_elapsed = inputs_started.elapsed().as_millis() as u64;
    if !missing.is_empty() {
        checks.push(fail("input_files", inputs_elapsed, format!("missing: {}", missing.join(", "))));
        checks.extend(LATER_CHECKS[1..].iter().copied().map(skipped));
        return finalize_report(checks, started.elapsed().as_millis() as u64);
    }
    checks.push(pass("input_files", inputs_elapsed, "transactions and catalog files are readable"));

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            checks.push(fail(
                "first_training_run",
                0,
                format!("failed to initialize async runtime: {error}"),
            ));
            checks.extend(LATER_CHECKS[2..].iter().copied().map(skipped));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let scratch = std::env::temp_dir().join(format!("basketry-smoke-{}", Uuid::new_v4()));
    let output_dir = scratch.join("recommendation_objects");
    run_training_checks(&config, &output_dir, &runtime, &mut checks);
    if let Err(error) = std::fs::remove_dir_all(&scratch) {
        tracing::warn!(
            event_name = "cli.smoke.cleanup_failed",
            scratch = %scratch.display(),
            error = %error,
            "smoke scratch directory left behind"
        );
    }

    finalize_report(checks, started.elapsed().as_millis() as u64)
}

fn run_training_checks(
    config: &AppConfig,
    output_dir: &Path,
    runtime: &tokio::runtime::Runtime,
    checks: &mut Vec<SmokeCheck>,
) {
    let first = match timed_check(|| train::execute(config, output_dir, runtime)) {
        Ok((elapsed_ms, report)) => {
            checks.push(pass("first_training_run", elapsed_ms, describe(&report)));
            report
        }
        Err((elapsed_ms, error)) => {
            checks.push(fail("first_training_run", elapsed_ms, error.to_string()));
            checks.extend(LATER_CHECKS[2..].iter().copied().map(skipped));
            return;
        }
    };

    let present_started = Instant::now();
    let empty_or_missing: Vec<&str> = ARTIFACT_FILES
        .into_iter()
        .filter(|file| {
            std::fs::metadata(output_dir.join(file)).map(|meta| meta.len() == 0).unwrap_or(true)
        })
        .collect();
    let present_elapsed = present_started.elapsed().as_millis() as u64;
    if empty_or_missing.is_empty() {
        checks.push(pass("artifacts_present", present_elapsed, "all artifacts written and non-empty"));
    } else {
        checks.push(fail(
            "artifacts_present",
            present_elapsed,
            format!("missing or empty: {}", empty_or_missing.join(", ")),
        ));
    }

    match timed_check(|| train::execute(config, output_dir, runtime)) {
        Ok((elapsed_ms, second)) if second.manifest.same_content(&first.manifest) => checks.push(pass(
            "deterministic_rerun",
            elapsed_ms,
            "second run reproduced every artifact digest",
        )),
        Ok((elapsed_ms, _)) => checks.push(fail(
            "deterministic_rerun",
            elapsed_ms,
            "second run produced different artifact digests",
        )),
        Err((elapsed_ms, error)) => {
            checks.push(fail("deterministic_rerun", elapsed_ms, error.to_string()))
        }
    }
}

fn describe(report: &TrainingReport) -> String {
    format!(
        "{} baskets, {} frequent itemsets, {} rules",
        report.summary.baskets, report.summary.frequent_itemsets, report.summary.rules
    )
}

fn timed_check<T, E>(check: impl FnOnce() -> Result<T, E>) -> Result<(u64, T), (u64, E)> {
    let started = Instant::now();
    match check() {
        Ok(value) => Ok((started.elapsed().as_millis() as u64, value)),
        Err(error) => Err((started.elapsed().as_millis() as u64, error)),
    }
}

fn pass(name: &'static str, elapsed_ms: u64, message: impl Into<String>) -> SmokeCheck {
    SmokeCheck { name, status: SmokeStatus::Pass, elapsed_ms, message: message.into() }
}

fn fail(name: &'static str, elapsed_ms: u64, message: impl Into<String>) -> SmokeCheck {
    SmokeCheck { name, status: SmokeStatus::Fail, elapsed_ms, message: message.into() }
}

fn skipped(name: &'static str) -> SmokeCheck {
    SmokeCheck {
        name,
        status: SmokeStatus::Skipped,
        elapsed_ms: 0,
        message: "skipped due previous failure".to_string(),
    }
}

fn finalize_report(checks: Vec<SmokeCheck>, total_elapsed_ms: u64) -> CommandResult {
    let passed = checks.iter().filter(|check| check.status == SmokeStatus::Pass).count();
    let total = checks.len();
    let failed = checks.iter().any(|check| check.status == SmokeStatus::Fail);

    let report = SmokeReport {
        command: "smoke",
        status: if failed { SmokeStatus::Fail } else { SmokeStatus::Pass },
        summary: format!("smoke: {passed}/{total} checks passed in {total_elapsed_ms}ms"),
        total_elapsed_ms,
        checks,
    };

    let human = report.summary.clone();
    let machine = serde_json::to_string(&report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"smoke\",\"status\":\"fail\",\"summary\":\"serialization failed\",\"error\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    });

    CommandResult { exit_code: if failed { 6 } else { 0 }, output: format!("{human}\n{machine}") }
}
