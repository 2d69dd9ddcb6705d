use std::fmt;

use serde::Serialize;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("{table} table is missing required column `{column}`")]
    MissingColumn { table: String, column: String },
    #[error("{table} table line {line}: {message}")]
    MalformedRow { table: String, line: u64, message: String },
    #[error("invalid threshold `{name}` = {value}: {reason}")]
    InvalidThreshold { name: String, value: String, reason: String },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("input failure: {0}")]
    Input(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Domain(DomainError::MissingColumn { .. })
            | Self::Domain(DomainError::MalformedRow { .. }) => "input_schema",
            Self::Domain(DomainError::InvalidThreshold { .. }) => "invalid_threshold",
            Self::Domain(DomainError::InvariantViolation(_)) => "invariant_violation",
            Self::Input(_) => "input_unavailable",
            Self::Persistence(_) => "persistence",
            Self::Configuration(_) => "configuration",
        }
    }
}

/// Stages of a training run that can fail, in execution order. Popularity counting,
/// basket encoding, mining and assembly are total over prepared rows and have no entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Ingest,
    Prepare,
    Rules,
    Persist,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Prepare => "prepare",
            Self::Rules => "rules",
            Self::Persist => "persist",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed run: which stage stopped it and the typed cause.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{stage} stage failed: {source}")]
pub struct StageFailure {
    pub stage: PipelineStage,
    pub source: ApplicationError,
}

impl StageFailure {
    pub fn new(stage: PipelineStage, source: impl Into<ApplicationError>) -> Self {
        Self { stage, source: source.into() }
    }

    pub fn error_class(&self) -> &'static str {
        self.source.error_class()
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, DomainError, PipelineStage, StageFailure};

    #[test]
    fn missing_column_is_classified_as_input_schema() {
        let failure = StageFailure::new(
            PipelineStage::Ingest,
            DomainError::MissingColumn {
                table: "transactions".to_owned(),
                column: "quantity".to_owned(),
            },
        );

        assert_eq!(failure.error_class(), "input_schema");
        assert_eq!(
            failure.to_string(),
            "ingest stage failed: transactions table is missing required column `quantity`"
        );
    }

    #[test]
    fn stage_failure_keeps_typed_source() {
        let failure = StageFailure::new(
            PipelineStage::Rules,
            DomainError::InvariantViolation("support missing for [0]".to_owned()),
        );

        assert_eq!(failure.stage, PipelineStage::Rules);
        assert!(matches!(
            failure.source,
            ApplicationError::Domain(DomainError::InvariantViolation(ref message))
                if message.contains("support missing")
        ));
    }

    #[test]
    fn persistence_failure_has_its_own_class() {
        let failure = StageFailure::new(
            PipelineStage::Persist,
            ApplicationError::Persistence("disk full".to_owned()),
        );

        assert_eq!(failure.error_class(), "persistence");
        assert_eq!(failure.stage.as_str(), "persist");
    }

    #[test]
    fn fallible_stages_serialize_in_run_order() {
        let stages = [
            PipelineStage::Ingest,
            PipelineStage::Prepare,
            PipelineStage::Rules,
            PipelineStage::Persist,
        ];

        let json = serde_json::to_string(&stages).expect("serialize");
        assert_eq!(json, r#"["ingest","prepare","rules","persist"]"#);
        assert!(stages.iter().all(|stage| json.contains(stage.as_str())));
    }
}
