use async_trait::async_trait;
use thiserror::Error;

use basketry_core::pipeline::RuleRecord;

pub mod memory;
pub mod rules;

pub use memory::InMemoryRuleTableRepository;
pub use rules::SqlRuleTableRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("rule {position} cannot be stored: {reason}")]
    InvalidRecord { position: usize, reason: String },
}

/// Persisted association rules, kept in generation order.
#[async_trait]
pub trait RuleTableRepository: Send + Sync {
    /// Swaps the whole table for `rules` in one transaction.
    async fn replace_all(&self, rules: &[RuleRecord]) -> Result<(), RepositoryError>;

    async fn list_all(&self) -> Result<Vec<RuleRecord>, RepositoryError>;

    /// Rules whose antecedent is exactly this set of products, in any order.
    async fn list_by_antecedent(
        &self,
        antecedents: &[String],
    ) -> Result<Vec<RuleRecord>, RepositoryError>;
}

/// NaN or infinite metrics and empty sides would not survive a round trip through SQLite.
pub(crate) fn check_storable(position: usize, rule: &RuleRecord) -> Result<(), RepositoryError> {
    if rule.antecedents.is_empty() || rule.consequents.is_empty() {
        return Err(RepositoryError::InvalidRecord {
            position,
            reason: "antecedents and consequents must both be non-empty".to_string(),
        });
    }

    let metrics = [
        ("antecedent_support", rule.antecedent_support),
        ("consequent_support", rule.consequent_support),
        ("support", rule.support),
        ("confidence", rule.confidence),
        ("lift", rule.lift),
        ("leverage", rule.leverage),
        ("conviction", rule.conviction.unwrap_or(0.0)),
    ];
    if let Some((name, value)) = metrics.iter().find(|(_, value)| !value.is_finite()) {
        return Err(RepositoryError::InvalidRecord {
            position,
            reason: format!("{name} is not a finite number ({value})"),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use basketry_core::pipeline::RuleRecord;

    use super::{check_storable, RepositoryError};

    pub(crate) fn record(antecedents: &[&str], consequents: &[&str], confidence: f64) -> RuleRecord {
        RuleRecord {
            antecedents: antecedents.iter().map(|name| name.to_string()).collect(),
            consequents: consequents.iter().map(|name| name.to_string()).collect(),
            antecedent_support: 0.5,
            consequent_support: 0.4,
            support: 0.5 * confidence,
            confidence,
            lift: confidence / 0.4,
            leverage: 0.5 * confidence - 0.2,
            conviction: (confidence < 1.0).then(|| 0.6 / (1.0 - confidence)),
        }
    }

    #[test]
    fn non_finite_metric_is_rejected() {
        let mut rule = record(&["Latte"], &["Croissant"], 0.8);
        assert!(check_storable(0, &rule).is_ok());

        rule.lift = f64::NAN;
        assert!(matches!(
            check_storable(3, &rule),
            Err(RepositoryError::InvalidRecord { position: 3, ref reason }) if reason.contains("lift")
        ));
    }
}
