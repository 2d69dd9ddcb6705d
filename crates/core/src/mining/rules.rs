use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::mining::basket::ItemIndex;
use crate::mining::itemsets::{FrequentItemset, FrequentItemsets};

/// Largest itemset whose antecedent splits are enumerated with a 64-bit mask.
const MAX_SPLIT_ITEMS: usize = 63;

/// Metric a rule must reach to be kept.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleMetric {
    Support,
    Confidence,
    Lift,
    Leverage,
    Conviction,
}

impl RuleMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Support => "support",
            Self::Confidence => "confidence",
            Self::Lift => "lift",
            Self::Leverage => "leverage",
            Self::Conviction => "conviction",
        }
    }

    pub fn validate_threshold(&self, threshold: f64) -> Result<(), DomainError> {
        let (valid, range) = match self {
            Self::Support | Self::Confidence => ((0.0..=1.0).contains(&threshold), "[0, 1]"),
            Self::Lift | Self::Conviction => (threshold.is_finite() && threshold >= 0.0, ">= 0"),
            Self::Leverage => ((-1.0..=1.0).contains(&threshold), "[-1, 1]"),
        };

        if valid {
            Ok(())
        } else {
            Err(DomainError::InvalidThreshold {
                name: self.as_str().to_string(),
                value: threshold.to_string(),
                reason: format!("{} threshold must be {range}", self.as_str()),
            })
        }
    }
}

impl fmt::Display for RuleMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleMetric {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "support" => Ok(Self::Support),
            "confidence" => Ok(Self::Confidence),
            "lift" => Ok(Self::Lift),
            "leverage" => Ok(Self::Leverage),
            "conviction" => Ok(Self::Conviction),
            other => Err(DomainError::InvalidThreshold {
                name: "metric".to_string(),
                value: other.to_string(),
                reason: "expected support|confidence|lift|leverage|conviction".to_string(),
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RuleFilter {
    pub metric: RuleMetric,
    pub min_threshold: f64,
}

impl RuleFilter {
    pub fn new(metric: RuleMetric, min_threshold: f64) -> Result<Self, DomainError> {
        metric.validate_threshold(min_threshold)?;
        Ok(Self { metric, min_threshold })
    }

    pub fn accepts(&self, rule: &AssociationRule) -> bool {
        rule.metric(self.metric) >= self.min_threshold
    }
}

impl Default for RuleFilter {
    fn default() -> Self {
        Self { metric: RuleMetric::Lift, min_threshold: 1.0 }
    }
}

/// A directed rule `antecedent -> consequent` between two disjoint, sorted itemsets.
#[derive(Clone, Debug, PartialEq)]
pub struct AssociationRule {
    pub antecedent: Vec<ItemIndex>,
    pub consequent: Vec<ItemIndex>,
    pub antecedent_support: f64,
    pub consequent_support: f64,
    pub support: f64,
    pub confidence: f64,
    pub lift: f64,
    pub leverage: f64,
    /// `None` when confidence is 1 and conviction is unbounded.
    pub conviction: Option<f64>,
}

impl AssociationRule {
    pub fn score(
        antecedent: Vec<ItemIndex>,
        consequent: Vec<ItemIndex>,
        support: f64,
        antecedent_support: f64,
        consequent_support: f64,
    ) -> Self {
        let confidence = support / antecedent_support;
        let lift = confidence / consequent_support;
        let leverage = support - antecedent_support * consequent_support;
        let conviction = (confidence < 1.0).then(|| (1.0 - consequent_support) / (1.0 - confidence));

        Self {
            antecedent,
            consequent,
            antecedent_support,
            consequent_support,
            support,
            confidence,
            lift,
            leverage,
            conviction,
        }
    }

    pub fn metric(&self, metric: RuleMetric) -> f64 {
        match metric {
            RuleMetric::Support => self.support,
            RuleMetric::Confidence => self.confidence,
            RuleMetric::Lift => self.lift,
            RuleMetric::Leverage => self.leverage,
            RuleMetric::Conviction => self.conviction.unwrap_or(f64::INFINITY),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct RuleGenerator {
    filter: RuleFilter,
}

impl RuleGenerator {
    pub fn new(filter: RuleFilter) -> Self {
        Self { filter }
    }

    /// Scores every antecedent/consequent split of every frequent itemset with two or more
    /// items, then keeps the rules that pass the filter. No split is pruned early.
    pub fn generate(
        &self,
        itemsets: &FrequentItemsets,
    ) -> Result<Vec<AssociationRule>, DomainError> {
        let mut rules = Vec::new();
        let mut evaluated = 0usize;

        for itemset in itemsets.iter().filter(|itemset| itemset.len() >= 2) {
            for (antecedent, consequent) in splits(itemset)? {
                evaluated += 1;
                let antecedent_support = lookup_support(itemsets, &antecedent)?;
                let consequent_support = lookup_support(itemsets, &consequent)?;
                let rule = AssociationRule::score(
                    antecedent,
                    consequent,
                    itemset.support,
                    antecedent_support,
                    consequent_support,
                );
                if self.filter.accepts(&rule) {
                    rules.push(rule);
                }
            }
        }

        tracing::debug!(
            event_name = "pipeline.rules.filtered",
            evaluated,
            kept = rules.len(),
            metric = self.filter.metric.as_str(),
            min_threshold = self.filter.min_threshold,
            "association rules scored"
        );

        Ok(rules)
    }
}

/// The 2^n - 2 ways to split an itemset into non-empty antecedent and consequent,
/// ordered by antecedent size and then by antecedent items.
fn splits(itemset: &FrequentItemset) -> Result<Vec<(Vec<ItemIndex>, Vec<ItemIndex>)>, DomainError> {
    let size = itemset.len();
    if size > MAX_SPLIT_ITEMS {
        return Err(DomainError::InvariantViolation(format!(
            "itemset of {size} items is too large to enumerate rules for"
        )));
    }

    let full: u64 = (1u64 << size) - 1;
    let mut splits: Vec<(Vec<ItemIndex>, Vec<ItemIndex>)> = (1..full)
        .map(|mask| {
            let (antecedent, consequent): (Vec<(usize, &ItemIndex)>, Vec<(usize, &ItemIndex)>) =
                itemset.items.iter().enumerate().partition(|(bit, _)| mask & (1u64 << *bit) != 0);
            (
                antecedent.into_iter().map(|(_, item)| *item).collect(),
                consequent.into_iter().map(|(_, item)| *item).collect(),
            )
        })
        .collect();
    splits.sort_by(|left, right| left.0.len().cmp(&right.0.len()).then_with(|| left.0.cmp(&right.0)));
    Ok(splits)
}

fn lookup_support(itemsets: &FrequentItemsets, items: &[ItemIndex]) -> Result<f64, DomainError> {
    itemsets.support_of(items).ok_or_else(|| {
        DomainError::InvariantViolation(format!(
            "subset {items:?} of a frequent itemset has no recorded support"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::{AssociationRule, RuleFilter, RuleGenerator, RuleMetric};
    use crate::errors::DomainError;
    use crate::mining::itemsets::{FrequentItemset, FrequentItemsets};

    fn itemset(items: &[usize], count: usize, total: usize) -> FrequentItemset {
        FrequentItemset { items: items.to_vec(), count, support: count as f64 / total as f64 }
    }

    fn keep_everything() -> RuleGenerator {
        RuleGenerator::new(RuleFilter::new(RuleMetric::Support, 0.0).expect("filter"))
    }

    #[test]
    fn always_together_pair_has_unit_confidence_and_lift() {
        let itemsets = FrequentItemsets::from_itemsets(
            vec![itemset(&[0], 2, 2), itemset(&[1], 2, 2), itemset(&[0, 1], 2, 2)],
            2,
        );

        let rules = RuleGenerator::default().generate(&itemsets).expect("rules");

        assert_eq!(rules.len(), 2);
        let forward = &rules[0];
        assert_eq!(forward.antecedent, vec![0]);
        assert_eq!(forward.consequent, vec![1]);
        assert_eq!(forward.confidence, 1.0);
        assert_eq!(forward.lift, 1.0);
        assert_eq!(forward.leverage, 0.0);
        assert_eq!(forward.conviction, None);
    }

    #[test]
    fn every_split_is_evaluated() {
        let itemsets = FrequentItemsets::from_itemsets(
            vec![
                itemset(&[0], 4, 4),
                itemset(&[1], 4, 4),
                itemset(&[2], 4, 4),
                itemset(&[0, 1], 4, 4),
                itemset(&[0, 2], 4, 4),
                itemset(&[1, 2], 4, 4),
                itemset(&[0, 1, 2], 4, 4),
            ],
            4,
        );

        let rules = keep_everything().generate(&itemsets).expect("rules");

        // three pairs give 2 rules each, the triple gives 2^3 - 2
        assert_eq!(rules.len(), 12);
        let from_triple: Vec<(Vec<usize>, Vec<usize>)> = rules[6..]
            .iter()
            .map(|rule| (rule.antecedent.clone(), rule.consequent.clone()))
            .collect();
        assert_eq!(
            from_triple,
            vec![
                (vec![0], vec![1, 2]),
                (vec![1], vec![0, 2]),
                (vec![2], vec![0, 1]),
                (vec![0, 1], vec![2]),
                (vec![0, 2], vec![1]),
                (vec![1, 2], vec![0]),
            ]
        );
    }

    #[test]
    fn lift_below_threshold_is_discarded() {
        // A in 3/4, B in 3/4, AB in 2/4: lift = (2/3) / (3/4) < 1
        let itemsets = FrequentItemsets::from_itemsets(
            vec![itemset(&[0], 3, 4), itemset(&[1], 3, 4), itemset(&[0, 1], 2, 4)],
            4,
        );

        let rules = RuleGenerator::default().generate(&itemsets).expect("rules");
        assert!(rules.is_empty());

        let all = keep_everything().generate(&itemsets).expect("rules");
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|rule| rule.lift < 1.0 && rule.leverage < 0.0));
    }

    #[test]
    fn conviction_is_finite_below_unit_confidence() {
        let rule = AssociationRule::score(vec![0], vec![1], 0.25, 0.5, 0.5);

        assert_eq!(rule.confidence, 0.5);
        assert_eq!(rule.lift, 1.0);
        assert_eq!(rule.conviction, Some(1.0));
        assert_eq!(rule.metric(RuleMetric::Conviction), 1.0);
    }

    #[test]
    fn missing_subset_support_is_an_invariant_violation() {
        let itemsets =
            FrequentItemsets::from_itemsets(vec![itemset(&[0], 2, 2), itemset(&[0, 1], 2, 2)], 2);

        let error = RuleGenerator::default().generate(&itemsets).expect_err("missing [1]");
        assert!(matches!(error, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn metric_names_parse_and_thresholds_are_checked() {
        assert_eq!("Lift".parse::<RuleMetric>(), Ok(RuleMetric::Lift));
        assert_eq!(" conviction ".parse::<RuleMetric>(), Ok(RuleMetric::Conviction));
        assert!("zhang".parse::<RuleMetric>().is_err());

        assert!(RuleFilter::new(RuleMetric::Confidence, 0.6).is_ok());
        assert!(RuleFilter::new(RuleMetric::Confidence, 1.5).is_err());
        assert!(RuleFilter::new(RuleMetric::Lift, -1.0).is_err());
        assert!(RuleFilter::new(RuleMetric::Lift, f64::NAN).is_err());
        assert!(RuleFilter::new(RuleMetric::Leverage, -0.1).is_ok());
    }
}
