use std::collections::{HashMap, HashSet};

use rayon::prelude::*;

use crate::errors::DomainError;
use crate::mining::basket::{BasketSet, ItemIndex};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MiningParams {
    pub min_support: f64,
    pub max_len: Option<usize>,
}

impl MiningParams {
    pub fn new(min_support: f64) -> Result<Self, DomainError> {
        if !min_support.is_finite() || min_support <= 0.0 || min_support > 1.0 {
            return Err(DomainError::InvalidThreshold {
                name: "min_support".to_string(),
                value: min_support.to_string(),
                reason: "must be in range (0, 1]".to_string(),
            });
        }
        Ok(Self { min_support, max_len: None })
    }

    pub fn with_max_len(mut self, max_len: Option<usize>) -> Self {
        self.max_len = max_len;
        self
    }
}

impl Default for MiningParams {
    fn default() -> Self {
        Self { min_support: 0.05, max_len: None }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FrequentItemset {
    /// Sorted item indices.
    pub items: Vec<ItemIndex>,
    /// Number of baskets containing every item.
    pub count: usize,
    pub support: f64,
}

impl FrequentItemset {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// All itemsets that cleared the threshold, ordered by size and then lexicographically.
#[derive(Clone, Debug, Default)]
pub struct FrequentItemsets {
    itemsets: Vec<FrequentItemset>,
    support_index: HashMap<Vec<ItemIndex>, f64>,
    basket_count: usize,
}

impl FrequentItemsets {
    /// Wraps itemsets counted elsewhere; `basket_count` is the support denominator.
    pub fn from_itemsets(itemsets: Vec<FrequentItemset>, basket_count: usize) -> Self {
        let support_index =
            itemsets.iter().map(|itemset| (itemset.items.clone(), itemset.support)).collect();
        Self { itemsets, support_index, basket_count }
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrequentItemset> {
        self.itemsets.iter()
    }

    pub fn len(&self) -> usize {
        self.itemsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.itemsets.is_empty()
    }

    pub fn basket_count(&self) -> usize {
        self.basket_count
    }

    pub fn max_len(&self) -> usize {
        self.itemsets.iter().map(FrequentItemset::len).max().unwrap_or(0)
    }

    /// Support of a sorted itemset, if it was frequent.
    pub fn support_of(&self, items: &[ItemIndex]) -> Option<f64> {
        self.support_index.get(items).copied()
    }
}

/// Level-wise (Apriori) search. Level k candidates come only from joining frequent
/// (k-1)-itemsets that share a prefix; any candidate with an infrequent (k-1)-subset is
/// discarded before its support is counted.
#[derive(Clone, Debug, Default)]
pub struct AprioriMiner {
    params: MiningParams,
}

impl AprioriMiner {
    pub fn new(params: MiningParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &MiningParams {
        &self.params
    }

    pub fn mine(&self, baskets: &BasketSet) -> FrequentItemsets {
        let basket_count = baskets.len();
        if basket_count == 0 || baskets.universe().is_empty() {
            return FrequentItemsets::from_itemsets(Vec::new(), basket_count);
        }

        let singles = (0..baskets.universe().len()).map(|item| vec![item]).collect();
        let mut level = self.survivors(singles, baskets);
        let mut frequent = Vec::new();
        let mut size = 1;

        while !level.is_empty() {
            tracing::debug!(
                event_name = "pipeline.mine.level_completed",
                level = size,
                frequent = level.len(),
                "apriori level completed"
            );
            frequent.extend(level.iter().cloned());

            if self.params.max_len.is_some_and(|max_len| size >= max_len) {
                break;
            }

            let candidates = generate_candidates(&level);
            if candidates.is_empty() {
                break;
            }
            level = self.survivors(candidates, baskets);
            size += 1;
        }

        FrequentItemsets::from_itemsets(frequent, basket_count)
    }

    fn survivors(
        &self,
        candidates: Vec<Vec<ItemIndex>>,
        baskets: &BasketSet,
    ) -> Vec<FrequentItemset> {
        let total = baskets.len() as f64;
        let counts: Vec<usize> = candidates
            .par_iter()
            .map(|candidate| {
                baskets.baskets().iter().filter(|basket| basket.contains_all(candidate)).count()
            })
            .collect();

        candidates
            .into_iter()
            .zip(counts)
            .filter_map(|(items, count)| {
                let support = count as f64 / total;
                (support >= self.params.min_support)
                    .then_some(FrequentItemset { items, count, support })
            })
            .collect()
    }
}

/// Joins same-prefix pairs of a lexicographically sorted level and prunes every
/// candidate that has an infrequent subset. Output stays lexicographically sorted.
pub fn generate_candidates(level: &[FrequentItemset]) -> Vec<Vec<ItemIndex>> {
    let known: HashSet<&[ItemIndex]> = level.iter().map(|itemset| itemset.items.as_slice()).collect();
    let mut candidates = Vec::new();

    for (position, left) in level.iter().enumerate() {
        let Some((_, prefix)) = left.items.split_last() else {
            continue;
        };

        for right in &level[position + 1..] {
            if !right.items.starts_with(prefix) {
                break;
            }
            let Some(last) = right.items.last() else {
                continue;
            };

            let mut candidate = left.items.clone();
            candidate.push(*last);
            if all_subsets_frequent(&candidate, &known) {
                candidates.push(candidate);
            }
        }
    }

    candidates
}

fn all_subsets_frequent(candidate: &[ItemIndex], known: &HashSet<&[ItemIndex]>) -> bool {
    (0..candidate.len()).all(|skip| {
        let subset: Vec<ItemIndex> = candidate
            .iter()
            .enumerate()
            .filter(|(position, _)| *position != skip)
            .map(|(_, item)| *item)
            .collect();
        known.contains(subset.as_slice())
    })
}
