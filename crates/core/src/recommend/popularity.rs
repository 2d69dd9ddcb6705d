use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::receipt::PreparedRow;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopularityRecord {
    pub product: String,
    pub product_category: String,
    pub number_of_transactions: u64,
}

pub struct PopularityAggregator;

impl PopularityAggregator {
    /// One record per `(product, category)` pair, ordered by that pair. Each prepared row
    /// counts once regardless of its quantity.
    pub fn aggregate(rows: &[PreparedRow]) -> Vec<PopularityRecord> {
        let mut counts: BTreeMap<(&str, &str), u64> = BTreeMap::new();
        for row in rows {
            *counts.entry((row.product.as_str(), row.product_category.as_str())).or_default() += 1;
        }

        counts
            .into_iter()
            .map(|((product, product_category), number_of_transactions)| PopularityRecord {
                product: product.to_string(),
                product_category: product_category.to_string(),
                number_of_transactions,
            })
            .collect()
    }

    /// Most frequent first; equal counts fall back to product name.
    pub fn ranked(records: &[PopularityRecord]) -> Vec<PopularityRecord> {
        let mut ranked = records.to_vec();
        ranked.sort_by(|left, right| {
            right
                .number_of_transactions
                .cmp(&left.number_of_transactions)
                .then_with(|| left.product.cmp(&right.product))
                .then_with(|| left.product_category.cmp(&right.product_category))
        });
        ranked
    }
}
