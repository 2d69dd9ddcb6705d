//! Frequent-itemset mining and association rules over transaction baskets.
//!
//! Items are addressed by their position in a sorted [`basket::ItemUniverse`], so every
//! itemset kept as a sorted index list is already in canonical (name) order.

pub mod basket;
pub mod itemsets;
pub mod rules;

pub use basket::{Basket, BasketEncoder, BasketSet, ItemIndex, ItemUniverse};
pub use itemsets::{AprioriMiner, FrequentItemset, FrequentItemsets, MiningParams};
pub use rules::{AssociationRule, RuleFilter, RuleGenerator, RuleMetric};

/// Separator used when a set of product names becomes a single key.
pub const KEY_SEPARATOR: &str = "_";

/// Sorted names joined by [`KEY_SEPARATOR`]. Recommendation keys, stored rule keys and
/// lookups all go through here so the same product set always maps to the same key.
pub fn canonical_key<S: AsRef<str>>(names: &[S]) -> String {
    let mut sorted: Vec<&str> = names.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();
    sorted.join(KEY_SEPARATOR)
}
