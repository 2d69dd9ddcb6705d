use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::receipt::PreparedRow;
use crate::mining::basket::ItemUniverse;
use crate::mining::rules::AssociationRule;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub product: String,
    pub product_category: String,
    pub confidence: f64,
}

/// Antecedent key (sorted names joined by `_`) to its ranked, de-duplicated suggestions.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecommendationTable(BTreeMap<String, Vec<Recommendation>>);

impl RecommendationTable {
    pub fn get(&self, key: &str) -> Option<&[Recommendation]> {
        self.0.get(key).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Recommendation])> {
        self.0.iter().map(|(key, list)| (key.as_str(), list.as_slice()))
    }

    pub fn recommendation_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }
}

impl FromIterator<(String, Vec<Recommendation>)> for RecommendationTable {
    fn from_iter<I: IntoIterator<Item = (String, Vec<Recommendation>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Product name to category, falling back to a sentinel for names it has never seen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategoryLookup {
    categories: BTreeMap<String, String>,
    unknown: String,
}

impl CategoryLookup {
    pub fn new(categories: BTreeMap<String, String>, unknown: impl Into<String>) -> Self {
        Self { categories, unknown: unknown.into() }
    }

    /// Last row wins when a product appears under more than one category.
    pub fn from_rows(rows: &[PreparedRow], unknown: impl Into<String>) -> Self {
        Self::new(crate::prepare::category_lookup(rows), unknown)
    }

    pub fn category_of(&self, product: &str) -> &str {
        self.categories.get(product).map(String::as_str).unwrap_or(&self.unknown)
    }
}

#[derive(Clone, Debug)]
pub struct RecommendationAssembler {
    categories: CategoryLookup,
}

impl RecommendationAssembler {
    pub fn new(categories: CategoryLookup) -> Self {
        Self { categories }
    }

    pub fn assemble(&self, rules: &[AssociationRule], universe: &ItemUniverse) -> RecommendationTable {
        let mut grouped: BTreeMap<String, Vec<&AssociationRule>> = BTreeMap::new();
        for rule in rules {
            grouped.entry(universe.canonical_key(&rule.antecedent)).or_default().push(rule);
        }

        grouped
            .into_iter()
            .map(|(key, mut group)| {
                group.sort_by(|left, right| {
                    right
                        .confidence
                        .partial_cmp(&left.confidence)
                        .unwrap_or(Ordering::Equal)
                        .then_with(|| {
                            universe
                                .canonical_key(&left.consequent)
                                .cmp(&universe.canonical_key(&right.consequent))
                        })
                });
                (key, self.flatten(&group, universe))
            })
            .collect()
    }

    /// Walks consequents in rank order; a product keeps the confidence of its first rule.
    fn flatten(&self, ranked: &[&AssociationRule], universe: &ItemUniverse) -> Vec<Recommendation> {
        let mut seen = HashSet::new();
        let mut recommendations = Vec::new();

        for rule in ranked {
            for product in universe.names(&rule.consequent) {
                if !seen.insert(product.clone()) {
                    continue;
                }
                let product_category = self.categories.category_of(&product).to_string();
                recommendations.push(Recommendation {
                    product,
                    product_category,
                    confidence: rule.confidence,
                });
            }
        }

        recommendations
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{CategoryLookup, RecommendationAssembler};
    use crate::mining::basket::ItemUniverse;
    use crate::mining::rules::AssociationRule;

    fn universe() -> ItemUniverse {
        // 0 Croissant, 1 Espresso shot, 2 Latte, 3 Scone
        ItemUniverse::new(["Latte", "Croissant", "Espresso shot", "Scone"].map(String::from))
    }

    fn rule(antecedent: &[usize], consequent: &[usize], confidence: f64) -> AssociationRule {
        AssociationRule {
            antecedent: antecedent.to_vec(),
            consequent: consequent.to_vec(),
            antecedent_support: 0.5,
            consequent_support: 0.5,
            support: 0.5 * confidence,
            confidence,
            lift: confidence / 0.5,
            leverage: 0.0,
            conviction: None,
        }
    }

    fn assembler() -> RecommendationAssembler {
        let categories = BTreeMap::from([
            ("Latte".to_string(), "Coffee".to_string()),
            ("Croissant".to_string(), "Bakery".to_string()),
            ("Espresso shot".to_string(), "Coffee".to_string()),
        ]);
        RecommendationAssembler::new(CategoryLookup::new(categories, "Unknown"))
    }

    #[test]
    fn consequents_are_ranked_and_deduplicated() {
        let rules = vec![
            rule(&[2], &[0], 0.6),
            rule(&[2], &[0, 1], 0.8),
            rule(&[2], &[1], 0.7),
        ];

        let table = assembler().assemble(&rules, &universe());
        let latte = table.get("Latte").expect("Latte key");

        let products: Vec<&str> = latte.iter().map(|entry| entry.product.as_str()).collect();
        assert_eq!(products, vec!["Croissant", "Espresso shot"]);
        assert!(latte.iter().all(|entry| entry.confidence == 0.8));
    }

    #[test]
    fn antecedent_key_is_sorted_and_joined() {
        let table = assembler().assemble(&[rule(&[2, 0], &[1], 0.9)], &universe());

        assert_eq!(table.keys().collect::<Vec<_>>(), vec!["Croissant_Latte"]);
    }

    #[test]
    fn unmapped_product_gets_the_sentinel_category() {
        let table = assembler().assemble(&[rule(&[2], &[3], 0.5)], &universe());

        let latte = table.get("Latte").expect("Latte key");
        assert_eq!(latte[0].product, "Scone");
        assert_eq!(latte[0].product_category, "Unknown");
    }

    #[test]
    fn equal_confidence_breaks_ties_on_consequent_name() {
        let rules = vec![rule(&[2], &[3], 0.5), rule(&[2], &[1], 0.5), rule(&[2], &[0], 0.5)];

        let table = assembler().assemble(&rules, &universe());
        let products: Vec<&str> =
            table.get("Latte").expect("Latte key").iter().map(|entry| entry.product.as_str()).collect();

        assert_eq!(products, vec!["Croissant", "Espresso shot", "Scone"]);
    }

    #[test]
    fn no_rules_yield_an_empty_table() {
        let table = assembler().assemble(&[], &universe());
        assert!(table.is_empty());
        assert_eq!(table.recommendation_count(), 0);
    }

    #[test]
    fn table_serializes_as_a_plain_object() {
        let table = assembler().assemble(&[rule(&[2], &[0], 1.0)], &universe());
        let json = serde_json::to_value(&table).expect("serialize");

        assert_eq!(
            json,
            serde_json::json!({
                "Latte": [{"product": "Croissant", "product_category": "Bakery", "confidence": 1.0}]
            })
        );
    }
}
