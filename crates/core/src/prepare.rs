//! Turns raw receipts into the filtered rows the miner and the popularity count consume.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use crate::config::PreparationConfig;
use crate::domain::catalog::Catalog;
use crate::domain::receipt::{PreparedRow, SalesReceipt, TransactionKey};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparationRules {
    size_suffixes: Vec<String>,
    allowed_products: BTreeSet<String>,
    min_items_per_transaction: usize,
}

impl PreparationRules {
    pub fn new(
        size_suffixes: Vec<String>,
        allowed_products: impl IntoIterator<Item = String>,
        min_items_per_transaction: usize,
    ) -> Self {
        Self {
            size_suffixes,
            allowed_products: allowed_products.into_iter().collect(),
            min_items_per_transaction,
        }
    }

    pub fn from_config(config: &PreparationConfig) -> Self {
        Self::new(
            config.size_suffixes.clone(),
            config.allowed_products.iter().cloned(),
            config.min_items_per_transaction,
        )
    }

    /// Strips trailing size tokens (repeatedly, so `"Latte Rg Lg"` also collapses).
    pub fn normalize_product_name(&self, name: &str) -> String {
        let mut normalized = name.trim_end();
        loop {
            let stripped = self
                .size_suffixes
                .iter()
                .find_map(|suffix| normalized.strip_suffix(suffix.as_str()));
            match stripped {
                Some(rest) => normalized = rest.trim_end(),
                None => break,
            }
        }
        normalized.to_string()
    }

    pub fn is_allowed(&self, product: &str) -> bool {
        self.allowed_products.contains(product)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PreparationStats {
    pub receipts_read: usize,
    pub unmatched_products: usize,
    pub outside_allow_list: usize,
    pub transactions_dropped: usize,
    pub rows_retained: usize,
    pub transactions_retained: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PreparedDataset {
    pub rows: Vec<PreparedRow>,
    pub stats: PreparationStats,
}

/// Joins receipts to the catalog, normalizes names, applies the allow-list, then drops
/// transactions with fewer rows than the configured minimum. Rows are counted, not
/// distinct products: two Latte lines keep a transaction alive.
pub fn prepare(
    receipts: &[SalesReceipt],
    catalog: &Catalog,
    rules: &PreparationRules,
) -> PreparedDataset {
    let mut stats = PreparationStats { receipts_read: receipts.len(), ..Default::default() };
    let mut candidates = Vec::with_capacity(receipts.len());

    for receipt in receipts {
        let Some(entry) = catalog.find(&receipt.product_id) else {
            stats.unmatched_products += 1;
            continue;
        };

        let product = rules.normalize_product_name(&entry.product);
        if !rules.is_allowed(&product) {
            stats.outside_allow_list += 1;
            continue;
        }

        candidates.push(PreparedRow::new(
            receipt.transaction_key(),
            product,
            entry.product_category.clone(),
            receipt.quantity,
        ));
    }

    let mut rows_per_transaction: HashMap<&TransactionKey, usize> = HashMap::new();
    for row in &candidates {
        *rows_per_transaction.entry(&row.transaction).or_default() += 1;
    }

    let retained: BTreeSet<TransactionKey> = rows_per_transaction
        .iter()
        .filter(|(_, count)| **count >= rules.min_items_per_transaction)
        .map(|(key, _)| (*key).clone())
        .collect();
    stats.transactions_dropped = rows_per_transaction.len() - retained.len();
    stats.transactions_retained = retained.len();

    let rows: Vec<PreparedRow> =
        candidates.into_iter().filter(|row| retained.contains(&row.transaction)).collect();
    stats.rows_retained = rows.len();

    PreparedDataset { rows, stats }
}

/// Product → category lookup over the prepared rows. When one normalized product shows up
/// under several categories the last row seen wins.
pub fn category_lookup(rows: &[PreparedRow]) -> BTreeMap<String, String> {
    let mut categories = BTreeMap::new();
    for row in rows {
        categories.insert(row.product.clone(), row.product_category.clone());
    }
    categories
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{category_lookup, prepare, PreparationRules};
    use crate::domain::catalog::{Catalog, CatalogEntry, ProductId};
    use crate::domain::receipt::{SalesReceipt, TransactionKey};

    fn rules() -> PreparationRules {
        PreparationRules::new(
            vec![" Rg".to_string(), " Sm".to_string(), " Lg".to_string()],
            ["Latte", "Croissant", "Espresso shot"].map(String::from),
            2,
        )
    }

    fn catalog() -> Catalog {
        let entry = |id: &str, category: &str, product: &str| CatalogEntry {
            product_id: ProductId(id.to_string()),
            product_category: category.to_string(),
            product: product.to_string(),
        };
        Catalog::new(vec![
            entry("40", "Coffee", "Latte Rg"),
            entry("41", "Coffee", "Latte Lg"),
            entry("69", "Bakery", "Croissant"),
            entry("33", "Coffee", "Espresso shot"),
            entry("87", "Flavours", "Peppermint syrup"),
        ])
        .expect("catalog")
    }

    fn receipt(transaction_id: u64, customer_id: u64, product_id: &str) -> SalesReceipt {
        SalesReceipt {
            transaction_id,
            transaction_date: NaiveDate::from_ymd_opt(2019, 4, 1).expect("date"),
            sales_outlet_id: 3,
            customer_id,
            product_id: ProductId(product_id.to_string()),
            quantity: 1,
        }
    }

    #[test]
    fn size_suffixes_are_stripped_only_at_the_end() {
        let rules = rules();
        assert_eq!(rules.normalize_product_name("Latte Rg"), "Latte");
        assert_eq!(rules.normalize_product_name("Latte Lg "), "Latte");
        assert_eq!(rules.normalize_product_name("Latte Rg Lg"), "Latte");
        assert_eq!(rules.normalize_product_name("Rg Special"), "Rg Special");
        assert_eq!(rules.normalize_product_name("Croissant"), "Croissant");
    }

    #[test]
    fn single_row_transactions_are_dropped() {
        let prepared = prepare(
            &[receipt(1, 10, "40"), receipt(1, 10, "69"), receipt(2, 11, "33")],
            &catalog(),
            &rules(),
        );

        assert_eq!(prepared.rows.len(), 2);
        assert!(prepared.rows.iter().all(|row| row.transaction == TransactionKey::new(1, 10)));
        assert_eq!(prepared.stats.transactions_dropped, 1);
        assert_eq!(prepared.stats.transactions_retained, 1);
    }

    #[test]
    fn repeated_product_rows_keep_the_transaction() {
        let prepared =
            prepare(&[receipt(5, 20, "40"), receipt(5, 20, "41")], &catalog(), &rules());

        assert_eq!(prepared.rows.len(), 2);
        assert!(prepared.rows.iter().all(|row| row.product == "Latte"));
    }

    #[test]
    fn unmatched_and_disallowed_rows_are_counted_and_removed() {
        let prepared = prepare(
            &[
                receipt(1, 10, "40"),
                receipt(1, 10, "69"),
                receipt(1, 10, "87"),
                receipt(1, 10, "999"),
            ],
            &catalog(),
            &rules(),
        );

        assert_eq!(prepared.stats.receipts_read, 4);
        assert_eq!(prepared.stats.unmatched_products, 1);
        assert_eq!(prepared.stats.outside_allow_list, 1);
        assert_eq!(prepared.stats.rows_retained, 2);
    }

    #[test]
    fn same_transaction_id_for_different_customers_is_split() {
        let prepared = prepare(
            &[receipt(1, 10, "40"), receipt(1, 11, "69"), receipt(1, 11, "33")],
            &catalog(),
            &rules(),
        );

        assert_eq!(prepared.stats.transactions_retained, 1);
        assert!(prepared.rows.iter().all(|row| row.transaction == TransactionKey::new(1, 11)));
    }

    #[test]
    fn category_lookup_maps_normalized_products() {
        let prepared = prepare(&[receipt(1, 10, "40"), receipt(1, 10, "69")], &catalog(), &rules());
        let lookup = category_lookup(&prepared.rows);

        assert_eq!(lookup.get("Latte").map(String::as_str), Some("Coffee"));
        assert_eq!(lookup.get("Croissant").map(String::as_str), Some("Bakery"));
    }
}
