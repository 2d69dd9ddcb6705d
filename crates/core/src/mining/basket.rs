use std::collections::{BTreeMap, BTreeSet};

use crate::domain::receipt::{PreparedRow, TransactionKey};
use crate::mining::canonical_key;

pub type ItemIndex = usize;

/// Every distinct product in the prepared rows, sorted by name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ItemUniverse {
    items: Vec<String>,
}

impl ItemUniverse {
    pub fn new(products: impl IntoIterator<Item = String>) -> Self {
        let items: BTreeSet<String> = products.into_iter().collect();
        Self { items: items.into_iter().collect() }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn name(&self, index: ItemIndex) -> Option<&str> {
        self.items.get(index).map(String::as_str)
    }

    pub fn index_of(&self, product: &str) -> Option<ItemIndex> {
        self.items.binary_search_by(|item| item.as_str().cmp(product)).ok()
    }

    pub fn names(&self, items: &[ItemIndex]) -> Vec<String> {
        items.iter().filter_map(|index| self.name(*index)).map(str::to_string).collect()
    }

    pub fn canonical_key(&self, items: &[ItemIndex]) -> String {
        canonical_key(&self.names(items))
    }
}

/// Presence vector of one transaction over the item universe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Basket {
    pub transaction: TransactionKey,
    presence: Vec<bool>,
}

impl Basket {
    pub fn contains(&self, item: ItemIndex) -> bool {
        self.presence.get(item).copied().unwrap_or(false)
    }

    pub fn contains_all(&self, items: &[ItemIndex]) -> bool {
        items.iter().all(|item| self.contains(*item))
    }

    pub fn item_count(&self) -> usize {
        self.presence.iter().filter(|present| **present).count()
    }

    pub fn presence(&self) -> &[bool] {
        &self.presence
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BasketSet {
    universe: ItemUniverse,
    baskets: Vec<Basket>,
}

impl BasketSet {
    pub fn universe(&self) -> &ItemUniverse {
        &self.universe
    }

    pub fn baskets(&self) -> &[Basket] {
        &self.baskets
    }

    pub fn len(&self) -> usize {
        self.baskets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.baskets.is_empty()
    }
}

pub struct BasketEncoder;

impl BasketEncoder {
    /// One basket per transaction key, in key order. Repeated products inside a
    /// transaction collapse to a single `true`; quantities play no part in membership.
    pub fn encode(rows: &[PreparedRow]) -> BasketSet {
        let universe = ItemUniverse::new(rows.iter().map(|row| row.product.clone()));

        let mut grouped: BTreeMap<&TransactionKey, Vec<bool>> = BTreeMap::new();
        for row in rows {
            let presence =
                grouped.entry(&row.transaction).or_insert_with(|| vec![false; universe.len()]);
            if let Some(index) = universe.index_of(&row.product) {
                presence[index] = true;
            }
        }

        let baskets = grouped
            .into_iter()
            .map(|(transaction, presence)| Basket { transaction: transaction.clone(), presence })
            .collect();

        BasketSet { universe, baskets }
    }
}
