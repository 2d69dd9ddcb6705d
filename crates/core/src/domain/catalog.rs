use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub String);

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row of the product catalog table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub product_id: ProductId,
    pub product_category: String,
    pub product: String,
}

#[derive(Clone, Debug, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    by_id: HashMap<ProductId, usize>,
}

impl Catalog {
    /// Builds the join index. A `product_id` listed twice would fan a receipt out into
    /// several rows, so it is rejected.
    pub fn new(entries: Vec<CatalogEntry>) -> Result<Self, DomainError> {
        let mut by_id = HashMap::with_capacity(entries.len());
        for (position, entry) in entries.iter().enumerate() {
            if by_id.insert(entry.product_id.clone(), position).is_some() {
                return Err(DomainError::InvariantViolation(format!(
                    "catalog lists product_id `{}` more than once",
                    entry.product_id
                )));
            }
        }
        Ok(Self { entries, by_id })
    }

    pub fn find(&self, product_id: &ProductId) -> Option<&CatalogEntry> {
        self.by_id.get(product_id).map(|position| &self.entries[*position])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
