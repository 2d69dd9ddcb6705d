use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::catalog::ProductId;

/// One row of the sales receipts table: a single product line of a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesReceipt {
    pub transaction_id: u64,
    pub transaction_date: NaiveDate,
    pub sales_outlet_id: u32,
    pub customer_id: u64,
    pub product_id: ProductId,
    pub quantity: u32,
}

impl SalesReceipt {
    pub fn transaction_key(&self) -> TransactionKey {
        TransactionKey::new(self.transaction_id, self.customer_id)
    }
}

/// Receipt numbers restart per outlet and day, so a transaction is only unique together
/// with its customer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionKey(pub String);

impl TransactionKey {
    pub fn new(transaction_id: u64, customer_id: u64) -> Self {
        Self(format!("{transaction_id}_{customer_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A receipt line that survived the join, name normalization, allow-list, and
/// multi-item filter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedRow {
    pub transaction: TransactionKey,
    pub product: String,
    pub product_category: String,
    pub quantity: u32,
}

impl PreparedRow {
    pub fn new(
        transaction: TransactionKey,
        product: impl Into<String>,
        product_category: impl Into<String>,
        quantity: u32,
    ) -> Self {
        Self {
            transaction,
            product: product.into(),
            product_category: product_category.into(),
            quantity,
        }
    }
}
