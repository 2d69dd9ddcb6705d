//! Delimited-file ingestion for the receipts and catalog tables.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::config::InputConfig;
use crate::domain::catalog::CatalogEntry;
use crate::domain::receipt::SalesReceipt;
use crate::errors::{ApplicationError, DomainError};

pub const TRANSACTIONS_TABLE: &str = "transactions";
pub const CATALOG_TABLE: &str = "catalog";

pub const TRANSACTION_COLUMNS: [&str; 6] = [
    "transaction_id",
    "transaction_date",
    "sales_outlet_id",
    "customer_id",
    "product_id",
    "quantity",
];

pub const CATALOG_COLUMNS: [&str; 3] = ["product_id", "product_category", "product"];

/// Both input tables, as read. Nothing is joined or filtered yet.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawDataset {
    pub receipts: Vec<SalesReceipt>,
    pub catalog: Vec<CatalogEntry>,
}

pub trait DatasetSource {
    fn load(&self) -> Result<RawDataset, ApplicationError>;
}

impl DatasetSource for RawDataset {
    fn load(&self) -> Result<RawDataset, ApplicationError> {
        Ok(self.clone())
    }
}

#[derive(Clone, Debug)]
pub struct CsvDatasetSource {
    transactions_path: PathBuf,
    catalog_path: PathBuf,
}

impl CsvDatasetSource {
    pub fn new(transactions_path: impl Into<PathBuf>, catalog_path: impl Into<PathBuf>) -> Self {
        Self { transactions_path: transactions_path.into(), catalog_path: catalog_path.into() }
    }

    pub fn from_config(input: &InputConfig) -> Self {
        Self::new(&input.transactions_path, &input.catalog_path)
    }
}

impl DatasetSource for CsvDatasetSource {
    fn load(&self) -> Result<RawDataset, ApplicationError> {
        let receipts =
            read_table(&self.transactions_path, TRANSACTIONS_TABLE, &TRANSACTION_COLUMNS)?;
        let catalog = read_table(&self.catalog_path, CATALOG_TABLE, &CATALOG_COLUMNS)?;

        tracing::debug!(
            event_name = "pipeline.ingest.tables_read",
            receipts = receipts.len(),
            catalog_entries = catalog.len(),
            "input tables read"
        );

        Ok(RawDataset { receipts, catalog })
    }
}

fn read_table<T: DeserializeOwned>(
    path: &Path,
    table: &str,
    required_columns: &[&str],
) -> Result<Vec<T>, ApplicationError> {
    let file = File::open(path).map_err(|error| {
        ApplicationError::Input(format!(
            "could not open {table} table `{}`: {error}",
            path.display()
        ))
    })?;
    parse_table(file, table, required_columns)
}

/// Parses one table, checking the header before any row is decoded so a schema problem
/// is reported as a missing column rather than as a confusing row error.
pub fn parse_table<R: Read, T: DeserializeOwned>(
    reader: R,
    table: &str,
    required_columns: &[&str],
) -> Result<Vec<T>, ApplicationError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|error| DomainError::MalformedRow {
            table: table.to_string(),
            line: 1,
            message: error.to_string(),
        })?
        .clone();

    for column in required_columns {
        if !headers.iter().any(|header| header == *column) {
            return Err(DomainError::MissingColumn {
                table: table.to_string(),
                column: (*column).to_string(),
            }
            .into());
        }
    }

    let mut rows = Vec::new();
    for record in reader.deserialize::<T>() {
        let row = record.map_err(|error| DomainError::MalformedRow {
            table: table.to_string(),
            line: error.position().map(|position| position.line()).unwrap_or_default(),
            message: error.to_string(),
        })?;
        rows.push(row);
    }

    Ok(rows)
}
