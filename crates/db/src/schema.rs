//! Layout of the rule table artifact.
//!
//! The artifact is rebuilt from scratch on every run, so the schema is created in place
//! rather than tracked by a migration table.

use crate::DbPool;

pub const RULES_TABLE: &str = "association_rules";

const CREATE_RULES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS association_rules (
    rule_order INTEGER PRIMARY KEY,
    antecedent_key TEXT NOT NULL,
    antecedents TEXT NOT NULL,
    consequents TEXT NOT NULL,
    antecedent_support REAL NOT NULL,
    consequent_support REAL NOT NULL,
    support REAL NOT NULL,
    confidence REAL NOT NULL,
    lift REAL NOT NULL,
    leverage REAL NOT NULL,
    conviction REAL
)
"#;

const CREATE_ANTECEDENT_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_association_rules_antecedent_key
    ON association_rules (antecedent_key)
"#;

pub async fn ensure_schema(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(CREATE_RULES_TABLE).execute(pool).await?;
    sqlx::query(CREATE_ANTECEDENT_INDEX).execute(pool).await?;
    Ok(())
}
