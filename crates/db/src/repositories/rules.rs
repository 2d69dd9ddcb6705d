use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::types::Json;
use sqlx::Row;

use basketry_core::mining::canonical_key;
use basketry_core::pipeline::RuleRecord;

use super::{check_storable, RepositoryError, RuleTableRepository};
use crate::DbPool;

pub struct SqlRuleTableRepository {
    pool: DbPool,
}

impl SqlRuleTableRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RuleTableRepository for SqlRuleTableRepository {
    async fn replace_all(&self, rules: &[RuleRecord]) -> Result<(), RepositoryError> {
        for (position, rule) in rules.iter().enumerate() {
            check_storable(position, rule)?;
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM association_rules").execute(&mut *tx).await?;

        for (position, rule) in rules.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO association_rules (
                    rule_order, antecedent_key, antecedents, consequents,
                    antecedent_support, consequent_support, support,
                    confidence, lift, leverage, conviction
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(position as i64)
            .bind(canonical_key(&rule.antecedents))
            .bind(Json(&rule.antecedents))
            .bind(Json(&rule.consequents))
            .bind(rule.antecedent_support)
            .bind(rule.consequent_support)
            .bind(rule.support)
            .bind(rule.confidence)
            .bind(rule.lift)
            .bind(rule.leverage)
            .bind(rule.conviction)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<RuleRecord>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT
                antecedents, consequents, antecedent_support, consequent_support,
                support, confidence, lift, leverage, conviction
            FROM association_rules
            ORDER BY rule_order
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(rule_from_row).collect()
    }

    async fn list_by_antecedent(
        &self,
        antecedents: &[String],
    ) -> Result<Vec<RuleRecord>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT
                antecedents, consequents, antecedent_support, consequent_support,
                support, confidence, lift, leverage, conviction
            FROM association_rules
            WHERE antecedent_key = ?
            ORDER BY rule_order
            "#,
        )
        .bind(canonical_key(antecedents))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(rule_from_row).collect()
    }
}

fn rule_from_row(row: &SqliteRow) -> Result<RuleRecord, RepositoryError> {
    let antecedents: Json<Vec<String>> = row
        .try_get("antecedents")
        .map_err(|error| RepositoryError::Decode(format!("antecedents: {error}")))?;
    let consequents: Json<Vec<String>> = row
        .try_get("consequents")
        .map_err(|error| RepositoryError::Decode(format!("consequents: {error}")))?;

    Ok(RuleRecord {
        antecedents: antecedents.0,
        consequents: consequents.0,
        antecedent_support: row.try_get("antecedent_support")?,
        consequent_support: row.try_get("consequent_support")?,
        support: row.try_get("support")?,
        confidence: row.try_get("confidence")?,
        lift: row.try_get("lift")?,
        leverage: row.try_get("leverage")?,
        conviction: row.try_get("conviction")?,
    })
}

#[cfg(test)]
mod tests {
    use sqlx::Row;
    use tempfile::TempDir;

    use super::SqlRuleTableRepository;
    use crate::repositories::tests::record;
    use crate::repositories::{RepositoryError, RuleTableRepository};
    use crate::{connect_artifact, schema, DbPool};

    async fn setup_pool(dir: &TempDir) -> DbPool {
        let pool = connect_artifact(&dir.path().join("rules_basket.db")).await.expect("pool");
        schema::ensure_schema(&pool).await.expect("schema");
        pool
    }

    #[tokio::test]
    async fn rules_round_trip_in_generation_order() {
        let dir = TempDir::new().expect("temp dir");
        let repo = SqlRuleTableRepository::new(setup_pool(&dir).await);
        let rules = vec![
            record(&["Latte"], &["Croissant"], 1.0),
            record(&["Croissant"], &["Latte"], 0.75),
            record(&["Croissant", "Latte"], &["Ginger Scone"], 0.5),
        ];

        repo.replace_all(&rules).await.expect("replace");

        assert_eq!(repo.list_all().await.expect("list"), rules);
    }

    #[tokio::test]
    async fn set_columns_are_stored_as_json_arrays() {
        let dir = TempDir::new().expect("temp dir");
        let pool = setup_pool(&dir).await;
        let repo = SqlRuleTableRepository::new(pool.clone());
        repo.replace_all(&[record(&["Croissant", "Latte"], &["Ginger Scone"], 0.5)])
            .await
            .expect("replace");

        let row = sqlx::query("SELECT antecedents, antecedent_key FROM association_rules")
            .fetch_one(&pool)
            .await
            .expect("row");
        let antecedents: String = row.try_get("antecedents").expect("antecedents");
        let key: String = row.try_get("antecedent_key").expect("key");

        assert_eq!(antecedents, r#"["Croissant","Latte"]"#);
        assert_eq!(key, "Croissant_Latte");
    }

    #[tokio::test]
    async fn lookup_by_antecedent_ignores_order() {
        let dir = TempDir::new().expect("temp dir");
        let repo = SqlRuleTableRepository::new(setup_pool(&dir).await);
        repo.replace_all(&[
            record(&["Latte"], &["Croissant"], 1.0),
            record(&["Croissant", "Latte"], &["Ginger Scone"], 0.5),
        ])
        .await
        .expect("replace");

        let found = repo
            .list_by_antecedent(&["Latte".to_string(), "Croissant".to_string()])
            .await
            .expect("lookup");

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].consequents, vec!["Ginger Scone".to_string()]);
        assert!(repo.list_by_antecedent(&["Espresso shot".to_string()]).await.expect("lookup").is_empty());
    }

    #[tokio::test]
    async fn replace_discards_previous_rows() {
        let dir = TempDir::new().expect("temp dir");
        let repo = SqlRuleTableRepository::new(setup_pool(&dir).await);
        repo.replace_all(&[record(&["Latte"], &["Croissant"], 1.0)]).await.expect("first");
        repo.replace_all(&[record(&["Croissant"], &["Latte"], 0.6)]).await.expect("second");

        let all = repo.list_all().await.expect("list");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].antecedents, vec!["Croissant".to_string()]);
        assert!(all[0].conviction.is_some());
    }

    #[tokio::test]
    async fn invalid_record_leaves_table_untouched() {
        let dir = TempDir::new().expect("temp dir");
        let repo = SqlRuleTableRepository::new(setup_pool(&dir).await);
        let original = vec![record(&["Latte"], &["Croissant"], 1.0)];
        repo.replace_all(&original).await.expect("first");

        let mut broken = record(&["Croissant"], &["Latte"], 0.6);
        broken.confidence = f64::INFINITY;
        let error = repo.replace_all(&[broken]).await.expect_err("infinite confidence");

        assert!(matches!(error, RepositoryError::InvalidRecord { position: 0, .. }));
        assert_eq!(repo.list_all().await.expect("list"), original);
    }
}
