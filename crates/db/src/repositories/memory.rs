use tokio::sync::RwLock;

use basketry_core::mining::canonical_key;
use basketry_core::pipeline::RuleRecord;

use super::{check_storable, RepositoryError, RuleTableRepository};

#[derive(Default)]
pub struct InMemoryRuleTableRepository {
    rules: RwLock<Vec<RuleRecord>>,
}

#[async_trait::async_trait]
impl RuleTableRepository for InMemoryRuleTableRepository {
    async fn replace_all(&self, rules: &[RuleRecord]) -> Result<(), RepositoryError> {
        for (position, rule) in rules.iter().enumerate() {
            check_storable(position, rule)?;
        }
        let mut stored = self.rules.write().await;
        *stored = rules.to_vec();
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<RuleRecord>, RepositoryError> {
        let stored = self.rules.read().await;
        Ok(stored.clone())
    }

    async fn list_by_antecedent(
        &self,
        antecedents: &[String],
    ) -> Result<Vec<RuleRecord>, RepositoryError> {
        let key = canonical_key(antecedents);
        let stored = self.rules.read().await;
        Ok(stored.iter().filter(|rule| canonical_key(&rule.antecedents) == key).cloned().collect())
    }
}
