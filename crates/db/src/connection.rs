use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

pub type DbPool = sqlx::SqlitePool;

/// Single-connection pool on a rule table file. Rollback journaling keeps the artifact a
/// single file once the pool is closed.
pub async fn connect_artifact(path: &Path) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete);

    SqlitePoolOptions::new().max_connections(1).connect_with(options).await
}

pub async fn open_artifact_read_only(path: &Path) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::new().filename(path).read_only(true);

    SqlitePoolOptions::new().max_connections(1).connect_with(options).await
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::{connect_artifact, open_artifact_read_only};

    #[tokio::test]
    async fn artifact_pool_leaves_a_single_file_that_reopens_read_only() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("rules_basket.db");

        let pool = connect_artifact(&path).await.expect("create");
        sqlx::query("CREATE TABLE stored_rows (id INTEGER PRIMARY KEY)")
            .execute(&pool)
            .await
            .expect("create table");
        pool.close().await;

        let files: Vec<String> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(files, vec!["rules_basket.db".to_string()]);

        let reader = open_artifact_read_only(&path).await.expect("reopen");
        let write = sqlx::query("INSERT INTO stored_rows (id) VALUES (1)").execute(&reader).await;
        assert!(write.is_err(), "read-only pool must refuse writes");
        reader.close().await;
    }
}
