use std::time::Duration;

use platter_core::config::RemoteConfig;
use sqlx::sqlite::SqlitePoolOptions;

pub type DbPool = sqlx::SqlitePool;

/// Pool for the remote order store described by `config`.
pub async fn connect_remote(config: &RemoteConfig) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(&config.database_url, config.max_connections, config.timeout_secs).await
}

pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(database_url)
        .await
}

#[cfg(test)]
mod tests {
    use platter_core::config::AppConfig;
    use sqlx::Row;
    use tempfile::TempDir;

    use super::connect_remote;

    #[tokio::test]
    async fn file_backed_remote_store_uses_wal() {
        let dir = TempDir::new().expect("temp dir");
        let mut remote = AppConfig::default().remote;
        remote.database_url =
            format!("sqlite://{}?mode=rwc", dir.path().join("orders.db").display());

        let pool = connect_remote(&remote).await.expect("connect");
        let mode: String = sqlx::query("PRAGMA journal_mode")
            .fetch_one(&pool)
            .await
            .expect("read journal mode")
            .get(0);

        assert_eq!(mode.to_ascii_lowercase(), "wal");
        pool.close().await;
    }
}
