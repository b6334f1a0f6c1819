use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use tokio::sync::broadcast;

use platter_core::flows::FlowType;

use super::{RemoteOrderRecord, RemoteOrderStore, RepositoryError, CHANGE_FEED_CAPACITY};
use crate::DbPool;

/// Remote order store backed by the `order_state` table. Change notifications cover writes
/// made through this handle and its clones.
#[derive(Clone)]
pub struct SqlRemoteOrderStore {
    pool: DbPool,
    changes: broadcast::Sender<RemoteOrderRecord>,
}

impl SqlRemoteOrderStore {
    pub fn new(pool: DbPool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self { pool, changes }
    }
}

#[async_trait::async_trait]
impl RemoteOrderStore for SqlRemoteOrderStore {
    async fn fetch(
        &self,
        flow_type: FlowType,
        identity: &str,
    ) -> Result<Option<RemoteOrderRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                flow_type,
                identity,
                version,
                state_json,
                updated_at
             FROM order_state
             WHERE flow_type = ? AND identity = ?",
        )
        .bind(flow_type.as_str())
        .bind(identity)
        .fetch_optional(&self.pool)
        .await?;

        row.map(record_from_row).transpose()
    }

    async fn upsert(&self, record: RemoteOrderRecord) -> Result<(), RepositoryError> {
        let state_json = serde_json::to_string(&record.state)
            .map_err(|error| RepositoryError::Decode(format!("could not encode state: {error}")))?;

        sqlx::query(
            "INSERT INTO order_state (
                flow_type,
                identity,
                version,
                state_json,
                updated_at
             ) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(flow_type, identity) DO UPDATE SET
                version = excluded.version,
                state_json = excluded.state_json,
                updated_at = excluded.updated_at",
        )
        .bind(record.flow_type.as_str())
        .bind(&record.identity)
        .bind(i64::from(record.version))
        .bind(state_json)
        .bind(record.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        let _ = self.changes.send(record);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<RemoteOrderRecord> {
        self.changes.subscribe()
    }
}

fn record_from_row(row: SqliteRow) -> Result<RemoteOrderRecord, RepositoryError> {
    let flow_raw = row.try_get::<String, _>("flow_type")?;
    let flow_type = FlowType::parse(&flow_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown flow type `{flow_raw}`")))?;

    let state_json = row.try_get::<String, _>("state_json")?;
    let state = serde_json::from_str(&state_json)
        .map_err(|error| RepositoryError::Decode(format!("invalid order state json: {error}")))?;

    Ok(RemoteOrderRecord {
        flow_type,
        identity: row.try_get("identity")?,
        version: parse_u32("version", row.try_get("version")?)?,
        state,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}
