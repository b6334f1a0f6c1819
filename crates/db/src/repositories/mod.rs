use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use platter_core::domain::order::OrderState;
use platter_core::flows::FlowType;

pub mod memory;
pub mod remote;

pub use memory::InMemoryRemoteStore;
pub use remote::SqlRemoteOrderStore;

/// Buffered change notifications per subscriber before the oldest are dropped.
pub const CHANGE_FEED_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One customer's order for one flow as stored remotely.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteOrderRecord {
    pub flow_type: FlowType,
    pub identity: String,
    pub version: u32,
    pub state: OrderState,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait RemoteOrderStore: Send + Sync {
    async fn fetch(
        &self,
        flow_type: FlowType,
        identity: &str,
    ) -> Result<Option<RemoteOrderRecord>, RepositoryError>;

    /// Last write wins. Every successful upsert is published to subscribers.
    async fn upsert(&self, record: RemoteOrderRecord) -> Result<(), RepositoryError>;

    fn subscribe(&self) -> broadcast::Receiver<RemoteOrderRecord>;
}
