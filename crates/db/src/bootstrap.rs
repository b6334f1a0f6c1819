use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::info;

use platter_core::config::{AppConfig, RemoteConfig, StorageConfig};
use platter_core::flows::FlowType;

use crate::cache::{FileLocalCache, VersionedCache};
use crate::connection::connect_remote;
use crate::migrations;
use crate::repositories::{
    InMemoryRemoteStore, RemoteOrderRecord, RemoteOrderStore, RepositoryError,
    SqlRemoteOrderStore,
};
use crate::sync::{OrderStateService, SyncOptions};

pub type ConfiguredOrderService = OrderStateService<FileLocalCache, ConfiguredRemoteStore>;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("remote database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("remote database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

/// Remote side chosen by `remote.enabled`. A detached store keeps signed-in writes inside
/// this process, so orders never leave the device.
pub enum ConfiguredRemoteStore {
    Sql(SqlRemoteOrderStore),
    Detached(InMemoryRemoteStore),
}

impl ConfiguredRemoteStore {
    pub fn is_detached(&self) -> bool {
        matches!(self, Self::Detached(_))
    }
}

#[async_trait]
impl RemoteOrderStore for ConfiguredRemoteStore {
    async fn fetch(
        &self,
        flow_type: FlowType,
        identity: &str,
    ) -> Result<Option<RemoteOrderRecord>, RepositoryError> {
        match self {
            Self::Sql(store) => store.fetch(flow_type, identity).await,
            Self::Detached(store) => store.fetch(flow_type, identity).await,
        }
    }

    async fn upsert(&self, record: RemoteOrderRecord) -> Result<(), RepositoryError> {
        match self {
            Self::Sql(store) => store.upsert(record).await,
            Self::Detached(store) => store.upsert(record).await,
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<RemoteOrderRecord> {
        match self {
            Self::Sql(store) => store.subscribe(),
            Self::Detached(store) => store.subscribe(),
        }
    }
}

/// File-backed local cache under `storage.cache_dir`, with the configured schema version
/// and TTL.
pub fn local_cache(storage: &StorageConfig) -> VersionedCache<FileLocalCache> {
    let ttl = StdDuration::from_secs(storage.ttl_secs);
    VersionedCache::new(FileLocalCache::new(&storage.cache_dir), storage.schema_version)
        .with_ttl(Duration::from_std(ttl).unwrap_or(Duration::MAX))
}

pub fn sync_options(remote: &RemoteConfig) -> SyncOptions {
    SyncOptions {
        debounce: StdDuration::from_millis(remote.debounce_ms),
        ..SyncOptions::default()
    }
}

/// Connects and migrates the remote store when enabled; otherwise detaches it.
pub async fn remote_store(
    remote: &RemoteConfig,
) -> Result<ConfiguredRemoteStore, BootstrapError> {
    if !remote.enabled {
        return Ok(ConfiguredRemoteStore::Detached(InMemoryRemoteStore::default()));
    }

    let pool = connect_remote(remote).await.map_err(BootstrapError::DatabaseConnect)?;
    migrations::run_pending(&pool).await.map_err(BootstrapError::Migration)?;
    Ok(ConfiguredRemoteStore::Sql(SqlRemoteOrderStore::new(pool)))
}

pub async fn open_order_service(
    config: &AppConfig,
) -> Result<ConfiguredOrderService, BootstrapError> {
    let remote = remote_store(&config.remote).await?;
    info!(
        event_name = "system.bootstrap.order_service",
        cache_dir = %config.storage.cache_dir.display(),
        ttl_secs = config.storage.ttl_secs,
        schema_version = config.storage.schema_version,
        remote_enabled = !remote.is_detached(),
        "order state service ready"
    );

    Ok(OrderStateService::new(
        local_cache(&config.storage),
        Arc::new(remote),
        sync_options(&config.remote),
    ))
}
