use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{broadcast, RwLock};

use platter_core::flows::FlowType;

use super::{RemoteOrderRecord, RemoteOrderStore, RepositoryError, CHANGE_FEED_CAPACITY};

pub struct InMemoryRemoteStore {
    records: RwLock<HashMap<(FlowType, String), RemoteOrderRecord>>,
    changes: broadcast::Sender<RemoteOrderRecord>,
    upserts: AtomicUsize,
}

impl Default for InMemoryRemoteStore {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self { records: RwLock::new(HashMap::new()), changes, upserts: AtomicUsize::new(0) }
    }
}

impl InMemoryRemoteStore {
    /// Number of upserts accepted so far.
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RemoteOrderStore for InMemoryRemoteStore {
    async fn fetch(
        &self,
        flow_type: FlowType,
        identity: &str,
    ) -> Result<Option<RemoteOrderRecord>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records.get(&(flow_type, identity.to_string())).cloned())
    }

    async fn upsert(&self, record: RemoteOrderRecord) -> Result<(), RepositoryError> {
        {
            let mut records = self.records.write().await;
            records.insert((record.flow_type, record.identity.clone()), record.clone());
        }
        self.upserts.fetch_add(1, Ordering::SeqCst);
        // No subscribers is not an error.
        let _ = self.changes.send(record);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<RemoteOrderRecord> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use platter_core::domain::order::OrderState;
    use platter_core::flows::FlowType;

    use crate::repositories::{InMemoryRemoteStore, RemoteOrderRecord, RemoteOrderStore};

    fn record(identity: &str, guest_count: u32) -> RemoteOrderRecord {
        let mut state = OrderState::new(FlowType::Catering);
        state.guest_count = guest_count;
        RemoteOrderRecord {
            flow_type: FlowType::Catering,
            identity: identity.to_string(),
            version: 1,
            state,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn upsert_replaces_and_publishes() {
        let store = InMemoryRemoteStore::default();
        let mut changes = store.subscribe();

        store.upsert(record("user-1", 12)).await.expect("first upsert");
        store.upsert(record("user-1", 30)).await.expect("second upsert");

        let stored = store.fetch(FlowType::Catering, "user-1").await.expect("fetch");
        assert_eq!(stored.map(|record| record.state.guest_count), Some(30));
        assert_eq!(store.upsert_count(), 2);

        assert_eq!(changes.recv().await.expect("first change").state.guest_count, 12);
        assert_eq!(changes.recv().await.expect("second change").state.guest_count, 30);
    }

    #[tokio::test]
    async fn records_are_keyed_by_flow_and_identity() {
        let store = InMemoryRemoteStore::default();
        store.upsert(record("user-1", 12)).await.expect("upsert");

        assert!(store.fetch(FlowType::Catering, "user-2").await.expect("fetch").is_none());
        assert!(store.fetch(FlowType::OnlineOrder, "user-1").await.expect("fetch").is_none());
    }
}
