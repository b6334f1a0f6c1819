use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use platter_core::audit::{
    AuditCategory, AuditEvent, AuditOutcome, AuditSink, NoopAuditSink, REMOTE_WRITE_FAILED,
};
use platter_core::flows::FlowType;

use crate::repositories::{RemoteOrderRecord, RemoteOrderStore};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

type WriteKey = (FlowType, String);

struct PendingWrite {
    generation: u64,
    record: RemoteOrderRecord,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct PendingWrites {
    next_generation: u64,
    by_key: HashMap<WriteKey, PendingWrite>,
}

/// Coalesces bursts of remote writes. Each (flow, identity) pair has at most one pending
/// write; scheduling again replaces it and restarts the quiescence window.
pub struct RemoteWriteDebouncer<R> {
    store: Arc<R>,
    audit: Arc<dyn AuditSink>,
    window: Duration,
    pending: Arc<Mutex<PendingWrites>>,
}

impl<R> RemoteWriteDebouncer<R>
where
    R: RemoteOrderStore + 'static,
{
    pub fn new(store: Arc<R>, window: Duration) -> Self {
        Self {
            store,
            audit: Arc::new(NoopAuditSink),
            window,
            pending: Arc::new(Mutex::new(PendingWrites::default())),
        }
    }

    /// Records failed remote writes on `audit`.
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).by_key.len()
    }

    pub fn schedule(&self, record: RemoteOrderRecord) {
        let key = (record.flow_type, record.identity.clone());
        let mut pending = lock(&self.pending);
        pending.next_generation += 1;
        let generation = pending.next_generation;

        if let Some(superseded) = pending.by_key.remove(&key) {
            superseded.handle.abort();
            debug!(
                event_name = "sync.remote_write_superseded",
                flow_type = %key.0,
                "pending remote write replaced by newer state"
            );
        }

        let store = Arc::clone(&self.store);
        let audit = Arc::clone(&self.audit);
        let shared = Arc::clone(&self.pending);
        let window = self.window;
        let task_key = key.clone();
        let task_record = record.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            write_remote(store.as_ref(), audit.as_ref(), task_record).await;

            let mut pending = lock(&shared);
            if pending.by_key.get(&task_key).is_some_and(|entry| entry.generation == generation) {
                pending.by_key.remove(&task_key);
            }
        });

        pending.by_key.insert(key, PendingWrite { generation, record, handle });
    }

    /// Writes every pending record now instead of waiting out the window.
    pub async fn flush(&self) {
        let drained: Vec<RemoteOrderRecord> = {
            let mut pending = lock(&self.pending);
            pending
                .by_key
                .drain()
                .map(|(_, entry)| {
                    entry.handle.abort();
                    entry.record
                })
                .collect()
        };

        for record in drained {
            write_remote(self.store.as_ref(), self.audit.as_ref(), record).await;
        }
    }
}

impl<R> Drop for RemoteWriteDebouncer<R> {
    fn drop(&mut self) {
        let mut pending = lock(&self.pending);
        for (_, entry) in pending.by_key.drain() {
            entry.handle.abort();
        }
    }
}

async fn write_remote<R: RemoteOrderStore>(
    store: &R,
    audit: &dyn AuditSink,
    record: RemoteOrderRecord,
) {
    let flow_type = record.flow_type;
    let identity = record.identity.clone();
    match store.upsert(record).await {
        Ok(()) => {
            debug!(
                event_name = "sync.remote_write",
                flow_type = %flow_type,
                "remote order state written"
            );
        }
        Err(error) => {
            warn!(
                event_name = "sync.remote_write_failed",
                flow_type = %flow_type,
                error = %error,
                "remote write failed, local copy remains authoritative"
            );
            audit.emit(
                AuditEvent::new(
                    Some(flow_type),
                    Some(identity),
                    REMOTE_WRITE_FAILED,
                    AuditCategory::Persistence,
                    "remote-write-debouncer",
                    AuditOutcome::Failed,
                )
                .with_metadata("error", error.to_string()),
            );
        }
    }
}

fn lock(pending: &Mutex<PendingWrites>) -> MutexGuard<'_, PendingWrites> {
    match pending.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
