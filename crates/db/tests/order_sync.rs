use std::io::{Error as IoError, ErrorKind};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::broadcast;

use platter_core::audit::{
    AuditCategory, AuditOutcome, InMemoryAuditSink, DRAFT_APPLIED, DRAFT_REJECTED,
    IDENTITY_HANDOFF, REMOTE_FETCH_FAILED, REMOTE_UPDATE_APPLIED, REMOTE_UPDATE_DROPPED,
    REMOTE_WRITE_FAILED,
};
use platter_core::domain::customer::CustomerProfile;
use platter_core::domain::order::{OrderState, SelectedPackage, ORDER_STATE_SCHEMA_VERSION};
use platter_core::drafts::{OrderSection, SectionValidatorRegistry};
use platter_core::flows::FlowType;
use platter_db::{
    ChangeSource, FileLocalCache, InMemoryLocalCache, InMemoryRemoteStore, OrderStateEvent,
    OrderStateService, RemoteOrderRecord, RemoteOrderStore, RepositoryError, SyncOptions,
    VersionedCache,
};

type MemoryService = OrderStateService<InMemoryLocalCache, InMemoryRemoteStore>;

fn memory_service(remote: Arc<InMemoryRemoteStore>, audit: &InMemoryAuditSink) -> MemoryService {
    OrderStateService::with_parts(
        VersionedCache::new(InMemoryLocalCache::default(), ORDER_STATE_SCHEMA_VERSION),
        remote,
        SyncOptions::default(),
        SectionValidatorRegistry::default(),
        Arc::new(audit.clone()),
    )
}

/// Remote store whose every call fails, as when the device is offline.
struct OfflineRemoteStore {
    changes: broadcast::Sender<RemoteOrderRecord>,
}

impl Default for OfflineRemoteStore {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(8);
        Self { changes }
    }
}

fn offline() -> RepositoryError {
    RepositoryError::Io(IoError::new(ErrorKind::ConnectionRefused, "remote offline"))
}

#[async_trait]
impl RemoteOrderStore for OfflineRemoteStore {
    async fn fetch(
        &self,
        _flow_type: FlowType,
        _identity: &str,
    ) -> Result<Option<RemoteOrderRecord>, RepositoryError> {
        Err(offline())
    }

    async fn upsert(&self, _record: RemoteOrderRecord) -> Result<(), RepositoryError> {
        Err(offline())
    }

    fn subscribe(&self) -> broadcast::Receiver<RemoteOrderRecord> {
        self.changes.subscribe()
    }
}

fn remote_record(identity: &str, state: OrderState, version: u32) -> RemoteOrderRecord {
    RemoteOrderRecord {
        flow_type: state.flow_type,
        identity: identity.to_string(),
        version,
        state,
        updated_at: Utc::now(),
    }
}

fn game_day() -> SelectedPackage {
    SelectedPackage {
        id: "game-day".to_string(),
        name: "Game Day Spread".to_string(),
        price_per_person: Decimal::new(1299, 2),
    }
}

async fn next_remote_event(events: &mut broadcast::Receiver<OrderStateEvent>) -> OrderStateEvent {
    let wait = async {
        loop {
            let event = events.recv().await.expect("event feed open");
            if event.source == ChangeSource::Remote {
                return event;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait).await.expect("remote event arrives")
}

#[tokio::test]
async fn committed_state_survives_a_restart() {
    let dir = TempDir::new().expect("temp dir");
    let remote = Arc::new(InMemoryRemoteStore::default());
    let open = |remote: Arc<InMemoryRemoteStore>| {
        OrderStateService::new(
            VersionedCache::new(FileLocalCache::new(dir.path()), ORDER_STATE_SCHEMA_VERSION),
            remote,
            SyncOptions::default(),
        )
    };

    let first = open(Arc::clone(&remote));
    let defaults = first.load(FlowType::Catering).await;
    assert_eq!(defaults, OrderState::new(FlowType::Catering));

    first
        .commit(FlowType::Catering, |state| {
            state.guest_count = 25;
            state.selected_package = Some(game_day());
        })
        .await;

    let second = open(remote);
    let restored = second.load(FlowType::Catering).await;
    assert_eq!(restored.guest_count, 25);
    assert_eq!(restored.totals.package_subtotal, Decimal::new(32_475, 2));
}

#[tokio::test(start_paused = true)]
async fn commits_stay_local_until_sign_in() {
    let remote = Arc::new(InMemoryRemoteStore::default());
    let service = memory_service(Arc::clone(&remote), &InMemoryAuditSink::default());

    service.commit(FlowType::OnlineOrder, |state| state.guest_count = 2).await;
    tokio::time::sleep(Duration::from_millis(2000)).await;

    assert_eq!(remote.upsert_count(), 0);
    assert!(service.identity().await.is_none());
}

#[tokio::test]
async fn sign_in_uploads_local_order_that_carries_identity_signal() {
    let remote = Arc::new(InMemoryRemoteStore::default());
    let service = memory_service(Arc::clone(&remote), &InMemoryAuditSink::default());

    service
        .commit(FlowType::Catering, |state| {
            state.contact.email = "ana@example.com".to_string();
            state.guest_count = 16;
        })
        .await;
    service.sign_in(&CustomerProfile::new("user-1")).await;

    let stored = remote
        .fetch(FlowType::Catering, "user-1")
        .await
        .expect("fetch")
        .expect("local order uploaded");
    assert_eq!(stored.state.guest_count, 16);
    assert_eq!(stored.version, ORDER_STATE_SCHEMA_VERSION);
}

#[tokio::test]
async fn sign_in_adopts_remote_order_and_prefills_only_empty_fields() {
    let remote = Arc::new(InMemoryRemoteStore::default());
    let mut saved = OrderState::new(FlowType::Catering);
    saved.guest_count = 30;
    saved.contact.name = "Ana from last week".to_string();
    remote
        .upsert(remote_record("user-1", saved, ORDER_STATE_SCHEMA_VERSION))
        .await
        .expect("seed remote");

    let service = memory_service(Arc::clone(&remote), &InMemoryAuditSink::default());
    service.load(FlowType::Catering).await;

    let profile = CustomerProfile {
        display_name: Some("Ana Profile".to_string()),
        email: Some("ana@example.com".to_string()),
        ..CustomerProfile::new("user-1")
    };
    service.sign_in(&profile).await;

    let state = service.state(FlowType::Catering).await;
    assert_eq!(state.guest_count, 30);
    assert_eq!(state.contact.name, "Ana from last week");
    assert_eq!(state.contact.email, "ana@example.com");
    assert_eq!(service.identity().await.map(|id| id.0), Some("user-1".to_string()));
}

#[tokio::test]
async fn sign_in_ignores_remote_order_from_another_schema_version() {
    let remote = Arc::new(InMemoryRemoteStore::default());
    let mut saved = OrderState::new(FlowType::Catering);
    saved.guest_count = 30;
    remote
        .upsert(remote_record("user-1", saved, ORDER_STATE_SCHEMA_VERSION + 1))
        .await
        .expect("seed remote");

    let service = memory_service(Arc::clone(&remote), &InMemoryAuditSink::default());
    service.load(FlowType::Catering).await;
    service.sign_in(&CustomerProfile::new("user-1")).await;

    assert_eq!(service.state(FlowType::Catering).await.guest_count, 10);
}

#[tokio::test(start_paused = true)]
async fn burst_of_commits_reaches_remote_once() {
    let remote = Arc::new(InMemoryRemoteStore::default());
    let service = memory_service(Arc::clone(&remote), &InMemoryAuditSink::default());
    service.load(FlowType::Catering).await;
    service.sign_in(&CustomerProfile::new("user-1")).await;

    for guest_count in 11..=15 {
        service.commit(FlowType::Catering, |state| state.guest_count = guest_count).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(remote.upsert_count(), 0);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(remote.upsert_count(), 1);
    let stored = remote.fetch(FlowType::Catering, "user-1").await.expect("fetch");
    assert_eq!(stored.map(|record| record.state.guest_count), Some(15));
}

#[tokio::test]
async fn flush_sends_pending_write_without_waiting() {
    let remote = Arc::new(InMemoryRemoteStore::default());
    let audit = InMemoryAuditSink::default();
    let service = memory_service(Arc::clone(&remote), &audit);
    service.load(FlowType::OnlineOrder).await;
    service.sign_in(&CustomerProfile::new("user-1")).await;

    service.commit(FlowType::OnlineOrder, |state| state.guest_count = 3).await;
    service.flush().await;

    assert_eq!(remote.upsert_count(), 1);
    tokio::time::sleep(Duration::from_millis(50)).await;
    // The store echoes our own write back; it is neither applied nor counted as dropped.
    assert!(audit.events_of_type(REMOTE_UPDATE_DROPPED).is_empty());
    assert!(audit.events_of_type(REMOTE_UPDATE_APPLIED).is_empty());
}

#[tokio::test]
async fn remote_updates_apply_only_when_newer_and_same_version() {
    let remote = Arc::new(InMemoryRemoteStore::default());
    let audit = InMemoryAuditSink::default();
    let service = memory_service(Arc::clone(&remote), &audit);
    let mut events = service.subscribe();

    service.commit(FlowType::Catering, |state| state.guest_count = 14).await;
    service.sign_in(&CustomerProfile::new("user-1")).await;

    service.create_draft(FlowType::Catering).await;
    service
        .update_draft(FlowType::Catering, &json!({ "contact": { "name": "Draft Name" } }))
        .await
        .expect("draft exists");

    let mut stale = OrderState::new(FlowType::Catering);
    stale.guest_count = 99;
    let mut stale_record = remote_record("user-1", stale, ORDER_STATE_SCHEMA_VERSION);
    stale_record.updated_at = Utc::now() - chrono::Duration::hours(1);
    remote.upsert(stale_record).await.expect("stale push");

    let mut foreign = OrderState::new(FlowType::Catering);
    foreign.guest_count = 77;
    let mut foreign_record = remote_record("user-1", foreign, ORDER_STATE_SCHEMA_VERSION + 1);
    foreign_record.updated_at = Utc::now() + chrono::Duration::seconds(5);
    remote.upsert(foreign_record).await.expect("foreign version push");

    let mut other_user = OrderState::new(FlowType::Catering);
    other_user.guest_count = 55;
    remote
        .upsert(remote_record("user-2", other_user, ORDER_STATE_SCHEMA_VERSION))
        .await
        .expect("other identity push");

    let mut newer = OrderState::new(FlowType::Catering);
    newer.guest_count = 40;
    let mut newer_record = remote_record("user-1", newer, ORDER_STATE_SCHEMA_VERSION);
    newer_record.updated_at = Utc::now() + chrono::Duration::seconds(10);
    remote.upsert(newer_record).await.expect("newer push");

    let applied = next_remote_event(&mut events).await;
    assert_eq!(applied.state.guest_count, 40);
    assert_eq!(service.state(FlowType::Catering).await.guest_count, 40);

    let draft = service.draft(FlowType::Catering).await.expect("draft untouched");
    assert_eq!(draft.guest_count, 14);
    assert_eq!(draft.contact.name, "Draft Name");

    assert_eq!(audit.events_of_type(REMOTE_UPDATE_DROPPED).len(), 2);
    assert_eq!(audit.events_of_type(REMOTE_UPDATE_APPLIED).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn sign_out_sends_pending_write_then_stops_remote_sync() {
    let remote = Arc::new(InMemoryRemoteStore::default());
    let service = memory_service(Arc::clone(&remote), &InMemoryAuditSink::default());
    service.load(FlowType::OnlineOrder).await;
    service.sign_in(&CustomerProfile::new("user-1")).await;

    service.commit(FlowType::OnlineOrder, |state| state.guest_count = 4).await;
    service.sign_out().await;

    assert_eq!(remote.upsert_count(), 1);
    let stored = remote.fetch(FlowType::OnlineOrder, "user-1").await.expect("fetch");
    assert_eq!(stored.map(|record| record.state.guest_count), Some(4));

    let mut pushed = OrderState::new(FlowType::OnlineOrder);
    pushed.guest_count = 9;
    let mut record = remote_record("user-1", pushed, ORDER_STATE_SCHEMA_VERSION);
    record.updated_at = Utc::now() + chrono::Duration::seconds(10);
    remote.upsert(record).await.expect("push after sign-out");
    tokio::time::sleep(Duration::from_millis(2000)).await;
    assert_eq!(service.state(FlowType::OnlineOrder).await.guest_count, 4);

    service.commit(FlowType::OnlineOrder, |state| state.guest_count = 5).await;
    tokio::time::sleep(Duration::from_millis(2000)).await;

    assert_eq!(remote.upsert_count(), 2);
    assert!(service.identity().await.is_none());
}

#[tokio::test]
async fn flow_loaded_after_sign_in_adopts_the_saved_remote_order() {
    let remote = Arc::new(InMemoryRemoteStore::default());
    let mut saved = OrderState::new(FlowType::Catering);
    saved.guest_count = 30;
    saved.selected_package = Some(game_day());
    remote
        .upsert(remote_record("user-1", saved, ORDER_STATE_SCHEMA_VERSION))
        .await
        .expect("seed remote");

    let service = memory_service(Arc::clone(&remote), &InMemoryAuditSink::default());
    service.sign_in(&CustomerProfile::new("user-1")).await;

    let loaded = service.load(FlowType::Catering).await;
    assert_eq!(loaded.guest_count, 30);
    assert_eq!(loaded.totals.package_subtotal, Decimal::new(38_970, 2));

    service.commit(FlowType::Catering, |state| state.guest_count = 31).await;
    service.flush().await;
    let stored = remote.fetch(FlowType::Catering, "user-1").await.expect("fetch");
    assert_eq!(stored.map(|record| record.state.guest_count), Some(31));
}

#[tokio::test]
async fn flow_loaded_after_sign_in_skips_remote_order_from_another_version() {
    let remote = Arc::new(InMemoryRemoteStore::default());
    let mut saved = OrderState::new(FlowType::Catering);
    saved.guest_count = 30;
    remote
        .upsert(remote_record("user-1", saved, ORDER_STATE_SCHEMA_VERSION + 1))
        .await
        .expect("seed remote");

    let service = memory_service(Arc::clone(&remote), &InMemoryAuditSink::default());
    service.sign_in(&CustomerProfile::new("user-1")).await;

    assert_eq!(service.load(FlowType::Catering).await, OrderState::new(FlowType::Catering));
}

#[tokio::test]
async fn remote_failures_keep_local_state_and_are_audited() {
    let audit = InMemoryAuditSink::default();
    let service = OrderStateService::with_parts(
        VersionedCache::new(InMemoryLocalCache::default(), ORDER_STATE_SCHEMA_VERSION),
        Arc::new(OfflineRemoteStore::default()),
        SyncOptions::default(),
        SectionValidatorRegistry::default(),
        Arc::new(audit.clone()),
    );

    service
        .commit(FlowType::Catering, |state| state.contact.email = "ana@example.com".to_string())
        .await;
    service.sign_in(&CustomerProfile::new("user-1")).await;
    let handoffs = audit.events_of_type(IDENTITY_HANDOFF);
    assert_eq!(handoffs.len(), 1);
    assert_eq!(handoffs[0].outcome, AuditOutcome::Failed);
    assert_eq!(handoffs[0].metadata.get("handoff").map(String::as_str), Some("upload_failed"));

    let online = service.load(FlowType::OnlineOrder).await;
    assert_eq!(online, OrderState::new(FlowType::OnlineOrder));
    assert_eq!(audit.events_of_type(REMOTE_FETCH_FAILED).len(), 1);

    service.commit(FlowType::OnlineOrder, |state| state.guest_count = 6).await;
    service.flush().await;

    let failures = audit.events_of_type(REMOTE_WRITE_FAILED);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].category, AuditCategory::Persistence);
    assert_eq!(failures[0].outcome, AuditOutcome::Failed);
    assert_eq!(failures[0].identity.as_deref(), Some("user-1"));
    assert_eq!(service.state(FlowType::OnlineOrder).await.guest_count, 6);
}

#[tokio::test]
async fn draft_apply_is_all_or_nothing_through_the_service() {
    let audit = InMemoryAuditSink::default();
    let service = memory_service(Arc::new(InMemoryRemoteStore::default()), &audit);
    let before = service.load(FlowType::Catering).await;

    service.create_draft(FlowType::Catering).await;
    service
        .update_draft(FlowType::Catering, &json!({ "guest_count": 6 }))
        .await
        .expect("draft exists");
    let rejected =
        service.apply_draft(FlowType::Catering, OrderSection::Package).await.expect("draft");
    assert!(!rejected.valid);
    assert_eq!(service.state(FlowType::Catering).await, before);

    service
        .update_draft(
            FlowType::Catering,
            &json!({
                "guest_count": 20,
                "selected_package": {
                    "id": "game-day",
                    "name": "Game Day Spread",
                    "price_per_person": "12.99"
                }
            }),
        )
        .await
        .expect("draft still open");
    let applied =
        service.apply_draft(FlowType::Catering, OrderSection::Package).await.expect("draft");
    assert!(applied.valid);

    let live = service.state(FlowType::Catering).await;
    assert_eq!(live.guest_count, 20);
    assert_eq!(live.totals.package_subtotal, Decimal::new(25_980, 2));
    assert!(service.draft(FlowType::Catering).await.is_none());

    assert_eq!(audit.events_of_type(DRAFT_REJECTED).len(), 1);
    assert_eq!(audit.events_of_type(DRAFT_APPLIED).len(), 1);
}

#[tokio::test]
async fn create_mutate_discard_leaves_service_state_unchanged() {
    let audit = InMemoryAuditSink::default();
    let service = memory_service(Arc::new(InMemoryRemoteStore::default()), &audit);
    let before = service.load(FlowType::OnlineOrder).await;

    service.create_draft(FlowType::OnlineOrder).await;
    service
        .update_draft(FlowType::OnlineOrder, &json!({ "contact": { "name": "Someone Else" } }))
        .await
        .expect("draft exists");
    assert!(service.discard_draft(FlowType::OnlineOrder).await);
    assert!(!service.discard_draft(FlowType::OnlineOrder).await);

    assert_eq!(service.state(FlowType::OnlineOrder).await, before);
}
