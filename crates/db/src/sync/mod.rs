//! Identity-aware order persistence: a local cache that always works, a debounced remote
//! copy once the customer signs in, and a live feed of remote changes.

pub mod debounce;

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use platter_core::audit::{
    AuditCategory, AuditEvent, AuditOutcome, AuditSink, NoopAuditSink, DRAFT_APPLIED,
    DRAFT_REJECTED, IDENTITY_HANDOFF, REMOTE_FETCH_FAILED, REMOTE_UPDATE_APPLIED,
    REMOTE_UPDATE_DROPPED,
};
use platter_core::domain::customer::{CustomerId, CustomerProfile};
use platter_core::domain::order::{CartItem, OrderState};
use platter_core::drafts::{
    DraftApplyResult, DraftError, DraftManager, OrderSection, SectionValidatorRegistry,
};
use platter_core::flows::FlowType;

use crate::cache::{LocalCache, VersionedCache};
use crate::repositories::{RemoteOrderRecord, RemoteOrderStore};

pub use debounce::{RemoteWriteDebouncer, DEFAULT_DEBOUNCE};

const ACTOR: &str = "order-state-service";

pub fn cache_key(flow_type: FlowType) -> String {
    format!("platter.order.{}", flow_type.as_str())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    Local,
    Draft,
    Remote,
    SignIn,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStateEvent {
    pub flow_type: FlowType,
    pub source: ChangeSource,
    pub state: OrderState,
}

#[derive(Clone, Copy, Debug)]
pub struct SyncOptions {
    pub debounce: Duration,
    pub event_capacity: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self { debounce: DEFAULT_DEBOUNCE, event_capacity: 64 }
    }
}

struct TrackedState {
    state: OrderState,
    updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct ServiceState {
    baselines: HashMap<FlowType, TrackedState>,
    drafts: DraftManager,
    identity: Option<CustomerId>,
    subscription: Option<JoinHandle<()>>,
}

struct ServiceInner<C, R> {
    cache: VersionedCache<C>,
    remote: Arc<R>,
    debouncer: RemoteWriteDebouncer<R>,
    audit: Arc<dyn AuditSink>,
    events: broadcast::Sender<OrderStateEvent>,
    state: Mutex<ServiceState>,
}

/// Owns the live order state for every flow. Cheap to clone; clones share state.
pub struct OrderStateService<C, R> {
    inner: Arc<ServiceInner<C, R>>,
}

impl<C, R> Clone for OrderStateService<C, R> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<C, R> OrderStateService<C, R>
where
    C: LocalCache + 'static,
    R: RemoteOrderStore + 'static,
{
    pub fn new(cache: VersionedCache<C>, remote: Arc<R>, options: SyncOptions) -> Self {
        Self::with_parts(
            cache,
            remote,
            options,
            SectionValidatorRegistry::default(),
            Arc::new(NoopAuditSink),
        )
    }

    pub fn with_parts(
        cache: VersionedCache<C>,
        remote: Arc<R>,
        options: SyncOptions,
        section_validators: SectionValidatorRegistry,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let (events, _) = broadcast::channel(options.event_capacity.max(1));
        let debouncer = RemoteWriteDebouncer::new(Arc::clone(&remote), options.debounce)
            .with_audit(Arc::clone(&audit));
        let state = ServiceState {
            drafts: DraftManager::new(section_validators),
            ..ServiceState::default()
        };

        Self {
            inner: Arc::new(ServiceInner {
                cache,
                remote,
                debouncer,
                audit,
                events,
                state: Mutex::new(state),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrderStateEvent> {
        self.inner.events.subscribe()
    }

    pub async fn identity(&self) -> Option<CustomerId> {
        self.inner.state.lock().await.identity.clone()
    }

    /// Reads the local copy for `flow_type`, falling back to the flow defaults. Loading a
    /// flow that is already live returns the live state.
    pub async fn load(&self, flow_type: FlowType) -> OrderState {
        let mut guard = self.inner.state.lock().await;
        self.inner.ensure_loaded(&mut guard, flow_type).await.state.clone()
    }

    pub async fn state(&self, flow_type: FlowType) -> OrderState {
        self.load(flow_type).await
    }

    /// Applies `mutate` to the live state, then persists locally and, when signed in,
    /// schedules the remote write.
    pub async fn commit<F>(&self, flow_type: FlowType, mutate: F) -> OrderState
    where
        F: FnOnce(&mut OrderState),
    {
        let mut guard = self.inner.state.lock().await;
        let tracked = self.inner.ensure_loaded(&mut guard, flow_type).await;
        mutate(&mut tracked.state);
        let committed = tracked.state.clone();
        self.inner.persist(&mut guard, flow_type, committed, ChangeSource::Local).await
    }

    pub async fn add_cart_item(&self, flow_type: FlowType, item: CartItem) -> OrderState {
        self.commit(flow_type, |state| state.add_item(item)).await
    }

    pub async fn remove_cart_item(&self, flow_type: FlowType, item_id: uuid::Uuid) -> OrderState {
        self.commit(flow_type, |state| {
            state.remove_item(item_id);
        })
        .await
    }

    pub async fn create_draft(&self, flow_type: FlowType) -> OrderState {
        let mut guard = self.inner.state.lock().await;
        let baseline = self.inner.ensure_loaded(&mut guard, flow_type).await.state.clone();
        guard.drafts.create_draft(flow_type, &baseline)
    }

    pub async fn draft(&self, flow_type: FlowType) -> Option<OrderState> {
        let guard = self.inner.state.lock().await;
        guard.drafts.draft(flow_type).map(|draft| draft.snapshot.clone())
    }

    pub async fn update_draft(
        &self,
        flow_type: FlowType,
        partial: &Value,
    ) -> Result<OrderState, DraftError> {
        let mut guard = self.inner.state.lock().await;
        guard.drafts.update_draft(flow_type, partial)
    }

    /// Validates `section` on the draft replayed over the live state. Only a valid draft
    /// reaches the live state; a rejected one stays open for further edits.
    pub async fn apply_draft(
        &self,
        flow_type: FlowType,
        section: OrderSection,
    ) -> Result<DraftApplyResult, DraftError> {
        let mut guard = self.inner.state.lock().await;
        let mut live = self.inner.ensure_loaded(&mut guard, flow_type).await.state.clone();
        let result = guard.drafts.apply_draft(flow_type, section, &mut live)?;

        let identity = guard.identity.as_ref().map(|id| id.0.clone());
        if result.valid {
            self.inner.audit.emit(
                AuditEvent::new(
                    Some(flow_type),
                    identity,
                    DRAFT_APPLIED,
                    AuditCategory::Draft,
                    ACTOR,
                    AuditOutcome::Success,
                )
                .with_metadata("section", section.as_str()),
            );
            self.inner.persist(&mut guard, flow_type, live, ChangeSource::Draft).await;
        } else {
            self.inner.audit.emit(
                AuditEvent::new(
                    Some(flow_type),
                    identity,
                    DRAFT_REJECTED,
                    AuditCategory::Draft,
                    ACTOR,
                    AuditOutcome::Rejected,
                )
                .with_metadata("section", section.as_str())
                .with_metadata("errors", result.errors.join("; ")),
            );
        }

        Ok(result)
    }

    pub async fn discard_draft(&self, flow_type: FlowType) -> bool {
        let mut guard = self.inner.state.lock().await;
        guard.drafts.discard_draft(flow_type)
    }

    /// Hands every loaded flow over to `profile`'s identity, prefills empty contact fields,
    /// and starts following remote changes.
    pub async fn sign_in(&self, profile: &CustomerProfile) {
        let mut guard = self.inner.state.lock().await;
        if let Some(task) = guard.subscription.take() {
            task.abort();
        }
        guard.identity = Some(profile.id.clone());
        let identity = profile.id.0.clone();
        let running_version = self.inner.cache.version();

        let mut flows: Vec<FlowType> = guard.baselines.keys().copied().collect();
        flows.sort();

        for flow_type in flows {
            let Some(tracked) = guard.baselines.get_mut(&flow_type) else {
                continue;
            };

            let handoff = if tracked.state.contact.has_identity_signal() {
                let record = RemoteOrderRecord {
                    flow_type,
                    identity: identity.clone(),
                    version: running_version,
                    state: tracked.state.clone(),
                    updated_at: tracked.updated_at,
                };
                match self.inner.remote.upsert(record).await {
                    Ok(()) => "uploaded_local",
                    Err(error) => {
                        warn!(
                            event_name = "sync.handoff_upload_failed",
                            flow_type = %flow_type,
                            error = %error,
                            "could not upload local order on sign-in"
                        );
                        "upload_failed"
                    }
                }
            } else {
                match self.inner.remote.fetch(flow_type, &identity).await {
                    Ok(Some(record)) if record.version == running_version => {
                        tracked.state = record.state;
                        tracked.state.refresh_totals();
                        tracked.updated_at = record.updated_at;
                        "adopted_remote"
                    }
                    Ok(Some(record)) => {
                        debug!(
                            event_name = "sync.handoff_version_mismatch",
                            flow_type = %flow_type,
                            remote_version = record.version,
                            running_version,
                            "ignoring remote order from another schema version"
                        );
                        "kept_local"
                    }
                    Ok(None) => "kept_local",
                    Err(error) => {
                        warn!(
                            event_name = "sync.handoff_fetch_failed",
                            flow_type = %flow_type,
                            error = %error,
                            "could not fetch remote order on sign-in"
                        );
                        "fetch_failed"
                    }
                }
            };

            let outcome = match handoff {
                "upload_failed" | "fetch_failed" => AuditOutcome::Failed,
                _ => AuditOutcome::Success,
            };
            let prefilled = tracked.state.prefill_contact(profile);
            let state = tracked.state.clone();
            if prefilled {
                self.inner.persist(&mut guard, flow_type, state, ChangeSource::SignIn).await;
            } else {
                self.inner.cache.save(&cache_key(flow_type), &state).await;
                let _ = self.inner.events.send(OrderStateEvent {
                    flow_type,
                    source: ChangeSource::SignIn,
                    state,
                });
            }

            self.inner.audit.emit(
                AuditEvent::new(
                    Some(flow_type),
                    Some(identity.clone()),
                    IDENTITY_HANDOFF,
                    AuditCategory::Sync,
                    ACTOR,
                    outcome,
                )
                .with_metadata("handoff", handoff)
                .with_metadata("prefilled", prefilled.to_string()),
            );
        }

        guard.subscription = Some(self.spawn_subscription());
        info!(event_name = "sync.signed_in", identity = %identity, "remote order sync started");
    }

    /// Stops remote sync. Writes committed while signed in are sent first; later commits
    /// stay local.
    pub async fn sign_out(&self) {
        let mut guard = self.inner.state.lock().await;
        if let Some(task) = guard.subscription.take() {
            task.abort();
        }
        self.inner.debouncer.flush().await;
        if let Some(identity) = guard.identity.take() {
            info!(
                event_name = "sync.signed_out",
                identity = %identity.0,
                "remote order sync stopped"
            );
        }
    }

    /// Sends any debounced remote writes immediately.
    pub async fn flush(&self) {
        self.inner.debouncer.flush().await;
    }

    fn spawn_subscription(&self) -> JoinHandle<()> {
        let mut changes = self.inner.remote.subscribe();
        let service: Weak<ServiceInner<C, R>> = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            loop {
                let record = match changes.recv().await {
                    Ok(record) => record,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(
                            event_name = "sync.feed_lagged",
                            skipped,
                            "remote change feed lagged"
                        );
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let Some(inner) = service.upgrade() else {
                    break;
                };
                inner.apply_remote(record).await;
            }
        })
    }
}

impl<C, R> ServiceInner<C, R>
where
    C: LocalCache + 'static,
    R: RemoteOrderStore + 'static,
{
    /// Makes `flow_type` live. While signed in, a newer remote record with the running
    /// version replaces the local copy.
    async fn ensure_loaded<'g>(
        &self,
        guard: &'g mut ServiceState,
        flow_type: FlowType,
    ) -> &'g mut TrackedState {
        if !guard.baselines.contains_key(&flow_type) {
            let mut tracked = match self
                .cache
                .load_envelope_at::<OrderState>(&cache_key(flow_type), Utc::now())
                .await
            {
                Some(envelope) if envelope.data.flow_type == flow_type => {
                    let mut state = envelope.data;
                    state.refresh_totals();
                    TrackedState { state, updated_at: envelope.timestamp }
                }
                _ => TrackedState {
                    state: OrderState::new(flow_type),
                    updated_at: DateTime::<Utc>::MIN_UTC,
                },
            };

            let mut source = "local";
            if let Some(identity) = guard.identity.as_ref() {
                if self.adopt_remote_on_load(flow_type, &identity.0, &mut tracked).await {
                    self.cache
                        .save_at(&cache_key(flow_type), &tracked.state, tracked.updated_at)
                        .await;
                    source = "remote";
                }
            }
            debug!(
                event_name = "sync.loaded",
                flow_type = %flow_type,
                source,
                "order state loaded"
            );
            guard.baselines.insert(flow_type, tracked);
        }

        guard.baselines.entry(flow_type).or_insert_with(|| TrackedState {
            state: OrderState::new(flow_type),
            updated_at: DateTime::<Utc>::MIN_UTC,
        })
    }

    async fn adopt_remote_on_load(
        &self,
        flow_type: FlowType,
        identity: &str,
        tracked: &mut TrackedState,
    ) -> bool {
        let running_version = self.cache.version();
        match self.remote.fetch(flow_type, identity).await {
            Ok(Some(record))
                if record.version == running_version && record.updated_at > tracked.updated_at =>
            {
                tracked.state = record.state;
                tracked.state.refresh_totals();
                tracked.updated_at = record.updated_at;
                true
            }
            Ok(_) => false,
            Err(error) => {
                warn!(
                    event_name = "sync.load_fetch_failed",
                    flow_type = %flow_type,
                    error = %error,
                    "could not fetch remote order while loading"
                );
                self.audit.emit(
                    AuditEvent::new(
                        Some(flow_type),
                        Some(identity.to_string()),
                        REMOTE_FETCH_FAILED,
                        AuditCategory::Persistence,
                        ACTOR,
                        AuditOutcome::Failed,
                    )
                    .with_metadata("error", error.to_string()),
                );
                false
            }
        }
    }

    /// Stores `state` as the live state, writes it locally and queues the remote write.
    async fn persist(
        &self,
        guard: &mut ServiceState,
        flow_type: FlowType,
        mut state: OrderState,
        source: ChangeSource,
    ) -> OrderState {
        state.refresh_totals();
        let updated_at = Utc::now();
        guard.baselines.insert(flow_type, TrackedState { state: state.clone(), updated_at });

        self.cache.save_at(&cache_key(flow_type), &state, updated_at).await;

        if let Some(identity) = guard.identity.as_ref() {
            self.debouncer.schedule(RemoteOrderRecord {
                flow_type,
                identity: identity.0.clone(),
                version: self.cache.version(),
                state: state.clone(),
                updated_at,
            });
        }

        let _ = self.events.send(OrderStateEvent { flow_type, source, state: state.clone() });
        state
    }

    async fn apply_remote(&self, record: RemoteOrderRecord) {
        let mut guard = self.state.lock().await;
        let Some(identity) = guard.identity.as_ref() else {
            return;
        };
        if identity.0 != record.identity {
            return;
        }
        let identity = identity.0.clone();
        let flow_type = record.flow_type;
        let Some(tracked) = guard.baselines.get_mut(&flow_type) else {
            debug!(
                event_name = "sync.remote_update_unloaded",
                flow_type = %flow_type,
                "flow not loaded; its next load fetches the remote record"
            );
            return;
        };

        let running_version = self.cache.version();
        let drop_reason = if record.version != running_version {
            Some("version_mismatch")
        } else if record.updated_at == tracked.updated_at {
            // Our own write coming back.
            return;
        } else if record.updated_at < tracked.updated_at {
            Some("stale")
        } else {
            None
        };

        if let Some(reason) = drop_reason {
            debug!(
                event_name = "sync.remote_update_dropped",
                flow_type = %flow_type,
                reason,
                remote_version = record.version,
                running_version,
                "remote update ignored"
            );
            self.audit.emit(
                AuditEvent::new(
                    Some(flow_type),
                    Some(identity),
                    REMOTE_UPDATE_DROPPED,
                    AuditCategory::Sync,
                    ACTOR,
                    AuditOutcome::Rejected,
                )
                .with_metadata("reason", reason),
            );
            return;
        }

        tracked.state = record.state;
        tracked.state.refresh_totals();
        tracked.updated_at = record.updated_at;
        let state = tracked.state.clone();

        self.cache.save_at(&cache_key(flow_type), &state, record.updated_at).await;
        let _ = self.events.send(OrderStateEvent {
            flow_type,
            source: ChangeSource::Remote,
            state,
        });
        self.audit.emit(AuditEvent::new(
            Some(flow_type),
            Some(identity),
            REMOTE_UPDATE_APPLIED,
            AuditCategory::Sync,
            ACTOR,
            AuditOutcome::Success,
        ));
        debug!(
            event_name = "sync.remote_update_applied",
            flow_type = %flow_type,
            "remote update applied"
        );
    }
}
