pub mod merge;
pub mod sections;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::domain::order::OrderState;
use crate::flows::FlowType;

pub use self::merge::deep_merge;
pub use self::sections::{OrderSection, SectionValidatorRegistry};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DraftError {
    #[error("no active draft for {flow}")]
    NoActiveDraft { flow: FlowType },
    #[error("draft change could not be merged: {0}")]
    Merge(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftApplyResult {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// An isolated edit copy. `patch` accumulates every partial applied so the edit can be
/// replayed over whatever the live state has become by the time it is applied.
#[derive(Clone, Debug, PartialEq)]
pub struct Draft {
    pub snapshot: OrderState,
    pub patch: Value,
}

/// Holds at most one draft per flow. Drafts never reach the live state except through
/// [`DraftManager::apply_draft`].
#[derive(Clone, Default)]
pub struct DraftManager {
    drafts: HashMap<FlowType, Draft>,
    validators: SectionValidatorRegistry,
}

impl DraftManager {
    pub fn new(validators: SectionValidatorRegistry) -> Self {
        Self { drafts: HashMap::new(), validators }
    }

    pub fn create_draft(&mut self, flow: FlowType, baseline: &OrderState) -> OrderState {
        let replaced = self
            .drafts
            .insert(
                flow,
                Draft { snapshot: baseline.clone(), patch: Value::Object(Default::default()) },
            )
            .is_some();
        debug!(event_name = "drafts.created", flow_type = %flow, replaced, "draft opened");
        baseline.clone()
    }

    pub fn draft(&self, flow: FlowType) -> Option<&Draft> {
        self.drafts.get(&flow)
    }

    pub fn has_draft(&self, flow: FlowType) -> bool {
        self.drafts.contains_key(&flow)
    }

    /// Folds `partial` into the draft copy and returns the updated copy.
    pub fn update_draft(
        &mut self,
        flow: FlowType,
        partial: &Value,
    ) -> Result<OrderState, DraftError> {
        let draft = self.drafts.get_mut(&flow).ok_or(DraftError::NoActiveDraft { flow })?;

        let snapshot = merged(&draft.snapshot, partial)?;
        deep_merge(&mut draft.patch, partial);
        draft.snapshot = snapshot;

        Ok(draft.snapshot.clone())
    }

    /// Replays the draft's accumulated changes over `live` and validates `section` on the
    /// result. On success `live` is replaced and the draft cleared; otherwise nothing changes.
    pub fn apply_draft(
        &mut self,
        flow: FlowType,
        section: OrderSection,
        live: &mut OrderState,
    ) -> Result<DraftApplyResult, DraftError> {
        let draft = self.drafts.get(&flow).ok_or(DraftError::NoActiveDraft { flow })?;

        let mut candidate = merged(live, &draft.patch)?;
        candidate.refresh_totals();

        let errors = self.validators.validate(section, &candidate);
        if !errors.is_empty() {
            debug!(
                event_name = "drafts.apply_rejected",
                flow_type = %flow,
                section = %section,
                error_count = errors.len(),
                "draft kept after failed section validation"
            );
            return Ok(DraftApplyResult { valid: false, errors });
        }

        *live = candidate;
        self.drafts.remove(&flow);
        debug!(
            event_name = "drafts.applied",
            flow_type = %flow,
            section = %section,
            "draft applied"
        );
        Ok(DraftApplyResult { valid: true, errors: Vec::new() })
    }

    /// Drops the draft for `flow`, if any.
    pub fn discard_draft(&mut self, flow: FlowType) -> bool {
        self.drafts.remove(&flow).is_some()
    }
}

fn merged(state: &OrderState, patch: &Value) -> Result<OrderState, DraftError> {
    let mut value =
        serde_json::to_value(state).map_err(|error| DraftError::Merge(error.to_string()))?;
    deep_merge(&mut value, patch);
    serde_json::from_value(value).map_err(|error| DraftError::Merge(error.to_string()))
}
