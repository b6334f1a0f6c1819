use thiserror::Error;
use tracing::debug;

use crate::configurator::steps::{ProductConfig, StepConfig};
use crate::configurator::validators::{StepValidation, StepValidatorRegistry};
use crate::domain::selection::Selections;
use crate::flows::states::{NavigationDirection, NavigationOutcome};

pub trait FlowDefinition {
    fn steps(&self) -> &[StepConfig];
}

impl FlowDefinition for ProductConfig {
    fn steps(&self) -> &[StepConfig] {
        &self.customization_flow
    }
}

impl FlowDefinition for [StepConfig] {
    fn steps(&self) -> &[StepConfig] {
        self
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("step `{step_id}` is not part of this flow")]
    UnknownStep { step_id: String },
}

/// Step sequencing and gating over one flow definition. Holds no position of its own; the
/// caller owns the current index and selections.
pub struct FlowEngine<'a, F: ?Sized> {
    flow: &'a F,
    validators: &'a StepValidatorRegistry,
}

impl<'a, F> FlowEngine<'a, F>
where
    F: FlowDefinition + ?Sized,
{
    pub fn new(flow: &'a F, validators: &'a StepValidatorRegistry) -> Self {
        Self { flow, validators }
    }

    pub fn step_count(&self) -> usize {
        self.flow.steps().len()
    }

    pub fn validate_step(&self, index: usize, selections: &Selections) -> StepValidation {
        match self.flow.steps().get(index) {
            Some(step) => self.validators.validate(step, selections),
            None => StepValidation::ok(),
        }
    }

    pub fn navigate_next(&self, index: usize, selections: &Selections) -> NavigationOutcome {
        let direction = NavigationDirection::Forward;
        let validation = self.validate_step(index, selections);
        if !validation.valid {
            let message =
                validation.message.unwrap_or_else(|| "Please complete this step.".to_string());
            debug!(
                event_name = "configurator.navigate_rejected",
                from_index = index,
                error = %message,
                "forward navigation blocked by step validator"
            );
            return NavigationOutcome::rejected(direction, index, message);
        }

        match self.next_reachable(index, selections) {
            Some(target) => {
                debug!(
                    event_name = "configurator.navigate",
                    direction = "forward",
                    from_index = index,
                    to_index = target,
                    "advanced to next reachable step"
                );
                NavigationOutcome::moved(direction, index, target)
            }
            None => NavigationOutcome::stayed(direction, index),
        }
    }

    pub fn navigate_back(&self, index: usize, selections: &Selections) -> NavigationOutcome {
        let direction = NavigationDirection::Backward;
        match self.previous_reachable(index, selections) {
            Some(target) => {
                debug!(
                    event_name = "configurator.navigate",
                    direction = "backward",
                    from_index = index,
                    to_index = target,
                    "moved back to previous reachable step"
                );
                NavigationOutcome::moved(direction, index, target)
            }
            None => NavigationOutcome::stayed(direction, index),
        }
    }

    /// Direct index lookup for edit-mode re-entry. Skip rules are not consulted.
    pub fn jump_to_step(&self, step_id: &str) -> Result<usize, FlowTransitionError> {
        self.flow
            .steps()
            .iter()
            .position(|step| step.id == step_id)
            .ok_or_else(|| FlowTransitionError::UnknownStep { step_id: step_id.to_string() })
    }

    pub fn is_first_step(&self, index: usize) -> bool {
        index == 0
    }

    /// Position check only, so first and last stay exclusive in multi-step flows. When every
    /// later step is skipped the index is not last, yet [`Self::has_next_step`] is false and
    /// `navigate_next` stays put.
    pub fn is_last_step(&self, index: usize) -> bool {
        index + 1 >= self.step_count()
    }

    /// Whether forward navigation from `index` can land on a step under `selections`.
    pub fn has_next_step(&self, index: usize, selections: &Selections) -> bool {
        self.next_reachable(index, selections).is_some()
    }

    pub fn is_skipped(&self, index: usize, selections: &Selections) -> bool {
        self.flow.steps().get(index).is_some_and(|step| step.is_skipped(selections))
    }

    /// Steps a customer would currently pass through, in order.
    pub fn reachable_steps<'s>(
        &'s self,
        selections: &'s Selections,
    ) -> impl Iterator<Item = &'a StepConfig> + 's {
        let flow: &'a F = self.flow;
        flow.steps().iter().filter(move |step| !step.is_skipped(selections))
    }

    fn next_reachable(&self, index: usize, selections: &Selections) -> Option<usize> {
        (index + 1..self.step_count()).find(|candidate| !self.is_skipped(*candidate, selections))
    }

    fn previous_reachable(&self, index: usize, selections: &Selections) -> Option<usize> {
        (0..index.min(self.step_count()))
            .rev()
            .find(|candidate| !self.is_skipped(*candidate, selections))
    }
}
