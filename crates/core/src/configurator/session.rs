use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use crate::configurator::pricing::PriceBreakdown;
use crate::configurator::steps::{ProductConfig, StepConfig, StepType};
use crate::configurator::ConfiguratorRuntime;
use crate::domain::order::CartItem;
use crate::domain::product::{Catalog, ProductData, ProductId};
use crate::domain::selection::{SelectionValue, Selections};
use crate::errors::DomainError;
use crate::flows::{FlowEngine, NavigationOutcome};

/// Read-only projection handed to the presentation layer after every change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfiguratorView {
    pub session_id: Uuid,
    pub product_id: ProductId,
    pub current_step_index: usize,
    pub current_step: Option<StepConfig>,
    pub selections: Selections,
    pub price_breakdown: PriceBreakdown,
    pub is_first_step: bool,
    pub is_last_step: bool,
    /// False when every later step is skipped, even if this is not the last step.
    pub has_next_step: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationOutcome {
    pub applied: bool,
    pub error: Option<String>,
}

impl MutationOutcome {
    fn applied() -> Self {
        Self { applied: true, error: None }
    }

    fn rejected(error: impl Into<String>) -> Self {
        Self { applied: false, error: Some(error.into()) }
    }
}

/// One customer's walk through one product's customization flow. Owned by a single
/// interaction; every mutation runs to completion and re-prices before returning.
pub struct ConfiguratorSession {
    id: Uuid,
    product_id: ProductId,
    config: ProductConfig,
    product: ProductData,
    catalog: Arc<Catalog>,
    runtime: Arc<ConfiguratorRuntime>,
    current_step_index: usize,
    selections: Selections,
    price_breakdown: PriceBreakdown,
    notifier: watch::Sender<ConfiguratorView>,
}

impl ConfiguratorSession {
    pub fn open(
        product: ProductData,
        config: ProductConfig,
        catalog: Arc<Catalog>,
        runtime: Arc<ConfiguratorRuntime>,
    ) -> Self {
        let id = Uuid::new_v4();
        let selections = Selections::default();
        let price_breakdown = runtime.pricing.price(&selections, &product, &config, &catalog);
        let has_next_step =
            FlowEngine::new(&config, &runtime.validators).has_next_step(0, &selections);
        let view = ConfiguratorView {
            session_id: id,
            product_id: product.id.clone(),
            current_step_index: 0,
            current_step: config.step(0).cloned(),
            selections: selections.clone(),
            price_breakdown: price_breakdown.clone(),
            is_first_step: true,
            is_last_step: config.len() <= 1,
            has_next_step,
        };
        let (notifier, _) = watch::channel(view);

        debug!(
            event_name = "configurator.opened",
            session_id = %id,
            product_id = %product.id.0,
            product_type = %config.product_type,
            steps = config.len(),
            "configurator session opened"
        );

        Self {
            id,
            product_id: product.id.clone(),
            config,
            product,
            catalog,
            runtime,
            current_step_index: 0,
            selections,
            price_breakdown,
            notifier,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn selections(&self) -> &Selections {
        &self.selections
    }

    pub fn price_breakdown(&self) -> &PriceBreakdown {
        &self.price_breakdown
    }

    pub fn current_step_index(&self) -> usize {
        self.current_step_index
    }

    pub fn current_step(&self) -> Option<&StepConfig> {
        self.config.step(self.current_step_index)
    }

    pub fn is_first_step(&self) -> bool {
        self.engine().is_first_step(self.current_step_index)
    }

    pub fn is_last_step(&self) -> bool {
        self.engine().is_last_step(self.current_step_index)
    }

    pub fn has_next_step(&self) -> bool {
        self.engine().has_next_step(self.current_step_index, &self.selections)
    }

    pub fn view(&self) -> ConfiguratorView {
        ConfiguratorView {
            session_id: self.id,
            product_id: self.product_id.clone(),
            current_step_index: self.current_step_index,
            current_step: self.current_step().cloned(),
            selections: self.selections.clone(),
            price_breakdown: self.price_breakdown.clone(),
            is_first_step: self.is_first_step(),
            is_last_step: self.is_last_step(),
            has_next_step: self.has_next_step(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ConfiguratorView> {
        self.notifier.subscribe()
    }

    pub fn select_option(&mut self, step_id: &str, option_id: &str) -> MutationOutcome {
        let step = match self.step_of_type(step_id, &[StepType::SingleChoice]) {
            Ok(step) => step,
            Err(outcome) => return outcome,
        };
        if let Err(outcome) = self.check_known_option(&step, option_id) {
            return outcome;
        }

        self.selections.set(step_id, SelectionValue::Choice(option_id.to_string()));
        self.clear_dependents(step_id);
        self.changed("select_option", step_id)
    }

    /// Copies the product's variant into the selections; later catalog refreshes cannot
    /// move the locked-in price.
    pub fn select_variant(&mut self, variant_id: &str) -> MutationOutcome {
        let Some(variant) = self.product.find_variant(variant_id).cloned() else {
            return MutationOutcome::rejected(format!(
                "{} is not available for {}.",
                variant_id, self.product.name
            ));
        };

        self.selections.variant = Some(variant);
        self.clear_dependents("variant");
        self.changed("select_variant", "variant")
    }

    pub fn toggle_multi_choice(&mut self, step_id: &str, option_id: &str) -> MutationOutcome {
        let step = match self.step_of_type(step_id, &[StepType::MultiChoice]) {
            Ok(step) => step,
            Err(outcome) => return outcome,
        };

        let mut choices = match self.selections.get(step_id) {
            Some(SelectionValue::Choices(choices)) => choices.clone(),
            _ => Vec::new(),
        };

        if let Some(position) = choices.iter().position(|choice| choice == option_id) {
            choices.remove(position);
        } else {
            if let Err(outcome) = self.check_known_option(&step, option_id) {
                return outcome;
            }
            if let Some(max) = step.max_selections {
                if choices.len() >= max as usize {
                    return MutationOutcome::rejected(format!(
                        "You can choose up to {max} {}.",
                        step.label.to_lowercase()
                    ));
                }
            }
            choices.push(option_id.to_string());
        }

        self.selections.set(step_id, SelectionValue::Choices(choices));
        self.clear_dependents(step_id);
        self.changed("toggle_multi_choice", step_id)
    }

    pub fn change_addon_quantity(
        &mut self,
        step_id: &str,
        item_id: &str,
        delta: i32,
    ) -> MutationOutcome {
        let step = match self
            .step_of_type(step_id, &[StepType::IncludedDips, StepType::OptionalAddons])
        {
            Ok(step) => step,
            Err(outcome) => return outcome,
        };
        if delta == 0 {
            return MutationOutcome::applied();
        }

        let mut quantities: BTreeMap<String, u32> =
            self.selections.quantities(step_id).cloned().unwrap_or_default();
        let current = quantities.get(item_id).copied().unwrap_or(0);

        if delta > 0 {
            if current == 0 {
                if let Err(outcome) = self.check_known_option(&step, item_id) {
                    return outcome;
                }
            }
            let total = quantities
                .values()
                .try_fold(0_u32, |total, quantity| total.checked_add(*quantity))
                .and_then(|total| total.checked_add(delta.unsigned_abs()));
            let Some(total) = total else {
                return MutationOutcome::rejected(format!("{} quantity is too large.", step.label));
            };
            if let Some(max) = step.max_selections {
                if total > max {
                    return MutationOutcome::rejected(format!(
                        "{} is limited to {max} in total.",
                        step.label
                    ));
                }
            }
        }

        // The step total fits in u32, so a single item's quantity does too.
        let updated = if delta > 0 {
            current.saturating_add(delta.unsigned_abs())
        } else {
            current.saturating_sub(delta.unsigned_abs())
        };
        if updated == 0 {
            quantities.remove(item_id);
        } else {
            quantities.insert(item_id.to_string(), updated);
        }

        self.selections.set(step_id, SelectionValue::Quantities(quantities));
        self.clear_dependents(step_id);
        self.changed("change_addon_quantity", step_id)
    }

    /// Chooses the explicit "no dip" sentinel for an included-dips step.
    pub fn select_no_dip(&mut self, step_id: &str) -> MutationOutcome {
        if let Err(outcome) = self.step_of_type(step_id, &[StepType::IncludedDips]) {
            return outcome;
        }

        self.selections.set(step_id, SelectionValue::NoDip);
        self.clear_dependents(step_id);
        self.changed("select_no_dip", step_id)
    }

    pub fn next(&mut self) -> NavigationOutcome {
        let outcome = self.engine().navigate_next(self.current_step_index, &self.selections);
        if outcome.advanced {
            self.current_step_index = outcome.to_index;
            self.recompute();
        }
        outcome
    }

    pub fn back(&mut self) -> NavigationOutcome {
        let outcome = self.engine().navigate_back(self.current_step_index, &self.selections);
        if outcome.advanced {
            self.current_step_index = outcome.to_index;
            self.recompute();
        }
        outcome
    }

    pub fn jump_to_step(&mut self, step_id: &str) -> Result<(), DomainError> {
        let index = self.engine().jump_to_step(step_id)?;
        self.current_step_index = index;
        self.recompute();
        Ok(())
    }

    /// Checks every step the customer would pass through and snapshots the configured item.
    pub fn add_to_cart(&self) -> Result<CartItem, DomainError> {
        let engine = self.engine();
        for step in engine.reachable_steps(&self.selections) {
            let validation = self.runtime.validators.validate(step, &self.selections);
            if !validation.valid {
                return Err(DomainError::IncompleteConfiguration {
                    step_id: step.id.clone(),
                    message: validation
                        .message
                        .unwrap_or_else(|| "Please complete this step.".to_string()),
                });
            }
        }

        let name = match &self.selections.variant {
            Some(variant) => format!("{} - {}", self.product.name, variant.name),
            None => self.product.name.clone(),
        };

        debug!(
            event_name = "configurator.added_to_cart",
            session_id = %self.id,
            product_id = %self.product_id.0,
            total = %self.price_breakdown.total,
            "configured item ready for cart"
        );

        Ok(CartItem {
            id: Uuid::new_v4(),
            product_id: self.product_id.clone(),
            name,
            selections: self.selections.clone(),
            price_breakdown: self.price_breakdown.clone(),
            quantity: 1,
        })
    }

    fn engine(&self) -> FlowEngine<'_, ProductConfig> {
        FlowEngine::new(&self.config, &self.runtime.validators)
    }

    fn step_of_type(
        &self,
        step_id: &str,
        accepted: &[StepType],
    ) -> Result<StepConfig, MutationOutcome> {
        let Some(step) = self.config.step_by_id(step_id) else {
            return Err(MutationOutcome::rejected(format!("Unknown step `{step_id}`.")));
        };
        if !accepted.contains(&step.step_type) {
            return Err(MutationOutcome::rejected(format!(
                "Step `{step_id}` ({}) does not accept this change.",
                step.step_type
            )));
        }
        Ok(step.clone())
    }

    fn check_known_option(
        &self,
        step: &StepConfig,
        option_id: &str,
    ) -> Result<(), MutationOutcome> {
        let Some(items) = step.data_source.as_deref().and_then(|name| self.catalog.collection(name))
        else {
            return Ok(());
        };
        if items.iter().any(|item| item.id == option_id) {
            return Ok(());
        }
        Err(MutationOutcome::rejected(format!(
            "{option_id} is not available for {}.",
            step.label.to_lowercase()
        )))
    }

    /// Drops selections of steps declared as depending on `key`, transitively.
    fn clear_dependents(&mut self, key: &str) {
        let mut pending = vec![key.to_string()];
        while let Some(changed) = pending.pop() {
            for step in &self.config.customization_flow {
                if step.depends_on.as_deref() == Some(changed.as_str())
                    && self.selections.clear(&step.id).is_some()
                {
                    pending.push(step.id.clone());
                }
            }
        }
    }

    fn changed(&mut self, operation: &'static str, step_id: &str) -> MutationOutcome {
        debug!(
            event_name = "configurator.selection_changed",
            session_id = %self.id,
            operation,
            step_id,
            "selection updated"
        );
        self.recompute();
        MutationOutcome::applied()
    }

    fn recompute(&mut self) {
        self.price_breakdown = self.runtime.pricing.price(
            &self.selections,
            &self.product,
            &self.config,
            &self.catalog,
        );
        self.notifier.send_replace(self.view());
    }
}
