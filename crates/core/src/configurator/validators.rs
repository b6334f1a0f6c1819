use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::configurator::steps::{StepConfig, StepType};
use crate::domain::selection::{SelectionValue, Selections};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepValidation {
    pub valid: bool,
    pub message: Option<String>,
}

impl StepValidation {
    pub fn ok() -> Self {
        Self { valid: true, message: None }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self { valid: false, message: Some(message.into()) }
    }
}

pub type StepValidatorFn = fn(&StepConfig, &Selections) -> StepValidation;

/// Step type to validator lookup. Types without an entry are treated as valid.
#[derive(Clone)]
pub struct StepValidatorRegistry {
    validators: HashMap<StepType, StepValidatorFn>,
}

impl Default for StepValidatorRegistry {
    fn default() -> Self {
        Self::empty()
            .with(StepType::SingleChoice, validate_single_choice)
            .with(StepType::VariantSelector, validate_variant_selector)
            .with(StepType::MultiChoice, validate_multi_choice)
            .with(StepType::IncludedDips, validate_included_dips)
            .with(StepType::OptionalAddons, always_valid)
            .with(StepType::Review, always_valid)
    }
}

impl StepValidatorRegistry {
    pub fn empty() -> Self {
        Self { validators: HashMap::new() }
    }

    pub fn with(mut self, step_type: StepType, validator: StepValidatorFn) -> Self {
        self.register(step_type, validator);
        self
    }

    pub fn register(&mut self, step_type: StepType, validator: StepValidatorFn) {
        self.validators.insert(step_type, validator);
    }

    pub fn validate(&self, step: &StepConfig, selections: &Selections) -> StepValidation {
        match self.validators.get(&step.step_type) {
            Some(validator) => validator(step, selections),
            None => {
                warn!(
                    event_name = "configurator.validator_missing",
                    step_id = %step.id,
                    step_type = %step.step_type,
                    "no validator registered for step type, allowing progress"
                );
                StepValidation::ok()
            }
        }
    }
}

pub fn validate_single_choice(step: &StepConfig, selections: &Selections) -> StepValidation {
    if !step.required || selections.get(&step.id).is_some() {
        return StepValidation::ok();
    }
    StepValidation::invalid(format!("Please choose a {}.", step.label.to_lowercase()))
}

pub fn validate_variant_selector(step: &StepConfig, selections: &Selections) -> StepValidation {
    if !step.required || selections.variant.is_some() {
        return StepValidation::ok();
    }
    StepValidation::invalid("Please select a size.")
}

pub fn validate_multi_choice(step: &StepConfig, selections: &Selections) -> StepValidation {
    if !step.required {
        return StepValidation::ok();
    }

    let minimum = step.min_selections.unwrap_or(1) as usize;
    let count = selections.get(&step.id).map(SelectionValue::selection_count).unwrap_or(0);
    if count >= minimum {
        return StepValidation::ok();
    }

    let noun = if minimum == 1 { "option" } else { "options" };
    StepValidation::invalid(format!(
        "Please select at least {minimum} {noun} for {}.",
        step.label.to_lowercase()
    ))
}

pub fn validate_included_dips(step: &StepConfig, selections: &Selections) -> StepValidation {
    let selection = selections.get(&step.id);
    if matches!(selection, Some(SelectionValue::NoDip)) || !step.required {
        return StepValidation::ok();
    }

    let total = selection.map(SelectionValue::total_quantity).unwrap_or(0);
    if total >= 1 {
        return StepValidation::ok();
    }
    StepValidation::invalid("Please choose at least one dip, or select no dip.")
}

pub fn always_valid(_step: &StepConfig, _selections: &Selections) -> StepValidation {
    StepValidation::ok()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rust_decimal::Decimal;

    use super::{StepValidation, StepValidatorRegistry};
    use crate::configurator::steps::{StepConfig, StepType};
    use crate::domain::product::Variant;
    use crate::domain::selection::{SelectionValue, Selections};

    #[test]
    fn required_single_choice_needs_a_selection() {
        let registry = StepValidatorRegistry::default();
        let step = StepConfig::new("style", StepType::SingleChoice, "Style").required();
        let mut selections = Selections::default();

        let result = registry.validate(&step, &selections);
        assert!(!result.valid);
        assert_eq!(result.message.as_deref(), Some("Please choose a style."));

        selections.set("style", SelectionValue::Choice("boneless".to_string()));
        assert!(registry.validate(&step, &selections).valid);

        let optional = StepConfig::new("style", StepType::SingleChoice, "Style");
        assert!(registry.validate(&optional, &Selections::default()).valid);
    }

    #[test]
    fn variant_selector_reads_the_copied_variant() {
        let registry = StepValidatorRegistry::default();
        let step = StepConfig::new("size", StepType::VariantSelector, "Size").required();
        let mut selections = Selections::default();
        assert!(!registry.validate(&step, &selections).valid);

        selections.variant = Some(Variant {
            id: "wings-6".to_string(),
            name: "6 Wings".to_string(),
            price: Decimal::new(699, 2),
            count: Some(6),
        });
        assert!(registry.validate(&step, &selections).valid);
    }

    #[test]
    fn multi_choice_enforces_minimum_only_when_required() {
        let registry = StepValidatorRegistry::default();
        let step = StepConfig::new("sauces", StepType::MultiChoice, "Sauces")
            .required()
            .with_limits(Some(2), Some(3));
        let mut selections = Selections::default();
        selections.set("sauces", SelectionValue::Choices(vec!["buffalo".to_string()]));

        let result = registry.validate(&step, &selections);
        assert!(!result.valid);
        assert_eq!(result.message.as_deref(), Some("Please select at least 2 options for sauces."));

        selections.set(
            "sauces",
            SelectionValue::Choices(vec!["buffalo".to_string(), "garlic".to_string()]),
        );
        assert!(registry.validate(&step, &selections).valid);
    }

    #[test]
    fn included_dips_accepts_no_dip_sentinel_or_positive_quantity() {
        let registry = StepValidatorRegistry::default();
        let step = StepConfig::new("dips", StepType::IncludedDips, "Dips").required();
        let mut selections = Selections::default();
        assert!(!registry.validate(&step, &selections).valid);

        selections.set("dips", SelectionValue::NoDip);
        assert!(registry.validate(&step, &selections).valid);

        selections.set("dips", SelectionValue::Quantities(BTreeMap::new()));
        assert!(!registry.validate(&step, &selections).valid);

        selections
            .set("dips", SelectionValue::Quantities(BTreeMap::from([("ranch".to_string(), 1)])));
        assert!(registry.validate(&step, &selections).valid);
    }

    #[test]
    fn addons_and_review_always_pass() {
        let registry = StepValidatorRegistry::default();
        let addons = StepConfig::new("extras", StepType::OptionalAddons, "Extras").required();
        let review = StepConfig::new("review", StepType::Review, "Review").required();

        assert!(registry.validate(&addons, &Selections::default()).valid);
        assert!(registry.validate(&review, &Selections::default()).valid);
    }

    #[test]
    fn unregistered_step_type_fails_open() {
        let registry = StepValidatorRegistry::empty();
        let step = StepConfig::new("heat", StepType::Unknown("spice-meter".to_string()), "Heat")
            .required();

        assert_eq!(registry.validate(&step, &Selections::default()), StepValidation::ok());
    }

    #[test]
    fn registered_validator_overrides_default() {
        fn never(_: &StepConfig, _: &Selections) -> StepValidation {
            StepValidation::invalid("closed")
        }

        let registry = StepValidatorRegistry::default().with(StepType::Review, never);
        let review = StepConfig::new("review", StepType::Review, "Review");
        assert!(!registry.validate(&review, &Selections::default()).valid);
    }
}
