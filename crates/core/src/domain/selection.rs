use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::product::Variant;

pub const NO_DIP: &str = "no-dip";

/// Per-step selection; the shape follows the step's type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SelectionValue {
    Choice(String),
    Choices(Vec<String>),
    Quantities(BTreeMap<String, u32>),
    NoDip,
}

impl SelectionValue {
    /// Single-equality contract used by skip rules. Lists and quantity maps never match.
    pub fn equals(&self, value: &str) -> bool {
        match self {
            Self::Choice(choice) => choice == value,
            Self::NoDip => value == NO_DIP,
            Self::Choices(_) | Self::Quantities(_) => false,
        }
    }

    pub fn selection_count(&self) -> usize {
        match self {
            Self::Choice(_) => 1,
            Self::Choices(choices) => choices.len(),
            Self::Quantities(quantities) => {
                quantities.values().fold(0_usize, |total, quantity| {
                    total.saturating_add(*quantity as usize)
                })
            }
            Self::NoDip => 0,
        }
    }

    pub fn total_quantity(&self) -> u32 {
        match self {
            Self::Quantities(quantities) => {
                quantities.values().fold(0_u32, |total, quantity| total.saturating_add(*quantity))
            }
            _ => 0,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selections {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<Variant>,
    #[serde(default)]
    pub steps: BTreeMap<String, SelectionValue>,
}

impl Selections {
    pub fn get(&self, step_id: &str) -> Option<&SelectionValue> {
        self.steps.get(step_id)
    }

    pub fn set(&mut self, step_id: impl Into<String>, value: SelectionValue) {
        self.steps.insert(step_id.into(), value);
    }

    pub fn clear(&mut self, step_id: &str) -> Option<SelectionValue> {
        self.steps.remove(step_id)
    }

    /// Whether `key` currently holds `value`. The reserved `variant` key compares against the
    /// selected variant's id.
    pub fn key_equals(&self, key: &str, value: &str) -> bool {
        if key == "variant" {
            return self.variant.as_ref().is_some_and(|variant| variant.id == value);
        }
        self.steps.get(key).is_some_and(|selection| selection.equals(value))
    }

    pub fn quantities(&self, step_id: &str) -> Option<&BTreeMap<String, u32>> {
        match self.steps.get(step_id) {
            Some(SelectionValue::Quantities(quantities)) => Some(quantities),
            _ => None,
        }
    }
}
