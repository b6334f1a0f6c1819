use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::selection::Selections;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepType {
    SingleChoice,
    VariantSelector,
    MultiChoice,
    IncludedDips,
    OptionalAddons,
    Review,
    /// Tag found in authored config that this build does not know about.
    Unknown(String),
}

impl StepType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::SingleChoice => "single-choice",
            Self::VariantSelector => "variant-selector",
            Self::MultiChoice => "multi-choice",
            Self::IncludedDips => "included-dips",
            Self::OptionalAddons => "optional-addons",
            Self::Review => "review",
            Self::Unknown(tag) => tag,
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "single-choice" => Self::SingleChoice,
            "variant-selector" => Self::VariantSelector,
            "multi-choice" => Self::MultiChoice,
            "included-dips" => Self::IncludedDips,
            "optional-addons" => Self::OptionalAddons,
            "review" => Self::Review,
            _ => Self::Unknown(value.to_string()),
        }
    }

    pub fn is_quantity_based(&self) -> bool {
        matches!(self, Self::IncludedDips | Self::OptionalAddons)
    }
}

impl From<String> for StepType {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<StepType> for String {
    fn from(value: StepType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    #[default]
    Fixed,
    Catalog,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipIf {
    pub key: String,
    pub value: String,
}

impl SkipIf {
    pub fn holds(&self, selections: &Selections) -> bool {
        selections.key_equals(&self.key, &self.value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub label: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_selections: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_selections: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_if: Option<SkipIf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_per_item: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_source: Option<PriceSource>,
}

impl StepConfig {
    pub fn new(id: impl Into<String>, step_type: StepType, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            step_type,
            label: label.into(),
            required: false,
            min_selections: None,
            max_selections: None,
            depends_on: None,
            skip_if: None,
            data_source: None,
            price_per_item: None,
            price_source: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_limits(mut self, min: Option<u32>, max: Option<u32>) -> Self {
        self.min_selections = min;
        self.max_selections = max;
        self
    }

    pub fn skip_when(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.skip_if = Some(SkipIf { key: key.into(), value: value.into() });
        self
    }

    pub fn from_source(mut self, data_source: impl Into<String>) -> Self {
        self.data_source = Some(data_source.into());
        self
    }

    pub fn priced_per_item(mut self, price: Decimal) -> Self {
        self.price_per_item = Some(price);
        self.price_source = Some(PriceSource::Fixed);
        self
    }

    pub fn priced_from_catalog(mut self) -> Self {
        self.price_source = Some(PriceSource::Catalog);
        self
    }

    pub fn is_skipped(&self, selections: &Selections) -> bool {
        self.skip_if.as_ref().is_some_and(|rule| rule.holds(selections))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductConfig {
    pub product_type: String,
    pub customization_flow: Vec<StepConfig>,
}

impl ProductConfig {
    pub fn step(&self, index: usize) -> Option<&StepConfig> {
        self.customization_flow.get(index)
    }

    pub fn step_by_id(&self, step_id: &str) -> Option<&StepConfig> {
        self.customization_flow.iter().find(|step| step.id == step_id)
    }

    pub fn position(&self, step_id: &str) -> Option<usize> {
        self.customization_flow.iter().position(|step| step.id == step_id)
    }

    pub fn len(&self) -> usize {
        self.customization_flow.len()
    }

    pub fn is_empty(&self) -> bool {
        self.customization_flow.is_empty()
    }
}
