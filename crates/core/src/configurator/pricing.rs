use std::collections::HashMap;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::configurator::steps::{PriceSource, ProductConfig, StepType};
use crate::domain::product::{Catalog, ProductData};
use crate::domain::selection::Selections;

pub const CONFIGURABLE_ENTREE: &str = "configurable-entree";
pub const SIMPLE_PRODUCT: &str = "simple-product";

/// Multiplier applied to a catalog item's base price when it is sold as an add-on.
pub const DEFAULT_CATALOG_MARKUP: Decimal = Decimal::from_parts(135, 0, 0, false, 2);

/// Unit price for fixed-price add-on steps that do not declare `pricePerItem`.
pub const DEFAULT_ADDON_UNIT_PRICE: Decimal = Decimal::from_parts(99, 0, 0, false, 2);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddonLine {
    pub name: String,
    pub price: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub base: Decimal,
    pub addons: Vec<AddonLine>,
    pub total: Decimal,
}

impl PriceBreakdown {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn from_lines(base: Decimal, addons: Vec<AddonLine>) -> Self {
        let total = round_to_cent(base + addons.iter().map(|line| line.price).sum::<Decimal>());
        Self { base: round_to_cent(base), addons, total }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PricingInput<'a> {
    pub selections: &'a Selections,
    pub product: &'a ProductData,
    pub config: &'a ProductConfig,
    pub catalog: &'a Catalog,
    pub catalog_markup: Decimal,
}

pub type PricingStrategyFn = fn(&PricingInput<'_>) -> PriceBreakdown;

/// Product type to pricing strategy lookup.
#[derive(Clone)]
pub struct PricingRegistry {
    strategies: HashMap<String, PricingStrategyFn>,
    catalog_markup: Decimal,
}

impl Default for PricingRegistry {
    fn default() -> Self {
        Self::empty()
            .with(CONFIGURABLE_ENTREE, price_configurable_entree)
            .with(SIMPLE_PRODUCT, price_simple_product)
    }
}

impl PricingRegistry {
    pub fn empty() -> Self {
        Self { strategies: HashMap::new(), catalog_markup: DEFAULT_CATALOG_MARKUP }
    }

    pub fn with(mut self, product_type: impl Into<String>, strategy: PricingStrategyFn) -> Self {
        self.register(product_type, strategy);
        self
    }

    pub fn with_catalog_markup(mut self, markup: Decimal) -> Self {
        self.catalog_markup = markup;
        self
    }

    pub fn register(&mut self, product_type: impl Into<String>, strategy: PricingStrategyFn) {
        self.strategies.insert(product_type.into(), strategy);
    }

    pub fn catalog_markup(&self) -> Decimal {
        self.catalog_markup
    }

    pub fn price(
        &self,
        selections: &Selections,
        product: &ProductData,
        config: &ProductConfig,
        catalog: &Catalog,
    ) -> PriceBreakdown {
        let Some(strategy) = self.strategies.get(&config.product_type) else {
            warn!(
                event_name = "configurator.pricing_strategy_missing",
                product_type = %config.product_type,
                product_id = %product.id.0,
                "no pricing strategy registered for product type, emitting zero price"
            );
            return PriceBreakdown::zero();
        };

        strategy(&PricingInput {
            selections,
            product,
            config,
            catalog,
            catalog_markup: self.catalog_markup,
        })
    }
}

fn variant_or_base_price(input: &PricingInput<'_>) -> Decimal {
    input
        .selections
        .variant
        .as_ref()
        .map(|variant| variant.price)
        .unwrap_or(input.product.base_price)
}

/// Half-up rounding to the cent.
pub fn round_to_cent(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn price_configurable_entree(input: &PricingInput<'_>) -> PriceBreakdown {
    let base = variant_or_base_price(input);

    let mut addons = Vec::new();
    for step in &input.config.customization_flow {
        if step.step_type != StepType::OptionalAddons {
            continue;
        }
        let Some(quantities) = input.selections.quantities(&step.id) else {
            continue;
        };

        let mut quantity_total = 0_u32;
        let mut line_total = Decimal::ZERO;
        for (item_id, quantity) in quantities {
            if *quantity == 0 {
                continue;
            }
            let unit_price = match step.price_source.unwrap_or_default() {
                PriceSource::Catalog => {
                    match input.catalog.find_in(step.data_source.as_deref(), item_id) {
                        Some(item) => item.base_price * input.catalog_markup,
                        None => {
                            warn!(
                                event_name = "configurator.addon_item_missing",
                                step_id = %step.id,
                                item_id = %item_id,
                                "catalog-priced add-on not found in catalog snapshot"
                            );
                            Decimal::ZERO
                        }
                    }
                }
                PriceSource::Fixed => step.price_per_item.unwrap_or(DEFAULT_ADDON_UNIT_PRICE),
            };
            quantity_total = quantity_total.saturating_add(*quantity);
            line_total += unit_price * Decimal::from(*quantity);
        }

        if quantity_total > 0 {
            addons.push(AddonLine {
                name: format!("{} (x{quantity_total})", step.label),
                price: round_to_cent(line_total),
            });
        }
    }

    PriceBreakdown::from_lines(base, addons)
}

pub fn price_simple_product(input: &PricingInput<'_>) -> PriceBreakdown {
    let base = variant_or_base_price(input);
    PriceBreakdown::from_lines(base, Vec::new())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rust_decimal::Decimal;

    use super::{
        round_to_cent, PriceBreakdown, PricingRegistry, CONFIGURABLE_ENTREE, SIMPLE_PRODUCT,
    };
    use crate::configurator::steps::{ProductConfig, StepConfig, StepType};
    use crate::domain::product::{Catalog, CatalogItem, ProductData, ProductId, Variant};
    use crate::domain::selection::{SelectionValue, Selections};

    fn product(product_type: &str) -> ProductData {
        ProductData {
            id: ProductId("wings".to_string()),
            name: "Wings".to_string(),
            product_type: product_type.to_string(),
            base_price: Decimal::new(899, 2),
            variants: vec![variant()],
        }
    }

    fn variant() -> Variant {
        Variant {
            id: "bone-in-12".to_string(),
            name: "12 Bone-In Wings".to_string(),
            price: Decimal::new(1214, 2),
            count: Some(12),
        }
    }

    fn entree_config() -> ProductConfig {
        ProductConfig {
            product_type: CONFIGURABLE_ENTREE.to_string(),
            customization_flow: vec![
                StepConfig::new("size", StepType::VariantSelector, "Size").required(),
                StepConfig::new("extra-sauce", StepType::OptionalAddons, "Extra Sauce")
                    .priced_per_item(Decimal::new(99, 2)),
                StepConfig::new("extra-dip", StepType::OptionalAddons, "Extra Dip")
                    .priced_per_item(Decimal::new(75, 2)),
                StepConfig::new("sides", StepType::OptionalAddons, "Sides")
                    .from_source("sides")
                    .priced_from_catalog(),
            ],
        }
    }

    fn catalog() -> Catalog {
        Catalog::default().with_collection(
            "sides",
            vec![CatalogItem {
                id: "fries".to_string(),
                name: "Fries".to_string(),
                base_price: Decimal::new(299, 2),
                category: Some("sides".to_string()),
            }],
        )
    }

    fn quantities(entries: &[(&str, u32)]) -> SelectionValue {
        SelectionValue::Quantities(
            entries
                .iter()
                .map(|(id, quantity)| (id.to_string(), *quantity))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    #[test]
    fn entree_total_includes_fixed_price_addons() {
        let mut selections = Selections { variant: Some(variant()), ..Selections::default() };
        selections.set("extra-sauce", quantities(&[("buffalo", 2)]));
        selections.set("extra-dip", quantities(&[("ranch", 1)]));

        let breakdown = PricingRegistry::default().price(
            &selections,
            &product(CONFIGURABLE_ENTREE),
            &entree_config(),
            &catalog(),
        );

        assert_eq!(breakdown.base, Decimal::new(1214, 2));
        assert_eq!(breakdown.addons.len(), 2);
        assert_eq!(breakdown.addons[0].name, "Extra Sauce (x2)");
        assert_eq!(breakdown.addons[0].price, Decimal::new(198, 2));
        assert_eq!(breakdown.addons[1].name, "Extra Dip (x1)");
        assert_eq!(breakdown.addons[1].price, Decimal::new(75, 2));
        assert_eq!(breakdown.total, Decimal::new(1487, 2));
    }

    #[test]
    fn catalog_priced_addons_apply_markup() {
        let mut selections = Selections { variant: Some(variant()), ..Selections::default() };
        selections.set("sides", quantities(&[("fries", 2)]));

        let breakdown = PricingRegistry::default().price(
            &selections,
            &product(CONFIGURABLE_ENTREE),
            &entree_config(),
            &catalog(),
        );

        // 2.99 * 1.35 = 4.0365 per unit, two units = 8.073
        assert_eq!(breakdown.addons[0].price, Decimal::new(807, 2));
        assert_eq!(breakdown.total, Decimal::new(2021, 2));
    }

    #[test]
    fn markup_is_overridable() {
        let mut selections = Selections { variant: Some(variant()), ..Selections::default() };
        selections.set("sides", quantities(&[("fries", 1)]));

        let breakdown = PricingRegistry::default().with_catalog_markup(Decimal::ONE).price(
            &selections,
            &product(CONFIGURABLE_ENTREE),
            &entree_config(),
            &catalog(),
        );

        assert_eq!(breakdown.addons[0].price, Decimal::new(299, 2));
    }

    #[test]
    fn fixed_step_without_declared_price_uses_default_unit_price() {
        let config = ProductConfig {
            product_type: CONFIGURABLE_ENTREE.to_string(),
            customization_flow: vec![StepConfig::new("extras", StepType::OptionalAddons, "Extras")],
        };
        let mut selections = Selections::default();
        selections.set("extras", quantities(&[("celery", 3), ("carrots", 0)]));

        let breakdown = PricingRegistry::default().price(
            &selections,
            &product(CONFIGURABLE_ENTREE),
            &config,
            &Catalog::default(),
        );

        assert_eq!(breakdown.base, Decimal::new(899, 2));
        assert_eq!(breakdown.addons[0].name, "Extras (x3)");
        assert_eq!(breakdown.addons[0].price, Decimal::new(297, 2));
        assert_eq!(breakdown.total, Decimal::new(1196, 2));
    }

    #[test]
    fn total_matches_rounded_sum_of_lines() {
        let mut selections = Selections { variant: Some(variant()), ..Selections::default() };
        selections.set("extra-sauce", quantities(&[("buffalo", 3), ("garlic", 4)]));
        selections.set("sides", quantities(&[("fries", 3)]));

        let breakdown = PricingRegistry::default().price(
            &selections,
            &product(CONFIGURABLE_ENTREE),
            &entree_config(),
            &catalog(),
        );

        let sum = breakdown.base + breakdown.addons.iter().map(|line| line.price).sum::<Decimal>();
        assert_eq!(breakdown.total, round_to_cent(sum));
    }

    #[test]
    fn simple_product_prices_variant_only() {
        let mut selections = Selections { variant: Some(variant()), ..Selections::default() };
        selections.set("extra-sauce", quantities(&[("buffalo", 2)]));
        let config = ProductConfig {
            product_type: SIMPLE_PRODUCT.to_string(),
            customization_flow: entree_config().customization_flow,
        };

        let breakdown = PricingRegistry::default().price(
            &selections,
            &product(SIMPLE_PRODUCT),
            &config,
            &catalog(),
        );

        assert!(breakdown.addons.is_empty());
        assert_eq!(breakdown.total, Decimal::new(1214, 2));
    }

    #[test]
    fn unregistered_product_type_prices_at_zero() {
        let config = ProductConfig {
            product_type: "mystery-box".to_string(),
            customization_flow: Vec::new(),
        };
        let breakdown = PricingRegistry::default().price(
            &Selections::default(),
            &product("mystery-box"),
            &config,
            &Catalog::default(),
        );

        assert_eq!(breakdown, PriceBreakdown::zero());
    }

    #[test]
    fn rounding_is_half_up_at_the_cent() {
        assert_eq!(round_to_cent(Decimal::new(10_005, 3)), Decimal::new(1001, 2));
        assert_eq!(round_to_cent(Decimal::new(10_004, 3)), Decimal::new(1000, 2));
    }
}
