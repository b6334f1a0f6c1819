//! Bundled sample menu used by the operator demo and by tests.

use rust_decimal::Decimal;

use crate::configurator::steps::{ProductConfig, StepConfig, StepType};
use crate::configurator::pricing::CONFIGURABLE_ENTREE;
use crate::domain::order::SelectedPackage;
use crate::domain::product::{Catalog, CatalogItem, ProductData, ProductId, Variant};

pub const WINGS: &str = "wings";
pub const CATERING_BOX: &str = "catering-box";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SampleProduct {
    pub product: ProductData,
    pub config: ProductConfig,
}

pub fn sample_product(key: &str) -> Option<SampleProduct> {
    match key {
        WINGS => Some(SampleProduct { product: wings_product(), config: wings_config() }),
        CATERING_BOX => {
            Some(SampleProduct { product: catering_box_product(), config: catering_box_config() })
        }
        _ => None,
    }
}

pub fn sample_catalog() -> Catalog {
    Catalog::default()
        .with_collection(
            "styles",
            vec![
                item("tossed", "Tossed", 0),
                item("dry-rub", "Dry Rub", 0),
                item("plain", "Plain", 0),
            ],
        )
        .with_collection(
            "sauces",
            vec![
                item("buffalo", "Buffalo", 0),
                item("garlic-parm", "Garlic Parmesan", 0),
                item("honey-bbq", "Honey BBQ", 0),
                item("mango-habanero", "Mango Habanero", 0),
                item("lemon-pepper", "Lemon Pepper", 0),
            ],
        )
        .with_collection(
            "dips",
            vec![item("ranch", "Ranch", 0), item("blue-cheese", "Blue Cheese", 0)],
        )
        .with_collection(
            "sides",
            vec![
                CatalogItem { category: Some("sides".to_string()), ..item("fries", "Fries", 299) },
                CatalogItem {
                    category: Some("sides".to_string()),
                    ..item("celery", "Celery & Carrots", 149)
                },
            ],
        )
        .with_collection(
            "proteins",
            vec![
                item("bone-in", "Bone-In Wings", 0),
                item("boneless", "Boneless Wings", 0),
                item("tenders", "Chicken Tenders", 0),
            ],
        )
}

pub fn catering_packages() -> Vec<SelectedPackage> {
    vec![
        SelectedPackage {
            id: "game-day".to_string(),
            name: "Game Day Spread".to_string(),
            price_per_person: Decimal::new(1299, 2),
        },
        SelectedPackage {
            id: "office-lunch".to_string(),
            name: "Office Lunch".to_string(),
            price_per_person: Decimal::new(1099, 2),
        },
    ]
}

pub fn wings_product() -> ProductData {
    ProductData {
        id: ProductId("traditional-wings".to_string()),
        name: "Traditional Wings".to_string(),
        product_type: CONFIGURABLE_ENTREE.to_string(),
        base_price: Decimal::new(699, 2),
        variants: vec![
            variant("bone-in-6", "6 Bone-In", 699, 6),
            variant("bone-in-12", "12 Bone-In", 1214, 12),
            variant("bone-in-24", "24 Bone-In", 2299, 24),
        ],
    }
}

pub fn wings_config() -> ProductConfig {
    ProductConfig {
        product_type: CONFIGURABLE_ENTREE.to_string(),
        customization_flow: vec![
            StepConfig::new("size", StepType::VariantSelector, "Size").required(),
            StepConfig::new("style", StepType::SingleChoice, "Style")
                .required()
                .from_source("styles"),
            StepConfig::new("sauces", StepType::MultiChoice, "Sauces")
                .required()
                .with_limits(Some(1), Some(3))
                .from_source("sauces")
                .skip_when("style", "plain"),
            StepConfig::new("dips", StepType::IncludedDips, "Dips")
                .required()
                .with_limits(None, Some(2))
                .from_source("dips"),
            StepConfig::new("extra-sauce", StepType::OptionalAddons, "Extra Sauce")
                .from_source("sauces")
                .priced_per_item(Decimal::new(99, 2)),
            StepConfig::new("extra-dip", StepType::OptionalAddons, "Extra Dip")
                .from_source("dips")
                .priced_per_item(Decimal::new(75, 2)),
            StepConfig::new("sides", StepType::OptionalAddons, "Sides")
                .from_source("sides")
                .priced_from_catalog(),
            StepConfig::new("review", StepType::Review, "Review"),
        ],
    }
}

pub fn catering_box_product() -> ProductData {
    ProductData {
        id: ProductId("catering-box".to_string()),
        name: "Catering Box".to_string(),
        product_type: CONFIGURABLE_ENTREE.to_string(),
        base_price: Decimal::new(8999, 2),
        variants: vec![
            variant("box-10", "Serves 10", 8999, 10),
            variant("box-20", "Serves 20", 16_999, 20),
        ],
    }
}

pub fn catering_box_config() -> ProductConfig {
    ProductConfig {
        product_type: CONFIGURABLE_ENTREE.to_string(),
        customization_flow: vec![
            StepConfig::new("size", StepType::VariantSelector, "Size").required(),
            StepConfig::new("protein", StepType::SingleChoice, "Protein")
                .required()
                .from_source("proteins"),
            StepConfig::new("sauces", StepType::MultiChoice, "Sauces")
                .required()
                .with_limits(Some(1), Some(2))
                .from_source("sauces"),
            StepConfig::new("dips", StepType::IncludedDips, "Dips")
                .required()
                .with_limits(None, Some(4))
                .from_source("dips"),
            StepConfig::new("review", StepType::Review, "Review"),
        ],
    }
}

fn item(id: &str, name: &str, cents: i64) -> CatalogItem {
    CatalogItem {
        id: id.to_string(),
        name: name.to_string(),
        base_price: Decimal::new(cents, 2),
        category: None,
    }
}

fn variant(id: &str, name: &str, cents: i64, count: u32) -> Variant {
    Variant {
        id: id.to_string(),
        name: name.to_string(),
        price: Decimal::new(cents, 2),
        count: Some(count),
    }
}
