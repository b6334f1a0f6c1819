use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductId(pub String);

/// A concrete, priced option for a size/kind step. Copied by value into selections so a
/// later catalog refresh cannot move a price the customer already locked in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductData {
    pub id: ProductId,
    pub name: String,
    pub product_type: String,
    #[serde(default)]
    pub base_price: Decimal,
    #[serde(default)]
    pub variants: Vec<Variant>,
}

impl ProductData {
    pub fn find_variant(&self, variant_id: &str) -> Option<&Variant> {
        self.variants.iter().find(|variant| variant.id == variant_id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub base_price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Read-only catalog snapshot handed over by the menu fetch collaborator. Collections are
/// keyed by the `dataSource` name steps refer to (`sauces`, `dips`, `sides`, ...).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    collections: BTreeMap<String, Vec<CatalogItem>>,
}

impl Catalog {
    pub fn new(collections: BTreeMap<String, Vec<CatalogItem>>) -> Self {
        Self { collections }
    }

    pub fn with_collection(mut self, name: impl Into<String>, items: Vec<CatalogItem>) -> Self {
        self.collections.insert(name.into(), items);
        self
    }

    pub fn collection(&self, name: &str) -> Option<&[CatalogItem]> {
        self.collections.get(name).map(Vec::as_slice)
    }

    pub fn find(&self, item_id: &str) -> Option<&CatalogItem> {
        self.collections.values().flatten().find(|item| item.id == item_id)
    }

    /// Looks inside the named collection first, then across the whole snapshot.
    pub fn find_in(&self, data_source: Option<&str>, item_id: &str) -> Option<&CatalogItem> {
        data_source
            .and_then(|name| self.collection(name))
            .and_then(|items| items.iter().find(|item| item.id == item_id))
            .or_else(|| self.find(item_id))
    }
}
