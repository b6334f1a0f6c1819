use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::configurator::pricing::{round_to_cent, PriceBreakdown};
use crate::domain::customer::CustomerProfile;
use crate::domain::product::ProductId;
use crate::domain::selection::Selections;
use crate::flows::FlowType;

/// Bumped whenever the persisted `OrderState` layout changes. Stored copies with any other
/// version are discarded rather than migrated.
pub const ORDER_STATE_SCHEMA_VERSION: u32 = 1;

pub const CATERING_MIN_GUESTS: u32 = 10;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentMethod {
    #[default]
    Pickup,
    Delivery,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
}

impl ContactInfo {
    /// Anything the customer typed that identifies them.
    pub fn has_identity_signal(&self) -> bool {
        [&self.name, &self.email, &self.phone].iter().any(|value| !value.trim().is_empty())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryInfo {
    #[serde(default)]
    pub method: FulfillmentMethod,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
}

/// Catering package copied by value at selection time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedPackage {
    pub id: String,
    pub name: String,
    pub price_per_person: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: Uuid,
    pub product_id: ProductId,
    pub name: String,
    pub selections: Selections,
    pub price_breakdown: PriceBreakdown,
    pub quantity: u32,
}

impl CartItem {
    pub fn line_total(&self) -> Decimal {
        round_to_cent(self.price_breakdown.total * Decimal::from(self.quantity))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub items_subtotal: Decimal,
    pub package_subtotal: Decimal,
    pub total: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderState {
    pub flow_type: FlowType,
    #[serde(default)]
    pub selected_package: Option<SelectedPackage>,
    pub guest_count: u32,
    /// Catering headcount split, entree id to number of guests.
    #[serde(default)]
    pub quantities: BTreeMap<String, u32>,
    #[serde(default)]
    pub items: Vec<CartItem>,
    #[serde(default)]
    pub contact: ContactInfo,
    #[serde(default)]
    pub delivery: DeliveryInfo,
    #[serde(default)]
    pub totals: OrderTotals,
}

impl OrderState {
    pub fn new(flow_type: FlowType) -> Self {
        let (guest_count, method) = match flow_type {
            FlowType::OnlineOrder => (1, FulfillmentMethod::Pickup),
            FlowType::Catering => (CATERING_MIN_GUESTS, FulfillmentMethod::Delivery),
        };

        Self {
            flow_type,
            selected_package: None,
            guest_count,
            quantities: BTreeMap::new(),
            items: Vec::new(),
            contact: ContactInfo::default(),
            delivery: DeliveryInfo { method, ..DeliveryInfo::default() },
            totals: OrderTotals::default(),
        }
    }

    pub fn derive_totals(&self) -> OrderTotals {
        let items_subtotal = self.items.iter().map(CartItem::line_total).sum::<Decimal>();
        let package_subtotal = self
            .selected_package
            .as_ref()
            .map(|package| {
                round_to_cent(package.price_per_person * Decimal::from(self.guest_count))
            })
            .unwrap_or(Decimal::ZERO);

        OrderTotals {
            items_subtotal: round_to_cent(items_subtotal),
            package_subtotal,
            total: round_to_cent(items_subtotal + package_subtotal),
        }
    }

    pub fn refresh_totals(&mut self) {
        self.totals = self.derive_totals();
    }

    pub fn add_item(&mut self, item: CartItem) {
        self.items.push(item);
        self.refresh_totals();
    }

    pub fn remove_item(&mut self, item_id: Uuid) -> Option<CartItem> {
        let position = self.items.iter().position(|item| item.id == item_id)?;
        let removed = self.items.remove(position);
        self.refresh_totals();
        Some(removed)
    }

    /// Copies profile fields into contact fields that are still empty. Returns whether
    /// anything changed.
    pub fn prefill_contact(&mut self, profile: &CustomerProfile) -> bool {
        let mut changed = false;
        for (field, candidate) in [
            (&mut self.contact.name, profile.display_name.as_deref()),
            (&mut self.contact.email, profile.email.as_deref()),
            (&mut self.contact.phone, profile.phone.as_deref()),
        ] {
            let Some(candidate) = candidate.map(str::trim).filter(|value| !value.is_empty())
            else {
                continue;
            };
            if field.trim().is_empty() {
                *field = candidate.to_string();
                changed = true;
            }
        }
        changed
    }
}
