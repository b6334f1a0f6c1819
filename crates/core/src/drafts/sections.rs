use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::order::{FulfillmentMethod, OrderState, CATERING_MIN_GUESTS};
use crate::flows::FlowType;

const MIN_PHONE_DIGITS: usize = 10;

/// The part of an order a draft edits. Applying a draft validates only that part.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSection {
    Contact,
    Delivery,
    Package,
    Items,
}

impl OrderSection {
    pub const ALL: [OrderSection; 4] =
        [OrderSection::Contact, OrderSection::Delivery, OrderSection::Package, OrderSection::Items];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contact => "contact",
            Self::Delivery => "delivery",
            Self::Package => "package",
            Self::Items => "items",
        }
    }
}

impl fmt::Display for OrderSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the customer-facing problems with `state`; empty means valid.
pub type SectionValidatorFn = fn(&OrderState) -> Vec<String>;

#[derive(Clone)]
pub struct SectionValidatorRegistry {
    validators: HashMap<OrderSection, SectionValidatorFn>,
}

impl Default for SectionValidatorRegistry {
    fn default() -> Self {
        Self::empty()
            .with(OrderSection::Contact, validate_contact)
            .with(OrderSection::Delivery, validate_delivery)
            .with(OrderSection::Package, validate_package)
            .with(OrderSection::Items, validate_items)
    }
}

impl SectionValidatorRegistry {
    pub fn empty() -> Self {
        Self { validators: HashMap::new() }
    }

    pub fn with(mut self, section: OrderSection, validator: SectionValidatorFn) -> Self {
        self.register(section, validator);
        self
    }

    pub fn register(&mut self, section: OrderSection, validator: SectionValidatorFn) {
        self.validators.insert(section, validator);
    }

    pub fn validate(&self, section: OrderSection, state: &OrderState) -> Vec<String> {
        self.validators.get(&section).map(|validator| validator(state)).unwrap_or_default()
    }
}

pub fn validate_contact(state: &OrderState) -> Vec<String> {
    let contact = &state.contact;
    let mut errors = Vec::new();
    if contact.name.trim().is_empty() {
        errors.push("Please enter your name.".to_string());
    }

    let email = contact.email.trim();
    let phone_digits = contact.phone.chars().filter(char::is_ascii_digit).count();
    let email_ok = is_valid_email(email);
    let phone_ok = phone_digits >= MIN_PHONE_DIGITS;

    if !email.is_empty() && !email_ok {
        errors.push("Please enter a valid email address.".to_string());
    } else if !email_ok && !phone_ok {
        errors.push("Please enter an email address or a phone number.".to_string());
    }
    errors
}

pub fn validate_delivery(state: &OrderState) -> Vec<String> {
    let delivery = &state.delivery;
    let mut errors = Vec::new();
    let has_address =
        delivery.address.as_deref().is_some_and(|address| !address.trim().is_empty());
    if delivery.method == FulfillmentMethod::Delivery && !has_address {
        errors.push("Please enter a delivery address.".to_string());
    }
    if state.flow_type == FlowType::Catering && delivery.date.is_none() {
        errors.push("Please choose an event date.".to_string());
    }
    errors
}

pub fn validate_package(state: &OrderState) -> Vec<String> {
    if state.flow_type != FlowType::Catering {
        return Vec::new();
    }

    let mut errors = Vec::new();
    if state.selected_package.is_none() {
        errors.push("Please choose a catering package.".to_string());
    }
    if state.guest_count < CATERING_MIN_GUESTS {
        errors.push(format!("Catering orders start at {CATERING_MIN_GUESTS} guests."));
    }
    let assigned =
        state.quantities.values().fold(0_u32, |total, quantity| total.saturating_add(*quantity));
    if assigned > state.guest_count {
        errors.push(format!(
            "Entree quantities add up to {assigned}, more than the {} guests.",
            state.guest_count
        ));
    }
    errors
}

pub fn validate_items(state: &OrderState) -> Vec<String> {
    let mut errors = Vec::new();
    if state.flow_type == FlowType::OnlineOrder && state.items.is_empty() {
        errors.push("Your cart is empty.".to_string());
    }
    for item in state.items.iter().filter(|item| item.quantity == 0) {
        errors.push(format!("{} needs a quantity of at least 1.", item.name));
    }
    errors
}

fn is_valid_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.split('.').count() >= 2
        && domain.split('.').all(|label| !label.is_empty())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::{OrderSection, SectionValidatorRegistry};
    use crate::domain::order::{FulfillmentMethod, OrderState, SelectedPackage};
    use crate::flows::FlowType;

    #[test]
    fn contact_accepts_email_or_long_phone() {
        let registry = SectionValidatorRegistry::default();
        let mut state = OrderState::new(FlowType::OnlineOrder);
        state.contact.name = "Ana".to_string();

        assert_eq!(
            registry.validate(OrderSection::Contact, &state),
            vec!["Please enter an email address or a phone number.".to_string()]
        );

        state.contact.phone = "(555) 010-0199".to_string();
        assert!(registry.validate(OrderSection::Contact, &state).is_empty());

        state.contact.phone = "555-0100".to_string();
        state.contact.email = "ana@example".to_string();
        assert_eq!(
            registry.validate(OrderSection::Contact, &state),
            vec!["Please enter a valid email address.".to_string()]
        );

        state.contact.email = "ana@example.com".to_string();
        assert!(registry.validate(OrderSection::Contact, &state).is_empty());
    }

    #[test]
    fn catering_delivery_needs_address_and_date() {
        let registry = SectionValidatorRegistry::default();
        let mut state = OrderState::new(FlowType::Catering);
        assert_eq!(registry.validate(OrderSection::Delivery, &state).len(), 2);

        state.delivery.address = Some("12 Market St".to_string());
        state.delivery.date = NaiveDate::from_ymd_opt(2026, 11, 7);
        assert!(registry.validate(OrderSection::Delivery, &state).is_empty());

        let mut pickup = OrderState::new(FlowType::OnlineOrder);
        pickup.delivery.method = FulfillmentMethod::Pickup;
        assert!(registry.validate(OrderSection::Delivery, &pickup).is_empty());
    }

    #[test]
    fn package_rules_apply_to_catering_only() {
        let registry = SectionValidatorRegistry::default();
        let mut state = OrderState::new(FlowType::Catering);
        state.guest_count = 8;
        assert_eq!(registry.validate(OrderSection::Package, &state).len(), 2);

        state.selected_package = Some(SelectedPackage {
            id: "game-day".to_string(),
            name: "Game Day Spread".to_string(),
            price_per_person: Decimal::new(1299, 2),
        });
        state.guest_count = 12;
        state.quantities.insert("wings".to_string(), 8);
        state.quantities.insert("tenders".to_string(), 6);
        assert_eq!(registry.validate(OrderSection::Package, &state).len(), 1);

        state.quantities.insert("tenders".to_string(), 4);
        assert!(registry.validate(OrderSection::Package, &state).is_empty());

        state.quantities.insert("wings".to_string(), u32::MAX);
        assert_eq!(registry.validate(OrderSection::Package, &state).len(), 1);

        let online = OrderState::new(FlowType::OnlineOrder);
        assert!(registry.validate(OrderSection::Package, &online).is_empty());
    }

    #[test]
    fn empty_registry_accepts_everything() {
        let registry = SectionValidatorRegistry::empty();
        let state = OrderState::new(FlowType::OnlineOrder);
        for section in OrderSection::ALL {
            assert!(registry.validate(section, &state).is_empty());
        }
    }
}
