pub mod pricing;
pub mod session;
pub mod steps;
pub mod validators;

use rust_decimal::Decimal;

use self::{pricing::PricingRegistry, validators::StepValidatorRegistry};

pub use self::pricing::{AddonLine, PriceBreakdown};
pub use self::session::{ConfiguratorSession, ConfiguratorView, MutationOutcome};
pub use self::steps::{PriceSource, ProductConfig, SkipIf, StepConfig, StepType};
pub use self::validators::StepValidation;

/// Registries shared by every session opened against the same menu.
#[derive(Clone, Default)]
pub struct ConfiguratorRuntime {
    pub validators: StepValidatorRegistry,
    pub pricing: PricingRegistry,
}

impl ConfiguratorRuntime {
    pub fn new(validators: StepValidatorRegistry, pricing: PricingRegistry) -> Self {
        Self { validators, pricing }
    }

    pub fn with_catalog_markup(catalog_markup: Decimal) -> Self {
        Self {
            validators: StepValidatorRegistry::default(),
            pricing: PricingRegistry::default().with_catalog_markup(catalog_markup),
        }
    }
}
