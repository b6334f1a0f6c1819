pub mod audit;
pub mod config;
pub mod configurator;
pub mod domain;
pub mod drafts;
pub mod errors;
pub mod fixtures;
pub mod flows;

pub use configurator::{
    ConfiguratorRuntime, ConfiguratorSession, ConfiguratorView, MutationOutcome, PriceBreakdown,
    ProductConfig, StepConfig, StepType,
};
pub use domain::customer::{CustomerId, CustomerProfile};
pub use domain::order::{CartItem, ContactInfo, OrderState, ORDER_STATE_SCHEMA_VERSION};
pub use domain::product::{Catalog, CatalogItem, ProductData, ProductId, Variant};
pub use domain::selection::{SelectionValue, Selections};
pub use drafts::{DraftApplyResult, DraftError, DraftManager, OrderSection};
pub use errors::DomainError;
pub use flows::{FlowEngine, FlowType, NavigationOutcome};
