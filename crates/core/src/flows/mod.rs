pub mod engine;
pub mod states;

pub use engine::{FlowDefinition, FlowEngine, FlowTransitionError};
pub use states::{FlowType, NavigationDirection, NavigationOutcome};
