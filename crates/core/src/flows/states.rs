use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    OnlineOrder,
    Catering,
}

impl FlowType {
    pub const ALL: [FlowType; 2] = [FlowType::OnlineOrder, FlowType::Catering];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnlineOrder => "online_order",
            Self::Catering => "catering",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "online_order" => Some(Self::OnlineOrder),
            "catering" => Some(Self::Catering),
            _ => None,
        }
    }
}

impl fmt::Display for FlowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationDirection {
    Forward,
    Backward,
}

/// Result of a next/back request. A rejected move carries the validator's message and
/// leaves the index where it was.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationOutcome {
    pub advanced: bool,
    pub direction: NavigationDirection,
    pub from_index: usize,
    pub to_index: usize,
    pub error: Option<String>,
}

impl NavigationOutcome {
    pub fn moved(direction: NavigationDirection, from_index: usize, to_index: usize) -> Self {
        Self { advanced: true, direction, from_index, to_index, error: None }
    }

    pub fn stayed(direction: NavigationDirection, index: usize) -> Self {
        Self { advanced: false, direction, from_index: index, to_index: index, error: None }
    }

    pub fn rejected(
        direction: NavigationDirection,
        index: usize,
        error: impl Into<String>,
    ) -> Self {
        Self {
            advanced: false,
            direction,
            from_index: index,
            to_index: index,
            error: Some(error.into()),
        }
    }
}
