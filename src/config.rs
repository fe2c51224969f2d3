//! Engine configuration.

use serde::Deserialize;

/// What the graph builder does when a decorated field's selector chain
/// leads back to a field already on the current path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePolicy {
    /// Stop expanding the chain, record the truncation and log a warning.
    #[default]
    Truncate,
    /// Fail graph construction with `GraphError::Cycle`.
    Reject,
}

/// What the builder does with an indexer that names only a skip or only a
/// take, such as `Orders[2 asc Total]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialRangePolicy {
    /// Apply the ordering only and log a warning.
    #[default]
    OrderOnly,
    /// Fail the build with `BuildError::PartialRange`.
    Reject,
}

/// Configuration for an [`Engine`](crate::Engine).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cycle_policy: CyclePolicy,
    pub partial_range: PartialRangePolicy,
}

impl EngineConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a config from JSON. Missing keys keep their defaults.
    ///
    /// ```
    /// use fieldlink::{CyclePolicy, EngineConfig};
    ///
    /// let config = EngineConfig::from_json_str(r#"{"cycle_policy": "reject"}"#).unwrap();
    /// assert_eq!(config.cycle_policy, CyclePolicy::Reject);
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Set the cycle policy.
    pub fn with_cycle_policy(mut self, policy: CyclePolicy) -> Self {
        self.cycle_policy = policy;
        self
    }

    /// Set the partial range policy.
    pub fn with_partial_range(mut self, policy: PartialRangePolicy) -> Self {
        self.partial_range = policy;
        self
    }
}
