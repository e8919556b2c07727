//! Agent configuration file.

use std::path::Path;

use anyhow::Context;
use nodenet::policy_routing::PolicyRoutingOptions;
use serde::{Deserialize, Serialize};

/// Top-level YAML document, e.g.
///
/// ```yaml
/// policy_routing:
///   host_dev: ens4
///   host_gateway: 10.128.0.1
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    pub policy_routing: PolicyRoutingOptions,
}

impl AgentConfig {
    /// Load from `path`, or the defaults if no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}
