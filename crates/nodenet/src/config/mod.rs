//! Declarative host-network configs.
//!
//! A config is a plain value describing one piece of host state. [`Ensure`]
//! drives the host toward it: `enabled = true` means the state must exist
//! exactly as described, `enabled = false` means it must be gone (or reset to
//! its off value). Both directions are idempotent, so the same config can be
//! ensured on every reconciliation pass.
//!
//! # Example
//!
//! ```ignore
//! use nodenet::config::{Ensure, RouteConfig};
//! use nodenet::host::SystemHost;
//! use nodenet::types::Route;
//!
//! let host = SystemHost::new()?;
//! let route = RouteConfig::new(Route::new("10.124.0.1/32".parse()?).dev("cbr0").table(1));
//! route.ensure(&host, true)?;
//! route.ensure(&host, true)?; // no-op
//! ```

mod chain;
mod route;
mod rule;
mod set;
mod sysctl;

use serde::Serialize;

pub use chain::ChainRuleConfig;
pub use route::RouteConfig;
pub use rule::RuleConfig;
pub use set::Set;
pub use sysctl::SysctlConfig;

use crate::error::Result;
use crate::host::Host;

/// Converge a piece of host state.
pub trait Ensure {
    fn ensure(&self, host: &dyn Host, enabled: bool) -> Result<()>;
}

/// Any of the config kinds, so they can be grouped in a [`Set`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Config {
    Sysctl(SysctlConfig),
    Route(RouteConfig),
    Rule(RuleConfig),
    Chain(ChainRuleConfig),
}

impl Ensure for Config {
    fn ensure(&self, host: &dyn Host, enabled: bool) -> Result<()> {
        match self {
            Self::Sysctl(c) => c.ensure(host, enabled),
            Self::Route(c) => c.ensure(host, enabled),
            Self::Rule(c) => c.ensure(host, enabled),
            Self::Chain(c) => c.ensure(host, enabled),
        }
    }
}

impl From<SysctlConfig> for Config {
    fn from(c: SysctlConfig) -> Self {
        Self::Sysctl(c)
    }
}

impl From<RouteConfig> for Config {
    fn from(c: RouteConfig) -> Self {
        Self::Route(c)
    }
}

impl From<RuleConfig> for Config {
    fn from(c: RuleConfig) -> Self {
        Self::Rule(c)
    }
}

impl From<ChainRuleConfig> for Config {
    fn from(c: ChainRuleConfig) -> Self {
        Self::Chain(c)
    }
}
