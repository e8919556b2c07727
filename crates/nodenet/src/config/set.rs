use serde::Serialize;
use tracing::{info, warn};

use super::{Config, Ensure};
use crate::error::Result;
use crate::host::Host;

/// A named feature: configs that are enabled and disabled together.
///
/// Members are ensured in declaration order. The first failure stops the
/// pass; members already converged stay converged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Set {
    pub feature_name: String,
    pub enabled: bool,
    pub configs: Vec<Config>,
}

impl Set {
    pub fn new(feature_name: impl Into<String>, enabled: bool) -> Self {
        Self {
            feature_name: feature_name.into(),
            enabled,
            configs: Vec::new(),
        }
    }

    /// Append a member config.
    pub fn with(mut self, config: impl Into<Config>) -> Self {
        self.configs.push(config.into());
        self
    }

    pub fn with_all<I, C>(mut self, configs: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Config>,
    {
        self.configs.extend(configs.into_iter().map(Into::into));
        self
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Ensure every member according to the set's own `enabled` flag.
    pub fn reconcile(&self, host: &dyn Host) -> Result<()> {
        self.ensure(host, self.enabled)
    }
}

impl Ensure for Set {
    fn ensure(&self, host: &dyn Host, enabled: bool) -> Result<()> {
        info!(
            feature = %self.feature_name,
            enabled,
            configs = self.configs.len(),
            "ensuring feature"
        );
        for (index, config) in self.configs.iter().enumerate() {
            config.ensure(host, enabled).inspect_err(|e| {
                warn!(feature = %self.feature_name, index, error = %e, "feature config failed")
            })?;
        }
        Ok(())
    }
}
