use serde::Serialize;
use tracing::debug;

use super::Ensure;
use crate::error::Result;
use crate::host::Host;

/// A kernel parameter with an on value and an off value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SysctlConfig {
    pub key: String,
    pub value: String,
    pub default_value: String,
}

impl SysctlConfig {
    pub fn new(
        key: impl Into<String>,
        value: impl Into<String>,
        default_value: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            default_value: default_value.into(),
        }
    }
}

impl Ensure for SysctlConfig {
    fn ensure(&self, host: &dyn Host, enabled: bool) -> Result<()> {
        let value = if enabled {
            &self.value
        } else {
            &self.default_value
        };
        let previous = host.set(&self.key, value)?;
        debug!(key = %self.key, %previous, %value, "sysctl ensured");
        Ok(())
    }
}
