use serde::Serialize;
use tracing::{debug, error};

use super::Ensure;
use crate::error::Result;
use crate::host::Host;
use crate::types::{ChainSpec, RuleSpec};

/// A packet-filter chain and the rules this process puts in it.
///
/// Owned chains are created on enable and flushed then deleted on disable.
/// Built-in chains are shared with the rest of the system: disabling only
/// removes our own rules from them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainRuleConfig {
    pub chain: ChainSpec,
    pub rule_specs: Vec<RuleSpec>,
}

impl ChainRuleConfig {
    pub fn new(chain: ChainSpec, rule_specs: Vec<RuleSpec>) -> Self {
        Self { chain, rule_specs }
    }

    fn table(&self) -> &str {
        &self.chain.table
    }

    fn name(&self) -> &str {
        &self.chain.chain
    }

    fn enable(&self, host: &dyn Host) -> Result<()> {
        match host.new_chain(self.table(), self.name()) {
            Err(e) if e.is_already_exists() => {
                debug!(table = self.table(), chain = self.name(), "chain already exists");
            }
            other => other?,
        }

        for spec in &self.rule_specs {
            host.append_unique(self.table(), self.name(), spec)
                .inspect_err(|e| {
                    error!(
                        table = self.table(),
                        chain = self.name(),
                        rule = %spec,
                        error = %e,
                        "failed to append rule"
                    )
                })?;
        }
        Ok(())
    }

    fn disable_owned(&self, host: &dyn Host) -> Result<()> {
        match host.clear_chain(self.table(), self.name()) {
            Err(e) if e.is_not_found() => {
                debug!(table = self.table(), chain = self.name(), "chain already absent");
                return Ok(());
            }
            Err(e) => {
                error!(table = self.table(), chain = self.name(), error = %e, "failed to clean chain");
                return Err(e);
            }
            Ok(()) => {}
        }

        match host.delete_chain(self.table(), self.name()) {
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => {
                error!(table = self.table(), chain = self.name(), error = %e, "failed to delete chain");
                Err(e)
            }
            Ok(()) => Ok(()),
        }
    }

    fn disable_builtin(&self, host: &dyn Host) -> Result<()> {
        for spec in &self.rule_specs {
            match host.delete_rule(self.table(), self.name(), spec) {
                Err(e) if e.is_not_found() => {
                    debug!(table = self.table(), chain = self.name(), rule = %spec, "rule already absent");
                }
                other => other?,
            }
        }
        Ok(())
    }
}

impl Ensure for ChainRuleConfig {
    fn ensure(&self, host: &dyn Host, enabled: bool) -> Result<()> {
        if enabled {
            self.enable(host)
        } else if self.chain.is_default {
            self.disable_builtin(host)
        } else {
            self.disable_owned(host)
        }
    }
}
