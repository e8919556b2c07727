use serde::Serialize;
use tracing::{debug, error};

use super::Ensure;
use crate::error::{Error, Result};
use crate::host::Host;
use crate::types::Rule;

/// A policy-routing rule converged to exactly one instance (enabled) or none
/// (disabled).
///
/// Instances are counted ignoring priority, so rules left behind under an
/// older priority scheme are collapsed instead of piling up next to the
/// current one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleConfig {
    pub rule: Rule,
}

impl RuleConfig {
    pub fn new(rule: Rule) -> Self {
        Self { rule }
    }

    /// Installed rules equal to ours ignoring priority, in deletion order.
    fn installed(&self, host: &dyn Host) -> Result<Vec<Rule>> {
        let mut installed: Vec<Rule> = host
            .list_rules(self.rule.family)
            .inspect_err(|e| error!(rule = %self.rule, error = %e, "failed to list ip rules"))?
            .into_iter()
            .filter(|r| r.eq_ignoring_priority(&self.rule))
            .collect();
        // Instances at the wanted priority go last so one of them survives.
        installed.sort_by_key(|r| self.rule.priority.is_some() && r.priority == self.rule.priority);
        Ok(installed)
    }

    /// Add or delete until `target` matching rules remain.
    ///
    /// Every failed step still moves the count, so this makes one pass and
    /// returns the last error seen. A delete that keeps failing therefore
    /// leaves the extra rule in place until the next call.
    fn converge(&self, host: &dyn Host, target: usize) -> Result<()> {
        let installed = self.installed(host)?;
        let mut count = installed.len();
        let mut victims = installed.iter();
        let mut last_err: Option<Error> = None;

        if count != target {
            debug!(rule = %self.rule, count, target, "converging ip rule");
        }

        while count != target {
            if count > target {
                let Some(victim) = victims.next() else { break };
                if let Err(e) = host.del_rule(victim) {
                    if e.is_not_found() {
                        debug!(rule = %victim, "ip rule already gone");
                    } else {
                        error!(rule = %victim, error = %e, "failed to delete duplicated ip rule");
                        last_err = Some(e);
                    }
                }
                count -= 1;
            } else {
                match host.add_rule(&self.rule) {
                    Ok(()) => {}
                    Err(e) if e.is_already_exists() => {
                        debug!(rule = %self.rule, "ip rule already present");
                    }
                    Err(e) => {
                        error!(rule = %self.rule, error = %e, "failed to add ip rule");
                        last_err = Some(e);
                    }
                }
                count += 1;
            }
        }

        match last_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Ensure for RuleConfig {
    fn ensure(&self, host: &dyn Host, enabled: bool) -> Result<()> {
        self.converge(host, usize::from(enabled))
    }
}
