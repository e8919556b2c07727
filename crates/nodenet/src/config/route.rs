use serde::Serialize;
use tracing::debug;

use super::Ensure;
use crate::error::Result;
use crate::host::Host;
use crate::types::Route;

/// A routing-table entry that is added if absent and deleted if present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteConfig {
    pub route: Route,
}

impl RouteConfig {
    pub fn new(route: Route) -> Self {
        Self { route }
    }
}

impl Ensure for RouteConfig {
    fn ensure(&self, host: &dyn Host, enabled: bool) -> Result<()> {
        if enabled {
            match host.add_route(&self.route) {
                Err(e) if e.is_already_exists() => {
                    debug!(route = %self.route, "route already present");
                    Ok(())
                }
                other => other,
            }
        } else {
            match host.del_route(&self.route) {
                Err(e) if e.is_not_found() => {
                    debug!(route = %self.route, "route already absent");
                    Ok(())
                }
                other => other,
            }
        }
    }
}
