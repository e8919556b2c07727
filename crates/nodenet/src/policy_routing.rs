//! The policy-routing feature.
//!
//! Pod traffic entering from the bridge is routed through a dedicated table
//! whose default route leaves via the host interface, and connection marks
//! are restored on ingress so replies follow the same path. The node's own
//! addresses are kept in the local table ahead of that rule.

use std::net::{IpAddr, Ipv4Addr};

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use crate::config::{ChainRuleConfig, RouteConfig, RuleConfig, Set, SysctlConfig};
use crate::error::Result;
use crate::node::LocalRouteState;
use crate::types::{ChainSpec, Route, RouteScope, Rule, RuleSpec};

/// Feature name used in logs.
pub const FEATURE_NAME: &str = "PolicyRouting";

/// Settings for [`policy_routing_set`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyRoutingOptions {
    pub enabled: bool,
    /// Routing table for traffic from the pod bridge.
    pub custom_table: u32,
    /// Interface facing the node's network.
    pub host_dev: String,
    /// Bridge the pod veths are attached to.
    pub gateway_dev: String,
    /// Next hop for the custom table's default route. Without one the table
    /// only holds the veth gateway route.
    pub host_gateway: Option<Ipv4Addr>,
    /// Priority of the rule selecting the custom table.
    pub rule_priority: u32,
}

impl Default for PolicyRoutingOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            custom_table: 1,
            host_dev: "eth0".into(),
            gateway_dev: "cbr0".into(),
            host_gateway: None,
            rule_priority: 30001,
        }
    }
}

/// Connmark restore in the built-in mangle PREROUTING chain.
pub fn connmark_restore() -> ChainRuleConfig {
    ChainRuleConfig::new(
        ChainSpec::system_default("mangle", "PREROUTING"),
        vec![RuleSpec::new([
            "-m",
            "comment",
            "--comment",
            "nodenet policy routing",
            "-j",
            "CONNMARK",
            "--restore-mark",
        ])],
    )
}

/// Build the policy-routing feature for the given node state.
pub fn policy_routing_set(options: &PolicyRoutingOptions, state: &LocalRouteState) -> Result<Set> {
    let mut set = Set::new(FEATURE_NAME, options.enabled)
        // Loose reverse-path filtering: replies may come back on another
        // interface than the one the policy route chose.
        .with(SysctlConfig::new(
            format!("net.ipv4.conf.{}.rp_filter", options.host_dev),
            "2",
            "1",
        ))
        .with(SysctlConfig::new("net.ipv4.conf.all.src_valid_mark", "1", "0"))
        .with(RouteConfig::new(
            Route::new(IpNetwork::V4(state.veth_gateway_dst))
                .dev(options.gateway_dev.as_str())
                .scope(RouteScope::Link)
                .table(options.custom_table),
        ));

    if let Some(gateway) = options.host_gateway {
        let default_dst = IpNetwork::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)?;
        set = set.with(RouteConfig::new(
            Route::new(default_dst)
                .gateway(IpAddr::V4(gateway))
                .dev(options.host_dev.as_str())
                .table(options.custom_table),
        ));
    }

    Ok(set
        .with(RuleConfig::new(
            Rule::v4()
                .priority(options.rule_priority)
                .iif(options.gateway_dev.as_str())
                .table(options.custom_table),
        ))
        .with(connmark_restore())
        .with_all(state.local_table_rules.iter().cloned()))
}
