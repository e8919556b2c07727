//! Narrow interfaces to the host subsystems the reconciler drives.
//!
//! Each trait covers one subsystem. [`Host`] bundles all four and is what
//! `ensure` receives, so configs stay plain data and the live kernel (or a
//! test double) is injected once by the caller.

use crate::error::Result;
use crate::iptables::IptablesFilter;
use crate::netlink::Connection;
use crate::sysctl::ProcSysctl;
use crate::types::{AddressFamily, Route, Rule, RuleSpec};

/// Kernel parameter access.
pub trait Sysctl {
    /// Write `value` to `key`, returning the previous value.
    fn set(&self, key: &str, value: &str) -> Result<String>;
}

/// Routing table mutation.
pub trait RouteTable {
    /// Add a route. Fails with an "already exists" error if present.
    fn add_route(&self, route: &Route) -> Result<()>;
    /// Delete a route. Fails with a "not found" error if absent.
    fn del_route(&self, route: &Route) -> Result<()>;
}

/// Policy-routing rule mutation and listing.
pub trait RuleTable {
    fn add_rule(&self, rule: &Rule) -> Result<()>;
    fn del_rule(&self, rule: &Rule) -> Result<()>;
    fn list_rules(&self, family: AddressFamily) -> Result<Vec<Rule>>;
}

/// Packet-filter chain and rule mutation.
pub trait PacketFilter {
    fn new_chain(&self, table: &str, chain: &str) -> Result<()>;
    /// Remove every rule from a chain.
    fn clear_chain(&self, table: &str, chain: &str) -> Result<()>;
    fn delete_chain(&self, table: &str, chain: &str) -> Result<()>;
    /// Append `spec` unless an identical rule is already in the chain.
    fn append_unique(&self, table: &str, chain: &str, spec: &RuleSpec) -> Result<()>;
    fn delete_rule(&self, table: &str, chain: &str, spec: &RuleSpec) -> Result<()>;
}

/// Everything `ensure` may touch.
pub trait Host: Sysctl + RouteTable + RuleTable + PacketFilter {}

impl<T: Sysctl + RouteTable + RuleTable + PacketFilter + ?Sized> Host for T {}

/// The live host: rtnetlink for routes and rules, iptables for chains,
/// procfs for sysctls.
pub struct SystemHost {
    netlink: Connection,
    filter: IptablesFilter,
    sysctl: ProcSysctl,
}

impl SystemHost {
    /// Open a route netlink socket and locate the IPv4 iptables binary.
    pub fn new() -> Result<Self> {
        Ok(Self {
            netlink: Connection::new()?,
            filter: IptablesFilter::new()?,
            sysctl: ProcSysctl::default(),
        })
    }

    pub fn netlink(&self) -> &Connection {
        &self.netlink
    }
}

impl Sysctl for SystemHost {
    fn set(&self, key: &str, value: &str) -> Result<String> {
        self.sysctl.set(key, value)
    }
}

impl RouteTable for SystemHost {
    fn add_route(&self, route: &Route) -> Result<()> {
        self.netlink.add_route(route)
    }

    fn del_route(&self, route: &Route) -> Result<()> {
        self.netlink.del_route(route)
    }
}

impl RuleTable for SystemHost {
    fn add_rule(&self, rule: &Rule) -> Result<()> {
        self.netlink.add_rule(rule)
    }

    fn del_rule(&self, rule: &Rule) -> Result<()> {
        self.netlink.del_rule(rule)
    }

    fn list_rules(&self, family: AddressFamily) -> Result<Vec<Rule>> {
        self.netlink.list_rules(family)
    }
}

impl PacketFilter for SystemHost {
    fn new_chain(&self, table: &str, chain: &str) -> Result<()> {
        self.filter.new_chain(table, chain)
    }

    fn clear_chain(&self, table: &str, chain: &str) -> Result<()> {
        self.filter.clear_chain(table, chain)
    }

    fn delete_chain(&self, table: &str, chain: &str) -> Result<()> {
        self.filter.delete_chain(table, chain)
    }

    fn append_unique(&self, table: &str, chain: &str, spec: &RuleSpec) -> Result<()> {
        self.filter.append_unique(table, chain, spec)
    }

    fn delete_rule(&self, table: &str, chain: &str, spec: &RuleSpec) -> Result<()> {
        self.filter.delete_rule(table, chain, spec)
    }
}
