//! Kernel objects the reconciler manages: routes, policy rules and
//! packet-filter chain/rule specifications.

use std::fmt;
use std::net::IpAddr;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

/// Well-known routing table IDs.
pub mod rt_table {
    pub const UNSPEC: u32 = 0;
    pub const MAIN: u32 = 254;
    pub const LOCAL: u32 = 255;
}

/// Address family of a route or rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    Inet,
    Inet6,
}

impl AddressFamily {
    /// The `AF_*` value used on the wire.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Inet => libc::AF_INET as u8,
            Self::Inet6 => libc::AF_INET6 as u8,
        }
    }

    /// Parse an `AF_*` value.
    pub fn from_u8(family: u8) -> Option<Self> {
        match family as i32 {
            libc::AF_INET => Some(Self::Inet),
            libc::AF_INET6 => Some(Self::Inet6),
            _ => None,
        }
    }

    fn of(net: &IpNetwork) -> Self {
        match net {
            IpNetwork::V4(_) => Self::Inet,
            IpNetwork::V6(_) => Self::Inet6,
        }
    }
}

/// FIB rule actions (FR_ACT_*).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Lookup,
    Goto,
    Nop,
    Blackhole,
    Unreachable,
    Prohibit,
}

impl RuleAction {
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Lookup => 1,
            Self::Goto => 2,
            Self::Nop => 3,
            Self::Blackhole => 6,
            Self::Unreachable => 7,
            Self::Prohibit => 8,
        }
    }

    pub fn from_u8(action: u8) -> Option<Self> {
        match action {
            1 => Some(Self::Lookup),
            2 => Some(Self::Goto),
            3 => Some(Self::Nop),
            6 => Some(Self::Blackhole),
            7 => Some(Self::Unreachable),
            8 => Some(Self::Prohibit),
            _ => None,
        }
    }
}

/// A policy-routing rule.
///
/// Only the selectors the reconciler manages are modelled; attributes the
/// kernel reports beyond these are dropped when a rule dump is parsed, so a
/// listed rule compares equal to the one that was added.
///
/// # Example
///
/// ```
/// use nodenet::types::{Rule, rt_table};
///
/// let rule = Rule::v4()
///     .priority(30000)
///     .to("10.128.0.24/32".parse().unwrap())
///     .table(rt_table::LOCAL);
/// assert_eq!(rule.table, 255);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub family: AddressFamily,
    /// `None` lets the kernel pick a priority on add and matches any on delete.
    pub priority: Option<u32>,
    pub table: u32,
    pub action: RuleAction,
    pub src: Option<IpNetwork>,
    pub dst: Option<IpNetwork>,
    pub iif: Option<String>,
    pub oif: Option<String>,
    pub fwmark: Option<u32>,
    pub fwmask: Option<u32>,
    pub tos: u8,
    /// Match traffic the selectors do NOT match (`ip rule add not ...`).
    #[serde(default)]
    pub invert: bool,
}

impl Rule {
    /// Create an empty rule for the given family that looks up the main table.
    pub fn new(family: AddressFamily) -> Self {
        Self {
            family,
            priority: None,
            table: rt_table::MAIN,
            action: RuleAction::Lookup,
            src: None,
            dst: None,
            iif: None,
            oif: None,
            fwmark: None,
            fwmask: None,
            tos: 0,
            invert: false,
        }
    }

    /// Create an empty IPv4 rule.
    pub fn v4() -> Self {
        Self::new(AddressFamily::Inet)
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Match on source prefix.
    pub fn from(mut self, src: IpNetwork) -> Self {
        self.family = AddressFamily::of(&src);
        self.src = Some(src);
        self
    }

    /// Match on destination prefix.
    pub fn to(mut self, dst: IpNetwork) -> Self {
        self.family = AddressFamily::of(&dst);
        self.dst = Some(dst);
        self
    }

    pub fn iif(mut self, name: impl Into<String>) -> Self {
        self.iif = Some(name.into());
        self
    }

    pub fn oif(mut self, name: impl Into<String>) -> Self {
        self.oif = Some(name.into());
        self
    }

    pub fn fwmark(mut self, mark: u32) -> Self {
        self.fwmark = Some(mark);
        self
    }

    pub fn fwmark_mask(mut self, mark: u32, mask: u32) -> Self {
        self.fwmark = Some(mark);
        self.fwmask = Some(mask);
        self
    }

    /// Look up `table` for matching traffic.
    pub fn table(mut self, table: u32) -> Self {
        self.table = table;
        self.action = RuleAction::Lookup;
        self
    }

    pub fn invert(mut self) -> Self {
        self.invert = true;
        self
    }

    pub fn action(mut self, action: RuleAction) -> Self {
        self.action = action;
        self
    }

    /// The mask the kernel stores for this rule's fwmark.
    ///
    /// A mark added without a mask is stored with an all-ones mask.
    fn effective_fwmask(&self) -> Option<u32> {
        match (self.fwmark, self.fwmask) {
            (_, Some(mask)) => Some(mask),
            (Some(_), None) => Some(u32::MAX),
            (None, None) => None,
        }
    }

    /// Compare two rules on every field except priority.
    ///
    /// Rules written under an older priority scheme count as the same rule,
    /// which is what lets duplicates be collapsed.
    pub fn eq_ignoring_priority(&self, other: &Rule) -> bool {
        self.family == other.family
            && self.table == other.table
            && self.action == other.action
            && self.src == other.src
            && self.dst == other.dst
            && self.iif == other.iif
            && self.oif == other.oif
            && self.fwmark.unwrap_or(0) == other.fwmark.unwrap_or(0)
            && self.effective_fwmask().unwrap_or(0) == other.effective_fwmask().unwrap_or(0)
            && self.tos == other.tos
            && self.invert == other.invert
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prio) = self.priority {
            write!(f, "{prio}: ")?;
        }
        if self.invert {
            f.write_str("not ")?;
        }
        match self.src {
            Some(src) => write!(f, "from {src}")?,
            None => f.write_str("from all")?,
        }
        if let Some(dst) = self.dst {
            write!(f, " to {dst}")?;
        }
        if let Some(ref iif) = self.iif {
            write!(f, " iif {iif}")?;
        }
        if let Some(ref oif) = self.oif {
            write!(f, " oif {oif}")?;
        }
        if let Some(mark) = self.fwmark {
            write!(f, " fwmark {mark:#x}")?;
            if let Some(mask) = self.fwmask {
                write!(f, "/{mask:#x}")?;
            }
        }
        match self.action {
            RuleAction::Lookup => write!(f, " lookup {}", self.table),
            other => write!(f, " {}", format!("{other:?}").to_lowercase()),
        }
    }
}

/// Route scope (RT_SCOPE_*).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteScope {
    Universe,
    Site,
    Link,
    Host,
    Nowhere,
}

impl RouteScope {
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Universe => 0,
            Self::Site => 200,
            Self::Link => 253,
            Self::Host => 254,
            Self::Nowhere => 255,
        }
    }
}

/// A routing-table entry.
///
/// # Example
///
/// ```
/// use nodenet::types::{Route, RouteScope};
///
/// let route = Route::new("10.124.0.1/32".parse().unwrap())
///     .dev("cbr0")
///     .scope(RouteScope::Link)
///     .table(1);
/// assert_eq!(route.table, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub dst: IpNetwork,
    pub gateway: Option<IpAddr>,
    /// Output interface name.
    pub dev: Option<String>,
    pub table: u32,
    /// `None` derives the scope from whether a gateway is set.
    pub scope: Option<RouteScope>,
}

impl Route {
    /// Create a route to `dst` in the main table.
    pub fn new(dst: IpNetwork) -> Self {
        Self {
            dst,
            gateway: None,
            dev: None,
            table: rt_table::MAIN,
            scope: None,
        }
    }

    pub fn gateway(mut self, gateway: IpAddr) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn dev(mut self, dev: impl Into<String>) -> Self {
        self.dev = Some(dev.into());
        self
    }

    pub fn table(mut self, table: u32) -> Self {
        self.table = table;
        self
    }

    pub fn scope(mut self, scope: RouteScope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn family(&self) -> AddressFamily {
        AddressFamily::of(&self.dst)
    }

    /// Scope used on the wire.
    pub(crate) fn effective_scope(&self) -> RouteScope {
        match self.scope {
            Some(scope) => scope,
            None if self.gateway.is_some() => RouteScope::Universe,
            None => RouteScope::Link,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dst)?;
        if let Some(gw) = self.gateway {
            write!(f, " via {gw}")?;
        }
        if let Some(ref dev) = self.dev {
            write!(f, " dev {dev}")?;
        }
        write!(f, " table {}", self.table)
    }
}

/// A packet-filter chain within a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSpec {
    pub table: String,
    pub chain: String,
    /// Built-in chain (e.g. `PREROUTING`): only our rules are removed from
    /// it, the chain itself is never flushed or deleted.
    pub is_default: bool,
}

impl ChainSpec {
    /// A chain this process creates and owns.
    pub fn owned(table: impl Into<String>, chain: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            chain: chain.into(),
            is_default: false,
        }
    }

    /// A built-in chain shared with the rest of the system.
    pub fn system_default(table: impl Into<String>, chain: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            chain: chain.into(),
            is_default: true,
        }
    }
}

/// One rule inside a chain, as the token list passed to the filter tool
/// (matches followed by the target), e.g. `["-i", "eth0", "-j", "ACCEPT"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleSpec(pub Vec<String>);

impl RuleSpec {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(tokens.into_iter().map(Into::into).collect())
    }

    pub fn tokens(&self) -> &[String] {
        &self.0
    }

    /// Render as a single argument string, quoting tokens that contain
    /// whitespace.
    pub fn to_command_line(&self) -> String {
        self.0
            .iter()
            .map(|t| {
                if t.chars().any(char::is_whitespace) {
                    format!("\"{t}\"")
                } else {
                    t.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for RuleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_command_line())
    }
}
