//! In-memory host that answers like the kernel and `iptables` do.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::io;

use crate::error::{Error, Result};
use crate::host::{PacketFilter, RouteTable, RuleTable, Sysctl};
use crate::iptables::FilterOp;
use crate::types::{AddressFamily, Route, Rule, RuleSpec};

/// Host calls, as recorded by [`FakeHost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Sysctl,
    AddRoute,
    DelRoute,
    AddRule,
    DelRule,
    ListRules,
    NewChain,
    ClearChain,
    DeleteChain,
    AppendUnique,
    DeleteRule,
}

const NO_CHAIN: &str = "iptables: No chain/target/match by that name.";
const NO_RULE: &str = "iptables: Bad rule (does a matching rule exist in that chain?).";

/// Priority the kernel assigns a rule added without one.
const AUTO_PRIORITY: u32 = 32765;

#[derive(Default)]
struct State {
    sysctls: BTreeMap<String, String>,
    routes: Vec<Route>,
    rules: Vec<Rule>,
    chains: BTreeMap<(String, String), Vec<RuleSpec>>,
    calls: Vec<Op>,
    failures: HashMap<Op, Vec<Error>>,
    always: HashMap<Op, fn() -> Error>,
}

#[derive(Default)]
pub struct FakeHost {
    state: RefCell<State>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sysctl(self, key: &str, value: &str) -> Self {
        self.state
            .borrow_mut()
            .sysctls
            .insert(key.to_string(), value.to_string());
        self
    }

    /// Add a chain that already exists, e.g. a built-in one.
    pub fn with_chain(self, table: &str, chain: &str) -> Self {
        self.state
            .borrow_mut()
            .chains
            .insert((table.to_string(), chain.to_string()), Vec::new());
        self
    }

    /// Seed a rule as if written by an earlier run.
    pub fn with_rule(self, rule: Rule) -> Self {
        self.state.borrow_mut().rules.push(rule);
        self
    }

    pub fn with_route(self, route: Route) -> Self {
        self.state.borrow_mut().routes.push(route);
        self
    }

    /// Fail the next call of `op` with `err`.
    pub fn fail_next(&self, op: Op, err: Error) {
        self.state
            .borrow_mut()
            .failures
            .entry(op)
            .or_default()
            .insert(0, err);
    }

    /// Fail every call of `op`.
    pub fn fail_always(&self, op: Op, err: fn() -> Error) {
        self.state.borrow_mut().always.insert(op, err);
    }

    pub fn calls(&self) -> Vec<Op> {
        self.state.borrow().calls.clone()
    }

    pub fn count(&self, op: Op) -> usize {
        self.state.borrow().calls.iter().filter(|c| **c == op).count()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub fn sysctl(&self, key: &str) -> Option<String> {
        self.state.borrow().sysctls.get(key).cloned()
    }

    pub fn routes(&self) -> Vec<Route> {
        self.state.borrow().routes.clone()
    }

    pub fn rules(&self) -> Vec<Rule> {
        self.state.borrow().rules.clone()
    }

    /// Number of installed rules equal to `rule` ignoring priority.
    pub fn matching_rules(&self, rule: &Rule) -> usize {
        self.state
            .borrow()
            .rules
            .iter()
            .filter(|r| r.eq_ignoring_priority(rule))
            .count()
    }

    pub fn chain(&self, table: &str, chain: &str) -> Option<Vec<RuleSpec>> {
        self.state
            .borrow()
            .chains
            .get(&(table.to_string(), chain.to_string()))
            .cloned()
    }

    /// Record the call and return an injected failure, if any.
    fn enter(&self, op: Op) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.calls.push(op);
        if let Some(make) = state.always.get(&op) {
            return Err(make());
        }
        match state.failures.get_mut(&op).and_then(Vec::pop) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn key(table: &str, chain: &str) -> (String, String) {
    (table.to_string(), chain.to_string())
}

fn same_route(a: &Route, b: &Route) -> bool {
    a.dst == b.dst && a.table == b.table && a.gateway == b.gateway
}

/// Kernel rule matching: an unset priority matches any.
fn rule_matches(installed: &Rule, wanted: &Rule) -> bool {
    installed.eq_ignoring_priority(wanted)
        && (wanted.priority.is_none() || wanted.priority == installed.priority)
}

impl Sysctl for FakeHost {
    fn set(&self, key: &str, value: &str) -> Result<String> {
        self.enter(Op::Sysctl)?;
        let mut state = self.state.borrow_mut();
        match state.sysctls.get_mut(key) {
            Some(current) => Ok(std::mem::replace(current, value.to_string())),
            None => Err(Error::Sysctl {
                key: key.to_string(),
                source: io::Error::from(io::ErrorKind::NotFound),
            }),
        }
    }
}

impl RouteTable for FakeHost {
    fn add_route(&self, route: &Route) -> Result<()> {
        self.enter(Op::AddRoute)?;
        let mut state = self.state.borrow_mut();
        if state.routes.iter().any(|r| same_route(r, route)) {
            return Err(Error::from_errno(-libc::EEXIST));
        }
        state.routes.push(route.clone());
        Ok(())
    }

    fn del_route(&self, route: &Route) -> Result<()> {
        self.enter(Op::DelRoute)?;
        let mut state = self.state.borrow_mut();
        match state.routes.iter().position(|r| same_route(r, route)) {
            Some(index) => {
                state.routes.remove(index);
                Ok(())
            }
            None => Err(Error::from_errno(-libc::ESRCH)),
        }
    }
}

impl RuleTable for FakeHost {
    fn add_rule(&self, rule: &Rule) -> Result<()> {
        self.enter(Op::AddRule)?;
        let mut state = self.state.borrow_mut();
        if state.rules.iter().any(|r| rule_matches(r, rule)) {
            return Err(Error::from_errno(-libc::EEXIST));
        }
        let mut installed = rule.clone();
        installed.priority.get_or_insert(AUTO_PRIORITY);
        state.rules.push(installed);
        Ok(())
    }

    fn del_rule(&self, rule: &Rule) -> Result<()> {
        self.enter(Op::DelRule)?;
        let mut state = self.state.borrow_mut();
        match state.rules.iter().position(|r| rule_matches(r, rule)) {
            Some(index) => {
                state.rules.remove(index);
                Ok(())
            }
            None => Err(Error::from_errno(-libc::ENOENT)),
        }
    }

    fn list_rules(&self, family: AddressFamily) -> Result<Vec<Rule>> {
        self.enter(Op::ListRules)?;
        Ok(self
            .state
            .borrow()
            .rules
            .iter()
            .filter(|r| r.family == family)
            .cloned()
            .collect())
    }
}

impl PacketFilter for FakeHost {
    fn new_chain(&self, table: &str, chain: &str) -> Result<()> {
        self.enter(Op::NewChain)?;
        let mut state = self.state.borrow_mut();
        if state.chains.contains_key(&key(table, chain)) {
            return Err(Error::filter(
                FilterOp::NewChain,
                table,
                chain,
                1,
                "iptables: Chain already exists.",
            ));
        }
        state.chains.insert(key(table, chain), Vec::new());
        Ok(())
    }

    fn clear_chain(&self, table: &str, chain: &str) -> Result<()> {
        self.enter(Op::ClearChain)?;
        match self.state.borrow_mut().chains.get_mut(&key(table, chain)) {
            Some(specs) => {
                specs.clear();
                Ok(())
            }
            None => Err(Error::filter(FilterOp::ClearChain, table, chain, 1, NO_CHAIN)),
        }
    }

    fn delete_chain(&self, table: &str, chain: &str) -> Result<()> {
        self.enter(Op::DeleteChain)?;
        let mut state = self.state.borrow_mut();
        let busy = match state.chains.get(&key(table, chain)) {
            Some(specs) => !specs.is_empty(),
            None => return Err(Error::filter(FilterOp::DeleteChain, table, chain, 1, NO_CHAIN)),
        };
        if busy {
            return Err(Error::filter(
                FilterOp::DeleteChain,
                table,
                chain,
                1,
                "iptables: Directory not empty.",
            ));
        }
        state.chains.remove(&key(table, chain));
        Ok(())
    }

    fn append_unique(&self, table: &str, chain: &str, spec: &RuleSpec) -> Result<()> {
        self.enter(Op::AppendUnique)?;
        match self.state.borrow_mut().chains.get_mut(&key(table, chain)) {
            Some(specs) => {
                if !specs.contains(spec) {
                    specs.push(spec.clone());
                }
                Ok(())
            }
            None => Err(Error::filter(FilterOp::AppendUnique, table, chain, 1, NO_CHAIN)),
        }
    }

    fn delete_rule(&self, table: &str, chain: &str, spec: &RuleSpec) -> Result<()> {
        self.enter(Op::DeleteRule)?;
        let mut state = self.state.borrow_mut();
        let Some(specs) = state.chains.get_mut(&key(table, chain)) else {
            return Err(Error::filter(FilterOp::DeleteRule, table, chain, 1, NO_CHAIN));
        };
        match specs.iter().position(|s| s == spec) {
            Some(index) => {
                specs.remove(index);
                Ok(())
            }
            None => Err(Error::filter(FilterOp::DeleteRule, table, chain, 1, NO_RULE)),
        }
    }
}
