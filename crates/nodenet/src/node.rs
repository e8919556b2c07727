//! Local-table rules derived from the node object.
//!
//! The node's pod CIDR gives the veth gateway address (network base + 1) and
//! each reported `InternalIP` gets a rule sending traffic for it to the local
//! routing table. Building the state makes no kernel calls; it is applied
//! later through the [`RuleConfig`]s it holds.

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr};

use ipnetwork::{IpNetwork, Ipv4Network};
use k8s_openapi::api::core::v1::Node;
use kube::{Api, ResourceExt};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::RuleConfig;
use crate::error::{Error, Result};
use crate::types::{Rule, rt_table};

/// Priority of the node-address rules pointing at the local table.
pub const LOCAL_TABLE_RULE_PRIORITY: u32 = 30000;

const INTERNAL_IP: &str = "InternalIP";

/// Routing state computed from one read of the node object.
///
/// Always rebuilt as a whole; a refresh replaces the previous value rather
/// than merging into it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalRouteState {
    /// Host route to the pod network's gateway address.
    pub veth_gateway_dst: Ipv4Network,
    /// One rule per internal IP, in the order the node reports them.
    pub local_table_rules: Vec<RuleConfig>,
}

impl LocalRouteState {
    /// Compute the state from a node object.
    pub fn from_node(node: &Node) -> Result<Self> {
        let name = node.name_any();
        let veth_gateway_dst = gateway_of(&name, pod_cidr(&name, node)?)?;

        let local_table_rules: Vec<RuleConfig> = internal_ips(&name, node)?
            .into_iter()
            .map(|ip| RuleConfig::new(local_table_rule(ip)))
            .collect();

        debug!(
            node = %name,
            %veth_gateway_dst,
            rules = local_table_rules.len(),
            "computed local route state"
        );
        Ok(Self {
            veth_gateway_dst,
            local_table_rules,
        })
    }

    /// The node addresses the local-table rules cover.
    pub fn internal_ips(&self) -> impl Iterator<Item = IpAddr> + '_ {
        self.local_table_rules
            .iter()
            .filter_map(|c| c.rule.dst.map(|dst| dst.ip()))
    }
}

/// The rule routing traffic for `ip` through the local table.
pub fn local_table_rule(ip: Ipv4Addr) -> Rule {
    Rule::v4()
        .priority(LOCAL_TABLE_RULE_PRIORITY)
        .to(IpNetwork::V4(Ipv4Network::from(ip)))
        .table(rt_table::LOCAL)
}

/// `spec.podCIDR`, falling back to the first entry of `spec.podCIDRs`.
fn pod_cidr(name: &str, node: &Node) -> Result<Ipv4Network> {
    let spec = node.spec.as_ref();
    let cidr = spec
        .and_then(|s| s.pod_cidr.as_deref())
        .filter(|c| !c.is_empty())
        .or_else(|| {
            spec.and_then(|s| s.pod_cidrs.as_ref())
                .and_then(|cidrs| cidrs.first())
                .map(String::as_str)
                .filter(|c| !c.is_empty())
        })
        .ok_or_else(|| Error::MissingPodCidr {
            node: name.to_string(),
        })?;

    cidr.parse::<Ipv4Network>()
        .map_err(|e| Error::InvalidPodCidr {
            node: name.to_string(),
            cidr: cidr.to_string(),
            reason: e.to_string(),
        })
}

/// First host address of the pod network, as a /32.
fn gateway_of(name: &str, cidr: Ipv4Network) -> Result<Ipv4Network> {
    let invalid = |reason: &str| Error::InvalidPodCidr {
        node: name.to_string(),
        cidr: cidr.to_string(),
        reason: reason.to_string(),
    };

    let gateway = u32::from(cidr.network())
        .checked_add(1)
        .map(Ipv4Addr::from)
        .filter(|gw| cidr.contains(*gw))
        .ok_or_else(|| invalid("no host address after the network address"))?;
    Ipv4Network::new(gateway, 32).map_err(|e| invalid(&e.to_string()))
}

/// Distinct IPv4 `InternalIP` addresses, in reported order.
fn internal_ips(name: &str, node: &Node) -> Result<Vec<Ipv4Addr>> {
    let addresses = node
        .status
        .as_ref()
        .and_then(|s| s.addresses.as_deref())
        .unwrap_or_default();

    let mut ips = Vec::new();
    for address in addresses.iter().filter(|a| a.type_ == INTERNAL_IP) {
        let ip: IpAddr = address.address.parse().map_err(|_| Error::InvalidAddress {
            node: name.to_string(),
            address: address.address.clone(),
        })?;
        // Dual-stack nodes also report an IPv6 InternalIP.
        if let IpAddr::V4(v4) = ip
            && !ips.contains(&v4)
        {
            ips.push(v4);
        }
    }

    if ips.is_empty() {
        return Err(Error::MissingInternalIp {
            node: name.to_string(),
        });
    }
    Ok(ips)
}

/// Read access to node objects.
pub trait NodeSource {
    fn get_node(&self, name: &str) -> impl Future<Output = Result<Node>> + Send;
}

/// Nodes read from the Kubernetes API server.
#[derive(Clone)]
pub struct KubeNodeSource {
    api: Api<Node>,
}

impl KubeNodeSource {
    pub fn new(client: kube::Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

impl NodeSource for KubeNodeSource {
    async fn get_node(&self, name: &str) -> Result<Node> {
        Ok(self.api.get(name).await?)
    }
}

/// Fetch `node_name` and compute its [`LocalRouteState`].
///
/// The caller publishes the result in place of any previous state; nothing
/// is applied to the host here.
pub async fn fill_local_rules_from_node<S: NodeSource>(
    source: &S,
    node_name: &str,
) -> Result<LocalRouteState> {
    let node = source.get_node(node_name).await?;
    let state = LocalRouteState::from_node(&node)?;
    info!(
        node = node_name,
        veth_gateway_dst = %state.veth_gateway_dst,
        internal_ips = state.local_table_rules.len(),
        "filled local table rules from node"
    );
    Ok(state)
}
