//! Idempotent host-network reconciliation for Kubernetes nodes.
//!
//! Host state is described as plain config values (kernel parameters,
//! routes, policy rules, packet-filter chains) and converged with
//! [`Ensure::ensure`]. Every config can be ensured any number of times in
//! either direction; "already exists" and "not found" answers from the
//! kernel or `iptables` count as success where they mean the desired state
//! is already in place.
//!
//! The host is reached through the narrow traits in [`host`]. [`SystemHost`]
//! implements them with rtnetlink, `iptables` and procfs.
//!
//! # Example
//!
//! ```ignore
//! use nodenet::{Ensure, SystemHost};
//! use nodenet::node::{KubeNodeSource, fill_local_rules_from_node};
//! use nodenet::policy_routing::{PolicyRoutingOptions, policy_routing_set};
//!
//! let source = KubeNodeSource::new(kube::Client::try_default().await?);
//! let state = fill_local_rules_from_node(&source, "node-a").await?;
//! let feature = policy_routing_set(&PolicyRoutingOptions::default(), &state)?;
//!
//! let host = SystemHost::new()?;
//! feature.reconcile(&host)?;
//! ```

pub mod config;
pub mod error;
pub mod host;
pub mod iptables;
pub mod netlink;
pub mod node;
pub mod policy_routing;
pub mod sysctl;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::{Config, Ensure, Set};
pub use error::{Error, ErrorKind, Result};
pub use host::{Host, SystemHost};
pub use node::{LocalRouteState, fill_local_rules_from_node};
