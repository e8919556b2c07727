//! Packet-filter access through the `iptables` binary.
//!
//! The `iptables` crate reports failures as boxed errors carrying the tool's
//! exit status and stderr. Which status means "already exists" or "not found"
//! depends on the command, so each failure is classified here, once, against
//! the operation that produced it.

use std::error::Error as StdError;
use std::fmt;

use tracing::debug;

use crate::error::{Error, ErrorKind, Result};
use crate::host::PacketFilter;
use crate::types::RuleSpec;

/// A packet-filter operation, for error reporting and classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    NewChain,
    ClearChain,
    DeleteChain,
    AppendUnique,
    DeleteRule,
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NewChain => "new-chain",
            Self::ClearChain => "clear-chain",
            Self::DeleteChain => "delete-chain",
            Self::AppendUnique => "append",
            Self::DeleteRule => "delete-rule",
        })
    }
}

/// Map an exit status and tool output to an [`ErrorKind`].
///
/// `iptables` exits with 1 for most failures and 2 for bad parameters, which
/// includes deleting a rule that is not in the chain on some versions.
pub fn classify(op: FilterOp, status: i32, message: &str) -> ErrorKind {
    let missing = message.contains("No chain/target/match")
        || message.contains("does a matching rule exist")
        || message.contains("No such file or directory");
    match op {
        FilterOp::NewChain if status == 1 || message.contains("Chain already exists") => {
            ErrorKind::AlreadyExists
        }
        FilterOp::ClearChain | FilterOp::DeleteChain
            if missing || (status == 1 && message.is_empty()) =>
        {
            ErrorKind::NotFound
        }
        FilterOp::DeleteRule if status == 2 || missing => ErrorKind::NotFound,
        _ => ErrorKind::Other(status),
    }
}

impl Error {
    /// Build a filter error, classifying `status` for `operation`.
    pub fn filter(
        operation: FilterOp,
        table: &str,
        chain: &str,
        status: i32,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        Self::Filter {
            operation,
            table: table.to_string(),
            chain: chain.to_string(),
            status,
            kind: classify(operation, status, &message),
            message,
        }
    }
}

/// Convert an error from the `iptables` crate.
fn convert(op: FilterOp, table: &str, chain: &str, err: Box<dyn StdError>) -> Error {
    let (status, message) = match err.downcast_ref::<iptables::error::IptablesError>() {
        Some(e) => (e.code, e.msg.trim().to_string()),
        None => (-1, err.to_string()),
    };
    Error::filter(op, table, chain, status, message)
}

/// IPv4 packet filter backed by the `iptables` crate.
pub struct IptablesFilter {
    inner: iptables::IPTables,
}

impl IptablesFilter {
    /// Locate the `iptables` binary.
    pub fn new() -> Result<Self> {
        let inner =
            iptables::new(false).map_err(|e| Error::FilterUnavailable(e.to_string()))?;
        Ok(Self { inner })
    }
}

impl PacketFilter for IptablesFilter {
    fn new_chain(&self, table: &str, chain: &str) -> Result<()> {
        debug!(table, chain, "creating chain");
        self.inner
            .new_chain(table, chain)
            .map_err(|e| convert(FilterOp::NewChain, table, chain, e))
    }

    fn clear_chain(&self, table: &str, chain: &str) -> Result<()> {
        debug!(table, chain, "flushing chain");
        self.inner
            .flush_chain(table, chain)
            .map_err(|e| convert(FilterOp::ClearChain, table, chain, e))
    }

    fn delete_chain(&self, table: &str, chain: &str) -> Result<()> {
        debug!(table, chain, "deleting chain");
        self.inner
            .delete_chain(table, chain)
            .map_err(|e| convert(FilterOp::DeleteChain, table, chain, e))
    }

    fn append_unique(&self, table: &str, chain: &str, spec: &RuleSpec) -> Result<()> {
        let rule = spec.to_command_line();
        let present = self
            .inner
            .exists(table, chain, &rule)
            .map_err(|e| convert(FilterOp::AppendUnique, table, chain, e))?;
        if present {
            return Ok(());
        }
        debug!(table, chain, %rule, "appending rule");
        self.inner
            .append(table, chain, &rule)
            .map_err(|e| convert(FilterOp::AppendUnique, table, chain, e))
    }

    fn delete_rule(&self, table: &str, chain: &str, spec: &RuleSpec) -> Result<()> {
        let rule = spec.to_command_line();
        debug!(table, chain, %rule, "deleting rule");
        self.inner
            .delete(table, chain, &rule)
            .map_err(|e| convert(FilterOp::DeleteRule, table, chain, e))
    }
}
