//! Error types for host-network reconciliation.
//!
//! Every error classifies into an [`ErrorKind`]. The `ensure` logic only ever
//! looks at the kind, so the adapters (netlink, iptables, sysctl) are the one
//! place that knows what a given errno or exit status means.

use std::fmt;
use std::io;

use crate::iptables::FilterOp;

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a failed kernel or tooling call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The resource is already present.
    AlreadyExists,
    /// The resource is absent (no such file, no such process, no such rule).
    NotFound,
    /// Anything else, carrying the errno or exit status.
    Other(i32),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyExists => f.write_str("already exists"),
            Self::NotFound => f.write_str("not found"),
            Self::Other(code) => write!(f, "code {code}"),
        }
    }
}

/// Errors that can occur while reconciling host network state.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Kernel returned an error code.
    #[error("kernel error: {message} (errno {errno})")]
    Kernel {
        /// The errno value from the kernel.
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// Kernel error with operation context.
    #[error("{operation}: {message} (errno {errno})")]
    KernelWithContext {
        /// The operation that failed.
        operation: String,
        /// The errno value from the kernel.
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// Message was truncated.
    #[error("message truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Expected message length.
        expected: usize,
        /// Actual bytes received.
        actual: usize,
    },

    /// Invalid message format.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Interface not found.
    #[error("interface not found: {name}")]
    InterfaceNotFound {
        /// The interface name that was not found.
        name: String,
    },

    /// The packet filter tool exited with a failure status.
    #[error("iptables {operation} {table}/{chain} failed ({kind}): {message}")]
    Filter {
        /// The operation that failed.
        operation: FilterOp,
        /// Table the operation targeted.
        table: String,
        /// Chain the operation targeted.
        chain: String,
        /// Exit status of the tool (-1 if it could not be determined).
        status: i32,
        /// Classification of the status for this operation.
        kind: ErrorKind,
        /// Tool output.
        message: String,
    },

    /// The packet filter tool could not be located.
    #[error("iptables unavailable: {0}")]
    FilterUnavailable(String),

    /// Reading or writing a kernel parameter failed.
    #[error("sysctl {key}: {source}")]
    Sysctl {
        /// Dotted sysctl key.
        key: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The node has neither `spec.podCIDR` nor `spec.podCIDRs`.
    #[error("node {node} has no pod CIDR")]
    MissingPodCidr {
        /// Node name.
        node: String,
    },

    /// The pod CIDR could not be parsed or has no usable gateway address.
    #[error("node {node} has invalid pod CIDR {cidr:?}: {reason}")]
    InvalidPodCidr {
        /// Node name.
        node: String,
        /// The offending value.
        cidr: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The node reports no usable address of type `InternalIP`.
    #[error("node {node} has no internal IP")]
    MissingInternalIp {
        /// Node name.
        node: String,
    },

    /// A node address could not be parsed.
    #[error("node {node} reports invalid address {address:?}")]
    InvalidAddress {
        /// Node name.
        node: String,
        /// The offending value.
        address: String,
    },

    /// A network prefix could not be built.
    #[error("invalid network: {0}")]
    Network(#[from] ipnetwork::IpNetworkError),

    /// Kubernetes API error.
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

impl Error {
    /// Create a kernel error from an errno value.
    pub fn from_errno(errno: i32) -> Self {
        let message = io::Error::from_raw_os_error(-errno).to_string();
        Self::Kernel {
            errno: -errno,
            message,
        }
    }

    /// Add context to this error.
    ///
    /// Wraps kernel errors with operation context. Other errors are returned unchanged.
    pub fn with_context(self, operation: impl Into<String>) -> Self {
        match self {
            Self::Kernel { errno, message } => Self::KernelWithContext {
                operation: operation.into(),
                errno,
                message,
            },
            other => other,
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Kernel { errno, .. } | Self::KernelWithContext { errno, .. } => match *errno {
                libc::EEXIST => ErrorKind::AlreadyExists,
                libc::ENOENT | libc::ESRCH => ErrorKind::NotFound,
                other => ErrorKind::Other(other),
            },
            Self::Filter { kind, .. } => *kind,
            Self::InterfaceNotFound { .. } => ErrorKind::NotFound,
            Self::Io(e) | Self::Sysctl { source: e, .. } => match e.kind() {
                io::ErrorKind::NotFound => ErrorKind::NotFound,
                io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists,
                _ => ErrorKind::Other(e.raw_os_error().unwrap_or(-1)),
            },
            _ => ErrorKind::Other(-1),
        }
    }

    /// Check if this is an "already exists" error (EEXIST, chain exists).
    pub fn is_already_exists(&self) -> bool {
        self.kind() == ErrorKind::AlreadyExists
    }

    /// Check if this is a "not found" error (ENOENT, ESRCH, missing chain or rule).
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Get the errno value if this is a kernel error.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Kernel { errno, .. } | Self::KernelWithContext { errno, .. } => Some(*errno),
            _ => None,
        }
    }
}
