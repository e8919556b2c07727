//! Common test utilities for integration tests.
//!
//! Provides `TestNamespace` for isolated network namespace testing
//! and helper macros for conditional test execution.

use std::fs::File;
use std::os::fd::AsRawFd;
use std::process::Command;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;

use nodenet::{Error, Result};

/// Global counter for unique namespace names.
static NAMESPACE_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Where `ip netns add` pins named namespaces.
const NETNS_RUN_DIR: &str = "/var/run/netns";

/// Generate a unique namespace name for this test.
fn unique_ns_name(prefix: &str) -> String {
    let id = NAMESPACE_COUNTER.fetch_add(1, Ordering::SeqCst);
    let pid = std::process::id();
    format!("nodenet-test-{prefix}-{pid}-{id}")
}

/// A test network namespace with automatic cleanup.
///
/// Everything the library touches (rtnetlink sockets, `/proc/sys/net`,
/// the `iptables` child process) follows the calling thread's namespace,
/// so [`TestNamespace::run`] executes a closure on a thread that has
/// entered this one.
///
/// # Example
///
/// ```ignore
/// let ns = TestNamespace::new("mytest")?;
/// ns.add_dummy("cbr0")?;
/// ns.run(|| {
///     let host = SystemHost::new()?;
///     RouteConfig::new(route).ensure(&host, true)
/// })?;
/// ```
pub struct TestNamespace {
    name: String,
}

impl TestNamespace {
    /// Create a new test namespace with a unique name.
    pub fn new(prefix: &str) -> Result<Self> {
        let name = unique_ns_name(prefix);

        let status = Command::new("ip").args(["netns", "add", &name]).status()?;
        if !status.success() {
            return Err(Error::InvalidMessage(format!(
                "failed to create namespace: {name}"
            )));
        }

        Ok(Self { name })
    }

    /// Get the namespace name.
    #[allow(dead_code)]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `f` on a fresh thread inside this namespace.
    pub fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send,
        T: Send,
    {
        let target = File::open(format!("{NETNS_RUN_DIR}/{}", self.name))?;
        thread::scope(|scope| {
            scope
                .spawn(move || {
                    // SAFETY: target is an open namespace file and CLONE_NEWNET
                    // only switches the network namespace of this thread.
                    let ret = unsafe { libc::setns(target.as_raw_fd(), libc::CLONE_NEWNET) };
                    if ret < 0 {
                        return Err(Error::Io(std::io::Error::last_os_error()));
                    }
                    f()
                })
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
        })
    }

    /// Run a command in the namespace and return its output.
    pub fn exec(&self, cmd: &str, args: &[&str]) -> Result<String> {
        let output = Command::new("ip")
            .args(["netns", "exec", &self.name, cmd])
            .args(args)
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::InvalidMessage(format!(
                "command failed: {cmd} {args:?}: {stderr}"
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Add a dummy interface in this namespace using ip command.
    pub fn add_dummy(&self, name: &str) -> Result<()> {
        self.exec("ip", &["link", "add", name, "type", "dummy"])?;
        Ok(())
    }

    /// Bring an interface up using ip command.
    pub fn link_up(&self, name: &str) -> Result<()> {
        self.exec("ip", &["link", "set", name, "up"])?;
        Ok(())
    }

    /// Add an IP address using ip command.
    pub fn add_addr(&self, dev: &str, addr: &str) -> Result<()> {
        self.exec("ip", &["addr", "add", addr, "dev", dev])?;
        Ok(())
    }

    /// Dummy `name` with `addr`, up.
    pub fn add_interface(&self, name: &str, addr: &str) -> Result<()> {
        self.add_dummy(name)?;
        self.add_addr(name, addr)?;
        self.link_up(name)
    }

    /// `ip -4 rule show` output.
    pub fn rules(&self) -> Result<String> {
        self.exec("ip", &["-4", "rule", "show"])
    }

    /// Number of `ip rule` lines containing `needle`.
    pub fn count_rules(&self, needle: &str) -> Result<usize> {
        Ok(self
            .rules()?
            .lines()
            .filter(|line| line.contains(needle))
            .count())
    }

    /// `ip -4 route show table <table>` output.
    pub fn routes(&self, table: u32) -> Result<String> {
        self.exec("ip", &["-4", "route", "show", "table", &table.to_string()])
    }

    /// `iptables -t <table> -S <chain>` output, or `None` if the chain is missing.
    pub fn chain(&self, table: &str, chain: &str) -> Option<String> {
        self.exec("iptables", &["-w", "-t", table, "-S", chain]).ok()
    }
}

impl Drop for TestNamespace {
    fn drop(&mut self) {
        let _ = Command::new("ip")
            .args(["netns", "del", &self.name])
            .status();
    }
}

/// Check if running as root.
pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Skip the test if not running as root.
///
/// Use this at the beginning of integration tests that require root privileges.
#[macro_export]
macro_rules! require_root {
    () => {
        if !crate::common::is_root() {
            eprintln!("Skipping test: requires root");
            return Ok(());
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_ns_name() {
        let name1 = unique_ns_name("test");
        let name2 = unique_ns_name("test");
        assert_ne!(name1, name2);
        assert!(name1.starts_with("nodenet-test-test-"));
    }
}
