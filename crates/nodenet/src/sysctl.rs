//! Kernel parameters through procfs.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::host::Sysctl;

/// Sysctl access rooted at `/proc/sys`.
#[derive(Debug, Clone)]
pub struct ProcSysctl {
    root: PathBuf,
}

impl Default for ProcSysctl {
    fn default() -> Self {
        Self::with_root("/proc/sys")
    }
}

impl ProcSysctl {
    /// Use a different root directory, e.g. a bind-mounted `/proc/sys`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file backing a dotted key.
    ///
    /// `net.ipv4.conf.eth0.rp_filter` maps to `net/ipv4/conf/eth0/rp_filter`.
    pub fn path_of(&self, key: &str) -> PathBuf {
        self.root.join(key.replace('.', "/"))
    }

    /// Read the current value of `key`.
    pub fn get(&self, key: &str) -> Result<String> {
        fs::read_to_string(self.path_of(key))
            .map(|v| v.trim().to_string())
            .map_err(|source| Error::Sysctl {
                key: key.to_string(),
                source,
            })
    }
}

impl Sysctl for ProcSysctl {
    fn set(&self, key: &str, value: &str) -> Result<String> {
        let previous = self.get(key)?;
        if previous != value {
            debug!(key, %previous, value, "writing sysctl");
            fs::write(self.path_of(key), value).map_err(|source| Error::Sysctl {
                key: key.to_string(),
                source,
            })?;
        }
        Ok(previous)
    }
}
