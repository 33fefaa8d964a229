use std::fs;
use std::io;
use std::path::PathBuf;

use crate::address::HardwareAddress;

pub const DEFAULT_SYSFS_ROOT: &str = "/sys/class/net";

/// A local network interface whose hardware address has been normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterface {
    pub name: String,
    pub hardware_address: HardwareAddress,
}

/// Read-only view of the host's network interfaces.
pub trait InterfaceSource: Send + Sync {
    /// Interface names in sorted order.
    fn list(&self) -> io::Result<Vec<String>>;

    /// Raw hardware address text exactly as the system exposes it.
    fn hardware_address(&self, name: &str) -> io::Result<String>;
}

/// Interfaces under a sysfs `class/net` directory.
#[derive(Debug, Clone)]
pub struct SysfsInterfaces {
    root: PathBuf,
}

impl SysfsInterfaces {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for SysfsInterfaces {
    fn default() -> Self {
        Self::new(DEFAULT_SYSFS_ROOT)
    }
}

impl InterfaceSource for SysfsInterfaces {
    fn list(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => tracing::debug!(name = ?raw, "skipping non-UTF-8 interface name"),
            }
        }
        names.sort();
        Ok(names)
    }

    fn hardware_address(&self, name: &str) -> io::Result<String> {
        fs::read_to_string(self.root.join(name).join("address"))
    }
}

/// True when `name` is the family prefix followed by a word character
/// (`ib0`, `ibp3s0`, `ib_rdma`), so `ib` alone or `ib-x` do not match.
pub fn matches_family(name: &str, prefix: &str) -> bool {
    name.strip_prefix(prefix)
        .and_then(|rest| rest.chars().next())
        .is_some_and(|ch| ch.is_alphanumeric() || ch == '_')
}
