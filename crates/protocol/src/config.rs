use serde::Deserialize;
use std::path::PathBuf;

/// On-disk provisioner configuration. Every field is optional; the binary
/// fills in defaults and lets command-line flags win.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvisionerConfig {
    pub shared_config: Option<PathBuf>,
    #[serde(default)]
    pub interfaces: InterfaceConfig,
    #[serde(default)]
    pub runner: RunnerDefaults,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InterfaceConfig {
    pub sysfs_root: Option<PathBuf>,
    pub name_prefix: Option<String>,
    pub prefix_len: Option<u8>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunnerDefaults {
    pub ip_program: Option<String>,
    pub timeout_secs: Option<u64>,
}
