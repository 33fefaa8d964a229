use crate::cli::Args;
use anyhow::Context;
use protocol::config::ProvisionerConfig;
use rdma_provisioner::interfaces::DEFAULT_SYSFS_ROOT;
use rdma_provisioner::ProvisionPolicy;
use std::path::{Path, PathBuf};
use std::time::Duration;

const MAX_IPV4_PREFIX_LEN: u8 = 32;

pub(crate) fn load_config(path: &Path) -> anyhow::Result<ProvisionerConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: ProvisionerConfig = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    Ok(config)
}

/// Effective settings: flags, then the config file, then built-in defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Settings {
    pub(crate) shared_config: PathBuf,
    pub(crate) sysfs_root: PathBuf,
    pub(crate) policy: ProvisionPolicy,
}

impl Settings {
    pub(crate) fn resolve(args: &Args, config: ProvisionerConfig) -> anyhow::Result<Self> {
        let defaults = ProvisionPolicy::default();
        let prefix_len = config.interfaces.prefix_len.unwrap_or(defaults.prefix_len);
        if prefix_len > MAX_IPV4_PREFIX_LEN {
            anyhow::bail!("prefix_len must be at most {MAX_IPV4_PREFIX_LEN}, got {prefix_len}");
        }

        let name_prefix = args
            .interface_prefix
            .clone()
            .or(config.interfaces.name_prefix)
            .unwrap_or(defaults.name_prefix);
        if name_prefix.is_empty() {
            anyhow::bail!("interface name prefix must not be empty");
        }

        let command_timeout = args
            .command_timeout
            .or(config.runner.timeout_secs.map(Duration::from_secs));

        Ok(Self {
            shared_config: args
                .shared_config
                .clone()
                .or(config.shared_config)
                .unwrap_or_else(Args::default_shared_config),
            sysfs_root: args
                .sysfs_root
                .clone()
                .or(config.interfaces.sysfs_root)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SYSFS_ROOT)),
            policy: ProvisionPolicy {
                name_prefix,
                prefix_len,
                ip_program: config.runner.ip_program.unwrap_or(defaults.ip_program),
                command_timeout,
            },
        })
    }
}
