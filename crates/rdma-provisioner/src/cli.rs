use clap::Parser;
use protocol::AddressAssignment;
use rdma_provisioner::shared_config::DEFAULT_SHARED_CONFIG_PATH;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "rdma-provisioner",
    version,
    about = "Assign IPv4 addresses to RDMA (IPoIB) interfaces"
)]
pub(crate) struct Args {
    /// SharedConfig document carrying the RDMA assignment.
    #[arg(long)]
    pub(crate) shared_config: Option<PathBuf>,
    /// Optional TOML config file.
    #[arg(long)]
    pub(crate) config: Option<PathBuf>,
    /// Explicit assignment `MAC=IPv4`; skips the SharedConfig document.
    #[arg(long = "assign", value_name = "MAC=IP", value_parser = parse_assignment)]
    pub(crate) assignments: Vec<AddressAssignment>,
    #[arg(long)]
    pub(crate) sysfs_root: Option<PathBuf>,
    #[arg(long)]
    pub(crate) interface_prefix: Option<String>,
    /// Per-command timeout for `ip`, e.g. `30s`.
    #[arg(long, value_parser = humantime::parse_duration)]
    pub(crate) command_timeout: Option<Duration>,
    /// Directory for the daily-rolling JSON log.
    #[arg(long)]
    pub(crate) log_dir: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    pub(crate) log_to_stderr: bool,
    /// Print a JSON summary on stdout.
    #[arg(long, default_value_t = false)]
    pub(crate) json: bool,
}

impl Args {
    pub(crate) fn default_shared_config() -> PathBuf {
        PathBuf::from(DEFAULT_SHARED_CONFIG_PATH)
    }
}

fn parse_assignment(raw: &str) -> Result<AddressAssignment, String> {
    let (hardware_address, ip_address) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected MAC=IP, got `{raw}`"))?;
    let (hardware_address, ip_address) = (hardware_address.trim(), ip_address.trim());
    if hardware_address.is_empty() || ip_address.is_empty() {
        return Err(format!("expected MAC=IP, got `{raw}`"));
    }
    Ok(AddressAssignment::new(hardware_address, ip_address))
}
