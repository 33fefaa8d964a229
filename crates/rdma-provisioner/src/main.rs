mod cli;
mod config;
mod logging;

use crate::cli::Args;
use crate::config::{load_config, Settings};
use crate::logging::init_tracing;
use anyhow::Context;
use clap::Parser;
use protocol::config::ProvisionerConfig;
use protocol::AddressAssignment;
use rdma_provisioner::{extract_assignment, Provisioner, SysfsInterfaces};
use serde::Serialize;
use std::process::ExitCode;
use std::sync::Arc;
use system_utils::{terminate_pid, CommandRunner, ProcessRegistry};

#[derive(Debug, Serialize)]
struct Summary {
    configured: usize,
    requested: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    let _log_guard = init_tracing(args.log_dir.as_deref(), args.log_to_stderr)?;

    let file_config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProvisionerConfig::default(),
    };
    let settings = Settings::resolve(&args, file_config).context("invalid configuration")?;
    let assignments = requested_assignments(&args, &settings)?;

    let registry = Arc::new(ProcessRegistry::new());
    let provisioner = Provisioner::new(
        Arc::new(CommandRunner::new(Arc::clone(&registry))),
        Arc::new(SysfsInterfaces::new(&settings.sysfs_root)),
        settings.policy.clone(),
    );

    let provision = provisioner.provision(&assignments);
    tokio::pin!(provision);
    let configured = tokio::select! {
        configured = &mut provision => configured,
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            tracing::warn!("interrupted, terminating tracked processes");
            terminate_tracked(&registry);
            return Ok(ExitCode::FAILURE);
        }
    };

    let summary = Summary {
        configured,
        requested: assignments.len(),
    };
    tracing::info!(
        configured = summary.configured,
        requested = summary.requested,
        "RDMA provisioning finished"
    );
    if args.json {
        println!("{}", serde_json::to_string(&summary)?);
    }

    if summary.configured >= summary.requested {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn requested_assignments(
    args: &Args,
    settings: &Settings,
) -> anyhow::Result<Vec<AddressAssignment>> {
    if !args.assignments.is_empty() {
        return Ok(args.assignments.clone());
    }
    let path = &settings.shared_config;
    tracing::debug!(path = %path.display(), "parsing SharedConfig for RDMA details");
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read SharedConfig {}", path.display()))?;
    let assignment = extract_assignment(&raw)
        .with_context(|| format!("failed to extract RDMA details from {}", path.display()))?;
    tracing::info!(
        hardware_address = %assignment.hardware_address,
        address = %assignment.ip_address,
        "found RDMA details"
    );
    Ok(vec![assignment])
}

fn terminate_tracked(registry: &ProcessRegistry) {
    for pid in registry.snapshot() {
        match terminate_pid(pid) {
            Ok(()) => tracing::info!(pid, "sent SIGTERM"),
            Err(err) => tracing::warn!(pid, error = %err, "failed to terminate process"),
        }
    }
}
