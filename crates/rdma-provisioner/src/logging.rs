use std::io;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. Without a log directory everything goes
/// to stderr; with one, stderr output is opt-in. The returned guard must
/// live until exit so buffered file lines are flushed.
pub(crate) fn init_tracing(
    log_dir: Option<&Path>,
    log_to_stderr: bool,
) -> anyhow::Result<Option<WorkerGuard>> {
    let (file_layer, file_guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = tracing_appender::rolling::daily(dir, "rdma-provisioner.log");
            let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_target(false)
                .json();
            (Some(layer), Some(file_guard))
        }
        None => (None, None),
    };

    let stderr_layer = (log_to_stderr || log_dir.is_none()).then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .with_target(false)
    });

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();

    Ok(file_guard)
}
