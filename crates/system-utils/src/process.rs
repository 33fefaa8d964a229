use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;

const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Exit status as an integer. A child killed by a signal reports the
/// negated signal number.
pub(crate) fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}

#[cfg(unix)]
fn signal_child(child: &Child, signal: i32) {
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as libc::pid_t, signal);
        }
    }
}

#[cfg(not(unix))]
fn signal_child(_child: &Child, _signal: i32) {}

/// SIGTERM every child, give them a grace period, then SIGKILL the rest.
pub(crate) async fn terminate_children(children: &mut [Child]) {
    for child in children.iter() {
        signal_child(child, libc::SIGTERM);
    }
    for child in children.iter_mut() {
        if tokio::time::timeout(TERMINATE_GRACE, child.wait())
            .await
            .is_ok()
        {
            continue;
        }
        let _ = child.kill().await;
        let _ = child.wait().await;
    }
}

/// Sends SIGTERM to an arbitrary pid, e.g. one taken from a registry snapshot.
#[cfg(unix)]
pub fn terminate_pid(pid: u32) -> std::io::Result<()> {
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn terminate_pid(_pid: u32) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "signals are not supported on this platform",
    ))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;

    #[test]
    fn exit_code_passes_through_normal_status() {
        assert_eq!(exit_code_of(ExitStatus::from_raw(3 << 8)), 3);
        assert_eq!(exit_code_of(ExitStatus::from_raw(0)), 0);
    }

    #[test]
    fn exit_code_negates_signal() {
        assert_eq!(exit_code_of(ExitStatus::from_raw(libc::SIGTERM)), -libc::SIGTERM);
    }
}
