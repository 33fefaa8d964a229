use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use protocol::{AddressAssignment, CommandSpec};
use system_utils::{CommandError, CommandExecutor, RunOptions};
use tracing::{debug, error, info};

use crate::address::HardwareAddress;
use crate::interfaces::{matches_family, InterfaceSource, NetworkInterface};

/// Exit status iproute2 reports when the requested state already holds
/// (`RTNETLINK answers: File exists`). This is specific to Linux `ip` and
/// is the only status treated as success on failure.
pub const EXIT_ALREADY_EXISTS: i32 = 2;

pub const DEFAULT_NAME_PREFIX: &str = "ib";
pub const DEFAULT_PREFIX_LEN: u8 = 16;
pub const DEFAULT_IP_PROGRAM: &str = "ip";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionPolicy {
    pub name_prefix: String,
    pub prefix_len: u8,
    pub ip_program: String,
    pub command_timeout: Option<Duration>,
}

impl Default for ProvisionPolicy {
    fn default() -> Self {
        Self {
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            prefix_len: DEFAULT_PREFIX_LEN,
            ip_program: DEFAULT_IP_PROGRAM.to_string(),
            command_timeout: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    hardware_address: HardwareAddress,
    ip_address: Ipv4Addr,
}

enum Outcome {
    Configured,
    AlreadyAssigned,
    Failed(CommandError),
}

pub struct Provisioner {
    executor: Arc<dyn CommandExecutor>,
    interfaces: Arc<dyn InterfaceSource>,
    policy: ProvisionPolicy,
}

impl Provisioner {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        interfaces: Arc<dyn InterfaceSource>,
        policy: ProvisionPolicy,
    ) -> Self {
        Self {
            executor,
            interfaces,
            policy,
        }
    }

    /// Brings up every family interface whose hardware address matches an
    /// assignment and gives it the assigned address. Returns how many
    /// interfaces ended up configured; per-interface problems are logged.
    pub async fn provision(&self, assignments: &[AddressAssignment]) -> usize {
        let targets: Vec<Target> = assignments.iter().filter_map(normalize_assignment).collect();

        let names = match self.interfaces.list() {
            Ok(names) => names,
            Err(err) => {
                error!(error = %err, "RDMA: can't list network interfaces");
                return 0;
            }
        };

        let mut configured = 0;
        for name in names
            .iter()
            .filter(|name| matches_family(name, &self.policy.name_prefix))
        {
            let Some(interface) = self.read_interface(name) else {
                continue;
            };
            let Some(target) = targets
                .iter()
                .find(|target| target.hardware_address == interface.hardware_address)
            else {
                debug!(
                    interface = %interface.name,
                    hardware_address = %interface.hardware_address.colon_separated(),
                    "no assignment for interface"
                );
                continue;
            };
            if self.configure(&interface, target.ip_address).await {
                configured += 1;
            }
        }
        configured
    }

    fn read_interface(&self, name: &str) -> Option<NetworkInterface> {
        let raw = match self.interfaces.hardware_address(name) {
            Ok(raw) if !raw.trim().is_empty() => raw,
            Ok(_) => {
                error!(interface = %name, "RDMA: can't read address for device");
                return None;
            }
            Err(err) => {
                error!(interface = %name, error = %err, "RDMA: can't read address for device");
                return None;
            }
        };
        match HardwareAddress::from_interface(&raw) {
            Ok(hardware_address) => Some(NetworkInterface {
                name: name.to_string(),
                hardware_address,
            }),
            Err(err) => {
                error!(
                    interface = %name,
                    address = %raw.trim_end(),
                    error = %err,
                    "RDMA: failed to parse address for device"
                );
                None
            }
        }
    }

    async fn configure(&self, interface: &NetworkInterface, ip_address: Ipv4Addr) -> bool {
        match self.bring_up(&interface.name, ip_address).await {
            Outcome::Configured => {
                info!(
                    interface = %interface.name,
                    address = %ip_address,
                    "RDMA: set address on device"
                );
                true
            }
            Outcome::AlreadyAssigned => {
                info!(
                    interface = %interface.name,
                    address = %ip_address,
                    "RDMA: address already set on device"
                );
                true
            }
            Outcome::Failed(err) => {
                error!(
                    interface = %interface.name,
                    hardware_address = %interface.hardware_address.colon_separated(),
                    address = %ip_address,
                    exit_code = ?err.exit_code(),
                    error = %err,
                    "RDMA: failed to set IP address on device"
                );
                false
            }
        }
    }

    async fn bring_up(&self, name: &str, ip_address: Ipv4Addr) -> Outcome {
        let program = self.policy.ip_program.as_str();
        let link_up = CommandSpec::single([program, "link", "set", name, "up"]);
        let cidr = format!("{ip_address}/{}", self.policy.prefix_len);
        let assign = CommandSpec::single([program, "addr", "add", cidr.as_str(), "dev", name]);

        for spec in [&link_up, &assign] {
            debug!(command = %spec, "running");
            if let Err(err) = self.executor.run(spec, self.run_options()).await {
                return classify(err);
            }
        }
        Outcome::Configured
    }

    fn run_options(&self) -> RunOptions {
        RunOptions::default()
            .log_error(false)
            .timeout(self.policy.command_timeout)
    }
}

fn classify(err: CommandError) -> Outcome {
    match err.failure() {
        Some(failure) if failure.exit_code == EXIT_ALREADY_EXISTS => Outcome::AlreadyAssigned,
        _ => Outcome::Failed(err),
    }
}

fn normalize_assignment(assignment: &AddressAssignment) -> Option<Target> {
    let hardware_address = match HardwareAddress::from_assignment(&assignment.hardware_address) {
        Ok(address) => address,
        Err(err) => {
            error!(error = %err, "RDMA: ignoring assignment with invalid hardware address");
            return None;
        }
    };
    let ip_address = match assignment.ip_address.trim().parse::<Ipv4Addr>() {
        Ok(address) => address,
        Err(err) => {
            error!(
                hardware_address = %hardware_address.colon_separated(),
                address = %assignment.ip_address,
                error = %err,
                "RDMA: ignoring assignment with invalid IPv4 address"
            );
            return None;
        }
    };
    Some(Target {
        hardware_address,
        ip_address,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::io;
    use std::sync::Mutex;
    use system_utils::{Captured, CommandFailure, CommandResult, CommandRunner, ProcessRegistry};

    const IB0_ADDRESS: &str = "80:00:02:08:fe:80:00:00:00:00:00:00:00:15:5d:ff:fe:33:ff:1d\n";
    const IB1_ADDRESS: &str = "80:00:02:08:fe:80:00:00:00:00:00:00:00:15:5d:ff:fe:33:ff:2e\n";

    struct FakeInterfaces {
        addresses: BTreeMap<String, io::Result<String>>,
    }

    impl FakeInterfaces {
        fn new(entries: &[(&str, &str)]) -> Self {
            Self {
                addresses: entries
                    .iter()
                    .map(|(name, address)| (name.to_string(), Ok(address.to_string())))
                    .collect(),
            }
        }

        fn with_unreadable(mut self, name: &str) -> Self {
            self.addresses.insert(
                name.to_string(),
                Err(io::Error::new(io::ErrorKind::NotFound, "no address file")),
            );
            self
        }
    }

    impl InterfaceSource for FakeInterfaces {
        fn list(&self) -> io::Result<Vec<String>> {
            Ok(self.addresses.keys().cloned().collect())
        }

        fn hardware_address(&self, name: &str) -> io::Result<String> {
            match self.addresses.get(name) {
                Some(Ok(address)) => Ok(address.clone()),
                Some(Err(err)) => Err(io::Error::new(err.kind(), err.to_string())),
                None => Err(io::Error::from(io::ErrorKind::NotFound)),
            }
        }
    }

    /// Records every command and answers `ip link` / `ip addr` with
    /// scripted exit statuses.
    #[derive(Default)]
    struct ScriptedExecutor {
        link_status: i32,
        addr_status: i32,
        spawn_fails: bool,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedExecutor {
        fn with_addr_status(status: i32) -> Self {
            Self {
                addr_status: status,
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    #[async_trait]
    impl CommandExecutor for ScriptedExecutor {
        async fn run(
            &self,
            spec: &CommandSpec,
            options: RunOptions,
        ) -> Result<CommandResult, CommandError> {
            assert!(!options.log_error);
            let command = spec.to_string();
            self.calls.lock().expect("calls lock").push(command.clone());
            if self.spawn_fails {
                return Err(CommandError::Spawn {
                    command,
                    source: io::Error::from_raw_os_error(EXIT_ALREADY_EXISTS),
                });
            }
            let status = match spec.stages()[0].argv.get(1).map(String::as_str) {
                Some("link") => self.link_status,
                Some("addr") => self.addr_status,
                other => panic!("unexpected ip subcommand {other:?}"),
            };
            if status == 0 {
                return Ok(CommandResult {
                    exit_code: 0,
                    stdout: Captured::empty(true),
                    stderr: Captured::empty(true),
                });
            }
            Err(CommandError::NonZeroExit(CommandFailure::new(
                command,
                status,
                Captured::empty(true),
                Captured::Text("RTNETLINK answers: File exists\n".to_string()),
            )))
        }
    }

    fn provisioner(executor: &Arc<ScriptedExecutor>, interfaces: FakeInterfaces) -> Provisioner {
        Provisioner::new(
            Arc::clone(executor) as Arc<dyn CommandExecutor>,
            Arc::new(interfaces),
            ProvisionPolicy::default(),
        )
    }

    fn single_assignment() -> Vec<AddressAssignment> {
        vec![AddressAssignment::new("00155D33FF1D", "10.0.0.4")]
    }

    #[tokio::test]
    async fn configures_matching_interface() {
        let executor = Arc::new(ScriptedExecutor::default());
        let provisioner = provisioner(&executor, FakeInterfaces::new(&[("ib0", IB0_ADDRESS)]));

        assert_eq!(provisioner.provision(&single_assignment()).await, 1);
        assert_eq!(
            executor.calls(),
            vec!["ip link set ib0 up", "ip addr add 10.0.0.4/16 dev ib0"]
        );
    }

    #[tokio::test]
    async fn already_assigned_address_counts_as_configured() {
        let executor = Arc::new(ScriptedExecutor::with_addr_status(EXIT_ALREADY_EXISTS));
        let provisioner = provisioner(&executor, FakeInterfaces::new(&[("ib0", IB0_ADDRESS)]));

        assert_eq!(provisioner.provision(&single_assignment()).await, 1);
        assert_eq!(executor.calls().len(), 2);
    }

    #[tokio::test]
    async fn other_failures_are_not_counted() {
        for status in [1, 3, 4, 127, 255, -15] {
            let executor = Arc::new(ScriptedExecutor::with_addr_status(status));
            let provisioner = provisioner(&executor, FakeInterfaces::new(&[("ib0", IB0_ADDRESS)]));
            assert_eq!(
                provisioner.provision(&single_assignment()).await,
                0,
                "status {status}"
            );
        }
    }

    #[tokio::test]
    async fn link_failure_skips_address_step() {
        let executor = Arc::new(ScriptedExecutor {
            link_status: 1,
            ..ScriptedExecutor::default()
        });
        let provisioner = provisioner(&executor, FakeInterfaces::new(&[("ib0", IB0_ADDRESS)]));

        assert_eq!(provisioner.provision(&single_assignment()).await, 0);
        assert_eq!(executor.calls(), vec!["ip link set ib0 up"]);
    }

    #[tokio::test]
    async fn spawn_failure_is_never_benign() {
        let executor = Arc::new(ScriptedExecutor {
            spawn_fails: true,
            ..ScriptedExecutor::default()
        });
        let provisioner = provisioner(&executor, FakeInterfaces::new(&[("ib0", IB0_ADDRESS)]));

        assert_eq!(provisioner.provision(&single_assignment()).await, 0);
    }

    #[tokio::test]
    async fn no_match_runs_nothing() {
        let executor = Arc::new(ScriptedExecutor::default());
        let provisioner = provisioner(
            &executor,
            FakeInterfaces::new(&[("ib0", IB1_ADDRESS), ("eth0", IB0_ADDRESS)]),
        );

        assert_eq!(provisioner.provision(&single_assignment()).await, 0);
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn skips_unreadable_and_malformed_interfaces() {
        let executor = Arc::new(ScriptedExecutor::default());
        let interfaces = FakeInterfaces::new(&[
            ("ib0", "garbage\n"),
            ("ib1", ""),
            ("ib3", IB0_ADDRESS),
        ])
        .with_unreadable("ib2");
        let provisioner = provisioner(&executor, interfaces);

        assert_eq!(provisioner.provision(&single_assignment()).await, 1);
        assert_eq!(
            executor.calls(),
            vec!["ip link set ib3 up", "ip addr add 10.0.0.4/16 dev ib3"]
        );
    }

    #[tokio::test]
    async fn matches_assignment_in_any_layout() {
        let executor = Arc::new(ScriptedExecutor::default());
        let provisioner = provisioner(&executor, FakeInterfaces::new(&[("ib0", IB0_ADDRESS)]));
        let assignments = vec![AddressAssignment::new("00:15:5d:33:ff:1d", " 10.0.0.4 ")];

        assert_eq!(provisioner.provision(&assignments).await, 1);
    }

    #[tokio::test]
    async fn invalid_assignments_are_ignored() {
        let executor = Arc::new(ScriptedExecutor::default());
        let provisioner = provisioner(&executor, FakeInterfaces::new(&[("ib0", IB0_ADDRESS)]));
        let assignments = vec![
            AddressAssignment::new("00155D33FF1D", "10.0.0.300"),
            AddressAssignment::new("not-a-mac", "10.0.0.5"),
        ];

        assert_eq!(provisioner.provision(&assignments).await, 0);
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn configures_each_interface_with_its_own_address() {
        let executor = Arc::new(ScriptedExecutor::default());
        let provisioner = provisioner(
            &executor,
            FakeInterfaces::new(&[("ib0", IB0_ADDRESS), ("ib1", IB1_ADDRESS)]),
        );
        let assignments = vec![
            AddressAssignment::new("00155D33FF2E", "10.0.1.9"),
            AddressAssignment::new("00155D33FF1D", "10.0.0.4"),
        ];

        assert_eq!(provisioner.provision(&assignments).await, 2);
        assert_eq!(
            executor.calls(),
            vec![
                "ip link set ib0 up",
                "ip addr add 10.0.0.4/16 dev ib0",
                "ip link set ib1 up",
                "ip addr add 10.0.1.9/16 dev ib1",
            ]
        );
    }

    #[tokio::test]
    async fn honours_policy_prefix_and_program() {
        let executor = Arc::new(ScriptedExecutor::default());
        let provisioner = Provisioner::new(
            Arc::clone(&executor) as Arc<dyn CommandExecutor>,
            Arc::new(FakeInterfaces::new(&[("ib0", IB0_ADDRESS), ("rdma0", IB0_ADDRESS)])),
            ProvisionPolicy {
                name_prefix: "rdma".to_string(),
                prefix_len: 24,
                ip_program: "/sbin/ip".to_string(),
                command_timeout: Some(Duration::from_secs(5)),
            },
        );

        assert_eq!(provisioner.provision(&single_assignment()).await, 1);
        assert_eq!(
            executor.calls(),
            vec!["/sbin/ip link set rdma0 up", "/sbin/ip addr add 10.0.0.4/24 dev rdma0"]
        );
    }

    #[tokio::test]
    async fn reads_interfaces_from_sysfs_layout() {
        let dir = tempfile::tempdir().expect("temp dir");
        for (name, address) in [("ib0", IB0_ADDRESS), ("lo", "00:00:00:00:00:00\n")] {
            let path = dir.path().join(name);
            std::fs::create_dir_all(&path).expect("interface dir");
            std::fs::write(path.join("address"), address).expect("address file");
        }
        let executor = Arc::new(ScriptedExecutor::default());
        let provisioner = Provisioner::new(
            Arc::clone(&executor) as Arc<dyn CommandExecutor>,
            Arc::new(crate::interfaces::SysfsInterfaces::new(dir.path())),
            ProvisionPolicy::default(),
        );

        assert_eq!(provisioner.provision(&single_assignment()).await, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn drives_real_processes_through_runner() {
        let registry = Arc::new(ProcessRegistry::new());
        let runner: Arc<dyn CommandExecutor> = Arc::new(CommandRunner::new(Arc::clone(&registry)));
        let interfaces = Arc::new(FakeInterfaces::new(&[("ib0", IB0_ADDRESS)]));

        let succeeding = Provisioner::new(
            Arc::clone(&runner),
            interfaces.clone(),
            ProvisionPolicy {
                ip_program: "true".to_string(),
                ..ProvisionPolicy::default()
            },
        );
        assert_eq!(succeeding.provision(&single_assignment()).await, 1);

        let failing = Provisioner::new(
            runner,
            interfaces,
            ProvisionPolicy {
                ip_program: "false".to_string(),
                ..ProvisionPolicy::default()
            },
        );
        assert_eq!(failing.provision(&single_assignment()).await, 0);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn listing_failure_configures_nothing() {
        struct Unlistable;
        impl InterfaceSource for Unlistable {
            fn list(&self) -> io::Result<Vec<String>> {
                Err(io::Error::from(io::ErrorKind::PermissionDenied))
            }
            fn hardware_address(&self, _name: &str) -> io::Result<String> {
                unreachable!("nothing listed")
            }
        }

        let executor = Arc::new(ScriptedExecutor::default());
        let provisioner = Provisioner::new(
            Arc::clone(&executor) as Arc<dyn CommandExecutor>,
            Arc::new(Unlistable),
            ProvisionPolicy::default(),
        );
        assert_eq!(provisioner.provision(&single_assignment()).await, 0);
        assert!(executor.calls().is_empty());
    }
}
