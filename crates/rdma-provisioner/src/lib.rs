pub mod address;
pub mod interfaces;
pub mod provision;
pub mod shared_config;

pub use address::{AddressError, HardwareAddress};
pub use interfaces::{InterfaceSource, NetworkInterface, SysfsInterfaces};
pub use provision::{ProvisionPolicy, Provisioner, EXIT_ALREADY_EXISTS};
pub use shared_config::{extract_assignment, SharedConfigError};
