use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// Bytes 1-3 and 6-8 of the trailing eight pairs of an IPoIB address,
/// i.e. the EUI-64 port GUID with its inserted `FF:FE` pair dropped.
const INTERFACE_ADDRESS_PATTERN: &str = concat!(
    r"^.+([0-9A-F]{2}):([0-9A-F]{2}):([0-9A-F]{2}):",
    r"[0-9A-F]{2}:[0-9A-F]{2}:",
    r"([0-9A-F]{2}):([0-9A-F]{2}):([0-9A-F]{2})\n?$",
);

const SEPARATORS: [char; 3] = [':', '-', '.'];

fn interface_address_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(INTERFACE_ADDRESS_PATTERN).expect("address pattern compiles"))
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("hardware address is empty")]
    Empty,
    #[error("unrecognized interface address {0:?}")]
    Unparsable(String),
    #[error("invalid hardware address {0:?}")]
    Invalid(String),
}

/// A 48-bit hardware address in canonical form: twelve uppercase hex
/// digits, no separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HardwareAddress(String);

impl HardwareAddress {
    /// Parses the raw `address` value a network interface exposes, trailing
    /// newline included.
    pub fn from_interface(raw: &str) -> Result<Self, AddressError> {
        if raw.trim().is_empty() {
            return Err(AddressError::Empty);
        }
        let upper = raw.to_uppercase();
        let captures = interface_address_regex()
            .captures(&upper)
            .ok_or_else(|| AddressError::Unparsable(raw.to_string()))?;
        let canonical: String = captures
            .iter()
            .skip(1)
            .flatten()
            .map(|group| group.as_str())
            .collect();
        Ok(Self(canonical))
    }

    /// Parses an externally supplied address in any of the usual layouts
    /// (`00155D33FF1D`, `00:15:5d:33:ff:1d`, `0015.5d33.ff1d`, ...).
    pub fn from_assignment(raw: &str) -> Result<Self, AddressError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AddressError::Empty);
        }
        let canonical: String = trimmed
            .chars()
            .filter(|ch| !SEPARATORS.contains(ch))
            .map(|ch| ch.to_ascii_uppercase())
            .collect();
        if canonical.len() != 12 || !canonical.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(AddressError::Invalid(raw.to_string()));
        }
        Ok(Self(canonical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `00:15:5D:33:FF:1D` form, for diagnostics.
    pub fn colon_separated(&self) -> String {
        let pairs: Vec<&str> = (0..self.0.len())
            .step_by(2)
            .map(|start| &self.0[start..start + 2])
            .collect();
        pairs.join(":")
    }
}

impl fmt::Display for HardwareAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for HardwareAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_assignment(s)
    }
}
