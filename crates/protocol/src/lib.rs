use serde::{Deserialize, Serialize};
use std::fmt;

pub mod config;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandStage {
    pub argv: Vec<String>,
}

impl CommandStage {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for CommandStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.argv.join(" "))
    }
}

/// A single argv or a pipeline of argvs. Arguments are never passed
/// through a shell.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum CommandSpec {
    Single(CommandStage),
    Pipeline(Vec<CommandStage>),
}

impl CommandSpec {
    pub fn single<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Single(CommandStage::new(argv))
    }

    pub fn pipeline<I>(stages: I) -> Self
    where
        I: IntoIterator<Item = CommandStage>,
    {
        Self::Pipeline(stages.into_iter().collect())
    }

    pub fn stages(&self) -> &[CommandStage] {
        match self {
            Self::Single(stage) => std::slice::from_ref(stage),
            Self::Pipeline(stages) => stages,
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(stage) => write!(f, "{stage}"),
            Self::Pipeline(stages) => {
                let rendered: Vec<String> = stages.iter().map(ToString::to_string).collect();
                f.write_str(&rendered.join(" | "))
            }
        }
    }
}

/// One `(hardware address, IPv4 address)` pair as handed over by the
/// device description. Values are kept verbatim; normalization happens
/// in the provisioner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddressAssignment {
    pub hardware_address: String,
    pub ip_address: String,
}

impl AddressAssignment {
    pub fn new(hardware_address: impl Into<String>, ip_address: impl Into<String>) -> Self {
        Self {
            hardware_address: hardware_address.into(),
            ip_address: ip_address.into(),
        }
    }
}
