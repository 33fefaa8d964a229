//! Reads the RDMA assignment out of the hypervisor's SharedConfig document.

use protocol::AddressAssignment;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

pub const DEFAULT_SHARED_CONFIG_PATH: &str = "/var/lib/waagent/SharedConfig.xml";

const INSTANCE_ELEMENT: &[u8] = b"Instance";
pub const IPV4_ATTRIBUTE: &str = "rdmaIPv4Address";
pub const MAC_ATTRIBUTE: &str = "rdmaMacAddress";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SharedConfigError {
    #[error("could not parse SharedConfig XML document: {0}")]
    Parse(String),
    #[error("SharedConfig document has no root element")]
    EmptyDocument,
    #[error("could not find <Instance> in SharedConfig document")]
    MissingInstance,
    #[error("could not find {0} attribute on Instance element of SharedConfig document")]
    MissingAttribute(&'static str),
}

/// Returns the assignment carried by the first `<Instance>` element.
pub fn extract_assignment(xml: &str) -> Result<AddressAssignment, SharedConfigError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut seen_element = false;
    loop {
        let event = reader
            .read_event()
            .map_err(|err| SharedConfigError::Parse(err.to_string()))?;
        match event {
            Event::Start(element) | Event::Empty(element) => {
                seen_element = true;
                if element.local_name().as_ref() == INSTANCE_ELEMENT {
                    return instance_assignment(&element);
                }
            }
            Event::Eof if seen_element => return Err(SharedConfigError::MissingInstance),
            Event::Eof => return Err(SharedConfigError::EmptyDocument),
            _ => {}
        }
    }
}

fn instance_assignment(element: &BytesStart<'_>) -> Result<AddressAssignment, SharedConfigError> {
    let ip_address = attribute(element, IPV4_ATTRIBUTE)?;
    let hardware_address = attribute(element, MAC_ATTRIBUTE)?;
    Ok(AddressAssignment::new(hardware_address, ip_address))
}

fn attribute(element: &BytesStart<'_>, name: &'static str) -> Result<String, SharedConfigError> {
    let value = element
        .try_get_attribute(name)
        .map_err(|err| SharedConfigError::Parse(err.to_string()))?
        .ok_or(SharedConfigError::MissingAttribute(name))?
        .unescape_value()
        .map_err(|err| SharedConfigError::Parse(err.to_string()))?;
    let value = value.trim();
    if value.is_empty() {
        return Err(SharedConfigError::MissingAttribute(name));
    }
    Ok(value.to_string())
}
