//! Testbench topology configuration.
//!
//! A flat, YAML-like text format describes the hosts and devices attached to
//! the network under test. Only a simple subset of YAML is supported; a full
//! parser would drag in dependencies for no benefit.
//!
//! ```text
//! hosts:
//!   - Protocol: TL-C        # highest supported protocol
//!     DataWidth: 64
//!     FirstID: 0
//!     LastID: 0
//!     MaxSize: 5
//!     Fifo: 0
//! devices:
//!   - Protocol: TL-UL
//!     ...
//!     AddressBase: 0
//!     AddressMask: 268435455
//!     AddressTarget: 0
//! ```
//!
//! `#` starts a comment, blank lines are ignored, and a leading `-` begins a
//! new endpoint within the current list.

use std::fs;
use std::path::Path;

use log::{info, warn};

use crate::common::SimError;
use crate::tilelink::protocol::TlProtocol;

/// Configuration of a single host or device.
#[derive(Clone, Debug)]
pub struct EndpointConfig {
    /// Highest protocol this component supports.
    pub protocol: TlProtocol,

    /// Bits of data sent in one beat.
    pub data_width: u32,

    /// Source/sink ID range owned by this component.
    pub first_id: u32,
    pub last_id: u32,

    /// log2(max bytes per message).
    pub max_size: u8,

    /// Produces/requires responses in FIFO order.
    pub fifo: bool,

    /// Component is able to deny requests.
    pub can_deny: bool,

    /// Routing table telling which addresses or IDs are owned by other
    /// components.
    pub bases: Vec<u64>,
    pub masks: Vec<u64>,
    pub targets: Vec<u64>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            protocol: TlProtocol::Ul,
            data_width: 64,
            first_id: 0,
            last_id: 0,
            max_size: 5,
            fifo: false,
            can_deny: true,
            bases: Vec::new(),
            masks: Vec::new(),
            targets: Vec::new(),
        }
    }
}

/// Configuration of all endpoints of a network under test.
#[derive(Clone, Debug, Default)]
pub struct TlConfig {
    pub hosts: Vec<EndpointConfig>,
    pub devices: Vec<EndpointConfig>,
}

impl TlConfig {
    /// The topology the bundled testbench targets: three hosts and three
    /// devices at descending protocol levels, one ID each, 64-bit links.
    pub fn default_topology() -> Self {
        let endpoint = |protocol, id| EndpointConfig {
            protocol,
            first_id: id,
            last_id: id,
            ..EndpointConfig::default()
        };

        Self {
            hosts: vec![
                endpoint(TlProtocol::C, 0),
                endpoint(TlProtocol::Uh, 1),
                endpoint(TlProtocol::Ul, 2),
            ],
            devices: vec![
                endpoint(TlProtocol::C, 0),
                endpoint(TlProtocol::Uh, 1),
                endpoint(TlProtocol::Ul, 2),
            ],
        }
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

fn parse_int(value: &str) -> Result<u64, SimError> {
    let value = value.trim();
    let parsed = if let Some(hex) = value.strip_prefix("0x") {
        u64::from_str_radix(hex, 16)
    } else {
        value.parse()
    };
    parsed.map_err(|_| SimError::Config(format!("expected an integer, found '{}'", value)))
}

fn parse_int_list(value: &str) -> Result<Vec<u64>, SimError> {
    value.split_whitespace().map(parse_int).collect()
}

fn parse_protocol(value: &str) -> Result<TlProtocol, SimError> {
    match value {
        "TL-C" => Ok(TlProtocol::C),
        "TL-C-ROM-TERM" => Ok(TlProtocol::CRomTerm),
        "TL-C-IO-TERM" => Ok(TlProtocol::CIoTerm),
        "TL-UH" => Ok(TlProtocol::Uh),
        "TL-UL" => Ok(TlProtocol::Ul),
        other => Err(SimError::UnknownProtocol(other.to_string())),
    }
}

fn parse_endpoint(lines: &[String]) -> Result<EndpointConfig, SimError> {
    let mut endpoint = EndpointConfig::default();

    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            return Err(SimError::Config(format!(
                "all configuration lines need the form 'name: value'; problem line: {}",
                line
            )));
        };

        let name = name.trim();
        let value = strip_comment(value).trim();

        match name {
            "Protocol" => endpoint.protocol = parse_protocol(value)?,
            "DataWidth" => endpoint.data_width = parse_int(value)? as u32,
            "FirstID" => endpoint.first_id = parse_int(value)? as u32,
            "LastID" => endpoint.last_id = parse_int(value)? as u32,
            "MaxSize" => endpoint.max_size = parse_int(value)? as u8,
            "Fifo" => endpoint.fifo = parse_int(value)? != 0,
            "CanDeny" => endpoint.can_deny = parse_int(value)? != 0,
            _ if name.ends_with("Base") => endpoint.bases = parse_int_list(value)?,
            _ if name.ends_with("Mask") => endpoint.masks = parse_int_list(value)?,
            _ if name.ends_with("Target") => endpoint.targets = parse_int_list(value)?,
            _ => warn!("unknown configuration parameter ignored: {}", name),
        }
    }

    Ok(endpoint)
}

/// Parses configuration text. See the module docs for the format.
pub fn parse_config(text: &str) -> Result<TlConfig, SimError> {
    enum Section {
        None,
        Hosts,
        Devices,
    }

    let mut config = TlConfig::default();
    let mut section = Section::None;
    let mut pending: Vec<String> = Vec::new();

    let flush = |config: &mut TlConfig,
                     section: &Section,
                     pending: &mut Vec<String>|
     -> Result<(), SimError> {
        if pending.is_empty() {
            return Ok(());
        }
        let endpoint = parse_endpoint(pending)?;
        pending.clear();
        match section {
            Section::Hosts => config.hosts.push(endpoint),
            Section::Devices => config.devices.push(endpoint),
            Section::None => {
                return Err(SimError::Config(
                    "endpoint outside of a hosts:/devices: list".into(),
                ))
            }
        }
        Ok(())
    };

    for raw_line in text.lines() {
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with("hosts:") {
            flush(&mut config, &section, &mut pending)?;
            section = Section::Hosts;
        } else if line.starts_with("devices:") {
            flush(&mut config, &section, &mut pending)?;
            section = Section::Devices;
        } else if let Some(rest) = line.strip_prefix('-') {
            // Start of a new endpoint; parse the previous one, if any.
            flush(&mut config, &section, &mut pending)?;
            if !rest.trim().is_empty() {
                pending.push(rest.trim().to_string());
            }
        } else {
            pending.push(line.to_string());
        }
    }
    flush(&mut config, &section, &mut pending)?;

    info!(
        "configured {} hosts and {} devices",
        config.hosts.len(),
        config.devices.len()
    );
    Ok(config)
}

/// Reads a configuration file.
pub fn read_config(path: &Path) -> Result<TlConfig, SimError> {
    let text = fs::read_to_string(path).map_err(|e| SimError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_config(&text)
}
