//! Channel settings as they appear in sculpture configuration

use serde::{Deserialize, Serialize};

fn default_baud_rate() -> u32 {
    9600
}

fn default_timeout_ms() -> u64 {
    100
}

/// Settings for a serial transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialSettings {
    /// Candidate ports, tried in order until one opens
    pub ports: Vec<String>,
    /// Baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Upper bound for a single write, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl SerialSettings {
    /// Settings for a single port
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            ports: vec![port.into()],
            baud_rate,
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Settings for an in-memory transport
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualSettings {
    /// Start with the bus unplugged
    #[serde(default)]
    pub offline: bool,
}

/// Transport type plus its physical parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChannelSettings {
    /// Serial port
    Serial(SerialSettings),
    /// In-memory bus
    Virtual(VirtualSettings),
}

impl ChannelSettings {
    /// Transport name
    pub fn transport(&self) -> &'static str {
        match self {
            ChannelSettings::Serial(_) => "serial",
            ChannelSettings::Virtual(_) => "virtual",
        }
    }

    /// Short human-readable description
    pub fn describe(&self) -> String {
        match self {
            ChannelSettings::Serial(s) => {
                format!("serial {} @ {} baud", s.ports.join("|"), s.baud_rate)
            }
            ChannelSettings::Virtual(v) if v.offline => "virtual (offline)".to_string(),
            ChannelSettings::Virtual(_) => "virtual".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe() {
        let serial = ChannelSettings::Serial(SerialSettings {
            ports: vec!["/dev/ttyUSB0".into(), "/dev/ttyUSB1".into()],
            baud_rate: 19200,
            timeout_ms: 100,
        });
        assert_eq!(serial.describe(), "serial /dev/ttyUSB0|/dev/ttyUSB1 @ 19200 baud");
        assert_eq!(serial.transport(), "serial");
        assert_eq!(
            ChannelSettings::Virtual(VirtualSettings { offline: true }).describe(),
            "virtual (offline)"
        );
    }

    #[test]
    fn test_serial_defaults() {
        let settings = SerialSettings::new("/dev/ttyACM0", 115200);
        assert_eq!(settings.timeout_ms, 100);
        assert_eq!(settings.ports.len(), 1);
    }
}
