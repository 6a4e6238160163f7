//! Serial transport
//!
//! Controller boards hang off USB serial adapters whose device names move
//! around between boots, so a channel lists several candidate ports and the
//! connector takes the first one that opens.

use std::time::Duration;

use serialport::{available_ports, SerialPort, SerialPortType};
use tracing::{debug, info, warn};

use crate::error::ChannelError;
use crate::link::Connector;
use crate::settings::{ChannelSettings, SerialSettings};

/// Opens serial ports for a [`Link`](crate::Link)
#[derive(Debug, Clone)]
pub struct SerialConnector {
    settings: SerialSettings,
}

impl SerialConnector {
    /// Create a connector for the given settings
    pub fn new(settings: SerialSettings) -> Self {
        Self { settings }
    }
}

impl Connector for SerialConnector {
    type Writer = Box<dyn SerialPort>;

    fn open(&mut self, channel: &str) -> Result<Self::Writer, ChannelError> {
        if self.settings.ports.is_empty() {
            return Err(ChannelError::NoPorts(channel.to_string()));
        }

        let mut last = String::new();
        for port_name in &self.settings.ports {
            debug!(
                "Channel {}: opening {} at {} baud",
                channel, port_name, self.settings.baud_rate
            );
            match serialport::new(port_name, self.settings.baud_rate)
                .timeout(Duration::from_millis(self.settings.timeout_ms))
                .open()
            {
                Ok(port) => {
                    info!("Channel {}: opened {}", channel, port_name);
                    return Ok(port);
                }
                Err(e) => {
                    warn!("Channel {}: could not open {}: {}", channel, port_name, e);
                    last = format!("{}: {}", port_name, e);
                }
            }
        }

        Err(ChannelError::NoPortAvailable {
            channel: channel.to_string(),
            attempts: self.settings.ports.len(),
            last,
        })
    }

    fn settings(&self) -> ChannelSettings {
        ChannelSettings::Serial(self.settings.clone())
    }

    fn apply(&mut self, settings: ChannelSettings) -> Result<(), ChannelError> {
        match settings {
            ChannelSettings::Serial(serial) => {
                self.settings = serial;
                Ok(())
            }
            other => Err(ChannelError::SettingsMismatch {
                expected: "serial",
                found: other.transport(),
            }),
        }
    }
}

/// A serial port present on this machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Device name (e.g. /dev/ttyUSB0, COM3)
    pub name: String,
    /// USB product string, if the port is a USB adapter
    pub product: Option<String>,
}

/// Enumerate serial ports, for operators filling in channel settings
pub fn list_ports() -> Result<Vec<PortInfo>, ChannelError> {
    let ports = available_ports()?;
    Ok(ports
        .into_iter()
        .map(|p| {
            let product = match p.port_type {
                SerialPortType::UsbPort(usb) => usb.product,
                _ => None,
            };
            PortInfo {
                name: p.port_name,
                product,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::VirtualSettings;

    #[test]
    fn test_empty_port_list() {
        let mut connector = SerialConnector::new(SerialSettings {
            ports: Vec::new(),
            baud_rate: 9600,
            timeout_ms: 100,
        });
        assert!(matches!(
            connector.open("fire"),
            Err(ChannelError::NoPorts(ref id)) if id == "fire"
        ));
    }

    #[test]
    fn test_all_ports_fail() {
        let mut connector = SerialConnector::new(SerialSettings {
            ports: vec![
                "/nonexistent/sculpt-a".to_string(),
                "/nonexistent/sculpt-b".to_string(),
            ],
            baud_rate: 9600,
            timeout_ms: 100,
        });
        match connector.open("fire") {
            Err(ChannelError::NoPortAvailable { attempts, last, .. }) => {
                assert_eq!(attempts, 2);
                assert!(last.starts_with("/nonexistent/sculpt-b"));
            }
            other => panic!("expected NoPortAvailable, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_apply_rejects_other_transport() {
        let mut connector = SerialConnector::new(SerialSettings::new("/dev/ttyUSB0", 9600));
        let result = connector.apply(ChannelSettings::Virtual(VirtualSettings::default()));
        assert!(matches!(
            result,
            Err(ChannelError::SettingsMismatch {
                expected: "serial",
                found: "virtual"
            })
        ));

        connector
            .apply(ChannelSettings::Serial(SerialSettings::new("/dev/ttyUSB1", 19200)))
            .unwrap();
        assert_eq!(
            connector.settings(),
            ChannelSettings::Serial(SerialSettings::new("/dev/ttyUSB1", 19200))
        );
    }
}
