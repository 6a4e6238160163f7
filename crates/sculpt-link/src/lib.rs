//! Transport channels for sculpture actuator buses
//!
//! A [`Channel`] is a write-only pipe to one physical bus of controller
//! boards. Channels are shared: several encoders may send through the same
//! channel, and the operator can stop or reconfigure it while the control
//! loop is transmitting. The [`Link`] implementation serializes all of that
//! behind one writer lock, so frames never interleave and nothing is written
//! after `stop()` returns.
//!
//! Two transports are provided:
//! - [`SerialConnector`]: USB/RS-485 serial adapters via `serialport`
//! - [`VirtualConnector`]: an in-memory [`VirtualBus`] for tests and simulation
//!
//! # Example
//!
//! ```rust
//! use sculpt_link::{open_channel, ChannelSettings, ConnectionState, VirtualSettings};
//!
//! let opened = open_channel("lights", &ChannelSettings::Virtual(VirtualSettings::default()));
//! let bus = opened.bus.clone().unwrap();
//!
//! opened.channel.connect().unwrap();
//! assert!(opened.channel.transmit(&[0x7E, 1, 2, 255, 0, 0]));
//! assert_eq!(bus.frame_count(), 1);
//!
//! opened.channel.stop();
//! assert_eq!(opened.channel.state(), ConnectionState::Disconnected);
//! assert!(!opened.channel.transmit(&[0x7E, 1, 2, 0, 0, 0]));
//! ```

pub mod error;
pub mod link;
pub mod serial;
pub mod settings;
pub mod virtual_bus;

use std::sync::Arc;

pub use error::ChannelError;
pub use link::{Channel, ChannelStatus, ConnectionState, Connector, Link};
pub use serial::{list_ports, PortInfo, SerialConnector};
pub use settings::{ChannelSettings, SerialSettings, VirtualSettings};
pub use virtual_bus::{VirtualBus, VirtualConnector, VirtualWriter};

/// A freshly built channel, plus its bus when the transport is virtual
#[derive(Clone)]
pub struct OpenedChannel {
    /// The channel, ready to connect
    pub channel: Arc<dyn Channel>,
    /// In-memory bus behind a virtual channel
    pub bus: Option<VirtualBus>,
}

impl std::fmt::Debug for OpenedChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedChannel")
            .field("id", &self.channel.id())
            .field("virtual", &self.bus.is_some())
            .finish()
    }
}

/// Build a disconnected channel for the given settings
pub fn open_channel(id: &str, settings: &ChannelSettings) -> OpenedChannel {
    match settings {
        ChannelSettings::Serial(serial) => OpenedChannel {
            channel: Arc::new(Link::new(id, SerialConnector::new(serial.clone()))),
            bus: None,
        },
        ChannelSettings::Virtual(virt) => {
            let connector = VirtualConnector::new(virt.clone());
            let bus = connector.bus();
            OpenedChannel {
                channel: Arc::new(Link::new(id, connector)),
                bus: Some(bus),
            }
        }
    }
}
