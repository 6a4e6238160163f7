//! In-memory transport
//!
//! A [`VirtualBus`] stands in for a serial port when no hardware is attached.
//! Every flushed write lands in the bus as one frame, so tests and simulated
//! boards can inspect exactly what would have gone down the wire. The bus can
//! be unplugged, made to fail writes, or slowed down to exercise the channel
//! state machine.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::trace;

use crate::error::ChannelError;
use crate::link::Connector;
use crate::settings::{ChannelSettings, VirtualSettings};

#[derive(Debug, Default)]
struct BusState {
    frames: Vec<Vec<u8>>,
    pending: Vec<u8>,
    online: bool,
    fail_writes: bool,
    write_delay: Option<Duration>,
    connects: usize,
}

/// Shared handle to an in-memory bus
#[derive(Debug, Clone)]
pub struct VirtualBus {
    state: Arc<Mutex<BusState>>,
}

impl Default for VirtualBus {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualBus {
    /// Create an online, empty bus
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState {
                online: true,
                ..Default::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All frames received so far
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.lock().frames.clone()
    }

    /// Drain received frames
    pub fn take_frames(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.lock().frames)
    }

    /// Most recent frame
    pub fn last_frame(&self) -> Option<Vec<u8>> {
        self.lock().frames.last().cloned()
    }

    /// Number of frames received
    pub fn frame_count(&self) -> usize {
        self.lock().frames.len()
    }

    /// Plug or unplug the bus; unplugging breaks open writers
    pub fn set_online(&self, online: bool) {
        self.lock().online = online;
    }

    /// Whether the bus is plugged in
    pub fn is_online(&self) -> bool {
        self.lock().online
    }

    /// Make every write fail while set
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Sleep inside every flush, simulating a slow device
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        self.lock().write_delay = delay;
    }

    /// Number of successful opens
    pub fn connect_count(&self) -> usize {
        self.lock().connects
    }
}

/// Writer handed out by [`VirtualConnector`]
#[derive(Debug)]
pub struct VirtualWriter {
    bus: VirtualBus,
}

impl Write for VirtualWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.bus.lock();
        if !state.online {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "bus offline"));
        }
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "write failed"));
        }
        state.pending.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let delay = self.bus.lock().write_delay;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let mut state = self.bus.lock();
        if !state.online {
            state.pending.clear();
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "bus offline"));
        }
        if !state.pending.is_empty() {
            let frame = std::mem::take(&mut state.pending);
            trace!("Virtual bus frame: {:02X?}", frame);
            state.frames.push(frame);
        }
        Ok(())
    }
}

/// Opens writers onto a [`VirtualBus`]
#[derive(Debug, Clone)]
pub struct VirtualConnector {
    bus: VirtualBus,
    settings: VirtualSettings,
}

impl VirtualConnector {
    /// Create a connector and its bus from settings
    pub fn new(settings: VirtualSettings) -> Self {
        let bus = VirtualBus::new();
        bus.set_online(!settings.offline);
        Self { bus, settings }
    }

    /// Handle to the bus for inspection
    pub fn bus(&self) -> VirtualBus {
        self.bus.clone()
    }
}

impl Connector for VirtualConnector {
    type Writer = VirtualWriter;

    fn open(&mut self, channel: &str) -> Result<Self::Writer, ChannelError> {
        let mut state = self.bus.lock();
        if !state.online {
            return Err(ChannelError::Offline(channel.to_string()));
        }
        state.connects += 1;
        state.pending.clear();
        Ok(VirtualWriter {
            bus: self.bus.clone(),
        })
    }

    fn settings(&self) -> ChannelSettings {
        ChannelSettings::Virtual(self.settings.clone())
    }

    fn apply(&mut self, settings: ChannelSettings) -> Result<(), ChannelError> {
        match settings {
            ChannelSettings::Virtual(virt) => {
                self.bus.set_online(!virt.offline);
                self.settings = virt;
                Ok(())
            }
            other => Err(ChannelError::SettingsMismatch {
                expected: "virtual",
                found: other.transport(),
            }),
        }
    }
}
