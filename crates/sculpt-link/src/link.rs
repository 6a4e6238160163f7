//! Channel lifecycle
//!
//! A [`Link`] owns one transport and drives its connection state machine:
//!
//! ```text
//! Disconnected --connect--> Connecting --ok--> Connected
//!      ^                        |                  |
//!      |                        +--err--> Failed <-+ (write error)
//!      +------------- stop (from any state) -------+
//! ```
//!
//! The writer mutex is the single-writer boundary of the bus: every frame is
//! written whole while holding it, so encoders sharing a channel can never
//! interleave mid-frame. `stop()` flips the state to `Disconnected` before it
//! waits for the writer, which makes every transmit still queued behind the
//! lock fail closed. Each `stop()` also bumps an epoch counter so that a late
//! error from an in-flight write cannot overwrite the `Disconnected` state.

use std::io::Write;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::ChannelError;
use crate::settings::ChannelSettings;

/// Connection state of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ConnectionState {
    /// No transport held
    #[default]
    Disconnected,
    /// Opening the transport
    Connecting,
    /// Ready to transmit
    Connected,
    /// Last connect or write failed
    Failed,
}

impl ConnectionState {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
        }
    }
}

/// Read-only snapshot of a channel for the operator interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelStatus {
    /// Channel id
    pub id: String,
    /// Current settings
    pub settings: ChannelSettings,
    /// Connection state
    pub state: ConnectionState,
    /// Most recent connect or write error
    pub last_error: Option<String>,
    /// Frames written successfully
    pub frames_sent: u64,
    /// Bytes written successfully
    pub bytes_sent: u64,
    /// Writes that failed
    pub failed_writes: u64,
}

/// A write-only transport to a bus of controller boards
///
/// All methods take `&self`; implementations synchronize internally so a
/// channel can be shared by several encoders and stopped from any thread.
pub trait Channel: Send + Sync {
    /// Channel id from configuration
    fn id(&self) -> &str;

    /// Open the transport; a no-op when already connected
    fn connect(&self) -> Result<(), ChannelError>;

    /// Write one frame; false if not connected or the write failed
    fn transmit(&self, bytes: &[u8]) -> bool;

    /// Release the transport; always succeeds
    fn stop(&self);

    /// Snapshot of settings, state and counters
    fn status(&self) -> ChannelStatus;

    /// Current connection state
    fn state(&self) -> ConnectionState {
        self.status().state
    }

    /// Replace the settings and reconnect
    fn reconfigure(&self, settings: ChannelSettings) -> Result<(), ChannelError>;
}

/// Opens the underlying transport for a [`Link`]
///
/// Generic over the writer type to support both real serial ports and
/// in-memory buses through a single link implementation.
pub trait Connector: Send + 'static {
    /// Handle written to while connected
    type Writer: Write + Send;

    /// Open the transport
    fn open(&mut self, channel: &str) -> Result<Self::Writer, ChannelError>;

    /// Current settings
    fn settings(&self) -> ChannelSettings;

    /// Replace the settings; takes effect on the next `open`
    fn apply(&mut self, settings: ChannelSettings) -> Result<(), ChannelError>;
}

#[derive(Debug, Default)]
struct LinkInfo {
    state: ConnectionState,
    epoch: u64,
    last_error: Option<String>,
    frames_sent: u64,
    bytes_sent: u64,
    failed_writes: u64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Channel implementation over any [`Connector`]
pub struct Link<C: Connector> {
    id: String,
    connector: Mutex<C>,
    writer: Mutex<Option<C::Writer>>,
    info: Mutex<LinkInfo>,
}

impl<C: Connector> std::fmt::Debug for Link<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("id", &self.id)
            .field("state", &lock(&self.info).state)
            .field("writer", &"<transport>")
            .finish()
    }
}

impl<C: Connector> Link<C> {
    /// Create a disconnected link
    pub fn new(id: impl Into<String>, connector: C) -> Self {
        Self {
            id: id.into(),
            connector: Mutex::new(connector),
            writer: Mutex::new(None),
            info: Mutex::new(LinkInfo::default()),
        }
    }
}

impl<C: Connector> Channel for Link<C> {
    fn id(&self) -> &str {
        &self.id
    }

    fn connect(&self) -> Result<(), ChannelError> {
        let mut writer = lock(&self.writer);

        let epoch = {
            let mut info = lock(&self.info);
            if info.state == ConnectionState::Connected && writer.is_some() {
                return Ok(());
            }
            info.state = ConnectionState::Connecting;
            info.epoch
        };

        let opened = lock(&self.connector).open(&self.id);

        let mut info = lock(&self.info);
        if info.epoch != epoch {
            debug!("Channel {} stopped during connect", self.id);
            return Err(ChannelError::Interrupted(self.id.clone()));
        }

        match opened {
            Ok(handle) => {
                *writer = Some(handle);
                info.state = ConnectionState::Connected;
                info.last_error = None;
                info!("Channel {} connected", self.id);
                Ok(())
            }
            Err(e) => {
                *writer = None;
                info.state = ConnectionState::Failed;
                info.last_error = Some(e.to_string());
                warn!("Channel {} failed to connect: {}", self.id, e);
                Err(e)
            }
        }
    }

    fn transmit(&self, bytes: &[u8]) -> bool {
        let mut writer = lock(&self.writer);

        let epoch = {
            let info = lock(&self.info);
            if info.state != ConnectionState::Connected {
                return false;
            }
            info.epoch
        };

        let Some(handle) = writer.as_mut() else {
            return false;
        };

        let result = handle.write_all(bytes).and_then(|_| handle.flush());

        let mut info = lock(&self.info);
        match result {
            Ok(()) if info.epoch == epoch => {
                info.frames_sent += 1;
                info.bytes_sent += bytes.len() as u64;
                true
            }
            Ok(()) => false,
            Err(e) => {
                info.failed_writes += 1;
                if info.epoch == epoch {
                    info.state = ConnectionState::Failed;
                    info.last_error = Some(e.to_string());
                    *writer = None;
                }
                warn!("Channel {} failure sending data: {}", self.id, e);
                false
            }
        }
    }

    fn stop(&self) {
        {
            let mut info = lock(&self.info);
            info.epoch += 1;
            if info.state != ConnectionState::Disconnected {
                info!("Channel {} stopped ({})", self.id, info.state.name());
            }
            info.state = ConnectionState::Disconnected;
        }
        lock(&self.writer).take();
    }

    fn status(&self) -> ChannelStatus {
        let settings = lock(&self.connector).settings();
        let info = lock(&self.info);
        ChannelStatus {
            id: self.id.clone(),
            settings,
            state: info.state,
            last_error: info.last_error.clone(),
            frames_sent: info.frames_sent,
            bytes_sent: info.bytes_sent,
            failed_writes: info.failed_writes,
        }
    }

    fn reconfigure(&self, settings: ChannelSettings) -> Result<(), ChannelError> {
        info!("Channel {} reconfigured: {}", self.id, settings.describe());
        self.stop();
        {
            let _writer = lock(&self.writer);
            lock(&self.connector).apply(settings)?;
        }
        self.connect()
    }
}
