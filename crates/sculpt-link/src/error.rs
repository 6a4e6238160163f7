//! Error types for transport channels

use thiserror::Error;

/// Errors that can occur while connecting or reconfiguring a channel
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Serial settings list no ports
    #[error("no serial ports configured for channel '{0}'")]
    NoPorts(String),

    /// Every configured port failed to open
    #[error("channel '{channel}' could not open any of {attempts} port(s): {last}")]
    NoPortAvailable {
        /// Channel id
        channel: String,
        /// Number of ports tried
        attempts: usize,
        /// Error from the last attempt
        last: String,
    },

    /// A virtual bus is switched offline
    #[error("channel '{0}' is offline")]
    Offline(String),

    /// `stop()` ran while the connection was being established
    #[error("channel '{0}' was stopped while connecting")]
    Interrupted(String),

    /// Settings of one transport were applied to another
    #[error("{found} settings cannot be applied to a {expected} channel")]
    SettingsMismatch {
        /// Transport of the channel
        expected: &'static str,
        /// Transport of the supplied settings
        found: &'static str,
    },

    /// Serial port error
    #[error("serial error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
