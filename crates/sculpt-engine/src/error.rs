//! Error types for the engine

use sculpt_link::ChannelError;
use sculpt_protocol::{ActuatorClass, EncodingError, MappingError, UnmappedAddress};
use thiserror::Error;

use crate::input::InputId;
use crate::pattern::PatternId;

/// Structural problems found while loading a sculpture configuration
///
/// All of these are fatal: a manager is never built from a configuration that
/// produces one.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file is not valid JSON for the schema
    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// A module's mapping table is malformed
    #[error("module '{module}': {source}")]
    Mapping {
        module: String,
        #[source]
        source: MappingError,
    },

    /// An encoder names a channel that is not declared
    #[error("encoder '{encoder}' references unknown channel '{channel}'")]
    UnknownChannel { encoder: String, channel: String },

    /// A module names an encoder that is not declared (or not bound to it)
    #[error("module '{module}' references unknown encoder '{encoder}'")]
    UnknownEncoder { module: String, encoder: String },

    /// An encoder cannot carry the module's actuator class
    #[error("module '{module}': {encoder} encoder '{encoder_id}' cannot drive {class} actuators")]
    UnsupportedClass {
        module: String,
        encoder_id: String,
        encoder: &'static str,
        class: ActuatorClass,
    },

    /// A mapped physical address cannot be expressed by its encoder
    #[error("module '{module}': {source}")]
    UnroutableAddress {
        module: String,
        #[source]
        source: EncodingError,
    },

    /// A module lists a pattern type the registry does not know
    #[error("module '{module}' lists unknown pattern type '{name}'")]
    UnknownPatternType { module: String, name: String },

    /// A persistent input name is used twice or looks like a numeric id
    #[error("invalid input name '{0}'")]
    InvalidInputName(String),

    /// A persistent input's kind cannot hold a value
    #[error("input '{name}': {reason}")]
    InvalidInput { name: String, reason: &'static str },

    /// Control loop settings out of range
    #[error("invalid control settings: {0}")]
    InvalidControl(&'static str),
}

/// Operator commands that reference something that does not exist or
/// cannot be done
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("unknown module '{0}'")]
    UnknownModule(String),

    #[error("module '{module}' has no pattern {id}")]
    UnknownPattern { module: String, id: PatternId },

    #[error("unknown pattern type '{0}'")]
    UnknownPatternType(String),

    #[error("pattern type '{name}' is not available on module '{module}'")]
    PatternNotAllowed { module: String, name: String },

    /// A pattern declares an address its module does not map
    #[error("module '{module}': pattern '{pattern}' uses {source}")]
    Unmapped {
        module: String,
        pattern: String,
        #[source]
        source: UnmappedAddress,
    },

    #[error("unknown input '{0}'")]
    UnknownInput(String),

    #[error("pattern {pattern} has no input parameter '{slot}'")]
    UnknownSlot { pattern: PatternId, slot: String },

    #[error("input {0} no longer exists")]
    InputGone(InputId),

    #[error("row {row} out of range (module has {rows} rows)")]
    RowOutOfRange { row: u16, rows: u32 },

    #[error("unknown channel '{0}'")]
    UnknownChannel(String),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// The control loop has exited
    #[error("engine is not running")]
    EngineStopped,
}
