//! Sculpture configuration
//!
//! One JSON document describes a whole installation: the physical channels,
//! the encoders bound to them, the modules with their mappings, persistent
//! inputs and control loop timing. Only structure is checked here; the
//! manager validates cross references when it loads the document.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use sculpt_link::ChannelSettings;
use sculpt_protocol::{
    ActuatorClass, EncoderSettings, Mapping, MappingEntry, MappingError, PhysicalAddress,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;
use crate::input::{InputParam, SignalKind};

fn default_name() -> String {
    "sculpture".to_string()
}

fn default_tick_ms() -> u64 {
    50
}

fn default_reconnect_ms() -> u64 {
    5000
}

/// Complete description of an installation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SculptureConfig {
    #[serde(default = "default_name")]
    pub name: String,
    /// Physical transports by id
    pub channels: BTreeMap<String, ChannelSettings>,
    /// Encoders by id
    pub encoders: BTreeMap<String, EncoderConfig>,
    /// Modules by id
    pub modules: BTreeMap<String, ModuleConfig>,
    /// Persistent inputs by name (physical buttons, knobs)
    #[serde(default)]
    pub inputs: BTreeMap<String, InputConfig>,
    #[serde(default)]
    pub control: ControlConfig,
}

impl SculptureConfig {
    /// Parse a configuration document
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a configuration file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&contents)?;
        info!(
            "Loaded sculpture '{}' from {} ({} channels, {} modules)",
            config.name,
            path.display(),
            config.channels.len(),
            config.modules.len()
        );
        Ok(config)
    }

    /// Serialize back to pretty JSON
    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// An encoder and the channel it writes to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    pub channel: String,
    pub protocol: EncoderSettings,
}

/// One group of actuators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub class: ActuatorClass,
    /// Encoder ids the module dispatches through
    pub encoders: Vec<String>,
    pub mapping: MappingConfig,
    /// Pattern types that may be added to this module
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// Mapping table in one of two layouts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "layout", rename_all = "lowercase")]
pub enum MappingConfig {
    /// `rows[r][c]` drives logical address `(r, c)` on a single encoder
    Grid {
        encoder: String,
        rows: Vec<Vec<PhysicalAddress>>,
    },
    /// Explicit entries
    Table { entries: Vec<MappingEntry> },
}

impl MappingConfig {
    pub fn build(&self) -> Result<Mapping, MappingError> {
        match self {
            MappingConfig::Grid { encoder, rows } => Mapping::grid(encoder, rows),
            MappingConfig::Table { entries } => Mapping::from_entries(entries.iter().cloned()),
        }
    }
}

/// A persistent input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    pub kind: SignalKind,
    /// Fire a pulse on this interval
    #[serde(default)]
    pub interval_ms: Option<u64>,
}

impl InputConfig {
    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        self.kind.check().map_err(|reason| ConfigError::InvalidInput {
            name: name.to_string(),
            reason,
        })
    }

    pub fn to_param(&self, name: &str) -> InputParam {
        InputParam {
            name: name.to_string(),
            kind: self.kind,
            initial: None,
            timer: self.interval_ms.map(Duration::from_millis),
        }
    }
}

/// Control loop timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Milliseconds between ticks
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Milliseconds between retries of failed channels
    #[serde(default = "default_reconnect_ms")]
    pub reconnect_ms: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            reconnect_ms: default_reconnect_ms(),
        }
    }
}

impl ControlConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_ms == 0 {
            return Err(ConfigError::InvalidControl("tick_ms must be positive"));
        }
        if self.reconnect_ms == 0 {
            return Err(ConfigError::InvalidControl("reconnect_ms must be positive"));
        }
        Ok(())
    }
}
