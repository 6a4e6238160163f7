//! Sculpture control engine
//!
//! This crate sits between the patterns an operator loads and the channels
//! that reach the controller boards:
//!
//! ```text
//! Pattern ──┐
//! Pattern ──┼─ combine by class ─ Mapping ─ Encoder ─ Channel ─> board
//! Inputs  ──┘      (module)                  (binding)
//! ```
//!
//! - [`input`]: signal sources (pulse, toggle, value) shared between patterns
//! - [`pattern`]: the [`Pattern`] trait and the catalogue of pattern types
//! - [`module`]: per-module combination of pattern outputs and routing
//! - [`binding`]: one encoder writing to one channel
//! - [`manager`]: loads a [`SculptureConfig`] and owns everything
//! - [`actor`]: the tick/retry/command loop around the manager
//!
//! # Example
//!
//! ```rust
//! use sculpt_engine::{DataChannelManager, PatternRegistry, SculptureConfig};
//!
//! let config = SculptureConfig::from_json_str(r#"{
//!     "channels": { "fire": { "type": "virtual" } },
//!     "encoders": { "poofers": { "channel": "fire", "protocol": { "type": "poofer" } } },
//!     "modules": {
//!         "flames": {
//!             "class": "poofer",
//!             "encoders": ["poofers"],
//!             "mapping": { "layout": "grid", "encoder": "poofers", "rows": [[{ "board": 1, "relay": 1 }]] }
//!         }
//!     }
//! }"#).unwrap();
//!
//! let mut manager = DataChannelManager::load(&config, PatternRegistry::new()).unwrap();
//! manager.tick();
//!
//! // With no pattern loaded every mapped item rests
//! let bus = manager.virtual_bus("fire").unwrap();
//! assert_eq!(bus.last_frame().unwrap(), b"!0110.");
//! ```

pub mod actor;
pub mod binding;
pub mod config;
pub mod error;
pub mod events;
pub mod input;
pub mod manager;
pub mod module;
pub mod pattern;

pub use actor::{
    run_control_loop, spawn_control_loop, EngineCommand, EngineHandle, EngineStatus,
    ModuleSummary,
};
pub use binding::{Binding, Dispatch};
pub use config::{
    ControlConfig, EncoderConfig, InputConfig, MappingConfig, ModuleConfig, SculptureConfig,
};
pub use error::{ConfigError, ControlError};
pub use events::EngineEvent;
pub use input::{
    InputCollection, InputId, InputManager, InputParam, InputSnapshot, InputStatus, RawSignal,
    SignalKind, SignalValue,
};
pub use manager::DataChannelManager;
pub use module::{CombinedState, PatternInfo, Ranks, SculptureModule, TickReport};
pub use pattern::{ModuleLayout, Pattern, PatternFrame, PatternId, PatternRegistry};
