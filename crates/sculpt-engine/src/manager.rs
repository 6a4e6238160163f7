//! Data channel manager
//!
//! The manager turns a [`SculptureConfig`] into live objects: it opens every
//! channel, builds each encoder against its channel, and wires modules to
//! their encoders through the mapping. It owns the safe-mode flag, the input
//! manager and the pattern registry, and is the single entry point for
//! operator commands.
//!
//! Loading is all-or-nothing for structural problems (unknown references,
//! bad mappings, addresses an encoder cannot express). Channels that fail to
//! connect are not structural: the manager comes up degraded and the control
//! loop keeps retrying them.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sculpt_link::{
    open_channel, Channel, ChannelError, ChannelSettings, ChannelStatus, ConnectionState,
    OpenedChannel, VirtualBus,
};
use sculpt_protocol::{create_encoder, SafeMode};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::binding::Binding;
use crate::config::{ControlConfig, ModuleConfig, SculptureConfig};
use crate::error::{ConfigError, ControlError};
use crate::input::{InputId, InputManager, RawSignal, SignalValue};
use crate::module::{CombinedState, SculptureModule, TickReport};
use crate::pattern::{Pattern, PatternId, PatternRegistry};

/// Owner of every channel, encoder and module of one sculpture
pub struct DataChannelManager {
    name: String,
    safe_mode: SafeMode,
    safe_tx: watch::Sender<bool>,
    channels: BTreeMap<String, OpenedChannel>,
    bindings: BTreeMap<String, Arc<Binding>>,
    modules: BTreeMap<String, SculptureModule>,
    inputs: InputManager,
    registry: PatternRegistry,
    control: ControlConfig,
    started: Instant,
    shut_down: bool,
}

impl std::fmt::Debug for DataChannelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataChannelManager")
            .field("name", &self.name)
            .field("safe_mode", &self.safe_mode.is_active())
            .field("channels", &self.channels.keys().collect::<Vec<_>>())
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .field("shut_down", &self.shut_down)
            .finish()
    }
}

fn build_module(
    id: &str,
    config: &ModuleConfig,
    bindings: &BTreeMap<String, Arc<Binding>>,
    registry: &PatternRegistry,
) -> Result<SculptureModule, ConfigError> {
    let mapping = config
        .mapping
        .build()
        .map_err(|source| ConfigError::Mapping {
            module: id.to_string(),
            source,
        })?;

    let mut own = BTreeMap::new();
    for encoder_id in &config.encoders {
        let binding = bindings
            .get(encoder_id)
            .ok_or_else(|| ConfigError::UnknownEncoder {
                module: id.to_string(),
                encoder: encoder_id.clone(),
            })?;
        if !binding.kind().supports(config.class) {
            return Err(ConfigError::UnsupportedClass {
                module: id.to_string(),
                encoder_id: encoder_id.clone(),
                encoder: binding.kind().name(),
                class: config.class,
            });
        }
        own.insert(encoder_id.clone(), Arc::clone(binding));
    }

    for (_, route) in mapping.iter() {
        let binding = own
            .get(&route.encoder)
            .ok_or_else(|| ConfigError::UnknownEncoder {
                module: id.to_string(),
                encoder: route.encoder.clone(),
            })?;
        binding
            .encoder()
            .check_address(route.address)
            .map_err(|source| ConfigError::UnroutableAddress {
                module: id.to_string(),
                source,
            })?;
    }

    for name in &config.patterns {
        if !registry.contains(name) {
            return Err(ConfigError::UnknownPatternType {
                module: id.to_string(),
                name: name.clone(),
            });
        }
    }

    info!(
        "Module {}: {} {} item(s) via {}",
        id,
        mapping.len(),
        config.class,
        config.encoders.join(", ")
    );

    Ok(SculptureModule::new(
        id,
        config.class,
        Arc::new(mapping),
        own,
        config.patterns.clone(),
    ))
}

impl DataChannelManager {
    /// Build everything a configuration describes and connect the channels
    pub fn load(config: &SculptureConfig, registry: PatternRegistry) -> Result<Self, ConfigError> {
        config.control.validate()?;
        for (name, input) in &config.inputs {
            input.validate(name)?;
        }

        let safe_mode = SafeMode::new();
        let (safe_tx, _) = watch::channel(safe_mode.is_active());

        let channels: BTreeMap<String, OpenedChannel> = config
            .channels
            .iter()
            .map(|(id, settings)| {
                debug!("Channel {}: {}", id, settings.describe());
                (id.clone(), open_channel(id, settings))
            })
            .collect();

        let mut bindings = BTreeMap::new();
        for (id, encoder) in &config.encoders {
            let opened = channels
                .get(&encoder.channel)
                .ok_or_else(|| ConfigError::UnknownChannel {
                    encoder: id.clone(),
                    channel: encoder.channel.clone(),
                })?;
            let binding = Binding::new(
                id.clone(),
                create_encoder(&encoder.protocol, safe_mode.view()),
                Arc::clone(&opened.channel),
            );
            bindings.insert(id.clone(), Arc::new(binding));
        }

        let mut inputs = InputManager::new();
        for (name, input) in &config.inputs {
            inputs
                .create_named(&input.to_param(name))
                .ok_or_else(|| ConfigError::InvalidInputName(name.clone()))?;
        }

        let mut modules = BTreeMap::new();
        for (id, module) in &config.modules {
            modules.insert(id.clone(), build_module(id, module, &bindings, &registry)?);
        }

        let manager = Self {
            name: config.name.clone(),
            safe_mode,
            safe_tx,
            channels,
            bindings,
            modules,
            inputs,
            registry,
            control: config.control.clone(),
            started: Instant::now(),
            shut_down: false,
        };

        let failed = manager.connect_all();
        if failed.is_empty() {
            info!("Sculpture '{}' loaded, all channels connected", manager.name);
        } else {
            warn!(
                "Sculpture '{}' loaded degraded: {} of {} channel(s) down",
                manager.name,
                failed.len(),
                manager.channels.len()
            );
        }
        Ok(manager)
    }

    /// Connect every channel, returning the ones that failed
    pub fn connect_all(&self) -> Vec<(String, ChannelError)> {
        self.channels
            .iter()
            .filter_map(|(id, opened)| opened.channel.connect().err().map(|e| (id.clone(), e)))
            .collect()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn control(&self) -> &ControlConfig {
        &self.control
    }

    /// Time since the manager was loaded
    pub fn now(&self) -> Duration {
        self.started.elapsed()
    }

    // -------------------------------------------------------------------------
    // Ticking and safe mode
    // -------------------------------------------------------------------------

    /// Tick every module at the current time
    pub fn tick(&mut self) -> Vec<TickReport> {
        let now = self.now();
        self.tick_at(now)
    }

    /// Tick every module at an explicit time
    pub fn tick_at(&mut self, now: Duration) -> Vec<TickReport> {
        if self.shut_down {
            return Vec::new();
        }
        self.inputs.advance(now);
        self.modules
            .values_mut()
            .map(|module| module.tick(now, &self.inputs))
            .collect()
    }

    pub fn safe_mode_active(&self) -> bool {
        self.safe_mode.is_active()
    }

    /// Watch safe-mode changes
    pub fn subscribe_safe_mode(&self) -> watch::Receiver<bool> {
        self.safe_tx.subscribe()
    }

    /// Flip safe mode and immediately re-send every module
    ///
    /// When this returns, the new flag value has been published and every
    /// channel has received a frame encoded under it.
    pub fn toggle_safe_mode(&mut self) -> Vec<TickReport> {
        let active = self.safe_mode.toggle();
        self.safe_tx.send_replace(active);
        let reports = self.tick();
        info!(
            "Safe mode {}: re-sent {} module(s)",
            if active { "on" } else { "off" },
            reports.len()
        );
        reports
    }

    // -------------------------------------------------------------------------
    // Modules and patterns
    // -------------------------------------------------------------------------

    pub fn module(&self, id: &str) -> Option<&SculptureModule> {
        self.modules.get(id)
    }

    pub fn modules(&self) -> impl Iterator<Item = &SculptureModule> {
        self.modules.values()
    }

    fn module_mut(&mut self, id: &str) -> Result<&mut SculptureModule, ControlError> {
        self.modules
            .get_mut(id)
            .ok_or_else(|| ControlError::UnknownModule(id.to_string()))
    }

    pub fn registry(&self) -> &PatternRegistry {
        &self.registry
    }

    /// Last combined state of a module
    pub fn output(&self, module: &str) -> Result<&CombinedState, ControlError> {
        self.modules
            .get(module)
            .map(SculptureModule::output)
            .ok_or_else(|| ControlError::UnknownModule(module.to_string()))
    }

    /// Instantiate a pattern type from the catalogue on a module
    pub fn add_pattern(&mut self, module: &str, name: &str) -> Result<PatternId, ControlError> {
        let target = self
            .modules
            .get_mut(module)
            .ok_or_else(|| ControlError::UnknownModule(module.to_string()))?;
        target.add_pattern(name, &self.registry, &mut self.inputs)
    }

    /// Load a ready-made pattern on a module
    pub fn load_pattern(
        &mut self,
        module: &str,
        pattern: Box<dyn Pattern>,
    ) -> Result<PatternId, ControlError> {
        let target = self
            .modules
            .get_mut(module)
            .ok_or_else(|| ControlError::UnknownModule(module.to_string()))?;
        target.load_pattern(pattern, &mut self.inputs)
    }

    pub fn clear_pattern(&mut self, module: &str, id: PatternId) -> Result<(), ControlError> {
        let target = self
            .modules
            .get_mut(module)
            .ok_or_else(|| ControlError::UnknownModule(module.to_string()))?;
        target.clear_pattern(id, &mut self.inputs)
    }

    pub fn set_pattern_row(
        &mut self,
        module: &str,
        id: PatternId,
        row: u16,
        enabled: bool,
    ) -> Result<(), ControlError> {
        self.module_mut(module)?.set_pattern_row(id, row, enabled)
    }

    pub fn toggle_pattern_row(
        &mut self,
        module: &str,
        id: PatternId,
        row: u16,
    ) -> Result<bool, ControlError> {
        self.module_mut(module)?.toggle_pattern_row(id, row)
    }

    // -------------------------------------------------------------------------
    // Inputs
    // -------------------------------------------------------------------------

    pub fn inputs(&self) -> &InputManager {
        &self.inputs
    }

    /// Feed a raw event to an input, by persistent name or numeric id
    pub fn set_input(
        &mut self,
        reference: &str,
        signal: RawSignal,
    ) -> Result<(InputId, SignalValue), ControlError> {
        let id = self
            .inputs
            .lookup(reference)
            .ok_or_else(|| ControlError::UnknownInput(reference.to_string()))?;
        let value = self.inputs.set(id, signal)?;
        Ok((id, value))
    }

    /// Point a pattern parameter at an existing input
    pub fn bind_input(
        &mut self,
        module: &str,
        pattern: PatternId,
        slot: &str,
        input: &str,
    ) -> Result<InputId, ControlError> {
        let id = self
            .inputs
            .lookup(input)
            .ok_or_else(|| ControlError::UnknownInput(input.to_string()))?;
        let target = self
            .modules
            .get_mut(module)
            .ok_or_else(|| ControlError::UnknownModule(module.to_string()))?;
        target.bind_input(pattern, slot, id, &mut self.inputs)?;
        Ok(id)
    }

    // -------------------------------------------------------------------------
    // Channels
    // -------------------------------------------------------------------------

    fn channel(&self, id: &str) -> Result<&Arc<dyn Channel>, ControlError> {
        self.channels
            .get(id)
            .map(|opened| &opened.channel)
            .ok_or_else(|| ControlError::UnknownChannel(id.to_string()))
    }

    pub fn statuses(&self) -> Vec<ChannelStatus> {
        self.channels
            .values()
            .map(|opened| opened.channel.status())
            .collect()
    }

    pub fn channel_status(&self, id: &str) -> Option<ChannelStatus> {
        self.channels.get(id).map(|opened| opened.channel.status())
    }

    /// In-memory bus behind a virtual channel
    pub fn virtual_bus(&self, id: &str) -> Option<VirtualBus> {
        self.channels.get(id).and_then(|opened| opened.bus.clone())
    }

    /// Ids of the encoders writing to a channel
    pub fn encoders_on(&self, channel: &str) -> Vec<&str> {
        self.bindings
            .values()
            .filter(|binding| binding.channel_id() == channel)
            .map(|binding| binding.id())
            .collect()
    }

    /// Drop and re-open one channel
    pub fn reconnect(&self, id: &str) -> Result<(), ControlError> {
        let channel = self.channel(id)?;
        channel.stop();
        channel.connect()?;
        Ok(())
    }

    /// Retry every channel in the failed state
    pub fn reconnect_failed(&self) -> Vec<(String, Result<(), ChannelError>)> {
        if self.shut_down {
            return Vec::new();
        }
        self.channels
            .iter()
            .filter(|(_, opened)| opened.channel.state() == ConnectionState::Failed)
            .map(|(id, opened)| {
                debug!("Retrying channel {}", id);
                (id.clone(), opened.channel.connect())
            })
            .collect()
    }

    /// Replace a channel's settings and reconnect it
    pub fn reconfigure_channel(
        &self,
        id: &str,
        settings: ChannelSettings,
    ) -> Result<(), ControlError> {
        self.channel(id)?.reconfigure(settings)?;
        Ok(())
    }

    /// Stop every channel; safe to call more than once
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        for opened in self.channels.values() {
            opened.channel.stop();
        }
        info!("Sculpture '{}' shut down", self.name);
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}

impl Drop for DataChannelManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
