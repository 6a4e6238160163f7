//! Control loop actor
//!
//! A single task owns the [`DataChannelManager`]. It ticks every module at
//! the configured cadence, retries failed channels, and serves operator
//! commands from an mpsc channel. Because one task owns the manager, pattern
//! loads and clears are atomic with respect to ticks: a command is handled
//! either wholly before or wholly after a tick.
//!
//! Channel writes are blocking but bounded by the transport timeout, so they
//! run inline on the actor task. Events go out with `try_send`: when the
//! event channel is full they are dropped, so a stalled subscriber never
//! delays a tick or a safe-mode frame.
//!
//! # Example
//!
//! ```rust,ignore
//! use sculpt_engine::{spawn_control_loop, DataChannelManager};
//!
//! let manager = DataChannelManager::load(&config, registry)?;
//! let (engine, mut events, task) = spawn_control_loop(manager, 256);
//!
//! let id = engine.add_pattern("flames", "Chase").await?;
//! engine.toggle_safe_mode().await?;
//! engine.shutdown().await;
//! task.await?;
//! ```

use std::collections::BTreeMap;

use sculpt_link::{ChannelSettings, ChannelStatus, ConnectionState};
use sculpt_protocol::ActuatorClass;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::ControlError;
use crate::events::EngineEvent;
use crate::input::{InputId, InputStatus, RawSignal, SignalValue};
use crate::manager::DataChannelManager;
use crate::module::{CombinedState, PatternInfo, TickReport};
use crate::pattern::PatternId;

/// Commands sent to the control loop
#[derive(Debug)]
pub enum EngineCommand {
    /// Instantiate a pattern type on a module
    AddPattern {
        module: String,
        name: String,
        response: oneshot::Sender<Result<PatternId, ControlError>>,
    },

    /// Remove a pattern from a module
    ClearPattern {
        module: String,
        id: PatternId,
        response: oneshot::Sender<Result<(), ControlError>>,
    },

    /// Flip one grid row of a pattern
    TogglePatternRow {
        module: String,
        id: PatternId,
        row: u16,
        response: oneshot::Sender<Result<bool, ControlError>>,
    },

    /// Feed a raw event to an input
    SetInput {
        /// Persistent input name or numeric id
        input: String,
        signal: RawSignal,
        response: oneshot::Sender<Result<SignalValue, ControlError>>,
    },

    /// Point a pattern parameter at an existing input
    BindInput {
        module: String,
        pattern: PatternId,
        slot: String,
        input: String,
        response: oneshot::Sender<Result<InputId, ControlError>>,
    },

    /// Flip safe mode; replies with the new value after the re-send
    ToggleSafeMode { response: oneshot::Sender<bool> },

    /// Snapshot of everything the operator can see
    QueryStatus {
        response: oneshot::Sender<EngineStatus>,
    },

    /// Drop and re-open a channel
    Reconnect {
        channel: String,
        response: oneshot::Sender<Result<(), ControlError>>,
    },

    /// Replace a channel's settings
    Reconfigure {
        channel: String,
        settings: ChannelSettings,
        response: oneshot::Sender<Result<(), ControlError>>,
    },

    /// Stop the loop and every channel
    Shutdown,
}

/// Operator view of one module
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleSummary {
    pub id: String,
    pub class: ActuatorClass,
    /// Pattern types that may be added
    pub available: Vec<String>,
    pub patterns: Vec<PatternInfo>,
    pub output: CombinedState,
}

impl ModuleSummary {
    /// Number of items currently requesting actuation
    pub fn active_items(&self) -> usize {
        self.output.values().filter(|state| state.is_active()).count()
    }
}

/// Operator view of the whole engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStatus {
    pub name: String,
    pub safe_mode: bool,
    pub channels: Vec<ChannelStatus>,
    pub modules: Vec<ModuleSummary>,
    pub inputs: Vec<InputStatus>,
}

fn status_of(manager: &DataChannelManager) -> EngineStatus {
    EngineStatus {
        name: manager.name().to_string(),
        safe_mode: manager.safe_mode_active(),
        channels: manager.statuses(),
        modules: manager
            .modules()
            .map(|module| ModuleSummary {
                id: module.id().to_string(),
                class: module.class(),
                available: module.available_patterns().to_vec(),
                patterns: module.patterns(),
                output: module.output().clone(),
            })
            .collect(),
        inputs: manager.inputs().statuses(),
    }
}

/// Publish traffic events without stalling the loop
///
/// Traffic is high volume; when the consumer falls behind, frames are left
/// out of the stream rather than delaying the next tick.
fn publish_traffic(event_tx: &mpsc::Sender<EngineEvent>, reports: &[TickReport]) {
    for report in reports {
        for event in EngineEvent::from_report(report) {
            match event_tx.try_send(event) {
                Ok(()) | Err(TrySendError::Closed(_)) => {}
                Err(TrySendError::Full(_)) => {
                    debug!("Event channel full, traffic event skipped");
                    return;
                }
            }
        }
    }
}

/// Control events are never allowed to stall a tick either; a subscriber that
/// stops draining loses them with a warning.
fn publish(event_tx: &mpsc::Sender<EngineEvent>, event: EngineEvent) {
    if let Err(TrySendError::Full(event)) = event_tx.try_send(event) {
        warn!("Event channel full, dropped {:?}", event);
    }
}

fn publish_channel_changes(
    statuses: Vec<ChannelStatus>,
    last: &mut BTreeMap<String, ConnectionState>,
    event_tx: &mpsc::Sender<EngineEvent>,
) {
    for status in statuses {
        let from = last
            .insert(status.id.clone(), status.state)
            .unwrap_or(ConnectionState::Disconnected);
        if from != status.state {
            info!(
                "Channel {}: {} -> {}",
                status.id,
                from.name(),
                status.state.name()
            );
            publish(
                event_tx,
                EngineEvent::ChannelStateChanged {
                    channel: status.id,
                    from,
                    to: status.state,
                    error: status.last_error,
                },
            );
        }
    }
}

fn report_error(event_tx: &mpsc::Sender<EngineEvent>, source: &str, error: &ControlError) {
    warn!("{} failed: {}", source, error);
    publish(
        event_tx,
        EngineEvent::Error {
            source: source.to_string(),
            message: error.to_string(),
        },
    );
}

/// Run the control loop until `Shutdown` or until every command sender is gone
///
/// The manager is shut down (all channels stopped) before this returns.
pub async fn run_control_loop(
    mut manager: DataChannelManager,
    mut cmd_rx: mpsc::Receiver<EngineCommand>,
    event_tx: mpsc::Sender<EngineEvent>,
) {
    let tick_every = manager.control().tick_interval();
    let retry_every = manager.control().reconnect_interval();

    let mut ticker = interval(tick_every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut retry = interval_at(Instant::now() + retry_every, retry_every);
    retry.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut channel_states = BTreeMap::new();
    publish_channel_changes(manager.statuses(), &mut channel_states, &event_tx);

    info!(
        "Control loop started for '{}' ({} ms ticks)",
        manager.name(),
        tick_every.as_millis()
    );

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break; };
                match cmd {
                    EngineCommand::AddPattern { module, name, response } => {
                        let result = manager.add_pattern(&module, &name);
                        match &result {
                            Ok(id) => {
                                publish(
                                    &event_tx,
                                    EngineEvent::PatternLoaded { module, id: *id, name },
                                );
                            }
                            Err(e) => report_error(&event_tx, "add", e),
                        }
                        let _ = response.send(result);
                    }

                    EngineCommand::ClearPattern { module, id, response } => {
                        let result = manager.clear_pattern(&module, id);
                        match &result {
                            Ok(()) => {
                                publish(&event_tx, EngineEvent::PatternCleared { module, id });
                            }
                            Err(e) => report_error(&event_tx, "clear", e),
                        }
                        let _ = response.send(result);
                    }

                    EngineCommand::TogglePatternRow { module, id, row, response } => {
                        let result = manager.toggle_pattern_row(&module, id, row);
                        if let Err(e) = &result {
                            report_error(&event_tx, "row", e);
                        }
                        let _ = response.send(result);
                    }

                    EngineCommand::SetInput { input, signal, response } => {
                        let result = manager.set_input(&input, signal);
                        match &result {
                            Ok((id, value)) => {
                                publish(
                                    &event_tx,
                                    EngineEvent::InputChanged { input: *id, value: *value },
                                );
                            }
                            Err(e) => report_error(&event_tx, "input", e),
                        }
                        let _ = response.send(result.map(|(_, value)| value));
                    }

                    EngineCommand::BindInput { module, pattern, slot, input, response } => {
                        let result = manager.bind_input(&module, pattern, &slot, &input);
                        if let Err(e) = &result {
                            report_error(&event_tx, "bind", e);
                        }
                        let _ = response.send(result);
                    }

                    EngineCommand::ToggleSafeMode { response } => {
                        let reports = manager.toggle_safe_mode();
                        let active = manager.safe_mode_active();
                        publish(&event_tx, EngineEvent::SafeModeChanged { active });
                        publish_traffic(&event_tx, &reports);
                        let _ = response.send(active);
                    }

                    EngineCommand::QueryStatus { response } => {
                        let _ = response.send(status_of(&manager));
                    }

                    EngineCommand::Reconnect { channel, response } => {
                        let result = manager.reconnect(&channel);
                        if let Err(e) = &result {
                            report_error(&event_tx, "reconnect", e);
                        }
                        let _ = response.send(result);
                    }

                    EngineCommand::Reconfigure { channel, settings, response } => {
                        let result = manager.reconfigure_channel(&channel, settings);
                        if let Err(e) = &result {
                            report_error(&event_tx, "reconfigure", e);
                        }
                        let _ = response.send(result);
                    }

                    EngineCommand::Shutdown => {
                        info!("Control loop shutting down");
                        break;
                    }
                }
            }
            _ = ticker.tick() => {
                let reports = manager.tick();
                publish_traffic(&event_tx, &reports);
            }
            _ = retry.tick() => {
                for (channel, result) in manager.reconnect_failed() {
                    match result {
                        Ok(()) => info!("Channel {} recovered", channel),
                        Err(e) => debug!("Channel {} still down: {}", channel, e),
                    }
                }
            }
        }

        publish_channel_changes(manager.statuses(), &mut channel_states, &event_tx);
    }

    manager.shutdown();
    publish_channel_changes(manager.statuses(), &mut channel_states, &event_tx);
    info!("Control loop stopped");
}

/// Cloneable front end for sending commands to the control loop
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    pub fn new(tx: mpsc::Sender<EngineCommand>) -> Self {
        Self { tx }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> EngineCommand,
    ) -> Result<T, ControlError> {
        let (response, rx) = oneshot::channel();
        self.tx
            .send(make(response))
            .await
            .map_err(|_| ControlError::EngineStopped)?;
        rx.await.map_err(|_| ControlError::EngineStopped)
    }

    pub async fn add_pattern(&self, module: &str, name: &str) -> Result<PatternId, ControlError> {
        self.request(|response| EngineCommand::AddPattern {
            module: module.to_string(),
            name: name.to_string(),
            response,
        })
        .await?
    }

    pub async fn clear_pattern(&self, module: &str, id: PatternId) -> Result<(), ControlError> {
        self.request(|response| EngineCommand::ClearPattern {
            module: module.to_string(),
            id,
            response,
        })
        .await?
    }

    pub async fn toggle_pattern_row(
        &self,
        module: &str,
        id: PatternId,
        row: u16,
    ) -> Result<bool, ControlError> {
        self.request(|response| EngineCommand::TogglePatternRow {
            module: module.to_string(),
            id,
            row,
            response,
        })
        .await?
    }

    pub async fn set_input(
        &self,
        input: &str,
        signal: RawSignal,
    ) -> Result<SignalValue, ControlError> {
        self.request(|response| EngineCommand::SetInput {
            input: input.to_string(),
            signal,
            response,
        })
        .await?
    }

    pub async fn bind_input(
        &self,
        module: &str,
        pattern: PatternId,
        slot: &str,
        input: &str,
    ) -> Result<InputId, ControlError> {
        self.request(|response| EngineCommand::BindInput {
            module: module.to_string(),
            pattern,
            slot: slot.to_string(),
            input: input.to_string(),
            response,
        })
        .await?
    }

    /// Flip safe mode; returns the new value
    pub async fn toggle_safe_mode(&self) -> Result<bool, ControlError> {
        self.request(|response| EngineCommand::ToggleSafeMode { response })
            .await
    }

    pub async fn status(&self) -> Result<EngineStatus, ControlError> {
        self.request(|response| EngineCommand::QueryStatus { response })
            .await
    }

    pub async fn reconnect(&self, channel: &str) -> Result<(), ControlError> {
        self.request(|response| EngineCommand::Reconnect {
            channel: channel.to_string(),
            response,
        })
        .await?
    }

    pub async fn reconfigure(
        &self,
        channel: &str,
        settings: ChannelSettings,
    ) -> Result<(), ControlError> {
        self.request(|response| EngineCommand::Reconfigure {
            channel: channel.to_string(),
            settings,
            response,
        })
        .await?
    }

    /// Ask the loop to stop; a no-op if it already has
    pub async fn shutdown(&self) {
        let _ = self.tx.send(EngineCommand::Shutdown).await;
    }
}

/// Spawn the control loop on the current runtime
pub fn spawn_control_loop(
    manager: DataChannelManager,
    event_capacity: usize,
) -> (EngineHandle, mpsc::Receiver<EngineEvent>, JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (event_tx, event_rx) = mpsc::channel(event_capacity);
    let task = tokio::spawn(run_control_loop(manager, cmd_rx, event_tx));
    (EngineHandle::new(cmd_tx), event_rx, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SculptureConfig;
    use crate::input::{InputParam, InputSnapshot};
    use crate::pattern::{ModuleLayout, Pattern, PatternFrame, PatternRegistry};
    use sculpt_protocol::{ItemState, LogicalAddress};
    use std::time::Duration;

    struct Flicker;

    impl Pattern for Flicker {
        fn name(&self) -> &str {
            "Flicker"
        }

        fn addresses(&self) -> Vec<LogicalAddress> {
            vec![LogicalAddress::grid(0, 0)]
        }

        fn inputs(&self) -> Vec<InputParam> {
            vec![InputParam::toggle("on", true)]
        }

        fn render(&mut self, _now: Duration, inputs: &InputSnapshot) -> PatternFrame {
            [(LogicalAddress::grid(0, 0), ItemState::Boolean(inputs.toggled("on")))]
                .into_iter()
                .collect()
        }
    }

    const CONFIG: &str = r#"{
        "name": "test",
        "channels": { "fire": { "type": "virtual" } },
        "encoders": { "poofers": { "channel": "fire", "protocol": { "type": "poofer" } } },
        "modules": {
            "flames": {
                "class": "poofer",
                "encoders": ["poofers"],
                "mapping": { "layout": "grid", "encoder": "poofers", "rows": [[{ "board": 1, "relay": 1 }]] },
                "patterns": ["Flicker"]
            }
        },
        "inputs": { "button": { "kind": { "type": "toggle" } } },
        "control": { "tick_ms": 10, "reconnect_ms": 20 }
    }"#;

    fn manager() -> DataChannelManager {
        let mut registry = PatternRegistry::new();
        registry.register("Flicker", |_layout: &ModuleLayout| -> Box<dyn Pattern> {
            Box::new(Flicker)
        });
        let config = SculptureConfig::from_json_str(CONFIG).unwrap();
        DataChannelManager::load(&config, registry).unwrap()
    }

    #[tokio::test]
    async fn test_commands_round_trip() {
        let manager = manager();
        let bus = manager.virtual_bus("fire").unwrap();
        let (engine, mut events, task) = spawn_control_loop(manager, 1024);

        let id = engine.add_pattern("flames", "Flicker").await.unwrap();
        assert_eq!(id, PatternId(0));

        let status = engine.status().await.unwrap();
        assert_eq!(status.modules[0].patterns.len(), 1);
        assert_eq!(status.channels[0].state, ConnectionState::Connected);

        // Rebind the pattern's toggle to the persistent button, which is off
        engine.bind_input("flames", id, "on", "button").await.unwrap();
        assert_eq!(
            engine.set_input("button", RawSignal::Switch(true)).await.unwrap(),
            SignalValue::Toggle(true)
        );

        assert!(matches!(
            engine.add_pattern("flames", "Missing").await,
            Err(ControlError::PatternNotAllowed { .. })
        ));

        assert!(engine.toggle_safe_mode().await.unwrap());
        assert_eq!(bus.last_frame().unwrap(), b"!0110.");

        engine.shutdown().await;
        task.await.unwrap();
        assert!(matches!(
            engine.status().await,
            Err(ControlError::EngineStopped)
        ));

        let mut saw_loaded = false;
        let mut saw_safe = false;
        let mut saw_error = false;
        let mut saw_disconnect = false;
        while let Ok(event) = events.try_recv() {
            match event {
                EngineEvent::PatternLoaded { .. } => saw_loaded = true,
                EngineEvent::SafeModeChanged { active: true } => saw_safe = true,
                EngineEvent::Error { source, .. } if source == "add" => saw_error = true,
                EngineEvent::ChannelStateChanged {
                    to: ConnectionState::Disconnected,
                    ..
                } => saw_disconnect = true,
                _ => {}
            }
        }
        assert!(saw_loaded);
        assert!(saw_safe);
        assert!(saw_error);
        assert!(saw_disconnect);
    }

    #[tokio::test]
    async fn test_loop_ticks_and_retries() {
        let manager = manager();
        let bus = manager.virtual_bus("fire").unwrap();
        let (engine, _events, task) = spawn_control_loop(manager, 16);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(bus.frame_count() > 0);

        // Unplug: the next write fails, the channel is retried once plugged in
        bus.set_online(false);
        tokio::time::sleep(Duration::from_millis(30)).await;
        let status = engine.status().await.unwrap();
        assert_eq!(status.channels[0].state, ConnectionState::Failed);

        bus.set_online(true);
        tokio::time::sleep(Duration::from_millis(80)).await;
        let status = engine.status().await.unwrap();
        assert_eq!(status.channels[0].state, ConnectionState::Connected);

        engine.shutdown().await;
        task.await.unwrap();
    }

    #[test]
    fn test_control_loop_future_is_send() {
        fn assert_send<T: Send>(_: &T) {}
        let (_cmd_tx, cmd_rx) = mpsc::channel(1);
        let (event_tx, _event_rx) = mpsc::channel(1);
        let future = run_control_loop(manager(), cmd_rx, event_tx);
        assert_send(&future);
    }

    #[tokio::test]
    async fn test_undrained_events_do_not_stall_safe_mode() {
        let manager = manager();
        let bus = manager.virtual_bus("fire").unwrap();
        // Held open but never read
        let (engine, _events, task) = spawn_control_loop(manager, 1);

        for _ in 0..4 {
            engine.add_pattern("flames", "Flicker").await.unwrap();
            engine.set_input("button", RawSignal::Press).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(bus.last_frame().unwrap(), b"!0111.");

        let safe = tokio::time::timeout(Duration::from_secs(1), engine.toggle_safe_mode())
            .await
            .expect("safe mode request stalled");
        assert!(safe.unwrap());
        assert_eq!(bus.last_frame().unwrap(), b"!0110.");

        engine.shutdown().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_dropping_handle_stops_loop() {
        let manager = manager();
        let bus = manager.virtual_bus("fire").unwrap();
        let (engine, _events, task) = spawn_control_loop(manager, 16);
        drop(engine);
        task.await.unwrap();

        let frames = bus.frame_count();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(bus.frame_count(), frames);
    }
}
