//! Simulated boards behind virtual channels
//!
//! Every virtual channel gets a [`SimulatedBoards`] when all the encoders on it
//! speak the same wire format. Virtual buses keep every frame until drained,
//! so channels that cannot be decoded are still drained.

use std::collections::BTreeMap;

use sculpt_engine::{DataChannelManager, SculptureConfig};
use sculpt_link::{ChannelSettings, VirtualBus, VirtualSettings};
use sculpt_protocol::EncoderKind;
use sculpt_sim::SimulatedBoards;
use tracing::{debug, info};

/// Replace every serial channel with a virtual one; returns how many changed
pub fn virtualize(config: &mut SculptureConfig) -> usize {
    let mut replaced = 0;
    for (id, settings) in config.channels.iter_mut() {
        if let ChannelSettings::Serial(serial) = settings {
            info!("Dry run: channel {} ({}) is virtual", id, serial.ports.join("|"));
            *settings = ChannelSettings::Virtual(VirtualSettings::default());
            replaced += 1;
        }
    }
    replaced
}

struct Attached {
    bus: VirtualBus,
    boards: Option<SimulatedBoards>,
}

pub struct Simulation {
    channels: BTreeMap<String, Attached>,
}

impl Simulation {
    pub fn attach(manager: &DataChannelManager, config: &SculptureConfig) -> Self {
        let mut channels = BTreeMap::new();
        for id in config.channels.keys() {
            let Some(bus) = manager.virtual_bus(id) else {
                continue;
            };

            let mut kinds: Vec<EncoderKind> = Vec::new();
            for encoder in config.encoders.values().filter(|e| &e.channel == id) {
                let kind = encoder.protocol.kind();
                if !kinds.contains(&kind) {
                    kinds.push(kind);
                }
            }

            let boards = match kinds.as_slice() {
                [kind] => {
                    debug!("Simulating {} boards on {}", kind.name(), id);
                    Some(SimulatedBoards::new(*kind))
                }
                _ => {
                    debug!("Channel {} carries {} wire formats, not simulated", id, kinds.len());
                    None
                }
            };
            channels.insert(id.clone(), Attached { bus, boards });
        }
        Self { channels }
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Apply pending frames to the simulated boards
    pub fn drain(&mut self) {
        for attached in self.channels.values_mut() {
            match &mut attached.boards {
                Some(boards) => {
                    boards.drain(&attached.bus);
                }
                None => {
                    attached.bus.take_frames();
                }
            }
        }
    }

    pub fn summary(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for (id, attached) in &self.channels {
            let Some(boards) = &attached.boards else {
                continue;
            };
            lines.push(format!(
                "{} ({}, {} frames, {} rejected):",
                id,
                boards.kind().name(),
                boards.frames_applied(),
                boards.frames_rejected()
            ));
            lines.extend(boards.summary().into_iter().map(|line| format!("  {}", line)));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sculpt_engine::PatternRegistry;

    const CONFIG: &str = r#"{
        "channels": {
            "fire": { "type": "serial", "ports": ["/dev/ttyUSB9"] },
            "mixed": { "type": "virtual" }
        },
        "encoders": {
            "poofers": { "channel": "fire", "protocol": { "type": "poofer" } },
            "hammers": { "channel": "mixed", "protocol": { "type": "relay" } },
            "leds": { "channel": "mixed", "protocol": { "type": "led" } }
        },
        "modules": {
            "flames": {
                "class": "poofer",
                "encoders": ["poofers"],
                "mapping": { "layout": "grid", "encoder": "poofers", "rows": [[{ "board": 1, "relay": 1 }]] }
            }
        }
    }"#;

    #[test]
    fn test_dry_run_simulates_single_format_channels() {
        let mut config = SculptureConfig::from_json_str(CONFIG).unwrap();
        assert_eq!(virtualize(&mut config), 1);
        assert_eq!(virtualize(&mut config), 0);

        let mut manager = DataChannelManager::load(&config, PatternRegistry::new()).unwrap();
        let mut sim = Simulation::attach(&manager, &config);
        assert!(!sim.is_empty());

        manager.tick();
        sim.drain();
        assert_eq!(
            sim.summary(),
            vec!["fire (poofer, 1 frames, 0 rejected):", "  board 01: 1=off"]
        );
        assert!(manager.virtual_bus("mixed").unwrap().frames().is_empty());
    }

    #[test]
    fn test_demo_config_runs_dry() {
        let mut config = SculptureConfig::from_json_str(include_str!("../demo.json")).unwrap();
        assert_eq!(virtualize(&mut config), 2);

        let mut manager =
            DataChannelManager::load(&config, sculpt_sim::builtin_registry()).unwrap();
        manager.add_pattern("flames", "AllOn").unwrap();
        let mut sim = Simulation::attach(&manager, &config);

        manager.tick();
        sim.drain();
        let summary = sim.summary();
        assert!(summary.iter().any(|line| line.starts_with("fire (poofer")));
        assert!(summary.contains(&"  board 01: 1=on 2=on 3=on 4=on".to_string()));
        assert!(summary.iter().any(|line| line.starts_with("lights (led")));
    }
}
