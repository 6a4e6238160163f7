//! Integration tests for the sculpture engine
//!
//! These tests drive a full manager built from JSON over virtual channels and
//! decode what reached each bus:
//! - Pattern combination and the last-loaded-wins rule
//! - Safe mode taking effect on the very next frame of every channel
//! - One failing channel not holding back the others
//! - Shutdown semantics

use std::collections::BTreeMap;
use std::time::Duration;

use sculpt_engine::{
    DataChannelManager, InputSnapshot, Pattern, PatternFrame, PatternRegistry, SculptureConfig,
};
use sculpt_protocol::{parse_frame, EncoderKind, ItemState, LogicalAddress, PhysicalAddress};

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    pub const CONFIG: &str = r#"{
        "name": "Integration",
        "channels": {
            "fire": { "type": "virtual" },
            "strike": { "type": "virtual" }
        },
        "encoders": {
            "poofers": { "channel": "fire", "protocol": { "type": "poofer" } },
            "hammers": { "channel": "strike", "protocol": { "type": "relay" } }
        },
        "modules": {
            "flames": {
                "class": "poofer",
                "encoders": ["poofers"],
                "mapping": {
                    "layout": "grid",
                    "encoder": "poofers",
                    "rows": [
                        [{ "board": 1, "relay": 1 }, { "board": 1, "relay": 2 }, { "board": 1, "relay": 3 }, { "board": 1, "relay": 4 }],
                        [{ "board": 2, "relay": 1 }, { "board": 2, "relay": 2 }, { "board": 2, "relay": 3 }, { "board": 2, "relay": 4 }],
                        [{ "board": 3, "relay": 1 }, { "board": 3, "relay": 2 }, { "board": 3, "relay": 3 }, { "board": 3, "relay": 4 }]
                    ]
                }
            },
            "bells": {
                "class": "hammer",
                "encoders": ["hammers"],
                "mapping": {
                    "layout": "table",
                    "entries": [
                        { "logical": 0, "encoder": "hammers", "physical": { "board": 7, "relay": 0 } },
                        { "logical": 1, "encoder": "hammers", "physical": { "board": 7, "relay": 1 } },
                        { "logical": 2, "encoder": "hammers", "physical": { "board": 7, "relay": 2 } }
                    ]
                }
            }
        }
    }"#;

    pub const ROWS: u16 = 3;
    pub const COLS: u16 = 4;

    /// Fixed output over a set of addresses
    pub struct Solid {
        pub cells: Vec<LogicalAddress>,
        pub on: bool,
    }

    impl Pattern for Solid {
        fn name(&self) -> &str {
            "Solid"
        }

        fn addresses(&self) -> Vec<LogicalAddress> {
            self.cells.clone()
        }

        fn render(&mut self, _now: Duration, _inputs: &InputSnapshot) -> PatternFrame {
            self.cells
                .iter()
                .map(|cell| (*cell, ItemState::Boolean(self.on)))
                .collect()
        }
    }

    pub fn solid(cells: Vec<LogicalAddress>, on: bool) -> Box<dyn Pattern> {
        Box::new(Solid { cells, on })
    }

    pub fn all_flames() -> Vec<LogicalAddress> {
        (0..ROWS)
            .flat_map(|row| (0..COLS).map(move |col| LogicalAddress::grid(row, col)))
            .collect()
    }

    pub fn all_bells() -> Vec<LogicalAddress> {
        (0..3).map(LogicalAddress::Index).collect()
    }

    pub fn manager() -> DataChannelManager {
        let config = SculptureConfig::from_json_str(CONFIG).unwrap();
        DataChannelManager::load(&config, PatternRegistry::new()).unwrap()
    }

    /// Decode the last frame a virtual channel received
    pub fn last_items(
        manager: &DataChannelManager,
        channel: &str,
        kind: EncoderKind,
    ) -> BTreeMap<PhysicalAddress, ItemState> {
        let bus = manager.virtual_bus(channel).unwrap();
        let frame = bus.last_frame().unwrap();
        parse_frame(kind, &frame).unwrap().into_iter().collect()
    }

    /// Physical address a flame grid cell is wired to
    pub fn flame(row: u16, col: u16) -> PhysicalAddress {
        PhysicalAddress::new(row + 1, col + 1)
    }
}

use helpers::*;

// ============================================================================
// Combination
// ============================================================================

#[test]
fn test_later_pattern_decides_shared_cell() {
    let mut manager = manager();
    manager
        .load_pattern("flames", solid(vec![LogicalAddress::grid(2, 3)], true))
        .unwrap();
    let second = manager
        .load_pattern("flames", solid(vec![LogicalAddress::grid(2, 3)], false))
        .unwrap();

    manager.tick();
    let items = last_items(&manager, "fire", EncoderKind::Poofer);
    assert_eq!(items.len(), (ROWS * COLS) as usize);
    assert_eq!(items[&flame(2, 3)], ItemState::Boolean(false));

    // Removing the later pattern hands the cell back to the first
    manager.clear_pattern("flames", second).unwrap();
    manager.tick();
    let items = last_items(&manager, "fire", EncoderKind::Poofer);
    assert_eq!(items[&flame(2, 3)], ItemState::Boolean(true));
    assert_eq!(items[&flame(0, 0)], ItemState::Boolean(false));
}

#[test]
fn test_every_mapped_item_is_sent_every_tick() {
    let mut manager = manager();
    manager
        .load_pattern("bells", solid(vec![LogicalAddress::Index(1)], true))
        .unwrap();

    for _ in 0..3 {
        manager.tick();
    }

    let bus = manager.virtual_bus("strike").unwrap();
    assert_eq!(bus.frame_count(), 3);
    let items = last_items(&manager, "strike", EncoderKind::Relay);
    assert_eq!(items.len(), 3);
    assert_eq!(items[&PhysicalAddress::new(7, 0)], ItemState::Boolean(false));
    assert_eq!(items[&PhysicalAddress::new(7, 1)], ItemState::Boolean(true));
}

// ============================================================================
// Safe mode
// ============================================================================

#[test]
fn test_safe_mode_mid_run_silences_every_channel() {
    let mut manager = manager();
    manager.load_pattern("flames", solid(all_flames(), true)).unwrap();
    manager.load_pattern("bells", solid(all_bells(), true)).unwrap();

    manager.tick();
    assert!(last_items(&manager, "fire", EncoderKind::Poofer)
        .values()
        .all(ItemState::is_active));
    assert!(last_items(&manager, "strike", EncoderKind::Relay)
        .values()
        .all(ItemState::is_active));

    // The toggle itself re-sends; no further tick is needed
    manager.toggle_safe_mode();
    for (channel, kind) in [("fire", EncoderKind::Poofer), ("strike", EncoderKind::Relay)] {
        let items = last_items(&manager, channel, kind);
        assert!(!items.is_empty());
        assert!(items.values().all(|state| !state.is_active()), "{} still active", channel);
    }

    // The module's own output is unchanged; only the wire is suppressed
    assert!(manager.output("flames").unwrap().values().all(ItemState::is_active));

    manager.tick();
    assert!(last_items(&manager, "fire", EncoderKind::Poofer)
        .values()
        .all(|state| !state.is_active()));

    manager.toggle_safe_mode();
    assert!(last_items(&manager, "fire", EncoderKind::Poofer)
        .values()
        .all(ItemState::is_active));
}

// ============================================================================
// Channel failures
// ============================================================================

#[test]
fn test_failed_channel_does_not_block_others() {
    let mut manager = manager();
    manager.load_pattern("flames", solid(all_flames(), true)).unwrap();

    let strike = manager.virtual_bus("strike").unwrap();
    let fire = manager.virtual_bus("fire").unwrap();
    strike.set_online(false);

    let reports = manager.tick();
    let bells = reports.iter().find(|r| r.module == "bells").unwrap();
    let flames = reports.iter().find(|r| r.module == "flames").unwrap();
    assert!(!bells.all_sent());
    assert!(flames.all_sent());
    assert_eq!(fire.frame_count(), 1);
    assert_eq!(strike.frame_count(), 0);

    // A failed channel refuses further frames until it is reconnected
    manager.tick();
    assert_eq!(fire.frame_count(), 2);
    assert_eq!(strike.frame_count(), 0);

    strike.set_online(true);
    let retried = manager.reconnect_failed();
    assert_eq!(retried.len(), 1);
    assert_eq!(retried[0].0, "strike");
    assert!(retried[0].1.is_ok());

    manager.tick();
    assert_eq!(strike.frame_count(), 1);
}

#[test]
fn test_shutdown_is_idempotent_and_final() {
    let mut manager = manager();
    manager.tick();
    let fire = manager.virtual_bus("fire").unwrap();
    assert_eq!(fire.frame_count(), 1);

    manager.shutdown();
    manager.shutdown();

    assert!(manager.tick().is_empty());
    assert!(manager.reconnect_failed().is_empty());
    assert_eq!(fire.frame_count(), 1);
}

// ============================================================================
// Property Tests
// ============================================================================

mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Op {
        Load { cells: Vec<(u16, u16)>, on: bool },
        Clear(usize),
        ToggleSafe,
        Tick,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => (prop::collection::vec((0..ROWS, 0..COLS), 1..6), any::<bool>())
                .prop_map(|(cells, on)| Op::Load { cells, on }),
            1 => (0usize..8).prop_map(Op::Clear),
            1 => Just(Op::ToggleSafe),
            2 => Just(Op::Tick),
        ]
    }

    /// Expected on/off per grid cell from the loaded patterns, oldest first
    fn model(loaded: &[(Vec<(u16, u16)>, bool)]) -> BTreeMap<PhysicalAddress, bool> {
        let mut cells: BTreeMap<PhysicalAddress, bool> = (0..ROWS)
            .flat_map(|row| (0..COLS).map(move |col| (flame(row, col), false)))
            .collect();
        for (pattern_cells, on) in loaded {
            for (row, col) in pattern_cells {
                cells.insert(flame(*row, *col), *on);
            }
        }
        cells
    }

    proptest! {
        #[test]
        fn wire_matches_last_loaded_model(ops in prop::collection::vec(op(), 1..40)) {
            let mut manager = manager();
            let mut loaded = Vec::new();
            let mut ids = Vec::new();
            let mut safe = false;

            for op in ops {
                match op {
                    Op::Load { cells, on } => {
                        let addresses = cells
                            .iter()
                            .map(|(row, col)| LogicalAddress::grid(*row, *col))
                            .collect();
                        let id = manager.load_pattern("flames", solid(addresses, on)).unwrap();
                        loaded.push((cells, on));
                        ids.push(id);
                    }
                    Op::Clear(index) => {
                        if index < ids.len() {
                            manager.clear_pattern("flames", ids.remove(index)).unwrap();
                            loaded.remove(index);
                        }
                    }
                    Op::ToggleSafe => {
                        manager.toggle_safe_mode();
                        safe = !safe;
                    }
                    Op::Tick => {
                        manager.tick();
                    }
                }
            }

            manager.tick();
            let items = last_items(&manager, "fire", EncoderKind::Poofer);
            let expected = model(&loaded);
            prop_assert_eq!(items.len(), expected.len());
            for (address, on) in expected {
                let want = on && !safe;
                prop_assert_eq!(items[&address], ItemState::Boolean(want));
            }
        }

        #[test]
        fn identical_histories_produce_identical_bytes(
            ops in prop::collection::vec(op(), 1..30)
        ) {
            let mut first = manager();
            let mut second = manager();

            for (step, op) in ops.into_iter().enumerate() {
                let now = Duration::from_millis(step as u64 * 50);
                for manager in [&mut first, &mut second] {
                    match &op {
                        Op::Load { cells, on } => {
                            let addresses = cells
                                .iter()
                                .map(|(row, col)| LogicalAddress::grid(*row, *col))
                                .collect();
                            manager.load_pattern("flames", solid(addresses, *on)).unwrap();
                        }
                        Op::Clear(_) => {}
                        Op::ToggleSafe => {
                            manager.toggle_safe_mode();
                        }
                        Op::Tick => {
                            manager.tick_at(now);
                        }
                    }
                }
            }

            let a = first.virtual_bus("fire").unwrap().frames();
            let b = second.virtual_bus("fire").unwrap().frames();
            prop_assert_eq!(a, b);
        }
    }
}
