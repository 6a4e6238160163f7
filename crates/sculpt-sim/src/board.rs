//! Simulated controller boards
//!
//! Stands in for a bus of boards of one encoder kind. Frames are decoded with
//! the protocol crate's parsers and the last state of every address is kept,
//! so tests and the dry-run console can see what the hardware would be doing.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use sculpt_link::VirtualBus;
use sculpt_protocol::{parse_frame, EncoderKind, ItemState, ParseError, PhysicalAddress};
use tracing::{trace, warn};

/// Simulated bus of controller boards
#[derive(Debug, Clone)]
pub struct SimulatedBoards {
    kind: EncoderKind,
    items: BTreeMap<PhysicalAddress, ItemState>,
    frames_applied: usize,
    frames_rejected: usize,
}

impl SimulatedBoards {
    pub fn new(kind: EncoderKind) -> Self {
        Self {
            kind,
            items: BTreeMap::new(),
            frames_applied: 0,
            frames_rejected: 0,
        }
    }

    pub fn kind(&self) -> EncoderKind {
        self.kind
    }

    /// Apply one frame; returns the number of items it carried
    ///
    /// A malformed frame changes nothing, like a board discarding a garbled
    /// command.
    pub fn feed(&mut self, frame: &[u8]) -> Result<usize, ParseError> {
        match parse_frame(self.kind, frame) {
            Ok(items) => {
                trace!("{} boards: {} item(s)", self.kind.name(), items.len());
                let count = items.len();
                self.items.extend(items);
                self.frames_applied += 1;
                Ok(count)
            }
            Err(e) => {
                warn!("{} boards rejected frame: {}", self.kind.name(), e);
                self.frames_rejected += 1;
                Err(e)
            }
        }
    }

    /// Apply every frame waiting on a virtual bus; returns frames applied
    pub fn drain(&mut self, bus: &VirtualBus) -> usize {
        bus.take_frames()
            .iter()
            .filter(|frame| self.feed(frame).is_ok())
            .count()
    }

    /// Last state an address received
    pub fn state(&self, address: PhysicalAddress) -> Option<ItemState> {
        self.items.get(&address).copied()
    }

    pub fn items(&self) -> &BTreeMap<PhysicalAddress, ItemState> {
        &self.items
    }

    /// Addresses currently actuated
    pub fn active(&self) -> Vec<PhysicalAddress> {
        self.items
            .iter()
            .filter(|(_, state)| state.is_active())
            .map(|(address, _)| *address)
            .collect()
    }

    pub fn any_active(&self) -> bool {
        self.items.values().any(ItemState::is_active)
    }

    pub fn frames_applied(&self) -> usize {
        self.frames_applied
    }

    pub fn frames_rejected(&self) -> usize {
        self.frames_rejected
    }

    /// One line per board, e.g. `board 01: 1=on 2=off`
    pub fn summary(&self) -> Vec<String> {
        let mut lines: Vec<String> = Vec::new();
        let mut current = None;
        for (address, state) in &self.items {
            if current != Some(address.board) {
                current = Some(address.board);
                lines.push(format!("board {:02}:", address.board));
            }
            if let Some(line) = lines.last_mut() {
                let _ = write!(line, " {}={}", address.relay, state);
            }
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sculpt_protocol::{create_encoder, EncoderSettings, SafeMode};

    #[test]
    fn test_poofer_frames_update_state() {
        let mut boards = SimulatedBoards::new(EncoderKind::Poofer);
        assert_eq!(boards.feed(b"!0111~20.!0231.").unwrap(), 3);

        assert_eq!(
            boards.state(PhysicalAddress::new(1, 1)),
            Some(ItemState::Boolean(true))
        );
        assert_eq!(
            boards.state(PhysicalAddress::new(1, 2)),
            Some(ItemState::Boolean(false))
        );
        assert_eq!(
            boards.active(),
            vec![PhysicalAddress::new(1, 1), PhysicalAddress::new(2, 3)]
        );

        boards.feed(b"!0110~20.!0230.").unwrap();
        assert!(!boards.any_active());
        assert_eq!(boards.frames_applied(), 2);
    }

    #[test]
    fn test_garbled_frame_is_ignored() {
        let mut boards = SimulatedBoards::new(EncoderKind::Poofer);
        boards.feed(b"!0111.").unwrap();
        assert!(boards.feed(b"!01x1.").is_err());
        assert_eq!(boards.frames_rejected(), 1);
        assert!(boards.any_active());
    }

    #[test]
    fn test_relay_frames_from_encoder() {
        let safe = SafeMode::new();
        let encoder = create_encoder(&EncoderSettings::Relay, safe.view());
        let frame = encoder.format_frame(&[
            (PhysicalAddress::new(4, 0), ItemState::Boolean(true)),
            (PhysicalAddress::new(4, 1), ItemState::Boolean(false)),
        ]);

        let mut boards = SimulatedBoards::new(EncoderKind::Relay);
        assert_eq!(boards.feed(&frame.bytes).unwrap(), 2);
        assert_eq!(boards.active(), vec![PhysicalAddress::new(4, 0)]);
    }

    #[test]
    fn test_drain_virtual_bus() {
        let bus = VirtualBus::new();
        let mut boards = SimulatedBoards::new(EncoderKind::Poofer);
        assert_eq!(boards.drain(&bus), 0);
        assert!(boards.items().is_empty());
    }

    #[test]
    fn test_summary_groups_by_board() {
        let mut boards = SimulatedBoards::new(EncoderKind::Poofer);
        boards.feed(b"!0111~20.!0231.").unwrap();
        assert_eq!(boards.summary(), vec!["board 01: 1=on 2=off", "board 02: 3=on"]);
    }
}
