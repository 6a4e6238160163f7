//! Binary Relay Protocol Implementation
//!
//! Hammer and solenoid boards use fixed-width binary frames, one per relay.
//!
//! # Frame Format
//! ```text
//! [0x55] [BOARD] [RELAY] [STATE] [CHECKSUM]
//! ```
//!
//! - Byte 0: sync byte `0x55`
//! - Byte 1: board address
//! - Byte 2: relay number
//! - Byte 3: `0x01` = energize, `0x00` = release
//! - Byte 4: wrapping sum of bytes 1-3
//!
//! Relays are hazardous: while safe mode is engaged every state byte is
//! `0x00`.

use crate::address::PhysicalAddress;
use crate::error::{EncodingError, ParseError};
use crate::safe_mode::SafeModeView;
use crate::state::ItemState;
use crate::{Encoder, EncoderKind};

/// Frame sync byte
pub const SYNC: u8 = 0x55;
/// Length of one frame
pub const FRAME_LEN: usize = 5;

/// Relay energized
pub const STATE_ON: u8 = 0x01;
/// Relay released
pub const STATE_OFF: u8 = 0x00;

/// Checksum over the payload bytes of a frame
pub fn checksum(board: u8, relay: u8, state: u8) -> u8 {
    board.wrapping_add(relay).wrapping_add(state)
}

/// Encoder for the binary relay bus
#[derive(Debug, Clone)]
pub struct RelayEncoder {
    safe_mode: SafeModeView,
}

impl RelayEncoder {
    /// Create an encoder bound to the safe-mode flag
    pub fn new(safe_mode: SafeModeView) -> Self {
        Self { safe_mode }
    }
}

impl Encoder for RelayEncoder {
    fn kind(&self) -> EncoderKind {
        EncoderKind::Relay
    }

    fn check_address(&self, address: PhysicalAddress) -> Result<(), EncodingError> {
        if address.board > u8::MAX as u16 || address.relay > u8::MAX as u16 {
            return Err(EncodingError::AddressOutOfRange {
                encoder: "relay",
                address,
                reason: "board and relay must fit in one byte",
            });
        }
        Ok(())
    }

    fn format(
        &self,
        address: PhysicalAddress,
        state: &ItemState,
    ) -> Result<Vec<u8>, EncodingError> {
        self.check_address(address)?;

        let state = if self.safe_mode.is_active() {
            STATE_OFF
        } else {
            match state {
                ItemState::Boolean(true) => STATE_ON,
                ItemState::Boolean(false) => STATE_OFF,
                other => {
                    return Err(EncodingError::UnsupportedState {
                        encoder: "relay",
                        state: other.domain(),
                    })
                }
            }
        };

        let board = address.board as u8;
        let relay = address.relay as u8;
        Ok(vec![SYNC, board, relay, state, checksum(board, relay, state)])
    }
}

/// Parse a run of relay frames into (address, on/off) items
pub fn parse_frame(data: &[u8]) -> Result<Vec<(PhysicalAddress, ItemState)>, ParseError> {
    let remainder = data.len() % FRAME_LEN;
    if remainder != 0 {
        return Err(ParseError::Incomplete {
            needed: FRAME_LEN - remainder,
        });
    }

    data.chunks_exact(FRAME_LEN)
        .map(|chunk| {
            if chunk[0] != SYNC {
                return Err(ParseError::InvalidFrame(format!(
                    "bad sync byte 0x{:02X}",
                    chunk[0]
                )));
            }
            let expected = checksum(chunk[1], chunk[2], chunk[3]);
            if chunk[4] != expected {
                return Err(ParseError::ChecksumMismatch {
                    expected,
                    actual: chunk[4],
                });
            }
            let on = match chunk[3] {
                STATE_ON => true,
                STATE_OFF => false,
                other => {
                    return Err(ParseError::InvalidFrame(format!(
                        "bad state byte 0x{:02X}",
                        other
                    )))
                }
            };
            Ok((
                PhysicalAddress::new(chunk[1] as u16, chunk[2] as u16),
                ItemState::Boolean(on),
            ))
        })
        .collect()
}
