//! ASCII Poofer Protocol Implementation
//!
//! Flame-effect controller boards listen on a shared serial bus and accept
//! short ASCII commands addressed by board number.
//!
//! # Command Format
//! ```text
//! ! B B r s [~ r s]* .
//! ```
//!
//! - `!`: start of command
//! - `BB`: two-digit decimal board address (00-99)
//! - `r`: relay digit on that board (0-9)
//! - `s`: `1` = open (fire), `0` = closed
//! - `~`: separates further relay/state pairs for the same board
//! - `.`: end of command
//!
//! Example: `!0131~40.` opens relay 3 and closes relay 4 on board 01.
//!
//! Poofers are hazardous: while safe mode is engaged every state digit is
//! forced to `0`.

use std::collections::BTreeMap;

use tracing::trace;

use crate::address::PhysicalAddress;
use crate::error::{EncodingError, ParseError};
use crate::safe_mode::SafeModeView;
use crate::state::ItemState;
use crate::{DroppedItem, EncodedFrame, Encoder, EncoderKind};

/// Start-of-command marker
pub const START: u8 = b'!';
/// End-of-command marker
pub const END: u8 = b'.';
/// Separator between relay/state pairs
pub const SEPARATOR: u8 = b'~';

/// Highest board address representable in two digits
pub const MAX_BOARD: u16 = 99;
/// Highest relay representable in one digit
pub const MAX_RELAY: u16 = 9;

/// Encoder for the ASCII poofer bus
#[derive(Debug, Clone)]
pub struct PooferEncoder {
    safe_mode: SafeModeView,
}

impl PooferEncoder {
    /// Create an encoder bound to the safe-mode flag
    pub fn new(safe_mode: SafeModeView) -> Self {
        Self { safe_mode }
    }

    /// State digit for an item, after the interlock
    fn state_digit(&self, state: &ItemState) -> Result<u8, EncodingError> {
        if self.safe_mode.is_active() {
            return Ok(b'0');
        }
        match state {
            ItemState::Boolean(true) => Ok(b'1'),
            ItemState::Boolean(false) => Ok(b'0'),
            other => Err(EncodingError::UnsupportedState {
                encoder: "poofer",
                state: other.domain(),
            }),
        }
    }

    fn relay_digit(relay: u16) -> u8 {
        b'0' + relay as u8
    }

    fn board_digits(board: u16) -> [u8; 2] {
        [b'0' + (board / 10) as u8, b'0' + (board % 10) as u8]
    }
}

impl Encoder for PooferEncoder {
    fn kind(&self) -> EncoderKind {
        EncoderKind::Poofer
    }

    fn check_address(&self, address: PhysicalAddress) -> Result<(), EncodingError> {
        if address.board > MAX_BOARD {
            return Err(EncodingError::AddressOutOfRange {
                encoder: "poofer",
                address,
                reason: "board must be 0-99",
            });
        }
        if address.relay > MAX_RELAY {
            return Err(EncodingError::AddressOutOfRange {
                encoder: "poofer",
                address,
                reason: "relay must be a single digit",
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
        let digit = self.state_digit(state)?;
        let [hi, lo] = Self::board_digits(address.board);
        Ok(vec![START, hi, lo, Self::relay_digit(address.relay), digit, END])
    }

    /// Batch items into one command per board
    fn format_frame(&self, items: &[(PhysicalAddress, ItemState)]) -> EncodedFrame {
        let mut frame = EncodedFrame::default();
        let mut boards: BTreeMap<u16, Vec<(u16, u8)>> = BTreeMap::new();

        for (address, state) in items {
            let digit = self
                .check_address(*address)
                .and_then(|_| self.state_digit(state));
            match digit {
                Ok(digit) => {
                    boards.entry(address.board).or_default().push((address.relay, digit));
                    frame.encoded += 1;
                }
                Err(error) => frame.dropped.push(DroppedItem {
                    address: *address,
                    state: *state,
                    error,
                }),
            }
        }

        for (board, relays) in boards {
            let [hi, lo] = Self::board_digits(board);
            frame.bytes.extend_from_slice(&[START, hi, lo]);
            for (i, (relay, digit)) in relays.into_iter().enumerate() {
                if i > 0 {
                    frame.bytes.push(SEPARATOR);
                }
                frame.bytes.push(Self::relay_digit(relay));
                frame.bytes.push(digit);
            }
            frame.bytes.push(END);
        }

        trace!("Poofer frame: {}", String::from_utf8_lossy(&frame.bytes));
        frame
    }
}

fn digit(byte: u8) -> Result<u16, ParseError> {
    if byte.is_ascii_digit() {
        Ok((byte - b'0') as u16)
    } else {
        Err(ParseError::InvalidFrame(format!(
            "expected digit, got 0x{:02X}",
            byte
        )))
    }
}

/// Parse one or more poofer commands into (address, on/off) items
pub fn parse_frame(data: &[u8]) -> Result<Vec<(PhysicalAddress, ItemState)>, ParseError> {
    let mut items = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        if data[pos] != START {
            return Err(ParseError::InvalidFrame(format!(
                "expected '!' at offset {}",
                pos
            )));
        }
        let end = data[pos..]
            .iter()
            .position(|&b| b == END)
            .map(|offset| pos + offset)
            .ok_or(ParseError::Incomplete { needed: 1 })?;

        let body = &data[pos + 1..end];
        if body.len() < 4 {
            return Err(ParseError::InvalidFrame(format!(
                "command too short: {}",
                String::from_utf8_lossy(&data[pos..=end])
            )));
        }
        let board = digit(body[0])? * 10 + digit(body[1])?;

        for pair in body[2..].split(|&b| b == SEPARATOR) {
            if pair.len() != 2 {
                return Err(ParseError::InvalidFrame(format!(
                    "bad relay pair: {}",
                    String::from_utf8_lossy(pair)
                )));
            }
            let relay = digit(pair[0])?;
            let on = match pair[1] {
                b'1' => true,
                b'0' => false,
                other => {
                    return Err(ParseError::InvalidFrame(format!(
                        "bad state digit 0x{:02X}",
                        other
                    )))
                }
            };
            items.push((PhysicalAddress::new(board, relay), ItemState::Boolean(on)));
        }

        pos = end + 1;
    }

    Ok(items)
}
