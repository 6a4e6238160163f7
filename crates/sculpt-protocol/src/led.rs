//! Binary LED Protocol Implementation
//!
//! RGB light controllers take one 6-byte frame per output.
//!
//! # Frame Format
//! ```text
//! [0x7E] [BOARD] [OUTPUT] [R] [G] [B]
//! ```
//!
//! The encoder accepts three state domains:
//! - `Color`: sent as-is
//! - `Intensity`: the configured tint scaled by the level (0.0-1.0)
//! - `PaletteIndex`: looked up in the configured palette
//!
//! Lights are not hazardous and ignore safe mode.

use crate::address::PhysicalAddress;
use crate::error::{EncodingError, ParseError};
use crate::state::{ItemState, Rgb};
use crate::{Encoder, EncoderKind};

/// Frame start byte
pub const START: u8 = 0x7E;
/// Length of one frame
pub const FRAME_LEN: usize = 6;

/// Palette used when none is configured
pub const DEFAULT_PALETTE: [Rgb; 8] = [
    Rgb::BLACK,
    Rgb::new(255, 0, 0),
    Rgb::new(0, 255, 0),
    Rgb::new(0, 0, 255),
    Rgb::new(255, 255, 0),
    Rgb::new(0, 255, 255),
    Rgb::new(255, 0, 255),
    Rgb::WHITE,
];

/// Device options for LED controllers
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LedOptions {
    /// Colours addressed by palette index
    pub palette: Vec<Rgb>,
    /// Colour an intensity value is applied to
    pub tint: Rgb,
}

impl Default for LedOptions {
    fn default() -> Self {
        Self {
            palette: DEFAULT_PALETTE.to_vec(),
            tint: Rgb::WHITE,
        }
    }
}

/// Encoder for RGB light controllers
#[derive(Debug, Clone)]
pub struct LedEncoder {
    options: LedOptions,
}

impl LedEncoder {
    /// Create an encoder with the given options
    pub fn new(options: LedOptions) -> Self {
        Self { options }
    }

    /// Resolve any supported state to a colour
    pub fn color_for(&self, state: &ItemState) -> Result<Rgb, EncodingError> {
        match state {
            ItemState::Color(rgb) => Ok(*rgb),
            ItemState::Intensity(level) => {
                if !(0.0..=1.0).contains(level) {
                    return Err(EncodingError::IntensityOutOfRange(*level));
                }
                Ok(self.options.tint.scaled(*level))
            }
            ItemState::PaletteIndex(index) => self
                .options
                .palette
                .get(*index as usize)
                .copied()
                .ok_or(EncodingError::UnknownPaletteIndex {
                    index: *index,
                    size: self.options.palette.len(),
                }),
            ItemState::Boolean(_) => Err(EncodingError::UnsupportedState {
                encoder: "led",
                state: state.domain(),
            }),
        }
    }
}

impl Encoder for LedEncoder {
    fn kind(&self) -> EncoderKind {
        EncoderKind::Led
    }

    fn check_address(&self, address: PhysicalAddress) -> Result<(), EncodingError> {
        if address.board > u8::MAX as u16 || address.relay > u8::MAX as u16 {
            return Err(EncodingError::AddressOutOfRange {
                encoder: "led",
                address,
                reason: "board and output must fit in one byte",
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
        let rgb = self.color_for(state)?;
        Ok(vec![
            START,
            address.board as u8,
            address.relay as u8,
            rgb.r,
            rgb.g,
            rgb.b,
        ])
    }
}

/// Parse a run of LED frames into (address, colour) items
pub fn parse_frame(data: &[u8]) -> Result<Vec<(PhysicalAddress, ItemState)>, ParseError> {
    let remainder = data.len() % FRAME_LEN;
    if remainder != 0 {
        return Err(ParseError::Incomplete {
            needed: FRAME_LEN - remainder,
        });
    }

    data.chunks_exact(FRAME_LEN)
        .map(|chunk| {
            if chunk[0] != START {
                return Err(ParseError::InvalidFrame(format!(
                    "bad start byte 0x{:02X}",
                    chunk[0]
                )));
            }
            Ok((
                PhysicalAddress::new(chunk[1] as u16, chunk[2] as u16),
                ItemState::Color(Rgb::new(chunk[3], chunk[4], chunk[5])),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoder() -> LedEncoder {
        LedEncoder::new(LedOptions::default())
    }

    #[test]
    fn test_color_passthrough() {
        let bytes = encoder()
            .format(PhysicalAddress::new(3, 7), &ItemState::Color(Rgb::new(1, 2, 3)))
            .unwrap();
        assert_eq!(bytes, vec![0x7E, 3, 7, 1, 2, 3]);
    }

    #[test]
    fn test_intensity_uses_tint() {
        let led = LedEncoder::new(LedOptions {
            tint: Rgb::new(200, 100, 0),
            ..Default::default()
        });
        assert_eq!(
            led.color_for(&ItemState::Intensity(0.5)).unwrap(),
            Rgb::new(100, 50, 0)
        );
    }

    #[test]
    fn test_intensity_out_of_range() {
        assert_eq!(
            encoder().color_for(&ItemState::Intensity(1.5)),
            Err(EncodingError::IntensityOutOfRange(1.5))
        );
        assert!(encoder().color_for(&ItemState::Intensity(f32::NAN)).is_err());
    }

    #[test]
    fn test_palette_lookup() {
        assert_eq!(
            encoder().color_for(&ItemState::PaletteIndex(1)).unwrap(),
            Rgb::new(255, 0, 0)
        );
        assert_eq!(
            encoder().color_for(&ItemState::PaletteIndex(8)),
            Err(EncodingError::UnknownPaletteIndex { index: 8, size: 8 })
        );
    }

    #[test]
    fn test_boolean_unsupported() {
        assert!(matches!(
            encoder().format(PhysicalAddress::new(1, 1), &ItemState::Boolean(true)),
            Err(EncodingError::UnsupportedState { encoder: "led", .. })
        ));
    }

    #[test]
    fn test_parse() {
        let items = parse_frame(&[0x7E, 1, 2, 10, 20, 30]).unwrap();
        assert_eq!(
            items,
            vec![(
                PhysicalAddress::new(1, 2),
                ItemState::Color(Rgb::new(10, 20, 30))
            )]
        );
        assert_eq!(
            parse_frame(&[0x7E, 1]),
            Err(ParseError::Incomplete { needed: 4 })
        );
    }
}
