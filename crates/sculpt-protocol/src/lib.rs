//! Sculpture Actuator Protocol Library
//!
//! This crate provides the leaf pieces of the sculpture control pipeline:
//!
//! - **Addressing**: logical (row/column or index) and physical (board/relay)
//!   coordinates, and the immutable [`Mapping`] between them
//! - **State**: per-item [`ItemState`] values and the [`ActuatorClass`] that
//!   fixes how overlapping pattern outputs combine
//! - **Safe mode**: the process-wide [`SafeMode`] interlock flag
//! - **Encoders**: translators from (physical address, state) to the bytes a
//!   controller board understands
//!
//! # Encoders
//!
//! Each wire format lives in its own module and provides:
//! - An [`Encoder`] implementation producing device-native frames
//! - A frame parser turning those bytes back into items (used by simulated
//!   boards and tests)
//!
//! | variant | format | hazardous |
//! |---|---|---|
//! | [`poofer`] | ASCII `!BBrs~rs.` relay commands | yes |
//! | [`relay`] | 5-byte binary frames with checksum | yes |
//! | [`led`] | 6-byte binary RGB frames | no |
//!
//! Hazardous encoders read the safe-mode flag on every call and emit the
//! "off" encoding while it is set, whatever state they were asked for. The
//! check lives inside the encoder so no upstream component can bypass it.
//!
//! # Example
//!
//! ```rust
//! use sculpt_protocol::{create_encoder, EncoderSettings, ItemState, PhysicalAddress, SafeMode};
//!
//! let safe = SafeMode::new();
//! let encoder = create_encoder(&EncoderSettings::Poofer, safe.view());
//!
//! let on = encoder.format(PhysicalAddress::new(1, 3), &ItemState::Boolean(true)).unwrap();
//! assert_eq!(on, b"!0131.");
//!
//! safe.toggle();
//! let suppressed = encoder.format(PhysicalAddress::new(1, 3), &ItemState::Boolean(true)).unwrap();
//! assert_eq!(suppressed, b"!0130.");
//! ```

pub mod address;
pub mod error;
pub mod led;
pub mod mapping;
pub mod poofer;
pub mod relay;
pub mod safe_mode;
pub mod state;

pub use address::{LogicalAddress, PhysicalAddress, Route};
pub use error::{EncodingError, MappingError, ParseError, UnmappedAddress};
pub use mapping::{GridSize, Mapping, MappingEntry};
pub use safe_mode::{SafeMode, SafeModeView};
pub use state::{ActuatorClass, CombineRule, ItemState, Rgb};

/// Identifies which wire format an encoder speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum EncoderKind {
    /// ASCII relay boards driving flame effects
    Poofer,
    /// Binary relay boards (hammers, solenoids)
    Relay,
    /// Binary RGB light controllers
    Led,
}

impl EncoderKind {
    /// Returns a human-readable name for the encoder
    pub fn name(&self) -> &'static str {
        match self {
            EncoderKind::Poofer => "poofer",
            EncoderKind::Relay => "relay",
            EncoderKind::Led => "led",
        }
    }

    /// Whether this encoder enforces the safe-mode interlock
    pub fn is_hazardous(&self) -> bool {
        matches!(self, EncoderKind::Poofer | EncoderKind::Relay)
    }

    /// Whether this encoder can carry the given actuator class
    pub fn supports(&self, class: ActuatorClass) -> bool {
        match self {
            EncoderKind::Poofer | EncoderKind::Relay => {
                matches!(class, ActuatorClass::Poofer | ActuatorClass::Hammer)
            }
            EncoderKind::Led => matches!(
                class,
                ActuatorClass::Dimmer | ActuatorClass::Led | ActuatorClass::Palette
            ),
        }
    }
}

/// Encoder variant plus its device-specific options
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "lowercase"))]
pub enum EncoderSettings {
    /// ASCII poofer protocol
    Poofer,
    /// Binary relay protocol
    Relay,
    /// Binary LED protocol
    Led(led::LedOptions),
}

impl EncoderSettings {
    /// The variant these settings describe
    pub fn kind(&self) -> EncoderKind {
        match self {
            EncoderSettings::Poofer => EncoderKind::Poofer,
            EncoderSettings::Relay => EncoderKind::Relay,
            EncoderSettings::Led(_) => EncoderKind::Led,
        }
    }
}

/// An item that could not be encoded and was left out of a frame
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedItem {
    /// Where the item was headed
    pub address: PhysicalAddress,
    /// What it asked for
    pub state: ItemState,
    /// Why it was dropped
    pub error: EncodingError,
}

/// Result of encoding a group of items for one transmission
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodedFrame {
    /// Bytes to put on the wire
    pub bytes: Vec<u8>,
    /// Number of items represented in `bytes`
    pub encoded: usize,
    /// Items that failed to encode
    pub dropped: Vec<DroppedItem>,
}

impl EncodedFrame {
    /// Whether there is anything to transmit
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Translator from (physical address, state) to device-native bytes
///
/// Implementations are stateless per call. A well-formed pair never fails;
/// malformed state (out-of-range intensity, unknown palette index, wrong
/// domain) returns [`EncodingError`].
pub trait Encoder: Send + Sync {
    /// The wire format this encoder speaks
    fn kind(&self) -> EncoderKind;

    /// Check that an address can be expressed on this bus at all
    fn check_address(&self, address: PhysicalAddress) -> Result<(), EncodingError>;

    /// Encode a single item
    fn format(
        &self,
        address: PhysicalAddress,
        state: &ItemState,
    ) -> Result<Vec<u8>, EncodingError>;

    /// Encode a group of items into one frame
    ///
    /// Items that fail to encode are reported in [`EncodedFrame::dropped`] and
    /// the rest of the frame is still produced.
    fn format_frame(&self, items: &[(PhysicalAddress, ItemState)]) -> EncodedFrame {
        let mut frame = EncodedFrame::default();
        for (address, state) in items {
            match self.format(*address, state) {
                Ok(bytes) => {
                    frame.bytes.extend_from_slice(&bytes);
                    frame.encoded += 1;
                }
                Err(error) => frame.dropped.push(DroppedItem {
                    address: *address,
                    state: *state,
                    error,
                }),
            }
        }
        frame
    }
}

/// Create an encoder for the given settings
///
/// Hazardous variants keep the safe-mode view and consult it on every call.
pub fn create_encoder(settings: &EncoderSettings, safe_mode: SafeModeView) -> Box<dyn Encoder> {
    match settings {
        EncoderSettings::Poofer => Box::new(poofer::PooferEncoder::new(safe_mode)),
        EncoderSettings::Relay => Box::new(relay::RelayEncoder::new(safe_mode)),
        EncoderSettings::Led(options) => Box::new(led::LedEncoder::new(options.clone())),
    }
}

/// Parse bytes produced by an encoder of the given kind back into items
pub fn parse_frame(
    kind: EncoderKind,
    data: &[u8],
) -> Result<Vec<(PhysicalAddress, ItemState)>, ParseError> {
    match kind {
        EncoderKind::Poofer => poofer::parse_frame(data),
        EncoderKind::Relay => relay::parse_frame(data),
        EncoderKind::Led => led::parse_frame(data),
    }
}
