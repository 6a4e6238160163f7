//! Error types for addressing, encoding and frame parsing

use thiserror::Error;

use crate::address::{LogicalAddress, PhysicalAddress};

/// A logical address has no entry in the module's mapping
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unmapped address: {0}")]
pub struct UnmappedAddress(pub LogicalAddress);

/// Errors raised while building a mapping table
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MappingError {
    /// A lookup found no entry
    #[error(transparent)]
    Unmapped(#[from] UnmappedAddress),

    /// The same logical/physical pair was declared twice on one encoder
    #[error("duplicate route {logical} -> {physical} on encoder '{encoder}'")]
    DuplicateRoute {
        logical: LogicalAddress,
        physical: PhysicalAddress,
        encoder: String,
    },

    /// The table has no entries at all
    #[error("mapping table is empty")]
    Empty,
}

/// Errors that can occur while encoding a single item
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EncodingError {
    /// Intensity outside of 0.0..=1.0 (or not a number)
    #[error("intensity out of range: {0}")]
    IntensityOutOfRange(f32),

    /// Palette index beyond the configured palette
    #[error("unknown palette index {index} (palette has {size} entries)")]
    UnknownPaletteIndex { index: u8, size: usize },

    /// The encoder has no representation for this kind of state
    #[error("{encoder} encoder cannot encode {state} state")]
    UnsupportedState {
        encoder: &'static str,
        state: &'static str,
    },

    /// The physical address cannot be expressed on this bus
    #[error("address {address} out of range for {encoder} encoder: {reason}")]
    AddressOutOfRange {
        encoder: &'static str,
        address: PhysicalAddress,
        reason: &'static str,
    },
}

/// Errors that can occur while parsing a wire frame back into items
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Buffer is incomplete - need more data
    #[error("incomplete data: need {needed} more bytes")]
    Incomplete { needed: usize },

    /// Invalid frame structure
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// Checksum mismatch
    #[error("checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },
}
