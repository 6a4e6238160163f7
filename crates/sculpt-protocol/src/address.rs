//! Logical and physical addressing
//!
//! Patterns speak in logical coordinates (grid row/column or a flat index).
//! The wiring of a sculpture is described in physical coordinates: a board on
//! a bus and a relay (or output) on that board.

use std::fmt;

/// An item in the program's own coordinate space
///
/// Ordering is total so that combined state iterates in a stable order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum LogicalAddress {
    /// Row/column position on a grid
    Grid(u16, u16),
    /// Position in a flat list of items
    Index(u32),
}

impl LogicalAddress {
    /// Create a grid address
    pub fn grid(row: u16, col: u16) -> Self {
        Self::Grid(row, col)
    }

    /// Row of a grid address, `None` for flat indices
    pub fn row(&self) -> Option<u16> {
        match self {
            Self::Grid(row, _) => Some(*row),
            Self::Index(_) => None,
        }
    }
}

impl fmt::Display for LogicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Grid(row, col) => write!(f, "({}, {})", row, col),
            Self::Index(i) => write!(f, "#{}", i),
        }
    }
}

/// An actuator in the sculpture's wiring space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhysicalAddress {
    /// Controller board on the bus
    pub board: u16,
    /// Relay/output on the board
    pub relay: u16,
}

impl PhysicalAddress {
    /// Create a physical address
    pub fn new(board: u16, relay: u16) -> Self {
        Self { board, relay }
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.board, self.relay)
    }
}

/// A physical address plus the encoder binding that serves its bus
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Route {
    /// Encoder id the address is reached through
    pub encoder: String,
    /// Address on that encoder's bus
    pub address: PhysicalAddress,
}

impl Route {
    /// Create a route
    pub fn new(encoder: impl Into<String>, address: PhysicalAddress) -> Self {
        Self {
            encoder: encoder.into(),
            address,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_ordering_is_row_major() {
        let mut addrs = vec![
            LogicalAddress::grid(1, 0),
            LogicalAddress::grid(0, 2),
            LogicalAddress::grid(0, 1),
        ];
        addrs.sort();
        assert_eq!(
            addrs,
            vec![
                LogicalAddress::grid(0, 1),
                LogicalAddress::grid(0, 2),
                LogicalAddress::grid(1, 0),
            ]
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(LogicalAddress::grid(2, 3).to_string(), "(2, 3)");
        assert_eq!(LogicalAddress::Index(7).to_string(), "#7");
        assert_eq!(PhysicalAddress::new(1, 4).to_string(), "1/4");
    }

    #[test]
    fn test_row() {
        assert_eq!(LogicalAddress::grid(2, 3).row(), Some(2));
        assert_eq!(LogicalAddress::Index(3).row(), None);
    }
}
