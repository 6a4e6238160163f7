//! Logical to physical address mapping
//!
//! A [`Mapping`] is built once from a declarative table and never changes
//! afterwards. Lookups for addresses missing from the table fail with
//! [`UnmappedAddress`]; callers are expected to validate every address they
//! can produce up front (see [`Mapping::validate`]) so that a missing entry is
//! a load-time error rather than something discovered mid-run.
//!
//! The table is not assumed injective: one logical address may fan out to
//! several physical routes, and several logical addresses may share one.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::address::{LogicalAddress, PhysicalAddress, Route};
use crate::error::{MappingError, UnmappedAddress};

/// One row of a declarative mapping table
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MappingEntry {
    /// Program-side address
    pub logical: LogicalAddress,
    /// Encoder serving the physical bus
    pub encoder: String,
    /// Wiring-side address on that bus
    pub physical: PhysicalAddress,
}

impl MappingEntry {
    /// Create an entry
    pub fn new(
        logical: LogicalAddress,
        encoder: impl Into<String>,
        physical: PhysicalAddress,
    ) -> Self {
        Self {
            logical,
            encoder: encoder.into(),
            physical,
        }
    }
}

/// Row and column counts of the grid part of a mapping
///
/// Counts are one past the largest coordinate, so they are wider than the
/// `u16` coordinates themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GridSize {
    pub rows: u32,
    pub cols: u32,
}

/// Immutable bidirectional address table
#[derive(Debug, Clone)]
pub struct Mapping {
    forward: BTreeMap<LogicalAddress, Vec<Route>>,
    reverse: HashMap<Route, Vec<LogicalAddress>>,
}

impl Mapping {
    /// Build a mapping from explicit entries
    pub fn from_entries(
        entries: impl IntoIterator<Item = MappingEntry>,
    ) -> Result<Self, MappingError> {
        let mut forward: BTreeMap<LogicalAddress, Vec<Route>> = BTreeMap::new();
        let mut reverse: HashMap<Route, Vec<LogicalAddress>> = HashMap::new();

        for entry in entries {
            let route = Route::new(entry.encoder, entry.physical);
            let routes = forward.entry(entry.logical).or_default();
            if routes.contains(&route) {
                return Err(MappingError::DuplicateRoute {
                    logical: entry.logical,
                    physical: route.address,
                    encoder: route.encoder,
                });
            }
            routes.push(route.clone());
            reverse.entry(route).or_default().push(entry.logical);
        }

        if forward.is_empty() {
            return Err(MappingError::Empty);
        }

        Ok(Self { forward, reverse })
    }

    /// Build a mapping from rows of physical addresses on a single encoder
    ///
    /// `rows[r][c]` becomes the target of logical address `(r, c)`.
    pub fn grid(encoder: &str, rows: &[Vec<PhysicalAddress>]) -> Result<Self, MappingError> {
        let entries = rows.iter().enumerate().flat_map(|(r, row)| {
            row.iter().enumerate().map(move |(c, physical)| {
                MappingEntry::new(LogicalAddress::grid(r as u16, c as u16), encoder, *physical)
            })
        });
        Self::from_entries(entries)
    }

    /// Resolve a logical address to its primary physical address
    pub fn resolve(&self, logical: &LogicalAddress) -> Result<PhysicalAddress, UnmappedAddress> {
        self.routes(logical).map(|routes| routes[0].address)
    }

    /// All routes a logical address drives
    pub fn routes(&self, logical: &LogicalAddress) -> Result<&[Route], UnmappedAddress> {
        self.forward
            .get(logical)
            .map(Vec::as_slice)
            .ok_or(UnmappedAddress(*logical))
    }

    /// Logical addresses that drive a given physical address on an encoder
    pub fn logical_for(&self, encoder: &str, physical: PhysicalAddress) -> &[LogicalAddress] {
        self.reverse
            .get(&Route::new(encoder, physical))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Check that every address resolves
    pub fn validate<'a>(
        &self,
        addresses: impl IntoIterator<Item = &'a LogicalAddress>,
    ) -> Result<(), UnmappedAddress> {
        for address in addresses {
            if !self.forward.contains_key(address) {
                return Err(UnmappedAddress(*address));
            }
        }
        Ok(())
    }

    /// Whether a logical address has an entry
    pub fn contains(&self, logical: &LogicalAddress) -> bool {
        self.forward.contains_key(logical)
    }

    /// Every mapped logical address, in order
    pub fn addresses(&self) -> impl Iterator<Item = &LogicalAddress> {
        self.forward.keys()
    }

    /// Every (logical, route) pair, in logical order
    pub fn iter(&self) -> impl Iterator<Item = (&LogicalAddress, &Route)> {
        self.forward
            .iter()
            .flat_map(|(logical, routes)| routes.iter().map(move |route| (logical, route)))
    }

    /// Encoder ids referenced by the table
    pub fn encoders(&self) -> BTreeSet<&str> {
        self.reverse.keys().map(|route| route.encoder.as_str()).collect()
    }

    /// Number of mapped logical addresses
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// Whether the table is empty (never true for a built mapping)
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Extent of the grid addresses in the table
    pub fn grid_size(&self) -> GridSize {
        self.forward
            .keys()
            .fold(GridSize::default(), |size, address| match address {
                LogicalAddress::Grid(row, col) => GridSize {
                    rows: size.rows.max(u32::from(*row) + 1),
                    cols: size.cols.max(u32::from(*col) + 1),
                },
                LogicalAddress::Index(_) => size,
            })
    }
}
