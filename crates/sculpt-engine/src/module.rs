//! Sculpture modules
//!
//! A module is one group of actuators of a single class (the poofer grid, the
//! hammer row, the LED strips). It owns the pattern stack, the mapping and
//! its encoder bindings. Every tick it renders the patterns, merges their
//! output according to the class's combine rule, translates the result
//! through the mapping and sends one frame per binding.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use sculpt_protocol::{
    ActuatorClass, CombineRule, ItemState, LogicalAddress, Mapping, PhysicalAddress,
};
use tracing::{debug, info, trace};

use crate::binding::{Binding, Dispatch};
use crate::error::ControlError;
use crate::input::{InputCollection, InputId, InputManager, InputUser};
use crate::pattern::{ModuleLayout, Pattern, PatternId, PatternRegistry};

/// Authoritative per-address state of a module for one tick
pub type CombinedState = BTreeMap<LogicalAddress, ItemState>;

/// Load position of the last pattern that wrote each address
pub type Ranks = BTreeMap<LogicalAddress, usize>;

struct LoadedPattern {
    id: PatternId,
    pattern: Box<dyn Pattern>,
    addresses: BTreeSet<LogicalAddress>,
    inputs: InputCollection,
    rows: Vec<bool>,
}

impl LoadedPattern {
    fn row_enabled(&self, address: &LogicalAddress) -> bool {
        match address.row() {
            Some(row) => self.rows.get(row as usize).copied().unwrap_or(true),
            None => true,
        }
    }
}

/// Operator view of a loaded pattern
#[derive(Debug, Clone, PartialEq)]
pub struct PatternInfo {
    pub id: PatternId,
    pub name: String,
    /// Row selection, one flag per grid row
    pub rows: Vec<bool>,
    /// Parameter name to input binding
    pub inputs: InputCollection,
}

/// Result of one module tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub module: String,
    pub combined: CombinedState,
    /// One entry per binding that had items to send
    pub dispatches: Vec<Dispatch>,
}

impl TickReport {
    /// Whether every binding accepted its frame
    pub fn all_sent(&self) -> bool {
        self.dispatches.iter().all(|d| d.sent)
    }

    pub fn dropped(&self) -> usize {
        self.dispatches.iter().map(|d| d.dropped.len()).sum()
    }
}

/// One group of actuators sharing a class and a mapping
pub struct SculptureModule {
    id: String,
    layout: ModuleLayout,
    mapping: Arc<Mapping>,
    bindings: BTreeMap<String, Arc<Binding>>,
    available: Vec<String>,
    patterns: Vec<LoadedPattern>,
    next_pattern: u32,
    output: CombinedState,
}

impl std::fmt::Debug for SculptureModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SculptureModule")
            .field("id", &self.id)
            .field("class", &self.layout.class)
            .field("bindings", &self.bindings.keys().collect::<Vec<_>>())
            .field("patterns", &self.patterns.len())
            .finish()
    }
}

impl SculptureModule {
    /// Create a module with no patterns loaded
    ///
    /// Every encoder the mapping routes through must be present in
    /// `bindings`; the manager checks this before building modules.
    pub fn new(
        id: impl Into<String>,
        class: ActuatorClass,
        mapping: Arc<Mapping>,
        bindings: BTreeMap<String, Arc<Binding>>,
        available: Vec<String>,
    ) -> Self {
        let layout = ModuleLayout {
            class,
            grid: mapping.grid_size(),
            addresses: mapping.addresses().copied().collect(),
        };
        let output = layout
            .addresses
            .iter()
            .map(|address| (*address, class.rest_state()))
            .collect();
        Self {
            id: id.into(),
            layout,
            mapping,
            bindings,
            available,
            patterns: Vec::new(),
            next_pattern: 0,
            output,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn class(&self) -> ActuatorClass {
        self.layout.class
    }

    pub fn layout(&self) -> &ModuleLayout {
        &self.layout
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    pub fn bindings(&self) -> impl Iterator<Item = &Arc<Binding>> {
        self.bindings.values()
    }

    /// Pattern types that may be added to this module
    pub fn available_patterns(&self) -> &[String] {
        &self.available
    }

    /// State produced by the most recent tick
    pub fn output(&self) -> &CombinedState {
        &self.output
    }

    pub fn pattern_ids(&self) -> Vec<PatternId> {
        self.patterns.iter().map(|p| p.id).collect()
    }

    pub fn patterns(&self) -> Vec<PatternInfo> {
        self.patterns
            .iter()
            .map(|p| PatternInfo {
                id: p.id,
                name: p.pattern.name().to_string(),
                rows: p.rows.clone(),
                inputs: p.inputs.clone(),
            })
            .collect()
    }

    fn user(&self, id: PatternId) -> InputUser {
        InputUser::new(self.id.clone(), id)
    }

    fn loaded_mut(&mut self, id: PatternId) -> Result<&mut LoadedPattern, ControlError> {
        let module = &self.id;
        self.patterns
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| ControlError::UnknownPattern {
                module: module.clone(),
                id,
            })
    }

    /// Put a pattern on top of the stack
    ///
    /// Every address the pattern declares must be mapped; otherwise nothing
    /// is loaded. Inputs for the pattern's parameters are created in
    /// `inputs`.
    pub fn load_pattern(
        &mut self,
        pattern: Box<dyn Pattern>,
        inputs: &mut InputManager,
    ) -> Result<PatternId, ControlError> {
        let addresses: BTreeSet<LogicalAddress> = pattern.addresses().into_iter().collect();
        self.mapping
            .validate(&addresses)
            .map_err(|source| ControlError::Unmapped {
                module: self.id.clone(),
                pattern: pattern.name().to_string(),
                source,
            })?;

        let id = PatternId(self.next_pattern);
        self.next_pattern += 1;

        let collection = inputs.build_collection(&pattern.inputs(), &self.user(id));
        info!(
            "Module {}: loaded pattern {} '{}' ({} addresses)",
            self.id,
            id,
            pattern.name(),
            addresses.len()
        );

        self.patterns.push(LoadedPattern {
            id,
            pattern,
            addresses,
            inputs: collection,
            rows: vec![true; self.layout.grid.rows as usize],
        });
        Ok(id)
    }

    /// Instantiate a pattern type from the registry and load it
    pub fn add_pattern(
        &mut self,
        name: &str,
        registry: &PatternRegistry,
        inputs: &mut InputManager,
    ) -> Result<PatternId, ControlError> {
        if !self.available.iter().any(|n| n == name) {
            return Err(ControlError::PatternNotAllowed {
                module: self.id.clone(),
                name: name.to_string(),
            });
        }
        let pattern = registry
            .create(name, &self.layout)
            .ok_or_else(|| ControlError::UnknownPatternType(name.to_string()))?;
        self.load_pattern(pattern, inputs)
    }

    /// Remove a pattern; the next tick no longer includes it
    pub fn clear_pattern(
        &mut self,
        id: PatternId,
        inputs: &mut InputManager,
    ) -> Result<(), ControlError> {
        let pos = self
            .patterns
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| ControlError::UnknownPattern {
                module: self.id.clone(),
                id,
            })?;
        let removed = self.patterns.remove(pos);
        inputs.unregister(&self.user(id), None);
        info!(
            "Module {}: cleared pattern {} '{}'",
            self.id,
            id,
            removed.pattern.name()
        );
        Ok(())
    }

    /// Include or exclude one grid row of a pattern's output
    pub fn set_pattern_row(
        &mut self,
        id: PatternId,
        row: u16,
        enabled: bool,
    ) -> Result<(), ControlError> {
        let rows = self.layout.grid.rows;
        let loaded = self.loaded_mut(id)?;
        let flag = loaded
            .rows
            .get_mut(row as usize)
            .ok_or(ControlError::RowOutOfRange { row, rows })?;
        *flag = enabled;
        Ok(())
    }

    /// Flip one grid row of a pattern and return the new setting
    pub fn toggle_pattern_row(&mut self, id: PatternId, row: u16) -> Result<bool, ControlError> {
        let rows = self.layout.grid.rows;
        let loaded = self.loaded_mut(id)?;
        let flag = loaded
            .rows
            .get_mut(row as usize)
            .ok_or(ControlError::RowOutOfRange { row, rows })?;
        *flag = !*flag;
        Ok(*flag)
    }

    /// Connect a pattern parameter to an existing input
    pub fn bind_input(
        &mut self,
        id: PatternId,
        slot: &str,
        input: InputId,
        inputs: &mut InputManager,
    ) -> Result<(), ControlError> {
        let user = self.user(id);
        let loaded = self.loaded_mut(id)?;
        inputs.rebind(&user, &mut loaded.inputs, slot, input)?;
        debug!("Module {}: pattern {} '{}' now reads input {}", user.module, id, slot, input);
        Ok(())
    }

    /// Render and merge every pattern without transmitting
    ///
    /// Patterns are applied in load order. Addresses no pattern writes get
    /// the class's rest state, so the result always covers the whole mapping.
    pub fn combine(&mut self, now: Duration, inputs: &InputManager) -> CombinedState {
        self.merge(now, inputs).0
    }

    /// Combined state plus, per address, the load position of the last
    /// pattern that wrote it
    fn merge(&mut self, now: Duration, inputs: &InputManager) -> (CombinedState, Ranks) {
        let rule = self.layout.class.combine_rule();
        let mut merged: BTreeMap<LogicalAddress, ItemState> = BTreeMap::new();
        let mut ranks = Ranks::new();

        for (rank, loaded) in self.patterns.iter_mut().enumerate() {
            let snapshot = inputs.snapshot(&loaded.inputs);
            let frame = loaded.pattern.render(now, &snapshot);
            for (address, state) in frame {
                if !loaded.addresses.contains(&address) {
                    trace!(
                        "Pattern {} wrote undeclared address {}, ignored",
                        loaded.id,
                        address
                    );
                    continue;
                }
                if !loaded.row_enabled(&address) {
                    continue;
                }
                merged
                    .entry(address)
                    .and_modify(|current| *current = current.combine(state, rule))
                    .or_insert_with(|| state.clamped(rule));
                ranks.insert(address, rank);
            }
        }

        let rest = self.layout.class.rest_state();
        let combined = self
            .layout
            .addresses
            .iter()
            .map(|address| (*address, merged.get(address).copied().unwrap_or(rest)))
            .collect();
        (combined, ranks)
    }

    /// Translate combined state into per-binding item lists
    ///
    /// When several logical addresses land on the same physical address,
    /// additive classes sum them. Last-wins classes take the state from the
    /// most recently loaded pattern that wrote one of them; the rest state
    /// only applies when no pattern did.
    pub fn route(
        &self,
        combined: &CombinedState,
        ranks: &Ranks,
    ) -> BTreeMap<&str, Vec<(PhysicalAddress, ItemState)>> {
        let rule = self.layout.class.combine_rule();
        let mut grouped: BTreeMap<&str, BTreeMap<PhysicalAddress, (Option<usize>, ItemState)>> =
            BTreeMap::new();

        for (logical, state) in combined {
            let Ok(routes) = self.mapping.routes(logical) else {
                continue;
            };
            let rank = ranks.get(logical).copied();
            for route in routes {
                grouped
                    .entry(route.encoder.as_str())
                    .or_default()
                    .entry(route.address)
                    .and_modify(|(current_rank, current)| match rule {
                        CombineRule::Additive => *current = current.combine(*state, rule),
                        CombineRule::LastWins => {
                            if rank >= *current_rank {
                                *current_rank = rank;
                                *current = *state;
                            }
                        }
                    })
                    .or_insert((rank, *state));
            }
        }

        grouped
            .into_iter()
            .map(|(encoder, items)| {
                let items = items
                    .into_iter()
                    .map(|(address, (_, state))| (address, state))
                    .collect();
                (encoder, items)
            })
            .collect()
    }

    /// Combine, map and transmit one tick
    ///
    /// A binding whose channel refuses the frame does not stop the others.
    pub fn tick(&mut self, now: Duration, inputs: &InputManager) -> TickReport {
        let (combined, ranks) = self.merge(now, inputs);

        let dispatches = self
            .route(&combined, &ranks)
            .into_iter()
            .filter_map(|(encoder, items)| {
                self.bindings
                    .get(encoder)
                    .map(|binding| binding.dispatch(&items))
            })
            .collect();

        self.output = combined.clone();
        TickReport {
            module: self.id.clone(),
            combined,
            dispatches,
        }
    }
}
