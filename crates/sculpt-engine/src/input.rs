//! Inputs and signals
//!
//! Buttons, switches, knobs and timers all reach patterns as one of three
//! normalized signal kinds:
//!
//! - **pulse**: counts rising events (button presses, timer ticks)
//! - **toggle**: holds a boolean that triggers flip and switches set
//! - **value**: a number clamped into a declared range
//!
//! Patterns declare the inputs they want as [`InputParam`]s. When a pattern is
//! loaded the [`InputManager`] creates one input per parameter and records the
//! pattern as its user. Inputs can be shared by rebinding a parameter to an
//! existing input; a non-persistent input is removed as soon as its last user
//! goes away. Persistent inputs come from configuration (physical controls)
//! and live for the whole run.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::ControlError;
use crate::pattern::PatternId;

/// Identifier of an input instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InputId(pub u32);

impl fmt::Display for InputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalized signal kind
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalKind {
    Pulse,
    Toggle,
    Value { min: f32, max: f32 },
}

impl SignalKind {
    /// Returns a human-readable name for the kind
    pub fn name(&self) -> &'static str {
        match self {
            SignalKind::Pulse => "pulse",
            SignalKind::Toggle => "toggle",
            SignalKind::Value { .. } => "value",
        }
    }

    /// Reject value ranges that cannot be clamped into
    pub fn check(&self) -> Result<(), &'static str> {
        match *self {
            SignalKind::Value { min, max } if !min.is_finite() || !max.is_finite() => {
                Err("value bounds must be finite")
            }
            SignalKind::Value { min, max } if min > max => Err("value min exceeds max"),
            _ => Ok(()),
        }
    }

    fn initial(&self) -> SignalValue {
        match self {
            SignalKind::Pulse => SignalValue::Pulse(0),
            SignalKind::Toggle => SignalValue::Toggle(false),
            SignalKind::Value { min, .. } => SignalValue::Value(*min),
        }
    }
}

/// Clamp without `f32::clamp`'s panic on inverted or NaN bounds
fn clamp_to(n: f32, min: f32, max: f32) -> f32 {
    n.max(min).min(max)
}

/// Event from a heterogeneous source, before normalization
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawSignal {
    /// Momentary button press
    Press,
    /// Latching switch position
    Switch(bool),
    /// Knob, slider or sensor reading
    Number(f32),
    /// Periodic timer expiry
    Tick,
}

/// Current normalized value of an input
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalValue {
    /// Number of rising events seen so far
    Pulse(u64),
    Toggle(bool),
    Value(f32),
}

impl fmt::Display for SignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalValue::Pulse(count) => write!(f, "{} pulses", count),
            SignalValue::Toggle(on) => write!(f, "{}", if *on { "on" } else { "off" }),
            SignalValue::Value(v) => write!(f, "{:.3}", v),
        }
    }
}

/// An input a pattern asks for
#[derive(Debug, Clone, PartialEq)]
pub struct InputParam {
    /// Parameter name, unique within the pattern
    pub name: String,
    pub kind: SignalKind,
    /// Starting value; the kind's neutral value when `None`
    pub initial: Option<SignalValue>,
    /// Fire a pulse on this interval
    pub timer: Option<Duration>,
}

impl InputParam {
    /// A pulse input driven by presses
    pub fn pulse(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SignalKind::Pulse,
            initial: None,
            timer: None,
        }
    }

    /// A pulse input driven by a repeating timer
    pub fn timer(name: impl Into<String>, interval: Duration) -> Self {
        Self {
            timer: Some(interval),
            ..Self::pulse(name)
        }
    }

    /// A boolean input
    pub fn toggle(name: impl Into<String>, initial: bool) -> Self {
        Self {
            name: name.into(),
            kind: SignalKind::Toggle,
            initial: Some(SignalValue::Toggle(initial)),
            timer: None,
        }
    }

    /// A ranged numeric input
    pub fn value(name: impl Into<String>, min: f32, max: f32, initial: f32) -> Self {
        Self {
            name: name.into(),
            kind: SignalKind::Value { min, max },
            initial: Some(SignalValue::Value(clamp_to(initial, min, max))),
            timer: None,
        }
    }
}

/// A live input instance
#[derive(Debug, Clone)]
pub struct Input {
    id: InputId,
    name: String,
    kind: SignalKind,
    value: SignalValue,
    level: bool,
    timer: Option<Duration>,
    next_fire: Option<Duration>,
    persistent: bool,
}

impl Input {
    fn new(id: InputId, param: &InputParam, persistent: bool) -> Self {
        let value = match (param.kind, param.initial) {
            (SignalKind::Value { min, max }, Some(SignalValue::Value(v))) => {
                SignalValue::Value(clamp_to(v, min, max))
            }
            (SignalKind::Toggle, Some(v @ SignalValue::Toggle(_))) => v,
            (kind, _) => kind.initial(),
        };
        Self {
            id,
            name: param.name.clone(),
            kind: param.kind,
            value,
            level: false,
            timer: param.timer,
            next_fire: None,
            persistent,
        }
    }

    pub fn id(&self) -> InputId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SignalKind {
        self.kind
    }

    pub fn value(&self) -> SignalValue {
        self.value
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Fold a raw event into the normalized value
    ///
    /// Returns false when the event means nothing for this kind (for example
    /// a press on a value input) and the value is unchanged.
    pub fn apply(&mut self, raw: RawSignal) -> bool {
        let before = self.value;
        match (self.kind, raw) {
            (SignalKind::Pulse, RawSignal::Press | RawSignal::Tick) => self.bump(),
            (SignalKind::Pulse, RawSignal::Switch(on)) => self.edge(on),
            (SignalKind::Pulse, RawSignal::Number(n)) => self.edge(n > 0.0),

            (SignalKind::Toggle, RawSignal::Press | RawSignal::Tick) => {
                if let SignalValue::Toggle(on) = self.value {
                    self.value = SignalValue::Toggle(!on);
                }
            }
            (SignalKind::Toggle, RawSignal::Switch(on)) => self.value = SignalValue::Toggle(on),
            (SignalKind::Toggle, RawSignal::Number(n)) => {
                self.value = SignalValue::Toggle(n > 0.0)
            }

            (SignalKind::Value { min, max }, RawSignal::Number(n)) if !n.is_nan() => {
                self.value = SignalValue::Value(clamp_to(n, min, max))
            }
            (SignalKind::Value { min, max }, RawSignal::Switch(on)) => {
                self.value = SignalValue::Value(if on { max } else { min })
            }
            (SignalKind::Value { .. }, _) => return false,
        }
        trace!("Input {} ({}): {} -> {}", self.id, self.name, before, self.value);
        true
    }

    fn bump(&mut self) {
        if let SignalValue::Pulse(count) = self.value {
            self.value = SignalValue::Pulse(count.wrapping_add(1));
        }
    }

    fn edge(&mut self, level: bool) {
        if level && !self.level {
            self.bump();
        }
        self.level = level;
    }

    /// Fire the timer if due; returns whether it fired
    ///
    /// A timer fires once on its first advance and then every interval. When
    /// the caller falls behind by more than one interval the missed firings
    /// collapse into one.
    fn advance(&mut self, now: Duration) -> bool {
        let Some(interval) = self.timer else {
            return false;
        };
        match self.next_fire {
            Some(next) if now < next => false,
            Some(next) => {
                let following = next + interval;
                self.next_fire = Some(if following <= now { now + interval } else { following });
                self.apply(RawSignal::Tick)
            }
            None => {
                self.next_fire = Some(now + interval);
                self.apply(RawSignal::Tick)
            }
        }
    }
}

/// Something that holds an input: a loaded pattern on a module
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InputUser {
    pub module: String,
    pub pattern: PatternId,
}

impl InputUser {
    pub fn new(module: impl Into<String>, pattern: PatternId) -> Self {
        Self {
            module: module.into(),
            pattern,
        }
    }
}

impl fmt::Display for InputUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.module, self.pattern)
    }
}

/// Parameter name to input binding for one pattern
pub type InputCollection = BTreeMap<String, InputId>;

/// Operator view of one input
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputStatus {
    pub id: InputId,
    pub name: String,
    pub kind: &'static str,
    pub value: SignalValue,
    pub persistent: bool,
    pub users: usize,
}

/// Owns every input instance and tracks who is using it
#[derive(Debug, Default)]
pub struct InputManager {
    inputs: BTreeMap<InputId, Input>,
    uses: BTreeMap<InputId, Vec<(InputUser, String)>>,
    names: BTreeMap<String, InputId>,
    next_id: u32,
}

impl InputManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an input from a parameter declaration
    pub fn create(&mut self, param: &InputParam, persistent: bool) -> InputId {
        let id = InputId(self.next_id);
        self.next_id += 1;
        self.inputs.insert(id, Input::new(id, param, persistent));
        debug!(
            "Created {} input {} '{}'{}",
            param.kind.name(),
            id,
            param.name,
            if persistent { " (persistent)" } else { "" }
        );
        id
    }

    /// Create a persistent input reachable by name
    ///
    /// Returns `None` if the name is taken or would be mistaken for an id.
    pub fn create_named(&mut self, param: &InputParam) -> Option<InputId> {
        if self.names.contains_key(&param.name) || param.name.parse::<u32>().is_ok() {
            return None;
        }
        let id = self.create(param, true);
        self.names.insert(param.name.clone(), id);
        Some(id)
    }

    /// Create one input per parameter and register `user` on each
    pub fn build_collection(&mut self, params: &[InputParam], user: &InputUser) -> InputCollection {
        params
            .iter()
            .map(|param| {
                let id = self.create(param, false);
                self.register(user, id, &param.name);
                (param.name.clone(), id)
            })
            .collect()
    }

    /// Record that `user` reads `input` through parameter `slot`
    pub fn register(&mut self, user: &InputUser, input: InputId, slot: &str) {
        self.uses
            .entry(input)
            .or_default()
            .push((user.clone(), slot.to_string()));
    }

    /// Drop `user`'s registrations, for one slot or all of them
    ///
    /// Non-persistent inputs left without users are removed.
    pub fn unregister(&mut self, user: &InputUser, slot: Option<&str>) {
        let mut orphaned = Vec::new();
        for (input, uses) in self.uses.iter_mut() {
            uses.retain(|(u, s)| !(u == user && slot.map_or(true, |slot| slot == s)));
            if uses.is_empty() {
                orphaned.push(*input);
            }
        }

        for id in orphaned {
            self.uses.remove(&id);
            if self.inputs.get(&id).is_some_and(|input| !input.persistent) {
                self.inputs.remove(&id);
                debug!("Removed unused input {}", id);
            }
        }
    }

    /// Point `slot` of `collection` at another input
    pub fn rebind(
        &mut self,
        user: &InputUser,
        collection: &mut InputCollection,
        slot: &str,
        input: InputId,
    ) -> Result<(), ControlError> {
        if !collection.contains_key(slot) {
            return Err(ControlError::UnknownSlot {
                pattern: user.pattern,
                slot: slot.to_string(),
            });
        }
        if !self.inputs.contains_key(&input) {
            return Err(ControlError::InputGone(input));
        }
        // Register first so a rebind onto the same input never orphans it
        self.register(user, input, slot);
        if let Some(previous) = collection.insert(slot.to_string(), input) {
            self.release(user, previous, slot);
        }
        Ok(())
    }

    fn release(&mut self, user: &InputUser, input: InputId, slot: &str) {
        let Some(uses) = self.uses.get_mut(&input) else {
            return;
        };
        if let Some(pos) = uses.iter().position(|(u, s)| u == user && s == slot) {
            uses.remove(pos);
        }
        if uses.is_empty() {
            self.uses.remove(&input);
            if self.inputs.get(&input).is_some_and(|i| !i.persistent) {
                self.inputs.remove(&input);
                debug!("Removed unused input {}", input);
            }
        }
    }

    /// Resolve an operator reference: a persistent input name or a numeric id
    pub fn lookup(&self, reference: &str) -> Option<InputId> {
        if let Some(id) = self.names.get(reference) {
            return Some(*id);
        }
        reference
            .parse::<u32>()
            .ok()
            .map(InputId)
            .filter(|id| self.inputs.contains_key(id))
    }

    pub fn get(&self, id: InputId) -> Option<&Input> {
        self.inputs.get(&id)
    }

    /// Feed a raw event to an input
    pub fn set(&mut self, id: InputId, raw: RawSignal) -> Result<SignalValue, ControlError> {
        let input = self
            .inputs
            .get_mut(&id)
            .ok_or(ControlError::InputGone(id))?;
        input.apply(raw);
        Ok(input.value)
    }

    /// Fire every timer input that is due
    pub fn advance(&mut self, now: Duration) -> usize {
        self.inputs
            .values_mut()
            .map(|input| input.advance(now))
            .filter(|fired| *fired)
            .count()
    }

    /// Number of registrations on an input
    pub fn users(&self, id: InputId) -> usize {
        self.uses.get(&id).map_or(0, Vec::len)
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Values for one pattern's parameters
    pub fn snapshot(&self, collection: &InputCollection) -> InputSnapshot {
        InputSnapshot {
            values: collection
                .iter()
                .filter_map(|(slot, id)| {
                    self.inputs.get(id).map(|input| (slot.clone(), input.value))
                })
                .collect(),
        }
    }

    pub fn statuses(&self) -> Vec<InputStatus> {
        self.inputs
            .values()
            .map(|input| InputStatus {
                id: input.id,
                name: input.name.clone(),
                kind: input.kind.name(),
                value: input.value,
                persistent: input.persistent,
                users: self.users(input.id),
            })
            .collect()
    }
}

/// Immutable input values handed to a pattern for one render
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputSnapshot {
    values: BTreeMap<String, SignalValue>,
}

impl InputSnapshot {
    /// Build a snapshot directly, for driving patterns outside a module
    pub fn from_values(values: impl IntoIterator<Item = (String, SignalValue)>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<SignalValue> {
        self.values.get(name).copied()
    }

    /// Numeric value of a parameter
    pub fn value(&self, name: &str) -> Option<f32> {
        match self.get(name)? {
            SignalValue::Value(v) => Some(v),
            SignalValue::Toggle(on) => Some(if on { 1.0 } else { 0.0 }),
            SignalValue::Pulse(count) => Some(count as f32),
        }
    }

    /// Whether a toggle parameter is on; false when absent
    pub fn toggled(&self, name: &str) -> bool {
        matches!(self.get(name), Some(SignalValue::Toggle(true)))
    }

    /// Pulse count of a parameter; zero when absent
    pub fn pulses(&self, name: &str) -> u64 {
        match self.get(name) {
            Some(SignalValue::Pulse(count)) => count,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(pattern: u32) -> InputUser {
        InputUser::new("poofers", PatternId(pattern))
    }

    #[test]
    fn test_pulse_counts_rising_edges() {
        let mut inputs = InputManager::new();
        let id = inputs.create(&InputParam::pulse("fire"), false);

        inputs.set(id, RawSignal::Press).unwrap();
        inputs.set(id, RawSignal::Switch(true)).unwrap();
        inputs.set(id, RawSignal::Switch(true)).unwrap();
        inputs.set(id, RawSignal::Switch(false)).unwrap();
        let value = inputs.set(id, RawSignal::Number(3.0)).unwrap();

        assert_eq!(value, SignalValue::Pulse(3));
    }

    #[test]
    fn test_toggle_flips_and_sets() {
        let mut inputs = InputManager::new();
        let id = inputs.create(&InputParam::toggle("enabled", false), false);

        assert_eq!(inputs.set(id, RawSignal::Press).unwrap(), SignalValue::Toggle(true));
        assert_eq!(inputs.set(id, RawSignal::Press).unwrap(), SignalValue::Toggle(false));
        assert_eq!(
            inputs.set(id, RawSignal::Switch(true)).unwrap(),
            SignalValue::Toggle(true)
        );
    }

    #[test]
    fn test_value_clamps_and_ignores_nan() {
        let mut inputs = InputManager::new();
        let id = inputs.create(&InputParam::value("speed", 0.0, 10.0, 5.0), false);

        assert_eq!(
            inputs.set(id, RawSignal::Number(42.0)).unwrap(),
            SignalValue::Value(10.0)
        );
        assert_eq!(
            inputs.set(id, RawSignal::Number(f32::NAN)).unwrap(),
            SignalValue::Value(10.0)
        );
        assert_eq!(
            inputs.set(id, RawSignal::Switch(false)).unwrap(),
            SignalValue::Value(0.0)
        );
        assert!(!inputs.inputs.get_mut(&id).unwrap().apply(RawSignal::Press));
    }

    #[test]
    fn test_inverted_value_range_does_not_panic() {
        let mut inputs = InputManager::new();
        let id = inputs.create(&InputParam::value("dial", 10.0, 0.0, 5.0), false);

        assert!(inputs.set(id, RawSignal::Number(5.0)).is_ok());
        assert!(SignalKind::Value { min: 10.0, max: 0.0 }.check().is_err());
        assert!(SignalKind::Value { min: 0.0, max: f32::NAN }.check().is_err());
        assert!(SignalKind::Pulse.check().is_ok());
    }

    #[test]
    fn test_timer_fires_on_schedule() {
        let mut inputs = InputManager::new();
        let id = inputs.create(&InputParam::timer("step", Duration::from_millis(100)), false);

        assert_eq!(inputs.advance(Duration::from_millis(0)), 1);
        assert_eq!(inputs.advance(Duration::from_millis(50)), 0);
        assert_eq!(inputs.advance(Duration::from_millis(100)), 1);
        // Far behind: one firing, not a burst
        assert_eq!(inputs.advance(Duration::from_millis(1000)), 1);
        assert_eq!(inputs.advance(Duration::from_millis(1050)), 0);
        assert_eq!(inputs.get(id).unwrap().value(), SignalValue::Pulse(3));
    }

    #[test]
    fn test_unused_inputs_are_removed() {
        let mut inputs = InputManager::new();
        let params = vec![InputParam::pulse("fire"), InputParam::toggle("hold", false)];
        let collection = inputs.build_collection(&params, &user(0));
        assert_eq!(inputs.len(), 2);

        let shared = collection["fire"];
        inputs.register(&user(1), shared, "trigger");

        inputs.unregister(&user(0), None);
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs.users(shared), 1);

        inputs.unregister(&user(1), Some("trigger"));
        assert!(inputs.is_empty());
    }

    #[test]
    fn test_persistent_inputs_survive() {
        let mut inputs = InputManager::new();
        let button = inputs.create_named(&InputParam::pulse("big_red")).unwrap();
        assert!(inputs.create_named(&InputParam::pulse("big_red")).is_none());
        assert!(inputs.create_named(&InputParam::pulse("12")).is_none());

        let mut collection = inputs.build_collection(&[InputParam::pulse("fire")], &user(0));
        inputs.rebind(&user(0), &mut collection, "fire", button).unwrap();

        // The pattern's own input was orphaned by the rebind
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs.lookup("big_red"), Some(button));
        assert_eq!(inputs.lookup(&button.to_string()), Some(button));

        inputs.unregister(&user(0), None);
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs.users(button), 0);
    }

    #[test]
    fn test_rebind_unknown_slot() {
        let mut inputs = InputManager::new();
        let mut collection = inputs.build_collection(&[InputParam::pulse("fire")], &user(0));
        let other = inputs.create(&InputParam::pulse("x"), true);
        assert!(matches!(
            inputs.rebind(&user(0), &mut collection, "nope", other),
            Err(ControlError::UnknownSlot { .. })
        ));
    }

    #[test]
    fn test_snapshot_helpers() {
        let snapshot = InputSnapshot::from_values(vec![
            ("hold".to_string(), SignalValue::Toggle(true)),
            ("fire".to_string(), SignalValue::Pulse(4)),
            ("speed".to_string(), SignalValue::Value(0.25)),
        ]);
        assert!(snapshot.toggled("hold"));
        assert!(!snapshot.toggled("missing"));
        assert_eq!(snapshot.pulses("fire"), 4);
        assert_eq!(snapshot.value("speed"), Some(0.25));
        assert_eq!(snapshot.value("hold"), Some(1.0));
        assert_eq!(snapshot.value("missing"), None);
    }
}
