//! Reference patterns
//!
//! Small patterns for commissioning a sculpture and exercising the pipeline.
//! Each one renders the module class's "active" state, scaled where the state
//! domain has levels, and reads its parameters from inputs so an operator can
//! drive it from the console.

use std::f32::consts::TAU;
use std::time::Duration;

use sculpt_engine::{
    InputParam, InputSnapshot, ModuleLayout, Pattern, PatternFrame, PatternRegistry,
};
use sculpt_protocol::{ActuatorClass, ItemState, LogicalAddress, Rgb};

pub const ALL_ON: &str = "AllOn";
pub const CHASE: &str = "Chase";
pub const BREATHE: &str = "Breathe";
pub const FLASH: &str = "Flash";

/// Names registered by [`register_builtin`]
pub const BUILTIN: [&str; 4] = [ALL_ON, CHASE, BREATHE, FLASH];

/// Chase advances this often
pub const CHASE_STEP: Duration = Duration::from_millis(250);
/// How long a flash stays lit
pub const FLASH_HOLD: Duration = Duration::from_millis(300);

/// State for one item at `level` in 0.0..=1.0
///
/// Boolean and palette classes are on from half level up.
pub fn active_state(class: ActuatorClass, level: f32) -> ItemState {
    let level = level.clamp(0.0, 1.0);
    match class {
        ActuatorClass::Poofer | ActuatorClass::Hammer => ItemState::Boolean(level >= 0.5),
        ActuatorClass::Dimmer => ItemState::Intensity(level),
        ActuatorClass::Led => ItemState::Color(Rgb::WHITE.scaled(level)),
        ActuatorClass::Palette => ItemState::PaletteIndex(u8::from(level >= 0.5)),
    }
}

fn uniform(class: ActuatorClass, addresses: &[LogicalAddress], level: f32) -> PatternFrame {
    let state = active_state(class, level);
    addresses.iter().map(|address| (*address, state)).collect()
}

/// Every item on while the `enabled` toggle is set
#[derive(Debug, Clone)]
pub struct AllOn {
    class: ActuatorClass,
    addresses: Vec<LogicalAddress>,
}

impl AllOn {
    pub fn new(layout: &ModuleLayout) -> Self {
        Self {
            class: layout.class,
            addresses: layout.addresses.clone(),
        }
    }
}

impl Pattern for AllOn {
    fn name(&self) -> &str {
        ALL_ON
    }

    fn addresses(&self) -> Vec<LogicalAddress> {
        self.addresses.clone()
    }

    fn inputs(&self) -> Vec<InputParam> {
        vec![InputParam::toggle("enabled", true)]
    }

    fn render(&mut self, _now: Duration, inputs: &InputSnapshot) -> PatternFrame {
        if inputs.toggled("enabled") {
            uniform(self.class, &self.addresses, 1.0)
        } else {
            PatternFrame::new()
        }
    }
}

/// One item at a time, in mapping order, stepped by a timer
#[derive(Debug, Clone)]
pub struct Chase {
    class: ActuatorClass,
    addresses: Vec<LogicalAddress>,
}

impl Chase {
    pub fn new(layout: &ModuleLayout) -> Self {
        Self {
            class: layout.class,
            addresses: layout.addresses.clone(),
        }
    }
}

impl Pattern for Chase {
    fn name(&self) -> &str {
        CHASE
    }

    fn addresses(&self) -> Vec<LogicalAddress> {
        self.addresses.clone()
    }

    fn inputs(&self) -> Vec<InputParam> {
        vec![InputParam::timer("step", CHASE_STEP)]
    }

    fn render(&mut self, _now: Duration, inputs: &InputSnapshot) -> PatternFrame {
        if self.addresses.is_empty() {
            return PatternFrame::new();
        }
        let lit = (inputs.pulses("step") % self.addresses.len() as u64) as usize;
        self.addresses
            .iter()
            .enumerate()
            .map(|(i, address)| {
                let level = if i == lit { 1.0 } else { 0.0 };
                (*address, active_state(self.class, level))
            })
            .collect()
    }
}

/// Slow rise and fall at `speed` Hz
#[derive(Debug, Clone)]
pub struct Breathe {
    class: ActuatorClass,
    addresses: Vec<LogicalAddress>,
}

impl Breathe {
    pub const MIN_SPEED: f32 = 0.1;
    pub const MAX_SPEED: f32 = 4.0;
    pub const DEFAULT_SPEED: f32 = 0.5;

    pub fn new(layout: &ModuleLayout) -> Self {
        Self {
            class: layout.class,
            addresses: layout.addresses.clone(),
        }
    }

    /// Raised cosine: 0.0 at t = 0, 1.0 half a cycle later
    pub fn level(speed: f32, now: Duration) -> f32 {
        0.5 - 0.5 * (TAU * speed * now.as_secs_f32()).cos()
    }
}

impl Pattern for Breathe {
    fn name(&self) -> &str {
        BREATHE
    }

    fn addresses(&self) -> Vec<LogicalAddress> {
        self.addresses.clone()
    }

    fn inputs(&self) -> Vec<InputParam> {
        vec![InputParam::value(
            "speed",
            Self::MIN_SPEED,
            Self::MAX_SPEED,
            Self::DEFAULT_SPEED,
        )]
    }

    fn render(&mut self, now: Duration, inputs: &InputSnapshot) -> PatternFrame {
        let speed = inputs.value("speed").unwrap_or(Self::DEFAULT_SPEED);
        uniform(self.class, &self.addresses, Self::level(speed, now))
    }
}

/// Every item on for a moment after each `fire` pulse
#[derive(Debug, Clone)]
pub struct Flash {
    class: ActuatorClass,
    addresses: Vec<LogicalAddress>,
    seen: u64,
    fired_at: Option<Duration>,
}

impl Flash {
    pub fn new(layout: &ModuleLayout) -> Self {
        Self {
            class: layout.class,
            addresses: layout.addresses.clone(),
            seen: 0,
            fired_at: None,
        }
    }
}

impl Pattern for Flash {
    fn name(&self) -> &str {
        FLASH
    }

    fn addresses(&self) -> Vec<LogicalAddress> {
        self.addresses.clone()
    }

    fn inputs(&self) -> Vec<InputParam> {
        vec![InputParam::pulse("fire")]
    }

    fn render(&mut self, now: Duration, inputs: &InputSnapshot) -> PatternFrame {
        let pulses = inputs.pulses("fire");
        if pulses != self.seen {
            self.seen = pulses;
            self.fired_at = Some(now);
        }
        let lit = self
            .fired_at
            .is_some_and(|at| now.saturating_sub(at) < FLASH_HOLD);
        uniform(self.class, &self.addresses, if lit { 1.0 } else { 0.0 })
    }
}

/// Add every reference pattern to a registry
pub fn register_builtin(registry: &mut PatternRegistry) {
    registry.register(ALL_ON, |layout: &ModuleLayout| -> Box<dyn Pattern> {
        Box::new(AllOn::new(layout))
    });
    registry.register(CHASE, |layout: &ModuleLayout| -> Box<dyn Pattern> {
        Box::new(Chase::new(layout))
    });
    registry.register(BREATHE, |layout: &ModuleLayout| -> Box<dyn Pattern> {
        Box::new(Breathe::new(layout))
    });
    registry.register(FLASH, |layout: &ModuleLayout| -> Box<dyn Pattern> {
        Box::new(Flash::new(layout))
    });
}

/// A registry holding just the reference patterns
pub fn builtin_registry() -> PatternRegistry {
    let mut registry = PatternRegistry::new();
    register_builtin(&mut registry);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use sculpt_engine::SignalValue;
    use sculpt_protocol::GridSize;

    fn layout(class: ActuatorClass, count: u32) -> ModuleLayout {
        ModuleLayout {
            class,
            grid: GridSize { rows: 0, cols: 0 },
            addresses: (0..count).map(LogicalAddress::Index).collect(),
        }
    }

    fn snapshot(name: &str, value: SignalValue) -> InputSnapshot {
        InputSnapshot::from_values([(name.to_string(), value)])
    }

    #[test]
    fn test_active_state_per_class() {
        assert_eq!(active_state(ActuatorClass::Poofer, 1.0), ItemState::Boolean(true));
        assert_eq!(active_state(ActuatorClass::Hammer, 0.2), ItemState::Boolean(false));
        assert_eq!(active_state(ActuatorClass::Dimmer, 3.0), ItemState::Intensity(1.0));
        assert_eq!(
            active_state(ActuatorClass::Led, 1.0),
            ItemState::Color(Rgb::WHITE)
        );
        assert_eq!(active_state(ActuatorClass::Palette, 0.9), ItemState::PaletteIndex(1));
        assert_eq!(active_state(ActuatorClass::Palette, 0.1), ItemState::PaletteIndex(0));
    }

    #[test]
    fn test_all_on_follows_toggle() {
        let mut pattern = AllOn::new(&layout(ActuatorClass::Poofer, 3));
        let on = pattern.render(Duration::ZERO, &snapshot("enabled", SignalValue::Toggle(true)));
        assert_eq!(on.len(), 3);
        assert!(on.values().all(ItemState::is_active));

        let off = pattern.render(Duration::ZERO, &snapshot("enabled", SignalValue::Toggle(false)));
        assert!(off.is_empty());
    }

    #[test]
    fn test_chase_lights_one_item() {
        let mut pattern = Chase::new(&layout(ActuatorClass::Hammer, 4));
        for step in 0..8u64 {
            let frame = pattern.render(Duration::ZERO, &snapshot("step", SignalValue::Pulse(step)));
            let lit: Vec<_> = frame
                .iter()
                .filter(|(_, state)| state.is_active())
                .map(|(address, _)| *address)
                .collect();
            assert_eq!(lit, vec![LogicalAddress::Index((step % 4) as u32)]);
        }
    }

    #[test]
    fn test_breathe_level_cycle() {
        assert!(Breathe::level(1.0, Duration::ZERO).abs() < 1e-6);
        assert!((Breathe::level(1.0, Duration::from_millis(500)) - 1.0).abs() < 1e-4);

        let mut pattern = Breathe::new(&layout(ActuatorClass::Dimmer, 2));
        let frame = pattern.render(
            Duration::from_millis(250),
            &snapshot("speed", SignalValue::Value(1.0)),
        );
        match frame[&LogicalAddress::Index(0)] {
            ItemState::Intensity(level) => assert!((level - 0.5).abs() < 1e-4),
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn test_flash_holds_after_pulse() {
        let mut pattern = Flash::new(&layout(ActuatorClass::Poofer, 1));
        let cell = LogicalAddress::Index(0);

        let idle = pattern.render(Duration::ZERO, &snapshot("fire", SignalValue::Pulse(0)));
        assert_eq!(idle[&cell], ItemState::Boolean(false));

        let fired = snapshot("fire", SignalValue::Pulse(1));
        assert_eq!(
            pattern.render(Duration::from_millis(1000), &fired)[&cell],
            ItemState::Boolean(true)
        );
        assert_eq!(
            pattern.render(Duration::from_millis(1200), &fired)[&cell],
            ItemState::Boolean(true)
        );
        assert_eq!(
            pattern.render(Duration::from_millis(1300), &fired)[&cell],
            ItemState::Boolean(false)
        );
    }

    #[test]
    fn test_registry_has_builtins() {
        let registry = builtin_registry();
        assert_eq!(registry.names(), vec![ALL_ON, BREATHE, CHASE, FLASH]);
        let pattern = registry
            .create(CHASE, &layout(ActuatorClass::Poofer, 2))
            .unwrap();
        assert_eq!(pattern.name(), CHASE);
        assert_eq!(pattern.addresses().len(), 2);
    }
}
