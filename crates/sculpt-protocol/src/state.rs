//! Item state and actuator classes

use std::fmt;

/// 8-bit RGB colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    /// All channels off
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };
    /// All channels full
    pub const WHITE: Rgb = Rgb {
        r: 255,
        g: 255,
        b: 255,
    };

    /// Create a colour
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Per-channel saturating addition
    pub fn saturating_add(self, other: Rgb) -> Rgb {
        Rgb {
            r: self.r.saturating_add(other.r),
            g: self.g.saturating_add(other.g),
            b: self.b.saturating_add(other.b),
        }
    }

    /// Scale every channel by a factor in 0.0..=1.0
    pub fn scaled(self, factor: f32) -> Rgb {
        let scale = |c: u8| (c as f32 * factor.clamp(0.0, 1.0)).round() as u8;
        Rgb {
            r: scale(self.r),
            g: scale(self.g),
            b: scale(self.b),
        }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// The value of one controllable item on one tick
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ItemState {
    /// On/off actuators (poofers, hammers)
    Boolean(bool),
    /// Brightness or drive level, valid range 0.0..=1.0
    Intensity(f32),
    /// Index into a device palette
    PaletteIndex(u8),
    /// Full colour
    Color(Rgb),
}

impl ItemState {
    /// Short name of the state domain, used in error messages
    pub fn domain(&self) -> &'static str {
        match self {
            Self::Boolean(_) => "boolean",
            Self::Intensity(_) => "intensity",
            Self::PaletteIndex(_) => "palette",
            Self::Color(_) => "color",
        }
    }

    /// Whether this state requests any actuation at all
    pub fn is_active(&self) -> bool {
        match self {
            Self::Boolean(on) => *on,
            Self::Intensity(level) => *level > 0.0,
            Self::PaletteIndex(index) => *index != 0,
            Self::Color(rgb) => *rgb != Rgb::BLACK,
        }
    }

    /// Merge a later contribution into this one using `rule`
    ///
    /// Contributions from different domains cannot be superposed; the later
    /// one wins in that case.
    pub fn combine(self, later: ItemState, rule: CombineRule) -> ItemState {
        match (rule, self, later) {
            (CombineRule::LastWins, _, later) => later,
            (CombineRule::Additive, Self::Intensity(a), Self::Intensity(b)) => {
                Self::Intensity((a + b).clamp(0.0, 1.0))
            }
            (CombineRule::Additive, Self::Color(a), Self::Color(b)) => {
                Self::Color(a.saturating_add(b))
            }
            (CombineRule::Additive, _, later) => later,
        }
    }

    /// Bring a lone contribution into the class's valid range
    pub fn clamped(self, rule: CombineRule) -> ItemState {
        match (rule, self) {
            (CombineRule::Additive, Self::Intensity(level)) => {
                Self::Intensity(level.clamp(0.0, 1.0))
            }
            (_, state) => state,
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(true) => write!(f, "on"),
            Self::Boolean(false) => write!(f, "off"),
            Self::Intensity(level) => write!(f, "{:.2}", level),
            Self::PaletteIndex(index) => write!(f, "p{}", index),
            Self::Color(rgb) => write!(f, "{}", rgb),
        }
    }
}

/// How overlapping pattern contributions merge for one address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombineRule {
    /// The most recently loaded pattern decides
    LastWins,
    /// Contributions add up and are clamped to the domain's range
    Additive,
}

/// Kind of actuator a module drives
///
/// The class is fixed when the module is built and decides the state domain,
/// how pattern outputs combine, what "at rest" means, and whether the
/// safe-mode interlock applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ActuatorClass {
    /// Flame effect, boolean
    Poofer,
    /// Solenoid hammer, boolean
    Hammer,
    /// Single-channel light, intensity
    Dimmer,
    /// RGB light, colour
    Led,
    /// Light with a fixed device palette
    Palette,
}

impl ActuatorClass {
    /// Returns a human-readable name for the class
    pub fn name(&self) -> &'static str {
        match self {
            Self::Poofer => "poofer",
            Self::Hammer => "hammer",
            Self::Dimmer => "dimmer",
            Self::Led => "led",
            Self::Palette => "palette",
        }
    }

    /// Rule used to merge overlapping pattern contributions
    pub fn combine_rule(&self) -> CombineRule {
        match self {
            Self::Poofer | Self::Hammer | Self::Palette => CombineRule::LastWins,
            Self::Dimmer | Self::Led => CombineRule::Additive,
        }
    }

    /// State transmitted for items no pattern addresses
    pub fn rest_state(&self) -> ItemState {
        match self {
            Self::Poofer | Self::Hammer => ItemState::Boolean(false),
            Self::Dimmer => ItemState::Intensity(0.0),
            Self::Led => ItemState::Color(Rgb::BLACK),
            Self::Palette => ItemState::PaletteIndex(0),
        }
    }

    /// Whether actuation can be irreversible or dangerous
    pub fn is_hazardous(&self) -> bool {
        matches!(self, Self::Poofer | Self::Hammer)
    }
}

impl fmt::Display for ActuatorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_wins_takes_later_state() {
        let merged =
            ItemState::Boolean(true).combine(ItemState::Boolean(false), CombineRule::LastWins);
        assert_eq!(merged, ItemState::Boolean(false));
    }

    #[test]
    fn test_additive_intensity_clamps() {
        let merged =
            ItemState::Intensity(0.7).combine(ItemState::Intensity(0.6), CombineRule::Additive);
        assert_eq!(merged, ItemState::Intensity(1.0));
    }

    #[test]
    fn test_additive_color_saturates() {
        let merged = ItemState::Color(Rgb::new(200, 10, 0))
            .combine(ItemState::Color(Rgb::new(100, 10, 5)), CombineRule::Additive);
        assert_eq!(merged, ItemState::Color(Rgb::new(255, 20, 5)));
    }

    #[test]
    fn test_additive_mixed_domains_falls_back_to_later() {
        let merged =
            ItemState::Intensity(0.5).combine(ItemState::Color(Rgb::WHITE), CombineRule::Additive);
        assert_eq!(merged, ItemState::Color(Rgb::WHITE));
    }

    #[test]
    fn test_clamped_only_touches_additive_intensity() {
        assert_eq!(
            ItemState::Intensity(3.0).clamped(CombineRule::Additive),
            ItemState::Intensity(1.0)
        );
        assert_eq!(
            ItemState::Intensity(3.0).clamped(CombineRule::LastWins),
            ItemState::Intensity(3.0)
        );
    }

    #[test]
    fn test_class_rules() {
        assert_eq!(ActuatorClass::Poofer.combine_rule(), CombineRule::LastWins);
        assert_eq!(ActuatorClass::Led.combine_rule(), CombineRule::Additive);
        assert!(ActuatorClass::Hammer.is_hazardous());
        assert!(!ActuatorClass::Dimmer.is_hazardous());
        assert!(!ActuatorClass::Poofer.rest_state().is_active());
        assert!(!ActuatorClass::Led.rest_state().is_active());
    }

    #[test]
    fn test_scaled() {
        assert_eq!(Rgb::WHITE.scaled(0.5), Rgb::new(128, 128, 128));
        assert_eq!(Rgb::WHITE.scaled(2.0), Rgb::WHITE);
    }
}
