//! Sculpture Simulation Library
//!
//! Runs a sculpture without hardware:
//!
//! - **SimulatedBoards**: decodes frames from a virtual channel back into
//!   per-address actuator state
//! - **Reference patterns**: `AllOn`, `Chase`, `Breathe` and `Flash`, usable on
//!   any actuator class
//!
//! # Example
//!
//! ```rust
//! use sculpt_protocol::{EncoderKind, PhysicalAddress};
//! use sculpt_sim::SimulatedBoards;
//!
//! let mut boards = SimulatedBoards::new(EncoderKind::Poofer);
//! boards.feed(b"!0131~40.").unwrap();
//!
//! assert_eq!(boards.active(), vec![PhysicalAddress::new(1, 3)]);
//! ```

pub mod board;
pub mod patterns;

pub use board::SimulatedBoards;
pub use patterns::{
    active_state, builtin_registry, register_builtin, AllOn, Breathe, Chase, Flash, BUILTIN,
};
