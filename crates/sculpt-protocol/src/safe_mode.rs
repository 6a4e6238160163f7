//! Safe-mode interlock flag
//!
//! [`SafeMode`] is the single owner-side handle: it is the only way to flip
//! the flag. Encoders receive a [`SafeModeView`], which can read but never
//! change it. All accesses use `SeqCst`, so once [`SafeMode::toggle`] has
//! returned no encoder can observe the previous value.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::warn;

/// Owner handle for the process-wide safe-mode flag
#[derive(Debug, Default)]
pub struct SafeMode {
    flag: Arc<AtomicBool>,
}

impl SafeMode {
    /// Create the flag, initially off
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether safe mode is currently engaged
    pub fn is_active(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Flip the flag and return the new value
    pub fn toggle(&self) -> bool {
        let active = !self.flag.fetch_xor(true, Ordering::SeqCst);
        warn!("Safe mode {}", if active { "ENGAGED" } else { "released" });
        active
    }

    /// Read-only view for encoders
    pub fn view(&self) -> SafeModeView {
        SafeModeView {
            flag: Arc::clone(&self.flag),
        }
    }
}

/// Read-only view of the safe-mode flag
#[derive(Debug, Clone)]
pub struct SafeModeView {
    flag: Arc<AtomicBool>,
}

impl SafeModeView {
    /// Whether safe mode is currently engaged
    pub fn is_active(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// A view that is permanently released, for encoders used outside a manager
    pub fn detached() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }
}
