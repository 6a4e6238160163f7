//! Unified event stream for the control loop
//!
//! Everything the engine does that an operator might want to see (frames on
//! the wire, dropped items, channel state, safe mode, pattern changes) is
//! reported through one event channel, in the order it happened.

use sculpt_link::ConnectionState;
use sculpt_protocol::{EncodingError, ItemState, PhysicalAddress};

use crate::input::{InputId, SignalValue};
use crate::module::TickReport;
use crate::pattern::PatternId;

/// Unified event enum for all engine activity
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    // -------------------------------------------------------------------------
    // Traffic events
    // -------------------------------------------------------------------------
    /// A frame was accepted by a channel
    FrameSent {
        module: String,
        encoder: String,
        channel: String,
        /// Raw data bytes
        data: Vec<u8>,
        /// Number of items in the frame
        items: usize,
    },

    /// A channel refused a frame (not connected or write failed)
    TransmitFailed {
        module: String,
        encoder: String,
        channel: String,
    },

    /// An item could not be encoded and was left out of its frame
    ItemDropped {
        module: String,
        encoder: String,
        address: PhysicalAddress,
        state: ItemState,
        error: EncodingError,
    },

    // -------------------------------------------------------------------------
    // Channel lifecycle events
    // -------------------------------------------------------------------------
    /// A channel's connection state changed
    ChannelStateChanged {
        channel: String,
        from: ConnectionState,
        to: ConnectionState,
        /// Last error reported by the channel, if any
        error: Option<String>,
    },

    // -------------------------------------------------------------------------
    // Control events
    // -------------------------------------------------------------------------
    /// Safe mode was engaged or released
    SafeModeChanged { active: bool },

    /// A pattern was added to a module
    PatternLoaded {
        module: String,
        id: PatternId,
        name: String,
    },

    /// A pattern was removed from a module
    PatternCleared { module: String, id: PatternId },

    /// An input received a new value from the operator
    InputChanged { input: InputId, value: SignalValue },

    /// An operator command failed
    Error {
        /// Source of the error (e.g. "add", "reconnect")
        source: String,
        message: String,
    },
}

impl EngineEvent {
    /// Traffic events describing one module tick
    pub fn from_report(report: &TickReport) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        for dispatch in &report.dispatches {
            for dropped in &dispatch.dropped {
                events.push(EngineEvent::ItemDropped {
                    module: report.module.clone(),
                    encoder: dispatch.encoder.clone(),
                    address: dropped.address,
                    state: dropped.state,
                    error: dropped.error.clone(),
                });
            }
            if dispatch.sent {
                events.push(EngineEvent::FrameSent {
                    module: report.module.clone(),
                    encoder: dispatch.encoder.clone(),
                    channel: dispatch.channel.clone(),
                    data: dispatch.bytes.clone(),
                    items: dispatch.encoded,
                });
            } else if !dispatch.bytes.is_empty() {
                events.push(EngineEvent::TransmitFailed {
                    module: report.module.clone(),
                    encoder: dispatch.encoder.clone(),
                    channel: dispatch.channel.clone(),
                });
            }
        }
        events
    }

    /// Whether this event reports something going wrong
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            EngineEvent::TransmitFailed { .. }
                | EngineEvent::ItemDropped { .. }
                | EngineEvent::Error { .. }
                | EngineEvent::ChannelStateChanged {
                    to: ConnectionState::Failed,
                    ..
                }
        )
    }
}
