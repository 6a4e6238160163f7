//! Encoder to channel bindings

use std::sync::Arc;

use sculpt_link::Channel;
use sculpt_protocol::{DroppedItem, Encoder, EncoderKind, ItemState, PhysicalAddress};
use tracing::{debug, warn};

/// An encoder together with the channel it writes to
///
/// The encoder is fixed to its channel for life. Several bindings may share
/// one channel; the channel serializes their frames.
pub struct Binding {
    id: String,
    channel_id: String,
    encoder: Box<dyn Encoder>,
    channel: Arc<dyn Channel>,
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("id", &self.id)
            .field("kind", &self.encoder.kind())
            .field("channel", &self.channel_id)
            .finish()
    }
}

/// Outcome of sending one group of items through a binding
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub encoder: String,
    pub channel: String,
    /// Bytes handed to the channel
    pub bytes: Vec<u8>,
    /// Items represented in `bytes`
    pub encoded: usize,
    pub dropped: Vec<DroppedItem>,
    /// Whether the channel accepted the frame
    pub sent: bool,
}

impl Binding {
    pub fn new(
        id: impl Into<String>,
        encoder: Box<dyn Encoder>,
        channel: Arc<dyn Channel>,
    ) -> Self {
        Self {
            id: id.into(),
            channel_id: channel.id().to_string(),
            encoder,
            channel,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn kind(&self) -> EncoderKind {
        self.encoder.kind()
    }

    pub fn encoder(&self) -> &dyn Encoder {
        self.encoder.as_ref()
    }

    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }

    /// Encode `items` into one frame and transmit it
    ///
    /// Items that fail to encode are dropped and reported; the rest go out.
    /// A frame with nothing left in it is not transmitted.
    pub fn dispatch(&self, items: &[(PhysicalAddress, ItemState)]) -> Dispatch {
        let frame = self.encoder.format_frame(items);

        for dropped in &frame.dropped {
            warn!(
                "Encoder {} dropped {} = {}: {}",
                self.id, dropped.address, dropped.state, dropped.error
            );
        }

        let sent = !frame.is_empty() && self.channel.transmit(&frame.bytes);
        if sent {
            debug!(
                "Encoder {} sent {} item(s), {} bytes on {}",
                self.id,
                frame.encoded,
                frame.bytes.len(),
                self.channel_id
            );
        } else if !frame.is_empty() {
            debug!("Encoder {}: channel {} did not accept frame", self.id, self.channel_id);
        }

        Dispatch {
            encoder: self.id.clone(),
            channel: self.channel_id.clone(),
            bytes: frame.bytes,
            encoded: frame.encoded,
            dropped: frame.dropped,
            sent,
        }
    }
}
