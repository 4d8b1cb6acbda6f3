//! Chunked transport over a size-limited frame substrate.
//!
//! Every cross-process payload is serialized, measured, and split into
//! [`Frame`]s no larger than the substrate ceiling. Receivers buffer frames per
//! `(sender, message id)` and only hand whole logical messages to their owner:
//! - [`network`] is the substrate itself: an address directory of frame channels
//! - [`chunker`] turns one payload into an ordered frame sequence
//! - [`reassembly`] buffers frames and runs the per-endpoint receive loop

pub mod chunker;
pub mod network;
pub mod reassembly;

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub use chunker::ChunkSender;
pub use network::{ChannelEndpoint, Endpoint, Network};
pub use reassembly::{Inbound, Reassembler, spawn_receive_loop};

/// A stable address usable for directed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(Uuid);

impl Address {
    pub fn random() -> Self {
        Address(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Address(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps the logs readable
        let simple = self.0.simple().to_string();
        write!(f, "@{}", &simple[..8])
    }
}

/// One fragment of a logical message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Unique per logical send.
    pub message_id: Uuid,
    /// Position of this fragment, `0..total`.
    pub sequence: u32,
    /// Number of fragments making up the logical message.
    pub total: u32,
    pub sender: Address,
    pub recipient: Address,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}
