use serde::Serialize;
use uuid::Uuid;

use super::{Address, Endpoint, Frame};
use crate::error::TransportError;

/// Sending half of the chunked transport for one endpoint.
///
/// Payloads are serialized to JSON bytes, measured, and pushed as one frame
/// when they fit under the destination's ceiling or as an ordered sequence
/// of frames sharing a fresh message id when they do not.
#[derive(Debug, Clone)]
pub struct ChunkSender {
    sender: Address,
}

impl ChunkSender {
    pub fn new(sender: Address) -> Self {
        ChunkSender { sender }
    }

    pub fn address(&self) -> Address {
        self.sender
    }

    /// Splits `bytes` into frames of at most `max_frame_bytes` payload each.
    pub fn split(
        &self,
        bytes: &[u8],
        recipient: Address,
        max_frame_bytes: usize,
    ) -> Result<Vec<Frame>, TransportError> {
        let message_id = Uuid::new_v4();
        let chunk_size = max_frame_bytes.max(1);

        if bytes.len() <= chunk_size {
            return Ok(vec![Frame {
                message_id,
                sequence: 0,
                total: 1,
                sender: self.sender,
                recipient,
                payload: bytes.to_vec(),
            }]);
        }

        let total = u32::try_from(bytes.len().div_ceil(chunk_size)).map_err(|_| {
            TransportError::MalformedFrame {
                message_id,
                reason: format!("{} bytes need more than u32::MAX frames", bytes.len()),
            }
        })?;

        Ok(bytes
            .chunks(chunk_size)
            .zip(0..total)
            .map(|(slice, sequence)| Frame {
                message_id,
                sequence,
                total,
                sender: self.sender,
                recipient,
                payload: slice.to_vec(),
            })
            .collect())
    }

    /// Serializes `payload` and pushes all of its frames to `destination`.
    ///
    /// Returns the logical message id. Delivery is fire-and-forget.
    pub fn send<T: Serialize + ?Sized>(
        &self,
        payload: &T,
        destination: &dyn Endpoint,
    ) -> Result<Uuid, TransportError> {
        let bytes = serde_json::to_vec(payload)?;
        let frames = self.split(&bytes, destination.address(), destination.max_frame_bytes())?;
        let message_id = frames[0].message_id;

        if frames.len() > 1 {
            log::debug!(
                "Chunking {} bytes into {} frames for {}",
                bytes.len(),
                frames.len(),
                destination.address()
            );
        }
        for frame in frames {
            destination.push(frame)?;
        }
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::Network;

    #[test]
    fn test_small_payload_is_single_frame() {
        let chunker = ChunkSender::new(Address::random());
        let frames = chunker.split(b"abc", Address::random(), 8).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].total, 1);
        assert_eq!(frames[0].sequence, 0);
        assert_eq!(frames[0].payload, b"abc".to_vec());
    }

    #[test]
    fn test_large_payload_is_split_in_order() {
        let chunker = ChunkSender::new(Address::random());
        let bytes: Vec<u8> = (0..=20).collect();
        let frames = chunker.split(&bytes, Address::random(), 8).unwrap();

        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.total == 3));
        assert!(frames.iter().all(|f| f.message_id == frames[0].message_id));
        assert_eq!(
            frames.iter().map(|f| f.sequence).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(frames[2].payload_len(), 5);

        let joined: Vec<u8> = frames.into_iter().flat_map(|f| f.payload).collect();
        assert_eq!(joined, bytes);
    }

    #[test]
    fn test_exact_multiple_has_no_empty_tail() {
        let chunker = ChunkSender::new(Address::random());
        let frames = chunker.split(&[7u8; 16], Address::random(), 8).unwrap();
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.payload_len() == 8));
    }

    #[test]
    fn test_each_send_gets_a_fresh_message_id() {
        let chunker = ChunkSender::new(Address::random());
        let a = chunker.split(b"x", Address::random(), 8).unwrap();
        let b = chunker.split(b"x", Address::random(), 8).unwrap();
        assert_ne!(a[0].message_id, b[0].message_id);
    }

    #[tokio::test]
    async fn test_send_respects_substrate_ceiling() {
        let network = Network::new(10);
        let to = Address::random();
        let mut rx = network.bind(to).unwrap();
        let endpoint = network.resolve(to).unwrap();

        let chunker = ChunkSender::new(Address::random());
        let payload = vec!["a fairly long value".to_string(); 4];
        let message_id = chunker.send(&payload, endpoint.as_ref()).unwrap();

        let expected = serde_json::to_vec(&payload).unwrap();
        let mut received = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            assert_eq!(frame.message_id, message_id);
            assert!(frame.payload_len() <= 10);
            received.extend(frame.payload);
        }
        assert_eq!(received, expected);
    }
}
