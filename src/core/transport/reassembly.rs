use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

use super::{Address, Frame};
use crate::core::config::TransportConfig;
use crate::error::TransportError;

/// What a receive loop hands to the component that owns the endpoint.
#[derive(Debug)]
pub enum Inbound<T> {
    /// A complete, deserialized logical message.
    Message { from: Address, payload: T },
    /// A logical message from `from` could not be delivered.
    Failure { from: Address, error: TransportError },
}

struct Partial {
    total: u32,
    parts: BTreeMap<u32, Vec<u8>>,
    bytes: usize,
    first_seen: Instant,
}

/// Reassembly buffer keyed by `(sender, message id)`.
///
/// Partial messages stay invisible until every sequence number `0..total`
/// has arrived, in whatever order the frames showed up. Parts are buffered
/// as they arrive, so memory follows what was received rather than what a
/// frame header announces, and no message may grow past `max_message_bytes`.
pub struct Reassembler {
    buffers: HashMap<(Address, Uuid), Partial>,
    max_message_bytes: usize,
    recipient: Option<Address>,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::for_config(&TransportConfig::default())
    }
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_config(config: &TransportConfig) -> Self {
        Reassembler {
            buffers: HashMap::new(),
            max_message_bytes: config.max_message_bytes,
            recipient: None,
        }
    }

    /// Only accept frames addressed to `recipient`.
    pub fn with_recipient(mut self, recipient: Address) -> Self {
        self.recipient = Some(recipient);
        self
    }

    /// Number of logical messages still waiting for frames.
    pub fn pending(&self) -> usize {
        self.buffers.len()
    }

    /// Buffers one frame and returns the full payload once it is complete.
    pub fn accept(&mut self, frame: Frame) -> Result<Option<(Address, Vec<u8>)>, TransportError> {
        self.accept_at(frame, Instant::now())
    }

    pub fn accept_at(
        &mut self,
        frame: Frame,
        now: Instant,
    ) -> Result<Option<(Address, Vec<u8>)>, TransportError> {
        let Frame {
            message_id,
            sequence,
            total,
            sender,
            recipient,
            payload,
        } = frame;

        if let Some(local) = self.recipient {
            if recipient != local {
                return Err(TransportError::MalformedFrame {
                    message_id,
                    reason: format!("frame addressed to {} arrived at {}", recipient, local),
                });
            }
        }
        if total == 0 {
            return Err(TransportError::MalformedFrame {
                message_id,
                reason: "total frame count is zero".into(),
            });
        }
        if sequence >= total {
            return Err(TransportError::MalformedFrame {
                message_id,
                reason: format!("sequence {} out of range for {} frames", sequence, total),
            });
        }
        // every frame of a split message carries at least one byte
        if total as usize > self.max_message_bytes {
            return Err(TransportError::MalformedFrame {
                message_id,
                reason: format!(
                    "{} frames exceed the {} byte message limit",
                    total, self.max_message_bytes
                ),
            });
        }
        if total == 1 {
            return Ok(Some((sender, payload)));
        }

        let key = (sender, message_id);
        let partial = self.buffers.entry(key).or_insert_with(|| Partial {
            total,
            parts: BTreeMap::new(),
            bytes: 0,
            first_seen: now,
        });

        if partial.total != total {
            return Err(TransportError::MalformedFrame {
                message_id,
                reason: format!(
                    "frame announces {} frames but message started with {}",
                    total, partial.total
                ),
            });
        }

        if partial.parts.contains_key(&sequence) {
            log::warn!(
                "Duplicate frame {} of message {} from {}; ignoring",
                sequence,
                message_id,
                sender
            );
            return Ok(None);
        }
        if partial.bytes + payload.len() > self.max_message_bytes {
            self.buffers.remove(&key);
            return Err(TransportError::MalformedFrame {
                message_id,
                reason: format!(
                    "message grew past the {} byte limit",
                    self.max_message_bytes
                ),
            });
        }
        partial.bytes += payload.len();
        partial.parts.insert(sequence, payload);

        // sequences are unique and below total, so a full count means no gaps
        if partial.parts.len() < partial.total as usize {
            return Ok(None);
        }

        let Some(complete) = self.buffers.remove(&key) else {
            return Ok(None);
        };
        let bytes: Vec<u8> = complete.parts.into_values().flatten().collect();
        Ok(Some((sender, bytes)))
    }

    /// Drops partial messages older than `timeout`, reporting each one.
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> Vec<(Address, TransportError)> {
        let stale: Vec<(Address, Uuid)> = self
            .buffers
            .iter()
            .filter(|(_, partial)| now.saturating_duration_since(partial.first_seen) >= timeout)
            .map(|(key, _)| *key)
            .collect();

        stale
            .into_iter()
            .filter_map(|key| {
                let partial = self.buffers.remove(&key)?;
                let (sender, message_id) = key;
                Some((
                    sender,
                    TransportError::ReassemblyTimeout {
                        sender,
                        message_id,
                        received: partial.parts.len(),
                        total: partial.total as usize,
                    },
                ))
            })
            .collect()
    }
}

fn decode<T: DeserializeOwned>(from: Address, bytes: &[u8]) -> Inbound<T> {
    match serde_json::from_slice::<T>(bytes) {
        Ok(payload) => Inbound::Message { from, payload },
        Err(e) => Inbound::Failure {
            from,
            error: e.into(),
        },
    }
}

/// Runs the receive side of the endpoint bound at `local` until either end
/// goes away.
///
/// Frames are reassembled, decoded as `T` and forwarded to `owner`. With a
/// reassembly timeout configured, stale partial messages are swept and
/// reported as failures.
pub fn spawn_receive_loop<T, E>(
    local: Address,
    mut frames: mpsc::UnboundedReceiver<Frame>,
    owner: mpsc::UnboundedSender<E>,
    config: TransportConfig,
) -> JoinHandle<()>
where
    T: DeserializeOwned + Send + 'static,
    E: From<Inbound<T>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut reassembler = Reassembler::for_config(&config).with_recipient(local);
        let mut sweep = tokio::time::interval(config.sweep_interval.max(Duration::from_millis(1)));
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                frame = frames.recv() => {
                    let Some(frame) = frame else { break };
                    let sender = frame.sender;
                    let inbound = match reassembler.accept(frame) {
                        Ok(Some((from, bytes))) => decode::<T>(from, &bytes),
                        Ok(None) => continue,
                        Err(error) => Inbound::Failure { from: sender, error },
                    };
                    if owner.send(E::from(inbound)).is_err() {
                        break;
                    }
                }
                _ = sweep.tick(), if config.reassembly_timeout.is_some() => {
                    let Some(timeout) = config.reassembly_timeout else { continue };
                    for (from, error) in reassembler.expire(Instant::now(), timeout) {
                        log::warn!("{}", error);
                        if owner.send(E::from(Inbound::Failure { from, error })).is_err() {
                            return;
                        }
                    }
                }
                _ = owner.closed() => break,
            }
        }
        if reassembler.pending() > 0 {
            log::debug!(
                "Receive loop stopped with {} incomplete messages",
                reassembler.pending()
            );
        }
    })
}
