use thiserror::Error;
use uuid::Uuid;

use crate::core::coordinator::queue::TaskId;
use crate::core::transport::Address;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Frame of {size} bytes exceeds the substrate limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("Endpoint {0} is closed")]
    EndpointClosed(Address),

    #[error("No endpoint bound at {0}")]
    UnknownAddress(Address),

    #[error("Address {0} is already bound")]
    AddressInUse(Address),

    #[error("Malformed frame for message {message_id}: {reason}")]
    MalformedFrame { message_id: Uuid, reason: String },

    #[error("Message {message_id} from {sender} timed out after {received}/{total} frames")]
    ReassemblyTimeout {
        sender: Address,
        message_id: Uuid,
        received: usize,
        total: usize,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("Unknown input source: {0}")]
    UnknownSource(usize),

    #[error("No header received yet for source {0}")]
    MissingHeader(usize),

    #[error("Column position {position} is out of range for source {source_id}")]
    PositionOutOfRange { source_id: usize, position: usize },

    #[error("Column index is frozen")]
    Frozen,

    #[error("Column index is still ingesting")]
    NotFrozen,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Worker {worker} already holds task {task}")]
    WorkerBusy { worker: Address, task: TaskId },

    #[error("Completion of task {task} from {worker} does not match an in-flight task")]
    StaleCompletion { worker: Address, task: TaskId },
}

#[derive(Debug, Error)]
pub enum MinerError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Ingestion of {source_name} failed: {reason}")]
    Ingestion { source_name: String, reason: String },

    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("Results were already finalized")]
    AlreadyFinalized,

    #[error("Task join error: {0}")]
    Join(String),
}

pub type Result<T, E = MinerError> = std::result::Result<T, E>;
