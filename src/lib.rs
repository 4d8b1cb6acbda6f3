//! # ind-miner
//!
//! Distributed discovery of unary inclusion dependencies across tabular files.
//!
//! A coordinator reads every input file into per-column value sets, turns each
//! ordered pair of distinct columns into a containment check, and hands those
//! checks out to a pool of workers one at a time. Workers answer with whether
//! the dependent column's values all occur in the referenced column. Every
//! message between processes goes through a chunked transport that splits
//! payloads larger than the substrate's frame limit and reassembles them on the
//! other side.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ind_miner::prelude::*;
//!
//! # async fn demo() -> Result<(), MinerError> {
//! let report = LocalCluster::new(MinerConfig::default())
//!     .with_workers(4)
//!     .with_source(MemorySource::from_columns(
//!         "orders.csv",
//!         vec![("customer", vec!["1", "2"])],
//!     ))
//!     .with_source(MemorySource::from_columns(
//!         "customers.csv",
//!         vec![("id", vec!["1", "2", "3"])],
//!     ))
//!     .run()
//!     .await?;
//!
//! for ind in &report.dependencies {
//!     println!("{}", ind);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`error`]: Error types for every layer
//! - [`prelude`]: Commonly used types and traits (import with `use ind_miner::prelude::*`)
//! - [`transport_prelude`]: Only the chunked transport

// ============================================================================
// Core Module
// ============================================================================

mod core;
pub mod error;

// ============================================================================
// Public Re-exports - Granular Imports
// ============================================================================

// Configuration and validation
pub use crate::core::config::{MinerConfig, TransportConfig};
pub use crate::core::validation::{ValidationIssue, ValidationResult};

// Transport
pub use crate::core::transport::{
    Address, ChannelEndpoint, ChunkSender, Endpoint, Frame, Inbound, Network, Reassembler,
    spawn_receive_loop,
};

// Data model and messages
pub use crate::core::index::{Column, ColumnIdentity, ColumnIndex, SourceId};
pub use crate::core::messages::{
    BatchMessage, CompletionMessage, HeaderMessage, RegistrationMessage, TaskMessage,
    ToCoordinator, ToWorker, WorkerId,
};

// Coordinator
pub use crate::core::coordinator::aggregator::{InclusionDependency, ResultAggregator};
pub use crate::core::coordinator::queue::{Task, TaskId, TaskQueue, TaskState};
pub use crate::core::coordinator::registry::{Reachability, WorkerHandle, WorkerRegistry};
pub use crate::core::coordinator::{
    Coordinator, CoordinatorEvent, CoordinatorHandle, MiningReport, Phase,
};

// Input
pub use crate::core::input::{InputReader, InputSource, MemorySource, ReaderRequest};

// Workers
pub use crate::core::worker::containment::{ContainmentCheck, HashedContainment, SortedMergeContainment};
pub use crate::core::worker::{Worker, WorkerSummary};

// Harness and telemetry
pub use crate::core::cluster::LocalCluster;
pub use crate::core::telemetry::{MemoryTelemetry, Telemetry, TraceEntry, TraceKind};

pub use error::{IndexError, MinerError, QueueError, TransportError};

// ============================================================================
// Prelude Modules - Convenient Bulk Imports
// ============================================================================

/// The main prelude: everything needed to run a mining job.
///
/// # Example
/// ```rust
/// use ind_miner::prelude::*;
/// ```
pub mod prelude {
    pub use super::{
        // Workers
        ContainmentCheck,
        // Coordinator
        Coordinator,
        CoordinatorHandle,
        HashedContainment,
        InclusionDependency,
        // Input
        InputSource,
        // Harness
        LocalCluster,
        MemorySource,
        MemoryTelemetry,
        // Config
        MinerConfig,
        MinerError,
        MiningReport,
        Network,
        SortedMergeContainment,
        Telemetry,
        TraceKind,
        TransportConfig,
        Worker,
    };
}

/// Prelude for using the chunked transport on its own.
///
/// # Example
/// ```rust
/// use ind_miner::transport_prelude::*;
/// ```
pub mod transport_prelude {
    pub use super::{
        Address, ChunkSender, Endpoint, Frame, Inbound, Network, Reassembler, TransportConfig,
        TransportError, spawn_receive_loop,
    };
}

// ============================================================================
// Library Metadata
// ============================================================================

/// The version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The name of this crate.
pub const NAME: &str = env!("CARGO_PKG_NAME");
