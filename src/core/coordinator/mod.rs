//! The coordinator process: ingestion, scheduling, dispatch and result
//! aggregation, driven by a single inbound event queue.
//!
//! Every state change happens on the task that runs [`Coordinator::run`]:
//! reader output, worker registrations, completions, worker loss and
//! transport failures all arrive as [`CoordinatorEvent`]s and are handled
//! one at a time.

pub mod aggregator;
pub mod queue;
pub mod registry;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::core::config::MinerConfig;
use crate::core::index::{ColumnIndex, SourceId};
use crate::core::input::{InputReader, InputSource, ReaderRequest};
use crate::core::messages::{
    BatchMessage, CompletionMessage, HeaderMessage, RegistrationMessage, ToCoordinator, ToWorker,
    WorkerId,
};
use crate::core::telemetry::{Telemetry, TraceEntry, TraceKind};
use crate::core::transport::{Address, ChunkSender, Endpoint, Inbound, Network, spawn_receive_loop};
use crate::error::{MinerError, TransportError};

use aggregator::{InclusionDependency, ResultAggregator};
use queue::{TaskId, TaskQueue};
use registry::{Reachability, WorkerRegistry};

/// Everything the coordinator reacts to.
#[derive(Debug)]
pub enum CoordinatorEvent {
    /// Begin reading the input sources.
    Start,
    Header(HeaderMessage),
    Batch(BatchMessage),
    Registration(RegistrationMessage),
    Completion(CompletionMessage),
    WorkerLost(WorkerId),
    TransportFailure { from: Address, error: TransportError },
}

impl From<Inbound<ToCoordinator>> for CoordinatorEvent {
    fn from(inbound: Inbound<ToCoordinator>) -> Self {
        match inbound {
            Inbound::Message {
                payload: ToCoordinator::Registration(registration),
                ..
            } => CoordinatorEvent::Registration(registration),
            Inbound::Message {
                payload: ToCoordinator::Completion(completion),
                ..
            } => CoordinatorEvent::Completion(completion),
            Inbound::Failure { from, error } => CoordinatorEvent::TransportFailure { from, error },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Ingesting,
    Scheduling,
    Draining,
    Finalized,
}

/// Cheap, cloneable access to a running coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    address: Address,
    events: mpsc::UnboundedSender<CoordinatorEvent>,
}

impl CoordinatorHandle {
    /// Address workers register with.
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn start(&self) -> Result<(), MinerError> {
        self.send(CoordinatorEvent::Start)
    }

    pub fn send(&self, event: CoordinatorEvent) -> Result<(), MinerError> {
        self.events
            .send(event)
            .map_err(|_| MinerError::ChannelClosed("coordinator events"))
    }
}

/// The final result of a mining run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningReport {
    /// Confirmed dependencies in the order their completions arrived.
    pub dependencies: Vec<InclusionDependency>,
    pub tasks_total: usize,
    pub tasks_completed: usize,
    pub tasks_requeued: usize,
    pub workers_seen: usize,
    pub elapsed: Duration,
}

pub struct Coordinator {
    address: Address,
    network: Network,
    phase: Phase,
    events_tx: mpsc::UnboundedSender<CoordinatorEvent>,
    events: mpsc::UnboundedReceiver<CoordinatorEvent>,
    sender: ChunkSender,
    readers: Vec<mpsc::UnboundedSender<ReaderRequest>>,
    index: ColumnIndex,
    queue: TaskQueue,
    registry: WorkerRegistry,
    results: ResultAggregator,
    workers_seen: HashSet<WorkerId>,
    telemetry: Option<Arc<dyn Telemetry>>,
    started: Option<Instant>,
    receive_loop: JoinHandle<()>,
}

impl Coordinator {
    /// Binds a fresh coordinator address on `network` and spawns one reader
    /// per source. Nothing is read until [`CoordinatorHandle::start`].
    pub fn bind(
        network: &Network,
        config: MinerConfig,
        sources: Vec<Box<dyn InputSource>>,
    ) -> Result<Self, MinerError> {
        let address = Address::random();
        let frames = network.bind(address)?;
        let (events_tx, events) = mpsc::unbounded_channel();
        let receive_loop = spawn_receive_loop::<ToCoordinator, CoordinatorEvent>(
            address,
            frames,
            events_tx.clone(),
            config.transport.clone(),
        );

        let index = ColumnIndex::new(sources.iter().map(|s| s.name().to_string()));
        let readers = sources
            .into_iter()
            .enumerate()
            .map(|(id, source)| InputReader::spawn(id, source, config.batch_size, events_tx.clone()))
            .collect();

        log::info!("Coordinator bound at {}", address);

        Ok(Coordinator {
            address,
            network: network.clone(),
            phase: Phase::Ingesting,
            events_tx,
            events,
            sender: ChunkSender::new(address),
            readers,
            index,
            queue: TaskQueue::new(),
            registry: WorkerRegistry::new(),
            results: ResultAggregator::new(),
            workers_seen: HashSet::new(),
            telemetry: None,
            started: None,
            receive_loop,
        })
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle {
            address: self.address,
            events: self.events_tx.clone(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Processes events until every task has a recorded completion.
    pub async fn run(mut self) -> Result<MiningReport, MinerError> {
        while let Some(event) = self.events.recv().await {
            self.handle_event(event)?;
            if self.phase == Phase::Finalized {
                return self.finish();
            }
        }
        Err(MinerError::ChannelClosed("coordinator events"))
    }

    fn handle_event(&mut self, event: CoordinatorEvent) -> Result<(), MinerError> {
        match (self.phase, event) {
            (Phase::Ingesting, CoordinatorEvent::Start) => self.on_start(),
            (_, CoordinatorEvent::Start) => {
                log::warn!("Start received in phase {:?}; ignoring", self.phase);
                Ok(())
            }
            (Phase::Ingesting, CoordinatorEvent::Header(header)) => {
                self.on_header(header);
                Ok(())
            }
            (Phase::Ingesting, CoordinatorEvent::Batch(batch)) => self.on_batch(batch),
            (phase, CoordinatorEvent::Header(_) | CoordinatorEvent::Batch(_)) => {
                log::debug!("Input received in phase {:?}; ignoring", phase);
                Ok(())
            }
            (_, CoordinatorEvent::Registration(registration)) => {
                self.on_registration(registration);
                Ok(())
            }
            (_, CoordinatorEvent::Completion(completion)) => self.on_completion(completion),
            (_, CoordinatorEvent::WorkerLost(worker)) => {
                self.on_worker_lost(worker);
                Ok(())
            }
            (_, CoordinatorEvent::TransportFailure { from, error }) => {
                self.on_transport_failure(from, error);
                Ok(())
            }
        }
    }

    fn on_start(&mut self) -> Result<(), MinerError> {
        if self.started.is_some() {
            log::warn!("Mining already started; ignoring");
            return Ok(());
        }
        self.started = Some(Instant::now());

        if self.readers.is_empty() {
            log::info!("No input sources; nothing to read");
            return self.schedule();
        }
        log::info!("Reading {} input sources", self.readers.len());
        for source in 0..self.readers.len() {
            self.request(source, ReaderRequest::ReadHeader);
            self.request(source, ReaderRequest::ReadBatch);
        }
        Ok(())
    }

    fn request(&self, source: SourceId, request: ReaderRequest) {
        let Some(reader) = self.readers.get(source) else {
            return;
        };
        if reader.send(request).is_err() {
            log::debug!("Reader for source {} has already stopped", source);
        }
    }

    fn source_name(&self, source: SourceId) -> &str {
        self.index.file_name(source).unwrap_or("<unknown>")
    }

    fn on_header(&mut self, header: HeaderMessage) {
        let HeaderMessage {
            source_id,
            column_names,
        } = header;
        log::debug!(
            "Header of {}: {:?}",
            self.source_name(source_id),
            column_names
        );
        if let Err(e) = self.index.set_header(source_id, column_names) {
            log::warn!("Ignoring header for source {}: {}", source_id, e);
        }
    }

    fn on_batch(&mut self, batch: BatchMessage) -> Result<(), MinerError> {
        let BatchMessage { source_id, rows } = batch;

        if rows.is_empty() {
            match self.index.finalize_file(source_id) {
                Ok(all_read) => {
                    log::info!("Finished reading {}", self.source_name(source_id));
                    if all_read {
                        log::info!("All files read");
                        return self.schedule();
                    }
                }
                Err(e) => log::warn!("Ignoring end of data for source {}: {}", source_id, e),
            }
            return Ok(());
        }

        log::debug!(
            "Received batch of {} rows from {}",
            rows.len(),
            self.source_name(source_id)
        );
        if let Err(e) = self.index.ingest_rows(source_id, rows) {
            log::warn!(
                "Dropping rest of batch from {}: {}",
                self.source_name(source_id),
                e
            );
        }
        self.request(source_id, ReaderRequest::ReadBatch);
        Ok(())
    }

    fn schedule(&mut self) -> Result<(), MinerError> {
        self.phase = Phase::Scheduling;
        let pairs = self.index.ordered_pairs()?;
        let created = self.queue.materialize(pairs);
        log::info!(
            "Scheduled {} tasks over {} columns",
            created,
            self.index.len()
        );

        self.phase = Phase::Draining;
        self.dispatch_idle();
        self.check_finished();
        Ok(())
    }

    /// Gives every idle, reachable worker a task while tasks remain.
    ///
    /// A worker whose push fails is marked unreachable and skipped from then
    /// on; its task goes back to the queue.
    fn dispatch_idle(&mut self) {
        if self.phase != Phase::Draining {
            return;
        }
        for worker in self.registry.reachable_ids() {
            if !self.queue.has_pending() {
                break;
            }
            if self.queue.is_idle(worker) {
                self.dispatch_to(worker);
            }
        }
    }

    fn dispatch_to(&mut self, worker: WorkerId) {
        let Some(endpoint) = self
            .registry
            .get(worker)
            .filter(|w| w.status == Reachability::Reachable)
            .map(|w| Arc::clone(&w.endpoint))
        else {
            return;
        };
        let message = match self.queue.assign_next(worker) {
            Ok(Some(task)) => task.message(),
            Ok(None) => return,
            Err(e) => {
                log::debug!("Not dispatching: {}", e);
                return;
            }
        };
        let task_id = message.task_id;

        match self.sender.send(&ToWorker::Task(message), endpoint.as_ref()) {
            Ok(_) => {
                log::debug!(
                    "Dispatched task {} to {}; {} tasks remaining",
                    task_id,
                    worker,
                    self.queue.pending_len()
                );
                self.trace(TraceKind::Dispatched, Some(task_id), worker);
            }
            Err(e) => {
                // stays registered until its watch reports the loss
                log::warn!("Could not dispatch task {} to {}: {}", task_id, worker, e);
                self.registry.mark_unreachable(worker);
                self.requeue(worker);
                self.dispatch_idle();
            }
        }
    }

    fn on_registration(&mut self, registration: RegistrationMessage) {
        let worker = registration.worker_id;
        if let Some(existing) = self.registry.get(worker) {
            if !existing.endpoint.is_closed() {
                log::debug!("Worker {} registered twice", worker);
                return;
            }
            log::info!("Worker {} re-registered from a fresh endpoint", worker);
            self.on_worker_lost(worker);
        }
        let endpoint = match self.network.resolve(registration.reply_endpoint) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                log::warn!("Cannot reach registering worker {}: {}", worker, e);
                return;
            }
        };

        self.registry.register(worker, Arc::clone(&endpoint));
        self.workers_seen.insert(worker);
        log::info!(
            "Registered worker {} ({} workers)",
            worker,
            self.registry.len()
        );
        self.watch(worker, endpoint);

        if self.phase == Phase::Draining {
            self.dispatch_to(worker);
        }
    }

    /// Injects `WorkerLost` once the worker's endpoint goes away.
    fn watch(&self, worker: WorkerId, endpoint: Arc<dyn Endpoint>) {
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            endpoint.closed().await;
            let _ = events.send(CoordinatorEvent::WorkerLost(worker));
        });
    }

    fn on_completion(&mut self, completion: CompletionMessage) -> Result<(), MinerError> {
        let CompletionMessage {
            task_id,
            worker_id,
            column1,
            column2,
            found_dependency,
        } = completion;

        if let Err(e) = self.queue.complete(task_id, worker_id) {
            log::warn!("Ignoring completion: {}", e);
            return Ok(());
        }
        self.registry.record_completion(worker_id);
        self.trace(TraceKind::Completed, Some(task_id), worker_id);

        if found_dependency {
            let ind = InclusionDependency::new(column2, column1);
            log::info!("Found {}", ind);
            self.results.record(ind)?;
        }

        self.dispatch_to(worker_id);
        log::debug!(
            "{} of {} tasks completed",
            self.queue.completed(),
            self.queue.total()
        );
        self.check_finished();
        Ok(())
    }

    fn on_worker_lost(&mut self, worker: WorkerId) {
        if let Some(current) = self.registry.get(worker) {
            if !current.endpoint.is_closed() {
                // a watch on an endpoint this worker has since replaced
                log::debug!("Worker {} is still reachable; ignoring loss notice", worker);
                return;
            }
        }
        if self.registry.deregister(worker).is_none() {
            return;
        }
        log::warn!(
            "Lost worker {} ({} workers left)",
            worker,
            self.registry.len()
        );
        self.trace(TraceKind::WorkerLost, None, worker);
        self.requeue(worker);
        self.dispatch_idle();
    }

    fn on_transport_failure(&mut self, from: Address, error: TransportError) {
        match error {
            TransportError::ReassemblyTimeout { .. } => {
                log::warn!("Transport failure from {}: {}", from, error);
                // the lost message may have been the sender's completion
                if self.requeue(from).is_some() {
                    self.dispatch_idle();
                }
            }
            other => {
                // says nothing about the sender's task, which stays in flight
                log::warn!("Dropping undeliverable message from {}: {}", from, other);
            }
        }
    }

    fn requeue(&mut self, worker: WorkerId) -> Option<TaskId> {
        let task = self.queue.requeue(worker)?;
        log::info!("Requeued task {} held by {}", task, worker);
        self.trace(TraceKind::Requeued, Some(task), worker);
        Some(task)
    }

    fn check_finished(&mut self) {
        if self.phase == Phase::Draining && self.queue.is_drained() {
            self.phase = Phase::Finalized;
        }
    }

    fn trace(&self, kind: TraceKind, task: Option<TaskId>, worker: WorkerId) {
        if let Some(telemetry) = &self.telemetry {
            telemetry.record(TraceEntry::now(kind, task, worker));
        }
    }

    fn finish(&mut self) -> Result<MiningReport, MinerError> {
        let dependencies = self.results.finalize()?;

        let mut workers = Vec::new();
        self.registry
            .for_each_worker(|w| workers.push(Arc::clone(&w.endpoint)));
        for endpoint in workers {
            if let Err(e) = self.sender.send(&ToWorker::Shutdown, endpoint.as_ref()) {
                log::debug!("Could not stop worker {}: {}", endpoint.address(), e);
            }
        }

        let elapsed = self.started.map(|t| t.elapsed()).unwrap_or_default();
        log::info!("Finished mining within {} ms", elapsed.as_millis());
        log::info!("Found {} inclusion dependencies", dependencies.len());

        if let Some(telemetry) = &self.telemetry {
            telemetry.flush();
        }
        self.receive_loop.abort();
        self.network.unbind(self.address);

        Ok(MiningReport {
            dependencies,
            tasks_total: self.queue.total(),
            tasks_completed: self.queue.completed(),
            tasks_requeued: self.queue.requeued(),
            workers_seen: self.workers_seen.len(),
            elapsed,
        })
    }
}
