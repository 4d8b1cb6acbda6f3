//! Worker processes: register with a coordinator, run containment checks,
//! report completions.

pub mod containment;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::core::config::TransportConfig;
use crate::core::messages::{
    CompletionMessage, RegistrationMessage, TaskMessage, ToCoordinator, ToWorker, WorkerId,
};
use crate::core::transport::{Address, ChunkSender, Endpoint, Inbound, Network, spawn_receive_loop};
use crate::error::MinerError;

use containment::{ContainmentCheck, HashedContainment};

/// What a worker did before it left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSummary {
    pub id: WorkerId,
    pub tasks_completed: usize,
    pub dependencies_found: usize,
}

pub struct Worker {
    id: WorkerId,
    network: Network,
    coordinator: Address,
    transport: TransportConfig,
    checker: Arc<dyn ContainmentCheck>,
}

impl Worker {
    pub fn new(network: &Network, coordinator: Address, transport: TransportConfig) -> Self {
        Worker {
            id: Address::random(),
            network: network.clone(),
            coordinator,
            transport,
            checker: Arc::new(HashedContainment),
        }
    }

    pub fn with_checker(mut self, checker: Arc<dyn ContainmentCheck>) -> Self {
        self.checker = checker;
        self
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn spawn(self) -> JoinHandle<Result<WorkerSummary, MinerError>> {
        tokio::spawn(self.run())
    }

    /// Registers with the coordinator and serves tasks until told to stop or
    /// until the coordinator's endpoint closes.
    ///
    /// Returning for any reason drops the worker's endpoint, which the
    /// coordinator observes as the loss of this worker.
    pub async fn run(self) -> Result<WorkerSummary, MinerError> {
        let frames = self.network.bind(self.id)?;
        let (inbox_tx, mut inbox) = mpsc::unbounded_channel::<Inbound<ToWorker>>();
        let _receive_loop = spawn_receive_loop::<ToWorker, Inbound<ToWorker>>(
            self.id,
            frames,
            inbox_tx,
            self.transport.clone(),
        );

        let coordinator = self.network.resolve(self.coordinator)?;
        let sender = ChunkSender::new(self.id);
        sender.send(
            &ToCoordinator::Registration(RegistrationMessage {
                worker_id: self.id,
                reply_endpoint: self.id,
            }),
            coordinator.as_ref(),
        )?;
        log::info!("Worker {} registered with {}", self.id, self.coordinator);

        let mut summary = WorkerSummary {
            id: self.id,
            tasks_completed: 0,
            dependencies_found: 0,
        };

        loop {
            let inbound = tokio::select! {
                biased;
                inbound = inbox.recv() => inbound,
                _ = coordinator.closed() => {
                    log::info!("Coordinator {} went away; worker {} leaving", self.coordinator, self.id);
                    break;
                }
            };
            let Some(inbound) = inbound else { break };
            match inbound {
                Inbound::Message {
                    payload: ToWorker::Task(task),
                    ..
                } => {
                    let found = self.check(task, &sender, coordinator.as_ref()).await?;
                    summary.tasks_completed += 1;
                    if found {
                        summary.dependencies_found += 1;
                    }
                }
                Inbound::Message {
                    payload: ToWorker::Shutdown,
                    ..
                } => {
                    log::debug!("Worker {} told to shut down", self.id);
                    break;
                }
                Inbound::Failure { from, error } => {
                    // a lost task would never be answered; leaving lets it be requeued
                    log::error!("Worker {} lost a message from {}: {}", self.id, from, error);
                    return Err(error.into());
                }
            }
        }

        self.network.unbind(self.id);
        log::info!(
            "Worker {} finished after {} tasks",
            self.id,
            summary.tasks_completed
        );
        Ok(summary)
    }

    async fn check(
        &self,
        task: TaskMessage,
        sender: &ChunkSender,
        coordinator: &dyn Endpoint,
    ) -> Result<bool, MinerError> {
        let TaskMessage {
            task_id,
            column1,
            column2,
        } = task;

        let checker = Arc::clone(&self.checker);
        let (referenced, dependent) = (Arc::clone(&column1), Arc::clone(&column2));
        let found = tokio::task::spawn_blocking(move || {
            checker.contains_all(&referenced.values, &dependent.values)
        })
        .await
        .map_err(|e| MinerError::Join(e.to_string()))?;

        if found {
            log::info!(
                "Worker {}: {} ⊆ {}",
                self.id,
                column2.identity(),
                column1.identity()
            );
        } else {
            log::debug!(
                "Worker {}: {} not in {}",
                self.id,
                column2.identity(),
                column1.identity()
            );
        }

        sender.send(
            &ToCoordinator::Completion(CompletionMessage {
                task_id,
                worker_id: self.id,
                column1: column1.identity(),
                column2: column2.identity(),
                found_dependency: found,
            }),
            coordinator,
        )?;
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::coordinator::queue::TaskId;
    use crate::core::index::Column;
    use crate::core::transport::{Frame, Reassembler};

    struct FakeCoordinator {
        frames: mpsc::UnboundedReceiver<Frame>,
        reassembler: Reassembler,
        sender: ChunkSender,
    }

    impl FakeCoordinator {
        fn bind(network: &Network) -> (Address, Self) {
            let address = Address::random();
            let frames = network.bind(address).unwrap();
            (
                address,
                FakeCoordinator {
                    frames,
                    reassembler: Reassembler::new(),
                    sender: ChunkSender::new(address),
                },
            )
        }

        async fn next(&mut self) -> ToCoordinator {
            loop {
                let frame = self.frames.recv().await.unwrap();
                if let Some((_, bytes)) = self.reassembler.accept(frame).unwrap() {
                    return serde_json::from_slice(&bytes).unwrap();
                }
            }
        }
    }

    fn column(name: &str, values: &[&str]) -> Arc<Column> {
        let mut column = Column::new(0, name, "t.csv");
        for value in values {
            column.add_value(*value);
        }
        Arc::new(column)
    }

    #[tokio::test]
    async fn test_worker_registers_checks_and_stops() {
        let network = Network::new(32);
        let (address, mut coordinator) = FakeCoordinator::bind(&network);
        let worker = Worker::new(&network, address, TransportConfig::default());
        let id = worker.id();
        let handle = worker.spawn();

        let reply = match coordinator.next().await {
            ToCoordinator::Registration(registration) => {
                assert_eq!(registration.worker_id, id);
                network.resolve(registration.reply_endpoint).unwrap()
            }
            other => panic!("expected registration, got {:?}", other),
        };

        // 32-byte frames force both the task and its answer to be chunked
        let task = ToWorker::Task(TaskMessage {
            task_id: TaskId(3),
            column1: column("a", &["1", "2", "3"]),
            column2: column("b", &["2", "3"]),
        });
        coordinator.sender.send(&task, reply.as_ref()).unwrap();

        match coordinator.next().await {
            ToCoordinator::Completion(completion) => {
                assert_eq!(completion.task_id, TaskId(3));
                assert_eq!(completion.worker_id, id);
                assert_eq!(completion.column1.name, "a");
                assert_eq!(completion.column2.name, "b");
                assert!(completion.found_dependency);
            }
            other => panic!("expected completion, got {:?}", other),
        }

        coordinator.sender.send(&ToWorker::Shutdown, reply.as_ref()).unwrap();
        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.tasks_completed, 1);
        assert_eq!(summary.dependencies_found, 1);
    }

    #[tokio::test]
    async fn test_worker_without_coordinator_fails() {
        let network = Network::new(32);
        let worker = Worker::new(&network, Address::random(), TransportConfig::default());
        assert!(matches!(
            worker.run().await,
            Err(MinerError::Transport(_))
        ));
    }
}
