use std::sync::Arc;

use futures::future::join_all;

use crate::core::config::MinerConfig;
use crate::core::coordinator::{Coordinator, MiningReport};
use crate::core::input::InputSource;
use crate::core::telemetry::Telemetry;
use crate::core::transport::Network;
use crate::core::worker::containment::{ContainmentCheck, HashedContainment};
use crate::core::worker::{Worker, WorkerSummary};
use crate::error::MinerError;

const DEFAULT_WORKERS: usize = 4;

/// A coordinator and a pool of workers sharing one in-process network.
pub struct LocalCluster {
    config: MinerConfig,
    workers: usize,
    sources: Vec<Box<dyn InputSource>>,
    checker: Arc<dyn ContainmentCheck>,
    telemetry: Option<Arc<dyn Telemetry>>,
}

impl Default for LocalCluster {
    fn default() -> Self {
        Self::new(MinerConfig::default())
    }
}

impl LocalCluster {
    pub fn new(config: MinerConfig) -> Self {
        LocalCluster {
            config,
            workers: DEFAULT_WORKERS,
            sources: Vec::new(),
            checker: Arc::new(HashedContainment),
            telemetry: None,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        assert!(workers > 0, "A cluster needs at least one worker");
        self.workers = workers;
        self
    }

    pub fn with_source(mut self, source: impl InputSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn with_checker(mut self, checker: Arc<dyn ContainmentCheck>) -> Self {
        self.checker = checker;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Mines every source and returns once all workers have stopped.
    pub async fn run(self) -> Result<MiningReport, MinerError> {
        let validation = self.config.validate();
        validation.log_summary();
        if !validation.is_safe() {
            return Err(MinerError::InvalidConfig(validation.errors().join("; ")));
        }

        let network = Network::new(self.config.transport.max_frame_bytes);
        let mut coordinator = Coordinator::bind(&network, self.config.clone(), self.sources)?;
        if let Some(telemetry) = self.telemetry {
            coordinator = coordinator.with_telemetry(telemetry);
        }
        let handle = coordinator.handle();
        let mining = tokio::spawn(coordinator.run());

        let workers: Vec<_> = (0..self.workers)
            .map(|_| {
                Worker::new(&network, handle.address(), self.config.transport.clone())
                    .with_checker(Arc::clone(&self.checker))
                    .spawn()
            })
            .collect();
        log::info!("Started {} workers", workers.len());
        handle.start()?;

        let report = mining
            .await
            .map_err(|e| MinerError::Join(e.to_string()))??;

        for outcome in join_all(workers).await {
            match outcome {
                Ok(Ok(WorkerSummary {
                    id,
                    tasks_completed,
                    ..
                })) => log::debug!("Worker {} completed {} tasks", id, tasks_completed),
                Ok(Err(e)) => log::warn!("Worker stopped with an error: {}", e),
                Err(e) => log::warn!("Worker task failed: {}", e),
            }
        }
        Ok(report)
    }
}
