use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::core::messages::WorkerId;
use crate::core::transport::Endpoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    Reachable,
    Unreachable,
}

/// A live worker and the capability to push frames to it.
pub struct WorkerHandle {
    pub id: WorkerId,
    pub endpoint: Arc<dyn Endpoint>,
    pub status: Reachability,
    /// Completions recorded for this worker.
    pub completed: usize,
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint.address())
            .field("status", &self.status)
            .field("completed", &self.completed)
            .finish()
    }
}

/// The set of currently known workers, keyed by worker id.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: HashMap<WorkerId, WorkerHandle>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a worker. Returns `false` if it was already known.
    pub fn register(&mut self, id: WorkerId, endpoint: Arc<dyn Endpoint>) -> bool {
        if self.workers.contains_key(&id) {
            return false;
        }
        self.workers.insert(
            id,
            WorkerHandle {
                id,
                endpoint,
                status: Reachability::Reachable,
                completed: 0,
            },
        );
        true
    }

    /// Removes a worker. Any task it held must be requeued by the caller.
    pub fn deregister(&mut self, id: WorkerId) -> Option<WorkerHandle> {
        self.workers.remove(&id)
    }

    pub fn mark_unreachable(&mut self, id: WorkerId) {
        if let Some(handle) = self.workers.get_mut(&id) {
            handle.status = Reachability::Unreachable;
        }
    }

    pub fn record_completion(&mut self, id: WorkerId) {
        if let Some(handle) = self.workers.get_mut(&id) {
            handle.completed += 1;
        }
    }

    pub fn get(&self, id: WorkerId) -> Option<&WorkerHandle> {
        self.workers.get(&id)
    }

    pub fn contains(&self, id: WorkerId) -> bool {
        self.workers.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Ids of reachable workers, sorted so dispatch order is repeatable.
    pub fn reachable_ids(&self) -> Vec<WorkerId> {
        let mut ids: Vec<WorkerId> = self
            .workers
            .values()
            .filter(|w| w.status == Reachability::Reachable)
            .map(|w| w.id)
            .collect();
        ids.sort();
        ids
    }

    pub fn for_each_worker<F: FnMut(&WorkerHandle)>(&self, f: F) {
        self.workers.values().for_each(f);
    }
}
