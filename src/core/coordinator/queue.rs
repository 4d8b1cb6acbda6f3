use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::index::Column;
use crate::core::messages::{TaskMessage, WorkerId};
use crate::error::QueueError;

/// Monotonically assigned task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    InFlight(WorkerId),
    Completed,
}

/// One ordered column pair awaiting a containment check.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub referenced: Arc<Column>,
    pub dependent: Arc<Column>,
    pub state: TaskState,
}

impl Task {
    pub fn message(&self) -> TaskMessage {
        TaskMessage {
            task_id: self.id,
            column1: Arc::clone(&self.referenced),
            column2: Arc::clone(&self.dependent),
        }
    }
}

/// Pending tasks in dispatch order plus the one in-flight task per worker.
#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: HashMap<TaskId, Task>,
    pending: VecDeque<TaskId>,
    assignments: HashMap<WorkerId, TaskId>,
    next_id: u64,
    total: usize,
    completed: usize,
    requeued: usize,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a pending task and returns its id.
    pub fn push(&mut self, referenced: Arc<Column>, dependent: Arc<Column>) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.tasks.insert(
            id,
            Task {
                id,
                referenced,
                dependent,
                state: TaskState::Pending,
            },
        );
        self.pending.push_back(id);
        self.total += 1;
        id
    }

    /// Turns `(referenced, dependent)` pairs into pending tasks.
    pub fn materialize<I>(&mut self, pairs: I) -> usize
    where
        I: IntoIterator<Item = (Arc<Column>, Arc<Column>)>,
    {
        let before = self.total;
        for (referenced, dependent) in pairs {
            self.push(referenced, dependent);
        }
        self.total - before
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.assignments.len()
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn requeued(&self) -> usize {
        self.requeued
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Nothing pending and nothing in flight.
    pub fn is_drained(&self) -> bool {
        self.pending.is_empty() && self.assignments.is_empty()
    }

    pub fn in_flight_for(&self, worker: WorkerId) -> Option<TaskId> {
        self.assignments.get(&worker).copied()
    }

    pub fn is_idle(&self, worker: WorkerId) -> bool {
        !self.assignments.contains_key(&worker)
    }

    /// Hands the next pending task to `worker`.
    ///
    /// A worker holding a task gets nothing until that task completes.
    pub fn assign_next(&mut self, worker: WorkerId) -> Result<Option<&Task>, QueueError> {
        if let Some(&task) = self.assignments.get(&worker) {
            return Err(QueueError::WorkerBusy { worker, task });
        }
        let Some(id) = self.pending.pop_front() else {
            return Ok(None);
        };
        let Some(task) = self.tasks.get_mut(&id) else {
            return Ok(None);
        };
        task.state = TaskState::InFlight(worker);
        self.assignments.insert(worker, id);
        Ok(Some(&*task))
    }

    /// Records the completion of `id` by `worker` and drops the task.
    pub fn complete(&mut self, id: TaskId, worker: WorkerId) -> Result<Task, QueueError> {
        if self.assignments.get(&worker) != Some(&id) {
            return Err(QueueError::StaleCompletion { worker, task: id });
        }
        self.assignments.remove(&worker);
        let mut task = self
            .tasks
            .remove(&id)
            .ok_or(QueueError::StaleCompletion { worker, task: id })?;
        task.state = TaskState::Completed;
        self.completed += 1;
        Ok(task)
    }

    /// Returns the task held by `worker`, if any, to the back of the queue.
    pub fn requeue(&mut self, worker: WorkerId) -> Option<TaskId> {
        let id = self.assignments.remove(&worker)?;
        if let Some(task) = self.tasks.get_mut(&id) {
            task.state = TaskState::Pending;
        }
        self.pending.push_back(id);
        self.requeued += 1;
        Some(id)
    }
}
