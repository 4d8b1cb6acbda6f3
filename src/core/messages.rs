//! Message types exchanged between the coordinator, workers and input readers.
//!
//! `ToWorker` and `ToCoordinator` cross process boundaries and always travel
//! through the chunked transport. Header and batch messages stay inside the
//! coordinator's process.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::coordinator::queue::TaskId;
use crate::core::index::{Column, ColumnIdentity, SourceId};
use crate::core::transport::Address;

/// Workers are identified by the address they receive tasks on.
pub type WorkerId = Address;

/// One containment check: is `column2` included in `column1`?
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMessage {
    pub task_id: TaskId,
    /// The referenced column.
    pub column1: Arc<Column>,
    /// The dependent candidate.
    pub column2: Arc<Column>,
}

/// A worker's answer to exactly one [`TaskMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMessage {
    pub task_id: TaskId,
    pub worker_id: WorkerId,
    pub column1: ColumnIdentity,
    pub column2: ColumnIdentity,
    pub found_dependency: bool,
}

/// Sent once by a worker when it joins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationMessage {
    pub worker_id: WorkerId,
    /// Where the coordinator should push tasks for this worker.
    pub reply_endpoint: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ToWorker {
    Task(TaskMessage),
    /// Mining is over; the worker should leave.
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ToCoordinator {
    Registration(RegistrationMessage),
    Completion(CompletionMessage),
}

/// Column names of one input file, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderMessage {
    pub source_id: SourceId,
    pub column_names: Vec<String>,
}

/// A batch of rows from one input file. Empty means end of data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchMessage {
    pub source_id: SourceId,
    pub rows: Vec<Vec<String>>,
}

impl BatchMessage {
    pub fn is_end_of_data(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_message_serialization() {
        let mut referenced = Column::new(0, "id", "a.csv");
        referenced.add_value("1");
        referenced.add_value("2");
        let dependent = Column::new(1, "ref_id", "b.csv");

        let message = ToWorker::Task(TaskMessage {
            task_id: TaskId(7),
            column1: Arc::new(referenced.clone()),
            column2: Arc::new(dependent),
        });

        let json = serde_json::to_string(&message).unwrap();
        let back: ToWorker = serde_json::from_str(&json).unwrap();
        match back {
            ToWorker::Task(task) => {
                assert_eq!(task.task_id, TaskId(7));
                assert_eq!(*task.column1, referenced);
                assert!(task.column2.is_empty());
            }
            ToWorker::Shutdown => panic!("expected a task"),
        }
    }

    #[test]
    fn test_registration_serialization() {
        let id = Address::random();
        let message = ToCoordinator::Registration(RegistrationMessage {
            worker_id: id,
            reply_endpoint: id,
        });

        let json = serde_json::to_string(&message).unwrap();
        let back: ToCoordinator = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            back,
            ToCoordinator::Registration(RegistrationMessage { worker_id, .. }) if worker_id == id
        ));
    }

    #[test]
    fn test_empty_batch_is_end_of_data() {
        let batch = BatchMessage {
            source_id: 0,
            rows: Vec::new(),
        };
        assert!(batch.is_end_of_data());
    }
}
