//! Input sources and the reader tasks that feed them to the coordinator.
//!
//! A reader only reads when asked. The coordinator requests the header and
//! the first batch on start, then one more batch after every non-empty batch
//! it has ingested, so a slow coordinator is never flooded with rows.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::coordinator::CoordinatorEvent;
use crate::core::index::SourceId;
use crate::core::messages::{BatchMessage, HeaderMessage};
use crate::error::MinerError;

/// A tabular input with a header row.
#[async_trait]
pub trait InputSource: Send {
    /// File name the source's columns are reported under.
    fn name(&self) -> &str;

    async fn header(&mut self) -> Result<Vec<String>, MinerError>;

    /// Up to `max_rows` rows. An empty vector means the source is exhausted.
    async fn next_batch(&mut self, max_rows: usize) -> Result<Vec<Vec<String>>, MinerError>;
}

/// An [`InputSource`] over rows held in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    header: Vec<String>,
    rows: VecDeque<Vec<String>>,
}

impl MemorySource {
    pub fn new<S: Into<String>>(name: impl Into<String>, header: impl IntoIterator<Item = S>) -> Self {
        MemorySource {
            name: name.into(),
            header: header.into_iter().map(Into::into).collect(),
            rows: VecDeque::new(),
        }
    }

    pub fn with_row<S: Into<String>>(mut self, row: impl IntoIterator<Item = S>) -> Self {
        self.rows.push_back(row.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_rows<R, S>(mut self, rows: impl IntoIterator<Item = R>) -> Self
    where
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for row in rows {
            self = self.with_row(row);
        }
        self
    }

    /// Builds a source from column-major data: `columns[i]` holds the values of
    /// `header[i]`. Shorter columns are padded with empty strings.
    pub fn from_columns(name: impl Into<String>, columns: Vec<(&str, Vec<&str>)>) -> Self {
        let height = columns.iter().map(|(_, values)| values.len()).max().unwrap_or(0);
        let header: Vec<&str> = columns.iter().map(|(name, _)| *name).collect();
        let mut source = MemorySource::new(name, header);
        for row in 0..height {
            let values: Vec<&str> = columns
                .iter()
                .map(|(_, values)| values.get(row).copied().unwrap_or(""))
                .collect();
            source = source.with_row(values);
        }
        source
    }

    pub fn remaining_rows(&self) -> usize {
        self.rows.len()
    }
}

#[async_trait]
impl InputSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn header(&mut self) -> Result<Vec<String>, MinerError> {
        Ok(self.header.clone())
    }

    async fn next_batch(&mut self, max_rows: usize) -> Result<Vec<Vec<String>>, MinerError> {
        let take = max_rows.min(self.rows.len());
        Ok(self.rows.drain(..take).collect())
    }
}

/// What the coordinator asks of a reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderRequest {
    ReadHeader,
    ReadBatch,
}

/// Drives one [`InputSource`] on its own task.
pub struct InputReader;

impl InputReader {
    /// Spawns the reader and returns the channel it takes requests on.
    ///
    /// The reader stops after it has reported end of data. A failing source is
    /// logged and reported as ended.
    pub fn spawn(
        source_id: SourceId,
        mut source: Box<dyn InputSource>,
        batch_size: usize,
        events: mpsc::UnboundedSender<CoordinatorEvent>,
    ) -> mpsc::UnboundedSender<ReaderRequest> {
        let (tx, mut requests) = mpsc::unbounded_channel();
        let batch_size = batch_size.max(1);

        tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                let event = match request {
                    ReaderRequest::ReadHeader => match source.header().await {
                        Ok(column_names) => CoordinatorEvent::Header(HeaderMessage {
                            source_id,
                            column_names,
                        }),
                        Err(e) => {
                            log::error!("Could not read header of {}: {}", source.name(), e);
                            end_of_data(source_id)
                        }
                    },
                    ReaderRequest::ReadBatch => match source.next_batch(batch_size).await {
                        Ok(rows) => CoordinatorEvent::Batch(BatchMessage { source_id, rows }),
                        Err(e) => {
                            log::error!("Could not read from {}: {}", source.name(), e);
                            end_of_data(source_id)
                        }
                    },
                };

                let finished = matches!(&event, CoordinatorEvent::Batch(batch) if batch.is_end_of_data());
                if events.send(event).is_err() || finished {
                    break;
                }
            }
            log::debug!("Reader for {} stopped", source.name());
        });

        tx
    }
}

fn end_of_data(source_id: SourceId) -> CoordinatorEvent {
    CoordinatorEvent::Batch(BatchMessage {
        source_id,
        rows: Vec::new(),
    })
}
