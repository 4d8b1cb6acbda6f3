//! Per-name column value sets built from incoming file batches.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::IndexError;

/// Position of an input source in the run's source list.
pub type SourceId = usize;

/// Enough of a column to name it in a dependency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnIdentity {
    pub file_name: String,
    pub name: String,
}

impl fmt::Display for ColumnIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> [{}]", self.file_name, self.name)
    }
}

/// The merged set of values observed under one column name.
///
/// `file_name` and `position` record where the name was first seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub file_name: String,
    pub position: usize,
    pub values: HashSet<String>,
}

impl Column {
    pub fn new(position: usize, name: impl Into<String>, file_name: impl Into<String>) -> Self {
        Column {
            name: name.into(),
            file_name: file_name.into(),
            position,
            values: HashSet::new(),
        }
    }

    pub fn add_value(&mut self, value: impl Into<String>) {
        self.values.insert(value.into());
    }

    pub fn identity(&self) -> ColumnIdentity {
        ColumnIdentity {
            file_name: self.file_name.clone(),
            name: self.name.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug)]
struct SourceState {
    file_name: String,
    header: Option<Vec<String>>,
    finished: bool,
}

/// Columns keyed by name, mutable only until every source has finished.
#[derive(Debug)]
pub struct ColumnIndex {
    sources: Vec<SourceState>,
    columns: BTreeMap<String, Arc<Column>>,
    remaining: usize,
}

impl ColumnIndex {
    pub fn new<I, S>(file_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sources: Vec<SourceState> = file_names
            .into_iter()
            .map(|name| SourceState {
                file_name: name.into(),
                header: None,
                finished: false,
            })
            .collect();
        let remaining = sources.len();
        ColumnIndex {
            sources,
            columns: BTreeMap::new(),
            remaining,
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.remaining == 0
    }

    /// Number of distinct column names.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Column>> {
        self.columns.get(name)
    }

    pub fn file_name(&self, source: SourceId) -> Option<&str> {
        self.sources.get(source).map(|s| s.file_name.as_str())
    }

    fn source_mut(&mut self, source: SourceId) -> Result<&mut SourceState, IndexError> {
        if self.remaining == 0 {
            return Err(IndexError::Frozen);
        }
        self.sources
            .get_mut(source)
            .ok_or(IndexError::UnknownSource(source))
    }

    pub fn set_header(&mut self, source: SourceId, header: Vec<String>) -> Result<(), IndexError> {
        self.source_mut(source)?.header = Some(header);
        Ok(())
    }

    /// Adds `value` to the column named by `source`'s header at `position`.
    pub fn ingest(
        &mut self,
        source: SourceId,
        position: usize,
        value: impl Into<String>,
    ) -> Result<(), IndexError> {
        if self.remaining == 0 {
            return Err(IndexError::Frozen);
        }
        let state = self
            .sources
            .get(source)
            .ok_or(IndexError::UnknownSource(source))?;
        let header = state.header.as_ref().ok_or(IndexError::MissingHeader(source))?;
        let name = header.get(position).ok_or(IndexError::PositionOutOfRange {
            source_id: source,
            position,
        })?;

        match self.columns.get_mut(name) {
            // Sole owner until the index freezes, so this never clones
            Some(column) => Arc::make_mut(column).add_value(value),
            None => {
                let mut column = Column::new(position, name.clone(), state.file_name.clone());
                column.add_value(value);
                self.columns.insert(name.clone(), Arc::new(column));
            }
        }
        Ok(())
    }

    /// Ingests a batch row by row. Returns the number of values ingested.
    pub fn ingest_rows(&mut self, source: SourceId, rows: Vec<Vec<String>>) -> Result<usize, IndexError> {
        let mut count = 0;
        for row in rows {
            for (position, value) in row.into_iter().enumerate() {
                self.ingest(source, position, value)?;
                count += 1;
            }
        }
        Ok(count)
    }

    /// Marks `source` as complete. Returns `true` once every source is.
    pub fn finalize_file(&mut self, source: SourceId) -> Result<bool, IndexError> {
        let state = self.source_mut(source)?;
        if !state.finished {
            state.finished = true;
            self.remaining -= 1;
        }
        Ok(self.is_frozen())
    }

    /// Every ordered pair `(a, b)` of distinct column names, in name order.
    pub fn ordered_pairs(&self) -> Result<Vec<(Arc<Column>, Arc<Column>)>, IndexError> {
        if !self.is_frozen() {
            return Err(IndexError::NotFrozen);
        }
        let mut pairs = Vec::with_capacity(self.len() * self.len().saturating_sub(1));
        for (a_name, a) in &self.columns {
            for (b_name, b) in &self.columns {
                if a_name != b_name {
                    pairs.push((Arc::clone(a), Arc::clone(b)));
                }
            }
        }
        Ok(pairs)
    }
}
