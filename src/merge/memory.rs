// In-memory cursor.
//
// Holds fully materialized rows. Used for connection-strict execution, where
// a connection is reused before the client reads, and by the memory merges.

use std::collections::VecDeque;

use crate::common::{CursorError, DataValue, ShardingResult};
use crate::merge::{CursorState, QueryResult, check_column_index, read_row};

/// Positional row, values in projection order
pub type Row = Vec<DataValue>;

#[derive(Debug, Clone)]
pub struct MemoryQueryResult {
    labels: Vec<String>,
    rows: VecDeque<Row>,
    current: Option<Row>,
    state: CursorState,
}

impl MemoryQueryResult {
    pub fn new(labels: Vec<String>, rows: Vec<Row>) -> Self {
        Self { labels, rows: rows.into(), current: None, state: CursorState::Created }
    }

    /// Read every remaining row of `source` and close it.
    pub fn drain(source: &mut dyn QueryResult) -> ShardingResult<Self> {
        let labels = labels_of(source)?;
        let drained = read_all(source);
        let closed = source.close();
        let rows = drained?;
        closed?;
        Ok(Self::new(labels, rows))
    }

    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

fn read_all(source: &mut dyn QueryResult) -> ShardingResult<Vec<Row>> {
    let mut rows = Vec::new();
    while source.next()? {
        rows.push(read_row(source)?);
    }
    Ok(rows)
}

/// Column labels of a cursor
pub fn labels_of(source: &dyn QueryResult) -> ShardingResult<Vec<String>> {
    (1..=source.column_count()).map(|i| source.column_label(i)).collect()
}

impl QueryResult for MemoryQueryResult {
    fn next(&mut self) -> ShardingResult<bool> {
        match self.state {
            CursorState::Closed => return Err(CursorError::Closed.into()),
            CursorState::Exhausted => return Ok(false),
            _ => {}
        }
        self.current = self.rows.pop_front();
        self.state = if self.current.is_some() { CursorState::Iterating } else { CursorState::Exhausted };
        Ok(self.current.is_some())
    }

    fn get(&self, index: usize) -> ShardingResult<DataValue> {
        match (&self.state, &self.current) {
            (CursorState::Closed, _) => Err(CursorError::Closed.into()),
            (CursorState::Created, _) => Err(CursorError::BeforeFirstRow.into()),
            (CursorState::Iterating, Some(row)) => {
                check_column_index(index, row.len())?;
                Ok(row[index - 1].clone())
            }
            _ => Err(CursorError::AfterLastRow.into()),
        }
    }

    fn column_count(&self) -> usize {
        self.labels.len()
    }

    fn column_label(&self, index: usize) -> ShardingResult<String> {
        check_column_index(index, self.labels.len())?;
        Ok(self.labels[index - 1].clone())
    }

    fn close(&mut self) -> ShardingResult<()> {
        self.state = CursorState::Closed;
        self.rows.clear();
        self.current = None;
        Ok(())
    }
}
