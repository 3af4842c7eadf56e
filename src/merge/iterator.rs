// Concatenating merge: drains sources one after another in route order.

use crate::common::{CursorError, DataValue, ShardingResult};
use crate::merge::memory::labels_of;
use crate::merge::{QueryResult, check_column_index, close_all};

pub struct IteratorStreamMergedResult {
    sources: Vec<Box<dyn QueryResult>>,
    labels: Vec<String>,
    position: usize,
    on_row: bool,
    closed: bool,
}

impl IteratorStreamMergedResult {
    pub fn new(sources: Vec<Box<dyn QueryResult>>) -> Self {
        let labels = sources.first().and_then(|s| labels_of(s.as_ref()).ok()).unwrap_or_default();
        Self { sources, labels, position: 0, on_row: false, closed: false }
    }
}

impl QueryResult for IteratorStreamMergedResult {
    fn next(&mut self) -> ShardingResult<bool> {
        if self.closed {
            return Err(CursorError::Closed.into());
        }
        while self.position < self.sources.len() {
            if self.sources[self.position].next()? {
                self.on_row = true;
                return Ok(true);
            }
            self.position += 1;
        }
        self.on_row = false;
        Ok(false)
    }

    fn get(&self, index: usize) -> ShardingResult<DataValue> {
        if !self.on_row {
            return Err(CursorError::AfterLastRow.into());
        }
        self.sources[self.position].get(index)
    }

    fn column_count(&self) -> usize {
        self.labels.len()
    }

    fn column_label(&self, index: usize) -> ShardingResult<String> {
        check_column_index(index, self.labels.len())?;
        Ok(self.labels[index - 1].clone())
    }

    fn close(&mut self) -> ShardingResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.on_row = false;
        close_all(&mut self.sources)
    }
}
