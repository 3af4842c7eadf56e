// Merged Cursor
//
// The single cursor handed to the caller. Enforces the cursor state machine
// on top of the merge chain:
//
//   Created --next()=true--> Iterating --next()=false--> Exhausted
//
// and Closed from any state. `get` is only valid while Iterating. Closing
// closes every wrapped source exactly once; dropping an open cursor closes it.

use std::fmt;

use log::warn;

use crate::common::{CursorError, DataValue, ShardingResult};
use crate::merge::{CursorState, QueryResult, Row, read_row};

pub struct MergedCursor {
    inner: Box<dyn QueryResult>,
    state: CursorState,
}

impl fmt::Debug for MergedCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergedCursor")
            .field("state", &self.state)
            .field("columns", &self.inner.column_count())
            .finish()
    }
}

impl MergedCursor {
    pub fn new(inner: Box<dyn QueryResult>) -> Self {
        Self { inner, state: CursorState::Created }
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn next(&mut self) -> ShardingResult<bool> {
        match self.state {
            CursorState::Closed => return Err(CursorError::Closed.into()),
            CursorState::Exhausted => return Ok(false),
            CursorState::Created | CursorState::Iterating => {}
        }
        match self.inner.next() {
            Ok(true) => {
                self.state = CursorState::Iterating;
                Ok(true)
            }
            Ok(false) => {
                self.state = CursorState::Exhausted;
                Ok(false)
            }
            Err(e) => {
                if let Err(close_error) = self.close() {
                    warn!("Failed to close merged cursor after error: {}", close_error);
                }
                Err(e)
            }
        }
    }

    fn ensure_on_row(&self) -> ShardingResult<()> {
        match self.state {
            CursorState::Iterating => Ok(()),
            CursorState::Created => Err(CursorError::BeforeFirstRow.into()),
            CursorState::Exhausted => Err(CursorError::AfterLastRow.into()),
            CursorState::Closed => Err(CursorError::Closed.into()),
        }
    }

    pub fn get(&self, index: usize) -> ShardingResult<DataValue> {
        self.ensure_on_row()?;
        self.inner.get(index)
    }

    pub fn column_count(&self) -> usize {
        self.inner.column_count()
    }

    pub fn column_label(&self, index: usize) -> ShardingResult<String> {
        if self.state == CursorState::Closed {
            return Err(CursorError::Closed.into());
        }
        self.inner.column_label(index)
    }

    /// Current row as a vector
    pub fn row(&self) -> ShardingResult<Row> {
        self.ensure_on_row()?;
        read_row(self.inner.as_ref())
    }

    /// Read every remaining row, then close the cursor.
    pub fn collect_rows(&mut self) -> ShardingResult<Vec<Row>> {
        let mut rows = Vec::new();
        while self.next()? {
            rows.push(self.row()?);
        }
        self.close()?;
        Ok(rows)
    }

    pub fn is_closed(&self) -> bool {
        self.state == CursorState::Closed
    }

    pub fn close(&mut self) -> ShardingResult<()> {
        if self.state == CursorState::Closed {
            return Ok(());
        }
        self.state = CursorState::Closed;
        self.inner.close()
    }
}

impl Drop for MergedCursor {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close merged cursor on drop: {}", e);
        }
    }
}
