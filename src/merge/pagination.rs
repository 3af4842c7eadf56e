// Pagination Decorators
//
// LIMIT style dialects push `LIMIT 0, offset + count` down to every shard, so
// the merged stream still contains the rows before the offset and the
// decorator has to skip them. Row-number dialects (SQL Server TOP with
// ROW_NUMBER, Oracle ROWNUM) filter on the row number inside each shard's
// query; the merged stream starts at the window and the decorator only caps
// its length.

use crate::common::{DataValue, ShardingResult};
use crate::merge::QueryResult;
use crate::statement::PaginationContext;

pub struct LimitDecoratorMergedResult {
    inner: Box<dyn QueryResult>,
    pagination: PaginationContext,
    skipped: bool,
    emitted: u64,
}

impl LimitDecoratorMergedResult {
    pub fn new(inner: Box<dyn QueryResult>, pagination: PaginationContext) -> Self {
        Self { inner, pagination, skipped: false, emitted: 0 }
    }

    /// Discard the offset rows; false when the stream ended first.
    fn skip_offset(&mut self) -> ShardingResult<bool> {
        for _ in 0..self.pagination.actual_offset() {
            if !self.inner.next()? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl QueryResult for LimitDecoratorMergedResult {
    fn next(&mut self) -> ShardingResult<bool> {
        if !self.skipped {
            self.skipped = true;
            if !self.skip_offset()? {
                self.emitted = u64::MAX;
                return Ok(false);
            }
        }
        let limit = self.pagination.actual_row_count().unwrap_or(u64::MAX);
        if self.emitted >= limit {
            return Ok(false);
        }
        if !self.inner.next()? {
            self.emitted = u64::MAX;
            return Ok(false);
        }
        self.emitted += 1;
        Ok(true)
    }

    fn get(&self, index: usize) -> ShardingResult<DataValue> {
        self.inner.get(index)
    }

    fn column_count(&self) -> usize {
        self.inner.column_count()
    }

    fn column_label(&self, index: usize) -> ShardingResult<String> {
        self.inner.column_label(index)
    }

    fn close(&mut self) -> ShardingResult<()> {
        self.inner.close()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowNumberDialect {
    /// SQL Server `TOP` with `ROW_NUMBER() OVER`
    TopAndRowNumber,
    /// Oracle `ROWNUM`
    RowNum,
}

pub struct RowNumberDecoratorMergedResult {
    inner: Box<dyn QueryResult>,
    window: Option<u64>,
    dialect: RowNumberDialect,
    emitted: u64,
}

impl RowNumberDecoratorMergedResult {
    pub fn new(inner: Box<dyn QueryResult>, pagination: PaginationContext, dialect: RowNumberDialect) -> Self {
        Self { inner, window: pagination.row_number_window(), dialect, emitted: 0 }
    }

    pub fn dialect(&self) -> RowNumberDialect {
        self.dialect
    }
}

impl QueryResult for RowNumberDecoratorMergedResult {
    fn next(&mut self) -> ShardingResult<bool> {
        if self.window.is_some_and(|window| self.emitted >= window) {
            return Ok(false);
        }
        if !self.inner.next()? {
            return Ok(false);
        }
        self.emitted += 1;
        Ok(true)
    }

    fn get(&self, index: usize) -> ShardingResult<DataValue> {
        self.inner.get(index)
    }

    fn column_count(&self) -> usize {
        self.inner.column_count()
    }

    fn column_label(&self, index: usize) -> ShardingResult<String> {
        self.inner.column_label(index)
    }

    fn close(&mut self) -> ShardingResult<()> {
        self.inner.close()
    }
}
