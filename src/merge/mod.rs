// Result Merge Module
//
// Every cursor in this module implements `QueryResult`. Merges and pagination
// wrap their inputs and expose the same contract, so a merge plan is simply a
// chain of boxed cursors ending in a `MergedCursor`.

pub mod aggregation;
pub mod cursor;
pub mod group_by;
pub mod group_by_memory;
pub mod iterator;
pub mod memory;
pub mod order_by;
pub mod pagination;

use log::debug;

use crate::common::{CursorError, DataValue, DatabaseType, ShardingError, ShardingResult};
use crate::statement::{OrderByItem, OrderByTarget, PaginationContext, StatementContext};

pub use cursor::MergedCursor;
pub use group_by::GroupByStreamMergedResult;
pub use group_by_memory::GroupByMemoryMergedResult;
pub use iterator::IteratorStreamMergedResult;
pub use memory::{MemoryQueryResult, Row};
pub use order_by::OrderByStreamMergedResult;
pub use pagination::{LimitDecoratorMergedResult, RowNumberDecoratorMergedResult, RowNumberDialect};

/// Forward-only row cursor. Column indexes are 1-based.
pub trait QueryResult: Send {
    /// Advance to the next row; false once exhausted.
    fn next(&mut self) -> ShardingResult<bool>;

    /// Value of `index` in the current row
    fn get(&self, index: usize) -> ShardingResult<DataValue>;

    fn column_count(&self) -> usize;

    fn column_label(&self, index: usize) -> ShardingResult<String>;

    /// Release the cursor and everything it wraps.
    fn close(&mut self) -> ShardingResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Created,
    Iterating,
    Exhausted,
    Closed,
}

pub(crate) fn check_column_index(index: usize, count: usize) -> ShardingResult<()> {
    if index == 0 || index > count {
        return Err(CursorError::ColumnIndexOutOfRange { index, count }.into());
    }
    Ok(())
}

/// Copy the current row of a cursor
pub(crate) fn read_row(source: &dyn QueryResult) -> ShardingResult<Row> {
    (1..=source.column_count()).map(|i| source.get(i)).collect()
}

/// 1-based column index an ORDER BY / GROUP BY item points at.
pub(crate) fn resolve_index(item: &OrderByItem, labels: &[String]) -> ShardingResult<usize> {
    match &item.target {
        OrderByTarget::Index(index) => {
            check_column_index(*index, labels.len())?;
            Ok(*index)
        }
        OrderByTarget::Column(name) => labels
            .iter()
            .position(|label| label.eq_ignore_ascii_case(name))
            .map(|i| i + 1)
            .ok_or_else(|| ShardingError::InvalidParameter(format!("column '{}' is not in the result", name))),
    }
}

/// Close every cursor, returning the first failure.
pub(crate) fn close_all(sources: &mut [Box<dyn QueryResult>]) -> ShardingResult<()> {
    let mut first_error = None;
    for source in sources.iter_mut() {
        if let Err(e) = source.close() {
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}

/// Builds the merge plan for one statement.
pub struct MergeEngine;

impl MergeEngine {
    /// Merge shard cursors, given in route order, into one cursor.
    ///
    /// On error every input cursor has been closed.
    pub fn merge(
        mut results: Vec<Box<dyn QueryResult>>,
        ctx: &StatementContext,
        database_type: DatabaseType,
    ) -> ShardingResult<MergedCursor> {
        let pagination = match &ctx.limit {
            Some(limit) => match PaginationContext::resolve(limit, &ctx.parameters) {
                Ok(pagination) => Some(pagination),
                Err(e) => {
                    let _ = close_all(&mut results);
                    return Err(e);
                }
            },
            None => None,
        };

        if results.len() == 1 && ctx.aggregations.is_empty() {
            debug!("Single source, iterating without merge decorators");
            return Ok(MergedCursor::new(Box::new(IteratorStreamMergedResult::new(results))));
        }

        let merged: Box<dyn QueryResult> = if results.is_empty() {
            debug!("No source to merge");
            Box::new(Self::empty_result(ctx)?)
        } else {
            Self::build(results, ctx)?
        };
        let merged = match pagination.filter(PaginationContext::has_pagination) {
            None => merged,
            Some(pagination) => Self::decorate(merged, pagination, database_type),
        };
        Ok(MergedCursor::new(merged))
    }

    /// Result of a statement that reached no shard. Aggregates without
    /// GROUP BY still yield their single row over no input.
    fn empty_result(ctx: &StatementContext) -> ShardingResult<MemoryQueryResult> {
        if !ctx.group_by.is_empty() || ctx.aggregations.is_empty() {
            return Ok(MemoryQueryResult::new(Vec::new(), Vec::new()));
        }
        let width = ctx
            .aggregations
            .iter()
            .flat_map(|a| std::iter::once(a.index).chain(a.derived.into_iter().flat_map(|(sum, count)| [sum, count])))
            .max()
            .unwrap_or(0);
        let mut labels = vec![String::new(); width];
        for projection in &ctx.aggregations {
            if let Some(label) = projection.index.checked_sub(1).and_then(|i| labels.get_mut(i)) {
                *label = format!("{:?}", projection.kind).to_uppercase();
            }
        }
        let mut row = vec![DataValue::Null; width];
        aggregation::write_results(&aggregation::new_units(&ctx.aggregations), &mut row)?;
        Ok(MemoryQueryResult::new(labels, vec![row]))
    }

    fn build(results: Vec<Box<dyn QueryResult>>, ctx: &StatementContext) -> ShardingResult<Box<dyn QueryResult>> {
        let grouped = !ctx.group_by.is_empty() || !ctx.aggregations.is_empty();
        if grouped {
            if !ctx.group_by.is_empty() && (ctx.order_by.is_empty() || ctx.is_same_group_by_and_order_by()) {
                debug!("Merging with GROUP BY stream over {} source(s)", results.len());
                let ordered = OrderByStreamMergedResult::new(results, &ctx.group_by)?;
                let grouped = GroupByStreamMergedResult::new(Box::new(ordered), &ctx.group_by, &ctx.aggregations)?;
                return Ok(Box::new(grouped));
            }
            debug!("Merging with GROUP BY memory over {} source(s)", results.len());
            let grouped =
                GroupByMemoryMergedResult::new(results, &ctx.group_by, &ctx.aggregations, &ctx.order_by)?;
            return Ok(Box::new(grouped));
        }
        if !ctx.order_by.is_empty() {
            debug!("Merging with ORDER BY stream over {} source(s)", results.len());
            return Ok(Box::new(OrderByStreamMergedResult::new(results, &ctx.order_by)?));
        }
        debug!("Concatenating {} source(s)", results.len());
        Ok(Box::new(IteratorStreamMergedResult::new(results)))
    }

    fn decorate(
        merged: Box<dyn QueryResult>,
        pagination: PaginationContext,
        database_type: DatabaseType,
    ) -> Box<dyn QueryResult> {
        match database_type {
            DatabaseType::MySql | DatabaseType::PostgreSql | DatabaseType::Sqlite => {
                Box::new(LimitDecoratorMergedResult::new(merged, pagination))
            }
            DatabaseType::SqlServer => {
                Box::new(RowNumberDecoratorMergedResult::new(merged, pagination, RowNumberDialect::TopAndRowNumber))
            }
            DatabaseType::Oracle => {
                Box::new(RowNumberDecoratorMergedResult::new(merged, pagination, RowNumberDialect::RowNum))
            }
        }
    }
}
