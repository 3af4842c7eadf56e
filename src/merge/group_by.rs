// GROUP BY Stream Merge
//
// Consumes a cursor already ordered by the grouping key and folds each run
// of equal keys into one output row. The first row of a run supplies the
// non-aggregate columns; aggregate columns are replaced by the folded
// results. The cursor reads one row ahead to detect the end of a run.

use std::cmp::Ordering;

use crate::common::{CursorError, DataValue, ShardingResult};
use crate::merge::aggregation::{new_units, write_results};
use crate::merge::memory::labels_of;
use crate::merge::order_by::{SortKey, key_values};
use crate::merge::{QueryResult, Row, check_column_index, read_row};
use crate::statement::{AggregationProjection, OrderByItem};

/// Group keys match when every value is equal or compares equal
pub(crate) fn same_group(a: &[DataValue], b: &[DataValue]) -> bool {
    a.iter().zip(b).all(|(x, y)| x == y || x.partial_cmp(y) == Some(Ordering::Equal))
}

pub struct GroupByStreamMergedResult {
    input: Box<dyn QueryResult>,
    labels: Vec<String>,
    keys: Vec<SortKey>,
    aggregations: Vec<AggregationProjection>,
    /// Input is positioned on the first row of the next group
    pending: bool,
    current: Option<Row>,
    closed: bool,
}

impl GroupByStreamMergedResult {
    pub fn new(
        mut input: Box<dyn QueryResult>,
        group_by: &[OrderByItem],
        aggregations: &[AggregationProjection],
    ) -> ShardingResult<Self> {
        let prepared = labels_of(input.as_ref()).and_then(|labels| {
            let keys = SortKey::resolve(group_by, &labels)?;
            let pending = input.next()?;
            Ok((labels, keys, pending))
        });
        match prepared {
            Ok((labels, keys, pending)) => {
                Ok(Self { input, labels, keys, aggregations: aggregations.to_vec(), pending, current: None, closed: false })
            }
            Err(e) => {
                let _ = input.close();
                Err(e)
            }
        }
    }
}

impl QueryResult for GroupByStreamMergedResult {
    fn next(&mut self) -> ShardingResult<bool> {
        self.current = None;
        if !self.pending {
            return Ok(false);
        }
        let group_key = key_values(&self.keys, self.input.as_ref())?;
        let mut row = read_row(self.input.as_ref())?;
        let mut units = new_units(&self.aggregations);
        loop {
            for unit in units.iter_mut() {
                unit.merge(self.input.as_ref())?;
            }
            if !self.input.next()? {
                self.pending = false;
                break;
            }
            if !same_group(&group_key, &key_values(&self.keys, self.input.as_ref())?) {
                break;
            }
        }
        write_results(&units, &mut row)?;
        self.current = Some(row);
        Ok(true)
    }

    fn get(&self, index: usize) -> ShardingResult<DataValue> {
        let row = self.current.as_ref().ok_or(CursorError::AfterLastRow)?;
        check_column_index(index, row.len())?;
        Ok(row[index - 1].clone())
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
        self.pending = false;
        self.current = None;
        self.input.close()
    }
}
