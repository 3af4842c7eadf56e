// GROUP BY Memory Merge
//
// Used when shard results are not ordered by the grouping key, i.e. the
// statement orders by something else or only projects aggregates. Every
// source is drained and closed up front; groups keep first-seen order and
// are then sorted by the ORDER BY items.

use linked_hash_map::LinkedHashMap;

use crate::common::{DataValue, ShardingResult};
use crate::merge::aggregation::{AggregationUnit, new_units, write_results};
use crate::merge::memory::labels_of;
use crate::merge::order_by::{SortKey, compare_keys, key_values};
use crate::merge::{MemoryQueryResult, QueryResult, Row, close_all, read_row};
use crate::statement::{AggregationProjection, OrderByItem};

type Groups = LinkedHashMap<Vec<DataValue>, (Row, Vec<AggregationUnit>)>;

pub struct GroupByMemoryMergedResult {
    rows: MemoryQueryResult,
}

impl GroupByMemoryMergedResult {
    pub fn new(
        mut sources: Vec<Box<dyn QueryResult>>,
        group_by: &[OrderByItem],
        aggregations: &[AggregationProjection],
        order_by: &[OrderByItem],
    ) -> ShardingResult<Self> {
        let folded = fold_sources(&mut sources, group_by, aggregations);
        let closed = close_all(&mut sources);
        let (labels, groups) = folded?;
        closed?;

        let mut rows = Vec::with_capacity(groups.len().max(1));
        for (_, (mut row, units)) in groups {
            write_results(&units, &mut row)?;
            rows.push(row);
        }
        // Aggregates over no rows still produce one row
        if rows.is_empty() && group_by.is_empty() && !aggregations.is_empty() && !labels.is_empty() {
            let mut row = vec![DataValue::Null; labels.len()];
            write_results(&new_units(aggregations), &mut row)?;
            rows.push(row);
        }

        if !order_by.is_empty() && !labels.is_empty() {
            let keys = SortKey::resolve(order_by, &labels)?;
            let project = |row: &Row| keys.iter().map(|k| row[k.index - 1].clone()).collect::<Vec<_>>();
            rows.sort_by(|a, b| compare_keys(&keys, &project(a), &project(b)));
        }

        Ok(Self { rows: MemoryQueryResult::new(labels, rows) })
    }
}

fn fold_sources(
    sources: &mut [Box<dyn QueryResult>],
    group_by: &[OrderByItem],
    aggregations: &[AggregationProjection],
) -> ShardingResult<(Vec<String>, Groups)> {
    let labels = match sources.first() {
        Some(first) => labels_of(first.as_ref())?,
        None => Vec::new(),
    };
    let keys = SortKey::resolve(group_by, &labels)?;
    let mut groups = Groups::new();
    for source in sources.iter_mut() {
        while source.next()? {
            let key = key_values(&keys, source.as_ref())?;
            if !groups.contains_key(&key) {
                groups.insert(key.clone(), (read_row(source.as_ref())?, new_units(aggregations)));
            }
            if let Some((_, units)) = groups.get_mut(&key) {
                for unit in units.iter_mut() {
                    unit.merge(source.as_ref())?;
                }
            }
        }
    }
    Ok((labels, groups))
}

impl QueryResult for GroupByMemoryMergedResult {
    fn next(&mut self) -> ShardingResult<bool> {
        self.rows.next()
    }

    fn get(&self, index: usize) -> ShardingResult<DataValue> {
        self.rows.get(index)
    }

    fn column_count(&self) -> usize {
        self.rows.column_count()
    }

    fn column_label(&self, index: usize) -> ShardingResult<String> {
        self.rows.column_label(index)
    }

    fn close(&mut self) -> ShardingResult<()> {
        self.rows.close()
    }
}
