// ORDER BY Stream Merge
//
// K-way merge of cursors that are each already sorted by the ORDER BY key.
// A binary heap holds one entry per source that still has a current row; the
// source popped last stays positioned on the row being read until the next
// call to `next()` advances it.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::common::{DataValue, ShardingResult};
use crate::merge::memory::labels_of;
use crate::merge::{QueryResult, close_all, resolve_index};
use crate::statement::{NullsOrder, OrderByItem, OrderDirection};

/// ORDER BY item resolved to a column position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub index: usize,
    pub direction: OrderDirection,
    pub nulls: NullsOrder,
}

impl SortKey {
    pub fn resolve(items: &[OrderByItem], labels: &[String]) -> ShardingResult<Vec<SortKey>> {
        items
            .iter()
            .map(|item| {
                Ok(SortKey { index: resolve_index(item, labels)?, direction: item.direction, nulls: item.nulls })
            })
            .collect()
    }
}

/// Compare two key tuples item by item.
///
/// NULL placement follows the item's null ordering regardless of direction.
/// Values of incomparable types are treated as equal.
pub fn compare_keys(keys: &[SortKey], a: &[DataValue], b: &[DataValue]) -> Ordering {
    for (i, key) in keys.iter().enumerate() {
        let ordering = match (&a[i], &b[i]) {
            (DataValue::Null, DataValue::Null) => Ordering::Equal,
            (DataValue::Null, _) => match key.nulls {
                NullsOrder::First => Ordering::Less,
                NullsOrder::Last => Ordering::Greater,
            },
            (_, DataValue::Null) => match key.nulls {
                NullsOrder::First => Ordering::Greater,
                NullsOrder::Last => Ordering::Less,
            },
            (x, y) => {
                let ordering = x.partial_cmp(y).unwrap_or(Ordering::Equal);
                match key.direction {
                    OrderDirection::Asc => ordering,
                    OrderDirection::Desc => ordering.reverse(),
                }
            }
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Key values of the current row of `source`
pub fn key_values(keys: &[SortKey], source: &dyn QueryResult) -> ShardingResult<Vec<DataValue>> {
    keys.iter().map(|key| source.get(key.index)).collect()
}

struct HeapEntry {
    values: Vec<DataValue>,
    source: usize,
    keys: Arc<[SortKey]>,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap pops the greatest entry; the smallest key must win,
        // and among equal keys the earliest source.
        compare_keys(&self.keys, &self.values, &other.values)
            .then(self.source.cmp(&other.source))
            .reverse()
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

pub struct OrderByStreamMergedResult {
    sources: Vec<Box<dyn QueryResult>>,
    labels: Vec<String>,
    keys: Arc<[SortKey]>,
    heap: BinaryHeap<HeapEntry>,
    current: Option<usize>,
    closed: bool,
}

impl OrderByStreamMergedResult {
    /// Position every source on its first row and seed the heap.
    pub fn new(mut sources: Vec<Box<dyn QueryResult>>, order_by: &[OrderByItem]) -> ShardingResult<Self> {
        let labels = match sources.first() {
            Some(first) => labels_of(first.as_ref()),
            None => Ok(Vec::new()),
        };
        let keys = labels.and_then(|labels| SortKey::resolve(order_by, &labels).map(|keys| (labels, keys)));
        let (labels, keys) = match keys {
            Ok(resolved) => resolved,
            Err(e) => {
                let _ = close_all(&mut sources);
                return Err(e);
            }
        };

        let mut merged = Self {
            sources,
            labels,
            keys: keys.into(),
            heap: BinaryHeap::new(),
            current: None,
            closed: false,
        };
        for index in 0..merged.sources.len() {
            if let Err(e) = merged.advance(index) {
                let _ = merged.close();
                return Err(e);
            }
        }
        Ok(merged)
    }

    fn advance(&mut self, index: usize) -> ShardingResult<()> {
        let source = &mut self.sources[index];
        if source.next()? {
            let values = key_values(&self.keys, source.as_ref())?;
            self.heap.push(HeapEntry { values, source: index, keys: Arc::clone(&self.keys) });
        }
        Ok(())
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }
}

impl QueryResult for OrderByStreamMergedResult {
    fn next(&mut self) -> ShardingResult<bool> {
        if let Some(previous) = self.current.take() {
            self.advance(previous)?;
        }
        match self.heap.pop() {
            Some(entry) => {
                self.current = Some(entry.source);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn get(&self, index: usize) -> ShardingResult<DataValue> {
        match self.current {
            Some(source) => self.sources[source].get(index),
            None => Err(crate::common::CursorError::AfterLastRow.into()),
        }
    }

    fn column_count(&self) -> usize {
        self.labels.len()
    }

    fn column_label(&self, index: usize) -> ShardingResult<String> {
        crate::merge::check_column_index(index, self.labels.len())?;
        Ok(self.labels[index - 1].clone())
    }

    fn close(&mut self) -> ShardingResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.heap.clear();
        self.current = None;
        close_all(&mut self.sources)
    }
}
