// Aggregation Units
//
// Fold shard partial aggregates into the logical aggregate. Every shard
// reports its own partial for a group; the unit combines them:
//
// - COUNT and SUM add partials
// - AVG is recomputed from the derived SUM and COUNT columns
// - MIN and MAX keep the extremum, ignoring NULL
// - DISTINCT variants collect raw values and aggregate the set at the end

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::common::{DataValue, ShardingError, ShardingResult};
use crate::merge::QueryResult;
use crate::statement::{AggregationProjection, AggregationType};

#[derive(Debug, Clone)]
enum Accumulator {
    Count(DataValue),
    Sum(DataValue),
    Avg { sum: DataValue, count: DataValue },
    Extremum { value: DataValue, keep: Ordering },
    Distinct(HashSet<DataValue>),
}

/// Running aggregate of one projection within one group
#[derive(Debug, Clone)]
pub struct AggregationUnit {
    projection: AggregationProjection,
    accumulator: Accumulator,
}

impl AggregationUnit {
    pub fn new(projection: &AggregationProjection) -> Self {
        let accumulator = if projection.distinct {
            Accumulator::Distinct(HashSet::new())
        } else {
            match projection.kind {
                AggregationType::Count => Accumulator::Count(DataValue::Integer(0)),
                AggregationType::Sum => Accumulator::Sum(DataValue::Null),
                AggregationType::Avg => Accumulator::Avg { sum: DataValue::Null, count: DataValue::Integer(0) },
                AggregationType::Min => Accumulator::Extremum { value: DataValue::Null, keep: Ordering::Less },
                AggregationType::Max => Accumulator::Extremum { value: DataValue::Null, keep: Ordering::Greater },
            }
        };
        Self { projection: projection.clone(), accumulator }
    }

    /// Fold the current row of `source` into the unit.
    pub fn merge(&mut self, source: &dyn QueryResult) -> ShardingResult<()> {
        match &mut self.accumulator {
            Accumulator::Count(total) | Accumulator::Sum(total) => {
                *total = total.add(&source.get(self.projection.index)?)?;
            }
            Accumulator::Avg { sum, count } => {
                let (sum_index, count_index) = self.projection.derived.ok_or_else(|| {
                    ShardingError::InvalidParameter(format!(
                        "AVG at column {} has no derived SUM/COUNT columns",
                        self.projection.index
                    ))
                })?;
                *sum = sum.add(&source.get(sum_index)?)?;
                *count = count.add(&source.get(count_index)?)?;
            }
            Accumulator::Extremum { value, keep } => {
                let candidate = source.get(self.projection.index)?;
                if !candidate.is_null() && (value.is_null() || candidate.compare(value)? == *keep) {
                    *value = candidate;
                }
            }
            Accumulator::Distinct(seen) => {
                let candidate = source.get(self.projection.index)?;
                if !candidate.is_null() {
                    seen.insert(candidate);
                }
            }
        }
        Ok(())
    }

    pub fn result(&self) -> ShardingResult<DataValue> {
        match &self.accumulator {
            Accumulator::Count(value) | Accumulator::Sum(value) => Ok(value.clone()),
            Accumulator::Avg { sum, count } => average(sum, count),
            Accumulator::Extremum { value, .. } => Ok(value.clone()),
            Accumulator::Distinct(seen) => self.distinct_result(seen),
        }
    }

    fn distinct_result(&self, seen: &HashSet<DataValue>) -> ShardingResult<DataValue> {
        let count = DataValue::Integer(seen.len() as i64);
        match self.projection.kind {
            AggregationType::Count => Ok(count),
            AggregationType::Sum | AggregationType::Avg => {
                let mut sum = DataValue::Null;
                for value in seen {
                    sum = sum.add(value)?;
                }
                if self.projection.kind == AggregationType::Sum { Ok(sum) } else { average(&sum, &count) }
            }
            // DISTINCT does not change an extremum
            AggregationType::Min | AggregationType::Max => {
                let keep = if self.projection.kind == AggregationType::Min { Ordering::Less } else { Ordering::Greater };
                let mut best = DataValue::Null;
                for value in seen {
                    if best.is_null() || value.compare(&best)? == keep {
                        best = value.clone();
                    }
                }
                Ok(best)
            }
        }
    }

    /// Column the result is written back to
    pub fn index(&self) -> usize {
        self.projection.index
    }

    /// Derived columns to write back, if any
    pub fn derived_results(&self) -> Option<[(usize, DataValue); 2]> {
        match (&self.accumulator, self.projection.derived) {
            (Accumulator::Avg { sum, count }, Some((sum_index, count_index))) => {
                Some([(sum_index, sum.clone()), (count_index, count.clone())])
            }
            _ => None,
        }
    }
}

fn average(sum: &DataValue, count: &DataValue) -> ShardingResult<DataValue> {
    let count = count.as_f64().unwrap_or(0.0);
    if count == 0.0 || sum.is_null() {
        return Ok(DataValue::Null);
    }
    let sum = sum
        .as_f64()
        .ok_or_else(|| ShardingError::TypeMismatch(format!("Cannot average {}", sum.type_name())))?;
    Ok(DataValue::Float(sum / count))
}

/// One unit per projection
pub fn new_units(projections: &[AggregationProjection]) -> Vec<AggregationUnit> {
    projections.iter().map(AggregationUnit::new).collect()
}

/// Overwrite aggregate columns of `row` with the folded results.
pub fn write_results(units: &[AggregationUnit], row: &mut [DataValue]) -> ShardingResult<()> {
    for unit in units {
        let slot = row.get_mut(unit.index() - 1).ok_or_else(|| {
            ShardingError::InvalidParameter(format!("aggregate column {} is not in the result", unit.index()))
        })?;
        *slot = unit.result()?;
        if let Some(derived) = unit.derived_results() {
            for (index, value) in derived {
                if let Some(slot) = row.get_mut(index - 1) {
                    *slot = value;
                }
            }
        }
    }
    Ok(())
}
