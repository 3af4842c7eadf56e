// Interval based sharding algorithms: VOLUME_RANGE and BOUNDARY_RANGE.
//
// Both split the integer line into consecutive partitions. Partition 0 holds
// everything below the first boundary and the last partition everything from
// the last boundary upwards; partition `i` is served by the target whose
// numeric suffix is `i`.

use std::collections::BTreeSet;

use crate::common::{ConfigError, DataValue, ShardingResult};
use crate::route::condition::ValueRange;
use crate::rule::algorithm::{
    AlgorithmProperties, RangeRoute, StandardShardingAlgorithm, find_by_suffix, integer_value, invalid_property,
};

/// Ascending partition boundaries; partition `i` is `[boundaries[i-1], boundaries[i])`.
#[derive(Debug, Clone, PartialEq)]
struct Partitions {
    boundaries: Vec<i64>,
}

impl Partitions {
    fn partition_of(&self, value: i64) -> usize {
        self.boundaries.partition_point(|b| *b <= value)
    }

    fn partition_count(&self) -> usize {
        self.boundaries.len() + 1
    }

    fn precise(&self, algorithm: &str, available: &[String], value: &DataValue) -> ShardingResult<Option<String>> {
        let partition = self.partition_of(integer_value(algorithm, value)?);
        Ok(find_by_suffix(available, partition as i64).cloned())
    }

    /// Targets of every partition the range overlaps, in candidate order.
    fn range(&self, algorithm: &str, available: &[String], range: &ValueRange) -> ShardingResult<RangeRoute> {
        let (lower, upper) = range.integer_bounds();
        if let (Some(lo), Some(hi)) = (lower, upper) {
            if lo > hi {
                return Err(ConfigError::IllegalRange(format!(
                    "{} received range with lower bound {} above upper bound {}",
                    algorithm, lo, hi
                ))
                .into());
            }
        }
        let first = lower.map(|lo| self.partition_of(lo)).unwrap_or(0);
        let last = upper.map(|hi| self.partition_of(hi)).unwrap_or(self.partition_count() - 1);
        let matched: BTreeSet<&String> =
            (first..=last).filter_map(|p| find_by_suffix(available, p as i64)).collect();
        Ok(RangeRoute::Targets(available.iter().filter(|t| matched.contains(t)).cloned().collect()))
    }
}

/// Fixed-width partitions between `range-lower` and `range-upper`.
#[derive(Debug, Clone)]
pub struct VolumeRangeShardingAlgorithm {
    partitions: Partitions,
}

impl VolumeRangeShardingAlgorithm {
    pub fn new(lower: i64, upper: i64, volume: i64) -> ShardingResult<Self> {
        if volume <= 0 {
            return Err(invalid_property("VOLUME_RANGE", "sharding-volume", "must be greater than 0"));
        }
        if upper <= lower {
            return Err(invalid_property("VOLUME_RANGE", "range-upper", "must be greater than range-lower"));
        }
        let mut boundaries = Vec::new();
        let mut boundary = lower;
        while boundary < upper {
            boundaries.push(boundary);
            boundary = boundary.saturating_add(volume);
        }
        boundaries.push(upper);
        Ok(Self { partitions: Partitions { boundaries } })
    }

    pub fn from_props(props: &AlgorithmProperties) -> ShardingResult<Self> {
        Self::new(
            props.require_i64("VOLUME_RANGE", "range-lower")?,
            props.require_i64("VOLUME_RANGE", "range-upper")?,
            props.require_i64("VOLUME_RANGE", "sharding-volume")?,
        )
    }
}

impl StandardShardingAlgorithm for VolumeRangeShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        "VOLUME_RANGE"
    }

    fn do_precise_sharding(
        &self,
        available: &[String],
        _column: &str,
        value: &DataValue,
    ) -> ShardingResult<Option<String>> {
        self.partitions.precise("VOLUME_RANGE", available, value)
    }

    fn do_range_sharding(&self, available: &[String], _column: &str, range: &ValueRange) -> ShardingResult<RangeRoute> {
        self.partitions.range("VOLUME_RANGE", available, range)
    }
}

/// Partitions split at the explicit `sharding-ranges` boundaries.
#[derive(Debug, Clone)]
pub struct BoundaryRangeShardingAlgorithm {
    partitions: Partitions,
}

impl BoundaryRangeShardingAlgorithm {
    pub fn new(boundaries: Vec<i64>) -> ShardingResult<Self> {
        if boundaries.is_empty() {
            return Err(invalid_property("BOUNDARY_RANGE", "sharding-ranges", "at least one boundary is required"));
        }
        if boundaries.windows(2).any(|w| w[0] >= w[1]) {
            return Err(invalid_property("BOUNDARY_RANGE", "sharding-ranges", "boundaries must be strictly ascending"));
        }
        Ok(Self { partitions: Partitions { boundaries } })
    }

    pub fn from_props(props: &AlgorithmProperties) -> ShardingResult<Self> {
        let text = props.require_str("BOUNDARY_RANGE", "sharding-ranges")?;
        let boundaries = text
            .split(',')
            .map(|part| {
                part.trim().parse::<i64>().map_err(|_| {
                    invalid_property("BOUNDARY_RANGE", "sharding-ranges", &format!("'{}' is not an integer", part.trim()))
                })
            })
            .collect::<ShardingResult<Vec<_>>>()?;
        Self::new(boundaries)
    }
}

impl StandardShardingAlgorithm for BoundaryRangeShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        "BOUNDARY_RANGE"
    }

    fn do_precise_sharding(
        &self,
        available: &[String],
        _column: &str,
        value: &DataValue,
    ) -> ShardingResult<Option<String>> {
        self.partitions.precise("BOUNDARY_RANGE", available, value)
    }

    fn do_range_sharding(&self, available: &[String], _column: &str, range: &ValueRange) -> ShardingResult<RangeRoute> {
        self.partitions.range("BOUNDARY_RANGE", available, range)
    }
}
