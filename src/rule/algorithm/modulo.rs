// Modulo based sharding algorithms: MOD and HASH_MOD.

use std::collections::BTreeSet;

use crate::common::{DataValue, ShardingResult};
use crate::route::condition::ValueRange;
use crate::rule::algorithm::{
    AlgorithmProperties, RangeRoute, StandardShardingAlgorithm, find_by_suffix, integer_value, invalid_property,
    invalid_value,
};

const SHARDING_COUNT_KEY: &str = "sharding-count";

fn sharding_count(algorithm: &str, props: &AlgorithmProperties) -> ShardingResult<i64> {
    let count = props.require_i64(algorithm, SHARDING_COUNT_KEY)?;
    if count <= 0 {
        return Err(invalid_property(algorithm, SHARDING_COUNT_KEY, "must be greater than 0"));
    }
    Ok(count)
}

/// `value % sharding-count` selects the target with that numeric suffix.
#[derive(Debug, Clone)]
pub struct ModShardingAlgorithm {
    sharding_count: i64,
}

impl ModShardingAlgorithm {
    pub fn new(sharding_count: i64) -> Self {
        Self { sharding_count }
    }

    pub fn from_props(props: &AlgorithmProperties) -> ShardingResult<Self> {
        Ok(Self::new(sharding_count("MOD", props)?))
    }
}

impl StandardShardingAlgorithm for ModShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        "MOD"
    }

    fn do_precise_sharding(
        &self,
        available: &[String],
        _column: &str,
        value: &DataValue,
    ) -> ShardingResult<Option<String>> {
        let value = integer_value("MOD", value)?;
        Ok(find_by_suffix(available, value.rem_euclid(self.sharding_count)).cloned())
    }

    fn do_range_sharding(&self, available: &[String], _column: &str, range: &ValueRange) -> ShardingResult<RangeRoute> {
        let (Some(lower), Some(upper)) = range.integer_bounds() else {
            return Ok(RangeRoute::Targets(available.to_vec()));
        };
        if lower > upper {
            return Ok(RangeRoute::Targets(Vec::new()));
        }
        // A span of sharding-count values or more touches every shard
        if i128::from(upper) - i128::from(lower) >= i128::from(self.sharding_count) - 1 {
            return Ok(RangeRoute::Targets(available.to_vec()));
        }
        let matched: BTreeSet<&String> = (lower..=upper)
            .filter_map(|v| find_by_suffix(available, v.rem_euclid(self.sharding_count)))
            .collect();
        let targets = available.iter().filter(|t| matched.contains(t)).cloned().collect();
        Ok(RangeRoute::Targets(targets))
    }
}

/// MOD over a stable hash of the value's text; range queries are never narrowed.
#[derive(Debug, Clone)]
pub struct HashModShardingAlgorithm {
    sharding_count: i64,
}

impl HashModShardingAlgorithm {
    pub fn new(sharding_count: i64) -> Self {
        Self { sharding_count }
    }

    pub fn from_props(props: &AlgorithmProperties) -> ShardingResult<Self> {
        Ok(Self::new(sharding_count("HASH_MOD", props)?))
    }

    /// 64-bit FNV-1a
    fn hash(text: &str) -> u64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in text.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        hash
    }

    fn shard_text(value: &DataValue) -> String {
        match value {
            DataValue::Text(s) | DataValue::Date(s) | DataValue::Timestamp(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl StandardShardingAlgorithm for HashModShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        "HASH_MOD"
    }

    fn do_precise_sharding(
        &self,
        available: &[String],
        _column: &str,
        value: &DataValue,
    ) -> ShardingResult<Option<String>> {
        if value.is_null() {
            return Err(invalid_value("HASH_MOD", value));
        }
        let suffix = Self::hash(&Self::shard_text(value)) % self.sharding_count as u64;
        Ok(find_by_suffix(available, suffix as i64).cloned())
    }

    fn do_range_sharding(&self, _available: &[String], _column: &str, _range: &ValueRange) -> ShardingResult<RangeRoute> {
        Ok(RangeRoute::Unsupported)
    }
}
