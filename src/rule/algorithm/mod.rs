// Sharding Algorithm Module
//
// Algorithm traits for the three strategy kinds and the registry that builds
// algorithm instances from their configured type name and properties.

pub mod inline;
pub mod modulo;
pub mod range;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use linked_hash_map::LinkedHashMap;
use serde::{Deserialize, Serialize};

use crate::common::{ConfigError, DataValue, ShardingError, ShardingResult};
use crate::route::condition::ValueRange;

pub use inline::{ComplexInlineShardingAlgorithm, HintInlineShardingAlgorithm, InlineShardingAlgorithm};
pub use modulo::{HashModShardingAlgorithm, ModShardingAlgorithm};
pub use range::{BoundaryRangeShardingAlgorithm, VolumeRangeShardingAlgorithm};

/// Outcome of routing a range predicate
#[derive(Debug, Clone, PartialEq)]
pub enum RangeRoute {
    Targets(Vec<String>),
    /// The algorithm cannot narrow this range; the rule's range policy decides.
    Unsupported,
}

/// Single-column algorithm handling `=`, `IN` and range predicates
pub trait StandardShardingAlgorithm: Send + Sync + fmt::Debug {
    fn type_name(&self) -> &'static str;

    /// Pick the target holding `value`; `None` when no candidate holds it.
    fn do_precise_sharding(&self, available: &[String], column: &str, value: &DataValue)
    -> ShardingResult<Option<String>>;

    fn do_range_sharding(&self, available: &[String], column: &str, range: &ValueRange) -> ShardingResult<RangeRoute>;
}

/// Multi-column algorithm, called once per combination of column values
pub trait ComplexKeysShardingAlgorithm: Send + Sync + fmt::Debug {
    fn type_name(&self) -> &'static str;

    fn do_sharding(&self, available: &[String], values: &HashMap<String, DataValue>) -> ShardingResult<Vec<String>>;
}

/// Algorithm driven by out-of-band hint values
pub trait HintShardingAlgorithm: Send + Sync + fmt::Debug {
    fn type_name(&self) -> &'static str;

    fn do_sharding(&self, available: &[String], value: &DataValue) -> ShardingResult<String>;
}

#[derive(Debug, Clone)]
pub enum ShardingAlgorithm {
    Standard(Arc<dyn StandardShardingAlgorithm>),
    Complex(Arc<dyn ComplexKeysShardingAlgorithm>),
    Hint(Arc<dyn HintShardingAlgorithm>),
}

impl ShardingAlgorithm {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ShardingAlgorithm::Standard(_) => "standard",
            ShardingAlgorithm::Complex(_) => "complex",
            ShardingAlgorithm::Hint(_) => "hint",
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ShardingAlgorithm::Standard(a) => a.type_name(),
            ShardingAlgorithm::Complex(a) => a.type_name(),
            ShardingAlgorithm::Hint(a) => a.type_name(),
        }
    }
}

/// Algorithm properties, kept in declaration order
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlgorithmProperties(LinkedHashMap<String, serde_json::Value>);

impl AlgorithmProperties {
    pub fn new() -> Self {
        Self(LinkedHashMap::new())
    }

    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// String form of a property; numbers and booleans are rendered.
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.0.get(key).map(|value| match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    pub fn require_str(&self, algorithm: &str, key: &str) -> ShardingResult<String> {
        self.get_str(key)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| invalid_property(algorithm, key, "property is required"))
    }

    pub fn require_i64(&self, algorithm: &str, key: &str) -> ShardingResult<i64> {
        let text = self.require_str(algorithm, key)?;
        text.trim()
            .parse::<i64>()
            .map_err(|_| invalid_property(algorithm, key, &format!("'{}' is not an integer", text)))
    }

    pub fn get_bool(&self, algorithm: &str, key: &str) -> ShardingResult<bool> {
        match self.get_str(key) {
            None => Ok(false),
            Some(text) => text
                .trim()
                .parse::<bool>()
                .map_err(|_| invalid_property(algorithm, key, &format!("'{}' is not a boolean", text))),
        }
    }
}

pub(crate) fn invalid_property(algorithm: &str, property: &str, reason: &str) -> ShardingError {
    ConfigError::InvalidAlgorithmProperty {
        algorithm: algorithm.to_string(),
        property: property.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

/// Integer form of a sharding value, as required by numeric algorithms.
pub(crate) fn integer_value(algorithm: &str, value: &DataValue) -> ShardingResult<i64> {
    match value {
        DataValue::Integer(i) => Ok(*i),
        DataValue::Text(s) => s.trim().parse::<i64>().map_err(|_| invalid_value(algorithm, value)),
        _ => Err(invalid_value(algorithm, value)),
    }
}

pub(crate) fn invalid_value(algorithm: &str, value: &DataValue) -> ShardingError {
    ConfigError::InvalidShardingValue { algorithm: algorithm.to_string(), value: value.to_string() }.into()
}

/// Candidate whose trailing number equals `suffix`, e.g. `t_order_3` for 3.
pub(crate) fn find_by_suffix(available: &[String], suffix: i64) -> Option<&String> {
    available.iter().find(|target| {
        let digits: String = target.chars().rev().take_while(|c| c.is_ascii_digit()).collect();
        !digits.is_empty() && digits.chars().rev().collect::<String>().parse::<i64>() == Ok(suffix)
    })
}

pub type AlgorithmFactory = Arc<dyn Fn(&AlgorithmProperties) -> ShardingResult<ShardingAlgorithm> + Send + Sync>;

/// Algorithm types known to one rule snapshot, keyed by upper-cased type name.
#[derive(Clone)]
pub struct AlgorithmRegistry {
    factories: HashMap<String, AlgorithmFactory>,
}

impl AlgorithmRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self { factories: HashMap::new() }
    }

    /// Registry holding the built-in algorithm types
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("MOD", |props| {
            Ok(ShardingAlgorithm::Standard(Arc::new(ModShardingAlgorithm::from_props(props)?)))
        });
        registry.register("HASH_MOD", |props| {
            Ok(ShardingAlgorithm::Standard(Arc::new(HashModShardingAlgorithm::from_props(props)?)))
        });
        registry.register("VOLUME_RANGE", |props| {
            Ok(ShardingAlgorithm::Standard(Arc::new(VolumeRangeShardingAlgorithm::from_props(props)?)))
        });
        registry.register("BOUNDARY_RANGE", |props| {
            Ok(ShardingAlgorithm::Standard(Arc::new(BoundaryRangeShardingAlgorithm::from_props(props)?)))
        });
        registry.register("INLINE", |props| {
            Ok(ShardingAlgorithm::Standard(Arc::new(InlineShardingAlgorithm::from_props(props)?)))
        });
        registry.register("COMPLEX_INLINE", |props| {
            Ok(ShardingAlgorithm::Complex(Arc::new(ComplexInlineShardingAlgorithm::from_props(props)?)))
        });
        registry.register("HINT_INLINE", |props| {
            Ok(ShardingAlgorithm::Hint(Arc::new(HintInlineShardingAlgorithm::from_props(props)?)))
        });
        registry
    }

    /// Register or replace an algorithm type.
    pub fn register<F>(&mut self, type_name: &str, factory: F)
    where
        F: Fn(&AlgorithmProperties) -> ShardingResult<ShardingAlgorithm> + Send + Sync + 'static,
    {
        self.factories.insert(type_name.to_ascii_uppercase(), Arc::new(factory));
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(&type_name.to_ascii_uppercase())
    }

    pub fn create(&self, type_name: &str, props: &AlgorithmProperties) -> ShardingResult<ShardingAlgorithm> {
        let factory = self
            .factories
            .get(&type_name.to_ascii_uppercase())
            .ok_or_else(|| ConfigError::UnknownAlgorithmType(type_name.to_string()))?;
        factory(props)
    }
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl fmt::Debug for AlgorithmRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("AlgorithmRegistry").field("types", &names).finish()
    }
}
