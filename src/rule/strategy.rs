// Sharding Strategy Implementation
//
// A strategy binds sharding columns to an algorithm and narrows a list of
// candidate targets (data sources or actual tables) using the predicates and
// hint values of one condition branch.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::common::{ConfigError, DataValue, ShardingResult};
use crate::route::condition::{ConditionValue, ShardingConditionValue};
use crate::rule::algorithm::{
    ComplexKeysShardingAlgorithm, HintShardingAlgorithm, RangeRoute, StandardShardingAlgorithm,
};

/// What to do with a range predicate the algorithm cannot narrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeQueryPolicy {
    /// Route to every candidate
    BroadcastAll,
    /// Fail with `RangeQueryNotSupported`
    Reject,
}

#[derive(Debug, Clone)]
pub enum ShardingStrategy {
    None,
    Standard {
        column: String,
        algorithm: Arc<dyn StandardShardingAlgorithm>,
    },
    Complex {
        columns: Vec<String>,
        algorithm: Arc<dyn ComplexKeysShardingAlgorithm>,
    },
    Hint {
        algorithm: Arc<dyn HintShardingAlgorithm>,
    },
}

impl ShardingStrategy {
    pub fn sharding_columns(&self) -> Vec<&str> {
        match self {
            ShardingStrategy::Standard { column, .. } => vec![column.as_str()],
            ShardingStrategy::Complex { columns, .. } => columns.iter().map(String::as_str).collect(),
            ShardingStrategy::None | ShardingStrategy::Hint { .. } => Vec::new(),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ShardingStrategy::None)
    }

    /// Narrow `available` for one table.
    ///
    /// `predicates` are the predicates of the current condition branch that
    /// apply to `table`; `hint` is the hint list for this routing level.
    /// The result keeps the order of `available` and contains no duplicates.
    pub fn do_sharding(
        &self,
        table: &str,
        available: &[String],
        predicates: &[&ShardingConditionValue],
        hint: &[DataValue],
        policy: RangeQueryPolicy,
    ) -> ShardingResult<Vec<String>> {
        let selected = match self {
            ShardingStrategy::None => return Ok(available.to_vec()),
            ShardingStrategy::Standard { column, algorithm } => {
                if !hint.is_empty() {
                    let mut targets = Vec::with_capacity(hint.len());
                    for value in hint {
                        targets.extend(algorithm.do_precise_sharding(available, column, value)?);
                    }
                    check_targets(algorithm.type_name(), available, &targets)?;
                    targets
                } else {
                    self.standard(table, column, algorithm.as_ref(), available, predicates, policy)?
                }
            }
            ShardingStrategy::Complex { columns, algorithm } => {
                self.complex(table, columns, algorithm.as_ref(), available, predicates, policy)?
            }
            ShardingStrategy::Hint { algorithm } => {
                if hint.is_empty() {
                    return Ok(available.to_vec());
                }
                let mut targets = Vec::with_capacity(hint.len());
                for value in hint {
                    targets.push(algorithm.do_sharding(available, value)?);
                }
                check_targets(algorithm.type_name(), available, &targets)?;
                targets
            }
        };
        Ok(retain_available(available, &selected))
    }

    fn standard(
        &self,
        table: &str,
        column: &str,
        algorithm: &dyn StandardShardingAlgorithm,
        available: &[String],
        predicates: &[&ShardingConditionValue],
        policy: RangeQueryPolicy,
    ) -> ShardingResult<Vec<String>> {
        let mut result: Option<Vec<String>> = None;
        // Several predicates on one column are a conjunction
        for predicate in predicates.iter().filter(|p| p.matches(table, column)) {
            let targets = match &predicate.value {
                ConditionValue::List(values) => {
                    let mut targets = Vec::with_capacity(values.len());
                    for value in values {
                        targets.extend(algorithm.do_precise_sharding(available, column, value)?);
                    }
                    targets
                }
                ConditionValue::Range(range) => match algorithm.do_range_sharding(available, column, range)? {
                    RangeRoute::Targets(targets) => targets,
                    RangeRoute::Unsupported => unsupported_range(table, column, available, policy)?,
                },
            };
            check_targets(algorithm.type_name(), available, &targets)?;
            result = Some(match result {
                None => targets,
                Some(previous) => previous.into_iter().filter(|t| targets.contains(t)).collect(),
            });
        }
        Ok(result.unwrap_or_else(|| available.to_vec()))
    }

    fn complex(
        &self,
        table: &str,
        columns: &[String],
        algorithm: &dyn ComplexKeysShardingAlgorithm,
        available: &[String],
        predicates: &[&ShardingConditionValue],
        policy: RangeQueryPolicy,
    ) -> ShardingResult<Vec<String>> {
        // Value lists per declared column, in declaration order
        let mut column_values: Vec<(&str, Vec<DataValue>)> = Vec::new();
        for column in columns {
            let mut values: Option<Vec<DataValue>> = None;
            for predicate in predicates.iter().filter(|p| p.matches(table, column)) {
                match &predicate.value {
                    ConditionValue::List(list) => {
                        values = Some(match values {
                            None => list.clone(),
                            Some(previous) => previous.into_iter().filter(|v| list.contains(v)).collect(),
                        });
                    }
                    ConditionValue::Range(_) => return unsupported_range(table, column, available, policy),
                }
            }
            if let Some(values) = values {
                column_values.push((column.as_str(), values));
            }
        }
        if column_values.is_empty() {
            return Ok(available.to_vec());
        }

        let mut combinations: Vec<HashMap<String, DataValue>> = vec![HashMap::new()];
        for (column, values) in &column_values {
            combinations = combinations
                .iter()
                .flat_map(|partial| {
                    values.iter().map(move |value| {
                        let mut next = partial.clone();
                        next.insert(column.to_string(), value.clone());
                        next
                    })
                })
                .collect();
        }

        let mut targets = Vec::new();
        for combination in &combinations {
            let selected = algorithm.do_sharding(available, combination)?;
            check_targets(algorithm.type_name(), available, &selected)?;
            targets.extend(selected);
        }
        Ok(targets)
    }
}

fn unsupported_range(
    table: &str,
    column: &str,
    available: &[String],
    policy: RangeQueryPolicy,
) -> ShardingResult<Vec<String>> {
    match policy {
        RangeQueryPolicy::BroadcastAll => Ok(available.to_vec()),
        RangeQueryPolicy::Reject => Err(ConfigError::RangeQueryNotSupported {
            table: table.to_string(),
            column: column.to_string(),
        }
        .into()),
    }
}

fn check_targets(algorithm: &str, available: &[String], targets: &[String]) -> ShardingResult<()> {
    match targets.iter().find(|t| !available.iter().any(|a| a.eq_ignore_ascii_case(t))) {
        Some(target) => Err(ConfigError::TargetNotAvailable {
            algorithm: algorithm.to_string(),
            target: target.clone(),
        }
        .into()),
        None => Ok(()),
    }
}

/// Candidates named in `selected`, in candidate order.
fn retain_available(available: &[String], selected: &[String]) -> Vec<String> {
    available
        .iter()
        .filter(|a| selected.iter().any(|s| s.eq_ignore_ascii_case(a)))
        .cloned()
        .collect()
}
