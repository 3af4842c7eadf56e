// Execution Units and Grouping
//
// An execution unit is one rewritten statement bound to one data source.
// Units are grouped per data source into connection-sized partitions; the
// per-query connection cap decides whether a partition shares a connection
// (connection strict) or each statement gets its own (memory strict).

use std::fmt;

use linked_hash_map::LinkedHashMap;

use crate::common::{DataSourceName, DataValue, UnitIndex};

/// SQL text with its parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SqlUnit {
    pub sql: String,
    pub parameters: Vec<DataValue>,
}

impl SqlUnit {
    pub fn new(sql: impl Into<String>, parameters: Vec<DataValue>) -> Self {
        Self { sql: sql.into(), parameters }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionUnit {
    pub data_source_name: DataSourceName,
    pub sql_unit: SqlUnit,
}

impl ExecutionUnit {
    pub fn new(data_source_name: impl Into<String>, sql: impl Into<String>, parameters: Vec<DataValue>) -> Self {
        Self { data_source_name: data_source_name.into(), sql_unit: SqlUnit::new(sql, parameters) }
    }
}

impl fmt::Display for ExecutionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ::: {}", self.data_source_name, self.sql_unit.sql)?;
        if !self.sql_unit.parameters.is_empty() {
            let parameters: Vec<String> = self.sql_unit.parameters.iter().map(|p| p.to_string()).collect();
            write!(f, " ::: [{}]", parameters.join(", "))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// One connection per statement, results stream
    MemoryStrict,
    /// Statements of a partition share one connection and are materialized
    ConnectionStrict,
}

/// Units that run sequentially on one connection
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionGroup {
    pub data_source_name: DataSourceName,
    pub connection_mode: ConnectionMode,
    /// Units with their submission index
    pub units: Vec<(UnitIndex, ExecutionUnit)>,
}

/// Partition units per data source.
///
/// Data sources keep first-appearance order. For `n` units on a data source
/// and a cap of `c` connections, partitions hold `max(ceil(n / c), 1)` units.
pub fn group_units(units: Vec<ExecutionUnit>, max_connections_size_per_query: usize) -> Vec<ExecutionGroup> {
    let cap = max_connections_size_per_query.max(1);
    let mut per_data_source: LinkedHashMap<DataSourceName, Vec<(UnitIndex, ExecutionUnit)>> = LinkedHashMap::new();
    for (index, unit) in units.into_iter().enumerate() {
        per_data_source.entry(unit.data_source_name.clone()).or_insert_with(Vec::new).push((index, unit));
    }

    let mut groups = Vec::new();
    for (data_source_name, units) in per_data_source {
        let count = units.len();
        let partition_size = count.div_ceil(cap).max(1);
        let connection_mode =
            if cap < count { ConnectionMode::ConnectionStrict } else { ConnectionMode::MemoryStrict };
        let mut units = units.into_iter().peekable();
        while units.peek().is_some() {
            groups.push(ExecutionGroup {
                data_source_name: data_source_name.clone(),
                connection_mode,
                units: units.by_ref().take(partition_size).collect(),
            });
        }
    }
    groups
}
