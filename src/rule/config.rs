// Rule Configuration
//
// Serde document describing a sharding rule. It is loaded from JSON and then
// compiled into an immutable `ShardingRule` snapshot.

use std::fs;
use std::path::Path;

use linked_hash_map::LinkedHashMap;
use serde::{Deserialize, Serialize};

use crate::common::{ConfigError, ShardingResult};
use crate::rule::algorithm::AlgorithmProperties;
use crate::rule::strategy::RangeQueryPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShardingRuleConfiguration {
    pub data_sources: Vec<String>,
    #[serde(default)]
    pub tables: Vec<TableRuleConfiguration>,
    #[serde(default)]
    pub default_database_strategy: Option<StrategyConfiguration>,
    #[serde(default)]
    pub default_table_strategy: Option<StrategyConfiguration>,
    #[serde(default)]
    pub sharding_algorithms: LinkedHashMap<String, AlgorithmConfiguration>,
    /// Each entry is one group written as `t_order, t_order_item`
    #[serde(default)]
    pub binding_tables: Vec<String>,
    #[serde(default)]
    pub broadcast_tables: Vec<String>,
    /// Unsharded table to the data source that owns it
    #[serde(default)]
    pub single_tables: LinkedHashMap<String, String>,
    #[serde(default)]
    pub default_data_source: Option<String>,
    /// Required, no default
    pub range_query_policy: RangeQueryPolicy,
}

impl ShardingRuleConfiguration {
    pub fn new(data_sources: &[&str], range_query_policy: RangeQueryPolicy) -> Self {
        Self {
            data_sources: data_sources.iter().map(|s| s.to_string()).collect(),
            tables: Vec::new(),
            default_database_strategy: None,
            default_table_strategy: None,
            sharding_algorithms: LinkedHashMap::new(),
            binding_tables: Vec::new(),
            broadcast_tables: Vec::new(),
            single_tables: LinkedHashMap::new(),
            default_data_source: None,
            range_query_policy,
        }
    }

    pub fn from_json_str(json: &str) -> ShardingResult<Self> {
        serde_json::from_str(json).map_err(|e| ConfigError::Load(e.to_string()).into())
    }

    pub fn from_path(path: impl AsRef<Path>) -> ShardingResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> ShardingResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Load(e.to_string()).into())
    }

    pub fn with_table(mut self, table: TableRuleConfiguration) -> Self {
        self.tables.push(table);
        self
    }

    pub fn with_algorithm(mut self, name: &str, algorithm_type: &str, props: AlgorithmProperties) -> Self {
        self.sharding_algorithms
            .insert(name.to_string(), AlgorithmConfiguration { algorithm_type: algorithm_type.to_string(), props });
        self
    }

    pub fn with_binding_group(mut self, group: &str) -> Self {
        self.binding_tables.push(group.to_string());
        self
    }

    pub fn with_broadcast_table(mut self, table: &str) -> Self {
        self.broadcast_tables.push(table.to_string());
        self
    }

    pub fn with_single_table(mut self, table: &str, data_source: &str) -> Self {
        self.single_tables.insert(table.to_string(), data_source.to_string());
        self
    }

    pub fn with_default_data_source(mut self, data_source: &str) -> Self {
        self.default_data_source = Some(data_source.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableRuleConfiguration {
    pub logic_table: String,
    /// Inline expression; absent means `<ds>.<logic_table>` on every data source
    #[serde(default)]
    pub actual_data_nodes: Option<String>,
    #[serde(default)]
    pub database_strategy: Option<StrategyConfiguration>,
    #[serde(default)]
    pub table_strategy: Option<StrategyConfiguration>,
}

impl TableRuleConfiguration {
    pub fn new(logic_table: &str, actual_data_nodes: &str) -> Self {
        Self {
            logic_table: logic_table.to_string(),
            actual_data_nodes: Some(actual_data_nodes.to_string()),
            database_strategy: None,
            table_strategy: None,
        }
    }

    pub fn with_database_strategy(mut self, strategy: StrategyConfiguration) -> Self {
        self.database_strategy = Some(strategy);
        self
    }

    pub fn with_table_strategy(mut self, strategy: StrategyConfiguration) -> Self {
        self.table_strategy = Some(strategy);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfiguration {
    None,
    Standard {
        sharding_column: String,
        algorithm: String,
    },
    /// `sharding_columns` is comma separated
    Complex {
        sharding_columns: String,
        algorithm: String,
    },
    Hint {
        algorithm: String,
    },
}

impl StrategyConfiguration {
    pub fn standard(column: &str, algorithm: &str) -> Self {
        StrategyConfiguration::Standard { sharding_column: column.to_string(), algorithm: algorithm.to_string() }
    }

    pub fn complex(columns: &str, algorithm: &str) -> Self {
        StrategyConfiguration::Complex { sharding_columns: columns.to_string(), algorithm: algorithm.to_string() }
    }

    pub fn hint(algorithm: &str) -> Self {
        StrategyConfiguration::Hint { algorithm: algorithm.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlgorithmConfiguration {
    #[serde(rename = "type")]
    pub algorithm_type: String,
    #[serde(default)]
    pub props: AlgorithmProperties,
}
