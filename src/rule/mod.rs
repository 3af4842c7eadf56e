// Sharding Rule Module
//
// Immutable rule snapshot compiled from a `ShardingRuleConfiguration`.
// Every configuration defect is reported by `ShardingRule::build`, so routing
// against a built snapshot only fails on statement-specific problems.

pub mod algorithm;
pub mod binding;
pub mod config;
pub mod inline;
pub mod strategy;
pub mod table_rule;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use linked_hash_map::LinkedHashMap;
use log::debug;

use crate::common::{ConfigError, DataNode, ShardingResult};

pub use algorithm::{AlgorithmProperties, AlgorithmRegistry, ShardingAlgorithm};
pub use binding::BindingTableRule;
pub use config::{AlgorithmConfiguration, ShardingRuleConfiguration, StrategyConfiguration, TableRuleConfiguration};
pub use strategy::{RangeQueryPolicy, ShardingStrategy};
pub use table_rule::TableRule;

#[derive(Debug, Clone)]
pub struct ShardingRule {
    data_sources: Vec<String>,
    /// Keyed by lower-cased logical table name
    table_rules: LinkedHashMap<String, TableRule>,
    binding_rules: Vec<BindingTableRule>,
    broadcast_tables: Vec<String>,
    single_tables: LinkedHashMap<String, String>,
    default_data_source: Option<String>,
    range_query_policy: RangeQueryPolicy,
}

impl ShardingRule {
    /// Compile and validate a configuration.
    pub fn build(config: &ShardingRuleConfiguration, registry: &AlgorithmRegistry) -> ShardingResult<Arc<Self>> {
        let mut data_sources: Vec<String> = Vec::new();
        for ds in &config.data_sources {
            if data_sources.contains(ds) {
                return Err(ConfigError::Load(format!("data source '{}' is declared twice", ds)).into());
            }
            data_sources.push(ds.clone());
        }
        if data_sources.is_empty() {
            return Err(ConfigError::Load("at least one data source is required".to_string()).into());
        }

        let mut algorithms: HashMap<&str, ShardingAlgorithm> = HashMap::new();
        for (name, algorithm) in config.sharding_algorithms.iter() {
            algorithms.insert(name.as_str(), registry.create(&algorithm.algorithm_type, &algorithm.props)?);
        }

        let mut table_rules = LinkedHashMap::new();
        for table in &config.tables {
            let key = table.logic_table.to_ascii_lowercase();
            if table_rules.contains_key(&key) {
                return Err(ConfigError::DuplicateTable(table.logic_table.clone()).into());
            }
            let nodes = match &table.actual_data_nodes {
                Some(expression) => inline::expand_data_nodes(expression)?,
                None => data_sources.iter().map(|ds| DataNode::new(ds.as_str(), table.logic_table.as_str())).collect(),
            };
            if let Some(node) = nodes.iter().find(|n| !data_sources.contains(&n.data_source)) {
                return Err(ConfigError::UnknownDataSource(node.data_source.clone()).into());
            }
            let database_strategy = build_strategy(
                &table.logic_table,
                table.database_strategy.as_ref().or(config.default_database_strategy.as_ref()),
                &algorithms,
            )?;
            let table_strategy = build_strategy(
                &table.logic_table,
                table.table_strategy.as_ref().or(config.default_table_strategy.as_ref()),
                &algorithms,
            )?;
            table_rules.insert(key, TableRule::new(&table.logic_table, nodes, database_strategy, table_strategy));
        }

        let mut binding_rules = Vec::new();
        let mut bound: HashSet<String> = HashSet::new();
        for group in &config.binding_tables {
            let rule = BindingTableRule::parse(group)?;
            let mut members = Vec::new();
            for table in rule.tables() {
                if !bound.insert(table.clone()) {
                    return Err(ConfigError::DuplicateBindingTable(table.clone()).into());
                }
                let table_rule = table_rules.get(table).ok_or_else(|| ConfigError::InvalidBindingGroup {
                    group: group.clone(),
                    reason: format!("'{}' is not a sharding table", table),
                })?;
                members.push(table_rule);
            }
            rule.validate(&members)?;
            binding_rules.push(rule);
        }

        let broadcast_tables: Vec<String> =
            config.broadcast_tables.iter().map(|t| t.to_ascii_lowercase()).collect();
        if let Some(table) = broadcast_tables.iter().find(|t| table_rules.contains_key(*t)) {
            return Err(ConfigError::DuplicateTable(table.clone()).into());
        }

        let mut single_tables = LinkedHashMap::new();
        for (table, ds) in config.single_tables.iter() {
            let key = table.to_ascii_lowercase();
            if table_rules.contains_key(&key) || broadcast_tables.contains(&key) || single_tables.contains_key(&key) {
                return Err(ConfigError::DuplicateTable(table.clone()).into());
            }
            if !data_sources.contains(ds) {
                return Err(ConfigError::UnknownDataSource(ds.clone()).into());
            }
            single_tables.insert(key, ds.clone());
        }

        if let Some(ds) = &config.default_data_source {
            if !data_sources.contains(ds) {
                return Err(ConfigError::UnknownDataSource(ds.clone()).into());
            }
        }

        debug!(
            "Built sharding rule: {} data sources, {} sharding tables, {} binding groups, {} broadcast tables",
            data_sources.len(),
            table_rules.len(),
            binding_rules.len(),
            broadcast_tables.len()
        );

        Ok(Arc::new(Self {
            data_sources,
            table_rules,
            binding_rules,
            broadcast_tables,
            single_tables,
            default_data_source: config.default_data_source.clone(),
            range_query_policy: config.range_query_policy,
        }))
    }

    pub fn data_source_names(&self) -> &[String] {
        &self.data_sources
    }

    pub fn table_rules(&self) -> impl Iterator<Item = &TableRule> {
        self.table_rules.values()
    }

    pub fn find_table_rule(&self, logic_table: &str) -> Option<&TableRule> {
        self.table_rules.get(&logic_table.to_ascii_lowercase())
    }

    pub fn is_sharding_table(&self, logic_table: &str) -> bool {
        self.find_table_rule(logic_table).is_some()
    }

    pub fn is_broadcast_table(&self, logic_table: &str) -> bool {
        self.broadcast_tables.iter().any(|t| t.eq_ignore_ascii_case(logic_table))
    }

    /// Owner of an unsharded table: its configured data source, else the default one.
    pub fn single_table_data_source(&self, logic_table: &str) -> Option<&str> {
        self.single_tables
            .get(&logic_table.to_ascii_lowercase())
            .or(self.default_data_source.as_ref())
            .map(String::as_str)
    }

    pub fn find_binding_rule(&self, logic_table: &str) -> Option<&BindingTableRule> {
        self.binding_rules.iter().find(|r| r.has_logic_table(logic_table))
    }

    pub fn range_query_policy(&self) -> RangeQueryPolicy {
        self.range_query_policy
    }

    pub fn default_data_source(&self) -> Option<&str> {
        self.default_data_source.as_deref()
    }
}

fn algorithm<'a>(
    algorithms: &'a HashMap<&str, ShardingAlgorithm>,
    name: &str,
) -> ShardingResult<&'a ShardingAlgorithm> {
    algorithms.get(name).ok_or_else(|| ConfigError::AlgorithmNotFound(name.to_string()).into())
}

fn kind_mismatch(name: &str, expected: &'static str, actual: &ShardingAlgorithm) -> crate::common::ShardingError {
    ConfigError::AlgorithmKindMismatch { name: name.to_string(), expected, actual: actual.kind_name() }.into()
}

fn split_columns(columns: &str) -> Vec<String> {
    columns.split(',').map(|c| c.trim().to_string()).filter(|c| !c.is_empty()).collect()
}

fn build_strategy(
    table: &str,
    config: Option<&StrategyConfiguration>,
    algorithms: &HashMap<&str, ShardingAlgorithm>,
) -> ShardingResult<ShardingStrategy> {
    match config {
        None | Some(StrategyConfiguration::None) => Ok(ShardingStrategy::None),
        Some(StrategyConfiguration::Standard { sharding_column, algorithm: name }) => {
            let columns = split_columns(sharding_column);
            if columns.len() != 1 {
                return Err(ConfigError::UnsupportedShardingColumns {
                    table: table.to_string(),
                    strategy: "standard",
                    count: columns.len(),
                }
                .into());
            }
            match algorithm(algorithms, name)? {
                ShardingAlgorithm::Standard(a) => {
                    Ok(ShardingStrategy::Standard { column: columns[0].clone(), algorithm: a.clone() })
                }
                other => Err(kind_mismatch(name, "standard", other)),
            }
        }
        Some(StrategyConfiguration::Complex { sharding_columns, algorithm: name }) => {
            let columns = split_columns(sharding_columns);
            if columns.is_empty() {
                return Err(ConfigError::UnsupportedShardingColumns {
                    table: table.to_string(),
                    strategy: "complex",
                    count: 0,
                }
                .into());
            }
            match algorithm(algorithms, name)? {
                ShardingAlgorithm::Complex(a) => Ok(ShardingStrategy::Complex { columns, algorithm: a.clone() }),
                other => Err(kind_mismatch(name, "complex", other)),
            }
        }
        Some(StrategyConfiguration::Hint { algorithm: name }) => match algorithm(algorithms, name)? {
            ShardingAlgorithm::Hint(a) => Ok(ShardingStrategy::Hint { algorithm: a.clone() }),
            other => Err(kind_mismatch(name, "hint", other)),
        },
    }
}
