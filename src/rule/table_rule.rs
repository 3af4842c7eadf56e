// Logical table to data node layout.

use crate::common::DataNode;
use crate::rule::strategy::ShardingStrategy;

#[derive(Debug, Clone)]
pub struct TableRule {
    pub logic_table: String,
    pub actual_data_nodes: Vec<DataNode>,
    pub database_strategy: ShardingStrategy,
    pub table_strategy: ShardingStrategy,
    data_sources: Vec<String>,
}

impl TableRule {
    pub fn new(
        logic_table: &str,
        actual_data_nodes: Vec<DataNode>,
        database_strategy: ShardingStrategy,
        table_strategy: ShardingStrategy,
    ) -> Self {
        let mut data_sources: Vec<String> = Vec::new();
        for node in &actual_data_nodes {
            if !data_sources.contains(&node.data_source) {
                data_sources.push(node.data_source.clone());
            }
        }
        Self {
            logic_table: logic_table.to_string(),
            actual_data_nodes,
            database_strategy,
            table_strategy,
            data_sources,
        }
    }

    /// Data sources holding this table, in declaration order
    pub fn data_source_names(&self) -> &[String] {
        &self.data_sources
    }

    /// Actual tables on `data_source`, in declaration order
    pub fn actual_tables_on(&self, data_source: &str) -> Vec<String> {
        self.actual_data_nodes
            .iter()
            .filter(|n| n.data_source == data_source)
            .map(|n| n.table.clone())
            .collect()
    }

    /// Position of `actual_table` among the tables on `data_source`.
    pub fn find_actual_table_index(&self, data_source: &str, actual_table: &str) -> Option<usize> {
        self.actual_data_nodes
            .iter()
            .filter(|n| n.data_source == data_source)
            .position(|n| n.table.eq_ignore_ascii_case(actual_table))
    }

    pub fn actual_table_at(&self, data_source: &str, index: usize) -> Option<&str> {
        self.actual_data_nodes
            .iter()
            .filter(|n| n.data_source == data_source)
            .nth(index)
            .map(|n| n.table.as_str())
    }
}
