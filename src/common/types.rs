use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::error::{ConfigError, ShardingResult};

/// Data source name type
pub type DataSourceName = String;

/// Position of an execution unit in the submitted list
pub type UnitIndex = usize;

/// One physical table on one data source
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DataNode {
    pub data_source: DataSourceName,
    pub table: String,
}

impl DataNode {
    pub fn new(data_source: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            data_source: data_source.into(),
            table: table.into(),
        }
    }

    /// Parse `ds.table`
    pub fn parse(text: &str) -> ShardingResult<Self> {
        let text = text.trim();
        match text.split_once('.') {
            Some((ds, table)) if !ds.is_empty() && !table.is_empty() && !table.contains('.') => {
                Ok(Self::new(ds, table))
            }
            _ => Err(ConfigError::InlineExpression {
                expression: text.to_string(),
                reason: "data node must be written as <data_source>.<table>".to_string(),
            }
            .into()),
        }
    }
}

impl fmt::Display for DataNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.data_source, self.table)
    }
}

/// SQL dialect of the physical databases; selects the pagination decorator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseType {
    #[default]
    MySql,
    PostgreSql,
    Sqlite,
    SqlServer,
    Oracle,
}
