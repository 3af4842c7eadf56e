// Binding table groups.
//
// Tables of one group share their layout, so the route of the driving table
// decides every other table: the bound actual table sits at the same position
// on the same data source.

use crate::common::{ConfigError, ShardingResult};
use crate::rule::table_rule::TableRule;

#[derive(Debug, Clone, PartialEq)]
pub struct BindingTableRule {
    tables: Vec<String>,
}

impl BindingTableRule {
    /// Parse `t_order, t_order_item`.
    pub fn parse(group: &str) -> ShardingResult<Self> {
        let tables: Vec<String> = group
            .split(',')
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        if tables.len() < 2 {
            return Err(ConfigError::InvalidBindingGroup {
                group: group.to_string(),
                reason: "a binding group needs at least two tables".to_string(),
            }
            .into());
        }
        Ok(Self { tables })
    }

    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    pub fn has_logic_table(&self, table: &str) -> bool {
        self.tables.iter().any(|t| t.eq_ignore_ascii_case(table))
    }

    /// Check that every table has the same data sources and per-source table count.
    pub fn validate(&self, rules: &[&TableRule]) -> ShardingResult<()> {
        let Some((first, rest)) = rules.split_first() else {
            return Ok(());
        };
        for rule in rest {
            if rule.data_source_names() != first.data_source_names() {
                return Err(self.layout_error(&format!(
                    "'{}' and '{}' use different data sources",
                    first.logic_table, rule.logic_table
                )));
            }
            for ds in first.data_source_names() {
                if rule.actual_tables_on(ds).len() != first.actual_tables_on(ds).len() {
                    return Err(self.layout_error(&format!(
                        "'{}' and '{}' have different table counts on '{}'",
                        first.logic_table, rule.logic_table, ds
                    )));
                }
            }
        }
        Ok(())
    }

    fn layout_error(&self, reason: &str) -> crate::common::ShardingError {
        ConfigError::InvalidBindingGroup { group: self.tables.join(","), reason: reason.to_string() }.into()
    }

    /// Actual table of `bound` matching `driving_actual` of `driving`.
    pub fn bound_actual_table(
        &self,
        data_source: &str,
        driving: &TableRule,
        driving_actual: &str,
        bound: &TableRule,
    ) -> Option<String> {
        let index = driving.find_actual_table_index(data_source, driving_actual)?;
        bound.actual_table_at(data_source, index).map(str::to_string)
    }
}
