// Standard Routing
//
// Routes one sharding table, or one binding group through its driving table.
// Each condition branch is routed in two levels: the database strategy picks
// data sources, then the table strategy picks actual tables on each of them.

use crate::common::{DataNode, ShardingResult};
use crate::route::condition::{HintValues, ShardingCondition, ShardingConditionValue, ShardingConditions};
use crate::route::context::{RouteMapper, RouteUnit};
use crate::rule::{BindingTableRule, ShardingRule, TableRule};

/// Data nodes of `table_rule` selected by `conditions`, in route order.
pub fn route_data_nodes(
    rule: &ShardingRule,
    table_rule: &TableRule,
    conditions: &ShardingConditions,
    hint: &HintValues,
) -> ShardingResult<Vec<DataNode>> {
    let empty = ShardingCondition::default();
    let branches: Vec<&ShardingCondition> = if conditions.is_empty() {
        vec![&empty]
    } else {
        conditions.conditions.iter().collect()
    };

    let mut nodes: Vec<DataNode> = Vec::new();
    for branch in branches {
        for node in route_branch(rule, table_rule, branch, hint)? {
            if !nodes.contains(&node) {
                nodes.push(node);
            }
        }
    }
    Ok(nodes)
}

fn route_branch(
    rule: &ShardingRule,
    table_rule: &TableRule,
    branch: &ShardingCondition,
    hint: &HintValues,
) -> ShardingResult<Vec<DataNode>> {
    let table = table_rule.logic_table.as_str();
    let predicates: Vec<&ShardingConditionValue> = branch.for_table(table).collect();
    let policy = rule.range_query_policy();

    let data_sources = table_rule.database_strategy.do_sharding(
        table,
        table_rule.data_source_names(),
        &predicates,
        &hint.database,
        policy,
    )?;

    let mut nodes = Vec::new();
    for ds in &data_sources {
        let candidates = table_rule.actual_tables_on(ds);
        let tables = table_rule.table_strategy.do_sharding(table, &candidates, &predicates, &hint.table, policy)?;
        nodes.extend(tables.into_iter().map(|t| DataNode::new(ds.as_str(), t)));
    }
    Ok(nodes)
}

/// Route units for one sharding table and the tables bound to it.
///
/// `tables` are the statement's tables of this group in statement order;
/// the first one drives the route.
pub fn route_group(
    rule: &ShardingRule,
    binding: Option<&BindingTableRule>,
    tables: &[&TableRule],
    conditions: &ShardingConditions,
    hint: &HintValues,
) -> ShardingResult<Vec<RouteUnit>> {
    let Some((driving, bound)) = tables.split_first() else {
        return Ok(Vec::new());
    };
    let nodes = route_data_nodes(rule, driving, conditions, hint)?;

    let mut units = Vec::with_capacity(nodes.len());
    for node in nodes {
        let mut mappers = vec![RouteMapper::new(&driving.logic_table, &node.table)];
        if let Some(binding) = binding {
            for table in bound {
                if let Some(actual) = binding.bound_actual_table(&node.data_source, driving, &node.table, table) {
                    mappers.push(RouteMapper::new(&table.logic_table, &actual));
                }
            }
        }
        units.push(RouteUnit::new(&node.data_source, mappers));
    }
    Ok(units)
}
