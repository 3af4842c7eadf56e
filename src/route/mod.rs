// Routing Module
//
// Pure mapping from a bound statement and a rule snapshot to the route
// context that says which data sources and actual tables the statement hits.

pub mod cartesian;
pub mod condition;
pub mod context;
pub mod standard;

use log::debug;

use crate::common::{RouteError, ShardingResult};
use crate::rule::{BindingTableRule, ShardingRule, TableRule};
use crate::statement::StatementContext;

pub use condition::{ConditionValue, HintValues, ShardingCondition, ShardingConditionValue, ShardingConditions, ValueRange};
pub use context::{RouteContext, RouteMapper, RouteUnit};

/// How the statement's tables are classified by the rule
struct TableClasses<'a> {
    sharding: Vec<&'a TableRule>,
    broadcast: Vec<&'a str>,
    /// Unsharded tables with their owning data source
    single: Vec<(&'a str, &'a str)>,
}

fn classify<'a>(ctx: &'a StatementContext, rule: &'a ShardingRule) -> ShardingResult<TableClasses<'a>> {
    let mut classes = TableClasses { sharding: Vec::new(), broadcast: Vec::new(), single: Vec::new() };
    for table in &ctx.tables {
        if let Some(table_rule) = rule.find_table_rule(table) {
            if !classes.sharding.iter().any(|t| std::ptr::eq(*t, table_rule)) {
                classes.sharding.push(table_rule);
            }
        } else if rule.is_broadcast_table(table) {
            classes.broadcast.push(table.as_str());
        } else if let Some(ds) = rule.single_table_data_source(table) {
            classes.single.push((table.as_str(), ds));
        } else {
            return Err(RouteError::TableNotConfigured(table.clone()).into());
        }
    }
    Ok(classes)
}

pub struct RoutingEngine;

impl RoutingEngine {
    /// Route one statement.
    pub fn route(ctx: &StatementContext, rule: &ShardingRule) -> ShardingResult<RouteContext> {
        if ctx.tables.is_empty() {
            return Err(RouteError::NoTables.into());
        }
        let classes = classify(ctx, rule)?;

        let mut route_context = if !classes.sharding.is_empty() {
            Self::route_sharding(ctx, rule, &classes)?
        } else if !classes.single.is_empty() {
            Self::route_single(&classes)?
        } else {
            RouteContext::from_units(
                rule.data_source_names().iter().map(|ds| RouteUnit::new(ds, Vec::new())),
            )
        };

        if !classes.broadcast.is_empty() {
            route_context.map_units(|unit| {
                for table in &classes.broadcast {
                    unit.push_mapper(RouteMapper::new(table, table));
                }
            });
        }

        if route_context.is_empty() && ctx.kind.is_dml() {
            return Err(RouteError::NoTarget { statement: ctx.kind.name().to_string(), tables: ctx.tables.clone() }
                .into());
        }

        debug!(
            "Routed {} on {:?} to {} unit(s): [{}]",
            ctx.kind.name(),
            ctx.tables,
            route_context.len(),
            route_context.route_units().map(|u| u.to_string()).collect::<Vec<_>>().join("; ")
        );
        Ok(route_context)
    }

    fn route_sharding(
        ctx: &StatementContext,
        rule: &ShardingRule,
        classes: &TableClasses<'_>,
    ) -> ShardingResult<RouteContext> {
        // Group sharding tables by binding rule, in statement order
        let mut groups: Vec<(Option<&BindingTableRule>, Vec<&TableRule>)> = Vec::new();
        for table in classes.sharding.iter().copied() {
            let binding = rule.find_binding_rule(&table.logic_table);
            let position =
                binding.and_then(|b| groups.iter().position(|(g, _)| g.is_some_and(|g| std::ptr::eq(g, b))));
            match position {
                Some(i) => groups[i].1.push(table),
                None => groups.push((binding, vec![table])),
            }
        }

        let mut routed = Vec::with_capacity(groups.len());
        for (binding, tables) in &groups {
            routed.push(standard::route_group(rule, *binding, tables, &ctx.conditions, &ctx.hint)?);
        }
        let units = if routed.len() == 1 { routed.remove(0) } else { cartesian::combine(&routed) };
        let mut route_context = RouteContext::from_units(units);

        if !classes.single.is_empty() {
            let data_source = Self::common_single_data_source(classes)?;
            route_context.retain(|unit| unit.data_source_name == data_source);
            if route_context.is_empty() {
                return Err(RouteError::NoCommonDataSource(ctx.tables.clone()).into());
            }
            route_context.map_units(|unit| {
                for (table, _) in &classes.single {
                    unit.push_mapper(RouteMapper::new(table, table));
                }
            });
        }
        Ok(route_context)
    }

    fn route_single(classes: &TableClasses<'_>) -> ShardingResult<RouteContext> {
        let data_source = Self::common_single_data_source(classes)?;
        let mappers = classes.single.iter().map(|(table, _)| RouteMapper::new(table, table)).collect();
        Ok(RouteContext::from_units([RouteUnit::new(data_source, mappers)]))
    }

    fn common_single_data_source<'a>(classes: &TableClasses<'a>) -> ShardingResult<&'a str> {
        let (_, first) = classes.single[0];
        if classes.single.iter().any(|(_, ds)| *ds != first) {
            return Err(RouteError::NoCommonDataSource(
                classes.single.iter().map(|(t, _)| t.to_string()).collect(),
            )
            .into());
        }
        Ok(first)
    }
}
