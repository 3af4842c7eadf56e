use std::sync::Arc;

use anyhow::Result;
use rand::Rng;

use shardkit::common::{ConfigError, RouteError};
use shardkit::route::{HintValues, RoutingEngine, ShardingConditionValue, ShardingConditions, ValueRange};
use shardkit::rule::{
    AlgorithmProperties, AlgorithmRegistry, RangeQueryPolicy, ShardingRule, ShardingRuleConfiguration,
    StrategyConfiguration, TableRuleConfiguration,
};
use shardkit::statement::{StatementContext, StatementKind};
use shardkit::{DataValue, ShardingError};

#[path = "../common/mod.rs"]
mod common;

use common::order_rule;

fn where_order_id(table: &str, value: i64) -> ShardingConditions {
    ShardingConditions::single(vec![ShardingConditionValue::equal(table, "order_id", value)])
}

#[test]
fn test_precise_value_routes_to_one_unit() -> Result<()> {
    let rule = order_rule(RangeQueryPolicy::Reject)?;
    for order_id in 0..64 {
        let ctx = StatementContext::select(&["t_order"]).with_conditions(where_order_id("t_order", order_id));
        let route = RoutingEngine::route(&ctx, &rule)?;
        assert_eq!(route.len(), 1, "order_id {}", order_id);
        let unit = route.route_units().next().unwrap();
        assert_eq!(unit.data_source_name, format!("ds_{}", order_id % 2));
        assert_eq!(unit.find_actual_table("t_order"), Some(format!("t_order_{}", order_id % 4).as_str()));
    }
    Ok(())
}

#[test]
fn test_order_id_five_routes_to_t_order_1() -> Result<()> {
    let rule = order_rule(RangeQueryPolicy::Reject)?;
    let ctx = StatementContext::select(&["t_order"]).with_conditions(where_order_id("t_order", 5));
    let route = RoutingEngine::route(&ctx, &rule)?;
    let rendered: Vec<String> = route.route_units().map(|u| u.to_string()).collect();
    assert_eq!(rendered, vec!["ds_1: t_order->t_order_1"]);
    Ok(())
}

#[test]
fn test_binding_tables_follow_driving_table() -> Result<()> {
    let rule = order_rule(RangeQueryPolicy::Reject)?;
    let mut rng = rand::thread_rng();
    for _ in 0..20 {
        let ids: Vec<DataValue> = (0..rng.gen_range(1..5)).map(|_| DataValue::Integer(rng.gen_range(0..100))).collect();
        let conditions =
            ShardingConditions::single(vec![ShardingConditionValue::list("t_order", "order_id", ids.clone())]);

        let driving = RoutingEngine::route(&StatementContext::select(&["t_order"]).with_conditions(conditions.clone()), &rule)?;
        let joined = RoutingEngine::route(
            &StatementContext::select(&["t_order", "t_order_item"]).with_conditions(conditions),
            &rule,
        )?;

        assert_eq!(driving.data_source_names(), joined.data_source_names());
        assert_eq!(driving.len(), joined.len());
        for unit in joined.route_units() {
            let order = unit.find_actual_table("t_order").unwrap();
            let item = unit.find_actual_table("t_order_item").unwrap();
            assert_eq!(order.trim_start_matches("t_order_"), item.trim_start_matches("t_order_item_"));
        }
    }
    Ok(())
}

#[test]
fn test_broadcast_table_routes_to_every_data_source() -> Result<()> {
    let rule = order_rule(RangeQueryPolicy::Reject)?;
    let ctx = StatementContext::new(StatementKind::Update, &["t_config"]);
    let route = RoutingEngine::route(&ctx, &rule)?;
    let units: Vec<_> = route.route_units().collect();
    assert_eq!(units.len(), rule.data_source_names().len());
    for unit in &units {
        assert_eq!(unit.table_mappers, units[0].table_mappers);
        assert_eq!(unit.find_actual_table("t_config"), Some("t_config"));
    }
    Ok(())
}

fn hashed_rule(policy: RangeQueryPolicy) -> Result<Arc<ShardingRule>> {
    let config = ShardingRuleConfiguration::new(&["ds_0"], policy)
        .with_algorithm("name_hash", "HASH_MOD", AlgorithmProperties::new().with("sharding-count", 4))
        .with_table(
            TableRuleConfiguration::new("t_account", "ds_0.t_account_${0..3}")
                .with_table_strategy(StrategyConfiguration::standard("name", "name_hash")),
        );
    Ok(ShardingRule::build(&config, &AlgorithmRegistry::default())?)
}

#[test]
fn test_wide_mod_ranges_route_everywhere() -> Result<()> {
    let rule = order_rule(RangeQueryPolicy::Reject)?;
    for range in [ValueRange::closed(1, 10), ValueRange::at_least(5), ValueRange::closed(i64::MIN, 10)] {
        let conditions = ShardingConditions::single(vec![ShardingConditionValue::range("t_order", "order_id", range)]);
        let ctx = StatementContext::select(&["t_order"]).with_conditions(conditions);
        assert_eq!(RoutingEngine::route(&ctx, &rule)?.len(), 4);
    }
    Ok(())
}

#[test]
fn test_range_query_policy() -> Result<()> {
    let conditions = ShardingConditions::single(vec![ShardingConditionValue::range(
        "t_account",
        "name",
        ValueRange::closed("a", "m"),
    )]);
    let ctx = StatementContext::select(&["t_account"]).with_conditions(conditions);

    let err = RoutingEngine::route(&ctx, &*hashed_rule(RangeQueryPolicy::Reject)?).unwrap_err();
    assert_eq!(
        err,
        ShardingError::Config(ConfigError::RangeQueryNotSupported {
            table: "t_account".into(),
            column: "name".into()
        })
    );

    let route = RoutingEngine::route(&ctx, &*hashed_rule(RangeQueryPolicy::BroadcastAll)?)?;
    assert_eq!(route.len(), 4);
    Ok(())
}

#[test]
fn test_narrow_range_is_routed_by_mod() -> Result<()> {
    let conditions = ShardingConditions::single(vec![ShardingConditionValue::range(
        "t_order",
        "order_id",
        ValueRange::closed(5, 5),
    )]);
    let ctx = StatementContext::select(&["t_order"]).with_conditions(conditions);
    let route = RoutingEngine::route(&ctx, &*order_rule(RangeQueryPolicy::Reject)?)?;
    assert_eq!(route.actual_tables("t_order"), vec!["t_order_1"]);
    Ok(())
}

#[test]
fn test_dml_without_target_fails() -> Result<()> {
    let rule = order_rule(RangeQueryPolicy::Reject)?;
    // order_id = 5 AND order_id = 6
    let conditions = ShardingConditions::single(vec![
        ShardingConditionValue::equal("t_order", "order_id", 5),
        ShardingConditionValue::equal("t_order", "order_id", 6),
    ]);

    let ctx = StatementContext::new(StatementKind::Delete, &["t_order"]).with_conditions(conditions.clone());
    let err = RoutingEngine::route(&ctx, &rule).unwrap_err();
    assert!(matches!(err, ShardingError::Route(RouteError::NoTarget { .. })));
    assert!(err.is_pre_execution());

    let ctx = StatementContext::select(&["t_order"]).with_conditions(conditions);
    assert!(RoutingEngine::route(&ctx, &rule)?.is_empty());
    Ok(())
}

#[test]
fn test_hint_strategy_and_complex_inline() -> Result<()> {
    let config = ShardingRuleConfiguration::new(&["ds_0", "ds_1"], RangeQueryPolicy::Reject)
        .with_algorithm("by_hint", "HINT_INLINE", AlgorithmProperties::new().with("algorithm-expression", "ds_${value % 2}"))
        .with_algorithm(
            "user_order",
            "COMPLEX_INLINE",
            AlgorithmProperties::new()
                .with("sharding-columns", "user_id, order_id")
                .with("algorithm-expression", "t_log_${(user_id + order_id) % 2}"),
        )
        .with_table(
            TableRuleConfiguration::new("t_log", "ds_${0..1}.t_log_${0..1}")
                .with_database_strategy(StrategyConfiguration::hint("by_hint"))
                .with_table_strategy(StrategyConfiguration::complex("user_id, order_id", "user_order")),
        );
    let rule = ShardingRule::build(&config, &AlgorithmRegistry::default())?;

    let conditions = ShardingConditions::single(vec![
        ShardingConditionValue::equal("t_log", "user_id", 3),
        ShardingConditionValue::equal("t_log", "order_id", 4),
    ]);
    let ctx = StatementContext::select(&["t_log"])
        .with_conditions(conditions)
        .with_hint(HintValues::new(vec![DataValue::Integer(7)], vec![]));
    let rendered: Vec<String> = RoutingEngine::route(&ctx, &rule)?.route_units().map(|u| u.to_string()).collect();
    assert_eq!(rendered, vec!["ds_1: t_log->t_log_1"]);

    // Without hint or predicates every node is hit
    let route = RoutingEngine::route(&StatementContext::select(&["t_log"]), &rule)?;
    assert_eq!(route.len(), 4);
    Ok(())
}

#[test]
fn test_or_branches_are_unioned() -> Result<()> {
    let rule = order_rule(RangeQueryPolicy::Reject)?;
    let conditions = ShardingConditions::any_of(vec![
        shardkit::route::ShardingCondition::new(vec![ShardingConditionValue::equal("t_order", "order_id", 2)]),
        shardkit::route::ShardingCondition::new(vec![ShardingConditionValue::equal("t_order", "order_id", 7)]),
        shardkit::route::ShardingCondition::new(vec![ShardingConditionValue::equal("t_order", "order_id", 6)]),
    ]);
    let route = RoutingEngine::route(&StatementContext::select(&["t_order"]).with_conditions(conditions), &rule)?;
    assert_eq!(route.actual_tables("t_order"), vec!["t_order_2", "t_order_3"]);
    Ok(())
}
