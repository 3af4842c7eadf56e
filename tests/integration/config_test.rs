use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use tempfile::NamedTempFile;

use shardkit::common::ConfigError;
use shardkit::route::{RoutingEngine, ShardingConditionValue, ShardingConditions, ValueRange};
use shardkit::rule::algorithm::{RangeRoute, StandardShardingAlgorithm};
use shardkit::rule::{
    AlgorithmProperties, AlgorithmRegistry, RangeQueryPolicy, ShardingAlgorithm, ShardingRule,
    ShardingRuleConfiguration, StrategyConfiguration, TableRuleConfiguration,
};
use shardkit::statement::StatementContext;
use shardkit::{DataValue, ShardingError, ShardingResult};

#[path = "../common/mod.rs"]
mod common;

const RULE_JSON: &str = r#"{
    "data_sources": ["ds_0", "ds_1"],
    "tables": [
        {
            "logic_table": "t_order",
            "actual_data_nodes": "ds_${0..1}.t_order_${0..1}",
            "database_strategy": { "type": "standard", "sharding_column": "user_id", "algorithm": "ds_inline" },
            "table_strategy": { "type": "standard", "sharding_column": "order_id", "algorithm": "order_mod" }
        },
        {
            "logic_table": "t_user",
            "actual_data_nodes": "ds_0.t_user_${0..4}",
            "table_strategy": { "type": "standard", "sharding_column": "user_id", "algorithm": "user_volume" }
        }
    ],
    "sharding_algorithms": {
        "ds_inline": { "type": "INLINE", "props": { "algorithm-expression": "ds_${user_id % 2}" } },
        "order_mod": { "type": "MOD", "props": { "sharding-count": 2 } },
        "user_volume": {
            "type": "VOLUME_RANGE",
            "props": { "range-lower": 0, "range-upper": 30, "sharding-volume": 10 }
        }
    },
    "broadcast_tables": ["t_config"],
    "range_query_policy": "reject"
}"#;

fn select(table: &str, values: Vec<ShardingConditionValue>) -> StatementContext {
    StatementContext::select(&[table]).with_conditions(ShardingConditions::single(values))
}

fn build(config: &ShardingRuleConfiguration) -> ShardingResult<Arc<ShardingRule>> {
    ShardingRule::build(config, &AlgorithmRegistry::default())
}

#[test]
fn test_rule_file_loads_and_routes() -> Result<()> {
    let mut file = NamedTempFile::new()?;
    file.write_all(RULE_JSON.as_bytes())?;
    let config = ShardingRuleConfiguration::from_path(file.path())?;
    let rule = build(&config)?;
    assert_eq!(rule.data_source_names(), ["ds_0".to_string(), "ds_1".to_string()]);

    let ctx = select(
        "t_order",
        vec![ShardingConditionValue::equal("t_order", "user_id", 3), ShardingConditionValue::equal("t_order", "order_id", 8)],
    );
    let rendered: Vec<String> = RoutingEngine::route(&ctx, &rule)?.route_units().map(|u| u.to_string()).collect();
    assert_eq!(rendered, vec!["ds_1: t_order->t_order_0"]);

    // [0, 10) [10, 20) [20, 30) live in t_user_1..3
    let ctx = select("t_user", vec![ShardingConditionValue::range("t_user", "user_id", ValueRange::closed(5, 15))]);
    assert_eq!(RoutingEngine::route(&ctx, &rule)?.actual_tables("t_user"), vec!["t_user_1", "t_user_2"]);
    let ctx = select("t_user", vec![ShardingConditionValue::equal("t_user", "user_id", 42)]);
    assert_eq!(RoutingEngine::route(&ctx, &rule)?.actual_tables("t_user"), vec!["t_user_4"]);
    Ok(())
}

#[test]
fn test_configuration_survives_json_round_trip() -> Result<()> {
    let config = common::order_rule_config(RangeQueryPolicy::BroadcastAll);
    let again = ShardingRuleConfiguration::from_json_str(&config.to_json_string()?)?;
    assert_eq!(config, again);
    build(&again)?;
    Ok(())
}

#[test]
fn test_malformed_documents_are_rejected() {
    let missing_policy = r#"{ "data_sources": ["ds_0"] }"#;
    let unknown_field = r#"{ "data_sources": ["ds_0"], "range_query_policy": "reject", "shards": 4 }"#;
    let unknown_strategy = r#"{
        "data_sources": ["ds_0"],
        "range_query_policy": "reject",
        "tables": [{
            "logic_table": "t_order",
            "actual_data_nodes": "ds_0.t_order",
            "table_strategy": { "type": "consistent", "algorithm": "x" }
        }]
    }"#;
    for json in [missing_policy, unknown_field, unknown_strategy, "not json"] {
        let err = ShardingRuleConfiguration::from_json_str(json).unwrap_err();
        assert!(matches!(err, ShardingError::Config(ConfigError::Load(_))), "{}", json);
    }
    assert!(ShardingRuleConfiguration::from_path("/nonexistent/rule.json").is_err());
}

#[test]
fn test_invalid_rules_fail_to_build() {
    let base = || ShardingRuleConfiguration::new(&["ds_0", "ds_1"], RangeQueryPolicy::Reject);

    let unknown_type = base()
        .with_algorithm("ring", "CONSISTENT_HASH", AlgorithmProperties::new())
        .with_table(TableRuleConfiguration::new("t_order", "ds_0.t_order_0"));
    assert_eq!(
        build(&unknown_type).unwrap_err(),
        ShardingError::Config(ConfigError::UnknownAlgorithmType("CONSISTENT_HASH".into()))
    );

    let two_columns = base()
        .with_algorithm("order_mod", "MOD", AlgorithmProperties::new().with("sharding-count", 2))
        .with_table(
            TableRuleConfiguration::new("t_order", "ds_0.t_order_${0..1}")
                .with_table_strategy(StrategyConfiguration::standard("order_id, user_id", "order_mod")),
        );
    assert!(matches!(
        build(&two_columns).unwrap_err(),
        ShardingError::Config(ConfigError::UnsupportedShardingColumns { strategy: "standard", count: 2, .. })
    ));

    let hint_as_standard = base()
        .with_algorithm("by_hint", "HINT_INLINE", AlgorithmProperties::new().with("algorithm-expression", "ds_${value}"))
        .with_table(
            TableRuleConfiguration::new("t_order", "ds_0.t_order_0")
                .with_database_strategy(StrategyConfiguration::standard("order_id", "by_hint")),
        );
    assert!(matches!(
        build(&hint_as_standard).unwrap_err(),
        ShardingError::Config(ConfigError::AlgorithmKindMismatch { expected: "standard", actual: "hint", .. })
    ));

    let shared_binding = common::order_rule_config(RangeQueryPolicy::Reject).with_binding_group("t_order_item, t_order");
    assert!(matches!(
        build(&shared_binding).unwrap_err(),
        ShardingError::Config(ConfigError::DuplicateBindingTable(_))
    ));

    let stray_node = base().with_table(TableRuleConfiguration::new("t_order", "ds_9.t_order_0"));
    assert_eq!(
        build(&stray_node).unwrap_err(),
        ShardingError::Config(ConfigError::UnknownDataSource("ds_9".into()))
    );
}

/// Routes by the last decimal digit of the value
#[derive(Debug)]
struct LastDigitAlgorithm;

impl StandardShardingAlgorithm for LastDigitAlgorithm {
    fn type_name(&self) -> &'static str {
        "LAST_DIGIT"
    }

    fn do_precise_sharding(
        &self,
        available: &[String],
        _column: &str,
        value: &DataValue,
    ) -> ShardingResult<Option<String>> {
        let digit = value.as_i64().unwrap_or(0).rem_euclid(10);
        let suffix = format!("_{}", digit);
        Ok(available.iter().find(|t| t.ends_with(&suffix)).cloned())
    }

    fn do_range_sharding(&self, _available: &[String], _column: &str, _range: &ValueRange) -> ShardingResult<RangeRoute> {
        Ok(RangeRoute::Unsupported)
    }
}

#[test]
fn test_custom_algorithm_type() -> Result<()> {
    let config = ShardingRuleConfiguration::new(&["ds_0"], RangeQueryPolicy::BroadcastAll)
        .with_algorithm("digit", "last_digit", AlgorithmProperties::new())
        .with_table(
            TableRuleConfiguration::new("t_event", "ds_0.t_event_${0..9}")
                .with_table_strategy(StrategyConfiguration::standard("event_id", "digit")),
        );
    assert!(matches!(build(&config).unwrap_err(), ShardingError::Config(ConfigError::UnknownAlgorithmType(_))));

    let mut registry = AlgorithmRegistry::default();
    registry.register("LAST_DIGIT", |_| Ok(ShardingAlgorithm::Standard(Arc::new(LastDigitAlgorithm))));
    let rule = ShardingRule::build(&config, &registry)?;

    let mut seen = HashMap::new();
    for event_id in [7, 17, 123, 40] {
        let ctx = select("t_event", vec![ShardingConditionValue::equal("t_event", "event_id", event_id)]);
        let route = RoutingEngine::route(&ctx, &rule)?;
        seen.insert(event_id, route.actual_tables("t_event").join(","));
    }
    assert_eq!(seen[&7], "t_event_7");
    assert_eq!(seen[&17], "t_event_7");
    assert_eq!(seen[&123], "t_event_3");
    assert_eq!(seen[&40], "t_event_0");

    // Range falls back to the broadcast policy
    let ctx = select("t_event", vec![ShardingConditionValue::range("t_event", "event_id", ValueRange::at_least(5))]);
    assert_eq!(RoutingEngine::route(&ctx, &rule)?.len(), 10);
    Ok(())
}
