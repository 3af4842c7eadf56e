use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tempfile::TempDir;

use shardkit::execute::{Connection, DataSourceRegistry, ExecutorConfig, PoolConfig, ShardingExecutor};
use shardkit::merge::Row;
use shardkit::route::{ShardingConditionValue, ShardingConditions};
use shardkit::rule::RangeQueryPolicy;
use shardkit::statement::{AggregationProjection, AggregationType, Limit, OrderByItem, StatementContext, StatementKind};
use shardkit::{DataValue, DatabaseType, ShardingSession, SqlRewriter};

#[path = "../common/mod.rs"]
mod common;

use common::{SqliteConnection, SqliteFactory, TableNameRewriter, order_rule};

const COLUMNS: &str = "(order_id INTEGER PRIMARY KEY, user_id INTEGER NOT NULL, amount INTEGER NOT NULL)";

/// ds_0.db and ds_1.db follow the order rule layout, single.db holds every
/// row in one plain t_order table.
fn create_databases(dir: &Path) -> Result<SqliteConnection> {
    for (data_source, tables) in [("ds_0", [0, 2]), ("ds_1", [1, 3])] {
        let connection = SqliteConnection::open(&dir.join(format!("{}.db", data_source)))?;
        for table in tables {
            connection.execute_batch(&format!("CREATE TABLE t_order_{} {};", table, COLUMNS))?;
        }
    }
    let single = SqliteConnection::open(&dir.join("single.db"))?;
    single.execute_batch(&format!("CREATE TABLE t_order {};", COLUMNS))?;
    Ok(single)
}

struct Fixture {
    session: ShardingSession,
    rewriter: Arc<TableNameRewriter>,
}

fn fixture(dir: &Path, max_connections_size_per_query: usize) -> Result<Fixture> {
    let mut registry = DataSourceRegistry::new();
    for data_source in ["ds_0", "ds_1"] {
        let factory = SqliteFactory { path: dir.join(format!("{}.db", data_source)) };
        registry.register(data_source, Arc::new(factory), PoolConfig::default());
    }
    let config = ExecutorConfig { max_connections_size_per_query, sql_show: true, ..Default::default() };
    let executor = ShardingExecutor::new(Arc::new(registry), config);
    let rewriter = Arc::new(TableNameRewriter::default());
    let session = ShardingSession::new(
        order_rule(RangeQueryPolicy::Reject)?,
        Arc::clone(&rewriter) as Arc<dyn SqlRewriter>,
        executor,
        DatabaseType::MySql,
    );
    Ok(Fixture { session, rewriter })
}

impl Fixture {
    fn query(&self, sql: &str, ctx: &StatementContext) -> Result<Vec<Row>> {
        self.rewriter.set_sql(sql);
        Ok(self.session.execute_query(ctx)?.collect_rows()?)
    }
}

fn insert_orders(fixture: &Fixture, single: &mut SqliteConnection) -> Result<()> {
    let sql = "INSERT INTO t_order (order_id, user_id, amount) VALUES (?, ?, ?)";
    for order_id in 1..=20i64 {
        let parameters: Vec<DataValue> = vec![order_id.into(), (order_id % 3).into(), (order_id * 10).into()];
        let ctx = StatementContext::new(StatementKind::Insert, &["t_order"])
            .with_conditions(ShardingConditions::single(vec![ShardingConditionValue::equal(
                "t_order", "order_id", order_id,
            )]))
            .with_parameters(parameters.clone());
        fixture.rewriter.set_sql(sql);
        let summary = fixture.session.execute_update(&ctx)?;
        assert_eq!(summary.affected_rows, 1);
        assert_eq!(summary.generated_key, Some(DataValue::Integer(order_id)));

        single.execute_update(sql, &parameters)?;
    }
    Ok(())
}

fn baseline(single: &SqliteConnection, sql: &str) -> Result<Vec<Row>> {
    Ok(single.query_rows(sql, &[])?.1)
}

#[test]
fn test_merged_results_match_single_database() -> Result<()> {
    let dir = TempDir::new()?;
    let mut single = create_databases(dir.path())?;
    insert_orders(&fixture(dir.path(), 1)?, &mut single)?;

    for cap in [1, 4] {
        let fixture = fixture(dir.path(), cap)?;

        // ORDER BY with LIMIT 2, 3: every shard returns its first 5 rows
        let ctx = StatementContext::select(&["t_order"])
            .with_order_by(vec![OrderByItem::desc("amount")])
            .with_limit(Limit::limit(2, 3));
        let merged = fixture.query("SELECT order_id, user_id, amount FROM t_order ORDER BY amount DESC LIMIT 5 OFFSET 0", &ctx)?;
        let expected =
            baseline(&single, "SELECT order_id, user_id, amount FROM t_order ORDER BY amount DESC LIMIT 3 OFFSET 2")?;
        assert_eq!(merged, expected, "order by limit, cap {}", cap);

        // GROUP BY streamed in group order
        let sql = "SELECT user_id, COUNT(*) AS cnt, SUM(amount) AS total FROM t_order GROUP BY user_id ORDER BY user_id";
        let grouped = StatementContext::select(&["t_order"])
            .with_group_by(vec![OrderByItem::asc("user_id")])
            .with_order_by(vec![OrderByItem::asc("user_id")])
            .with_aggregation(AggregationProjection::new(AggregationType::Count, 2))
            .with_aggregation(AggregationProjection::new(AggregationType::Sum, 3));
        assert_eq!(fixture.query(sql, &grouped)?, baseline(&single, sql)?, "group by, cap {}", cap);

        // GROUP BY ordered by an aggregate goes through memory
        let sql = "SELECT user_id, COUNT(*) AS cnt, SUM(amount) AS total FROM t_order GROUP BY user_id ORDER BY total DESC";
        let by_total = grouped.clone().with_order_by(vec![OrderByItem::desc("total")]);
        assert_eq!(fixture.query(sql, &by_total)?, baseline(&single, sql)?, "group by total, cap {}", cap);

        // AVG recomputed from the derived SUM and COUNT columns
        let sql = "SELECT user_id, AVG(amount), SUM(amount), COUNT(amount) FROM t_order GROUP BY user_id ORDER BY user_id";
        let avg = StatementContext::select(&["t_order"])
            .with_group_by(vec![OrderByItem::asc("user_id")])
            .with_aggregation(AggregationProjection::avg(2, 3, 4));
        assert_eq!(fixture.query(sql, &avg)?, baseline(&single, sql)?, "avg, cap {}", cap);

        // Aggregates without GROUP BY
        let sql = "SELECT COUNT(*), MAX(amount), MIN(order_id) FROM t_order";
        let totals = StatementContext::select(&["t_order"])
            .with_aggregation(AggregationProjection::new(AggregationType::Count, 1))
            .with_aggregation(AggregationProjection::new(AggregationType::Max, 2))
            .with_aggregation(AggregationProjection::new(AggregationType::Min, 3));
        let merged = fixture.query(sql, &totals)?;
        assert_eq!(merged, baseline(&single, sql)?);
        assert_eq!(merged, vec![vec![DataValue::Integer(20), DataValue::Integer(200), DataValue::Integer(1)]]);

        let sql = "SELECT COUNT(*), MAX(amount), MIN(order_id) FROM t_order WHERE amount > 1000";
        assert_eq!(fixture.query(sql, &totals)?, baseline(&single, sql)?, "empty aggregate, cap {}", cap);
    }
    Ok(())
}

#[test]
fn test_point_query_hits_one_shard() -> Result<()> {
    let dir = TempDir::new()?;
    let mut single = create_databases(dir.path())?;
    let fixture = fixture(dir.path(), 1)?;
    insert_orders(&fixture, &mut single)?;

    let ctx = StatementContext::select(&["t_order"]).with_conditions(ShardingConditions::single(vec![
        ShardingConditionValue::equal("t_order", "order_id", 7),
    ]));
    let route = fixture.session.route(&ctx)?;
    assert_eq!(route.actual_tables("t_order"), vec!["t_order_3"]);

    let rows = fixture.query("SELECT order_id, amount FROM t_order WHERE order_id = 7", &ctx)?;
    assert_eq!(rows, vec![vec![DataValue::Integer(7), DataValue::Integer(70)]]);
    Ok(())
}

#[test]
fn test_update_spans_every_shard() -> Result<()> {
    let dir = TempDir::new()?;
    let mut single = create_databases(dir.path())?;
    let fixture = fixture(dir.path(), 2)?;
    insert_orders(&fixture, &mut single)?;

    fixture.rewriter.set_sql("UPDATE t_order SET amount = amount + 1 WHERE user_id = 1");
    let summary = fixture.session.execute_update(&StatementContext::new(StatementKind::Update, &["t_order"]))?;
    assert_eq!(summary.affected_rows, 7);
    assert_eq!(summary.generated_key, None);

    let sql = "SELECT SUM(amount) FROM t_order";
    let ctx = StatementContext::select(&["t_order"])
        .with_aggregation(AggregationProjection::new(AggregationType::Sum, 1));
    assert_eq!(fixture.query(sql, &ctx)?, vec![vec![DataValue::Integer(2107)]]);
    Ok(())
}

#[test]
fn test_select_routed_nowhere_returns_no_rows() -> Result<()> {
    let dir = TempDir::new()?;
    let mut single = create_databases(dir.path())?;
    let fixture = fixture(dir.path(), 2)?;
    insert_orders(&fixture, &mut single)?;

    // order_id = 5 AND order_id = 6
    let conditions = ShardingConditions::single(vec![
        ShardingConditionValue::equal("t_order", "order_id", 5),
        ShardingConditionValue::equal("t_order", "order_id", 6),
    ]);
    assert!(fixture.session.route(&StatementContext::select(&["t_order"]).with_conditions(conditions.clone()))?.is_empty());

    let ordered = StatementContext::select(&["t_order"])
        .with_conditions(conditions.clone())
        .with_order_by(vec![OrderByItem::asc("order_id")]);
    let sql = "SELECT order_id, amount FROM t_order WHERE order_id = 5 AND order_id = 6 ORDER BY order_id";
    assert!(fixture.query(sql, &ordered)?.is_empty());

    let grouped = StatementContext::select(&["t_order"])
        .with_conditions(conditions.clone())
        .with_group_by(vec![OrderByItem::asc("user_id")])
        .with_aggregation(AggregationProjection::new(AggregationType::Count, 2));
    let sql = "SELECT user_id, COUNT(*) FROM t_order WHERE order_id = 5 AND order_id = 6 GROUP BY user_id";
    assert!(fixture.query(sql, &grouped)?.is_empty());

    let counted = StatementContext::select(&["t_order"])
        .with_conditions(conditions)
        .with_aggregation(AggregationProjection::new(AggregationType::Count, 1));
    let sql = "SELECT COUNT(*) FROM t_order WHERE order_id = 5 AND order_id = 6";
    assert_eq!(fixture.query(sql, &counted)?, baseline(&single, sql)?);
    Ok(())
}
