use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Result;
use rand::Rng;

use shardkit::execute::{DataSourceRegistry, ExecutionUnit, ExecutorConfig, FailurePolicy, PoolConfig, ShardingExecutor};
use shardkit::{DataValue, QueryResult, ShardingError};

#[path = "../common/mod.rs"]
mod common;

use common::{CursorTracker, ScriptFactory};

fn registry(tracker: &Arc<CursorTracker>, pool: PoolConfig) -> Arc<DataSourceRegistry> {
    let mut registry = DataSourceRegistry::new();
    for name in ["ds_0", "ds_1"] {
        registry.register(name, Arc::new(ScriptFactory { tracker: Arc::clone(tracker) }), pool.clone());
    }
    Arc::new(registry)
}

fn executor(tracker: &Arc<CursorTracker>, config: ExecutorConfig) -> ShardingExecutor {
    ShardingExecutor::new(registry(tracker, PoolConfig::default()), config)
}

fn first_values(cursors: Vec<Box<dyn QueryResult>>) -> Result<Vec<i64>> {
    let mut values = Vec::new();
    for mut cursor in cursors {
        while cursor.next()? {
            if let DataValue::Integer(n) = cursor.get(1)? {
                values.push(n);
            }
        }
        cursor.close()?;
    }
    Ok(values)
}

#[test]
fn test_results_keep_submission_order() -> Result<()> {
    let tracker = Arc::new(CursorTracker::default());
    let executor = executor(&tracker, ExecutorConfig { max_connections_size_per_query: 4, ..Default::default() });
    let mut rng = rand::thread_rng();
    for _ in 0..5 {
        let units: Vec<ExecutionUnit> = (0..12)
            .map(|i| ExecutionUnit::new(format!("ds_{}", i % 2), format!("SLEEP {} ROWS {}", rng.gen_range(0..15), i), vec![]))
            .collect();
        let cursors = executor.execute_query(units)?;
        assert_eq!(first_values(cursors)?, (0..12).collect::<Vec<i64>>());
    }
    assert_eq!(tracker.closed(), tracker.opened());
    Ok(())
}

#[test]
fn test_failure_surfaces_and_closes_every_cursor() -> Result<()> {
    let tracker = Arc::new(CursorTracker::default());
    let executor = executor(&tracker, ExecutorConfig::default());
    let units: Vec<ExecutionUnit> = (0..8)
        .map(|i| {
            let sql = if i == 3 { "SLEEP 5 FAIL".to_string() } else { format!("SLEEP 2 ROWS {}", i) };
            ExecutionUnit::new(format!("ds_{}", i % 2), sql, vec![])
        })
        .collect();

    match executor.execute_query(units) {
        Err(ShardingError::Execution(e)) => {
            assert_eq!(e.unit_index, 3);
            assert_eq!(e.data_source, "ds_1");
            assert!(e.reason.contains("scripted failure"));
        }
        other => panic!("expected execution error, got {:?}", other.map(|c| c.len())),
    }
    assert_eq!(tracker.closed(), tracker.opened());
    for name in ["ds_0", "ds_1"] {
        assert_eq!(executor.registry().pool(name)?.active_count(), 0);
    }
    Ok(())
}

#[test]
fn test_later_units_of_failed_group_never_run() -> Result<()> {
    let tracker = Arc::new(CursorTracker::default());
    let executor = executor(&tracker, ExecutorConfig::default());
    let units = vec![
        ExecutionUnit::new("ds_0", "FAIL", vec![]),
        ExecutionUnit::new("ds_0", "ROWS 1", vec![]),
        ExecutionUnit::new("ds_0", "ROWS 2", vec![]),
    ];
    let err = executor.execute_query(units).err();
    assert!(matches!(err, Some(ShardingError::Execution(ref e)) if e.unit_index == 0));
    assert_eq!(tracker.opened(), 0);
    Ok(())
}

#[test]
fn test_connection_strict_respects_cap() -> Result<()> {
    let tracker = Arc::new(CursorTracker::default());
    let executor = executor(&tracker, ExecutorConfig { max_connections_size_per_query: 3, ..Default::default() });
    let units: Vec<ExecutionUnit> =
        (0..16).map(|i| ExecutionUnit::new("ds_0", format!("SLEEP 5 ROWS {}", i), vec![])).collect();

    let cursors = executor.execute_query(units)?;
    assert_eq!(first_values(cursors)?, (0..16).collect::<Vec<i64>>());
    assert_eq!(tracker.connections.load(Ordering::SeqCst), 3);
    assert!(tracker.peak_running.load(Ordering::SeqCst) <= 3);
    assert_eq!(executor.registry().pool("ds_0")?.idle_count(), 3);
    Ok(())
}

#[test]
fn test_exhausted_pool_times_out() -> Result<()> {
    let tracker = Arc::new(CursorTracker::default());
    let pool = PoolConfig { max_size: 1, connection_timeout: Duration::from_millis(50) };
    let registry = registry(&tracker, pool);
    let config = ExecutorConfig { connection_timeout: Duration::from_millis(50), ..Default::default() };
    let executor = ShardingExecutor::new(Arc::clone(&registry), config);

    let held = registry.pool("ds_0")?.acquire()?;
    let err = executor.execute_query(vec![ExecutionUnit::new("ds_0", "ROWS 1", vec![])]).err();
    assert!(matches!(err, Some(ShardingError::ConnectionTimeout { ref data_source, requested: 1, .. }) if data_source == "ds_0"));

    drop(held);
    let cursors = executor.execute_query(vec![ExecutionUnit::new("ds_0", "ROWS 1", vec![])])?;
    assert_eq!(first_values(cursors)?, vec![1]);
    Ok(())
}

#[test]
fn test_permissive_policy_keeps_successful_units() -> Result<()> {
    let tracker = Arc::new(CursorTracker::default());
    let executor = executor(&tracker, ExecutorConfig { failure_policy: FailurePolicy::Permissive, ..Default::default() });

    let units = vec![
        ExecutionUnit::new("ds_0", "ROWS 1", vec![]),
        ExecutionUnit::new("ds_1", "FAIL", vec![]),
        ExecutionUnit::new("ds_0", "ROWS 3", vec![]),
    ];
    assert_eq!(first_values(executor.execute_query(units)?)?, vec![1, 3]);

    let units = vec![
        ExecutionUnit::new("ds_0", "UPDATE 2", vec![]),
        ExecutionUnit::new("ds_1", "FAIL", vec![]),
        ExecutionUnit::new("ds_0", "UPDATE 5", vec![]),
    ];
    let summary = executor.execute_update(units)?;
    assert_eq!(summary.affected_rows, 7);
    assert_eq!(summary.failed_units, 1);
    Ok(())
}

#[test]
fn test_update_counts_are_summed() -> Result<()> {
    let tracker = Arc::new(CursorTracker::default());
    let executor = executor(&tracker, ExecutorConfig { max_connections_size_per_query: 2, ..Default::default() });
    let units: Vec<ExecutionUnit> =
        (0..6).map(|i| ExecutionUnit::new(format!("ds_{}", i % 2), format!("UPDATE {}", i + 1), vec![])).collect();
    let summary = executor.execute_update(units)?;
    assert_eq!(summary.affected_rows, 21);
    assert_eq!(summary.generated_key, None);
    assert_eq!(summary.failed_units, 0);

    let failed = executor.execute_update(vec![
        ExecutionUnit::new("ds_0", "UPDATE 1", vec![]),
        ExecutionUnit::new("ds_1", "FAIL", vec![]),
    ]);
    assert!(matches!(failed, Err(ShardingError::Execution(ref e)) if e.unit_index == 1));
    Ok(())
}
