// Sharding Executor
//
// Executes the units of one logical statement across data sources:
//
// 1. Units are grouped per data source (see `group_units`)
// 2. All connections a data source needs are acquired on the calling thread
// 3. Groups run in parallel; units inside a group run in order
// 4. Results are joined back in submission order
//
// Under `FailurePolicy::FailFast` the first failure raises a shared cancel
// flag, units that have not started yet are skipped, every cursor produced so
// far is closed and that first failure is returned.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::common::{DataValue, ExecutionError, ShardingError, ShardingResult, UnitIndex};
use crate::execute::engine::ExecutorEngine;
use crate::execute::pool::{DataSourceRegistry, PooledConnection, UpdateResult};
use crate::execute::unit::{ConnectionMode, ExecutionGroup, ExecutionUnit, group_units};
use crate::merge::{MemoryQueryResult, QueryResult};

/// Behaviour when some units fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the statement on the first failure
    #[default]
    FailFast,
    /// Keep the successful units and log the failures; diagnostic use only
    Permissive,
}

/// Executor configuration
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Connections one statement may hold per data source
    pub max_connections_size_per_query: usize,
    /// Worker threads, 0 for one per group
    pub worker_pool_size: usize,
    /// Wait for pooled connections
    pub connection_timeout: Duration,
    /// Log every actual SQL at info level
    pub sql_show: bool,
    pub failure_policy: FailurePolicy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_connections_size_per_query: 1,
            worker_pool_size: 0,
            connection_timeout: Duration::from_secs(30),
            sql_show: false,
            failure_policy: FailurePolicy::FailFast,
        }
    }
}

/// Aggregated outcome of a DML statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateSummary {
    pub affected_rows: u64,
    /// First generated key in submission order
    pub generated_key: Option<DataValue>,
    /// Units that failed under the permissive policy
    pub failed_units: usize,
}

/// Streaming cursor that keeps its connection checked out until closed
struct StreamQueryResult {
    inner: Box<dyn QueryResult>,
    connection: Option<PooledConnection>,
}

impl QueryResult for StreamQueryResult {
    fn next(&mut self) -> ShardingResult<bool> {
        self.inner.next()
    }

    fn get(&self, index: usize) -> ShardingResult<DataValue> {
        self.inner.get(index)
    }

    fn column_count(&self) -> usize {
        self.inner.column_count()
    }

    fn column_label(&self, index: usize) -> ShardingResult<String> {
        self.inner.column_label(index)
    }

    fn close(&mut self) -> ShardingResult<()> {
        let closed = self.inner.close();
        self.connection = None;
        closed
    }
}

struct GroupTask {
    group: ExecutionGroup,
    connection: PooledConnection,
}

/// Shared between the workers of one statement
struct ExecutionState {
    cancelled: AtomicBool,
    first_failure: Mutex<Option<ShardingError>>,
    fail_fast: bool,
}

impl ExecutionState {
    fn new(policy: FailurePolicy) -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            first_failure: Mutex::new(None),
            fail_fast: policy == FailurePolicy::FailFast,
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn record_failure(&self, e: &ShardingError) {
        if !self.fail_fast {
            return;
        }
        self.first_failure.lock().get_or_insert_with(|| e.clone());
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

type UnitOutcome<T> = (UnitIndex, ShardingResult<T>);

pub struct ShardingExecutor {
    registry: Arc<DataSourceRegistry>,
    config: ExecutorConfig,
    engine: ExecutorEngine,
}

impl ShardingExecutor {
    pub fn new(registry: Arc<DataSourceRegistry>, config: ExecutorConfig) -> Self {
        let engine = ExecutorEngine::new(config.worker_pool_size);
        Self { registry, config, engine }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<DataSourceRegistry> {
        &self.registry
    }

    /// Run queries; cursors are returned in submission order.
    pub fn execute_query(&self, units: Vec<ExecutionUnit>) -> ShardingResult<Vec<Box<dyn QueryResult>>> {
        let outcomes = self.execute(units, |connection, unit, streaming| {
            let mut cursor = connection.execute_query(&unit.sql_unit.sql, &unit.sql_unit.parameters)?;
            if streaming {
                return Ok(cursor);
            }
            // The connection is reused by the next unit of the group
            Ok(Box::new(MemoryQueryResult::drain(cursor.as_mut())?) as Box<dyn QueryResult>)
        })?;

        let mut cursors = Vec::with_capacity(outcomes.len());
        for (index, outcome) in outcomes {
            match outcome {
                Ok(cursor) => cursors.push(cursor),
                Err(e) => warn!("Skipping failed query unit #{}: {}", index, e),
            }
        }
        Ok(cursors)
    }

    /// Run DML; affected rows are summed across units.
    pub fn execute_update(&self, units: Vec<ExecutionUnit>) -> ShardingResult<UpdateSummary> {
        let outcomes = self.execute(units, |connection, unit, _| {
            connection.execute_update(&unit.sql_unit.sql, &unit.sql_unit.parameters)
        })?;

        let mut summary = UpdateSummary::default();
        for (index, outcome) in outcomes {
            match outcome {
                Ok(result) => {
                    summary.affected_rows += result.affected_rows;
                    if summary.generated_key.is_none() {
                        summary.generated_key = result.generated_key;
                    }
                }
                Err(e) => {
                    warn!("Skipping failed update unit #{}: {}", index, e);
                    summary.failed_units += 1;
                }
            }
        }
        Ok(summary)
    }

    /// Acquire, dispatch and join. Under fail-fast either every unit
    /// succeeded or the first failure is returned with all outputs released.
    ///
    /// `run` is told whether its output may keep streaming from the
    /// connection, which is the case for the last unit of a memory strict
    /// group.
    fn execute<T, F>(&self, units: Vec<ExecutionUnit>, run: F) -> ShardingResult<Vec<UnitOutcome<T>>>
    where
        T: UnitOutput,
        F: Fn(&mut PooledConnection, &ExecutionUnit, bool) -> ShardingResult<T> + Sync,
    {
        if units.is_empty() {
            return Ok(Vec::new());
        }
        let groups = group_units(units, self.config.max_connections_size_per_query);
        debug!("Formed {} execution group(s)", groups.len());
        for group in &groups {
            debug!(
                "Group on '{}' ({:?}): units {:?}",
                group.data_source_name,
                group.connection_mode,
                group.units.iter().map(|(i, _)| *i).collect::<Vec<_>>()
            );
            if self.config.sql_show {
                for (_, unit) in &group.units {
                    info!("Actual SQL: {}", unit);
                }
            }
        }

        let tasks = self.acquire_connections(groups)?;
        let state = ExecutionState::new(self.config.failure_policy);
        let results = self.engine.run(tasks, |task| run_group(task, &state, &run))?;

        let mut outcomes: Vec<UnitOutcome<T>> = results.into_iter().flatten().collect();
        outcomes.sort_by_key(|(index, _)| *index);

        if let Some(failure) = state.first_failure.lock().take() {
            error!("Statement aborted after {} unit(s): {}", outcomes.len(), failure);
            for (_, outcome) in outcomes {
                if let Ok(output) = outcome {
                    output.release();
                }
            }
            return Err(failure);
        }
        Ok(outcomes)
    }

    /// One connection per group, acquired per data source in one call.
    fn acquire_connections(&self, groups: Vec<ExecutionGroup>) -> ShardingResult<Vec<GroupTask>> {
        let mut per_data_source: Vec<(String, Vec<ExecutionGroup>)> = Vec::new();
        for group in groups {
            match per_data_source.iter_mut().find(|(ds, _)| *ds == group.data_source_name) {
                Some((_, groups)) => groups.push(group),
                None => per_data_source.push((group.data_source_name.clone(), vec![group])),
            }
        }

        let mut tasks = Vec::new();
        for (data_source, groups) in per_data_source {
            let pool = self.registry.pool(&data_source)?;
            let connections = pool.acquire_many(groups.len(), self.config.connection_timeout)?;
            tasks.extend(groups.into_iter().zip(connections).map(|(group, connection)| GroupTask { group, connection }));
        }
        Ok(tasks)
    }
}

/// Per-unit output of the executor
pub trait UnitOutput: Send + Sized {
    /// Keep `connection` checked out for as long as the output lives
    fn hold_connection(self, connection: PooledConnection) -> Self;

    /// Free the output of an aborted statement
    fn release(self);
}

impl UnitOutput for Box<dyn QueryResult> {
    fn hold_connection(self, connection: PooledConnection) -> Self {
        Box::new(StreamQueryResult { inner: self, connection: Some(connection) })
    }

    fn release(mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close cursor of aborted statement: {}", e);
        }
    }
}

impl UnitOutput for UpdateResult {
    fn hold_connection(self, _connection: PooledConnection) -> Self {
        self
    }

    fn release(self) {}
}

fn run_group<T, F>(task: GroupTask, state: &ExecutionState, run: &F) -> Vec<UnitOutcome<T>>
where
    T: UnitOutput,
    F: Fn(&mut PooledConnection, &ExecutionUnit, bool) -> ShardingResult<T>,
{
    let GroupTask { group, connection } = task;
    let count = group.units.len();
    let mut connection = Some(connection);
    let mut outcomes = Vec::with_capacity(count);
    for (position, (index, unit)) in group.units.into_iter().enumerate() {
        if state.is_cancelled() {
            outcomes.push((index, Err(ShardingError::Cancelled)));
            continue;
        }
        let Some(held) = connection.as_mut() else {
            outcomes.push((index, Err(ShardingError::Cancelled)));
            continue;
        };
        let streaming = group.connection_mode == ConnectionMode::MemoryStrict && position + 1 == count;
        let outcome = match run(held, &unit, streaming) {
            Ok(output) => match connection.take() {
                Some(held) if streaming => Ok(output.hold_connection(held)),
                held => {
                    connection = held;
                    Ok(output)
                }
            },
            Err(e) => {
                let e = wrap_failure(e, &unit, index);
                state.record_failure(&e);
                Err(e)
            }
        };
        outcomes.push((index, outcome));
    }
    outcomes
}

fn wrap_failure(e: ShardingError, unit: &ExecutionUnit, index: UnitIndex) -> ShardingError {
    match e {
        ShardingError::Execution(_) | ShardingError::Cancelled => e,
        other => ExecutionError {
            data_source: unit.data_source_name.clone(),
            unit_index: index,
            sql: unit.sql_unit.sql.clone(),
            reason: other.to_string(),
        }
        .into(),
    }
}
