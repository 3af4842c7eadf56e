// Execution Module
//
// Turns a list of execution units into raw shard cursors or update counts,
// running groups of units in parallel on pooled connections.

pub mod engine;
pub mod executor;
pub mod pool;
pub mod unit;

pub use engine::ExecutorEngine;
pub use executor::{ExecutorConfig, FailurePolicy, ShardingExecutor, UnitOutput, UpdateSummary};
pub use pool::{Connection, ConnectionFactory, ConnectionPool, DataSourceRegistry, PoolConfig, PooledConnection, UpdateResult};
pub use unit::{ConnectionMode, ExecutionGroup, ExecutionUnit, SqlUnit, group_units};
