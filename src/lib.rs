// Shardkit
//
// Routing, parallel execution and result merging for SQL statements over
// horizontally sharded tables.

pub mod common;
pub mod execute;
pub mod merge;
pub mod route;
pub mod rule;
pub mod session;
pub mod statement;

// Re-export key items for convenient access
pub use common::{DataNode, DataValue, DatabaseType, ShardingError, ShardingResult};
pub use execute::{DataSourceRegistry, ExecutionUnit, ExecutorConfig, FailurePolicy, ShardingExecutor};
pub use merge::{MergeEngine, MergedCursor, QueryResult};
pub use route::{RouteContext, RouteUnit, RoutingEngine};
pub use rule::{AlgorithmRegistry, ShardingRule, ShardingRuleConfiguration};
pub use session::{ShardingSession, SqlRewriter};
pub use statement::StatementContext;
