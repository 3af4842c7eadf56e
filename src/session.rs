// Sharding Session
//
// Entry point tying the layers together for one logical statement:
// route -> rewrite -> execute -> merge.

use std::sync::Arc;

use log::debug;

use crate::common::{DatabaseType, RouteError, ShardingResult};
use crate::execute::{ExecutionUnit, ShardingExecutor, UpdateSummary};
use crate::merge::{MergeEngine, MergedCursor};
use crate::route::{RouteContext, RoutingEngine};
use crate::rule::ShardingRule;
use crate::statement::StatementContext;

/// Produces the physical statements for a routed logical statement.
///
/// Implementations substitute actual table names per route unit and push
/// pagination and derived aggregate columns down to the shards.
pub trait SqlRewriter: Send + Sync {
    fn rewrite(&self, ctx: &StatementContext, route: &RouteContext) -> ShardingResult<Vec<ExecutionUnit>>;
}

pub struct ShardingSession {
    rule: Arc<ShardingRule>,
    rewriter: Arc<dyn SqlRewriter>,
    executor: ShardingExecutor,
    database_type: DatabaseType,
}

impl ShardingSession {
    pub fn new(
        rule: Arc<ShardingRule>,
        rewriter: Arc<dyn SqlRewriter>,
        executor: ShardingExecutor,
        database_type: DatabaseType,
    ) -> Self {
        Self { rule, rewriter, executor, database_type }
    }

    pub fn rule(&self) -> &Arc<ShardingRule> {
        &self.rule
    }

    /// Swap in a new rule snapshot; statements in flight keep the old one.
    pub fn set_rule(&mut self, rule: Arc<ShardingRule>) {
        self.rule = rule;
    }

    pub fn route(&self, ctx: &StatementContext) -> ShardingResult<RouteContext> {
        RoutingEngine::route(ctx, &self.rule)
    }

    pub fn execute_query(&self, ctx: &StatementContext) -> ShardingResult<MergedCursor> {
        let rule = Arc::clone(&self.rule);
        let route = RoutingEngine::route(ctx, &rule)?;
        let units = self.rewriter.rewrite(ctx, &route)?;
        debug!("Executing {} query unit(s)", units.len());
        let results = self.executor.execute_query(units)?;
        MergeEngine::merge(results, ctx, self.database_type)
    }

    pub fn execute_update(&self, ctx: &StatementContext) -> ShardingResult<UpdateSummary> {
        let rule = Arc::clone(&self.rule);
        let route = RoutingEngine::route(ctx, &rule)?;
        let units = self.rewriter.rewrite(ctx, &route)?;
        if units.is_empty() && ctx.kind.is_dml() {
            return Err(RouteError::NoTarget { statement: ctx.kind.name().to_string(), tables: ctx.tables.clone() }
                .into());
        }
        debug!("Executing {} update unit(s)", units.len());
        self.executor.execute_update(units)
    }
}
