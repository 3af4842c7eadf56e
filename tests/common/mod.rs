#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use rusqlite::types::{Value, ValueRef};

use shardkit::execute::{Connection, ConnectionFactory, ExecutionUnit, UpdateResult};
use shardkit::merge::{MemoryQueryResult, Row};
use shardkit::route::RouteContext;
use shardkit::rule::{
    AlgorithmProperties, AlgorithmRegistry, RangeQueryPolicy, ShardingRule, ShardingRuleConfiguration,
    StrategyConfiguration, TableRuleConfiguration,
};
use shardkit::{DataValue, QueryResult, ShardingError, ShardingResult, SqlRewriter, StatementContext};

// ds_0 holds t_order_0 and t_order_2, ds_1 holds t_order_1 and t_order_3;
// databases by order_id % 2, tables by order_id % 4
pub fn order_rule_config(policy: RangeQueryPolicy) -> ShardingRuleConfiguration {
    ShardingRuleConfiguration::new(&["ds_0", "ds_1"], policy)
        .with_algorithm("db_mod", "MOD", AlgorithmProperties::new().with("sharding-count", 2))
        .with_algorithm("table_mod", "MOD", AlgorithmProperties::new().with("sharding-count", 4))
        .with_table(
            TableRuleConfiguration::new("t_order", "ds_0.t_order_${[0, 2]}, ds_1.t_order_${[1, 3]}")
                .with_database_strategy(StrategyConfiguration::standard("order_id", "db_mod"))
                .with_table_strategy(StrategyConfiguration::standard("order_id", "table_mod")),
        )
        .with_table(
            TableRuleConfiguration::new("t_order_item", "ds_0.t_order_item_${[0, 2]}, ds_1.t_order_item_${[1, 3]}")
                .with_database_strategy(StrategyConfiguration::standard("order_id", "db_mod"))
                .with_table_strategy(StrategyConfiguration::standard("order_id", "table_mod")),
        )
        .with_binding_group("t_order, t_order_item")
        .with_broadcast_table("t_config")
}

pub fn order_rule(policy: RangeQueryPolicy) -> Result<Arc<ShardingRule>> {
    Ok(ShardingRule::build(&order_rule_config(policy), &AlgorithmRegistry::default())?)
}

/// Open and close counts of mock cursors
#[derive(Debug, Default)]
pub struct CursorTracker {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub connections: AtomicUsize,
    pub running: AtomicUsize,
    pub peak_running: AtomicUsize,
}

impl CursorTracker {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct MockCursor {
    rows: MemoryQueryResult,
    tracker: Arc<CursorTracker>,
    closed: bool,
}

impl MockCursor {
    pub fn new(labels: Vec<String>, rows: Vec<Row>, tracker: Arc<CursorTracker>) -> Self {
        Self { rows: MemoryQueryResult::new(labels, rows), tracker, closed: false }
    }
}

impl QueryResult for MockCursor {
    fn next(&mut self) -> ShardingResult<bool> {
        self.rows.next()
    }

    fn get(&self, index: usize) -> ShardingResult<DataValue> {
        self.rows.get(index)
    }

    fn column_count(&self) -> usize {
        self.rows.column_count()
    }

    fn column_label(&self, index: usize) -> ShardingResult<String> {
        self.rows.column_label(index)
    }

    fn close(&mut self) -> ShardingResult<()> {
        if !self.closed {
            self.closed = true;
            self.tracker.closed.fetch_add(1, Ordering::SeqCst);
        }
        self.rows.close()
    }
}

/// Connection driven by a tiny script in the SQL text:
/// `[SLEEP <ms>] ROWS <a>,<b>,...`, `[SLEEP <ms>] FAIL` or `UPDATE <n>`.
pub struct ScriptConnection {
    tracker: Arc<CursorTracker>,
}

struct Script {
    sleep: u64,
    body: String,
}

fn parse_script(sql: &str) -> Script {
    let sql = sql.trim();
    match sql.strip_prefix("SLEEP ") {
        Some(rest) => {
            let (ms, body) = rest.split_once(' ').unwrap_or((rest, ""));
            Script { sleep: ms.parse().unwrap_or(0), body: body.trim().to_string() }
        }
        None => Script { sleep: 0, body: sql.to_string() },
    }
}

impl ScriptConnection {
    fn run<T>(&self, sql: &str, body: impl FnOnce(&str) -> ShardingResult<T>) -> ShardingResult<T> {
        let script = parse_script(sql);
        let running = self.tracker.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.tracker.peak_running.fetch_max(running, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(script.sleep));
        let result = if script.body == "FAIL" {
            Err(ShardingError::Backend(format!("scripted failure: {}", sql)))
        } else {
            body(&script.body)
        };
        self.tracker.running.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl Connection for ScriptConnection {
    fn execute_query(&mut self, sql: &str, _parameters: &[DataValue]) -> ShardingResult<Box<dyn QueryResult>> {
        let tracker = Arc::clone(&self.tracker);
        self.run(sql, move |body| {
            let values = body.strip_prefix("ROWS").unwrap_or("").trim();
            let rows: Vec<Row> = values
                .split(',')
                .filter(|v| !v.trim().is_empty())
                .map(|v| vec![DataValue::Integer(v.trim().parse().unwrap_or(0))])
                .collect();
            tracker.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MockCursor::new(vec!["n".to_string()], rows, tracker)) as Box<dyn QueryResult>)
        })
    }

    fn execute_update(&mut self, sql: &str, _parameters: &[DataValue]) -> ShardingResult<UpdateResult> {
        self.run(sql, |body| {
            let affected_rows = body.strip_prefix("UPDATE").unwrap_or("0").trim().parse().unwrap_or(0);
            Ok(UpdateResult { affected_rows, generated_key: None })
        })
    }
}

#[derive(Default)]
pub struct ScriptFactory {
    pub tracker: Arc<CursorTracker>,
}

impl ConnectionFactory for ScriptFactory {
    fn connect(&self) -> ShardingResult<Box<dyn Connection>> {
        self.tracker.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptConnection { tracker: Arc::clone(&self.tracker) }))
    }
}

// SQLite backed data sources

pub struct SqliteConnection {
    connection: rusqlite::Connection,
}

fn to_sql_value(value: &DataValue) -> Value {
    match value {
        DataValue::Null => Value::Null,
        DataValue::Integer(i) => Value::Integer(*i),
        DataValue::Float(f) => Value::Real(*f),
        DataValue::Boolean(b) => Value::Integer(*b as i64),
        DataValue::Blob(b) => Value::Blob(b.clone()),
        DataValue::Text(s) | DataValue::Date(s) | DataValue::Timestamp(s) => Value::Text(s.clone()),
    }
}

fn from_sql_value(value: ValueRef<'_>) -> DataValue {
    match value {
        ValueRef::Null => DataValue::Null,
        ValueRef::Integer(i) => DataValue::Integer(i),
        ValueRef::Real(f) => DataValue::Float(f),
        ValueRef::Text(t) => DataValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => DataValue::Blob(b.to_vec()),
    }
}

fn backend(e: rusqlite::Error) -> ShardingError {
    ShardingError::Backend(e.to_string())
}

impl SqliteConnection {
    pub fn open(path: &Path) -> ShardingResult<Self> {
        Ok(Self { connection: rusqlite::Connection::open(path).map_err(backend)? })
    }

    pub fn execute_batch(&self, sql: &str) -> ShardingResult<()> {
        self.connection.execute_batch(sql).map_err(backend)
    }

    pub fn query_rows(&self, sql: &str, parameters: &[DataValue]) -> ShardingResult<(Vec<String>, Vec<Row>)> {
        let mut statement = self.connection.prepare(sql).map_err(backend)?;
        let labels: Vec<String> = statement.column_names().iter().map(|c| c.to_string()).collect();
        let width = labels.len();
        let mut rows = statement
            .query(rusqlite::params_from_iter(parameters.iter().map(to_sql_value)))
            .map_err(backend)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(backend)? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(from_sql_value(row.get_ref(i).map_err(backend)?));
            }
            out.push(values);
        }
        Ok((labels, out))
    }
}

impl Connection for SqliteConnection {
    fn execute_query(&mut self, sql: &str, parameters: &[DataValue]) -> ShardingResult<Box<dyn QueryResult>> {
        let (labels, rows) = self.query_rows(sql, parameters)?;
        Ok(Box::new(MemoryQueryResult::new(labels, rows)))
    }

    fn execute_update(&mut self, sql: &str, parameters: &[DataValue]) -> ShardingResult<UpdateResult> {
        let affected = self
            .connection
            .execute(sql, rusqlite::params_from_iter(parameters.iter().map(to_sql_value)))
            .map_err(backend)?;
        let generated_key = if sql.trim_start().to_ascii_uppercase().starts_with("INSERT") {
            Some(DataValue::Integer(self.connection.last_insert_rowid()))
        } else {
            None
        };
        Ok(UpdateResult { affected_rows: affected as u64, generated_key })
    }
}

pub struct SqliteFactory {
    pub path: PathBuf,
}

impl ConnectionFactory for SqliteFactory {
    fn connect(&self) -> ShardingResult<Box<dyn Connection>> {
        Ok(Box::new(SqliteConnection::open(&self.path)?))
    }
}

/// Replace logical table names with the actual names of each route unit.
///
/// The SQL text to rewrite is set per statement with `set_sql`; parameters
/// come from the statement context.
#[derive(Default)]
pub struct TableNameRewriter {
    sql: Mutex<String>,
}

impl TableNameRewriter {
    pub fn set_sql(&self, sql: &str) {
        *self.sql.lock() = sql.to_string();
    }
}

pub fn replace_tables(sql: &str, mapping: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut word = String::new();
    let flush = |word: &mut String, out: &mut String| {
        match mapping.get(&word.to_ascii_lowercase()) {
            Some(actual) => out.push_str(actual),
            None => out.push_str(word),
        }
        word.clear();
    };
    for c in sql.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            word.push(c);
        } else {
            flush(&mut word, &mut out);
            out.push(c);
        }
    }
    flush(&mut word, &mut out);
    out
}

impl SqlRewriter for TableNameRewriter {
    fn rewrite(&self, ctx: &StatementContext, route: &RouteContext) -> ShardingResult<Vec<ExecutionUnit>> {
        let sql = self.sql.lock().clone();
        Ok(route
            .route_units()
            .map(|unit| {
                let mapping: HashMap<String, String> = unit
                    .table_mappers
                    .iter()
                    .map(|m| (m.logic_name.to_ascii_lowercase(), m.actual_name.clone()))
                    .collect();
                ExecutionUnit::new(&unit.data_source_name, replace_tables(&sql, &mapping), ctx.parameters.clone())
            })
            .collect())
    }
}
