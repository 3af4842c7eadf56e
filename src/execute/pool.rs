// Connection Pool
//
// Physical connections are opened by a `ConnectionFactory` and kept in a
// bounded pool per data source. A statement acquires all connections it needs
// on a data source in one call, so two statements never hold part of a pool
// each while waiting for the rest.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use linked_hash_map::LinkedHashMap;
use log::debug;
use parking_lot::{Condvar, Mutex};

use crate::common::{ConfigError, DataValue, ShardingError, ShardingResult};
use crate::merge::QueryResult;

/// Outcome of one DML statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateResult {
    pub affected_rows: u64,
    pub generated_key: Option<DataValue>,
}

/// A physical connection to one data source
pub trait Connection: Send {
    fn execute_query(&mut self, sql: &str, parameters: &[DataValue]) -> ShardingResult<Box<dyn QueryResult>>;

    fn execute_update(&mut self, sql: &str, parameters: &[DataValue]) -> ShardingResult<UpdateResult>;
}

/// Opens physical connections for one data source
pub trait ConnectionFactory: Send + Sync {
    fn connect(&self) -> ShardingResult<Box<dyn Connection>>;
}

/// Pool sizing for one data source
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of open connections
    pub max_size: usize,
    /// Default wait for `acquire`
    pub connection_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { max_size: 8, connection_timeout: Duration::from_secs(30) }
    }
}

struct PoolState {
    idle: Vec<Box<dyn Connection>>,
    /// Open connections, idle or checked out, plus reservations being opened
    open: usize,
}

pub struct ConnectionPool {
    data_source: String,
    factory: Arc<dyn ConnectionFactory>,
    config: PoolConfig,
    state: Mutex<PoolState>,
    released: Condvar,
}

impl ConnectionPool {
    pub fn new(data_source: &str, factory: Arc<dyn ConnectionFactory>, config: PoolConfig) -> Arc<Self> {
        Arc::new(Self {
            data_source: data_source.to_string(),
            factory,
            config,
            state: Mutex::new(PoolState { idle: Vec::new(), open: 0 }),
            released: Condvar::new(),
        })
    }

    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    pub fn max_size(&self) -> usize {
        self.config.max_size
    }

    /// Connections currently checked out
    pub fn active_count(&self) -> usize {
        let state = self.state.lock();
        state.open - state.idle.len()
    }

    pub fn idle_count(&self) -> usize {
        self.state.lock().idle.len()
    }

    pub fn acquire(self: &Arc<Self>) -> ShardingResult<PooledConnection> {
        let mut connections = self.acquire_many(1, self.config.connection_timeout)?;
        connections.pop().ok_or_else(|| ShardingError::Backend("pool returned no connection".to_string()))
    }

    /// Check out `count` connections at once, waiting up to `timeout`.
    pub fn acquire_many(self: &Arc<Self>, count: usize, timeout: Duration) -> ShardingResult<Vec<PooledConnection>> {
        if count > self.config.max_size {
            return Err(ShardingError::InvalidParameter(format!(
                "{} connection(s) requested from '{}' whose pool holds at most {}",
                count, self.data_source, self.config.max_size
            )));
        }
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.idle.len() + (self.config.max_size - state.open) < count {
            if self.released.wait_until(&mut state, deadline).timed_out()
                && state.idle.len() + (self.config.max_size - state.open) < count
            {
                return Err(ShardingError::ConnectionTimeout {
                    data_source: self.data_source.clone(),
                    requested: count,
                    timeout_ms: timeout.as_millis(),
                });
            }
        }

        let reused = count.min(state.idle.len());
        let keep = state.idle.len() - reused;
        let mut connections: Vec<PooledConnection> =
            state.idle.drain(keep..).map(|c| PooledConnection::new(c, Arc::clone(self))).collect();
        let to_open = count - reused;
        state.open += to_open;
        drop(state);

        for opened in 0..to_open {
            match self.factory.connect() {
                Ok(connection) => connections.push(PooledConnection::new(connection, Arc::clone(self))),
                Err(e) => {
                    self.forget(to_open - opened);
                    return Err(e);
                }
            }
        }
        if to_open > 0 {
            debug!("Opened {} connection(s) to '{}'", to_open, self.data_source);
        }
        Ok(connections)
    }

    fn release(&self, connection: Box<dyn Connection>) {
        self.state.lock().idle.push(connection);
        self.released.notify_all();
    }

    /// Drop reservations or connections that will never come back
    fn forget(&self, count: usize) {
        let mut state = self.state.lock();
        state.open = state.open.saturating_sub(count);
        drop(state);
        self.released.notify_all();
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("data_source", &self.data_source)
            .field("config", &self.config)
            .finish()
    }
}

/// Checked-out connection; returns to its pool on drop.
pub struct PooledConnection {
    connection: Option<Box<dyn Connection>>,
    pool: Arc<ConnectionPool>,
}

impl PooledConnection {
    fn new(connection: Box<dyn Connection>, pool: Arc<ConnectionPool>) -> Self {
        Self { connection: Some(connection), pool }
    }

    pub fn data_source(&self) -> &str {
        self.pool.data_source()
    }

    fn connection(&mut self) -> ShardingResult<&mut Box<dyn Connection>> {
        self.connection.as_mut().ok_or_else(|| ShardingError::Backend("connection already released".to_string()))
    }

    pub fn execute_query(&mut self, sql: &str, parameters: &[DataValue]) -> ShardingResult<Box<dyn QueryResult>> {
        self.connection()?.execute_query(sql, parameters)
    }

    pub fn execute_update(&mut self, sql: &str, parameters: &[DataValue]) -> ShardingResult<UpdateResult> {
        self.connection()?.execute_update(sql, parameters)
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("data_source", &self.data_source())
            .field("released", &self.connection.is_none())
            .finish()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.pool.release(connection);
        }
    }
}

/// Pools keyed by data source name
#[derive(Debug, Default)]
pub struct DataSourceRegistry {
    pools: LinkedHashMap<String, Arc<ConnectionPool>>,
}

impl DataSourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, factory: Arc<dyn ConnectionFactory>, config: PoolConfig) {
        self.pools.insert(name.to_string(), ConnectionPool::new(name, factory, config));
    }

    pub fn with_data_source(mut self, name: &str, factory: Arc<dyn ConnectionFactory>, config: PoolConfig) -> Self {
        self.register(name, factory, config);
        self
    }

    pub fn pool(&self, name: &str) -> ShardingResult<&Arc<ConnectionPool>> {
        self.pools.get(name).ok_or_else(|| ConfigError::UnknownDataSource(name.to_string()).into())
    }

    pub fn names(&self) -> Vec<String> {
        self.pools.keys().cloned().collect()
    }
}
