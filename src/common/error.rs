use thiserror::Error;

/// Errors raised while building a rule snapshot or evaluating its algorithms.
/// All of them are fatal and surface before anything is executed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Unknown sharding algorithm type: {0}")]
    UnknownAlgorithmType(String),
    #[error("Sharding algorithm '{0}' is not defined")]
    AlgorithmNotFound(String),
    #[error("Sharding algorithm '{name}' has kind {actual}, strategy requires {expected}")]
    AlgorithmKindMismatch { name: String, expected: &'static str, actual: &'static str },
    #[error("Invalid property '{property}' for algorithm {algorithm}: {reason}")]
    InvalidAlgorithmProperty { algorithm: String, property: String, reason: String },
    #[error("Unsupported sharding column count {count} for {strategy} strategy of table '{table}'")]
    UnsupportedShardingColumns { table: String, strategy: &'static str, count: usize },
    #[error("Range query on '{table}.{column}' is not supported by its sharding algorithm")]
    RangeQueryNotSupported { table: String, column: String },
    #[error("Illegal range query: {0}")]
    IllegalRange(String),
    #[error("Algorithm {algorithm} produced '{target}' which is not one of the available targets")]
    TargetNotAvailable { algorithm: String, target: String },
    #[error("Sharding value {value} cannot be used by algorithm {algorithm}")]
    InvalidShardingValue { algorithm: String, value: String },
    #[error("Table '{0}' belongs to more than one binding group")]
    DuplicateBindingTable(String),
    #[error("Invalid binding group '{group}': {reason}")]
    InvalidBindingGroup { group: String, reason: String },
    #[error("Unknown data source '{0}'")]
    UnknownDataSource(String),
    #[error("Table '{0}' is configured more than once")]
    DuplicateTable(String),
    #[error("Inline expression error in '{expression}': {reason}")]
    InlineExpression { expression: String, reason: String },
    #[error("Failed to read configuration: {0}")]
    Load(String),
}

/// Errors raised while resolving a statement to route units.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RouteError {
    #[error("No route target resolved for {statement} statement on tables {tables:?}")]
    NoTarget { statement: String, tables: Vec<String> },
    #[error("Table '{0}' is not configured and no default data source is set")]
    TableNotConfigured(String),
    #[error("Statement references no tables")]
    NoTables,
    #[error("Tables {0:?} cannot be routed to a common data source")]
    NoCommonDataSource(Vec<String>),
}

/// Failure of one physical statement.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Execution failed on data source '{data_source}' (unit #{unit_index}, sql: {sql}): {reason}")]
pub struct ExecutionError {
    pub data_source: String,
    pub unit_index: usize,
    pub sql: String,
    pub reason: String,
}

/// Caller defects against the cursor contract.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CursorError {
    #[error("get() called before next()")]
    BeforeFirstRow,
    #[error("get() called after the cursor was exhausted")]
    AfterLastRow,
    #[error("Cursor is closed")]
    Closed,
    #[error("Column index {index} out of range (1..={count})")]
    ColumnIndexOutOfRange { index: usize, count: usize },
}

/// Crate-level error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShardingError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Routing error: {0}")]
    Route(#[from] RouteError),
    #[error("{0}")]
    Execution(#[from] ExecutionError),
    #[error("Cursor usage error: {0}")]
    Cursor(#[from] CursorError),
    /// Raised by connection implementations
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Timed out after {timeout_ms}ms waiting for {requested} connection(s) to '{data_source}'")]
    ConnectionTimeout { data_source: String, requested: usize, timeout_ms: u128 },
    #[error("Execution was cancelled")]
    Cancelled,
    #[error("Type error: {0}")]
    TypeMismatch(String),
    #[error("Numeric overflow")]
    NumericOverflow,
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl ShardingError {
    /// Configuration and routing failures happen before any physical statement runs.
    pub fn is_pre_execution(&self) -> bool {
        matches!(self, ShardingError::Config(_) | ShardingError::Route(_))
    }
}

/// Result type for sharding operations
pub type ShardingResult<T> = Result<T, ShardingError>;
