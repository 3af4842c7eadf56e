// Shared types used by every layer: values, data nodes and errors.

pub mod error;
pub mod types;
pub mod value;

pub use error::{ConfigError, CursorError, ExecutionError, RouteError, ShardingError, ShardingResult};
pub use types::{DataNode, DataSourceName, DatabaseType, UnitIndex};
pub use value::DataValue;
