// Statement Descriptor Module
//
// The bound shape of one logical statement as handed over by the SQL binder:
// referenced tables, extracted sharding predicates, ORDER BY / GROUP BY items,
// aggregate projections and pagination.

pub mod pagination;

use crate::common::DataValue;
use crate::route::condition::{HintValues, ShardingConditions};

pub use pagination::{Limit, PaginationBound, PaginationContext, PaginationValue};

/// Kind of statement being routed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    /// DDL, DAL and anything else that is not a query or DML
    Other,
}

impl StatementKind {
    pub fn is_dml(&self) -> bool {
        matches!(self, StatementKind::Insert | StatementKind::Update | StatementKind::Delete)
    }

    pub fn name(&self) -> &'static str {
        match self {
            StatementKind::Select => "SELECT",
            StatementKind::Insert => "INSERT",
            StatementKind::Update => "UPDATE",
            StatementKind::Delete => "DELETE",
            StatementKind::Other => "OTHER",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

/// Where NULLs go relative to non-NULL values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

/// What an ORDER BY / GROUP BY item points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderByTarget {
    /// 1-based projection index (`ORDER BY 2`)
    Index(usize),
    /// Column label, resolved case-insensitively against the cursor labels
    Column(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderByItem {
    pub owner: Option<String>,
    pub target: OrderByTarget,
    pub direction: OrderDirection,
    pub nulls: NullsOrder,
}

impl OrderByItem {
    /// Ascending by column; NULLs sort as the smallest value.
    pub fn asc(column: &str) -> Self {
        Self {
            owner: None,
            target: OrderByTarget::Column(column.to_string()),
            direction: OrderDirection::Asc,
            nulls: NullsOrder::First,
        }
    }

    /// Descending by column; NULLs sort as the smallest value.
    pub fn desc(column: &str) -> Self {
        Self {
            owner: None,
            target: OrderByTarget::Column(column.to_string()),
            direction: OrderDirection::Desc,
            nulls: NullsOrder::Last,
        }
    }

    pub fn index(index: usize, direction: OrderDirection) -> Self {
        Self {
            owner: None,
            target: OrderByTarget::Index(index),
            direction,
            nulls: match direction {
                OrderDirection::Asc => NullsOrder::First,
                OrderDirection::Desc => NullsOrder::Last,
            },
        }
    }

    pub fn with_owner(mut self, owner: &str) -> Self {
        self.owner = Some(owner.to_string());
        self
    }

    pub fn with_nulls(mut self, nulls: NullsOrder) -> Self {
        self.nulls = nulls;
        self
    }

    /// Two items address the same key when target and direction agree.
    /// Owners are ignored because cursors carry no owner information.
    pub fn same_key(&self, other: &OrderByItem) -> bool {
        let target_eq = match (&self.target, &other.target) {
            (OrderByTarget::Column(a), OrderByTarget::Column(b)) => a.eq_ignore_ascii_case(b),
            (a, b) => a == b,
        };
        target_eq && self.direction == other.direction && self.nulls == other.nulls
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationType {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

/// Aggregate projection of the logical statement.
///
/// For AVG the rewrite adds a SUM and a COUNT column per shard; their indexes
/// are carried in `derived` so the merge can recompute the average.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationProjection {
    pub kind: AggregationType,
    pub distinct: bool,
    /// 1-based column index of the aggregate in the shard result
    pub index: usize,
    /// (sum index, count index) for AVG
    pub derived: Option<(usize, usize)>,
}

impl AggregationProjection {
    pub fn new(kind: AggregationType, index: usize) -> Self {
        Self { kind, distinct: false, index, derived: None }
    }

    pub fn distinct(kind: AggregationType, index: usize) -> Self {
        Self { kind, distinct: true, index, derived: None }
    }

    pub fn avg(index: usize, sum_index: usize, count_index: usize) -> Self {
        Self { kind: AggregationType::Avg, distinct: false, index, derived: Some((sum_index, count_index)) }
    }
}

/// Bound logical statement
#[derive(Debug, Clone)]
pub struct StatementContext {
    pub kind: StatementKind,
    /// Logical tables in the order they appear in the statement
    pub tables: Vec<String>,
    pub conditions: ShardingConditions,
    pub hint: HintValues,
    pub aggregations: Vec<AggregationProjection>,
    pub group_by: Vec<OrderByItem>,
    pub order_by: Vec<OrderByItem>,
    pub limit: Option<Limit>,
    pub parameters: Vec<DataValue>,
}

impl StatementContext {
    pub fn new(kind: StatementKind, tables: &[&str]) -> Self {
        Self {
            kind,
            tables: tables.iter().map(|t| t.to_string()).collect(),
            conditions: ShardingConditions::default(),
            hint: HintValues::default(),
            aggregations: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            parameters: Vec::new(),
        }
    }

    pub fn select(tables: &[&str]) -> Self {
        Self::new(StatementKind::Select, tables)
    }

    pub fn with_conditions(mut self, conditions: ShardingConditions) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_hint(mut self, hint: HintValues) -> Self {
        self.hint = hint;
        self
    }

    pub fn with_order_by(mut self, items: Vec<OrderByItem>) -> Self {
        self.order_by = items;
        self
    }

    pub fn with_group_by(mut self, items: Vec<OrderByItem>) -> Self {
        self.group_by = items;
        self
    }

    pub fn with_aggregation(mut self, projection: AggregationProjection) -> Self {
        self.aggregations.push(projection);
        self
    }

    pub fn with_limit(mut self, limit: Limit) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_parameters(mut self, parameters: Vec<DataValue>) -> Self {
        self.parameters = parameters;
        self
    }

    /// GROUP BY and ORDER BY describe the same key, so grouped input can be
    /// merged by streaming.
    pub fn is_same_group_by_and_order_by(&self) -> bool {
        !self.group_by.is_empty()
            && self.group_by.len() == self.order_by.len()
            && self.group_by.iter().zip(&self.order_by).all(|(g, o)| g.same_key(o))
    }
}
