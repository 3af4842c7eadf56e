// Sharding predicates extracted from a statement.
//
// A `ShardingConditions` value is a disjunction of conditions; each condition is
// the conjunction of its column values. Routing evaluates every branch and unions
// the results in branch order.

use std::ops::Bound;

use crate::common::{DataValue, ShardingResult};

/// Value range for `BETWEEN`, `<`, `>=` ... predicates
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRange {
    pub lower: Bound<DataValue>,
    pub upper: Bound<DataValue>,
}

impl ValueRange {
    pub fn new(lower: Bound<DataValue>, upper: Bound<DataValue>) -> Self {
        Self { lower, upper }
    }

    /// `BETWEEN lower AND upper`
    pub fn closed(lower: impl Into<DataValue>, upper: impl Into<DataValue>) -> Self {
        Self::new(Bound::Included(lower.into()), Bound::Included(upper.into()))
    }

    pub fn at_least(lower: impl Into<DataValue>) -> Self {
        Self::new(Bound::Included(lower.into()), Bound::Unbounded)
    }

    pub fn less_than(upper: impl Into<DataValue>) -> Self {
        Self::new(Bound::Unbounded, Bound::Excluded(upper.into()))
    }

    /// Integer bounds normalised to an inclusive `[lo, hi]`, `None` for unbounded sides.
    pub fn integer_bounds(&self) -> (Option<i64>, Option<i64>) {
        let lower = match &self.lower {
            Bound::Included(v) => v.as_i64(),
            Bound::Excluded(v) => v.as_i64().and_then(|i| i.checked_add(1)),
            Bound::Unbounded => None,
        };
        let upper = match &self.upper {
            Bound::Included(v) => v.as_i64(),
            Bound::Excluded(v) => v.as_i64().and_then(|i| i.checked_sub(1)),
            Bound::Unbounded => None,
        };
        (lower, upper)
    }

    /// Whether `value` lies inside the range
    pub fn contains(&self, value: &DataValue) -> ShardingResult<bool> {
        use std::cmp::Ordering;
        let above_lower = match &self.lower {
            Bound::Included(v) => value.compare(v)? != Ordering::Less,
            Bound::Excluded(v) => value.compare(v)? == Ordering::Greater,
            Bound::Unbounded => true,
        };
        let below_upper = match &self.upper {
            Bound::Included(v) => value.compare(v)? != Ordering::Greater,
            Bound::Excluded(v) => value.compare(v)? == Ordering::Less,
            Bound::Unbounded => true,
        };
        Ok(above_lower && below_upper)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConditionValue {
    /// `=` and `IN`
    List(Vec<DataValue>),
    Range(ValueRange),
}

/// Predicate on one sharding column of one logical table
#[derive(Debug, Clone, PartialEq)]
pub struct ShardingConditionValue {
    pub table: String,
    pub column: String,
    pub value: ConditionValue,
}

impl ShardingConditionValue {
    pub fn equal(table: &str, column: &str, value: impl Into<DataValue>) -> Self {
        Self::list(table, column, vec![value.into()])
    }

    pub fn list(table: &str, column: &str, values: Vec<DataValue>) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            value: ConditionValue::List(values),
        }
    }

    pub fn range(table: &str, column: &str, range: ValueRange) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            value: ConditionValue::Range(range),
        }
    }

    pub fn matches(&self, table: &str, column: &str) -> bool {
        self.table.eq_ignore_ascii_case(table) && self.column.eq_ignore_ascii_case(column)
    }
}

/// Conjunction of predicates
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShardingCondition {
    pub values: Vec<ShardingConditionValue>,
}

impl ShardingCondition {
    pub fn new(values: Vec<ShardingConditionValue>) -> Self {
        Self { values }
    }

    /// Predicates that apply to `table`
    pub fn for_table<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a ShardingConditionValue> + 'a {
        self.values.iter().filter(move |v| v.table.eq_ignore_ascii_case(table))
    }
}

/// Disjunction of conditions; empty means "no sharding predicate".
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShardingConditions {
    pub conditions: Vec<ShardingCondition>,
}

impl ShardingConditions {
    pub fn single(values: Vec<ShardingConditionValue>) -> Self {
        Self { conditions: vec![ShardingCondition::new(values)] }
    }

    pub fn any_of(conditions: Vec<ShardingCondition>) -> Self {
        Self { conditions }
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

/// Forced sharding values supplied out of band
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HintValues {
    pub database: Vec<DataValue>,
    pub table: Vec<DataValue>,
}

impl HintValues {
    pub fn new(database: Vec<DataValue>, table: Vec<DataValue>) -> Self {
        Self { database, table }
    }

    pub fn is_empty(&self) -> bool {
        self.database.is_empty() && self.table.is_empty()
    }
}
