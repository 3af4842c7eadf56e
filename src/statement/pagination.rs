// Pagination descriptors and their resolution against statement parameters.

use crate::common::{DataValue, ShardingError, ShardingResult};

/// Where a pagination number comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationValue {
    Literal(i64),
    /// 0-based index into the statement parameters
    Parameter(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationBound {
    pub value: PaginationValue,
    /// Whether the bound value itself is part of the returned window
    pub inclusive: bool,
}

impl PaginationBound {
    pub fn literal(value: i64, inclusive: bool) -> Self {
        Self { value: PaginationValue::Literal(value), inclusive }
    }

    pub fn parameter(index: usize, inclusive: bool) -> Self {
        Self { value: PaginationValue::Parameter(index), inclusive }
    }

    fn resolve(&self, parameters: &[DataValue]) -> ShardingResult<u64> {
        let raw = match self.value {
            PaginationValue::Literal(v) => v,
            PaginationValue::Parameter(index) => {
                let param = parameters.get(index).ok_or_else(|| {
                    ShardingError::InvalidParameter(format!(
                        "pagination parameter #{} missing ({} supplied)",
                        index,
                        parameters.len()
                    ))
                })?;
                param.as_i64().ok_or_else(|| {
                    ShardingError::InvalidParameter(format!(
                        "pagination parameter #{} is not an integer: {}",
                        index, param
                    ))
                })?
            }
        };
        Ok(raw.max(0) as u64)
    }
}

/// Offset and row count of a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Limit {
    pub offset: Option<PaginationBound>,
    pub row_count: Option<PaginationBound>,
}

impl Limit {
    /// `LIMIT offset, row_count`
    pub fn limit(offset: i64, row_count: i64) -> Self {
        Self {
            offset: Some(PaginationBound::literal(offset, false)),
            row_count: Some(PaginationBound::literal(row_count, true)),
        }
    }

    /// `LIMIT row_count`
    pub fn row_count(row_count: i64) -> Self {
        Self {
            offset: None,
            row_count: Some(PaginationBound::literal(row_count, true)),
        }
    }

    pub fn new(offset: Option<PaginationBound>, row_count: Option<PaginationBound>) -> Self {
        Self { offset, row_count }
    }
}

/// Pagination resolved to concrete numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationContext {
    skipped: u64,
    last: Option<u64>,
}

impl PaginationContext {
    pub fn resolve(limit: &Limit, parameters: &[DataValue]) -> ShardingResult<Self> {
        let skipped = match &limit.offset {
            Some(bound) => {
                let value = bound.resolve(parameters)?;
                if bound.inclusive { value.saturating_sub(1) } else { value }
            }
            None => 0,
        };
        let last = match &limit.row_count {
            Some(bound) => {
                let value = bound.resolve(parameters)?;
                Some(if bound.inclusive { value } else { value.saturating_sub(1) })
            }
            None => None,
        };
        Ok(Self { skipped, last })
    }

    /// Rows to discard before the window starts
    pub fn actual_offset(&self) -> u64 {
        self.skipped
    }

    /// Upper bound as written: a count for LIMIT, a row number for ROW_NUMBER/ROWNUM
    pub fn actual_row_count(&self) -> Option<u64> {
        self.last
    }

    /// Rows a row-number dialect may still emit once the backend applied the lower bound
    pub fn row_number_window(&self) -> Option<u64> {
        self.last.map(|last| last.saturating_sub(self.skipped))
    }

    pub fn has_pagination(&self) -> bool {
        self.skipped > 0 || self.last.is_some()
    }
}
