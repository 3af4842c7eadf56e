// Expression driven sharding algorithms: INLINE, COMPLEX_INLINE and HINT_INLINE.

use std::collections::HashMap;

use crate::common::{ConfigError, DataValue, ShardingResult};
use crate::route::condition::ValueRange;
use crate::rule::algorithm::{
    AlgorithmProperties, ComplexKeysShardingAlgorithm, HintShardingAlgorithm, RangeRoute,
    StandardShardingAlgorithm, invalid_property,
};
use crate::rule::inline::InlineExpression;

const EXPRESSION_KEY: &str = "algorithm-expression";
const ALLOW_RANGE_KEY: &str = "allow-range-query-with-inline-sharding";

fn expression(algorithm: &str, props: &AlgorithmProperties) -> ShardingResult<InlineExpression> {
    let text = props.require_str(algorithm, EXPRESSION_KEY)?;
    InlineExpression::parse(&text).map_err(|e| invalid_property(algorithm, EXPRESSION_KEY, &e.to_string()))
}

fn checked_target(algorithm: &str, available: &[String], target: String) -> ShardingResult<String> {
    if available.iter().any(|t| t.eq_ignore_ascii_case(&target)) {
        Ok(target)
    } else {
        Err(ConfigError::TargetNotAvailable { algorithm: algorithm.to_string(), target }.into())
    }
}

#[derive(Debug, Clone)]
pub struct InlineShardingAlgorithm {
    expression: InlineExpression,
    allow_range_query: bool,
}

impl InlineShardingAlgorithm {
    pub fn from_props(props: &AlgorithmProperties) -> ShardingResult<Self> {
        Ok(Self {
            expression: expression("INLINE", props)?,
            allow_range_query: props.get_bool("INLINE", ALLOW_RANGE_KEY)?,
        })
    }
}

impl StandardShardingAlgorithm for InlineShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        "INLINE"
    }

    fn do_precise_sharding(
        &self,
        available: &[String],
        column: &str,
        value: &DataValue,
    ) -> ShardingResult<Option<String>> {
        let variables = HashMap::from([(column.to_string(), value.clone())]);
        checked_target("INLINE", available, self.expression.evaluate(&variables)?).map(Some)
    }

    fn do_range_sharding(&self, available: &[String], _column: &str, _range: &ValueRange) -> ShardingResult<RangeRoute> {
        if self.allow_range_query {
            Ok(RangeRoute::Targets(available.to_vec()))
        } else {
            Ok(RangeRoute::Unsupported)
        }
    }
}

/// Expression over several columns. When one of `sharding-columns` has no
/// value in the combination every candidate is returned.
#[derive(Debug, Clone)]
pub struct ComplexInlineShardingAlgorithm {
    expression: InlineExpression,
    sharding_columns: Vec<String>,
}

impl ComplexInlineShardingAlgorithm {
    pub fn from_props(props: &AlgorithmProperties) -> ShardingResult<Self> {
        let sharding_columns = props
            .get_str("sharding-columns")
            .map(|text| {
                text.split(',').map(|c| c.trim().to_string()).filter(|c| !c.is_empty()).collect()
            })
            .unwrap_or_default();
        Ok(Self { expression: expression("COMPLEX_INLINE", props)?, sharding_columns })
    }
}

impl ComplexKeysShardingAlgorithm for ComplexInlineShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        "COMPLEX_INLINE"
    }

    fn do_sharding(&self, available: &[String], values: &HashMap<String, DataValue>) -> ShardingResult<Vec<String>> {
        let complete = self
            .sharding_columns
            .iter()
            .all(|column| values.keys().any(|k| k.eq_ignore_ascii_case(column)));
        if !complete {
            return Ok(available.to_vec());
        }
        let target = self.expression.evaluate(values)?;
        Ok(vec![checked_target("COMPLEX_INLINE", available, target)?])
    }
}

/// Expression over the hint variable `value`; defaults to `${value}`.
#[derive(Debug, Clone)]
pub struct HintInlineShardingAlgorithm {
    expression: InlineExpression,
}

impl HintInlineShardingAlgorithm {
    pub fn from_props(props: &AlgorithmProperties) -> ShardingResult<Self> {
        let expression = match props.get_str(EXPRESSION_KEY) {
            Some(_) => expression("HINT_INLINE", props)?,
            None => InlineExpression::parse("${value}")?,
        };
        Ok(Self { expression })
    }
}

impl HintShardingAlgorithm for HintInlineShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        "HINT_INLINE"
    }

    fn do_sharding(&self, available: &[String], value: &DataValue) -> ShardingResult<String> {
        let variables = HashMap::from([("value".to_string(), value.clone())]);
        checked_target("HINT_INLINE", available, self.expression.evaluate(&variables)?)
    }
}
