// SPDX-License-Identifier: MIT

//! Condition evaluator

use super::ast::{CompareOp, Condition, ConditionGroup, Threshold};
use crate::runtime::error::{ResultFormatError, SiftResult};

const PERCENT_EPSILON: f64 = 1e-9;

/// Evaluate a single condition against a result
///
/// Percentage conditions need a non-empty result and fail with
/// [`ResultFormatError::EmptyResult`] otherwise.
pub fn evaluate(condition: &Condition, result: &[String]) -> SiftResult<bool> {
    match condition {
        Condition::Exact(keyword) => Ok(result.join(",") == *keyword),
        Condition::Threshold {
            keyword,
            op,
            threshold: Threshold::Count(expected),
        } => Ok(op.compare(count(keyword, result), *expected)),
        Condition::Threshold {
            keyword,
            op,
            threshold: Threshold::Percentage(expected),
        } => {
            if result.is_empty() {
                return Err(ResultFormatError::EmptyResult {
                    keyword: keyword.clone(),
                }
                .into());
            }
            let percentage = 100.0 * count(keyword, result) as f64 / result.len() as f64;
            Ok(match op {
                CompareOp::Eq => (percentage - expected).abs() < PERCENT_EPSILON,
                _ => op.compare(percentage, *expected),
            })
        }
    }
}

/// Evaluate a group: true iff every member holds
pub fn evaluate_group(group: &ConditionGroup, result: &[String]) -> SiftResult<bool> {
    for condition in &group.conditions {
        if !evaluate(condition, result)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn count(keyword: &str, result: &[String]) -> u64 {
    result.iter().filter(|label| *label == keyword).count() as u64
}
