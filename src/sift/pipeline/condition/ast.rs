// SPDX-License-Identifier: MIT

//! Abstract Syntax Tree for conditions over a stage result

use std::str::FromStr;

use crate::runtime::error::ConfigError;

/// A single condition
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `keyword op threshold`, in percentage or absolute mode
    Threshold {
        keyword: String,
        op: CompareOp,
        threshold: Threshold,
    },
    /// The whole result, joined with `,`, must equal this string
    Exact(String),
}

/// Right-hand side of a threshold condition
#[derive(Debug, Clone, PartialEq)]
pub enum Threshold {
    /// Share of the result, in percent
    Percentage(f64),
    /// Raw number of occurrences
    Count(u64),
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// >
    Gt,
    /// >=
    Gte,
    /// ==
    Eq,
    /// <=
    Lte,
    /// <
    Lt,
}

/// An AND-combination of conditions
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConditionGroup {
    pub conditions: Vec<Condition>,
}

impl CompareOp {
    /// Apply the operator to two ordered values
    pub fn compare<T: PartialOrd>(self, left: T, right: T) -> bool {
        match self {
            CompareOp::Gt => left > right,
            CompareOp::Gte => left >= right,
            CompareOp::Eq => left == right,
            CompareOp::Lte => left <= right,
            CompareOp::Lt => left < right,
        }
    }
}

impl FromStr for CompareOp {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ">" => Ok(CompareOp::Gt),
            ">=" => Ok(CompareOp::Gte),
            "==" => Ok(CompareOp::Eq),
            "<=" => Ok(CompareOp::Lte),
            "<" => Ok(CompareOp::Lt),
            other => Err(ConfigError::UnknownOperator(other.to_string())),
        }
    }
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompareOp::Gt => write!(f, ">"),
            CompareOp::Gte => write!(f, ">="),
            CompareOp::Eq => write!(f, "=="),
            CompareOp::Lte => write!(f, "<="),
            CompareOp::Lt => write!(f, "<"),
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Condition::Threshold {
                keyword,
                op,
                threshold: Threshold::Percentage(p),
            } => write!(f, "{}{}{}%", keyword, op, p),
            Condition::Threshold {
                keyword,
                op,
                threshold: Threshold::Count(n),
            } => write!(f, "{}{}{}", keyword, op, n),
            Condition::Exact(keyword) => write!(f, "{}", keyword),
        }
    }
}

impl ConditionGroup {
    /// A group without members, valid for every result
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}
