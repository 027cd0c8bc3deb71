// SPDX-License-Identifier: MIT

//! Conditions over stage results
//!
//! A condition checks how often a label appears in a result:
//! - `cat>=50%` - at least half of the labels are `cat`
//! - `dog==2` - exactly two labels are `dog`
//! - `cat,cat,dog` - the result is exactly this sequence
//!
//! `cat>=50%;dog==0` joins conditions with AND.

mod ast;
mod evaluator;
mod parser;

pub use ast::{CompareOp, Condition, ConditionGroup, Threshold};
pub use evaluator::{evaluate, evaluate_group};
pub use parser::{parse_condition, parse_group};

impl ConditionGroup {
    /// Parse a `;`-separated condition string
    pub fn parse(text: &str) -> Result<Self, crate::runtime::error::ConfigError> {
        parse_group(text)
    }

    /// True iff every member condition holds for `result`
    pub fn is_valid(&self, result: &[String]) -> crate::runtime::error::SiftResult<bool> {
        evaluate_group(self, result)
    }
}
