// SPDX-License-Identifier: MIT

//! Condition parser
//!
//! A condition takes one of three shapes, tried in this order:
//! - percentage: `cat>=50%` or `bird<12.5%`
//! - absolute: `dog==2`
//! - exact: anything else, e.g. `cat,cat,dog`
//!
//! A group is several conditions separated by `;`, all of which must hold.

use once_cell::sync::Lazy;
use regex::Regex;

use super::ast::{CompareOp, Condition, ConditionGroup, Threshold};
use crate::runtime::error::ConfigError;

static PERCENTAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([\w ,:!§/.?-]+)([<>=]=?)\s*([\d.]+)%$").unwrap());

static ABSOLUTE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([\w ,:!§/.?-]+)([<>=]=?)\s*(\d+)$").unwrap());

/// Parse a single condition
///
/// Surrounding whitespace is trimmed first, so an exact-mode condition
/// compares against the trimmed text, and threshold keywords are trimmed too.
pub fn parse_condition(input: &str) -> Result<Condition, ConfigError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ConfigError::malformed(input, "empty condition"));
    }

    if let Some(caps) = PERCENTAGE_RE.captures(input) {
        let keyword = caps[1].trim().to_string();
        let op: CompareOp = caps[2].parse()?;
        let value: f64 = caps[3]
            .parse()
            .map_err(|_| ConfigError::malformed(input, format!("bad percentage '{}'", &caps[3])))?;
        return Ok(Condition::Threshold {
            keyword,
            op,
            threshold: Threshold::Percentage(value),
        });
    }

    if let Some(caps) = ABSOLUTE_RE.captures(input) {
        let keyword = caps[1].trim().to_string();
        let op: CompareOp = caps[2].parse()?;
        let value: u64 = caps[3]
            .parse()
            .map_err(|_| ConfigError::malformed(input, format!("bad count '{}'", &caps[3])))?;
        return Ok(Condition::Threshold {
            keyword,
            op,
            threshold: Threshold::Count(value),
        });
    }

    Ok(Condition::Exact(input.to_string()))
}

/// Parse a `;`-separated group of conditions
///
/// The text is lower-cased first. Blank text yields an empty group, which is
/// valid for every result; a blank member inside a non-blank group is an error.
pub fn parse_group(input: &str) -> Result<ConditionGroup, ConfigError> {
    let lowered = input.to_lowercase();
    if lowered.trim().is_empty() {
        return Ok(ConditionGroup::default());
    }

    let conditions = lowered
        .split(';')
        .map(parse_condition)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ConditionGroup { conditions })
}
