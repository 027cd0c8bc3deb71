// SPDX-License-Identifier: MIT

//! Label files for classification stages
//!
//! One `<index>,<label>` pair per line; blank lines are skipped and labels
//! are lower-cased.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::runtime::error::{ResourceError, SiftResult};

pub fn load_labels(path: &Path) -> SiftResult<HashMap<usize, String>> {
    if !path.is_file() {
        return Err(ResourceError::LabelsNotFound(path.to_path_buf()).into());
    }
    let content = fs::read_to_string(path)?;
    parse_labels(&content, path)
}

fn parse_labels(content: &str, path: &Path) -> SiftResult<HashMap<usize, String>> {
    let mut labels = HashMap::new();
    for (number, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let malformed = || ResourceError::MalformedLabels {
            path: path.to_path_buf(),
            line: number + 1,
        };
        let (index, name) = line.split_once(',').ok_or_else(malformed)?;
        let index: usize = index.trim().parse().map_err(|_| malformed())?;
        labels.insert(index, name.trim().to_lowercase());
    }
    Ok(labels)
}
