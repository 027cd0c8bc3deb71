// SPDX-License-Identifier: MIT

//! Aggregated output of one pipeline run

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::sift::pipeline::stage::StageResult;

/// Everything a run surfaced
///
/// Serializes to a flat object: `filepath` (when something was saved) plus
/// one key per stage that fired `output`, holding every result it surfaced.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunOutput {
    /// Location of the last saved artifact
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filepath: Option<PathBuf>,
    #[serde(flatten)]
    pub stages: BTreeMap<String, Vec<StageResult>>,
}

impl RunOutput {
    pub fn record(&mut self, stage: &str, result: StageResult) {
        self.stages
            .entry(stage.to_string())
            .or_default()
            .push(result);
    }

    /// Most recent result surfaced by `stage`
    pub fn latest(&self, stage: &str) -> Option<&StageResult> {
        self.stages.get(stage).and_then(|results| results.last())
    }

    pub fn results(&self, stage: &str) -> &[StageResult] {
        self.stages.get(stage).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.filepath.is_none() && self.stages.is_empty()
    }
}
