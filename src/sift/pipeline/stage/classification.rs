// SPDX-License-Identifier: MIT

//! Top-K classification
//!
//! For every row of the first output layer the `count` best scores are
//! reported, best first. A score that is below `minimum_confidence`, or whose
//! index has no label, is reported as `n/a` with value `0.0`.

use serde_json::json;
use std::collections::HashMap;

use super::model::ModelRunner;
use super::{Process, StageInput, StageResult};
use crate::runtime::error::SiftResult;

pub const UNKNOWN_LABEL: &str = "n/a";

pub struct ClassificationProcess {
    model: ModelRunner,
    labels: HashMap<usize, String>,
    minimum_confidence: f64,
    count: usize,
}

impl ClassificationProcess {
    /// `count` values of zero or below mean "one per label"
    pub fn new(
        model: ModelRunner,
        labels: HashMap<usize, String>,
        minimum_confidence: Option<f64>,
        count: Option<i64>,
    ) -> Self {
        let count = match count {
            Some(n) if n > 0 => n as usize,
            _ => labels.len(),
        };
        Self {
            model,
            labels,
            minimum_confidence: minimum_confidence.unwrap_or(0.0),
            count,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Indices of the `count` highest scores, best first
    ///
    /// Equal scores keep the later index first.
    fn top_indices(&self, row: &[f32]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..row.len()).collect();
        order.sort_by(|a, b| row[*a].total_cmp(&row[*b]));
        order.into_iter().rev().take(self.count).collect()
    }
}

impl Process for ClassificationProcess {
    fn process(&self, stage: &str, input: &StageInput) -> SiftResult<StageResult> {
        let (_, outputs) = self.model.run(stage, input)?;
        let scores = &outputs[0];

        let mut classes = Vec::new();
        let mut values = Vec::new();
        for row in scores.row_slices() {
            for index in self.top_indices(row) {
                let confidence = row[index];
                match self.labels.get(&index) {
                    Some(label) if f64::from(confidence) >= self.minimum_confidence => {
                        classes.push(label.clone());
                        values.push(confidence);
                    }
                    _ => {
                        classes.push(UNKNOWN_LABEL.to_string());
                        values.push(0.0);
                    }
                }
            }
        }

        log::debug!("Stage '{}' classified {} rows", stage, scores.rows());

        let mut result = StageResult::new(classes, values);
        result.params.insert("count".to_string(), json!(self.count));
        result.params.insert(
            "min_confidence".to_string(),
            json!(self.minimum_confidence),
        );
        Ok(result)
    }
}
