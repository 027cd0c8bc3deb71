// SPDX-License-Identifier: MIT

//! Anomaly detection by reconstruction error
//!
//! The model reconstructs its input. For every leading-axis row the largest
//! absolute difference between input and reconstruction is reported in
//! `values`, and the row is labelled `true` when it exceeds the threshold.

use serde_json::json;

use super::model::ModelRunner;
use super::{Process, StageInput, StageResult};
use crate::runtime::error::{ResultFormatError, SiftResult};

pub struct AnomalyProcess {
    model: ModelRunner,
    threshold: f64,
}

impl AnomalyProcess {
    pub fn new(model: ModelRunner, threshold: f64) -> Self {
        Self { model, threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl Process for AnomalyProcess {
    fn process(&self, stage: &str, input: &StageInput) -> SiftResult<StageResult> {
        let (prepared, outputs) = self.model.run(stage, input)?;
        let reconstruction = &outputs[0];

        if reconstruction.len() != prepared.len() {
            return Err(ResultFormatError::InvalidTensor(format!(
                "stage '{}': reconstruction has {} elements, input has {}",
                stage,
                reconstruction.len(),
                prepared.len()
            ))
            .into());
        }

        let width = prepared.row_width().max(1);
        let values: Vec<f32> = prepared
            .data
            .chunks(width)
            .zip(reconstruction.data.chunks(width))
            .map(|(original, rebuilt)| {
                original
                    .iter()
                    .zip(rebuilt)
                    .map(|(a, b)| (a - b).abs())
                    .fold(0.0_f32, f32::max)
            })
            .collect();

        let classes = values
            .iter()
            .map(|v| (f64::from(*v) > self.threshold).to_string())
            .collect();

        let mut result = StageResult::new(classes, values);
        result
            .params
            .insert("threshold".to_string(), json!(self.threshold));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::error::{RoutingError, SiftError};
    use crate::runtime::inference::Interpreter;
    use crate::runtime::tensor::Tensor;
    use std::sync::Arc;

    /// Returns the input shifted by a fixed amount per element
    struct ShiftModel {
        shifts: Vec<f32>,
    }

    impl Interpreter for ShiftModel {
        fn invoke(&self, input: &Tensor) -> SiftResult<Vec<Tensor>> {
            let data = input
                .data
                .iter()
                .zip(&self.shifts)
                .map(|(v, s)| v + s)
                .collect();
            Ok(vec![Tensor::new(input.shape.clone(), data)?])
        }
    }

    fn process_with(shifts: Vec<f32>, threshold: f64) -> AnomalyProcess {
        let model = ModelRunner::new(Arc::new(ShiftModel { shifts }), vec![2, 1, 2], None);
        AnomalyProcess::new(model, threshold)
    }

    #[test]
    fn test_rows_above_threshold_are_true() {
        let process = process_with(vec![0.1, -0.2, 0.9, 0.0], 0.5);
        let input = StageInput::Tensor(Tensor::from_vec(vec![0.0; 4]));

        let result = process.process("detector", &input).unwrap();
        assert_eq!(result.classes, vec!["false", "true"]);
        assert_eq!(result.values.len(), 2);
        assert!((result.values[0] - 0.2).abs() < 1e-6);
        assert!((result.values[1] - 0.9).abs() < 1e-6);
        assert_eq!(result.params["threshold"], json!(0.5));
    }

    #[test]
    fn test_threshold_is_strict() {
        let process = process_with(vec![0.5, 0.5, 0.5, 0.5], 0.5);
        let input = StageInput::Tensor(Tensor::from_vec(vec![0.0; 4]));
        let result = process.process("detector", &input).unwrap();
        assert_eq!(result.classes, vec!["false", "false"]);
    }

    #[test]
    fn test_wrong_input_size() {
        let process = process_with(vec![0.0; 4], 0.5);
        let input = StageInput::Tensor(Tensor::from_vec(vec![0.0; 3]));
        assert!(process.process("detector", &input).is_err());
    }

    #[test]
    fn test_label_input_rejected() {
        let process = process_with(vec![0.0; 4], 0.5);
        let input = StageInput::Labels(vec!["true".to_string()]);
        let err = process.process("detector", &input).unwrap_err();
        assert!(matches!(
            err,
            SiftError::Routing(RoutingError::UnsupportedInput { .. })
        ));
    }
}
