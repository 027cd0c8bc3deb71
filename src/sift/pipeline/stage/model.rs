// SPDX-License-Identifier: MIT

//! Shared model invocation for the built-in processors

use std::sync::Arc;

use super::StageInput;
use crate::runtime::error::{RoutingError, SiftError, SiftResult};
use crate::runtime::inference::Interpreter;
use crate::runtime::tensor::Tensor;
use crate::sift::pipeline::registry::FeatureExtractor;

/// Reshape, preprocess, invoke
#[derive(Clone)]
pub struct ModelRunner {
    interpreter: Arc<dyn Interpreter>,
    input_shape: Vec<usize>,
    preprocess: Option<Arc<dyn FeatureExtractor>>,
}

impl ModelRunner {
    pub fn new(
        interpreter: Arc<dyn Interpreter>,
        input_shape: Vec<usize>,
        preprocess: Option<Arc<dyn FeatureExtractor>>,
    ) -> Self {
        Self {
            interpreter,
            input_shape,
            preprocess,
        }
    }

    pub fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    /// Returns the tensor fed to the model together with every output layer
    pub fn run(&self, stage: &str, input: &StageInput) -> SiftResult<(Tensor, Vec<Tensor>)> {
        let tensor = match input {
            StageInput::Tensor(t) => t,
            StageInput::Labels(_) => {
                return Err(RoutingError::UnsupportedInput {
                    stage: stage.to_string(),
                    reason: "model stages need a tensor, not labels".to_string(),
                }
                .into())
            }
        };

        let shaped = tensor.reshape(&self.input_shape)?;
        let prepared = match &self.preprocess {
            Some(extractor) => extractor.extract(&shaped)?,
            None => shaped,
        };

        let outputs = self.interpreter.invoke(&prepared)?;
        if outputs.is_empty() {
            return Err(SiftError::inference(stage, "model returned no output layers"));
        }
        Ok((prepared, outputs))
    }
}
