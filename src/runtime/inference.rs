// SPDX-License-Identifier: MIT

//! Inference engine boundary
//!
//! The neural network runtime itself is not part of this crate. A backend
//! loads a model for a declared input shape and hands back an [`Interpreter`]
//! that turns one input tensor into the model's output tensors.

use std::path::Path;
use std::sync::Arc;

use super::error::SiftResult;
use super::tensor::Tensor;

/// Loads models into interpreters
pub trait InferenceBackend: Send + Sync {
    /// Short backend name used in logs
    fn name(&self) -> &str;

    /// Load `model` for inputs of `input_shape`
    fn load(&self, model: &Path, input_shape: &[usize]) -> SiftResult<Arc<dyn Interpreter>>;
}

/// A loaded model
///
/// Implementations must be usable from several runs at once; any mutable
/// engine state belongs behind the implementation's own synchronization.
pub trait Interpreter: Send + Sync {
    /// Run the model on `input`, returning every output layer in order
    fn invoke(&self, input: &Tensor) -> SiftResult<Vec<Tensor>>;
}
