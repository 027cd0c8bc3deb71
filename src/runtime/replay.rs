// SPDX-License-Identifier: MIT

//! Fixture-driven inference backend
//!
//! Replays recorded output tensors instead of running a model. Used by the
//! `sift run` command for offline dry runs and by the integration tests.

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::error::{ResourceError, SiftResult};
use super::inference::{InferenceBackend, Interpreter};
use super::tensor::Tensor;

/// Recorded outputs keyed by model path
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplayFixtures {
    #[serde(default)]
    pub models: HashMap<PathBuf, Vec<Tensor>>,
}

/// Backend that answers every invocation of a model with its recorded outputs
#[derive(Debug, Clone, Default)]
pub struct ReplayBackend {
    fixtures: ReplayFixtures,
}

impl ReplayBackend {
    pub fn new(fixtures: ReplayFixtures) -> Self {
        Self { fixtures }
    }

    /// Load fixtures from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> SiftResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse fixtures from a JSON string
    pub fn from_json(content: &str) -> SiftResult<Self> {
        let fixtures: ReplayFixtures = serde_json::from_str(content)?;
        Ok(Self::new(fixtures))
    }

    /// Register the outputs for one model
    pub fn with_model(mut self, model: impl Into<PathBuf>, outputs: Vec<Tensor>) -> Self {
        self.fixtures.models.insert(model.into(), outputs);
        self
    }
}

impl InferenceBackend for ReplayBackend {
    fn name(&self) -> &str {
        "replay"
    }

    fn load(&self, model: &Path, input_shape: &[usize]) -> SiftResult<Arc<dyn Interpreter>> {
        let outputs = self
            .fixtures
            .models
            .get(model)
            .ok_or_else(|| ResourceError::ModelNotFound(model.to_path_buf()))?;

        let outputs = outputs
            .iter()
            .cloned()
            .map(Tensor::validated)
            .collect::<SiftResult<Vec<_>>>()?;

        log::debug!(
            "Replay model '{}' loaded for input shape {:?} with {} output layers",
            model.display(),
            input_shape,
            outputs.len()
        );

        Ok(Arc::new(ReplayInterpreter { outputs }))
    }
}

struct ReplayInterpreter {
    outputs: Vec<Tensor>,
}

impl Interpreter for ReplayInterpreter {
    fn invoke(&self, _input: &Tensor) -> SiftResult<Vec<Tensor>> {
        Ok(self.outputs.clone())
    }
}
