// SPDX-License-Identifier: MIT

//! Named preprocessing steps
//!
//! Stages select a feature extractor with `config.preprocess`. Extractors
//! are registered by the embedding application; `none` always means the
//! reshaped input goes to the model unchanged.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::runtime::error::SiftResult;
use crate::runtime::tensor::Tensor;

/// Name that disables preprocessing
pub const NO_PREPROCESS: &str = "none";

/// Turns a reshaped stage input into model features
pub trait FeatureExtractor: Send + Sync {
    /// Name used in `config.preprocess`
    fn name(&self) -> &str;

    fn extract(&self, input: &Tensor) -> SiftResult<Tensor>;
}

#[derive(Clone)]
pub struct ExtractorRegistry {
    extractors: Arc<RwLock<HashMap<String, Arc<dyn FeatureExtractor>>>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self {
            extractors: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn register(&self, extractor: Arc<dyn FeatureExtractor>) {
        let mut extractors = self
            .extractors
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        extractors.insert(extractor.name().to_string(), extractor);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn FeatureExtractor>> {
        let extractors = self
            .extractors
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        extractors.get(name).cloned()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let extractors = self
            .extractors
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut names: Vec<String> = extractors.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
