// SPDX-License-Identifier: MIT

//! Pipeline loader - YAML file loading and parsing

use super::types::PipelineDefinition;
use crate::runtime::error::SiftResult;
use std::fs;
use std::path::Path;

/// Loads pipeline definitions from YAML files
pub struct PipelineLoader;

impl PipelineLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a pipeline definition from a YAML file
    pub fn load<P: AsRef<Path>>(&self, path: P) -> SiftResult<PipelineDefinition> {
        let path = path.as_ref();
        log::debug!("Loading pipeline definition from {}", path.display());
        let content = fs::read_to_string(path)?;
        Self::parse_yaml(&content)
    }

    /// Parse a pipeline definition from a YAML string
    pub fn parse_yaml(content: &str) -> SiftResult<PipelineDefinition> {
        let def: PipelineDefinition = serde_yaml::from_str(content)?;
        Ok(def)
    }
}

impl Default for PipelineLoader {
    fn default() -> Self {
        Self::new()
    }
}
