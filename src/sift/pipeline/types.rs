// SPDX-License-Identifier: MIT

//! YAML schema types for pipeline definitions
//!
//! Every struct rejects unknown fields so that typos in a pipeline file
//! fail at load time instead of being silently ignored.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::runtime::error::ConfigError;

/// Top-level pipeline definition
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct PipelineDefinition {
    #[serde(default)]
    pub name: Option<String>,
    /// Upper bound on stage invocations per run
    #[serde(default)]
    pub max_steps: Option<usize>,
    #[serde(default)]
    pub directories: DirectoriesDefinition,
    /// Stage definitions; exactly one must have `position: input`
    pub processes: Vec<StageDefinition>,
}

/// Output directories
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct DirectoriesDefinition {
    /// Base directory for `save` actions using the default directory
    pub save_dir: PathBuf,
}

impl Default for DirectoriesDefinition {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from("saved"),
        }
    }
}

/// One processing stage
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct StageDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: StageKind,
    #[serde(default)]
    pub position: Position,
    /// Model reference handed to the inference backend
    pub model: PathBuf,
    /// Line logged after every invocation (`default` or a template)
    #[serde(default)]
    pub log: Option<String>,
    pub config: StageConfig,
    #[serde(default)]
    pub actions: ActionsDefinition,
}

/// Processing variant of a stage
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Anomaly,
    Classification,
}

/// Where a stage sits in the pipeline
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    /// Receives the run's input
    Input,
    /// Only reachable through `next` actions; any position other than `input`
    #[default]
    #[serde(other)]
    Middle,
}

/// Model and processing parameters of a stage
///
/// Which of the optional fields are required depends on the stage kind;
/// the builder checks them.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct StageConfig {
    pub input_shape: Vec<usize>,
    #[serde(default)]
    pub preprocess: Option<String>,
    /// Anomaly: reconstruction error above which a row is anomalous
    #[serde(default)]
    pub threshold: Option<f64>,
    /// Classification: `<index>,<label>` file
    #[serde(default)]
    pub labels: Option<PathBuf>,
    /// Classification: scores below this become `n/a`
    #[serde(default)]
    pub minimum_confidence: Option<f64>,
    /// Classification: number of top scores kept per row
    #[serde(default)]
    pub count: Option<i64>,
}

/// The three action lists of a stage
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct ActionsDefinition {
    #[serde(default)]
    pub on_result: Option<Vec<ConditionalAction>>,
    #[serde(default)]
    pub on_not_result: Option<Vec<ConditionalAction>>,
    #[serde(default)]
    pub always: Option<Vec<Action>>,
}

/// A single-key map `condition: action`
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(try_from = "serde_yaml::Mapping")]
pub struct ConditionalAction {
    pub condition: String,
    pub action: Action,
}

/// What a stage does when an action fires
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(try_from = "RawAction")]
pub enum Action {
    /// Continue with another stage
    Next { target: String, input: ForwardInput },
    /// Persist the run's input
    Save {
        filename: Option<String>,
        directory: Option<String>,
    },
    /// Emit a templated line
    Log { line: Option<String> },
    /// Add the stage result to the run output
    Output,
    /// No discriminant given
    Nothing,
}

/// Data handed to the stage selected by `next`
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ForwardInput {
    /// The input the current stage received
    Same,
    /// The labels the current stage produced
    Result,
}

impl Action {
    /// Discriminant as written in the pipeline file
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Next { .. } => "next",
            Action::Save { .. } => "save",
            Action::Log { .. } => "log",
            Action::Output => "output",
            Action::Nothing => "none",
        }
    }
}

/// Flat form of an action as it appears in YAML
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAction {
    action: Option<String>,
    target: Option<String>,
    input: Option<String>,
    filename: Option<String>,
    directory: Option<String>,
    line: Option<String>,
}

impl RawAction {
    fn present_fields(&self) -> Vec<&'static str> {
        [
            ("target", self.target.is_some()),
            ("input", self.input.is_some()),
            ("filename", self.filename.is_some()),
            ("directory", self.directory.is_some()),
            ("line", self.line.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, present)| present.then_some(name))
        .collect()
    }

    fn reject_fields_except(&self, kind: &str, allowed: &[&str]) -> Result<(), ConfigError> {
        match self
            .present_fields()
            .into_iter()
            .find(|f| !allowed.contains(f))
        {
            Some(field) => Err(ConfigError::InvalidAction(format!(
                "field '{}' is not valid for a '{}' action",
                field, kind
            ))),
            None => Ok(()),
        }
    }
}

impl TryFrom<RawAction> for Action {
    type Error = ConfigError;

    fn try_from(raw: RawAction) -> Result<Self, Self::Error> {
        let kind = match raw.action.as_deref() {
            None => {
                raw.reject_fields_except("none", &[])?;
                return Ok(Action::Nothing);
            }
            Some(kind) => kind.to_string(),
        };

        match kind.as_str() {
            "next" => {
                raw.reject_fields_except("next", &["target", "input"])?;
                let target = raw.target.ok_or_else(|| {
                    ConfigError::InvalidAction("'next' action needs a 'target'".to_string())
                })?;
                let input = match raw.input.as_deref() {
                    Some("same") => ForwardInput::Same,
                    Some("result") => ForwardInput::Result,
                    _ => {
                        return Err(ConfigError::InvalidAction(
                            "'input' field of the 'next' action should be 'same' or 'result'"
                                .to_string(),
                        ))
                    }
                };
                Ok(Action::Next { target, input })
            }
            "save" => {
                raw.reject_fields_except("save", &["filename", "directory"])?;
                Ok(Action::Save {
                    filename: raw.filename,
                    directory: raw.directory,
                })
            }
            "log" => {
                raw.reject_fields_except("log", &["line"])?;
                Ok(Action::Log { line: raw.line })
            }
            "output" => {
                raw.reject_fields_except("output", &[])?;
                Ok(Action::Output)
            }
            other => Err(ConfigError::InvalidAction(format!(
                "unknown action type '{}'",
                other
            ))),
        }
    }
}

impl TryFrom<serde_yaml::Mapping> for ConditionalAction {
    type Error = ConfigError;

    fn try_from(map: serde_yaml::Mapping) -> Result<Self, Self::Error> {
        if map.len() != 1 {
            return Err(ConfigError::InvalidAction(format!(
                "conditional action must map exactly one condition to an action, found {} entries",
                map.len()
            )));
        }
        let Some((key, value)) = map.into_iter().next() else {
            return Err(ConfigError::InvalidAction("empty conditional action".to_string()));
        };

        // Bare YAML scalars such as `true` or `3` are conditions too
        let condition = match key {
            serde_yaml::Value::String(s) => s,
            serde_yaml::Value::Bool(b) => b.to_string(),
            serde_yaml::Value::Number(n) => n.to_string(),
            other => {
                return Err(ConfigError::InvalidAction(format!(
                    "condition must be a scalar, found {:?}",
                    other
                )))
            }
        };

        let action: Action = serde_yaml::from_value(value)
            .map_err(|e| ConfigError::InvalidAction(format!("'{}': {}", condition, e)))?;

        Ok(Self { condition, action })
    }
}
