// SPDX-License-Identifier: MIT

//! Side-effect collaborators of the router
//!
//! Log lines and saved artifacts leave the pipeline through these traits.
//! Both are handed to the [`Pipeline`](super::router::Pipeline) at
//! construction, so the embedding application decides where they end up.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::runtime::error::SiftResult;

/// Receives rendered stage log lines
pub trait LogSink: Send + Sync {
    fn emit(&self, stage: &str, line: &str);
}

/// Forwards lines to the `log` facade under the `sift::results` target
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCrateSink;

impl LogSink for LogCrateSink {
    fn emit(&self, stage: &str, line: &str) {
        log::info!(target: "sift::results", "[{}] {}", stage, line);
    }
}

/// Keeps every line in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines emitted so far, oldest first
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl LogSink for MemorySink {
    fn emit(&self, _stage: &str, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(line.to_string());
    }
}

/// One `save` action to carry out
#[derive(Debug, Clone, Copy)]
pub struct ArtifactRequest<'a> {
    pub stage: &'a str,
    /// The run's input file
    pub source: &'a Path,
    pub directory: &'a Path,
    /// Already sanitized
    pub filename: &'a str,
}

/// Persists run inputs for `save` actions
pub trait ArtifactStore: Send + Sync {
    /// Store the artifact and return where it ended up
    fn persist(&self, request: &ArtifactRequest<'_>) -> SiftResult<PathBuf>;
}

/// Copies the run's source file into the target directory
#[derive(Debug, Default, Clone, Copy)]
pub struct FsArtifactStore;

impl ArtifactStore for FsArtifactStore {
    fn persist(&self, request: &ArtifactRequest<'_>) -> SiftResult<PathBuf> {
        fs::create_dir_all(request.directory)?;
        let target = request.directory.join(request.filename);
        fs::copy(request.source, &target)?;
        log::debug!(
            "Stage '{}' saved '{}' to '{}'",
            request.stage,
            request.source.display(),
            target.display()
        );
        Ok(target)
    }
}
