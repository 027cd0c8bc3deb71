// SPDX-License-Identifier: MIT

//! Condition-driven routing of inference results through a pipeline of stages

pub mod runtime;
pub mod sift;
