// SPDX-License-Identifier: MIT

//! Runtime layer - errors, tensors and the inference engine boundary
//!
//! - [error] - typed error hierarchy
//! - [tensor] - dense tensors passed to and from models
//! - [inference] - `InferenceBackend` / `Interpreter` traits
//! - [replay] - fixture-driven backend for offline runs

pub mod error;
pub mod inference;
pub mod replay;
pub mod tensor;

pub use error::{SiftError, SiftResult};
pub use inference::{InferenceBackend, Interpreter};
pub use replay::ReplayBackend;
pub use tensor::Tensor;
