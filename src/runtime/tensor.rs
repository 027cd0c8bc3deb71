// SPDX-License-Identifier: MIT

//! Dense `f32` tensors exchanged with the inference engine

use serde::{Deserialize, Serialize};

use super::error::{ResultFormatError, SiftResult};

/// Row-major tensor with an explicit shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl Tensor {
    /// Create a tensor, checking that `data` fills `shape` exactly
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> SiftResult<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(ResultFormatError::InvalidTensor(format!(
                "shape {:?} needs {} elements, got {}",
                shape,
                expected,
                data.len()
            ))
            .into());
        }
        Ok(Self { shape, data })
    }

    /// Re-check a tensor that was deserialized without going through [`Tensor::new`]
    pub fn validated(self) -> SiftResult<Self> {
        Self::new(self.shape, self.data)
    }

    /// One-dimensional tensor over `data`
    pub fn from_vec(data: Vec<f32>) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Same data viewed with another shape of equal element count
    pub fn reshape(&self, shape: &[usize]) -> SiftResult<Self> {
        Self::new(shape.to_vec(), self.data.clone())
    }

    /// Number of rows along the leading axis; vectors and scalars are one row
    pub fn rows(&self) -> usize {
        if self.shape.len() < 2 {
            1
        } else {
            self.shape[0]
        }
    }

    /// Number of elements in one leading-axis row
    pub fn row_width(&self) -> usize {
        if self.shape.len() < 2 {
            self.data.len()
        } else {
            self.shape[1..].iter().product()
        }
    }

    /// Iterate over the leading-axis rows as flat slices
    pub fn row_slices(&self) -> std::slice::Chunks<'_, f32> {
        self.data.chunks(self.row_width().max(1))
    }
}
