use crate::array::record::DType;
use crate::core::errors::{LockstepError, Result};
use serde::{Deserialize, Serialize};

/// One dimension of an array shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dim {
    /// The growable leading dimension
    Unlimited,
    Fixed(usize),
}

/// Full array shape: an unlimited leading dimension followed by fixed dims.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArrayShape {
    dims: Vec<Dim>,
}

impl ArrayShape {
    pub fn new(dims: Vec<Dim>) -> Result<Self> {
        match dims.first() {
            None => return Err(LockstepError::invalid_shape("shape has no dimensions")),
            Some(Dim::Fixed(_)) => {
                return Err(LockstepError::invalid_shape(
                    "leading dimension must be unlimited",
                ))
            }
            Some(Dim::Unlimited) => {}
        }
        for (axis, dim) in dims.iter().enumerate().skip(1) {
            match dim {
                Dim::Unlimited => {
                    return Err(LockstepError::invalid_shape(format!(
                        "only the leading dimension may be unlimited (axis {})",
                        axis
                    )))
                }
                Dim::Fixed(0) => {
                    return Err(LockstepError::invalid_shape(format!(
                        "axis {} has zero extent",
                        axis
                    )))
                }
                Dim::Fixed(_) => {}
            }
        }
        Ok(Self { dims })
    }

    /// Shape `(unlimited, inner...)`
    pub fn growable(inner: &[usize]) -> Result<Self> {
        let mut dims = Vec::with_capacity(inner.len() + 1);
        dims.push(Dim::Unlimited);
        dims.extend(inner.iter().map(|&n| Dim::Fixed(n)));
        Self::new(dims)
    }

    /// Per-record element shape (all dims after the leading one)
    pub fn element_shape(&self) -> Vec<usize> {
        self.dims
            .iter()
            .skip(1)
            .map(|d| match d {
                Dim::Fixed(n) => *n,
                Dim::Unlimited => 0,
            })
            .collect()
    }

    pub fn dims(&self) -> &[Dim] {
        &self.dims
    }
}

/// Chunk geometry: how many records share a chunk, plus the inner extents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkGeometry {
    pub leading: usize,
    pub inner: Vec<usize>,
}

impl ChunkGeometry {
    pub fn new(leading: usize, inner: Vec<usize>) -> Self {
        Self { leading, inner }
    }
}

/// Everything a store needs to lay out one growable array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArrayLayout {
    pub shape: ArrayShape,
    pub chunks: ChunkGeometry,
    pub dtype: DType,
}

impl ArrayLayout {
    pub fn new(shape: ArrayShape, chunks: ChunkGeometry, dtype: DType) -> Result<Self> {
        if chunks.leading == 0 {
            return Err(LockstepError::invalid_shape(
                "leading chunk extent must be at least 1",
            ));
        }
        let element = shape.element_shape();
        if chunks.inner != element {
            return Err(LockstepError::invalid_shape(format!(
                "chunk inner dims {:?} do not match element shape {:?}",
                chunks.inner, element
            )));
        }
        Ok(Self {
            shape,
            chunks,
            dtype,
        })
    }

    pub fn element_shape(&self) -> Vec<usize> {
        self.shape.element_shape()
    }

    /// Number of scalar items in one record
    pub fn element_count(&self) -> usize {
        self.chunks.inner.iter().product()
    }

    pub fn record_bytes(&self) -> usize {
        self.element_count() * self.dtype.item_size()
    }

    pub fn chunk_records(&self) -> u64 {
        self.chunks.leading as u64
    }
}
