//! Container backends.
//!
//! The registry only talks to [`ArrayContainerBackend`], a narrow capability
//! interface. The concrete backend here is [`MemberContainer`]: one member's
//! handle onto a [`SharedContainer`], which runs collective operations
//! through a rendezvous and applies them once to an [`ArrayStore`].

pub mod memory;
pub mod shared;
pub mod sled_store;

pub use memory::MemoryStore;
pub use shared::{MemberContainer, SharedContainer};
pub use sled_store::SledStore;

use crate::array::{ArrayLayout, ArrayPath, Record};
use crate::core::errors::{LockstepError, Result};

/// Primitives the growable-array registry needs from a container.
///
/// `create_group`, `create_array`, `resize` and `close` are collective: every
/// member of the group must issue the same call with the same arguments, and
/// the call blocks until they all have. `write_slice` and `read_slice` are
/// local.
pub trait ArrayContainerBackend {
    fn create_group(&mut self, path: &ArrayPath) -> Result<()>;

    fn create_array(
        &mut self,
        path: &ArrayPath,
        layout: &ArrayLayout,
        initial_len: u64,
    ) -> Result<()>;

    /// Set the leading extent of an array, growing or shrinking it
    fn resize(&mut self, path: &ArrayPath, new_len: u64) -> Result<()>;

    fn write_slice(&mut self, path: &ArrayPath, index: u64, record: &Record) -> Result<()>;

    fn read_slice(&self, path: &ArrayPath, index: u64) -> Result<Record>;

    fn close(&mut self) -> Result<()>;
}

/// Summary of one stored array
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayInfo {
    pub path: ArrayPath,
    pub layout: ArrayLayout,
    pub len: u64,
}

/// Storage engine underneath a shared container. Not collective: a store
/// does whatever it is told, once.
pub trait ArrayStore: Send + Sync {
    fn create_group(&self, path: &ArrayPath) -> Result<()>;

    fn create_array(&self, path: &ArrayPath, layout: &ArrayLayout, len: u64) -> Result<()>;

    fn set_len(&self, path: &ArrayPath, len: u64) -> Result<()>;

    fn len(&self, path: &ArrayPath) -> Result<u64>;

    fn layout(&self, path: &ArrayPath) -> Result<ArrayLayout>;

    fn write_record(&self, path: &ArrayPath, index: u64, record: &Record) -> Result<()>;

    /// Slots never written read back zero-filled
    fn read_record(&self, path: &ArrayPath, index: u64) -> Result<Record>;

    fn has_group(&self, path: &ArrayPath) -> bool;

    /// All arrays, ordered by path
    fn arrays(&self) -> Result<Vec<ArrayInfo>>;

    fn flush(&self) -> Result<()>;
}

/// Operations that need every member's participation
#[derive(Debug, Clone, PartialEq)]
pub enum CollectiveOp {
    CreateGroup { path: ArrayPath },
    CreateArray {
        path: ArrayPath,
        layout: ArrayLayout,
        len: u64,
    },
    Resize { path: ArrayPath, len: u64 },
    Close,
}

pub(crate) fn check_index(path: &ArrayPath, index: u64, len: u64) -> Result<()> {
    if index >= len {
        return Err(LockstepError::OutOfBounds {
            path: path.to_string(),
            index,
            len,
        });
    }
    Ok(())
}

pub(crate) fn check_record(path: &ArrayPath, layout: &ArrayLayout, record: &Record) -> Result<()> {
    let expected = layout.element_shape();
    if record.shape() != expected.as_slice() {
        return Err(LockstepError::ShapeMismatch {
            path: path.to_string(),
            expected,
            actual: record.shape().to_vec(),
        });
    }
    if record.dtype() != layout.dtype {
        return Err(LockstepError::DTypeMismatch {
            path: path.to_string(),
            expected: layout.dtype.to_string(),
            actual: record.dtype().to_string(),
        });
    }
    Ok(())
}
