//! Array model: paths, layouts and record payloads.

pub mod layout;
pub mod path;
pub mod record;

pub use layout::{ArrayLayout, ArrayShape, ChunkGeometry, Dim};
pub use path::ArrayPath;
pub use record::{ArrayData, DType, Record};
