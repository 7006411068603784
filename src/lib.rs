//! Coordinated growable arrays for a fixed group of cooperating writers.
//!
//! Members append records into chunked arrays in one shared container. Each
//! member decides locally which entries it writes ([`group::owner_of`]) and
//! when every array grows ([`GrowableRegistry::ensure_capacity`]); the same
//! math on every member keeps the collective resizes in step without any
//! extra messages.

// Core infrastructure modules
pub mod core {
    pub mod config;
    pub mod errors;
}

pub mod array;
pub mod container;
pub mod driver;
pub mod group;
pub mod registry;
pub mod telemetry;

// Re-exports for convenience
pub use crate::core::config::{DriverOptions, WriterConfig};
pub use crate::core::errors::{LockstepError, Result};
pub use array::{ArrayData, ArrayLayout, ArrayPath, ArrayShape, ChunkGeometry, DType, Dim, Record};
pub use container::{
    ArrayContainerBackend, ArrayInfo, ArrayStore, MemberContainer, MemoryStore, SharedContainer,
    SledStore,
};
pub use driver::{run_member, ArraySchema, RecordSource, RunSummary};
pub use group::{owner_of, run_group, Assignment, GroupContext, GroupMember};
pub use registry::{ArrayHandle, GrowableArray, GrowableRegistry, Lifecycle};
