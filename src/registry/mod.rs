//! Registry of growable arrays.
//!
//! The registry owns every array's metadata and the growth clock. All arrays
//! share one allocated length, which only moves in [`GrowableRegistry::ensure_capacity`]
//! and [`GrowableRegistry::finalize`].
//!
//! # Symmetric control flow
//!
//! `create`, `ensure_capacity`, `finalize` and `close` issue collective
//! backend calls. Every member of the group must make the same sequence of
//! these calls with the same arguments, whether or not it owns the entries
//! involved. Branching on the member index around these calls deadlocks or
//! aborts the group. Only `write` is restricted to the owning member.

pub mod growth;
pub mod lifecycle;

pub use growth::GrowthClock;
pub use lifecycle::Lifecycle;

use crate::array::{ArrayLayout, ArrayPath, ArrayShape, ChunkGeometry, DType, Record};
use crate::container::{check_index, check_record, ArrayContainerBackend};
use crate::core::config::WriterConfig;
use crate::core::errors::{LockstepError, Result};
use crate::group::{Assignment, GroupContext, GroupMember};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

/// Index of an array in the registry, in creation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArrayHandle(usize);

impl ArrayHandle {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A registered growable array
#[derive(Debug, Clone, PartialEq)]
pub struct GrowableArray {
    pub path: ArrayPath,
    pub layout: ArrayLayout,
    /// Allocated length of the leading dimension
    pub len: u64,
}

pub struct GrowableRegistry<B: ArrayContainerBackend> {
    backend: B,
    member: GroupMember,
    assignment: Assignment,
    config: WriterConfig,
    clock: GrowthClock,
    arrays: Vec<GrowableArray>,
    by_path: HashMap<ArrayPath, ArrayHandle>,
    groups: BTreeSet<ArrayPath>,
    state: Lifecycle,
    backend_closed: bool,
}

impl<B: ArrayContainerBackend> GrowableRegistry<B> {
    pub fn new<G: GroupContext>(backend: B, group: &G, config: WriterConfig) -> Result<Self> {
        config.validate()?;
        let member = GroupMember::new(group.member_index(), group.group_size())?;
        let assignment = Assignment::new(
            config.block_size,
            member.group_size(),
            member.member_index(),
        )?;
        Ok(Self {
            backend,
            member,
            assignment,
            clock: GrowthClock::new(config.growth_increment),
            config,
            arrays: Vec::new(),
            by_path: HashMap::new(),
            groups: BTreeSet::new(),
            state: Lifecycle::Open,
            backend_closed: false,
        })
    }

    /// Registry for a backend that knows its own group membership
    pub fn for_member(backend: B, config: WriterConfig) -> Result<Self>
    where
        B: GroupContext,
    {
        let member = backend.member();
        Self::new(backend, &member, config)
    }

    /// Register a new growable array at `path`.
    ///
    /// Missing parent groups are created. The array starts at one growth
    /// increment and is back-filled to the current threshold, so arrays
    /// created after growth already happened line up with the others.
    pub fn create(
        &mut self,
        path: &str,
        shape: ArrayShape,
        chunks: ChunkGeometry,
        dtype: DType,
    ) -> Result<ArrayHandle> {
        if self.state == Lifecycle::Sealed {
            return Err(LockstepError::closed("create"));
        }
        let path = ArrayPath::parse(path)?;
        if self.by_path.contains_key(&path) || self.groups.contains(&path) {
            return Err(LockstepError::DuplicatePath {
                path: path.to_string(),
            });
        }
        let ancestors = path.ancestors();
        if let Some(array_parent) = ancestors.iter().find(|a| self.by_path.contains_key(*a)) {
            return Err(LockstepError::invalid_path(
                path.to_string(),
                format!("{} is an array, not a group", array_parent),
            ));
        }
        let layout = ArrayLayout::new(shape, chunks, dtype)?;

        for group in ancestors {
            if self.groups.contains(&group) {
                continue;
            }
            self.backend.create_group(&group)?;
            debug!(member = self.member.member_index(), group = %group, "created group node");
            self.groups.insert(group);
        }

        let increment = self.clock.increment();
        let threshold = self.clock.threshold();
        self.backend.create_array(&path, &layout, increment)?;
        if threshold > increment {
            self.backend
                .resize(&path, threshold)
                .map_err(|e| LockstepError::CreateAfterGrowth {
                    path: path.to_string(),
                    threshold,
                    source: Box::new(e),
                })?;
            debug!(path = %path, threshold, "back-filled late array");
        }

        let handle = ArrayHandle(self.arrays.len());
        info!(
            member = self.member.member_index(),
            path = %path,
            element_shape = ?layout.element_shape(),
            dtype = %layout.dtype,
            len = threshold,
            "created growable array"
        );
        self.by_path.insert(path.clone(), handle);
        self.arrays.push(GrowableArray {
            path,
            layout,
            len: threshold,
        });
        self.state = Lifecycle::Writable;
        Ok(handle)
    }

    /// Write one record at `index`. Local; only the owner of the entry calls it.
    pub fn write(&mut self, handle: ArrayHandle, index: u64, record: &Record) -> Result<()> {
        if self.state == Lifecycle::Sealed {
            return Err(LockstepError::closed("write"));
        }
        let array = self.array(handle)?;
        check_index(&array.path, index, array.len)?;
        check_record(&array.path, &array.layout, record)?;
        let path = array.path.clone();
        self.backend.write_slice(&path, index, record)
    }

    /// Read back the record at `index`
    pub fn read(&self, handle: ArrayHandle, index: u64) -> Result<Record> {
        let array = self.array(handle)?;
        check_index(&array.path, index, array.len)?;
        self.backend.read_slice(&array.path, index)
    }

    pub fn array(&self, handle: ArrayHandle) -> Result<&GrowableArray> {
        self.arrays
            .get(handle.0)
            .ok_or_else(|| LockstepError::UnknownArray {
                path: format!("<handle {}>", handle.0),
            })
    }

    pub fn handle_of(&self, path: &str) -> Option<ArrayHandle> {
        let path = ArrayPath::parse(path).ok()?;
        self.by_path.get(&path).copied()
    }

    pub fn len(&self, handle: ArrayHandle) -> Result<u64> {
        Ok(self.array(handle)?.len)
    }

    /// Registered arrays in creation order
    pub fn arrays(&self) -> &[GrowableArray] {
        &self.arrays
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    /// Whether this member writes `entry_number`
    pub fn owns(&self, entry_number: u64) -> bool {
        self.assignment.owns(entry_number)
    }

    pub fn member(&self) -> GroupMember {
        self.member
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    pub fn threshold(&self) -> u64 {
        self.clock.threshold()
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}
