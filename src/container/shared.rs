use crate::array::{ArrayLayout, ArrayPath, Record};
use crate::container::{ArrayContainerBackend, ArrayInfo, ArrayStore, CollectiveOp};
use crate::core::errors::{LockstepError, Result};
use crate::group::{GroupContext, GroupMember, Rendezvous};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// One container shared by every member of a group.
///
/// Metadata changes and resizes go through the rendezvous so they happen
/// once, after all members asked for exactly the same thing. Record writes
/// go straight to the store.
pub struct SharedContainer<S: ArrayStore> {
    id: Uuid,
    store: S,
    rendezvous: Rendezvous<CollectiveOp>,
}

impl<S: ArrayStore> SharedContainer<S> {
    pub fn new(store: S, group_size: usize) -> Result<Arc<Self>> {
        let rendezvous = Rendezvous::new(group_size)?;
        let id = Uuid::new_v4();
        info!(container = %id, group_size, "created shared container");
        Ok(Arc::new(Self {
            id,
            store,
            rendezvous,
        }))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn group_size(&self) -> usize {
        self.rendezvous.size()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn arrays(&self) -> Result<Vec<ArrayInfo>> {
        self.store.arrays()
    }

    /// Handle for member `index`
    pub fn member(self: &Arc<Self>, index: usize) -> Result<MemberContainer<S>> {
        let member = GroupMember::new(index, self.group_size())?;
        Ok(MemberContainer {
            shared: Arc::clone(self),
            member,
            closed: false,
        })
    }

    /// One handle per member, in member order
    pub fn members(self: &Arc<Self>) -> Result<Vec<MemberContainer<S>>> {
        (0..self.group_size()).map(|i| self.member(i)).collect()
    }

    /// Release every member blocked in, or later entering, a collective call
    pub fn abort<R: Into<String>>(&self, reason: R) {
        self.rendezvous.abort(reason);
    }

    pub fn is_aborted(&self) -> bool {
        self.rendezvous.is_aborted()
    }
}

/// A single member's view of a [`SharedContainer`]
pub struct MemberContainer<S: ArrayStore> {
    shared: Arc<SharedContainer<S>>,
    member: GroupMember,
    closed: bool,
}

impl<S: ArrayStore> MemberContainer<S> {
    pub fn shared(&self) -> &Arc<SharedContainer<S>> {
        &self.shared
    }

    fn ensure_open(&self, operation: &str) -> Result<()> {
        if self.closed {
            return Err(LockstepError::backend(operation, "container is closed"));
        }
        Ok(())
    }

    fn collective<F>(&self, op: CollectiveOp, apply: F) -> Result<()>
    where
        F: FnOnce(&S) -> Result<()>,
    {
        let store = &self.shared.store;
        self.shared
            .rendezvous
            .collective(self.member.member_index(), &op, || apply(store))
    }
}

impl<S: ArrayStore> GroupContext for MemberContainer<S> {
    fn member_index(&self) -> usize {
        self.member.member_index()
    }

    fn group_size(&self) -> usize {
        self.member.group_size()
    }
}

impl<S: ArrayStore> ArrayContainerBackend for MemberContainer<S> {
    fn create_group(&mut self, path: &ArrayPath) -> Result<()> {
        self.ensure_open("create_group")?;
        let op = CollectiveOp::CreateGroup { path: path.clone() };
        self.collective(op, |store| store.create_group(path))?;
        debug!(member = self.member.member_index(), path = %path, "created group");
        Ok(())
    }

    fn create_array(
        &mut self,
        path: &ArrayPath,
        layout: &ArrayLayout,
        initial_len: u64,
    ) -> Result<()> {
        self.ensure_open("create_array")?;
        let op = CollectiveOp::CreateArray {
            path: path.clone(),
            layout: layout.clone(),
            len: initial_len,
        };
        self.collective(op, |store| store.create_array(path, layout, initial_len))?;
        debug!(
            member = self.member.member_index(),
            path = %path,
            len = initial_len,
            "created array"
        );
        Ok(())
    }

    fn resize(&mut self, path: &ArrayPath, new_len: u64) -> Result<()> {
        self.ensure_open("resize")?;
        let op = CollectiveOp::Resize {
            path: path.clone(),
            len: new_len,
        };
        self.collective(op, |store| store.set_len(path, new_len))
    }

    fn write_slice(&mut self, path: &ArrayPath, index: u64, record: &Record) -> Result<()> {
        self.ensure_open("write_slice")?;
        self.shared.store.write_record(path, index, record)
    }

    fn read_slice(&self, path: &ArrayPath, index: u64) -> Result<Record> {
        self.shared.store.read_record(path, index)
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.collective(CollectiveOp::Close, |store| store.flush())?;
        self.closed = true;
        debug!(member = self.member.member_index(), "closed container");
        Ok(())
    }
}
