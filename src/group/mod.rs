//! Group membership and the in-process group runtime.
//!
//! A group is a fixed set of N writers. Members share nothing but the
//! container and the sequence of entry numbers they iterate.

pub mod assign;
pub mod rendezvous;
pub mod runner;

pub use assign::{owner_of, Assignment};
pub use rendezvous::Rendezvous;
pub use runner::run_group;

use crate::core::errors::{LockstepError, Result};
use serde::{Deserialize, Serialize};

/// Identity of one member within its group
pub trait GroupContext {
    fn member_index(&self) -> usize;
    fn group_size(&self) -> usize;

    fn member(&self) -> GroupMember {
        GroupMember {
            index: self.member_index(),
            size: self.group_size(),
        }
    }
}

/// Immutable (member index, group size) pair fixed for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupMember {
    index: usize,
    size: usize,
}

impl GroupMember {
    pub fn new(index: usize, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(LockstepError::invalid_parameter(
                "group_size",
                "must be at least 1",
            ));
        }
        if index >= size {
            return Err(LockstepError::invalid_parameter(
                "member_index",
                format!("{} is not below group size {}", index, size),
            ));
        }
        Ok(Self { index, size })
    }

    /// The only member of a group of one
    pub fn solo() -> Self {
        Self { index: 0, size: 1 }
    }
}

impl GroupContext for GroupMember {
    fn member_index(&self) -> usize {
        self.index
    }

    fn group_size(&self) -> usize {
        self.size
    }
}
