//! Deterministic entry ownership.
//!
//! Entries are dealt to members in contiguous blocks of `block_size`, round
//! robin. Contiguous runs keep one member's writes inside the same storage
//! chunks; the rotation balances load across long runs.

use crate::core::errors::{LockstepError, Result};

/// Member responsible for writing `entry_number`:
/// `(entry_number / block_size) % group_size`.
pub fn owner_of(entry_number: u64, block_size: u64, group_size: usize) -> Result<usize> {
    if block_size == 0 {
        return Err(LockstepError::invalid_parameter(
            "block_size",
            "must be at least 1",
        ));
    }
    if group_size == 0 {
        return Err(LockstepError::invalid_parameter(
            "group_size",
            "must be at least 1",
        ));
    }
    let block = entry_number / block_size;
    Ok((block % group_size as u64) as usize)
}

/// Precomputed assignment for one member, used on hot paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    block_size: u64,
    group_size: usize,
    member_index: usize,
}

impl Assignment {
    pub fn new(block_size: u64, group_size: usize, member_index: usize) -> Result<Self> {
        // Validates both parameters
        owner_of(0, block_size, group_size)?;
        if member_index >= group_size {
            return Err(LockstepError::invalid_parameter(
                "member_index",
                format!("{} is not below group size {}", member_index, group_size),
            ));
        }
        Ok(Self {
            block_size,
            group_size,
            member_index,
        })
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn owns(&self, entry_number: u64) -> bool {
        (entry_number / self.block_size) % self.group_size as u64 == self.member_index as u64
    }

    /// Entries in `start..end` this member writes
    pub fn owned_in(&self, start: u64, end: u64) -> impl Iterator<Item = u64> + '_ {
        (start..end).filter(move |&e| self.owns(e))
    }
}
