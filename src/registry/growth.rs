//! Lock-step capacity growth.
//!
//! Every member feeds the same entry numbers through the same clock, so every
//! member reaches the same resize decision at the same entry without talking
//! to the others. The backend's collective resize is the only point where
//! members meet.

use super::{GrowableRegistry, Lifecycle};
use crate::container::ArrayContainerBackend;
use crate::core::errors::{LockstepError, Result};
use crate::group::GroupContext;
use tracing::debug;

/// What the clock decided for one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowthStep {
    /// Current capacity already covers the entry
    Sufficient,
    /// Every array must grow from `from` to `to`
    Grow { from: u64, to: u64 },
}

/// Shared growth clock: increment `G` and next threshold `T`.
///
/// `T` starts at `G` and only ever moves by `G`, so it is always a multiple
/// of `G`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrowthClock {
    increment: u64,
    threshold: u64,
    last_entry: Option<u64>,
}

impl GrowthClock {
    pub fn new(increment: u64) -> Self {
        Self {
            increment,
            threshold: increment,
            last_entry: None,
        }
    }

    pub fn increment(&self) -> u64 {
        self.increment
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Decide what `entry` needs without changing the clock
    pub fn step(&self, entry: u64) -> Result<GrowthStep> {
        let backwards = self.last_entry.is_some_and(|prev| entry < prev);
        if entry > self.threshold || backwards {
            return Err(LockstepError::OutOfOrderEntry {
                entry,
                previous: self.last_entry,
                threshold: self.threshold,
            });
        }
        if entry < self.threshold {
            return Ok(GrowthStep::Sufficient);
        }
        Ok(GrowthStep::Grow {
            from: self.threshold,
            to: self.threshold + self.increment,
        })
    }

    /// Record that `entry` was handled with `step`
    fn commit(&mut self, entry: u64, step: GrowthStep) {
        if let GrowthStep::Grow { to, .. } = step {
            self.threshold = to;
        }
        self.last_entry = Some(entry);
    }
}

impl<B: ArrayContainerBackend> GrowableRegistry<B> {
    /// Make sure every array can hold `entry_number`.
    ///
    /// Collective: all members call this for every entry, in increasing
    /// order starting at 0, including entries they will not write. When
    /// `entry_number` reaches the threshold, every array grows by one
    /// increment; otherwise nothing happens.
    pub fn ensure_capacity(&mut self, entry_number: u64) -> Result<()> {
        match self.state {
            Lifecycle::Sealed => return Err(LockstepError::closed("ensure_capacity")),
            Lifecycle::Open => {
                return Err(LockstepError::NotWritable {
                    operation: "ensure_capacity".to_string(),
                })
            }
            Lifecycle::Writable => {}
        }

        let step = self.clock.step(entry_number)?;
        if let GrowthStep::Grow { from, to } = step {
            // Verify before touching anything so a mismatch leaves no array half-grown
            if let Some(stale) = self.arrays.iter().find(|a| a.len != from) {
                return Err(LockstepError::LengthMismatch {
                    path: stale.path.to_string(),
                    expected: from,
                    actual: stale.len,
                });
            }
            for array in &mut self.arrays {
                self.backend.resize(&array.path, to)?;
                array.len = to;
                debug!(
                    member = self.member.member_index(),
                    path = %array.path,
                    entry = entry_number,
                    len = to,
                    "resized array"
                );
            }
        }
        self.clock.commit(entry_number, step);
        Ok(())
    }
}
