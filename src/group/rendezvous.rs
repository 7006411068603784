//! In-process collective calls.
//!
//! Every member submits the same operation; the last one to arrive applies
//! it once and releases the others with the shared outcome. A member that
//! submits a different operation breaks the group: the rendezvous is marked
//! aborted and every waiting or later caller fails instead of blocking.

use crate::core::errors::{LockstepError, Result};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use tracing::{debug, warn};

#[derive(Debug)]
struct RoundState<Op> {
    generation: u64,
    arrived: usize,
    pending: Option<Op>,
    /// Outcome of the most recently completed round
    last: Option<(u64, std::result::Result<(), String>)>,
    aborted: Option<String>,
}

#[derive(Debug)]
pub struct Rendezvous<Op> {
    size: usize,
    state: Mutex<RoundState<Op>>,
    cond: Condvar,
}

impl<Op: Clone + PartialEq + fmt::Debug> Rendezvous<Op> {
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(LockstepError::invalid_parameter(
                "group_size",
                "must be at least 1",
            ));
        }
        Ok(Self {
            size,
            state: Mutex::new(RoundState {
                generation: 0,
                arrived: 0,
                pending: None,
                last: None,
                aborted: None,
            }),
            cond: Condvar::new(),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Join the current round with `op`. Blocks until all members joined.
    ///
    /// `apply` runs exactly once per round, on the last member to arrive.
    pub fn collective<F>(&self, member: usize, op: &Op, apply: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        let mut state = self.state.lock();
        if let Some(reason) = &state.aborted {
            return Err(LockstepError::GroupAborted {
                reason: reason.clone(),
            });
        }

        let mismatch = match &state.pending {
            Some(expected) if expected != op => Some(format!("{:?}", expected)),
            _ => None,
        };
        if let Some(expected) = mismatch {
            let err = LockstepError::CollectiveMismatch {
                member,
                expected,
                actual: format!("{:?}", op),
            };
            warn!(member, error = %err, "collective mismatch, aborting group");
            state.aborted = Some(err.to_string());
            self.cond.notify_all();
            return Err(err);
        }
        if state.pending.is_none() {
            state.pending = Some(op.clone());
        }

        state.arrived += 1;
        let generation = state.generation;

        if state.arrived == self.size {
            let outcome = apply();
            debug!(generation, op = ?op, ok = outcome.is_ok(), "collective applied");
            state.last = Some((
                generation,
                outcome.as_ref().map(|_| ()).map_err(|e| e.to_string()),
            ));
            state.arrived = 0;
            state.pending = None;
            state.generation += 1;
            self.cond.notify_all();
            return outcome;
        }

        while state.generation == generation && state.aborted.is_none() {
            self.cond.wait(&mut state);
        }

        // A completed round wins over a later abort
        if state.generation == generation {
            let reason = state.aborted.clone().unwrap_or_default();
            return Err(LockstepError::GroupAborted { reason });
        }
        match &state.last {
            Some((done, Ok(()))) if *done == generation => Ok(()),
            Some((done, Err(message))) if *done == generation => {
                Err(LockstepError::backend(format!("{:?}", op), message.clone()))
            }
            // Later rounds cannot finish while this member is still inside this one
            _ => Err(LockstepError::internal(format!(
                "collective round {} outcome lost",
                generation
            ))),
        }
    }

    /// Fail every current and future collective call
    pub fn abort<S: Into<String>>(&self, reason: S) {
        let mut state = self.state.lock();
        if state.aborted.is_none() {
            let reason = reason.into();
            warn!(reason = %reason, "aborting group");
            state.aborted = Some(reason);
        }
        self.cond.notify_all();
    }

    pub fn is_aborted(&self) -> bool {
        self.state.lock().aborted.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_single_member_applies_immediately() {
        let rv = Rendezvous::new(1).unwrap();
        let applied = AtomicUsize::new(0);
        rv.collective(0, &7u64, || {
            applied.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        assert_eq!(applied.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_apply_runs_once_per_round() {
        let rv = Arc::new(Rendezvous::new(4).unwrap());
        let applied = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|member| {
                let rv = rv.clone();
                let applied = applied.clone();
                thread::spawn(move || {
                    for round in 0..25u64 {
                        let applied = applied.clone();
                        rv.collective(member, &round, move || {
                            applied.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        })
                        .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(applied.load(Ordering::SeqCst), 25);
    }

    #[test]
    fn test_mismatch_aborts_waiters() {
        let rv = Arc::new(Rendezvous::new(2).unwrap());
        let waiter = {
            let rv = rv.clone();
            thread::spawn(move || rv.collective(0, &10u64, || Ok(())))
        };
        // Wait for member 0 to be parked in the round
        while rv.state.lock().arrived == 0 {
            thread::yield_now();
        }
        let err = rv.collective(1, &20u64, || Ok(())).unwrap_err();
        assert!(matches!(err, LockstepError::CollectiveMismatch { member: 1, .. }));

        let err = waiter.join().unwrap().unwrap_err();
        assert!(matches!(err, LockstepError::GroupAborted { .. }));
        assert!(rv.is_aborted());
        assert!(rv.collective(0, &30u64, || Ok(())).is_err());
    }

    #[test]
    fn test_failed_apply_reaches_every_member() {
        let rv = Arc::new(Rendezvous::new(2).unwrap());
        let waiter = {
            let rv = rv.clone();
            thread::spawn(move || {
                rv.collective(0, &1u64, || Err(LockstepError::backend("resize", "disk full")))
            })
        };
        let other = rv.collective(1, &1u64, || Err(LockstepError::backend("resize", "disk full")));
        let first = waiter.join().unwrap();
        assert!(first.is_err());
        assert!(other.is_err());
    }
}
