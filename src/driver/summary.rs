use crate::core::errors::Result;
use crate::group::{GroupContext, GroupMember};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const MIB: f64 = 1024.0 * 1024.0;

/// What one member did during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub member: usize,
    pub group_size: usize,
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    /// Source events seen, kept or not
    pub events: u64,
    /// Entries in the container (same on every member)
    pub entries: u64,
    /// Entries this member wrote
    pub entries_written: u64,
    pub bytes_written: u64,
    pub entries_per_sec: f64,
    pub mb_per_sec: f64,
}

impl RunSummary {
    pub fn new(
        member: GroupMember,
        started_at: DateTime<Utc>,
        elapsed: Duration,
        events: u64,
        entries: u64,
        entries_written: u64,
        bytes_written: u64,
    ) -> Self {
        let secs = elapsed.as_secs_f64();
        let per_sec = |x: f64| if secs > 0.0 { x / secs } else { 0.0 };
        Self {
            member: member.member_index(),
            group_size: member.group_size(),
            started_at,
            elapsed_secs: secs,
            events,
            entries,
            entries_written,
            bytes_written,
            entries_per_sec: per_sec(entries as f64),
            mb_per_sec: per_sec(bytes_written as f64 / MIB),
        }
    }

    /// Fold the per-member summaries of one run into group totals
    pub fn combine(summaries: &[RunSummary]) -> Option<RunSummary> {
        let first = summaries.first()?;
        let elapsed_secs = summaries
            .iter()
            .map(|s| s.elapsed_secs)
            .fold(0.0, f64::max);
        let written: u64 = summaries.iter().map(|s| s.entries_written).sum();
        let bytes: u64 = summaries.iter().map(|s| s.bytes_written).sum();
        let per_sec = |x: f64| {
            if elapsed_secs > 0.0 {
                x / elapsed_secs
            } else {
                0.0
            }
        };
        Some(RunSummary {
            member: first.member,
            group_size: first.group_size,
            started_at: summaries
                .iter()
                .map(|s| s.started_at)
                .min()
                .unwrap_or(first.started_at),
            elapsed_secs,
            events: first.events,
            entries: first.entries,
            entries_written: written,
            bytes_written: bytes,
            entries_per_sec: per_sec(first.entries as f64),
            mb_per_sec: per_sec(bytes as f64 / MIB),
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
