//! Member driver loop.
//!
//! Walks a record source, turns kept events into consecutive entry numbers,
//! grows the arrays in lock step and writes the entries this member owns.
//! Every member runs the same loop over the same event stream.

pub mod summary;

pub use summary::RunSummary;

use crate::array::{ArrayShape, ChunkGeometry, DType, Record};
use crate::container::ArrayContainerBackend;
use crate::core::config::DriverOptions;
use crate::core::errors::{LockstepError, Result};
use crate::group::GroupContext;
use crate::registry::{ArrayHandle, GrowableRegistry};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Declaration of one growable array a source produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArraySchema {
    pub path: String,
    pub shape: ArrayShape,
    pub chunks: ChunkGeometry,
    pub dtype: DType,
}

impl ArraySchema {
    pub fn new<P: Into<String>>(
        path: P,
        shape: ArrayShape,
        chunks: ChunkGeometry,
        dtype: DType,
    ) -> Self {
        Self {
            path: path.into(),
            shape,
            chunks,
            dtype,
        }
    }
}

/// Upstream supplier of events and their payloads.
///
/// Every member must see the same event sequence, and `keep` must give the
/// same answer on every member, otherwise entry numbers drift apart.
pub trait RecordSource {
    type Event;

    /// Next event, or `None` when the stream is exhausted
    fn next_event(&mut self) -> Result<Option<Self::Event>>;

    /// Whether the event becomes an entry
    fn keep(&self, _event: &Self::Event) -> bool {
        true
    }

    /// Arrays to create, asked once with the first kept event
    fn schemas(&mut self, first: &Self::Event) -> Result<Vec<ArraySchema>>;

    /// One record per schema, in schema order. Only called for owned entries.
    fn records(&mut self, event: &Self::Event, entry: u64) -> Result<Vec<Record>>;
}

/// Drive `source` through `registry` to the end, then trim and close.
pub fn run_member<B, S>(
    registry: &mut GrowableRegistry<B>,
    source: &mut S,
    options: &DriverOptions,
) -> Result<RunSummary>
where
    B: ArrayContainerBackend,
    S: RecordSource,
{
    let member = registry.member();
    let started_at = Utc::now();
    let t0 = Instant::now();

    let mut events = 0u64;
    let mut entries = 0u64;
    let mut written = 0u64;
    let mut bytes = 0u64;
    let mut handles: Option<Vec<ArrayHandle>> = None;

    while let Some(event) = source.next_event()? {
        if options.max_events > 0 && events >= options.max_events {
            break;
        }
        events += 1;
        if options.progress_every > 0 && events % options.progress_every == 0 {
            let secs = t0.elapsed().as_secs_f64();
            info!(
                member = member.member_index(),
                events,
                entries,
                rate_hz = if secs > 0.0 { events as f64 / secs } else { 0.0 },
                "progress"
            );
        }
        if !source.keep(&event) {
            continue;
        }
        let entry = entries;
        entries += 1;

        if handles.is_none() {
            handles = Some(create_arrays(registry, source, &event)?);
        }
        let array_handles = handles.as_deref().unwrap_or_default();

        registry.ensure_capacity(entry)?;
        if !registry.owns(entry) {
            continue;
        }

        let records = source.records(&event, entry)?;
        if records.len() != array_handles.len() {
            return Err(LockstepError::invalid_parameter(
                "records",
                format!(
                    "source produced {} records for {} arrays",
                    records.len(),
                    array_handles.len()
                ),
            ));
        }
        debug!(member = member.member_index(), entry, "writing entry");
        for (handle, record) in array_handles.iter().zip(&records) {
            registry.write(*handle, entry, record)?;
            bytes += record.byte_len() as u64;
        }
        written += 1;
    }

    registry.finalize(entries)?;
    registry.close()?;

    let summary = RunSummary::new(
        member,
        started_at,
        t0.elapsed(),
        events,
        entries,
        written,
        bytes,
    );
    info!(
        member = member.member_index(),
        entries,
        written,
        rate_hz = summary.entries_per_sec,
        mb_per_sec = summary.mb_per_sec,
        "member finished"
    );
    Ok(summary)
}

fn create_arrays<B, S>(
    registry: &mut GrowableRegistry<B>,
    source: &mut S,
    first: &S::Event,
) -> Result<Vec<ArrayHandle>>
where
    B: ArrayContainerBackend,
    S: RecordSource,
{
    source
        .schemas(first)?
        .into_iter()
        .map(|schema| registry.create(&schema.path, schema.shape, schema.chunks, schema.dtype))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{MemoryStore, SharedContainer};
    use crate::core::config::WriterConfig;

    /// Counts upward; odd events are dropped
    struct Counter {
        next: u64,
        end: u64,
    }

    impl RecordSource for Counter {
        type Event = u64;

        fn next_event(&mut self) -> Result<Option<u64>> {
            if self.next == self.end {
                return Ok(None);
            }
            self.next += 1;
            Ok(Some(self.next - 1))
        }

        fn keep(&self, event: &u64) -> bool {
            event % 2 == 0
        }

        fn schemas(&mut self, _first: &u64) -> Result<Vec<ArraySchema>> {
            Ok(vec![ArraySchema::new(
                "/entry/eventnum",
                ArrayShape::growable(&[])?,
                ChunkGeometry::new(16, vec![]),
                DType::U64,
            )])
        }

        fn records(&mut self, event: &u64, _entry: u64) -> Result<Vec<Record>> {
            Ok(vec![Record::scalar(vec![*event])?])
        }
    }

    fn solo() -> GrowableRegistry<crate::container::MemberContainer<MemoryStore>> {
        let shared = SharedContainer::new(MemoryStore::new(), 1).unwrap();
        GrowableRegistry::for_member(shared.member(0).unwrap(), WriterConfig::new(4, 2)).unwrap()
    }

    #[test]
    fn test_kept_events_become_entries() {
        let mut reg = solo();
        let mut source = Counter { next: 0, end: 21 };
        let summary = run_member(&mut reg, &mut source, &DriverOptions::default()).unwrap();

        assert_eq!(summary.events, 21);
        assert_eq!(summary.entries, 11);
        assert_eq!(summary.entries_written, 11);
        assert_eq!(summary.bytes_written, 88);

        let h = reg.handle_of("/entry/eventnum").unwrap();
        assert_eq!(reg.len(h).unwrap(), 11);
        assert_eq!(reg.read(h, 5).unwrap(), Record::scalar(vec![10u64]).unwrap());
        assert!(reg.is_sealed());
    }

    #[test]
    fn test_max_events_stops_early() {
        let mut reg = solo();
        let mut source = Counter { next: 0, end: 100 };
        let options = DriverOptions::default().with_max_events(10);
        let summary = run_member(&mut reg, &mut source, &options).unwrap();
        assert_eq!(summary.events, 10);
        assert_eq!(summary.entries, 5);
    }

    #[test]
    fn test_empty_stream_creates_nothing() {
        let mut reg = solo();
        let mut source = Counter { next: 0, end: 0 };
        let summary = run_member(&mut reg, &mut source, &DriverOptions::default()).unwrap();
        assert_eq!(summary.entries, 0);
        assert!(reg.is_empty());
        assert!(reg.is_sealed());
    }
}
