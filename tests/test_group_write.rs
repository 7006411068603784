//! Several members writing one container through the in-process group runtime.

use lockstep::{
    owner_of, run_group, run_member, ArrayPath, ArrayShape, ArraySchema, ArrayStore,
    ChunkGeometry, DType, DriverOptions, GroupContext, GrowableRegistry, LockstepError,
    MemoryStore, Record, RecordSource, Result, RunSummary, SharedContainer, WriterConfig,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

const GROWTH: u64 = 10;
const BLOCK: u64 = 4;

/// Same event stream on every member; every payload records who wrote it
struct Detector {
    member: usize,
    next: u64,
    end: u64,
    extra_array: bool,
}

impl Detector {
    fn new(member: usize, end: u64) -> Self {
        Self {
            member,
            next: 0,
            end,
            extra_array: false,
        }
    }
}

impl RecordSource for Detector {
    type Event = u64;

    fn next_event(&mut self) -> Result<Option<u64>> {
        if self.next >= self.end {
            return Ok(None);
        }
        self.next += 1;
        Ok(Some(self.next - 1))
    }

    fn keep(&self, event: &u64) -> bool {
        // every fifth shot is a dark frame
        event % 5 != 4
    }

    fn schemas(&mut self, _first: &u64) -> Result<Vec<ArraySchema>> {
        let mut schemas = vec![
            ArraySchema::new(
                "/entry_1/data_1/frame",
                ArrayShape::growable(&[2, 3])?,
                ChunkGeometry::new(8, vec![2, 3]),
                DType::F32,
            ),
            ArraySchema::new(
                "/entry_1/event/eventnum",
                ArrayShape::growable(&[])?,
                ChunkGeometry::new(16, vec![]),
                DType::U64,
            ),
            ArraySchema::new(
                "/entry_1/event/writer",
                ArrayShape::growable(&[])?,
                ChunkGeometry::new(16, vec![]),
                DType::I32,
            ),
        ];
        if self.extra_array {
            schemas.push(ArraySchema::new(
                "/entry_1/event/debug",
                ArrayShape::growable(&[])?,
                ChunkGeometry::new(16, vec![]),
                DType::U8,
            ));
        }
        Ok(schemas)
    }

    fn records(&mut self, event: &u64, _entry: u64) -> Result<Vec<Record>> {
        let frame: Vec<f32> = (0..6).map(|i| (*event * 10 + i) as f32).collect();
        let mut records = vec![
            Record::new(vec![2, 3], frame)?,
            Record::scalar(vec![*event])?,
            Record::scalar(vec![self.member as i32])?,
        ];
        if self.extra_array {
            records.push(Record::scalar(vec![1u8])?);
        }
        Ok(records)
    }
}

fn path(s: &str) -> ArrayPath {
    ArrayPath::parse(s).unwrap()
}

async fn write_group(
    group_size: usize,
    events: u64,
) -> (Arc<SharedContainer<MemoryStore>>, Vec<RunSummary>) {
    let shared = SharedContainer::new(MemoryStore::new(), group_size).unwrap();
    let summaries = run_group(shared.clone(), move |member| {
        let index = member.member_index();
        let mut registry = GrowableRegistry::for_member(member, WriterConfig::new(GROWTH, BLOCK))?;
        let mut source = Detector::new(index, events);
        run_member(&mut registry, &mut source, &DriverOptions::default())
    })
    .await
    .unwrap();
    (shared, summaries)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_entry_written_by_its_owner() {
    let (shared, summaries) = write_group(3, 59).await;
    // 59 shots, 11 dark frames dropped
    let entries = 48;

    assert_eq!(summaries.len(), 3);
    for summary in &summaries {
        assert_eq!(summary.events, 59);
        assert_eq!(summary.entries, entries);
    }
    let total = RunSummary::combine(&summaries).unwrap();
    assert_eq!(total.entries_written, entries);

    let store = shared.store();
    for array in store.arrays().unwrap() {
        assert_eq!(array.len, entries, "{}", array.path);
    }

    let kept: Vec<u64> = (0..59).filter(|e| e % 5 != 4).collect();
    for (entry, event) in kept.iter().enumerate() {
        let entry = entry as u64;
        let owner = owner_of(entry, BLOCK, 3).unwrap() as i32;
        assert_eq!(
            store
                .read_record(&path("/entry_1/event/writer"), entry)
                .unwrap(),
            Record::scalar(vec![owner]).unwrap(),
            "entry {}",
            entry
        );
        assert_eq!(
            store
                .read_record(&path("/entry_1/event/eventnum"), entry)
                .unwrap(),
            Record::scalar(vec![*event]).unwrap()
        );
        let frame = store
            .read_record(&path("/entry_1/data_1/frame"), entry)
            .unwrap();
        assert_eq!(frame.shape(), &[2, 3]);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_member_writes_split_by_block() {
    let (_shared, summaries) = write_group(2, 20).await;
    // 16 entries, blocks of 4 alternate between the two members
    let written: Vec<u64> = summaries.iter().map(|s| s.entries_written).collect();
    assert_eq!(written, vec![8, 8]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_group_larger_than_entries() {
    let (shared, summaries) = write_group(4, 3).await;
    let written: Vec<u64> = summaries.iter().map(|s| s.entries_written).collect();
    assert_eq!(written, vec![3, 0, 0, 0]);
    for array in shared.store().arrays().unwrap() {
        assert_eq!(array.len, 3);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_divergent_schema_aborts_group() {
    let shared = SharedContainer::new(MemoryStore::new(), 3).unwrap();
    let err = run_group(shared.clone(), |member| {
        let index = member.member_index();
        let mut registry = GrowableRegistry::for_member(member, WriterConfig::new(GROWTH, BLOCK))?;
        let mut source = Detector::new(index, 30);
        source.extra_array = index == 1;
        run_member(&mut registry, &mut source, &DriverOptions::default())
    })
    .await
    .unwrap_err();

    assert!(matches!(err, LockstepError::CollectiveMismatch { .. }), "{}", err);
    assert!(shared.is_aborted());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_divergent_stream_length_caught_at_finalize() {
    let shared = SharedContainer::new(MemoryStore::new(), 3).unwrap();
    let err = run_group(shared.clone(), |member| {
        let index = member.member_index();
        let mut registry = GrowableRegistry::for_member(member, WriterConfig::new(GROWTH, BLOCK))?;
        // member 0 sees one more kept shot than the others
        let end = if index == 0 { 22 } else { 21 };
        let mut source = Detector::new(index, end);
        run_member(&mut registry, &mut source, &DriverOptions::default())
    })
    .await
    .unwrap_err();

    assert!(matches!(err, LockstepError::CollectiveMismatch { .. }), "{}", err);
}
