use anyhow::{Context, Result};
use lockstep::{
    run_group, run_member, ArrayShape, ArraySchema, ChunkGeometry, DType, DriverOptions,
    GrowableRegistry, Record, RecordSource, RunSummary, SharedContainer, SledStore, WriterConfig,
};
use std::path::{Path, PathBuf};
use tracing::info;

const FRAME_ROWS: usize = 32;
const FRAME_COLS: usize = 32;
const GROUP_SIZE: usize = 4;

// Simulated shot: the area detector misses some shots, the beam monitor never does
struct Shot {
    number: u64,
    frame: Option<Vec<f32>>,
    photon_energy_ev: f64,
}

struct SimulatedRun {
    next: u64,
    shots: u64,
}

impl SimulatedRun {
    fn new(shots: u64) -> Self {
        Self { next: 0, shots }
    }
}

impl RecordSource for SimulatedRun {
    type Event = Shot;

    fn next_event(&mut self) -> lockstep::Result<Option<Shot>> {
        if self.next >= self.shots {
            return Ok(None);
        }
        let number = self.next;
        self.next += 1;

        // Every member regenerates the same shot from its number
        let frame = (number % 7 != 3).then(|| {
            (0..FRAME_ROWS * FRAME_COLS)
                .map(|px| ((px as u64 + number) % 97) as f32)
                .collect()
        });
        Ok(Some(Shot {
            number,
            frame,
            photon_energy_ev: 9500.0 + (number % 50) as f64 * 0.25,
        }))
    }

    fn keep(&self, shot: &Shot) -> bool {
        shot.frame.is_some()
    }

    fn schemas(&mut self, _first: &Shot) -> lockstep::Result<Vec<ArraySchema>> {
        Ok(vec![
            ArraySchema::new(
                "/entry_1/instrument_1/detector_1/data",
                ArrayShape::growable(&[FRAME_ROWS, FRAME_COLS])?,
                ChunkGeometry::new(30, vec![FRAME_ROWS, FRAME_COLS]),
                DType::F32,
            ),
            ArraySchema::new(
                "/entry_1/instrument_1/source_1/energy_eV",
                ArrayShape::growable(&[])?,
                ChunkGeometry::new(1024, vec![]),
                DType::F64,
            ),
            ArraySchema::new(
                "/entry_1/event/shot",
                ArrayShape::growable(&[])?,
                ChunkGeometry::new(1024, vec![]),
                DType::U64,
            ),
        ])
    }

    fn records(&mut self, shot: &Shot, _entry: u64) -> lockstep::Result<Vec<Record>> {
        let frame = shot.frame.clone().unwrap_or_default();
        Ok(vec![
            Record::new(vec![FRAME_ROWS, FRAME_COLS], frame)?,
            Record::scalar(vec![shot.photon_energy_ev])?,
            Record::scalar(vec![shot.number])?,
        ])
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let output = PathBuf::from(args.next().unwrap_or_else(|| "demo_run.sled".to_string()));
    let shots: u64 = match args.next() {
        Some(n) => n.parse().context("shot count must be an integer")?,
        None => 2500,
    };

    let config = if Path::new("writer.yaml").exists() {
        WriterConfig::from_yaml_file("writer.yaml")?
    } else {
        WriterConfig::default()
    };
    lockstep::telemetry::init_tracing(config.debug);
    info!(output = %output.display(), shots, ?config, "starting demo run");

    let store = SledStore::open(&output)?;
    let shared = SharedContainer::new(store, GROUP_SIZE)?;
    let member_config = config.clone();
    let summaries = run_group(shared.clone(), move |member| {
        let mut registry = GrowableRegistry::for_member(member, member_config.clone())?;
        let mut source = SimulatedRun::new(shots);
        let options = DriverOptions::default().with_progress_every(500);
        run_member(&mut registry, &mut source, &options)
    })
    .await?;

    for array in shared.arrays()? {
        info!(path = %array.path, len = array.len, dtype = %array.layout.dtype, "array written");
    }
    if let Some(total) = RunSummary::combine(&summaries) {
        println!("{}", total.to_json()?);
    }
    Ok(())
}
