// Full pipeline on a toy dataset: fvecs conversion, queries and ground truth,
// LID profile, a sweep against an in-process engine, then batch aggregation.

use std::cell::Cell;
use std::path::Path;

use adasweep::adapters::{RecordFormat, compute_ground_truth, convert_records, extract_queries};
use adasweep::codec::{VectorReader, read_header};
use adasweep::config::{ConvertConfig, LidConfig, SweepConfig};
use adasweep::lid::{
    EXACT_LID_MAX, LID_MIN, LidEstimator, LidMode, default_profile_path, profile_stats,
};
use adasweep::results::{Ledger, aggregate_results, load_ledger, write_summary};
use adasweep::sweep::{
    Algorithm, AlphaBounds, ArtifactHandle, BuildRequest, DatasetFiles, IndexEngine, Orchestrator,
    RawOutput, SearchRequest, SweepTask, expand_grid,
};
use adasweep::{PipelineError, PipelineResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

const DIM: usize = 6;
const POINTS: usize = 400;

fn write_fvecs(path: &Path, rows: usize, dim: usize, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut bytes = Vec::with_capacity(rows * (4 + dim * 4));
    for _ in 0..rows {
        bytes.extend_from_slice(&(dim as i32).to_le_bytes());
        for _ in 0..dim {
            let v: f32 = rng.random_range(0.0..1.0);
            bytes.extend_from_slice(&v.to_le_bytes());
        }
    }
    std::fs::write(path, bytes).unwrap();
}

/// Engine that checks its inputs, writes the artifact and reports a
/// recall that grows with L.
#[derive(Default)]
struct ToyEngine {
    builds: Cell<usize>,
}

impl IndexEngine for ToyEngine {
    fn build(&self, request: &BuildRequest) -> PipelineResult<ArtifactHandle> {
        assert!(request.files.base.exists());
        if request.config.algorithm == Algorithm::Adaptive {
            assert!(request.files.lid.exists(), "adaptive builds need the LID profile");
        }
        self.builds.set(self.builds.get() + 1);
        let handle = ArtifactHandle::expected(&request.index_prefix, "_disk.index");
        std::fs::write(&handle.artifact, b"graph").map_err(|source| PipelineError::FileWrite {
            path: handle.artifact.clone(),
            source,
        })?;
        Ok(handle)
    }

    fn search(
        &self,
        _artifact: &ArtifactHandle,
        request: &SearchRequest,
    ) -> PipelineResult<RawOutput> {
        let l = request.search_l;
        let bonus = if request.config.algorithm == Algorithm::Adaptive { 1 } else { 0 };
        Ok(RawOutput {
            command: format!("toy_search -L {l}"),
            text: format!(
                "Using 8 threads\n  L   Beamwidth     QPS    Mean Latency   Recall@10\n\
                 =========================================================\n\
                 {l} {} 420.5 {}.25\n",
                5000 - l,
                85 + l / 10 + bonus
            ),
        })
    }
}

#[test]
fn test_pipeline_from_fvecs_to_summary() {
    let dir = TempDir::new().unwrap();
    let data_root = dir.path().join("data");
    let files = DatasetFiles::locate(&data_root, "toy");
    std::fs::create_dir_all(files.base.parent().unwrap()).unwrap();

    // Conversion
    let raw = dir.path().join("toy_base.fvecs");
    write_fvecs(&raw, POINTS, DIM, 7);
    let summary = convert_records(
        &raw,
        &files.base,
        RecordFormat::Fvecs,
        &ConvertConfig {
            batch_records: 64,
            in_memory_threshold_bytes: 1024,
        },
        None,
    )
    .unwrap();
    assert!(summary.streamed);
    assert_eq!(read_header(&files.base).unwrap().num_points, POINTS);

    // Queries and ground truth
    extract_queries(&files.base, &files.query, 20, 128).unwrap();
    let gt = compute_ground_truth(&files.base, &files.query, &files.ground_truth, 10, 128).unwrap();
    assert_eq!((gt.num_points, gt.dimension), (20, 10));
    let ids = VectorReader::<u32>::open(&files.ground_truth, 128)
        .unwrap()
        .read_all()
        .unwrap();
    // Queries are a prefix of the base, so each query's nearest neighbor is itself
    for q in 0..20 {
        assert_eq!(ids[q * 10], q as u32);
    }

    // LID profile
    let estimator = LidEstimator::new(
        LidConfig {
            k: 10,
            mode: LidMode::Exact,
            ..LidConfig::default()
        },
        128,
    )
    .unwrap();
    assert_eq!(default_profile_path(&files.base), files.lid);
    let lid = estimator.estimate(&files.base, &files.lid).unwrap();
    assert_eq!(lid.num_points, POINTS);
    let stats = profile_stats(&files.lid, 128).unwrap();
    assert_eq!(stats.count, POINTS);
    assert!(stats.min >= f64::from(LID_MIN) && stats.max <= f64::from(EXACT_LID_MAX));

    // Sweep
    let sweep = SweepConfig {
        data_root,
        temp_dir: dir.path().join("tmp"),
        ledger_path: dir.path().join("ledger.csv"),
        ..SweepConfig::default()
    };
    std::fs::create_dir_all(&sweep.temp_dir).unwrap();
    let grid = expand_grid(&[SweepTask {
        dataset: "toy".to_string(),
        r_values: vec![16, 24],
        l_values: vec![10, 20, 30],
        alpha_configs: vec![AlphaBounds::new(1.0, 1.2), AlphaBounds::new(1.3, 1.1)],
        run_baseline: true,
    }]);
    assert_eq!(grid.len(), 4);

    let ledger = Ledger::open(&sweep.ledger_path).unwrap();
    let mut orchestrator = Orchestrator::new(ToyEngine::default(), sweep.clone(), ledger);
    let report = orchestrator.run(&grid).unwrap();
    assert_eq!(report.built, 4);
    assert_eq!(report.recorded, 12);
    assert_eq!(report.failures(), 0);
    assert_eq!(orchestrator.engine().builds.get(), 4);

    let rows = load_ledger(&sweep.ledger_path).unwrap();
    assert_eq!(rows.len(), 12);
    assert_eq!(rows[0].config.algorithm, Algorithm::Baseline);
    assert_eq!(rows[0].qps, 4990.0);
    assert_eq!(rows[0].recall, 86.25);

    // Everything transient is gone after the sweep
    assert_eq!(std::fs::read_dir(&sweep.temp_dir).unwrap().count(), 0);

    // Batch aggregation of archived run logs
    let scans = dir.path().join("fullscan");
    std::fs::create_dir_all(&scans).unwrap();
    std::fs::write(
        scans.join("toy_R16_min1.0_max1.2.txt"),
        "--- Baseline ---\n10 4990.0 420.5 86.25\n20 4980.0 421.0 87.25\n\
         --- MCGI ---\n10 4990.0 410.5 87.25\n20 4980.0 411.0 88.25\n",
    )
    .unwrap();
    let (summary_rows, agg) = aggregate_results(&[scans]).unwrap();
    assert_eq!(agg.rows, 4);
    let output = dir.path().join("summary.csv");
    write_summary(&summary_rows, &output).unwrap();
    assert_eq!(load_ledger(&output).unwrap(), summary_rows);
}
