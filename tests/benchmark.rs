use stirmark as sm;
mod util;
use sm::bench::{TestEntry, TestOutcome};
use sm::{Benchmark, BenchmarkTable, Orchestrator, Parameter, ReconstructerId, TestSet, TransformerId};
use util::{gradient, scratch_dir};

fn only(entries: Vec<TestEntry>) -> BenchmarkTable {
    BenchmarkTable {
        entries,
        jpeg_qualities: vec![],
    }
}

fn entry(set: TestSet, transformer: TransformerId, parameters: Vec<Parameter>) -> TestEntry {
    TestEntry {
        set,
        reconstructer: ReconstructerId::NearestNeighbour,
        transformer,
        sampler: sm::SamplerId::Point,
        parameters,
    }
}

#[test]
fn test_flip_saves_pnm_only() {
    let dir = scratch_dir("bench_flip");
    let mut benchmark = Benchmark::new("grad", &dir);
    benchmark.selection = Some(TestSet::Flip);
    let reports = benchmark
        .run(&mut Orchestrator::seeded(1), &gradient(16, 16))
        .unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].outputs, vec![dir.join("grad_flip.pgm")]);
    assert!(dir.join("grad_flip.pgm").exists());
    assert!(!dir.join("grad_flip.jpg").exists());
    assert!(reports[0].to_string().starts_with("grad - Flip - PSNR = "));
}

#[test]
fn test_distortion_saves_jpeg_only() {
    let dir = scratch_dir("bench_distortion");
    let mut benchmark = Benchmark::new("grad", &dir);
    benchmark.selection = Some(TestSet::GeometricDistortion);
    let reports = benchmark
        .run(&mut Orchestrator::seeded(1), &gradient(24, 24))
        .unwrap();
    assert_eq!(reports.len(), 1);
    let jpg = dir.join("grad_stirmark_random_bend.jpg");
    assert_eq!(reports[0].outputs, vec![jpg.clone()]);
    assert!(jpg.exists());
    assert!(!dir.join("grad_stirmark_random_bend.pgm").exists());
}

#[test]
fn test_resized_outputs_are_not_scored() {
    let dir = scratch_dir("bench_scale");
    let mut benchmark = Benchmark::new("grad", &dir);
    benchmark.table = only(vec![entry(
        TestSet::Scaling,
        TransformerId::Scale,
        vec![Parameter::Scale { x: 0.5, y: 0.5 }],
    )]);
    let reports = benchmark
        .run(&mut Orchestrator::seeded(1), &gradient(20, 20))
        .unwrap();
    assert_eq!(reports[0].outcome, TestOutcome::Unscored);
    assert_eq!(reports[0].to_string(), "grad - Scaling 0.50");
    // Dots in the suffix survive the extension.
    assert!(dir.join("grad_scale_0.50.pgm").exists());
    assert!(dir.join("grad_scale_0.50.jpg").exists());
}

#[test]
fn test_abandoned_test_does_not_stop_the_run() {
    let dir = scratch_dir("bench_abandon");
    let mut benchmark = Benchmark::new("grad", &dir);
    benchmark.save = false;
    benchmark.table = only(vec![entry(
        TestSet::Cropping,
        TransformerId::Cropping,
        vec![Parameter::Crop(100), Parameter::Crop(0)],
    )]);
    let reports = benchmark
        .run(&mut Orchestrator::seeded(1), &gradient(10, 10))
        .unwrap();
    assert_eq!(reports.len(), 2);
    assert!(matches!(reports[0].outcome, TestOutcome::Abandoned(_)));
    assert_eq!(
        reports[1].outcome,
        TestOutcome::Scored(sm::Quality::Identical)
    );
    assert!(reports.iter().all(|r| r.outputs.is_empty()));
}

#[test]
fn test_fatal_error_stops_the_run() {
    let dir = scratch_dir("bench_fatal");
    let mut benchmark = Benchmark::new("grad", &dir);
    benchmark.save = false;
    benchmark.table = only(vec![entry(
        TestSet::GeneralLinear,
        TransformerId::Linear,
        vec![Parameter::Matrix([[0.0, 0.0], [0.0, 0.0]])],
    )]);
    let err = benchmark
        .run(&mut Orchestrator::seeded(1), &gradient(10, 10))
        .unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn test_compression_sweep() {
    let dir = scratch_dir("bench_jpeg");
    let mut benchmark = Benchmark::new("grad", &dir);
    benchmark.selection = Some(TestSet::Compression);
    let reports = benchmark
        .run(&mut Orchestrator::seeded(1), &gradient(32, 32))
        .unwrap();
    assert_eq!(reports.len(), 12);
    assert_eq!(reports[0].test_name, "JPEG compression 90");
    assert!(dir.join("grad_JPEG_10.jpg").exists());
    let db = |i: usize| match reports[i].outcome {
        TestOutcome::Scored(q) => q.decibels().unwrap_or(f64::INFINITY),
        _ => panic!("compression is always scored"),
    };
    assert!(db(0) > db(11));
}

#[test]
fn test_compression_scores_the_decoded_image_first() {
    let dir = scratch_dir("bench_jpeg_order");
    let mut benchmark = Benchmark::new("grad", &dir);
    benchmark.table = BenchmarkTable {
        entries: vec![],
        jpeg_qualities: vec![10],
    };
    let source = gradient(32, 32);
    let reports = benchmark
        .run(&mut Orchestrator::seeded(1), &source)
        .unwrap();
    let decoded = sm::Image::open(&dir.join("grad_JPEG_10.jpg")).unwrap();
    assert_eq!(
        reports[0].outcome,
        TestOutcome::Scored(sm::psnr(&decoded, &source))
    );
}
