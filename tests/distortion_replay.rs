use stirmark as sm;
mod util;
use sm::{AttackConfig, Orchestrator, ParameterMode};
use util::{gradient, max_difference, noise_rgb, scratch_dir};

fn attack(mode: ParameterMode, file: &std::path::Path) -> AttackConfig {
    let mut config = AttackConfig {
        jpeg: false,
        ..Default::default()
    };
    config.distortion.parameters = mode;
    config.distortion.parameter_file = Some(file.to_path_buf());
    config
}

#[test]
fn test_full_replay_is_bit_exact() {
    // ================ Start of save section. ================
    let dir = scratch_dir("full_replay");
    let file = dir.join("params.smd");
    let img = noise_rgb(32, 24, 7);
    let saved = sm::stirmark(
        &img,
        &attack(ParameterMode::SaveFull, &file),
        &mut Orchestrator::seeded(11),
    )
    .unwrap();
    assert!(file.exists());

    // ================ Start of load section. ================
    // A different seed, every draw must come from the file.
    let loaded = sm::stirmark(
        &img,
        &attack(ParameterMode::LoadFull, &file),
        &mut Orchestrator::seeded(12345),
    )
    .unwrap();
    assert_eq!(saved, loaded);

    let fresh = sm::stirmark(
        &img,
        &attack(ParameterMode::Fresh, &file),
        &mut Orchestrator::seeded(12345),
    )
    .unwrap();
    assert_ne!(saved, fresh);
}

#[test]
fn test_main_replay_reproduces_warp() {
    let dir = scratch_dir("main_replay");
    let file = dir.join("params.smd");
    let img = gradient(40, 30);
    let mut save = attack(ParameterMode::SaveMain, &file);
    save.distortion.jitter = 0.0;
    let mut load = attack(ParameterMode::LoadMain, &file);
    load.distortion.jitter = 0.0;

    let saved = sm::stirmark(&img, &save, &mut Orchestrator::seeded(1)).unwrap();
    let loaded = sm::stirmark(&img, &load, &mut Orchestrator::seeded(2)).unwrap();

    // Only the dither, a draw in [0, 1), differs between the two.
    assert!(max_difference(&saved, &loaded) <= 1);
}

#[test]
fn test_main_file_under_full_load_falls_back_to_fresh_draws() {
    let dir = scratch_dir("main_as_full");
    let file = dir.join("params.smd");
    let img = gradient(20, 20);
    let saved = sm::stirmark(
        &img,
        &attack(ParameterMode::SaveMain, &file),
        &mut Orchestrator::seeded(3),
    )
    .unwrap();
    let loaded = sm::stirmark(
        &img,
        &attack(ParameterMode::LoadFull, &file),
        &mut Orchestrator::seeded(4),
    )
    .unwrap();
    assert!(loaded.same_shape(&saved));
}

#[test]
fn test_mismatched_file_draws_fresh_parameters() {
    let dir = scratch_dir("mismatch");
    let file = dir.join("params.smd");
    sm::stirmark(
        &gradient(16, 12),
        &attack(ParameterMode::SaveFull, &file),
        &mut Orchestrator::seeded(5),
    )
    .unwrap();

    // Loading for another shape is a warning, not an error.
    let other = gradient(12, 16);
    let out = sm::stirmark(
        &other,
        &attack(ParameterMode::LoadFull, &file),
        &mut Orchestrator::seeded(5),
    )
    .unwrap();
    assert!(out.same_shape(&other));
}

#[test]
fn test_missing_file_is_fatal() {
    let dir = scratch_dir("missing");
    let err = sm::stirmark(
        &gradient(8, 8),
        &attack(ParameterMode::LoadMain, &dir.join("absent.smd")),
        &mut Orchestrator::seeded(6),
    )
    .unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, sm::PipelineError::ParameterFile { .. }));
}

#[test]
fn test_malformed_file_is_fatal() {
    let dir = scratch_dir("malformed");
    let file = dir.join("params.smd");
    std::fs::write(&file, b"not a parameter file").unwrap();
    let err = sm::stirmark(
        &gradient(8, 8),
        &attack(ParameterMode::LoadFull, &file),
        &mut Orchestrator::seeded(6),
    )
    .unwrap_err();
    assert!(matches!(err, sm::PipelineError::ParameterFormat(_)));
}

#[test]
fn test_seed_reproduces_attack() {
    let img = noise_rgb(16, 16, 9);
    let config = AttackConfig::default();
    let a = sm::stirmark(&img, &config, &mut Orchestrator::seeded(42)).unwrap();
    let b = sm::stirmark(&img, &config, &mut Orchestrator::seeded(42)).unwrap();
    assert_eq!(a, b);
}
