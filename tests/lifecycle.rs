use stirmark as sm;
mod util;
use sm::{
    AttackConfig, Orchestrator, Parameter, ParameterMode, PassConfig, PassOutcome, PipelineError,
    ReconstructerId, SamplerId, TransformerId,
};
use util::{gradient, scratch_dir};

#[test]
fn test_exhausted_replay_is_a_cleanup_warning() {
    let dir = scratch_dir("exhausted");
    let file = dir.join("params.smd");
    let img = gradient(16, 16);
    let mut config = AttackConfig {
        jpeg: false,
        ..Default::default()
    };
    config.distortion.parameters = ParameterMode::SaveFull;
    config.distortion.parameter_file = Some(file.clone());
    sm::stirmark(&img, &config, &mut Orchestrator::seeded(1)).unwrap();

    // Drop the last hundred recorded draws.
    let bytes = std::fs::read(&file).unwrap();
    std::fs::write(&file, &bytes[..bytes.len() - 800]).unwrap();

    config.distortion.parameters = ParameterMode::LoadFull;
    let outcome = Orchestrator::seeded(2)
        .run(&img, &config.pass_config())
        .unwrap();
    let result = outcome.completed().expect("cleanup failures never abandon a pass");
    assert_eq!(result.warnings.len(), 1);
    assert!(matches!(result.warnings[0], PipelineError::ParameterStream(_)));
    assert!(result.image.same_shape(&img));
}

#[test]
fn test_setup_failure_skips_the_rest_of_the_pass() {
    let img = gradient(8, 8);
    let config = PassConfig::new(
        ReconstructerId::Linear,
        TransformerId::Cropping,
        SamplerId::Point,
    )
    .with_parameter(Parameter::Crop(100));
    let mut orchestrator = Orchestrator::seeded(3);
    match orchestrator.run(&img, &config).unwrap() {
        PassOutcome::Abandoned(e) => assert!(!e.is_fatal()),
        PassOutcome::Completed(_) => panic!("a zero sized crop cannot complete"),
    }

    // The orchestrator keeps working after an abandoned pass.
    let config = PassConfig::new(
        ReconstructerId::NearestNeighbour,
        TransformerId::Invariant,
        SamplerId::Point,
    );
    assert!(orchestrator.run(&img, &config).unwrap().is_completed());
}

#[test]
fn test_invalid_parameters_are_fatal() {
    let img = gradient(8, 8);
    let cases = [
        PassConfig::new(
            ReconstructerId::NearestNeighbour,
            TransformerId::Invariant,
            SamplerId::Super,
        )
        .with_supersample(0, 2),
        PassConfig::new(
            ReconstructerId::MedianFilter,
            TransformerId::Invariant,
            SamplerId::Point,
        )
        .with_parameter(Parameter::Window(sm::reconstruct::MedianWindow::square(11))),
        PassConfig::new(
            ReconstructerId::NearestNeighbour,
            TransformerId::Scale,
            SamplerId::Point,
        )
        .with_parameter(Parameter::Angle(3.0)),
    ];
    for config in cases.iter() {
        let err = Orchestrator::seeded(4).run(&img, config).unwrap_err();
        assert!(err.is_fatal(), "{err}");
    }
}

#[test]
fn test_label_falls_back_to_capability_names() {
    let img = gradient(8, 8);
    let config = PassConfig::new(
        ReconstructerId::Linear,
        TransformerId::Invariant,
        SamplerId::Point,
    );
    let outcome = Orchestrator::seeded(5).run(&img, &config).unwrap();
    let label = outcome.completed().unwrap().label;
    assert!(label.test_name.contains(" with "));
    assert_eq!(label.file_suffix, "");
}
