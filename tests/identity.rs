use stirmark as sm;
mod util;
use sm::{Parameter, PassConfig, ReconstructerId, SamplerId, TransformerId};
use util::{gradient, noise_rgb, run_pass};

fn nearest(transformer: TransformerId, parameter: Parameter) -> PassConfig {
    PassConfig::new(ReconstructerId::NearestNeighbour, transformer, SamplerId::Point)
        .with_parameter(parameter)
}

#[test]
fn test_crop_zero_is_identity() {
    let img = gradient(17, 11);
    let result = run_pass(&img, &nearest(TransformerId::Cropping, Parameter::Crop(0)), 1);
    assert_eq!(result.image, img);
    assert_eq!(result.label.file_suffix, "_cropping_0");
}

#[test]
fn test_crop_takes_centered_window() {
    let img = gradient(20, 10);
    let result = run_pass(&img, &nearest(TransformerId::Cropping, Parameter::Crop(50)), 1);
    assert_eq!((result.image.width(), result.image.height()), (10, 5));
    // Offset (5, 2) into the source.
    for row in 0..5 {
        for col in 0..10 {
            assert_eq!(result.image.get(col, row, 0), img.get(col + 5, row + 2, 0));
        }
    }
}

#[test]
fn test_flip_twice_is_identity() {
    let img = noise_rgb(13, 9, 3);
    let config = nearest(TransformerId::Flip, Parameter::None);
    let once = run_pass(&img, &config, 1).image;
    assert_ne!(once, img);
    let twice = run_pass(&once, &config, 1).image;
    assert_eq!(twice, img);
}

#[test]
fn test_flip_mirrors_columns() {
    let data = (0..16).collect();
    let img = sm::Image::from_raw(4, 4, 1, 255, data).unwrap();
    let flipped = run_pass(&img, &nearest(TransformerId::Flip, Parameter::None), 1).image;
    for row in 0..4 {
        for col in 0..4 {
            assert_eq!(flipped.get(col, row, 0), img.get(3 - col, row, 0));
        }
    }
}

#[test]
fn test_removing_nothing_is_identity() {
    let img = gradient(15, 12);
    let config = nearest(
        TransformerId::RowColumnRemoval,
        Parameter::Remove {
            columns: 0,
            rows: 0,
        },
    );
    assert_eq!(run_pass(&img, &config, 1).image, img);
}

#[test]
fn test_removal_shrinks_image() {
    let img = gradient(30, 20);
    let config = nearest(
        TransformerId::RowColumnRemoval,
        Parameter::Remove {
            columns: 5,
            rows: 1,
        },
    );
    let result = run_pass(&img, &config, 1);
    assert_eq!((result.image.width(), result.image.height()), (25, 19));
    // The first row and column are always kept.
    assert_eq!(result.image.get(0, 0, 0), img.get(0, 0, 0));
}

#[test]
fn test_one_by_one_median_is_identity() {
    let img = noise_rgb(9, 7, 5);
    let config = PassConfig::new(
        ReconstructerId::MedianFilter,
        TransformerId::Invariant,
        SamplerId::Point,
    )
    .with_parameter(Parameter::Window(sm::reconstruct::MedianWindow::square(1)));
    let result = run_pass(&img, &config, 1);
    assert_eq!(result.image, img);
    assert_eq!(result.label.test_name, "1x1 Median Filtering");
}

#[test]
fn test_unit_scale_is_nearly_identity() {
    let img = gradient(24, 16);
    let config = PassConfig::new(
        sm::reconstruct::DEFAULT_RECONSTRUCTER,
        TransformerId::Scale,
        SamplerId::Point,
    )
    .with_parameter(Parameter::Scale { x: 1.0, y: 1.0 });
    let result = run_pass(&img, &config, 1);
    assert!(sm::psnr(&result.image, &img).exceeds(40.0));
}

#[test]
fn test_supersampled_invariant_stays_close() {
    let img = gradient(16, 16);
    let config = PassConfig::new(
        ReconstructerId::Linear,
        TransformerId::Invariant,
        SamplerId::Super,
    )
    .with_supersample(3, 3)
    .with_border(sm::BorderPolicy::Mirror);
    let result = run_pass(&img, &config, 1);
    assert!(result.image.same_shape(&img));
    assert!(sm::psnr(&result.image, &img).exceeds(30.0));
}

#[test]
fn test_single_pixel_nyquist_is_identity() {
    let img = sm::Image::from_raw(1, 1, 1, 255, vec![80]).unwrap();
    let config = PassConfig::new(
        ReconstructerId::Nyquist,
        TransformerId::Invariant,
        SamplerId::Point,
    )
    .with_border(sm::BorderPolicy::Mirror);
    assert_eq!(run_pass(&img, &config, 1).image, img);
}

#[test]
fn test_nyquist_invariant_stays_close() {
    let img = gradient(24, 16);
    let config = PassConfig::new(
        ReconstructerId::Nyquist,
        TransformerId::Invariant,
        SamplerId::Point,
    )
    .with_border(sm::BorderPolicy::Mirror);
    let result = run_pass(&img, &config, 1);
    assert!(result.image.same_shape(&img));
    assert!(sm::psnr(&result.image, &img).exceeds(40.0));
}
