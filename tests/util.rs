#![allow(dead_code)]
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::path::PathBuf;
use stirmark as sm;

/// Grayscale image with a diagonal ramp, every sample distinct along a row.
pub fn gradient(width: u32, height: u32) -> sm::Image {
    let mut data = Vec::with_capacity((width * height) as usize);
    for row in 0..height {
        for col in 0..width {
            data.push(((col * 7 + row * 3) % 256) as u8);
        }
    }
    sm::Image::from_raw(width, height, 1, 255, data).unwrap()
}

/// RGB image of seeded noise.
pub fn noise_rgb(width: u32, height: u32, seed: u64) -> sm::Image {
    let mut generator = ChaCha8Rng::seed_from_u64(seed);
    let mut data = vec![0u8; (width * height * 3) as usize];
    generator.fill_bytes(&mut data);
    sm::Image::from_raw(width, height, 3, 255, data).unwrap()
}

/// Fresh directory under the system temp directory, unique per test name.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("stirmark_{name}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Run a single pass that must complete.
pub fn run_pass(
    image: &sm::Image,
    config: &sm::PassConfig,
    seed: u64,
) -> sm::PassResult {
    sm::Orchestrator::seeded(seed)
        .run(image, config)
        .unwrap_or_else(|e| panic!("pass failed: {e}"))
        .completed()
        .expect("pass was abandoned")
}

/// Largest absolute sample difference between two same-shaped images.
pub fn max_difference(a: &sm::Image, b: &sm::Image) -> u8 {
    assert!(a.same_shape(b));
    a.data()
        .iter()
        .zip(b.data())
        .map(|(x, y)| x.abs_diff(*y))
        .max()
        .unwrap_or(0)
}
