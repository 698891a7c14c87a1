use crate::error::{PipelineError, Result};
use crate::raster::Image;

/// Absolute difference of two same-shaped images, stretched to the full sample range.
///
/// Identical images give an all-zero image.
pub fn difference_image(original: &Image, modified: &Image) -> Result<Image> {
    if !original.same_shape(modified) {
        return Err(PipelineError::InvalidImage(format!(
            "cannot compare {}x{}x{} with {}x{}x{}",
            original.width(),
            original.height(),
            original.depth(),
            modified.width(),
            modified.height(),
            modified.depth()
        )));
    }
    let diff: Vec<u8> = original
        .data()
        .iter()
        .zip(modified.data())
        .map(|(a, b)| a.abs_diff(*b))
        .collect();
    let min = diff.iter().copied().min().unwrap_or(0);
    let max = diff.iter().copied().max().unwrap_or(0);
    let range = (max - min) as f64;
    let data = diff
        .iter()
        .map(|v| {
            if range == 0.0 {
                0
            } else {
                (((v - min) as f64 / range) * 255.0).round() as u8
            }
        })
        .collect();
    Image::from_raw(original.width(), original.height(), original.depth(), 255, data)
}
