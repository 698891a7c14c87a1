//! Scalar quality measures comparing an attacked image with its original.
//!
//! Both work on luminance; for RGB images that is `0.299 r + 0.587 g + 0.114 b`.

use crate::raster::Image;

/// Result of a quality comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Quality {
    /// Score in decibels.
    Decibels(f64),
    /// The images are identical, any decibel score would be infinite.
    Identical,
    /// Shapes differ, or the reference has no signal to compare against.
    NotMeaningful,
}

impl Quality {
    /// Returns true if the score exceeds `db` decibels; identical images exceed any threshold.
    pub fn exceeds(&self, db: f64) -> bool {
        match self {
            Quality::Decibels(v) => *v > db,
            Quality::Identical => true,
            Quality::NotMeaningful => false,
        }
    }

    pub fn decibels(&self) -> Option<f64> {
        match self {
            Quality::Decibels(v) => Some(*v),
            _ => None,
        }
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Quality::Decibels(v) => write!(f, "PSNR = {v:.6}"),
            Quality::Identical => write!(f, "PSNR = inf"),
            Quality::NotMeaningful => write!(f, "PSNR not meaningful"),
        }
    }
}

fn luminance(img: &Image) -> impl Iterator<Item = f64> + '_ {
    let depth = img.depth();
    img.data().chunks_exact(depth).map(move |p| {
        if depth == 1 {
            p[0] as f64
        } else {
            0.299 * p[0] as f64 + 0.587 * p[1] as f64 + 0.114 * p[2] as f64
        }
    })
}

fn squared_difference(a: &Image, b: &Image) -> f64 {
    luminance(a)
        .zip(luminance(b))
        .map(|(la, lb)| (la - lb) * (la - lb))
        .sum()
}

/// Peak signal to noise ratio, `20 log10(max L) + 10 log10(N) - 10 log10(sum (L - L')^2)`.
///
/// The peak luminance is that of `image`, so the order matters. The benchmark scores an attacked
/// image against its source as `psnr(attacked, source)`.
pub fn psnr(image: &Image, reference: &Image) -> Quality {
    if !image.same_shape(reference) {
        return Quality::NotMeaningful;
    }
    let peak = luminance(image).fold(0.0f64, f64::max);
    if peak <= 0.0 {
        return Quality::NotMeaningful;
    }
    let error = squared_difference(image, reference);
    if error == 0.0 {
        return Quality::Identical;
    }
    let pixels = image.width() as f64 * image.height() as f64;
    Quality::Decibels(20.0 * peak.log10() + 10.0 * pixels.log10() - 10.0 * error.log10())
}

/// Signal to noise ratio, `10 log10(sum L^2 / sum (L - L')^2)`.
pub fn snr(original: &Image, modified: &Image) -> Quality {
    if !original.same_shape(modified) {
        return Quality::NotMeaningful;
    }
    let signal: f64 = luminance(original).map(|l| l * l).sum();
    if signal <= 0.0 {
        return Quality::NotMeaningful;
    }
    let error = squared_difference(original, modified);
    if error == 0.0 {
        return Quality::Identical;
    }
    Quality::Decibels(10.0 * (signal / error).log10())
}
