//! The raster image handled by the pipeline, and the view reconstructers sample it through.
//!
//! Pixels are stored row-major and channel-interleaved, one byte per channel. Discrete index `n`
//! covers the continuous interval `[n, n + 1)`, so the center of a pixel sits at `n + 0.5`.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Owned 8 bit grayscale or RGB image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    data: Vec<u8>,
    width: u32,
    height: u32,
    depth: usize,
    max: u8,
}

impl Image {
    /// Allocate a black image.
    pub fn new(width: u32, height: u32, depth: usize, max: u8) -> Result<Self> {
        Self::check_shape(width, height, depth)?;
        Ok(Image {
            data: vec![0; width as usize * height as usize * depth],
            width,
            height,
            depth,
            max,
        })
    }

    /// Wrap an existing buffer, validating its length and that no sample exceeds `max`.
    pub fn from_raw(width: u32, height: u32, depth: usize, max: u8, data: Vec<u8>) -> Result<Self> {
        Self::check_shape(width, height, depth)?;
        let expected = width as usize * height as usize * depth;
        if data.len() != expected {
            return Err(PipelineError::InvalidImage(format!(
                "buffer holds {} bytes, {width}x{height}x{depth} needs {expected}",
                data.len()
            )));
        }
        if let Some(v) = data.iter().find(|v| **v > max) {
            return Err(PipelineError::InvalidImage(format!(
                "sample {v} exceeds maximum {max}"
            )));
        }
        Ok(Image {
            data,
            width,
            height,
            depth,
            max,
        })
    }

    /// Allocate a black image with the depth and maximum of this one.
    pub fn blank_like(&self, width: u32, height: u32) -> Result<Self> {
        Image::new(width, height, self.depth, self.max)
    }

    fn check_shape(width: u32, height: u32, depth: usize) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidImage(format!(
                "{width}x{height} image has no pixels"
            )));
        }
        if depth != 1 && depth != 3 {
            return Err(PipelineError::InvalidImage(format!(
                "depth must be 1 or 3, not {depth}"
            )));
        }
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of channels per pixel, 1 or 3.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Largest value a sample may take.
    pub fn max(&self) -> u8 {
        self.max
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// True if both images have the same width, height and depth.
    pub fn same_shape(&self, other: &Image) -> bool {
        self.width == other.width && self.height == other.height && self.depth == other.depth
    }

    fn index(&self, col: u32, row: u32, channel: usize) -> usize {
        channel + self.depth * (col as usize + row as usize * self.width as usize)
    }

    pub fn get(&self, col: u32, row: u32, channel: usize) -> u8 {
        self.data[self.index(col, row, channel)]
    }

    /// Store a sample, clamping it to `max`.
    pub fn set(&mut self, col: u32, row: u32, channel: usize, value: u8) {
        let index = self.index(col, row, channel);
        self.data[index] = value.min(self.max);
    }

    /// Convert from an [`image::DynamicImage`]; grayscale stays single channel, the rest is RGB.
    pub fn from_dynamic(img: &image::DynamicImage) -> Result<Self> {
        if img.color().channel_count() <= 2 {
            let gray = img.to_luma8();
            Image::from_raw(gray.width(), gray.height(), 1, 255, gray.into_raw())
        } else {
            let rgb = img.to_rgb8();
            Image::from_raw(rgb.width(), rgb.height(), 3, 255, rgb.into_raw())
        }
    }

    /// Convert into an [`image::DynamicImage`] of matching depth.
    pub fn to_dynamic(&self) -> Result<image::DynamicImage> {
        let shape_error = || PipelineError::InvalidImage("buffer does not match shape".into());
        let img = if self.depth == 1 {
            image::DynamicImage::ImageLuma8(
                image::GrayImage::from_raw(self.width, self.height, self.data.clone())
                    .ok_or_else(shape_error)?,
            )
        } else {
            image::DynamicImage::ImageRgb8(
                image::RgbImage::from_raw(self.width, self.height, self.data.clone())
                    .ok_or_else(shape_error)?,
            )
        };
        Ok(img)
    }

    /// Load any format the `image` crate understands.
    pub fn open(path: &Path) -> Result<Self> {
        let img = image::open(path)?;
        Image::from_dynamic(&img)
    }

    /// Decode an in-memory encoded image.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let img = image::load_from_memory(bytes)?;
        Image::from_dynamic(&img)
    }

    /// Save as binary PGM (grayscale) or PPM (RGB), appending the extension to `stem`.
    pub fn save_pnm(&self, stem: &Path) -> Result<PathBuf> {
        let extension = if self.depth == 1 { "pgm" } else { "ppm" };
        let path = with_extension(stem, extension);
        self.to_dynamic()?.save(&path)?;
        Ok(path)
    }

    /// Encode as JPEG at the given quality (1 to 100).
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let color = if self.depth == 1 {
            image::ColorType::L8
        } else {
            image::ColorType::Rgb8
        };
        let mut bytes = Vec::new();
        let mut encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100));
        encoder.encode(&self.data, self.width, self.height, color)?;
        Ok(bytes)
    }

    /// Save as JPEG, appending `.jpg` to `stem`.
    pub fn save_jpeg(&self, stem: &Path, quality: u8) -> Result<PathBuf> {
        let path = with_extension(stem, "jpg");
        std::fs::write(&path, self.encode_jpeg(quality)?)?;
        Ok(path)
    }
}

// Path::with_extension would eat anything after a dot in the stem, like "_scale_0.50".
pub(crate) fn with_extension(stem: &Path, extension: &str) -> PathBuf {
    let mut name = stem.as_os_str().to_owned();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

/// What a neighbour lookup outside the image returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BorderPolicy {
    /// Samples outside the image are zero.
    #[default]
    Zero,
    /// The image is reflected at its borders.
    Mirror,
}

/// Reflect an index back into `0..size` without repeating the edge sample.
pub fn reflect(index: i64, size: i64) -> i64 {
    if size <= 1 {
        return 0;
    }
    let period = 2 * (size - 1);
    let m = index.rem_euclid(period);
    if m >= size {
        period - m
    } else {
        m
    }
}

/// Read-only access to the source image for one pass: the pass offset and border policy applied.
#[derive(Clone, Copy, Debug)]
pub struct SourceView<'a> {
    image: &'a Image,
    offset: (i64, i64),
    border: BorderPolicy,
}

impl<'a> SourceView<'a> {
    pub fn new(image: &'a Image, offset: (i64, i64), border: BorderPolicy) -> Self {
        SourceView {
            image,
            offset,
            border,
        }
    }

    pub fn image(&self) -> &'a Image {
        self.image
    }

    pub fn width(&self) -> i64 {
        self.image.width as i64
    }

    pub fn height(&self) -> i64 {
        self.image.height as i64
    }

    /// Whether `(col, row)`, once shifted by the pass offset, lies inside the image.
    pub fn contains(&self, col: i64, row: i64) -> bool {
        let (x, y) = (col + self.offset.0, row + self.offset.1);
        x >= 0 && x < self.width() && y >= 0 && y < self.height()
    }

    /// Sample at a discrete position, honouring the border policy.
    pub fn sample(&self, col: i64, row: i64, channel: usize) -> f64 {
        let (x, y) = (col + self.offset.0, row + self.offset.1);
        match self.border {
            BorderPolicy::Mirror => self.at(reflect(x, self.width()), reflect(y, self.height()), channel),
            BorderPolicy::Zero => {
                if x < 0 || x >= self.width() || y < 0 || y >= self.height() {
                    0.0
                } else {
                    self.at(x, y, channel)
                }
            }
        }
    }

    /// Sample at a discrete position, always mirroring at the borders.
    pub fn sample_mirrored(&self, col: i64, row: i64, channel: usize) -> f64 {
        let (x, y) = (col + self.offset.0, row + self.offset.1);
        self.at(reflect(x, self.width()), reflect(y, self.height()), channel)
    }

    fn at(&self, x: i64, y: i64, channel: usize) -> f64 {
        self.image.get(x as u32, y as u32, channel) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_validates() {
        assert!(Image::from_raw(2, 2, 1, 255, vec![0; 4]).is_ok());
        assert!(Image::from_raw(2, 2, 1, 255, vec![0; 5]).is_err());
        assert!(Image::from_raw(2, 2, 2, 255, vec![0; 8]).is_err());
        assert!(Image::from_raw(0, 2, 1, 255, vec![]).is_err());
        assert!(Image::from_raw(1, 1, 1, 100, vec![101]).is_err());
    }

    #[test]
    fn test_reflect() {
        assert_eq!(reflect(-1, 4), 1);
        assert_eq!(reflect(-3, 4), 3);
        assert_eq!(reflect(4, 4), 2);
        assert_eq!(reflect(6, 4), 0);
        assert_eq!(reflect(2, 4), 2);
        assert_eq!(reflect(5, 1), 0);
    }

    #[test]
    fn test_view_border_policies() {
        let img = Image::from_raw(3, 1, 1, 255, vec![10, 20, 30]).unwrap();
        let zero = SourceView::new(&img, (0, 0), BorderPolicy::Zero);
        assert_eq!(zero.sample(-1, 0, 0), 0.0);
        assert_eq!(zero.sample(1, 0, 0), 20.0);
        let mirror = SourceView::new(&img, (0, 0), BorderPolicy::Mirror);
        assert_eq!(mirror.sample(-1, 0, 0), 20.0);
        assert_eq!(mirror.sample(3, 0, 0), 20.0);
        let shifted = SourceView::new(&img, (1, 0), BorderPolicy::Zero);
        assert_eq!(shifted.sample(0, 0, 0), 20.0);
        assert!(!shifted.contains(2, 0));
    }

    #[test]
    fn test_set_clamps_to_max() {
        let mut img = Image::new(1, 1, 3, 200).unwrap();
        img.set(0, 0, 2, 255);
        assert_eq!(img.get(0, 0, 2), 200);
        assert_eq!(img.get(0, 0, 0), 0);
    }

    #[test]
    fn test_with_extension_keeps_dots() {
        let p = with_extension(Path::new("/tmp/lena_scale_0.50"), "pgm");
        assert_eq!(p, PathBuf::from("/tmp/lena_scale_0.50.pgm"));
    }
}
