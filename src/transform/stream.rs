//! Persistence of the geometric distortion's parameters.
//!
//! A parameter file starts with a fixed little-endian record:
//!
//! | field            | encoding                                              |
//! |------------------|-------------------------------------------------------|
//! | magic            | `b"SMDP"`                                             |
//! | version          | `u16`, currently 1                                    |
//! | kind             | `u8`, 0 main parameters only, 1 followed by all draws |
//! | source           | width `u32`, height `u32`, depth `u8`, max `u8`       |
//! | options          | inwards, outwards `f64`, relative flags `u8` `u8`, jitter, bending, deviation `f64`, jpeg quality `u8` |
//! | state            | corners ul, ur, ll, lr as `f64` pairs, bending, jitter, deviation `f64`, rows `u16`, channels `u8`, offsets `f64` row-major |
//!
//! In a full file the record is followed by every per-pixel draw as an `f64`, in the order the
//! pass consumed them.

use super::distortion::{Corners, DistortionOptions, DistortionState, TransferTable, Vector};
use crate::error::{PipelineError, Result};
use crate::raster::Image;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

const MAGIC: &[u8; 4] = b"SMDP";
const VERSION: u16 = 1;

/// How the geometric distortion obtains its random parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterMode {
    /// Draw everything from the process generator, persist nothing.
    #[default]
    Fresh,
    /// Draw fresh parameters and save the main ones.
    SaveMain,
    /// Reuse saved main parameters, draw the per-pixel values fresh.
    LoadMain,
    /// Draw fresh parameters and save them together with every per-pixel draw.
    SaveFull,
    /// Replay a full file exactly.
    LoadFull,
}

impl ParameterMode {
    pub fn loads(self) -> bool {
        matches!(self, ParameterMode::LoadMain | ParameterMode::LoadFull)
    }

    pub fn saves(self) -> bool {
        matches!(self, ParameterMode::SaveMain | ParameterMode::SaveFull)
    }

    pub fn full(self) -> bool {
        matches!(self, ParameterMode::SaveFull | ParameterMode::LoadFull)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Main,
    Full,
}

/// Shape of the image a record was drawn for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub width: u32,
    pub height: u32,
    pub depth: u8,
    pub max: u8,
}

impl SourceDescriptor {
    pub fn of(image: &Image) -> Self {
        SourceDescriptor {
            width: image.width(),
            height: image.height(),
            depth: image.depth() as u8,
            max: image.max(),
        }
    }

    /// Records are only usable on images of the same size and depth.
    pub fn matches(&self, image: &Image) -> bool {
        self.width == image.width()
            && self.height == image.height()
            && self.depth as usize == image.depth()
    }
}

/// The fixed part of a parameter file.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterRecord {
    pub kind: RecordKind,
    pub source: SourceDescriptor,
    pub options: DistortionOptions,
    pub state: DistortionState,
}

struct Writer<'a, W: Write>(&'a mut W);

impl<W: Write> Writer<'_, W> {
    fn bytes(&mut self, b: &[u8]) -> Result<()> {
        self.0.write_all(b)?;
        Ok(())
    }
    fn u8(&mut self, v: u8) -> Result<()> {
        self.bytes(&[v])
    }
    fn u16(&mut self, v: u16) -> Result<()> {
        self.bytes(&v.to_le_bytes())
    }
    fn u32(&mut self, v: u32) -> Result<()> {
        self.bytes(&v.to_le_bytes())
    }
    fn f64(&mut self, v: f64) -> Result<()> {
        self.bytes(&v.to_le_bytes())
    }
    fn vector(&mut self, v: Vector) -> Result<()> {
        self.f64(v.x)?;
        self.f64(v.y)
    }
}

struct Reader<'a, R: Read>(&'a mut R);

impl<R: Read> Reader<'_, R> {
    fn bytes<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.0.read_exact(&mut buf).map_err(|e| {
            PipelineError::ParameterFormat(format!("record is truncated: {e}"))
        })?;
        Ok(buf)
    }
    fn u8(&mut self) -> Result<u8> {
        Ok(self.bytes::<1>()?[0])
    }
    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.bytes()?))
    }
    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.bytes()?))
    }
    fn f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.bytes()?))
    }
    fn vector(&mut self) -> Result<Vector> {
        Ok(Vector {
            x: self.f64()?,
            y: self.f64()?,
        })
    }
}

impl ParameterRecord {
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<()> {
        let mut w = Writer(out);
        w.bytes(MAGIC)?;
        w.u16(VERSION)?;
        w.u8(match self.kind {
            RecordKind::Main => 0,
            RecordKind::Full => 1,
        })?;

        w.u32(self.source.width)?;
        w.u32(self.source.height)?;
        w.u8(self.source.depth)?;
        w.u8(self.source.max)?;

        let o = &self.options;
        w.f64(o.inwards)?;
        w.f64(o.outwards)?;
        w.u8(o.relative_inwards as u8)?;
        w.u8(o.relative_outwards as u8)?;
        w.f64(o.jitter)?;
        w.f64(o.bending)?;
        w.f64(o.deviation)?;
        w.u8(o.jpeg_quality)?;

        let s = &self.state;
        w.vector(s.corners.ul)?;
        w.vector(s.corners.ur)?;
        w.vector(s.corners.ll)?;
        w.vector(s.corners.lr)?;
        w.f64(s.bending)?;
        w.f64(s.jitter)?;
        w.f64(s.deviation)?;
        let rows = u16::try_from(s.transfer.rows())
            .map_err(|_| PipelineError::ParameterFormat("transfer table too large".into()))?;
        w.u16(rows)?;
        w.u8(s.transfer.channels() as u8)?;
        for v in s.transfer.offsets() {
            w.f64(*v)?;
        }
        Ok(())
    }

    pub fn read_from<R: Read>(input: &mut R) -> Result<Self> {
        let mut r = Reader(input);
        if &r.bytes::<4>()? != MAGIC {
            return Err(PipelineError::ParameterFormat(
                "not a distortion parameter file".into(),
            ));
        }
        let version = r.u16()?;
        if version != VERSION {
            return Err(PipelineError::ParameterFormat(format!(
                "unsupported version {version}"
            )));
        }
        let kind = match r.u8()? {
            0 => RecordKind::Main,
            1 => RecordKind::Full,
            k => {
                return Err(PipelineError::ParameterFormat(format!(
                    "unknown record kind {k}"
                )))
            }
        };

        let source = SourceDescriptor {
            width: r.u32()?,
            height: r.u32()?,
            depth: r.u8()?,
            max: r.u8()?,
        };

        let options = DistortionOptions {
            inwards: r.f64()?,
            outwards: r.f64()?,
            relative_inwards: r.u8()? != 0,
            relative_outwards: r.u8()? != 0,
            jitter: r.f64()?,
            bending: r.f64()?,
            deviation: r.f64()?,
            jpeg_quality: r.u8()?,
            ..DistortionOptions::default()
        };

        let corners = Corners {
            ul: r.vector()?,
            ur: r.vector()?,
            ll: r.vector()?,
            lr: r.vector()?,
        };
        let bending = r.f64()?;
        let jitter = r.f64()?;
        let deviation = r.f64()?;
        let rows = r.u16()? as usize;
        let channels = r.u8()? as usize;
        let offsets = (0..rows * channels)
            .map(|_| r.f64())
            .collect::<Result<Vec<_>>>()?;
        let transfer = TransferTable::from_offsets(rows, channels, offsets)
            .ok_or_else(|| PipelineError::ParameterFormat("bad transfer table".into()))?;

        Ok(ParameterRecord {
            kind,
            source,
            options,
            state: DistortionState {
                corners,
                bending,
                jitter,
                deviation,
                transfer,
            },
        })
    }
}

/// Where the per-pixel jitter and dither draws come from.
pub(crate) enum DrawSource {
    Generator,
    /// Draw from the generator and append every value to the stream.
    Record {
        writer: Box<dyn Write>,
        error: Option<std::io::Error>,
    },
    /// Read every value from the stream; once it runs dry, fall back to the generator.
    Replay {
        reader: Box<dyn Read>,
        exhausted: bool,
    },
}

impl std::fmt::Debug for DrawSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DrawSource::Generator => write!(f, "Generator"),
            DrawSource::Record { error, .. } => write!(f, "Record {{ error: {error:?} }}"),
            DrawSource::Replay { exhausted, .. } => write!(f, "Replay {{ exhausted: {exhausted} }}"),
        }
    }
}

impl DrawSource {
    pub(crate) fn draw(&mut self, rng: &mut dyn RngCore) -> f64 {
        match self {
            DrawSource::Generator => rng.gen(),
            DrawSource::Record { writer, error } => {
                let v: f64 = rng.gen();
                if error.is_none() {
                    if let Err(e) = writer.write_all(&v.to_le_bytes()) {
                        *error = Some(e);
                    }
                }
                v
            }
            DrawSource::Replay { reader, exhausted } => {
                if !*exhausted {
                    let mut buf = [0u8; 8];
                    match reader.read_exact(&mut buf) {
                        Ok(()) => return f64::from_le_bytes(buf),
                        Err(_) => *exhausted = true,
                    }
                }
                rng.gen()
            }
        }
    }

    /// Close the stream, reporting anything that went wrong while the pass ran.
    pub(crate) fn finish(&mut self) -> Result<()> {
        match std::mem::replace(self, DrawSource::Generator) {
            DrawSource::Generator => Ok(()),
            DrawSource::Record { mut writer, error } => {
                if let Some(e) = error {
                    return Err(PipelineError::ParameterStream(format!(
                        "could not record draws: {e}"
                    )));
                }
                writer.flush().map_err(|e| {
                    PipelineError::ParameterStream(format!("could not flush draws: {e}"))
                })
            }
            DrawSource::Replay { exhausted, .. } => {
                if exhausted {
                    Err(PipelineError::ParameterStream(
                        "ran out of recorded draws, the rest came from the generator".into(),
                    ))
                } else {
                    Ok(())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use std::io::Cursor;

    fn record() -> ParameterRecord {
        let image = Image::new(7, 5, 3, 255).unwrap();
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(11);
        let options = DistortionOptions::default();
        ParameterRecord {
            kind: RecordKind::Full,
            source: SourceDescriptor::of(&image),
            state: DistortionState::generate(&options, &image, &mut rng),
            options,
        }
    }

    #[test]
    fn test_record_survives_storage() {
        let original = record();
        let mut bytes = Vec::new();
        original.write_to(&mut bytes).unwrap();
        let restored = ParameterRecord::read_from(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_bad_headers() {
        let err = ParameterRecord::read_from(&mut Cursor::new(b"JUNKJUNK".to_vec())).unwrap_err();
        assert!(matches!(err, PipelineError::ParameterFormat(_)));
        let mut bytes = Vec::new();
        record().write_to(&mut bytes).unwrap();
        bytes.truncate(bytes.len() - 3);
        let err = ParameterRecord::read_from(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, PipelineError::ParameterFormat(_)));
    }

    #[test]
    fn test_replay_falls_back_when_exhausted() {
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(5);
        let mut replay = DrawSource::Replay {
            reader: Box::new(Cursor::new(0.25f64.to_le_bytes().to_vec())),
            exhausted: false,
        };
        assert_eq!(replay.draw(&mut rng), 0.25);
        let v = replay.draw(&mut rng);
        assert!((0.0..1.0).contains(&v));
        assert!(matches!(
            replay.finish(),
            Err(PipelineError::ParameterStream(_))
        ));
    }
}
