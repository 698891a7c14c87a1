//! The deterministic geometric transformers.
//!
//! All of them reduce to a coordinate map applied before reconstruction; they differ in how
//! setup derives that map and the destination size from the pass parameter.

use super::{TransformSetup, Transformer, TransformerId};
use crate::error::{PipelineError, Result, Stage};
use crate::pipeline::{Capability, Label, Parameter, PassContext};
use crate::raster::{Image, SourceView};
use crate::reconstruct::Reconstructer;
use log::warn;
use rand::RngCore;

/// Just below one, so a product that is an integer up to rounding error does not gain a pixel.
const ONE_MINUS_EPSILON: f64 = 0.99999999999;

#[derive(Debug, Clone, PartialEq)]
enum Mapping {
    Identity,
    /// Mirror about the vertical center line, `x' = width - x`.
    Flip {
        width: f64,
    },
    Scale {
        fx: f64,
        fy: f64,
    },
    /// Rotation about the image centers, with the destination optionally scaled down first.
    Rotation {
        sin: f64,
        cos: f64,
        scale: f64,
        source_center: (f64, f64),
        destination_center: (f64, f64),
    },
    Shear {
        slope: (f64, f64),
        size: (f64, f64),
    },
    Linear {
        m: [[f64; 2]; 2],
        det: f64,
        offset: (f64, f64),
        source_height: f64,
        destination_height: f64,
    },
    /// Per destination column and row, how many source lines were skipped before it.
    Removal {
        columns: Vec<i64>,
        rows: Vec<i64>,
    },
}

impl Mapping {
    fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Mapping::Identity => (x, y),
            Mapping::Flip { width } => (width - x, y),
            Mapping::Scale { fx, fy } => (x * fx, y * fy),
            Mapping::Rotation {
                sin,
                cos,
                scale,
                source_center: (sx, sy),
                destination_center: (dx, dy),
            } => {
                let xp = (x - dx) * scale;
                let yp = (y - dy) * scale;
                (xp * cos + yp * sin + sx, -xp * sin + yp * cos + sy)
            }
            Mapping::Shear {
                slope: (kx, ky),
                size: (w, h),
            } => {
                let nx = if *kx >= 0.0 { x - kx * (y - h) } else { x - kx * y };
                let ny = if *ky >= 0.0 { y - ky * (w - x) } else { y - ky * x };
                (nx, ny)
            }
            Mapping::Linear {
                m,
                det,
                offset,
                source_height,
                destination_height,
            } => {
                // Undo the offset and flip to a y axis pointing up before inverting.
                let tx = offset.0 + x;
                let ty = offset.1 + (destination_height - y);
                let nx = (m[1][1] * tx - m[0][1] * ty) / det;
                let ny = source_height - (-m[1][0] * tx + m[0][0] * ty) / det;
                (nx, ny)
            }
            Mapping::Removal { columns, rows } => {
                let skip = |table: &Vec<i64>, v: f64| table.get(v as usize).copied().unwrap_or(0);
                (x + skip(columns, x) as f64, y + skip(rows, y) as f64)
            }
        }
    }
}

/// For `remove` lines spread evenly over `size`, the number removed before each kept line.
fn removal_table(
    size: i64,
    remove: i64,
) -> std::result::Result<Vec<i64>, String> {
    let kept = size - remove;
    let mut table = vec![0; kept.max(0) as usize];
    let mut d = 0;
    for i in 0..size {
        if i != 0 && i != kept - 1 && (d + 1) * size <= (remove + 1) * i {
            d += 1;
        }
        let slot = table
            .get_mut((i - d) as usize)
            .ok_or_else(|| format!("line {i} maps past the {kept} kept lines"))?;
        *slot = d;
    }
    if d != remove {
        return Err(format!("removed {d} lines instead of {remove}"));
    }
    Ok(table)
}

/// Largest scale at which the rotated image still covers a rectangle of the source aspect.
fn rotation_scale(width: u32, height: u32, radians: f64) -> f64 {
    let a = width.max(height) as f64;
    let b = width.min(height) as f64;
    let (s, c) = (radians.abs().sin(), radians.abs().cos());
    (b / (a * s + b * c)).abs().min((b / (a * s - b * c)).abs())
}

/// Invariant, cropping, flip, scaling, rotation, shearing, linear and row/column removal.
#[derive(Debug, Clone)]
pub struct Geometric {
    id: TransformerId,
    mapping: Mapping,
}

impl Geometric {
    pub fn new(id: TransformerId) -> Self {
        Geometric {
            id,
            mapping: Mapping::Identity,
        }
    }

    fn wrong_parameter(&self, parameter: &Parameter) -> PipelineError {
        PipelineError::invalid(
            self.name(),
            format!("unexpected parameter {parameter:?}"),
        )
    }

    fn setup_crop(&mut self, source: &SourceView<'_>, percent: u32) -> Result<TransformSetup> {
        if percent > 100 {
            return Err(PipelineError::invalid(
                self.name(),
                format!("cannot crop {percent}%"),
            ));
        }
        let keep = |size: i64| size * (100 - percent as i64) / 100;
        let (w, h) = (keep(source.width()), keep(source.height()));
        Ok(TransformSetup {
            width: w as u32,
            height: h as u32,
            offset: ((source.width() - w) / 2, (source.height() - h) / 2),
            label: Some(Label::new(
                format!("Cropping {percent}%"),
                format!("_cropping_{percent}"),
            )),
        })
    }

    fn setup_removal(
        &mut self,
        source: &SourceView<'_>,
        columns: u32,
        rows: u32,
    ) -> Result<TransformSetup> {
        let label = Label::new(
            format!("Remove {rows} row(s) and {columns} column(s) at regular intervals"),
            format!("_{rows}_row_{columns}_col_removed"),
        );
        let (w, h) = (source.width(), source.height());
        let mut columns = columns as i64;
        let mut rows = rows as i64;
        if columns > w / 2 {
            warn!("row/column removal: {columns} columns is too many, removing {}", w / 2);
            columns = w / 2;
        }
        if rows > h / 2 {
            warn!("row/column removal: {rows} rows is too many, removing {}", h / 2);
            rows = h / 2;
        }
        let stage = |reason| PipelineError::stage(Stage::Setup, "Row/column removal", reason);
        self.mapping = Mapping::Removal {
            columns: removal_table(w, columns).map_err(stage)?,
            rows: removal_table(h, rows).map_err(stage)?,
        };
        Ok(TransformSetup {
            width: (w - columns) as u32,
            height: (h - rows) as u32,
            offset: (0, 0),
            label: Some(label),
        })
    }

    fn setup_scale(&mut self, source: &SourceView<'_>, x: f64, y: f64) -> Result<TransformSetup> {
        if !(x > 0.0 && y > 0.0 && x.is_finite() && y.is_finite()) {
            return Err(PipelineError::invalid(
                self.name(),
                format!("scaling factors ({x}, {y}) must be positive and finite"),
            ));
        }
        let label = if x == y {
            Label::new(format!("Scaling {x:.2}"), format!("_scale_{x:.2}"))
        } else {
            Label::new(
                format!("Change aspect ratio - scale.x {x:.2} scale.y {y:.2}"),
                format!("_ratio_x_{x:.2}_y_{y:.2}"),
            )
        };
        self.mapping = Mapping::Scale {
            fx: 1.0 / x,
            fy: 1.0 / y,
        };
        Ok(TransformSetup {
            width: (source.width() as f64 * x + ONE_MINUS_EPSILON) as u32,
            height: (source.height() as f64 * y + ONE_MINUS_EPSILON) as u32,
            offset: (0, 0),
            label: Some(label),
        })
    }

    fn setup_rotation(&mut self, source: &SourceView<'_>, degrees: f64) -> Result<TransformSetup> {
        if !degrees.is_finite() {
            return Err(PipelineError::invalid(
                self.name(),
                format!("rotation angle {degrees} is not finite"),
            ));
        }
        let radians = degrees.to_radians();
        let (w, h) = (source.width() as u32, source.height() as u32);
        let scale = rotation_scale(w, h, radians);
        let (sin, cos) = radians.sin_cos();
        let rotation = |scale| Mapping::Rotation {
            sin,
            cos,
            scale,
            source_center: (0.0, 0.0),
            destination_center: (0.0, 0.0),
        };
        let setup = if self.id == TransformerId::RotationScale {
            self.mapping = rotation(scale);
            TransformSetup::same_as(source).with_label(Label::new(
                format!("Rotation {degrees:.2} with cropping and scaling"),
                format!("_rotation_scale_{degrees:.2}"),
            ))
        } else {
            self.mapping = rotation(1.0);
            TransformSetup {
                width: (w as f64 * scale + ONE_MINUS_EPSILON) as u32,
                height: (h as f64 * scale + ONE_MINUS_EPSILON) as u32,
                offset: (0, 0),
                label: Some(Label::new(
                    format!("Rotation {degrees:.2} with cropping"),
                    format!("_rotation_{degrees:.2}"),
                )),
            }
        };
        Ok(setup)
    }

    fn setup_shear(&mut self, source: &SourceView<'_>, x: f64, y: f64) -> Result<TransformSetup> {
        if !(x.is_finite() && y.is_finite()) {
            return Err(PipelineError::invalid(
                self.name(),
                format!("shear ({x}, {y}) is not finite"),
            ));
        }
        let (w, h) = (source.width() as f64, source.height() as f64);
        let shift = (-x * w / 100.0, -y * h / 100.0);
        self.mapping = Mapping::Shear {
            slope: (shift.0 / h, shift.1 / w),
            size: (w, h),
        };
        Ok(TransformSetup {
            width: (w - shift.0.abs()) as u32,
            height: (h - shift.1.abs()) as u32,
            offset: (0, 0),
            label: Some(Label::new(
                format!("Shearing - x-direction {x:.2}% y-direction {y:.2}%"),
                format!("_shearing_x_{x:.2}_y_{y:.2}"),
            )),
        })
    }

    fn setup_linear(&mut self, source: &SourceView<'_>, m: [[f64; 2]; 2]) -> Result<TransformSetup> {
        let [[a, b], [c, d]] = m;
        let det = a * d - b * c;
        if det == 0.0 || !det.is_finite() {
            return Err(PipelineError::SingularMatrix { a, b, c, d });
        }
        let (w, h) = (source.width() as f64, source.height() as f64);
        // Extent of the transformed image along one output axis.
        let extent = |p: f64, q: f64| {
            let corners = [p * w, q * h, p * w + q * h, 0.0];
            let min = corners.iter().copied().fold(f64::INFINITY, f64::min);
            let max = corners.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            (min, (max - min).ceil())
        };
        let (ox, width) = extent(a, b);
        let (oy, height) = extent(c, d);
        self.mapping = Mapping::Linear {
            m,
            det,
            offset: (ox, oy),
            source_height: h,
            destination_height: height,
        };
        Ok(TransformSetup {
            width: width as u32,
            height: height as u32,
            offset: (0, 0),
            label: Some(Label::new(
                format!("General linear transformation [[{a:.3} {b:.3}][{c:.3} {d:.3}]]"),
                format!("_linear_{a:.3}_{b:.3}_{c:.3}_{d:.3}"),
            )),
        })
    }
}

impl Capability for Geometric {
    fn name(&self) -> &'static str {
        match self.id {
            TransformerId::Invariant => "Invariant",
            TransformerId::Cropping => "Cropping",
            TransformerId::Flip => "Flip",
            TransformerId::Scale => "Scaling",
            TransformerId::Rotation => "Rotation with cropping",
            TransformerId::RotationScale => "Rotation with cropping and scaling",
            TransformerId::Shearing => "Shearing",
            TransformerId::Linear => "General linear transform",
            TransformerId::RowColumnRemoval => "Row/column removal",
            TransformerId::Distortion => "Geometric distortion",
        }
    }

    fn initialise(&mut self, source: &Image, destination: &Image) -> Result<()> {
        if let Mapping::Rotation {
            source_center,
            destination_center,
            ..
        } = &mut self.mapping
        {
            *source_center = (source.width() as f64 / 2.0, source.height() as f64 / 2.0);
            *destination_center = (
                destination.width() as f64 / 2.0,
                destination.height() as f64 / 2.0,
            );
        }
        Ok(())
    }

    fn cleanup(&mut self) -> Result<()> {
        self.mapping = Mapping::Identity;
        Ok(())
    }
}

impl Transformer for Geometric {
    fn setup(&mut self, pass: &PassContext<'_>, _rng: &mut dyn RngCore) -> Result<TransformSetup> {
        let source = pass.view();
        let parameter = &pass.config.parameter;
        self.mapping = Mapping::Identity;
        match (self.id, parameter) {
            (TransformerId::Invariant, _) => Ok(TransformSetup::same_as(&source)),
            (TransformerId::Flip, _) => {
                self.mapping = Mapping::Flip {
                    width: source.width() as f64,
                };
                Ok(TransformSetup::same_as(&source).with_label(Label::new("Flip", "_flip")))
            }
            (TransformerId::Cropping, Parameter::Crop(percent)) => {
                self.setup_crop(&source, *percent)
            }
            (TransformerId::RowColumnRemoval, Parameter::Remove { columns, rows }) => {
                self.setup_removal(&source, *columns, *rows)
            }
            (TransformerId::Scale, Parameter::Scale { x, y }) => self.setup_scale(&source, *x, *y),
            (TransformerId::Rotation | TransformerId::RotationScale, Parameter::Angle(degrees)) => {
                self.setup_rotation(&source, *degrees)
            }
            (TransformerId::Shearing, Parameter::Shear { x, y }) => {
                self.setup_shear(&source, *x, *y)
            }
            (TransformerId::Linear, Parameter::Matrix(m)) => self.setup_linear(&source, *m),
            _ => Err(self.wrong_parameter(parameter)),
        }
    }

    fn transform(
        &mut self,
        reconstructer: &mut dyn Reconstructer,
        source: &SourceView<'_>,
        rng: &mut dyn RngCore,
        x: f64,
        y: f64,
        channel: usize,
    ) -> f64 {
        let (sx, sy) = self.mapping.apply(x, y);
        reconstructer.reconstruct(source, rng, sx, sy, channel)
    }
}
