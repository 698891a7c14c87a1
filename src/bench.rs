//! The benchmark driver: a table of test entries, each run once per parameter value.
//!
//! Every completed pass is scored against the source (unless it changed the image size), saved
//! under `<basename><suffix>` and reported on the log. The JPEG compression sweep is not a
//! pipeline pass and runs after the table.

use crate::error::{PipelineError, Result};
use crate::pipeline::{Orchestrator, Parameter, PassConfig, PassOutcome};
use crate::quality::{psnr, Quality};
use crate::raster::{with_extension, BorderPolicy, Image};
use crate::reconstruct::{
    ConvolutionKernel, MedianWindow, NyquistConfig, ReconstructerId, DEFAULT_RECONSTRUCTER,
};
use crate::sampler::SamplerId;
use crate::transform::{DistortionOptions, TransformerId};
use log::info;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// JPEG quality of the saved benchmark outputs.
pub const JPEG_QUALITY: u8 = 90;

/// Groups of tests, selectable on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestSet {
    Filtering,
    MedianFiltering,
    Compression,
    Scaling,
    Shearing,
    AspectRatio,
    GeneralLinear,
    RotationCrop,
    RotationScale,
    Cropping,
    Flip,
    RowColumnRemoval,
    GeometricDistortion,
}

impl TestSet {
    pub const ALL: [TestSet; 13] = [
        TestSet::Filtering,
        TestSet::MedianFiltering,
        TestSet::Compression,
        TestSet::Scaling,
        TestSet::Shearing,
        TestSet::AspectRatio,
        TestSet::GeneralLinear,
        TestSet::RotationCrop,
        TestSet::RotationScale,
        TestSet::Cropping,
        TestSet::Flip,
        TestSet::RowColumnRemoval,
        TestSet::GeometricDistortion,
    ];

    /// The stable numeric code of the set.
    pub fn code(self) -> u32 {
        match self {
            TestSet::Filtering => 11,
            TestSet::MedianFiltering => 12,
            TestSet::Compression => 21,
            TestSet::Scaling => 31,
            TestSet::Shearing => 32,
            TestSet::AspectRatio => 33,
            TestSet::GeneralLinear => 34,
            TestSet::RotationCrop => 35,
            TestSet::RotationScale => 36,
            TestSet::Cropping => 41,
            TestSet::Flip => 42,
            TestSet::RowColumnRemoval => 43,
            TestSet::GeometricDistortion => 51,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        TestSet::ALL.into_iter().find(|s| s.code() == code)
    }

    /// Whether the source is mirrored at its borders; only the distortion reaches outside.
    pub fn mirrors_borders(self) -> bool {
        self == TestSet::GeometricDistortion
    }

    /// Whether outputs are saved as PGM/PPM.
    pub fn saves_pnm(self) -> bool {
        self != TestSet::GeometricDistortion
    }

    /// Whether outputs are saved as JPEG.
    pub fn saves_jpeg(self) -> bool {
        self != TestSet::Flip
    }
}

impl std::str::FromStr for TestSet {
    type Err = String;

    /// Accepts the numeric code or the snake case name.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if let Ok(code) = s.parse::<u32>() {
            return TestSet::from_code(code).ok_or_else(|| format!("no test set {code}"));
        }
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| format!("no test set named '{s}'"))
    }
}

/// One row of the benchmark table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestEntry {
    pub set: TestSet,
    pub reconstructer: ReconstructerId,
    pub transformer: TransformerId,
    #[serde(default)]
    pub sampler: SamplerId,
    /// The entry runs once per parameter.
    pub parameters: Vec<Parameter>,
}

impl TestEntry {
    fn new(
        set: TestSet,
        reconstructer: ReconstructerId,
        transformer: TransformerId,
        parameters: Vec<Parameter>,
    ) -> Self {
        TestEntry {
            set,
            reconstructer,
            transformer,
            sampler: SamplerId::Point,
            parameters,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkTable {
    pub entries: Vec<TestEntry>,
    /// Qualities of the JPEG compression sweep.
    pub jpeg_qualities: Vec<u8>,
}

impl Default for BenchmarkTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl BenchmarkTable {
    /// The published benchmark.
    pub fn standard() -> Self {
        use ReconstructerId::*;
        let pairs = |v: &[(f64, f64)], f: fn(f64, f64) -> Parameter| {
            v.iter().map(|(x, y)| f(*x, *y)).collect::<Vec<_>>()
        };
        let angles: Vec<Parameter> = [
            -2.0, -1.0, -0.75, -0.5, -0.25, 2.0, 1.0, 0.75, 0.5, 0.25, 5.0, 10.0, 15.0, 30.0, 45.0,
            90.0,
        ]
        .into_iter()
        .map(Parameter::Angle)
        .collect();

        let entries = vec![
            TestEntry::new(
                TestSet::Cropping,
                NearestNeighbour,
                TransformerId::Cropping,
                [1, 2, 5, 10, 15, 20, 25, 50, 75].into_iter().map(Parameter::Crop).collect(),
            ),
            TestEntry::new(
                TestSet::RowColumnRemoval,
                NearestNeighbour,
                TransformerId::RowColumnRemoval,
                [(1, 1), (1, 5), (5, 1), (5, 17), (17, 5)]
                    .into_iter()
                    .map(|(columns, rows)| Parameter::Remove { columns, rows })
                    .collect(),
            ),
            TestEntry::new(
                TestSet::Flip,
                NearestNeighbour,
                TransformerId::Flip,
                vec![Parameter::None],
            ),
            TestEntry::new(
                TestSet::Scaling,
                DEFAULT_RECONSTRUCTER,
                TransformerId::Scale,
                pairs(
                    &[(0.5, 0.5), (0.75, 0.75), (0.9, 0.9), (1.1, 1.1), (1.5, 1.5), (2.0, 2.0)],
                    |x, y| Parameter::Scale { x, y },
                ),
            ),
            TestEntry::new(
                TestSet::AspectRatio,
                DEFAULT_RECONSTRUCTER,
                TransformerId::Scale,
                pairs(
                    &[
                        (1.0, 0.8),
                        (1.0, 0.9),
                        (1.0, 1.1),
                        (1.0, 1.2),
                        (0.8, 1.0),
                        (0.9, 1.0),
                        (1.1, 1.0),
                        (1.2, 1.0),
                    ],
                    |x, y| Parameter::Scale { x, y },
                ),
            ),
            TestEntry::new(
                TestSet::RotationCrop,
                DEFAULT_RECONSTRUCTER,
                TransformerId::Rotation,
                angles.clone(),
            ),
            TestEntry::new(
                TestSet::RotationScale,
                DEFAULT_RECONSTRUCTER,
                TransformerId::RotationScale,
                angles,
            ),
            TestEntry::new(
                TestSet::Shearing,
                DEFAULT_RECONSTRUCTER,
                TransformerId::Shearing,
                pairs(
                    &[(0.0, 1.0), (0.0, 5.0), (1.0, 0.0), (5.0, 0.0), (1.0, 1.0), (5.0, 5.0)],
                    |x, y| Parameter::Shear { x, y },
                ),
            ),
            TestEntry::new(
                TestSet::GeneralLinear,
                DEFAULT_RECONSTRUCTER,
                TransformerId::Linear,
                vec![
                    Parameter::Matrix([[1.010, 0.013], [0.009, 1.011]]),
                    Parameter::Matrix([[1.007, 0.010], [0.010, 1.012]]),
                    Parameter::Matrix([[1.013, 0.008], [0.011, 1.008]]),
                ],
            ),
            TestEntry::new(
                TestSet::GeometricDistortion,
                DEFAULT_RECONSTRUCTER,
                TransformerId::Distortion,
                vec![Parameter::Distortion(DistortionOptions::default())],
            ),
            TestEntry::new(
                TestSet::Filtering,
                ConvolutionFilter,
                TransformerId::Invariant,
                vec![
                    Parameter::Kernel(ConvolutionKernel::gaussian()),
                    Parameter::Kernel(ConvolutionKernel::sharpening()),
                ],
            ),
            TestEntry::new(
                TestSet::MedianFiltering,
                MedianFilter,
                TransformerId::Invariant,
                [3, 5, 7, 9]
                    .into_iter()
                    .map(|s| Parameter::Window(MedianWindow::square(s)))
                    .collect(),
            ),
        ];

        BenchmarkTable {
            entries,
            jpeg_qualities: vec![90, 80, 70, 60, 50, 40, 35, 30, 25, 20, 15, 10],
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|source| PipelineError::ParameterFile {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// How a single test went.
#[derive(Debug, Clone, PartialEq)]
pub enum TestOutcome {
    Scored(Quality),
    /// The image size changed, so there is nothing to compare against.
    Unscored,
    Abandoned(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestReport {
    pub basename: String,
    pub set: TestSet,
    pub test_name: String,
    pub outcome: TestOutcome,
    /// Files written for this test.
    pub outputs: Vec<PathBuf>,
}

impl std::fmt::Display for TestReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.basename, self.test_name)?;
        match &self.outcome {
            TestOutcome::Scored(Quality::Decibels(v)) => write!(f, " - PSNR = {v:.6}"),
            TestOutcome::Scored(_) => write!(f, " - PSNR not meaningful"),
            TestOutcome::Unscored => Ok(()),
            TestOutcome::Abandoned(reason) => write!(f, " - abandoned: {reason}"),
        }
    }
}

/// Runs a [`BenchmarkTable`] against one image.
#[derive(Debug, Clone)]
pub struct Benchmark {
    pub table: BenchmarkTable,
    /// Prefix of every output file name and progress line.
    pub basename: String,
    pub output_dir: PathBuf,
    /// Run only this set, or everything when `None`.
    pub selection: Option<TestSet>,
    pub nyquist: NyquistConfig,
    pub jpeg_quality: u8,
    /// Write the outputs to disk.
    pub save: bool,
}

impl Benchmark {
    pub fn new(basename: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Benchmark {
            table: BenchmarkTable::standard(),
            basename: basename.into(),
            output_dir: output_dir.into(),
            selection: None,
            nyquist: NyquistConfig::default(),
            jpeg_quality: JPEG_QUALITY,
            save: true,
        }
    }

    fn selected(&self, set: TestSet) -> bool {
        self.selection.map_or(true, |s| s == set)
    }

    fn stem(&self, suffix: &str) -> PathBuf {
        self.output_dir.join(format!("{}{suffix}", self.basename))
    }

    fn report(&self, set: TestSet, test_name: String, outcome: TestOutcome, outputs: Vec<PathBuf>) -> TestReport {
        let report = TestReport {
            basename: self.basename.clone(),
            set,
            test_name,
            outcome,
            outputs,
        };
        info!("{report}");
        report
    }

    /// Run every selected test; only fatal errors stop the run.
    pub fn run<R: RngCore>(
        &self,
        orchestrator: &mut Orchestrator<R>,
        source: &Image,
    ) -> Result<Vec<TestReport>> {
        let mut reports = Vec::new();
        for entry in self.table.entries.iter().filter(|e| self.selected(e.set)) {
            for parameter in &entry.parameters {
                reports.push(self.run_entry(orchestrator, source, entry, parameter)?);
            }
        }
        if self.selected(TestSet::Compression) {
            for quality in &self.table.jpeg_qualities {
                reports.push(self.compress(source, *quality)?);
            }
        }
        Ok(reports)
    }

    fn run_entry<R: RngCore>(
        &self,
        orchestrator: &mut Orchestrator<R>,
        source: &Image,
        entry: &TestEntry,
        parameter: &Parameter,
    ) -> Result<TestReport> {
        let border = if entry.set.mirrors_borders() {
            BorderPolicy::Mirror
        } else {
            BorderPolicy::Zero
        };
        let config = PassConfig::new(entry.reconstructer, entry.transformer, entry.sampler)
            .with_parameter(parameter.clone())
            .with_border(border)
            .with_nyquist(self.nyquist);

        let result = match orchestrator.run(source, &config)? {
            PassOutcome::Completed(result) => result,
            PassOutcome::Abandoned(e) => {
                let name = format!("{:?} {parameter:?}", entry.set);
                return Ok(self.report(entry.set, name, TestOutcome::Abandoned(e.to_string()), vec![]));
            }
        };

        let outcome = if result.image.same_shape(source) {
            TestOutcome::Scored(psnr(&result.image, source))
        } else {
            TestOutcome::Unscored
        };
        let mut outputs = Vec::new();
        if self.save {
            let stem = self.stem(&result.label.file_suffix);
            if entry.set.saves_pnm() {
                outputs.push(result.image.save_pnm(&stem)?);
            }
            if entry.set.saves_jpeg() {
                outputs.push(result.image.save_jpeg(&stem, self.jpeg_quality)?);
            }
        }
        Ok(self.report(entry.set, result.label.test_name, outcome, outputs))
    }

    /// JPEG round trip at `quality`.
    fn compress(&self, source: &Image, quality: u8) -> Result<TestReport> {
        let bytes = source.encode_jpeg(quality)?;
        let mut outputs = Vec::new();
        if self.save {
            let path = with_extension(&self.stem(&format!("_JPEG_{quality}")), "jpg");
            std::fs::write(&path, &bytes)?;
            outputs.push(path);
        }
        let decoded = Image::decode(&bytes)?;
        Ok(self.report(
            TestSet::Compression,
            format!("JPEG compression {quality}"),
            TestOutcome::Scored(psnr(&decoded, source)),
            outputs,
        ))
    }
}
