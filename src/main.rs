use stirmark as sm;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use sm::reconstruct::NyquistConfig;
use log::{error, info, warn};

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

/// Settings of the Nyquist reconstructer, ignored by every other one.
#[derive(Args)]
struct NyquistArgs {
    /// Nyquist rolloff along x; negative selects high-pass.
    #[clap(value_parser, long, allow_hyphen_values = true)]
    rolloff_x: Option<f64>,

    /// Nyquist rolloff along y; negative selects high-pass.
    #[clap(value_parser, long, allow_hyphen_values = true)]
    rolloff_y: Option<f64>,

    /// Nyquist cutoff, in lobes.
    #[clap(value_parser, long)]
    cutoff: Option<usize>,
}

impl NyquistArgs {
    fn apply(&self, config: &mut NyquistConfig) {
        if let Some(x) = self.rolloff_x {
            config.rolloff.0 = x;
        }
        if let Some(y) = self.rolloff_y {
            config.rolloff.1 = y;
        }
        if let Some(cutoff) = self.cutoff {
            config.cutoff = cutoff;
        }
    }
}

#[derive(Args)]
struct Attack {
    /// The image to attack.
    #[clap(action)]
    input: PathBuf,

    /// Where to write the attacked image; the extension selects the format.
    #[clap(action)]
    output: PathBuf,

    /// JSON file with the attack configuration, flags below override it.
    #[clap(value_parser, long)]
    config: Option<PathBuf>,

    /// Seed of the random generator.
    #[clap(value_parser, long)]
    seed: Option<u64>,

    /// Largest inwards corner displacement.
    #[clap(value_parser, long)]
    inwards: Option<f64>,

    /// Inwards displacement is in pixels instead of percent of the smaller side.
    #[clap(action, long)]
    inwards_absolute: bool,

    /// Largest outwards corner displacement.
    #[clap(value_parser, long)]
    outwards: Option<f64>,

    /// Outwards displacement is in percent of the smaller side instead of pixels.
    #[clap(action, long)]
    outwards_relative: bool,

    /// Bending factor.
    #[clap(value_parser, long)]
    bending: Option<f64>,

    /// Jitter factor.
    #[clap(value_parser, long)]
    jitter: Option<f64>,

    /// Largest transfer function deviation.
    #[clap(value_parser, long)]
    deviation: Option<f64>,

    /// Reconstructer sampling the warped image, e.g. nearest_neighbour, linear or nyquist.
    #[clap(value_parser = parse_serde::<sm::ReconstructerId>, long)]
    reconstructer: Option<sm::ReconstructerId>,

    #[clap(flatten)]
    nyquist: NyquistArgs,

    /// Parameter handling: fresh, save_main, load_main, save_full or load_full.
    #[clap(value_parser = parse_serde::<sm::ParameterMode>, long)]
    parameters: Option<sm::ParameterMode>,

    /// File the distortion parameters are saved to or loaded from.
    #[clap(value_parser, long)]
    parameter_file: Option<PathBuf>,

    /// JPEG quality applied after the attack.
    #[clap(value_parser, long)]
    quality: Option<u8>,

    /// Skip the JPEG compression after the attack.
    #[clap(action, long)]
    no_jpeg: bool,
}

#[derive(Args)]
struct Bench {
    /// The image to benchmark.
    #[clap(action)]
    input: PathBuf,

    /// Prefix of the output files, defaults to the input file stem.
    #[clap(value_parser, long)]
    basename: Option<String>,

    /// Test set to run, by code or name; everything when absent.
    #[clap(value_parser, long)]
    set: Option<sm::TestSet>,

    /// Directory the outputs are written to.
    #[clap(default_value = ".", value_parser, long)]
    output_dir: PathBuf,

    /// JSON benchmark table replacing the standard one.
    #[clap(value_parser, long)]
    table: Option<PathBuf>,

    /// Seed of the random generator.
    #[clap(value_parser, long)]
    seed: Option<u64>,

    /// Only report, do not write any images.
    #[clap(action, long)]
    no_save: bool,

    #[clap(flatten)]
    nyquist: NyquistArgs,
}

#[derive(Args)]
struct Psnr {
    /// The reference image.
    #[clap(action)]
    original: PathBuf,

    /// The image to score.
    #[clap(action)]
    modified: PathBuf,

    /// Also write the stretched difference image here.
    #[clap(value_parser, long)]
    diff: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply the StirMark attack to an image.
    Attack(Attack),
    /// Run the benchmark tests against an image.
    Bench(Bench),
    /// Compare two images.
    Psnr(Psnr),
    /// Print the standard benchmark table as JSON.
    DumpTable,
}

/// Parse a unit enum variant by its snake case name.
fn parse_serde<T: serde::de::DeserializeOwned>(s: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| format!("unknown value '{s}'"))
}

fn orchestrator(seed: Option<u64>) -> sm::Orchestrator {
    match seed {
        Some(seed) => sm::Orchestrator::seeded(seed),
        None => sm::Orchestrator::from_entropy(),
    }
}

fn attack_config(v: &Attack) -> sm::Result<sm::AttackConfig> {
    let mut config = match &v.config {
        Some(path) => sm::AttackConfig::from_json_file(path)?,
        None => sm::AttackConfig::default(),
    };
    let d = &mut config.distortion;
    if let Some(inwards) = v.inwards {
        d.inwards = inwards;
    }
    if v.inwards_absolute {
        d.relative_inwards = false;
    }
    if let Some(outwards) = v.outwards {
        d.outwards = outwards;
    }
    if v.outwards_relative {
        d.relative_outwards = true;
    }
    if let Some(bending) = v.bending {
        d.bending = bending;
    }
    if let Some(jitter) = v.jitter {
        d.jitter = jitter;
    }
    if let Some(deviation) = v.deviation {
        d.deviation = deviation;
    }
    if let Some(mode) = v.parameters {
        d.parameters = mode;
    }
    if let Some(file) = &v.parameter_file {
        d.parameter_file = Some(file.clone());
    }
    if let Some(quality) = v.quality {
        d.jpeg_quality = quality;
    }
    if let Some(reconstructer) = v.reconstructer {
        config.reconstructer = reconstructer;
    }
    v.nyquist.apply(&mut config.nyquist);
    if v.seed.is_some() {
        config.seed = v.seed;
    }
    if v.no_jpeg {
        config.jpeg = false;
    }
    Ok(config)
}

fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"))
}

fn attack(v: &Attack) -> sm::Result<()> {
    let mut config = attack_config(v)?;
    let source = sm::Image::open(&v.input)?;

    // A JPEG output is compressed once, when it is written.
    let compress_on_write = config.jpeg && is_jpeg(&v.output);
    if compress_on_write {
        config.jpeg = false;
    }
    let mut orchestrator = orchestrator(config.seed);
    let attacked = match sm::stirmark(&source, &config, &mut orchestrator) {
        Ok(img) => img,
        Err(e) if !e.is_fatal() => {
            warn!("{e}, no output written");
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    if compress_on_write {
        std::fs::write(&v.output, attacked.encode_jpeg(config.distortion.jpeg_quality)?)?;
    } else {
        attacked.to_dynamic()?.save(&v.output)?;
    }
    if attacked.same_shape(&source) {
        info!("{} - {}", v.output.display(), sm::psnr(&attacked, &source));
    }
    Ok(())
}

fn bench(v: &Bench) -> sm::Result<()> {
    let source = sm::Image::open(&v.input)?;
    let basename = match &v.basename {
        Some(b) => b.clone(),
        None => v
            .input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string()),
    };
    let mut benchmark = sm::Benchmark::new(basename, &v.output_dir);
    if let Some(table) = &v.table {
        benchmark.table = sm::BenchmarkTable::load(table)?;
    }
    benchmark.selection = v.set;
    benchmark.save = !v.no_save;
    v.nyquist.apply(&mut benchmark.nyquist);

    let reports = benchmark.run(&mut orchestrator(v.seed), &source)?;
    for report in reports.iter() {
        println!("{report}");
    }
    Ok(())
}

fn psnr(v: &Psnr) -> sm::Result<()> {
    let original = sm::Image::open(&v.original)?;
    let modified = sm::Image::open(&v.modified)?;
    println!("{}", sm::psnr(&original, &modified));
    match sm::snr(&original, &modified) {
        sm::Quality::Decibels(db) => println!("SNR = {db:.6}"),
        sm::Quality::Identical => println!("SNR = inf"),
        sm::Quality::NotMeaningful => println!("SNR not meaningful"),
    }
    if let Some(path) = &v.diff {
        sm::util::difference_image(&original, &modified)?
            .to_dynamic()?
            .save(path)?;
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Attack(v) => attack(v),
        Commands::Bench(v) => bench(v),
        Commands::Psnr(v) => psnr(v),
        Commands::DumpTable => sm::BenchmarkTable::standard()
            .to_json()
            .map(|json| println!("{json}")),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
