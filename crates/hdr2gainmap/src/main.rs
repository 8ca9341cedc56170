mod logging;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use libgainmap::writer::EncodePlan;
use libgainmap::{
    BatchConfig, ContextPolicy, ContextProvider, ConversionRequest, GainMapStyle, ImageServices,
    NativeServices, OutputFormat, run_batch,
};

use clap::{Parser, ValueEnum};
use log::{LevelFilter, error, info, warn};

const EXIT_FAILED_FILES: u8 = 1;
const EXIT_INVALID_ARGUMENTS: u8 = 2;

#[derive(ValueEnum, Debug, Clone, Copy)]
enum FormatArg {
    Heif,
    Jpeg,
    Png,
    Tiff,
}

impl From<FormatArg> for OutputFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Heif => OutputFormat::Heif,
            FormatArg::Jpeg => OutputFormat::Jpeg,
            FormatArg::Png => OutputFormat::Png,
            FormatArg::Tiff => OutputFormat::Tiff,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum ContextArg {
    Shared,
    PerJob,
}

impl From<ContextArg> for ContextPolicy {
    fn from(context: ContextArg) -> Self {
        match context {
            ContextArg::Shared => ContextPolicy::Shared,
            ContextArg::PerJob => ContextPolicy::PerJob,
        }
    }
}

/// HEIF needs libheif; without it the default output is JPEG.
const DEFAULT_FORMAT: FormatArg = if cfg!(feature = "heif") { FormatArg::Heif } else { FormatArg::Jpeg };

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// PQ or HLG PNG files, or directories whose PNG files are all converted.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    /// Directory the output files are written to.
    #[arg(short='o', long="output", default_value = ".")]
    output_directory: PathBuf,
    /// Encoder quality in (0, 1]; values above 1 are read as percentages.
    #[arg(short='q', long="quality")]
    quality: Option<f64>,
    /// Color space override: srgb, p3, rec2020 and their aliases.
    #[arg(short='c', long="color-space", default_value = "")]
    color_space: String,
    /// Bits per sample: 8, 10 or 16.
    #[arg(short='d', long="depth", default_value_t = 8)]
    bit_depth: u32,
    /// Write the tone-mapped SDR rendition only.
    #[arg(long)]
    sdr: bool,
    /// Write the PQ rendition only.
    #[arg(long)]
    pq: bool,
    /// Write the HLG rendition only.
    #[arg(long)]
    hlg: bool,
    /// Write a single-channel gain map readable by more viewers.
    #[arg(long)]
    mono: bool,
    #[arg(short='f', long="format", value_enum, default_value_t = DEFAULT_FORMAT)]
    format: FormatArg,
    /// Conversions running at once, and files per batch.
    #[arg(short='j', long="jobs", default_value_t = libgainmap::batch::DEFAULT_CONCURRENCY)]
    jobs: usize,
    /// Pause between batches, in milliseconds.
    #[arg(long="batch-delay-ms", default_value_t = 100)]
    batch_delay_ms: u64,
    /// Whether conversions share one image services object or each get their own.
    #[arg(long="context", value_enum, default_value_t = ContextArg::Shared)]
    context: ContextArg,
    /// Also append the log to this file.
    #[arg(long="log-file")]
    log_file_path: Option<PathBuf>,
    /// More output; repeat for trace logging.
    #[arg(short='v', long="verbose", action = clap::ArgAction::Count)]
    verbose: u8,
    /// Only report warnings and errors.
    #[arg(long)]
    quiet: bool,
}

impl Args {
    fn level(&self) -> LevelFilter {
        if self.quiet {
            return LevelFilter::Warn;
        }
        match self.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

fn is_png(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
}

/// Files as given, directories expanded (non-recursively) to their PNG files in name order.
fn collect_sources(inputs: &[PathBuf]) -> std::io::Result<Vec<PathBuf>> {
    let mut sources = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(input)?
                .filter_map(|entry| entry.ok().map(|entry| entry.path()))
                .filter(|path| path.is_file() && is_png(path))
                .collect();
            found.sort();
            if found.is_empty() {
                warn!("No PNG files in {}", input.display());
            }
            sources.extend(found);
        } else {
            sources.push(input.clone());
        }
    }
    Ok(sources)
}

fn main() -> ExitCode {
    let args = Args::parse();

    let mut logging_config = logging::LoggingConfig::default().level(args.level());
    if let Some(log_file_path) = &args.log_file_path {
        logging_config = logging_config.output_to_file(log_file_path);
    }
    if let Err(e) = logging_config.apply() {
        eprintln!("Failed to set up logging: {}", e);
        return ExitCode::from(EXIT_INVALID_ARGUMENTS);
    }

    let sources = match collect_sources(&args.inputs) {
        Ok(sources) => sources,
        Err(e) => {
            error!("Error reading inputs: {}", e);
            return ExitCode::from(EXIT_INVALID_ARGUMENTS);
        },
    };
    let Some(first_source) = sources.first() else {
        error!("Nothing to convert");
        return ExitCode::from(EXIT_INVALID_ARGUMENTS);
    };

    let mut builder = ConversionRequest::builder(first_source, &args.output_directory)
        .color_space(args.color_space.as_str())
        .bit_depth(args.bit_depth)
        .sdr(args.sdr)
        .pq(args.pq)
        .hlg(args.hlg)
        .gain_map_style(if args.mono { GainMapStyle::Mono } else { GainMapStyle::Rgb })
        .output_format(args.format.into());
    if let Some(quality) = args.quality {
        builder = builder.quality(quality);
    }

    let template = match builder.build() {
        Ok(template) => template,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(EXIT_INVALID_ARGUMENTS);
        },
    };
    // Checked once here so a bad combination is reported once, not per file.
    if let Err(e) = EncodePlan::new(&template) {
        error!("{}", e);
        return ExitCode::from(EXIT_INVALID_ARGUMENTS);
    }

    if let Err(e) = std::fs::create_dir_all(&args.output_directory) {
        error!("Error creating output directory {}: {}", args.output_directory.display(), e);
        return ExitCode::from(EXIT_FAILED_FILES);
    }

    let provider = ContextProvider::new(args.context.into(), || {
        Arc::new(NativeServices::new()) as Arc<dyn ImageServices>
    });
    let config = BatchConfig {
        concurrency: args.jobs,
        inter_batch_delay: Duration::from_millis(args.batch_delay_ms),
        cancel: None,
    };

    let total = sources.len();
    let report = run_batch(
        &sources,
        &template,
        &config,
        &provider,
        |completed| info!("[{}/{}]", completed, total),
        |report| {
            for (source, e) in &report.failed {
                error!("{}: {}", source.display(), e);
            }
        },
    );

    if report.failed.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_FAILED_FILES)
    }
}
