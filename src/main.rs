use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use docx_pii::config::{init_default_config, locate_config};
use docx_pii::error::{PipelineError, Stage};
use docx_pii::labels::{LabelGroup, LabelSelection};
use docx_pii::models::http::HttpDetector;
use docx_pii::models::pattern::PatternDetector;
use docx_pii::models::EntityDetector;
use docx_pii::pipeline::{
    render, render_failures, Command, DetectorKind, DocumentOutcome, DocumentReport, Overrides,
    Pipeline, PipelineConfig, ReplaceMode, ReportFormat,
};
use docx_pii::progress::ConsoleProgress;
use docx_pii::replace::ValueGenerator;
use docx_pii::synthetic::{PlaceholderGenerator, SyntheticGenerator};

#[derive(Parser, Debug)]
#[command(name = "docx-pii")]
#[command(about = "Find and replace PII/PHI/PCI in .docx files without losing formatting", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (default: $DOCX_PII_CONFIG, then docx-pii.toml searched upwards)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// No progress lines on stderr
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Report sensitive entities found in each document
    Detect(DetectArgs),

    /// Write a copy of each document with sensitive entities replaced
    Replace(ReplaceArgs),

    /// Write a default docx-pii.toml, then exit
    InitConfig {
        /// Directory to write the config to (default: current directory)
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,

        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug)]
struct LabelArgs {
    /// Only personal identifiers
    #[arg(long, conflicts_with_all = ["phi", "pci", "pii_types"])]
    pii: bool,

    /// Only health information
    #[arg(long, conflicts_with_all = ["pci", "pii_types"])]
    phi: bool,

    /// Only payment card data
    #[arg(long, conflicts_with = "pii_types")]
    pci: bool,

    /// Explicit labels, e.g. `email_address phone_number`
    #[arg(long, num_args = 1.., value_name = "LABEL")]
    pii_types: Vec<String>,
}

impl LabelArgs {
    fn selection(&self) -> LabelSelection {
        if self.pii {
            LabelSelection::Group(LabelGroup::Pii)
        } else if self.phi {
            LabelSelection::Group(LabelGroup::Phi)
        } else if self.pci {
            LabelSelection::Group(LabelGroup::Pci)
        } else if !self.pii_types.is_empty() {
            LabelSelection::Explicit(self.pii_types.clone())
        } else {
            LabelSelection::All
        }
    }
}

#[derive(Args, Debug)]
struct DetectorArgs {
    /// Minimum confidence score (detect: 0.5, replace: 0.3)
    #[arg(long)]
    threshold: Option<f32>,

    /// Detector backend
    #[arg(long, value_enum)]
    detector: Option<DetectorKind>,

    /// Inference server URL for the http detector
    #[arg(long)]
    endpoint: Option<String>,

    /// Model name sent to the inference server
    #[arg(long)]
    model: Option<String>,

    /// Texts per detector request
    #[arg(long)]
    batch_size: Option<usize>,

    /// Worker threads (0 = one per core)
    #[arg(long)]
    jobs: Option<usize>,
}

#[derive(Args, Debug)]
struct DetectArgs {
    #[arg(value_name = "DOCX", required = true)]
    files: Vec<PathBuf>,

    #[command(flatten)]
    labels: LabelArgs,

    #[command(flatten)]
    detector: DetectorArgs,

    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    format: ReportFormat,

    /// Write the report to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ReplaceArgs {
    #[arg(value_name = "DOCX", required = true)]
    files: Vec<PathBuf>,

    #[command(flatten)]
    labels: LabelArgs,

    #[command(flatten)]
    detector: DetectorArgs,

    /// Output .docx for a single input (default: <input_stem>_anonymized.docx)
    #[arg(short, long, value_name = "DOCX", conflicts_with = "output_dir")]
    output: Option<PathBuf>,

    /// Directory for anonymized copies
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Also write a JSON report of every replacement
    #[arg(long, value_name = "JSON")]
    report: Option<PathBuf>,

    /// Use [REDACTED:<label>] instead of synthetic values
    #[arg(long)]
    placeholder: bool,

    /// Seed for reproducible synthetic values
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> anyhow::Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let progress = ConsoleProgress::new(!cli.quiet);

    match cli.command {
        Commands::InitConfig { dir, force } => {
            let dir = dir.unwrap_or_else(|| {
                std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
            });
            let cfg_path = init_default_config(&dir, force).context("init default config")?;
            eprintln!("Wrote config: {}", cfg_path.display());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Detect(args) => run_detect(cli.config.as_deref(), args, &progress),
        Commands::Replace(args) => run_replace(cli.config.as_deref(), args, &progress),
    }
}

fn load_config(
    explicit: Option<&Path>,
    files: &[PathBuf],
    command: Command,
    labels: &LabelArgs,
    overrides: &Overrides,
) -> anyhow::Result<PipelineConfig> {
    let labels = labels.selection().resolve()?;
    let workdir = files
        .first()
        .and_then(|f| f.parent())
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let path = locate_config(explicit, workdir);
    PipelineConfig::load(path, command, labels, overrides).context("build config")
}

fn overrides(d: &DetectorArgs) -> Overrides {
    Overrides {
        detector: d.detector,
        endpoint: d.endpoint.clone(),
        model: d.model.clone(),
        threshold: d.threshold,
        batch_size: d.batch_size,
        jobs: d.jobs,
        ..Overrides::default()
    }
}

fn build_detector(cfg: &PipelineConfig) -> anyhow::Result<Box<dyn EntityDetector>> {
    let detector: Box<dyn EntityDetector> = match cfg.detector.kind {
        DetectorKind::Http => Box::new(
            HttpDetector::new(&cfg.detector.endpoint, &cfg.detector.model, cfg.detector.timeout)
                .context("create http detector")?,
        ),
        DetectorKind::Pattern => Box::new(PatternDetector),
    };
    Ok(detector)
}

fn build_generator(cfg: &PipelineConfig) -> Box<dyn ValueGenerator> {
    match cfg.replace_mode {
        ReplaceMode::Synthetic => Box::new(SyntheticGenerator),
        ReplaceMode::Placeholder => Box::new(PlaceholderGenerator),
    }
}

fn run_detect(
    config: Option<&Path>,
    args: DetectArgs,
    progress: &ConsoleProgress,
) -> anyhow::Result<ExitCode> {
    let o = overrides(&args.detector);
    let cfg = load_config(config, &args.files, Command::Detect, &args.labels, &o)?;
    let detector = build_detector(&cfg)?;
    let generator = PlaceholderGenerator;
    let pipeline = Pipeline::new(detector.as_ref(), &generator, &cfg, progress)?;

    let outcomes = pipeline.run_paths(&args.files);
    let (reports, failures) = split_outcomes(outcomes);

    let rendered = render(&reports, args.format)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, &rendered)
                .with_context(|| format!("write report: {}", path.display()))?;
            progress.info(format!("Report written to {}", path.display()));
        }
        None => print!("{rendered}"),
    }
    Ok(finish(&failures))
}

fn run_replace(
    config: Option<&Path>,
    args: ReplaceArgs,
    progress: &ConsoleProgress,
) -> anyhow::Result<ExitCode> {
    if args.output.is_some() && args.files.len() > 1 {
        anyhow::bail!("--output takes a single input; use --output-dir for several documents");
    }
    let o = Overrides {
        seed: args.seed,
        placeholder: args.placeholder,
        ..overrides(&args.detector)
    };
    let cfg = load_config(config, &args.files, Command::Replace, &args.labels, &o)?;
    let detector = build_detector(&cfg)?;
    let generator = build_generator(&cfg);
    let pipeline = Pipeline::new(detector.as_ref(), generator.as_ref(), &cfg, progress)?;

    if let Some(dir) = &args.output_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create output dir: {}", dir.display()))?;
    }

    let outcomes = pipeline.run_paths(&args.files);
    let mut reports = Vec::new();
    let mut failures = Vec::new();
    for (input, outcome) in args.files.iter().zip(outcomes) {
        let result = match outcome {
            Ok(r) => r,
            Err(e) => {
                failures.push(e);
                continue;
            }
        };
        let target = output_path(input, args.output.as_deref(), args.output_dir.as_deref());
        let bytes = result.output.unwrap_or_default();
        match std::fs::write(&target, bytes)
            .with_context(|| format!("write output docx: {}", target.display()))
        {
            Ok(()) => {
                progress.info(format!(
                    "{}: {} entities replaced -> {}",
                    result.id,
                    result.report.entities.len(),
                    target.display()
                ));
                reports.push(result.report);
            }
            Err(e) => failures.push(PipelineError::io(&result.id, Stage::Write, e)),
        }
    }

    if let Some(path) = &args.report {
        let json = render(&reports, ReportFormat::Json)?;
        std::fs::write(path, json).with_context(|| format!("write report: {}", path.display()))?;
        progress.info(format!("Report written to {}", path.display()));
    }
    Ok(finish(&failures))
}

fn split_outcomes(outcomes: Vec<DocumentOutcome>) -> (Vec<DocumentReport>, Vec<PipelineError>) {
    let mut reports = Vec::new();
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(r) => reports.push(r.report),
            Err(e) => failures.push(e),
        }
    }
    (reports, failures)
}

fn finish(failures: &[PipelineError]) -> ExitCode {
    if failures.is_empty() {
        return ExitCode::SUCCESS;
    }
    eprint!("{}", render_failures(failures));
    ExitCode::FAILURE
}

fn output_path(input: &Path, output: Option<&Path>, output_dir: Option<&Path>) -> PathBuf {
    if let Some(p) = output {
        return p.to_path_buf();
    }
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output")
        .to_string();
    let name = format!("{stem}_anonymized.docx");
    match output_dir {
        Some(dir) => dir.join(name),
        None => input.with_file_name(name),
    }
}
