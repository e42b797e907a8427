use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};
use tracing_subscriber::EnvFilter;

use conduct2d::io::{load_surrogate, read_config, read_dataset, to_result_string, write_result_json};
use conduct2d::{
    HomogConfig, InMemoryDataset, MicrostructureSource, SimContext, SimulationOptions,
    SimulationRequest, simulate,
};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Effective thermal conductivity of two-phase 2-D microstructures"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG overrides.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Homogenize one microstructure and print the result as JSON
    Simulate(SimulateArgs),

    /// Print what this process can serve
    Info(ContextArgs),
}

#[derive(Args)]
struct ContextArgs {
    /// JSON configuration file (missing fields take defaults)
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Override the configured grid size
    #[arg(long)]
    grid_size: Option<usize>,

    /// JSON dataset file; without it a synthetic dataset is generated
    #[arg(long, value_hint = ValueHint::FilePath)]
    dataset: Option<PathBuf>,

    /// Number of synthetic samples when no dataset file is given
    #[arg(long, default_value_t = 16)]
    synthetic_samples: usize,

    /// Seed of the synthetic dataset
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// FNO weights (JSON) for the surrogate predictor
    #[arg(long, value_hint = ValueHint::FilePath)]
    surrogate: Option<PathBuf>,
}

#[derive(Args)]
struct SimulateArgs {
    #[command(flatten)]
    context: ContextArgs,

    /// Dataset sample id
    #[arg(long, conflicts_with_all = ["image", "drawing"])]
    sample: Option<usize>,

    /// PNG, JPEG or Netpbm image
    #[arg(long, conflicts_with = "drawing", value_hint = ValueHint::FilePath)]
    image: Option<PathBuf>,

    /// Text file holding a base64 drawing payload (data URL prefix allowed)
    #[arg(long, value_hint = ValueHint::FilePath)]
    drawing: Option<PathBuf>,

    /// Conductivity of the inclusion phase (matrix is 1.0)
    #[arg(long)]
    kappa1: f64,

    /// Load angle in degrees, in [0, 90]
    #[arg(long, default_value_t = 0.0)]
    alpha: f64,

    /// Wall-clock budget for the solve in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Skip the surrogate even when one is loaded
    #[arg(long)]
    no_surrogate: bool,

    /// Write the result here instead of STDOUT
    #[arg(long, value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Simulate(args) => run_simulate(args),
        Command::Info(args) => {
            let ctx = build_context(&args)?;
            println!("{}", serde_json::to_string_pretty(&ctx.capabilities())?);
            Ok(())
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_context(args: &ContextArgs) -> Result<SimContext> {
    let mut config = match &args.config {
        Some(path) => read_config(path)?,
        None => HomogConfig::default(),
    };
    if let Some(n) = args.grid_size {
        config.grid_size = n;
    }
    config.validate()?;
    let dataset = match &args.dataset {
        Some(path) => read_dataset(path)?,
        None => InMemoryDataset::synthetic(args.synthetic_samples, config.grid_size, args.seed)?,
    };
    let surrogate = load_surrogate(args.surrogate.as_deref())?;
    Ok(SimContext::new(config)
        .with_dataset(dataset)
        .with_surrogate(surrogate))
}

fn run_simulate(args: SimulateArgs) -> Result<()> {
    let ctx = build_context(&args.context)?;
    let source = if let Some(id) = args.sample {
        MicrostructureSource::Dataset { id }
    } else if let Some(path) = &args.image {
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read image: {}", path.display()))?;
        MicrostructureSource::Image { bytes }
    } else if let Some(path) = &args.drawing {
        let payload = fs::read_to_string(path)
            .with_context(|| format!("Failed to read drawing: {}", path.display()))?;
        MicrostructureSource::Drawing { payload }
    } else {
        bail!("one of --sample, --image or --drawing is required")
    };

    let request = SimulationRequest::from_source(&ctx, &source, args.kappa1, args.alpha)?
        .with_options(SimulationOptions {
            run_surrogate: !args.no_surrogate,
            timeout: args.timeout_ms.map(Duration::from_millis),
            cancel: None,
        });
    let result = simulate(&ctx, &request)?;

    match &args.output {
        Some(path) => write_result_json(path, &result)?,
        None => println!("{}", to_result_string(&result)?),
    }
    Ok(())
}
