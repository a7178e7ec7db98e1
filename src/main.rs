use anyhow::{Context, Result};
use clap::Parser;
use ndarray::{Array3, Ix3};
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;
use wpe::config::{DEFAULT_DELAY, DEFAULT_ITERATIONS, DEFAULT_TAPS};
use wpe::synthetic::{ReverberantScene, late_correlation};
use wpe::{Complex64, Estimator, Solver, StatisticsMode, WpeConfig};

#[derive(Parser, Debug)]
#[command(name = "dereverb")]
struct Args {
    /// Prediction filter taps per channel.
    #[arg(long, default_value_t = DEFAULT_TAPS)]
    taps: usize,
    /// Minimum prediction lag in frames.
    #[arg(long, default_value_t = DEFAULT_DELAY)]
    delay: usize,
    #[arg(long, default_value_t = DEFAULT_ITERATIONS)]
    iterations: usize,
    /// 0 for per-frame power, inf for a single global power.
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    psd_context: f64,
    #[arg(long, default_value_t = StatisticsMode::Full)]
    statistics: StatisticsMode,
    #[arg(long, default_value_t = Estimator::Strided)]
    estimator: Estimator,
    #[arg(long, default_value_t = Solver::Lu)]
    solver: Solver,

    /// Frequency bins in the synthetic scene.
    #[arg(long, default_value_t = 8)]
    bins: usize,
    #[arg(long, default_value_t = 2)]
    channels: usize,
    #[arg(long, default_value_t = 200)]
    frames: usize,
    /// Frames of reverberant tail after the direct path.
    #[arg(long, default_value_t = 12)]
    tail: usize,
    /// Per-frame amplitude decay of the tail.
    #[arg(long, default_value_t = 0.75)]
    decay: f64,
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Repeat for more log output (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn config(&self) -> WpeConfig {
        WpeConfig::new(self.taps, self.delay, self.iterations)
            .with_psd_context(self.psd_context)
            .with_statistics(self.statistics)
            .with_estimator(self.estimator)
            .with_solver(self.solver)
    }

    fn scene(&self) -> ReverberantScene {
        ReverberantScene {
            bins: self.bins,
            channels: self.channels,
            frames: self.frames,
            tail: self.tail,
            decay: self.decay,
            seed: self.seed,
            ..ReverberantScene::default()
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    run(&args)
}

fn run(args: &Args) -> Result<()> {
    let config = args.config();
    config.validate().context("invalid wpe configuration")?;
    let scene = args.scene();

    let observed = scene.generate();
    info!(?scene, "generated synthetic scene");
    let dereverberated = wpe::wpe_batched(observed.view().into_dyn(), &config)
        .context("dereverberation failed")?
        .into_dimensionality::<Ix3>()
        .context("unexpected output dimensions")?;

    println!("{config}");
    report(&observed, &dereverberated, config.delay, config.taps);
    Ok(())
}

fn report(
    observed: &Array3<Complex64>,
    dereverberated: &Array3<Complex64>,
    delay: usize,
    taps: usize,
) {
    let mut before_total = 0.0;
    let mut after_total = 0.0;
    for (bin, (y, x)) in observed
        .outer_iter()
        .zip(dereverberated.outer_iter())
        .enumerate()
    {
        let before = late_correlation(y, delay, taps);
        let after = late_correlation(x, delay, taps);
        before_total += before;
        after_total += after;
        println!(
            "bin {bin:>3}: late correlation {before:.4} -> {after:.4} ({:+.1} dB)",
            decibels(after, before)
        );
    }
    let bins = observed.len_of(ndarray::Axis(0)).max(1) as f64;
    println!(
        "mean   : late correlation {:.4} -> {:.4} ({:+.1} dB)",
        before_total / bins,
        after_total / bins,
        decibels(after_total, before_total)
    );
}

fn decibels(after: f64, before: f64) -> f64 {
    if before <= 0.0 || after <= 0.0 {
        return 0.0;
    }
    10.0 * (after / before).log10()
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
