use anyhow::{Context, Result, ensure};
use clap::Parser;
use ndarray::ArrayD;
use tracing::{Level, debug};
use tracing_subscriber::EnvFilter;
use wpe::synthetic::ReverberantScene;
use wpe::{Complex64, Estimator, Solver, WpeConfig, max_abs_diff};

#[derive(Parser, Debug)]
#[command(name = "wpe-compare")]
struct Args {
    #[arg(long, default_value_t = 6)]
    taps: usize,
    #[arg(long, default_value_t = 2)]
    delay: usize,
    #[arg(long, default_value_t = 3)]
    iterations: usize,
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    psd_context: f64,
    #[arg(long, default_value_t = 4)]
    bins: usize,
    #[arg(long, default_value_t = 2)]
    channels: usize,
    #[arg(long, default_value_t = 120)]
    frames: usize,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Largest accepted deviation relative to the peak output magnitude.
    #[arg(long, default_value_t = 1e-6)]
    tolerance: f64,
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    run(&args)
}

fn run(args: &Args) -> Result<()> {
    let scene = ReverberantScene {
        bins: args.bins,
        channels: args.channels,
        frames: args.frames,
        seed: args.seed,
        ..ReverberantScene::default()
    };
    let observed = scene.generate().into_dyn();
    let base = WpeConfig::new(args.taps, args.delay, args.iterations)
        .with_psd_context(args.psd_context);

    let reference = dereverb(&observed, &base).context("reference run (strided/lu) failed")?;
    let scale = reference
        .iter()
        .map(|v| v.norm())
        .fold(f64::MIN_POSITIVE, f64::max);

    let mut worst = 0.0f64;
    for estimator in Estimator::ALL {
        for solver in Solver::ALL {
            if !solver.accepts(estimator.representation()) {
                debug!(%estimator, %solver, "skipping incompatible pair");
                continue;
            }
            let config = base.with_estimator(estimator).with_solver(solver);
            let output = dereverb(&observed, &config)
                .with_context(|| format!("{estimator}/{solver} failed"))?;
            let deviation = max_abs_diff(&output.view(), &reference.view()) / scale;
            worst = worst.max(deviation);
            println!("{:<13} {:<19} {deviation:.3e}", estimator.name(), solver.name());
        }
    }

    ensure!(
        worst <= args.tolerance,
        "strategies disagree: worst relative deviation {worst:.3e} exceeds {:.3e}",
        args.tolerance
    );
    println!("worst relative deviation {worst:.3e}");
    Ok(())
}

fn dereverb(observed: &ArrayD<Complex64>, config: &WpeConfig) -> Result<ArrayD<Complex64>> {
    Ok(wpe::wpe_batched(observed.view(), config)?)
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
