mod app;
mod surface;

use anyhow::{Context, Result, bail};
use app::{App, RunOptions};
use clap::{ArgAction, Parser};
use gazex_experiment::{ConfigFile, Paradigm, SessionConfig};
use log::{info, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::PathBuf;
use std::time::Duration;
use surface::{AttentiveSurface, ReplaySurface};

#[derive(Parser, Debug)]
#[command(name = "gazex", version)]
#[command(about = "Run a gaze-contingent trial session", long_about = None)]
struct Cli {
    /// Session config file (TOML)
    #[arg(long, value_name = "TOML")]
    config: Option<PathBuf>,

    /// corner, theatre, video-corner or visual-word; overrides the config file
    #[arg(long)]
    paradigm: Option<Paradigm>,

    /// Trial specification, one comma-delimited row per trial
    #[arg(long, value_name = "CSV")]
    trials: Option<PathBuf>,

    /// Recorded gaze trace (time,target,x,y,z) to replay instead of the
    /// simulated subject
    #[arg(long, value_name = "CSV")]
    trace: Option<PathBuf>,

    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Seed for trial order; drawn at random and logged when omitted
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, default_value_t = 90)]
    fps: u32,

    /// Length of every simulated audio or video clip
    #[arg(long, default_value_t = 2.0)]
    media_seconds: f64,

    /// Pace frames against the wall clock
    #[arg(long)]
    realtime: bool,

    /// -v for debug, -vv for trace
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn session_config(cli: &Cli) -> Result<SessionConfig> {
    let mut file = match &cli.config {
        Some(path) => ConfigFile::load(path)?,
        None => ConfigFile::default(),
    };
    if cli.paradigm.is_some() {
        file.paradigm = cli.paradigm;
    }
    let mut config = file.resolve(Paradigm::default())?;

    if let Some(spec) = &cli.trials {
        config.trials.spec = Some(spec.clone());
    }
    if let Some(dir) = &cli.output_dir {
        config.recorder.output_dir = dir.clone();
    }
    if cli.seed.is_some() {
        config.trials.seed = cli.seed;
    }
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut config = session_config(&cli)?;
    let seed = config.trials.seed.unwrap_or_else(rand::random);
    config.trials.seed = Some(seed);
    info!("Trial order seed: {seed}");

    let Some(spec) = config.trials.spec.clone() else {
        bail!("no trial specification given; pass --trials or set [trials] spec");
    };
    let trials = config
        .builder()
        .load(&spec, &mut ChaCha8Rng::seed_from_u64(seed))
        .with_context(|| format!("loading trials from {}", spec.display()))?;

    let media = Duration::try_from_secs_f64(cli.media_seconds)
        .context("--media-seconds must be a non-negative number")?;
    let options = RunOptions {
        fps: cli.fps.max(1),
        realtime: cli.realtime,
        seed,
    };

    let summary = match &cli.trace {
        Some(path) => {
            let surface = ReplaySurface::load(path, media)?;
            App::new(config, trials, surface, options)?.run()?
        }
        None => {
            let points = config.reference_points().into_iter().map(|(_, p)| p).collect();
            let rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(1));
            let surface = AttentiveSurface::new(rng, media, points).lapse_rate(0.02);
            App::new(config, trials, surface, options)?.run()?
        }
    };

    if summary.finished {
        info!(
            "Session complete: {} trials in {} frames ({:.1} Hz)",
            summary.trials_total, summary.frames, summary.frame_stats.effective_fps
        );
    } else {
        warn!(
            "Session stopped after {}/{} trials",
            summary.trials_completed, summary.trials_total
        );
    }
    if summary.recorder.lines_discarded > 0 {
        warn!("{} lines could not be saved", summary.recorder.lines_discarded);
    }
    Ok(())
}
