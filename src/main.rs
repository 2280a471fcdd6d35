mod audio;
mod cli;
mod config;
mod pitch;
mod reference;
mod scoring;
mod session;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

use cli::{Cli, Command};
use config::Config;
use reference::{asset, ReferenceTrack};
use scoring::Tier;
use session::{Session, TickResult};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let mut config = match config::locate_config(cli.config.as_deref()) {
        Some(path) => {
            let cfg = config::load_config(&path)?;
            log::info!("Loaded config from {}", path.display());
            cfg
        }
        None => Config::default(),
    };
    cli.tuning.apply(&mut config);

    match cli.command {
        Command::Build { reference_audio, output } => run_build(config, &reference_audio, &output),
        Command::Score {
            performance,
            reference,
            reference_audio,
            unscored,
            json,
            block_size,
        } => {
            if block_size == 0 {
                anyhow::bail!("--block-size must be at least 1");
            }
            let source = match (reference, reference_audio) {
                (Some(path), _) => ReferenceSource::Asset(path),
                (None, Some(path)) => ReferenceSource::Recording(path),
                (None, None) if unscored => ReferenceSource::None,
                (None, None) => anyhow::bail!(
                    "A reference is required (--reference or --reference-audio); \
                     pass --unscored to track pitch without scoring"
                ),
            };
            run_score(config, &performance, source, json, block_size)
        }
        Command::Inspect { asset } => run_inspect(&asset),
    }
}

enum ReferenceSource {
    Asset(std::path::PathBuf),
    Recording(std::path::PathBuf),
    None,
}

fn run_build(config: Config, reference_audio: &Path, output: &Path) -> Result<()> {
    log::info!("vocalscore - reference pitch builder");
    log::info!("Input: {}", reference_audio.display());
    log::info!("Output: {}", output.display());

    let track = build_reference(config, reference_audio)?;
    asset::save(&track, output)
        .with_context(|| format!("Failed to write reference asset: {}", output.display()))?;

    log::info!("Done! Output: {}", output.display());
    Ok(())
}

fn build_reference(mut config: Config, path: &Path) -> Result<ReferenceTrack> {
    let audio = audio::decode::decode_file(path)?;
    adopt_sample_rate(&mut config, audio.sample_rate);
    let settings = config.validate().context("Invalid configuration")?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner} [{elapsed_precise}] {msg}")
            .context("Invalid progress template")?,
    );
    pb.set_message(format!("Extracting pitch from {}", path.display()));
    pb.enable_steady_tick(Duration::from_millis(100));

    let track = ReferenceTrack::build(&audio.samples, &settings.analysis)
        .with_context(|| format!("Failed to build reference track from {}", path.display()));
    pb.finish_and_clear();
    track
}

fn run_score(
    config: Config,
    performance: &Path,
    source: ReferenceSource,
    json: bool,
    block_size: usize,
) -> Result<()> {
    // The reference recording is analysed on a worker while the performance
    // decodes; it is joined before the session accepts any samples.
    let (asset_path, worker) = match source {
        ReferenceSource::Asset(path) => (Some(path), None),
        ReferenceSource::Recording(path) => {
            let config = config.clone();
            (None, Some(std::thread::spawn(move || build_reference(config, &path))))
        }
        ReferenceSource::None => (None, None),
    };

    let audio = audio::decode::decode_file(performance)?;
    reject_non_finite(&audio.samples, audio.sample_rate)
        .with_context(|| format!("Cannot score performance: {}", performance.display()))?;
    let mut config = config;
    adopt_sample_rate(&mut config, audio.sample_rate);
    let settings = config.validate().context("Invalid configuration")?;

    let track = if let Some(path) = asset_path {
        Some(
            asset::load(&path)
                .with_context(|| format!("Failed to load reference asset: {}", path.display()))?,
        )
    } else if let Some(handle) = worker {
        let built = handle
            .join()
            .map_err(|_| anyhow::anyhow!("Reference build worker panicked"))??;
        Some(built)
    } else {
        None
    };

    let unit = settings.scoring.margins.unit;
    let mut session = Session::new(&settings, track);
    let mut tally = TierTally::default();

    let pb = ProgressBar::new(audio.samples.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {percent}% ({eta} remaining)")
            .context("Invalid progress template")?
            .progress_chars("=>-"),
    );

    for block in audio.samples.chunks(block_size) {
        for tick in session.feed(block) {
            tally.record(tick.tier);
            if json {
                println!("{}", serde_json::to_string(&tick)?);
            } else {
                pb.println(format_tick(&tick, unit.symbol()));
            }
        }
        pb.inc(block.len() as u64);
    }
    pb.finish_and_clear();

    if session.overruns() > 0 {
        log::warn!(
            "{} overruns, {} samples dropped during the session",
            session.overruns(),
            session.dropped_samples()
        );
    }

    if session.is_degraded() {
        log::info!("Unscored session: {} ticks", session.ticks());
    } else {
        log::info!(
            "Final score: {} over {} ticks (perfect {}, good {}, miss {})",
            session.score(),
            session.ticks(),
            tally.perfect,
            tally.good,
            tally.miss
        );
        if !json {
            println!("Score: {}", session.score());
        }
    }
    Ok(())
}

fn run_inspect(path: &Path) -> Result<()> {
    let track = asset::load(path)
        .with_context(|| format!("Failed to load reference asset: {}", path.display()))?;
    let summary = track.summary();

    println!("Reference asset: {}", path.display());
    println!("  windows:  {}", summary.windows);
    println!("  hop:      {:.3} ms", track.hop_seconds() * 1000.0);
    println!("  duration: {:.2} s", summary.duration_seconds);
    if !track.is_empty() {
        println!(
            "  voiced:   {} ({:.1}%)",
            summary.voiced,
            100.0 * summary.voiced as f64 / summary.windows as f64
        );
    }
    if let (Some(min), Some(max), Some(mean)) = (summary.min_hz, summary.max_hz, summary.mean_hz) {
        println!("  range:    {:.1} - {:.1} Hz (mean {:.1} Hz)", min, max, mean);
    }
    Ok(())
}

/// The extractor treats NaN or infinite samples as a caller bug, so a
/// decoded file carrying them is refused up front.
fn reject_non_finite(samples: &[f32], sample_rate: u32) -> Result<()> {
    if let Some(index) = samples.iter().position(|s| !s.is_finite()) {
        anyhow::bail!(
            "non-finite sample at index {} ({:.3}s)",
            index,
            index as f64 / sample_rate as f64
        );
    }
    Ok(())
}

/// Analysis follows the decoded stream's rate, whatever was configured.
fn adopt_sample_rate(config: &mut Config, sample_rate: u32) {
    if config.analysis.sample_rate != sample_rate {
        log::info!(
            "Using decoded sample rate {} Hz (configured {} Hz)",
            sample_rate,
            config.analysis.sample_rate
        );
        config.analysis.sample_rate = sample_rate;
    }
}

#[derive(Default)]
struct TierTally {
    perfect: usize,
    good: usize,
    miss: usize,
}

impl TierTally {
    fn record(&mut self, tier: Option<Tier>) {
        match tier {
            Some(Tier::Perfect) => self.perfect += 1,
            Some(Tier::Good) => self.good += 1,
            Some(Tier::Miss) => self.miss += 1,
            None => {}
        }
    }
}

fn format_tick(tick: &TickResult, unit: &str) -> String {
    let hz = |v: Option<f32>| v.map_or_else(|| "   -   ".to_string(), |hz| format!("{:7.2}", hz));
    let tier = tick.tier.map_or_else(|| "-".to_string(), |t| t.to_string());
    let error = tick
        .error
        .map_or_else(String::new, |e| format!("  error {:+.1} {}", e, unit));
    format!(
        "[{:>7.2}s] {:<9} score {:>6}  sung {} Hz  ref {} Hz{}",
        tick.elapsed_seconds,
        tier,
        tick.cumulative_score,
        hz(tick.detected_hz),
        hz(tick.reference_hz),
        error
    )
}
