use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;
use crate::scoring::MarginUnit;

#[derive(Parser, Debug)]
#[command(name = "vocalscore", about = "Pitch tracking and scoring of sung vocals against a reference track")]
pub struct Cli {
    /// Configuration file (defaults to ./vocalscore.toml, then the user config directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub tuning: TuningArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Precompute a reference pitch track from a reference vocal recording
    Build {
        /// Reference vocal recording (WAV, MP3, FLAC, OGG)
        reference_audio: PathBuf,
        /// Output asset; `.json` writes JSON, anything else the binary format
        output: PathBuf,
    },

    /// Replay a recorded performance through the live scoring pipeline
    Score {
        /// Performance recording to evaluate
        performance: PathBuf,

        /// Precomputed reference asset
        #[arg(short, long, conflicts_with = "reference_audio")]
        reference: Option<PathBuf>,

        /// Reference vocal recording, analysed before the session starts
        #[arg(long)]
        reference_audio: Option<PathBuf>,

        /// Track pitch without a reference; nothing is scored
        #[arg(long, conflicts_with_all = ["reference", "reference_audio"])]
        unscored: bool,

        /// Emit one JSON object per tick instead of text
        #[arg(long)]
        json: bool,

        /// Samples delivered per block, as an audio callback would
        #[arg(long, default_value_t = 512)]
        block_size: usize,
    },

    /// Print a summary of a reference asset
    Inspect {
        /// Reference asset to read
        asset: PathBuf,
    },
}

/// Overrides for configuration file values.
#[derive(Args, Debug, Default)]
pub struct TuningArgs {
    /// Analysis window length in samples
    #[arg(long, global = true)]
    pub frame_size: Option<usize>,

    /// Samples between consecutive windows
    #[arg(long, global = true)]
    pub hop_size: Option<usize>,

    /// Lowest detectable pitch in Hz
    #[arg(long, global = true)]
    pub low_frequency: Option<f32>,

    /// Highest detectable pitch in Hz
    #[arg(long, global = true)]
    pub high_frequency: Option<f32>,

    /// Evaluation tick length in seconds
    #[arg(long, global = true)]
    pub interval: Option<f64>,

    /// Largest error still scored Perfect
    #[arg(long, global = true)]
    pub perfect_margin: Option<f32>,

    /// Largest error still scored Good
    #[arg(long, global = true)]
    pub good_margin: Option<f32>,

    /// Unit of the margins
    #[arg(long, global = true, value_enum)]
    pub margin_unit: Option<MarginUnit>,
}

impl TuningArgs {
    /// Applies every flag that was given on top of `config`.
    pub fn apply(&self, config: &mut Config) {
        let analysis = &mut config.analysis;
        if let Some(v) = self.frame_size { analysis.frame_size = v; }
        if let Some(v) = self.hop_size { analysis.hop_size = v; }
        if let Some(v) = self.low_frequency { analysis.low_frequency = v; }
        if let Some(v) = self.high_frequency { analysis.high_frequency = v; }

        let scoring = &mut config.scoring;
        if let Some(v) = self.interval { scoring.evaluation_interval_seconds = v; }
        if let Some(v) = self.margin_unit { scoring.margin_unit = v; }
        if let Some(v) = self.perfect_margin { scoring.perfect_margin = Some(v); }
        if let Some(v) = self.good_margin { scoring.good_margin = Some(v); }
    }
}
