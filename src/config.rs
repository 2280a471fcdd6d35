use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::scoring::{MarginUnit, Margins};

/// Raw configuration as read from `vocalscore.toml`, before validation.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,
    #[serde(default = "default_hop_size")]
    pub hop_size: usize,
    #[serde(default = "default_low_frequency")]
    pub low_frequency: f32,
    #[serde(default = "default_high_frequency")]
    pub high_frequency: f32,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
    #[serde(default = "default_silence_rms")]
    pub silence_rms: f32,
    /// Defaults to four frames.
    #[serde(default)]
    pub ring_capacity: Option<usize>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_interval")]
    pub evaluation_interval_seconds: f64,
    #[serde(default)]
    pub margin_unit: MarginUnit,
    /// Defaults depend on `margin_unit`.
    #[serde(default)]
    pub perfect_margin: Option<f32>,
    #[serde(default)]
    pub good_margin: Option<f32>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            frame_size: default_frame_size(),
            hop_size: default_hop_size(),
            low_frequency: default_low_frequency(),
            high_frequency: default_high_frequency(),
            min_confidence: default_min_confidence(),
            silence_rms: default_silence_rms(),
            ring_capacity: None,
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            evaluation_interval_seconds: default_interval(),
            margin_unit: MarginUnit::default(),
            perfect_margin: None,
            good_margin: None,
        }
    }
}

fn default_sample_rate() -> u32 { 44100 }
fn default_frame_size() -> usize { 2048 }
fn default_hop_size() -> usize { 512 }
fn default_low_frequency() -> f32 { 80.0 }
fn default_high_frequency() -> f32 { 1000.0 }
fn default_min_confidence() -> f32 { 0.3 }
fn default_silence_rms() -> f32 { 0.01 }
fn default_interval() -> f64 { 1.0 }

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("sample rate must be positive")]
    NonPositiveSampleRate,
    #[error("frame size must be positive")]
    NonPositiveFrameSize,
    #[error("hop size must be positive")]
    NonPositiveHopSize,
    #[error("hop size {hop} exceeds frame size {frame}")]
    HopExceedsFrame { hop: usize, frame: usize },
    #[error("ring capacity {capacity} cannot hold a frame of {frame} samples")]
    RingTooSmall { capacity: usize, frame: usize },
    #[error("low frequency must be positive (got {0} Hz)")]
    NonPositiveLowFrequency(f32),
    #[error("low frequency {low} Hz must be below high frequency {high} Hz")]
    InvertedBand { low: f32, high: f32 },
    #[error("high frequency {high} Hz is above the Nyquist limit of {nyquist} Hz")]
    AboveNyquist { high: f32, nyquist: f32 },
    #[error("confidence threshold must lie in [0, 1] (got {0})")]
    ConfidenceOutOfRange(f32),
    #[error("silence floor must not be negative (got {0})")]
    NegativeSilenceFloor(f32),
    #[error("evaluation interval must be positive (got {0} s)")]
    NonPositiveInterval(f64),
    #[error("{name} margin must not be negative (got {value})")]
    NegativeMargin { name: &'static str, value: f32 },
    #[error("good margin {good} is tighter than perfect margin {perfect}")]
    MarginOrder { perfect: f32, good: f32 },
}

/// Checked analysis parameters shared by the live pipeline and the
/// reference builder.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisSettings {
    pub sample_rate: u32,
    pub frame_size: usize,
    pub hop_size: usize,
    pub low_frequency: f32,
    pub high_frequency: f32,
    pub min_confidence: f32,
    pub silence_rms: f32,
    pub ring_capacity: usize,
}

impl AnalysisSettings {
    pub fn hop_seconds(&self) -> f64 {
        self.hop_size as f64 / self.sample_rate as f64
    }
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            frame_size: default_frame_size(),
            hop_size: default_hop_size(),
            low_frequency: default_low_frequency(),
            high_frequency: default_high_frequency(),
            min_confidence: default_min_confidence(),
            silence_rms: default_silence_rms(),
            ring_capacity: 4 * default_frame_size(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScoringSettings {
    pub evaluation_interval_seconds: f64,
    pub margins: Margins,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            evaluation_interval_seconds: default_interval(),
            margins: Margins::defaults(MarginUnit::default()),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Settings {
    pub analysis: AnalysisSettings,
    pub scoring: ScoringSettings,
}

impl Config {
    /// Checks every value and produces typed settings.
    pub fn validate(&self) -> Result<Settings, ConfigError> {
        let a = &self.analysis;
        if a.sample_rate == 0 {
            return Err(ConfigError::NonPositiveSampleRate);
        }
        if a.frame_size == 0 {
            return Err(ConfigError::NonPositiveFrameSize);
        }
        if a.hop_size == 0 {
            return Err(ConfigError::NonPositiveHopSize);
        }
        if a.hop_size > a.frame_size {
            return Err(ConfigError::HopExceedsFrame { hop: a.hop_size, frame: a.frame_size });
        }
        let ring_capacity = a.ring_capacity.unwrap_or(4 * a.frame_size);
        if ring_capacity < a.frame_size {
            return Err(ConfigError::RingTooSmall { capacity: ring_capacity, frame: a.frame_size });
        }
        if !(a.low_frequency > 0.0) {
            return Err(ConfigError::NonPositiveLowFrequency(a.low_frequency));
        }
        if !(a.low_frequency < a.high_frequency) {
            return Err(ConfigError::InvertedBand { low: a.low_frequency, high: a.high_frequency });
        }
        let nyquist = a.sample_rate as f32 / 2.0;
        if a.high_frequency > nyquist {
            return Err(ConfigError::AboveNyquist { high: a.high_frequency, nyquist });
        }
        if !(0.0..=1.0).contains(&a.min_confidence) {
            return Err(ConfigError::ConfidenceOutOfRange(a.min_confidence));
        }
        if !(a.silence_rms >= 0.0) {
            return Err(ConfigError::NegativeSilenceFloor(a.silence_rms));
        }

        let s = &self.scoring;
        if !(s.evaluation_interval_seconds > 0.0) {
            return Err(ConfigError::NonPositiveInterval(s.evaluation_interval_seconds));
        }
        let (default_perfect, default_good) = s.margin_unit.default_margins();
        let margins = Margins::new(
            s.perfect_margin.unwrap_or(default_perfect),
            s.good_margin.unwrap_or(default_good),
            s.margin_unit,
        )?;

        Ok(Settings {
            analysis: AnalysisSettings {
                sample_rate: a.sample_rate,
                frame_size: a.frame_size,
                hop_size: a.hop_size,
                low_frequency: a.low_frequency,
                high_frequency: a.high_frequency,
                min_confidence: a.min_confidence,
                silence_rms: a.silence_rms,
                ring_capacity,
            },
            scoring: ScoringSettings {
                evaluation_interval_seconds: s.evaluation_interval_seconds,
                margins,
            },
        })
    }
}

/// Explicit path, else `./vocalscore.toml`, else the user config directory.
pub fn locate_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("vocalscore.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("vocalscore").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("vocalscore").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Failed to parse config: {}", path.display()))
}

fn parse_config(content: &str) -> Result<Config> {
    Ok(toml::from_str(content)?)
}
