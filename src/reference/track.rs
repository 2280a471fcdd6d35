use rayon::prelude::*;

use super::AssetError;
use crate::config::AnalysisSettings;
use crate::pitch::extractor::PitchExtractor;
use crate::pitch::frames::window_starts;
use crate::pitch::PitchEstimate;

/// Per-window reference pitches of one recording, on a fixed hop grid.
/// Window `i` starts at `i * hop_seconds`.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceTrack {
    hop_seconds: f64,
    pitches: Vec<PitchEstimate>,
}

/// Aggregate figures for display.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackSummary {
    pub windows: usize,
    pub voiced: usize,
    pub duration_seconds: f64,
    pub min_hz: Option<f32>,
    pub max_hz: Option<f32>,
    pub mean_hz: Option<f32>,
}

impl ReferenceTrack {
    pub fn new(hop_seconds: f64, pitches: Vec<PitchEstimate>) -> Result<Self, AssetError> {
        if !(hop_seconds.is_finite() && hop_seconds > 0.0) {
            return Err(AssetError::InvalidHop(hop_seconds));
        }
        Ok(Self { hop_seconds, pitches })
    }

    /// Runs the extractor over every window of a whole recording, in input
    /// order. Windows are independent, so they are analysed in parallel.
    pub fn build(samples: &[f32], settings: &AnalysisSettings) -> Result<Self, AssetError> {
        if samples.len() < settings.frame_size {
            return Err(AssetError::TooShort {
                samples: samples.len(),
                frame: settings.frame_size,
            });
        }
        if let Some(index) = samples.iter().position(|s| !s.is_finite()) {
            return Err(AssetError::NonFiniteSample(index));
        }

        let extractor = PitchExtractor::new(settings);
        let starts: Vec<usize> =
            window_starts(samples.len(), settings.frame_size, settings.hop_size).collect();

        log::info!(
            "Extracting reference pitch from {} windows ({} samples, hop {})",
            starts.len(),
            samples.len(),
            settings.hop_size
        );

        let pitches: Vec<PitchEstimate> = starts
            .par_iter()
            .map(|&start| extractor.extract(&samples[start..start + settings.frame_size]))
            .collect();

        let track = Self::new(settings.hop_seconds(), pitches)?;
        let summary = track.summary();
        log::info!(
            "Reference track: {} windows, {} voiced, {:.1}s",
            summary.windows,
            summary.voiced,
            summary.duration_seconds
        );
        Ok(track)
    }

    /// Reference pitch at `elapsed_seconds` of playback, taken from the
    /// nearest window and clamped to the track. Unvoiced once playback is
    /// past `duration_seconds()`.
    pub fn at(&self, elapsed_seconds: f64) -> PitchEstimate {
        if self.pitches.is_empty() || elapsed_seconds > self.duration_seconds() {
            return PitchEstimate::Unvoiced;
        }
        let index = (elapsed_seconds.max(0.0) / self.hop_seconds).round() as usize;
        self.pitches[index.min(self.pitches.len() - 1)]
    }

    pub fn hop_seconds(&self) -> f64 {
        self.hop_seconds
    }

    pub fn pitches(&self) -> &[PitchEstimate] {
        &self.pitches
    }

    pub fn len(&self) -> usize {
        self.pitches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pitches.is_empty()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.pitches.len() as f64 * self.hop_seconds
    }

    pub fn summary(&self) -> TrackSummary {
        let voiced: Vec<f32> = self.pitches.iter().filter_map(|p| p.hz()).collect();
        let mean_hz = if voiced.is_empty() {
            None
        } else {
            Some((voiced.iter().map(|&hz| hz as f64).sum::<f64>() / voiced.len() as f64) as f32)
        };
        TrackSummary {
            windows: self.pitches.len(),
            voiced: voiced.len(),
            duration_seconds: self.duration_seconds(),
            min_hz: voiced.iter().copied().reduce(f32::min),
            max_hz: voiced.iter().copied().reduce(f32::max),
            mean_hz,
        }
    }
}
