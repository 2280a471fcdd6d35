use serde::Serialize;

use crate::config::Settings;
use crate::pitch::aggregate::PitchAggregator;
use crate::pitch::extractor::PitchExtractor;
use crate::pitch::frames::FrameBuffer;
use crate::reference::ReferenceTrack;
use crate::scoring::{ScoringEngine, Tier};

/// Outcome of one evaluation tick, as handed to the presentation layer.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TickResult {
    pub index: u64,
    pub elapsed_seconds: f64,
    pub cumulative_score: u64,
    /// Absent when the session runs without a reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    pub points: u32,
    pub detected_hz: Option<f32>,
    pub reference_hz: Option<f32>,
    /// Signed error in the configured margin unit.
    pub error: Option<f32>,
    pub windows: usize,
    pub voiced_windows: usize,
}

/// Live evaluation pipeline for one singer against one reference track.
///
/// Samples go through the frame buffer and every completed window is
/// analysed immediately. Each window is paired with the reference pitch at
/// that window's start time, and each tick reduces both sides over the same
/// windows before scoring them. Without a reference the session still
/// tracks pitch but never scores.
pub struct Session {
    frames: FrameBuffer,
    extractor: PitchExtractor,
    aggregator: PitchAggregator,
    // Reference pitches for the windows in `aggregator`.
    reference_aggregator: PitchAggregator,
    scoring: ScoringEngine,
    reference: Option<ReferenceTrack>,
    sample_rate: u32,
    tick_samples: u64,
    samples_seen: u64,
    next_tick_at: u64,
    ticks: u64,
    reported_overruns: u64,
}

impl Session {
    pub fn new(settings: &Settings, reference: Option<ReferenceTrack>) -> Self {
        let analysis = &settings.analysis;
        let tick_samples = ((settings.scoring.evaluation_interval_seconds * analysis.sample_rate as f64)
            .round() as u64)
            .max(1);

        match &reference {
            Some(track) => {
                if (track.hop_seconds() - analysis.hop_seconds()).abs() > 1e-9 {
                    log::warn!(
                        "Reference hop {:.3} ms differs from live hop {:.3} ms; lookups use the reference grid",
                        track.hop_seconds() * 1000.0,
                        analysis.hop_seconds() * 1000.0
                    );
                }
            }
            None => log::warn!("No reference track: running in degraded mode, ticks will not be scored"),
        }

        Self {
            frames: FrameBuffer::new(analysis.frame_size, analysis.hop_size, analysis.ring_capacity),
            extractor: PitchExtractor::new(analysis),
            aggregator: PitchAggregator::new(),
            reference_aggregator: PitchAggregator::new(),
            scoring: ScoringEngine::new(settings.scoring.margins),
            reference,
            sample_rate: analysis.sample_rate,
            tick_samples,
            samples_seen: 0,
            next_tick_at: tick_samples,
            ticks: 0,
            reported_overruns: 0,
        }
    }

    /// Delivers a block of samples and closes a tick every evaluation
    /// interval of stream time. Blocks are buffered whole before windows
    /// are drained, so a block larger than the ring overruns.
    pub fn feed(&mut self, samples: &[f32]) -> Vec<TickResult> {
        let mut results = Vec::new();
        let mut rest = samples;

        while !rest.is_empty() {
            let until_tick = (self.next_tick_at - self.samples_seen) as usize;
            let (head, tail) = rest.split_at(until_tick.min(rest.len()));
            self.frames.push_slice(head);
            self.samples_seen += head.len() as u64;
            self.drain_windows();

            if self.samples_seen == self.next_tick_at {
                let elapsed = self.samples_seen as f64 / self.sample_rate as f64;
                results.push(self.close_tick(elapsed));
                self.next_tick_at += self.tick_samples;
            }
            rest = tail;
        }

        self.report_overruns();
        results
    }

    /// Delivers samples without sample-clock ticks, for callers that
    /// drive [`Session::tick`] from their own timer.
    #[allow(dead_code)]
    pub fn push(&mut self, samples: &[f32]) {
        self.frames.push_slice(samples);
        self.samples_seen += samples.len() as u64;
        self.drain_windows();
        self.report_overruns();

        // Keep the sample clock ahead of the stream for a later `feed`.
        if self.next_tick_at <= self.samples_seen {
            let behind = (self.samples_seen - self.next_tick_at) / self.tick_samples + 1;
            self.next_tick_at += behind * self.tick_samples;
        }
    }

    /// Closes the current tick at an externally measured playback time.
    #[allow(dead_code)]
    pub fn tick(&mut self, elapsed_seconds: f64) -> TickResult {
        self.drain_windows();
        self.close_tick(elapsed_seconds)
    }

    fn drain_windows(&mut self) {
        while let Some(window) = self.frames.try_take_window() {
            let estimate = self.extractor.extract(window.samples);
            self.aggregator.observe(estimate);
            if let Some(track) = &self.reference {
                let start_seconds = window.start as f64 / self.sample_rate as f64;
                self.reference_aggregator.observe(track.at(start_seconds));
            }
        }
    }

    fn close_tick(&mut self, elapsed_seconds: f64) -> TickResult {
        let windows = self.aggregator.observed();
        let voiced_windows = self.aggregator.voiced();
        let detected = self.aggregator.reduce();

        let reference = self.reference_aggregator.reduce();
        let evaluation = if self.reference.is_some() {
            Some(self.scoring.evaluate(detected, reference))
        } else {
            None
        };

        let result = TickResult {
            index: self.ticks,
            elapsed_seconds,
            cumulative_score: self.scoring.score(),
            tier: evaluation.map(|e| e.tier),
            points: evaluation.map_or(0, |e| e.points),
            detected_hz: detected.hz(),
            reference_hz: reference.hz(),
            error: evaluation.and_then(|e| e.error),
            windows,
            voiced_windows,
        };
        self.ticks += 1;

        log::debug!(
            "Tick {} at {:.2}s: detected {:?} reference {:?} -> {:?} ({} windows, {} voiced)",
            result.index,
            elapsed_seconds,
            result.detected_hz,
            result.reference_hz,
            result.tier,
            windows,
            voiced_windows
        );
        result
    }

    fn report_overruns(&mut self) {
        let overruns = self.frames.overruns();
        if overruns > self.reported_overruns {
            log::warn!(
                "Frame buffer overran {} time(s), {} samples dropped so far",
                overruns - self.reported_overruns,
                self.frames.dropped_samples()
            );
            self.reported_overruns = overruns;
        }
    }

    pub fn score(&self) -> u64 {
        self.scoring.score()
    }

    #[allow(dead_code)]
    pub fn last_tier(&self) -> Option<Tier> {
        self.scoring.last_tier()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn overruns(&self) -> u64 {
        self.frames.overruns()
    }

    pub fn dropped_samples(&self) -> u64 {
        self.frames.dropped_samples()
    }

    pub fn is_degraded(&self) -> bool {
        self.reference.is_none()
    }
}
