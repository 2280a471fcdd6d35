use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::PitchEstimate;
use crate::config::AnalysisSettings;

/// Fraction of the strongest peak an earlier peak must reach to win.
/// Picking the earliest strong peak instead of the global maximum avoids
/// octave-down errors when a multiple of the period correlates equally well.
const PEAK_RATIO: f64 = 0.9;

/// Single-voice fundamental frequency estimator.
///
/// Computes the normalized square difference function (an autocorrelation
/// normalized by the energy of both overlapping segments, bounded to
/// [-1, 1]) over lags up to `sample_rate / low_frequency`, picks the first
/// strong peak after the zero-lag lobe and refines it with parabolic
/// interpolation. Deterministic for identical input.
pub struct PitchExtractor {
    sample_rate: f64,
    low_frequency: f32,
    high_frequency: f32,
    min_confidence: f64,
    silence_rms: f64,
    max_lag: usize,
    fft_size: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl PitchExtractor {
    pub fn new(settings: &AnalysisSettings) -> Self {
        let sample_rate = settings.sample_rate as f64;
        let max_lag = (sample_rate / settings.low_frequency as f64).ceil() as usize;
        let fft_size = autocorr_fft_size(settings.frame_size, max_lag + 2);
        let (forward, inverse) = plan_ffts(fft_size);

        log::debug!(
            "Pitch extractor: {:.0}-{:.0} Hz, lags up to {}, fft size {}",
            settings.low_frequency,
            settings.high_frequency,
            max_lag,
            fft_size
        );

        Self {
            sample_rate,
            low_frequency: settings.low_frequency,
            high_frequency: settings.high_frequency,
            min_confidence: settings.min_confidence as f64,
            silence_rms: settings.silence_rms as f64,
            max_lag,
            fft_size,
            forward,
            inverse,
        }
    }

    /// Estimates the pitch of one analysis window.
    ///
    /// # Panics
    ///
    /// Panics if the window contains a NaN or infinite sample.
    pub fn extract(&self, window: &[f32]) -> PitchEstimate {
        assert!(
            window.iter().all(|s| s.is_finite()),
            "analysis window contains non-finite samples"
        );

        let n = window.len();
        let lag_count = self.max_lag + 2;
        if n < lag_count {
            return PitchEstimate::Unvoiced;
        }

        let energy: f64 = window.iter().map(|&s| s as f64 * s as f64).sum();
        let rms = (energy / n as f64).sqrt();
        if energy <= 0.0 || rms < self.silence_rms {
            return PitchEstimate::Unvoiced;
        }

        let acf = self.autocorrelation(window, lag_count);
        let nsdf = normalize(window, &acf, energy);

        let Some(peak) = pick_peak(&nsdf, self.max_lag, self.min_confidence) else {
            return PitchEstimate::Unvoiced;
        };

        let lag = refine_peak(&nsdf, peak);
        let hz = (self.sample_rate / lag) as f32;
        if hz < self.low_frequency || hz > self.high_frequency {
            return PitchEstimate::Unvoiced;
        }
        PitchEstimate::Voiced(hz)
    }

    /// Linear autocorrelation for lags `0..lag_count`, via a zero-padded FFT.
    fn autocorrelation(&self, window: &[f32], lag_count: usize) -> Vec<f64> {
        let size = autocorr_fft_size(window.len(), lag_count);
        let (forward, inverse) = if size == self.fft_size {
            (Arc::clone(&self.forward), Arc::clone(&self.inverse))
        } else {
            plan_ffts(size)
        };

        let mut buffer: Vec<Complex<f64>> = vec![Complex::new(0.0, 0.0); size];
        for (slot, &s) in buffer.iter_mut().zip(window) {
            *slot = Complex::new(s as f64, 0.0);
        }

        forward.process(&mut buffer);
        for value in buffer.iter_mut() {
            *value = Complex::new(value.norm_sqr(), 0.0);
        }
        inverse.process(&mut buffer);

        let scale = 1.0 / size as f64;
        buffer[..lag_count].iter().map(|c| c.re * scale).collect()
    }
}

fn plan_ffts(size: usize) -> (Arc<dyn Fft<f64>>, Arc<dyn Fft<f64>>) {
    let mut planner = FftPlanner::<f64>::new();
    (planner.plan_fft_forward(size), planner.plan_fft_inverse(size))
}

/// Smallest power-of-two FFT length that yields `lag_count` lags of a
/// `window_len` signal without circular wrap-around.
fn autocorr_fft_size(window_len: usize, lag_count: usize) -> usize {
    (window_len + lag_count).next_power_of_two()
}

/// `2 r(τ) / Σ (x_j² + x_{j+τ}²)` over the overlapping part of the window.
fn normalize(window: &[f32], acf: &[f64], energy: f64) -> Vec<f64> {
    let n = window.len();
    let floor = energy * 1e-9;
    let mut m = 2.0 * energy;
    let mut nsdf = vec![0.0; acf.len()];

    for (tau, value) in nsdf.iter_mut().enumerate() {
        if tau > 0 {
            let head = window[tau - 1] as f64;
            let tail = window[n - tau] as f64;
            m -= head * head + tail * tail;
        }
        *value = if m > floor { 2.0 * acf[tau] / m } else { 0.0 };
    }

    nsdf
}

/// Earliest local maximum past the zero-lag lobe that clears the confidence
/// threshold and reaches `PEAK_RATIO` of the strongest such maximum.
fn pick_peak(nsdf: &[f64], max_lag: usize, min_confidence: f64) -> Option<usize> {
    let first_dip = nsdf.iter().skip(1).position(|&v| v <= 0.0)? + 1;

    let candidates: Vec<usize> = (first_dip.max(1)..=max_lag)
        .filter(|&tau| {
            nsdf[tau] > nsdf[tau - 1] && nsdf[tau] >= nsdf[tau + 1] && nsdf[tau] >= min_confidence
        })
        .collect();

    let best = candidates
        .iter()
        .map(|&tau| nsdf[tau])
        .fold(f64::NEG_INFINITY, f64::max);

    candidates
        .into_iter()
        .find(|&tau| nsdf[tau] >= PEAK_RATIO * best)
}

/// Vertex of the parabola through the peak and its two neighbours.
fn refine_peak(nsdf: &[f64], tau: usize) -> f64 {
    let (a, b, c) = (nsdf[tau - 1], nsdf[tau], nsdf[tau + 1]);
    let denom = a - 2.0 * b + c;
    if denom.abs() < 1e-12 {
        return tau as f64;
    }
    tau as f64 + 0.5 * (a - c) / denom
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pitch::test_signal::{cents_off, sine};

    fn settings(sample_rate: u32, low: f32, high: f32) -> AnalysisSettings {
        AnalysisSettings {
            sample_rate,
            low_frequency: low,
            high_frequency: high,
            ..AnalysisSettings::default()
        }
    }

    fn assert_within_cents(estimate: PitchEstimate, expected: f32, cents: f32) {
        let hz = estimate
            .hz()
            .unwrap_or_else(|| panic!("expected pitch near {expected} Hz, got {estimate:?}"));
        let off = cents_off(hz, expected);
        assert!(
            off.abs() <= cents,
            "{hz} Hz is {off:.3} cents from {expected} Hz"
        );
    }

    #[test]
    fn pure_sines_within_two_cents() {
        let extractor = PitchExtractor::new(&settings(44100, 80.0, 1000.0));
        for &freq in &[82.41, 100.0, 110.0, 196.0, 261.63, 329.63, 440.0, 523.25, 659.26, 880.0, 987.77] {
            let window = sine(freq, 44100, 2048, 0.5);
            assert_within_cents(extractor.extract(&window), freq, 2.0);
        }
    }

    #[test]
    fn pure_sines_other_band_and_rate() {
        let extractor = PitchExtractor::new(&settings(16000, 60.0, 500.0));
        for &freq in &[65.0, 147.0, 233.08, 311.13, 480.0] {
            let window = sine(freq, 16000, 2048, 0.3);
            assert_within_cents(extractor.extract(&window), freq, 2.0);
        }
    }

    #[test]
    fn silent_window_is_unvoiced() {
        for &(low, high) in &[(80.0, 1000.0), (50.0, 300.0), (200.0, 2000.0)] {
            let extractor = PitchExtractor::new(&settings(44100, low, high));
            assert_eq!(extractor.extract(&[0.0; 2048]), PitchEstimate::Unvoiced);
        }
    }

    #[test]
    fn quiet_window_below_floor_is_unvoiced() {
        let extractor = PitchExtractor::new(&settings(44100, 80.0, 1000.0));
        let window = sine(440.0, 44100, 2048, 0.001);
        assert_eq!(extractor.extract(&window), PitchEstimate::Unvoiced);
    }

    #[test]
    fn above_band_is_unvoiced_not_folded() {
        let extractor = PitchExtractor::new(&settings(44100, 80.0, 1000.0));
        let window = sine(1500.0, 44100, 2048, 0.5);
        assert_eq!(extractor.extract(&window), PitchEstimate::Unvoiced);
    }

    #[test]
    fn below_band_is_unvoiced() {
        let extractor = PitchExtractor::new(&settings(44100, 80.0, 1000.0));
        let window = sine(55.0, 44100, 2048, 0.5);
        assert_eq!(extractor.extract(&window), PitchEstimate::Unvoiced);
    }

    #[test]
    fn short_window_is_unvoiced() {
        let extractor = PitchExtractor::new(&settings(44100, 80.0, 1000.0));
        let window = sine(440.0, 44100, 400, 0.5);
        assert_eq!(extractor.extract(&window), PitchEstimate::Unvoiced);
    }

    #[test]
    fn white_noise_is_unvoiced() {
        let extractor = PitchExtractor::new(&settings(44100, 80.0, 1000.0));
        let mut state: u32 = 0x1234_5678;
        let window: Vec<f32> = (0..2048)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state as f32 / u32::MAX as f32 - 0.5) * 0.6
            })
            .collect();
        assert_eq!(extractor.extract(&window), PitchEstimate::Unvoiced);
    }

    #[test]
    fn harmonic_tone_reports_fundamental() {
        let extractor = PitchExtractor::new(&settings(44100, 80.0, 1000.0));
        let fundamental = sine(220.0, 44100, 2048, 0.4);
        let second = sine(440.0, 44100, 2048, 0.2);
        let third = sine(660.0, 44100, 2048, 0.13);
        let window: Vec<f32> = (0..2048)
            .map(|i| fundamental[i] + second[i] + third[i])
            .collect();
        assert_within_cents(extractor.extract(&window), 220.0, 5.0);
    }

    #[test]
    fn window_length_other_than_frame_size() {
        let extractor = PitchExtractor::new(&settings(44100, 80.0, 1000.0));
        let window = sine(330.0, 44100, 3000, 0.5);
        assert_within_cents(extractor.extract(&window), 330.0, 2.0);
    }

    #[test]
    fn identical_windows_give_identical_estimates() {
        let extractor = PitchExtractor::new(&settings(44100, 80.0, 1000.0));
        let window = sine(293.66, 44100, 2048, 0.5);
        assert_eq!(extractor.extract(&window), extractor.extract(&window));
    }

    #[test]
    #[should_panic(expected = "non-finite")]
    fn nan_sample_fails_fast() {
        let extractor = PitchExtractor::new(&settings(44100, 80.0, 1000.0));
        let mut window = sine(440.0, 44100, 2048, 0.5);
        window[100] = f32::NAN;
        extractor.extract(&window);
    }

    #[test]
    fn parabola_vertex_is_exact_for_quadratics() {
        // samples of 1 - (x - 10.3)^2
        let curve: Vec<f64> = (0..20).map(|x| 1.0 - (x as f64 - 10.3).powi(2)).collect();
        assert!((refine_peak(&curve, 10) - 10.3).abs() < 1e-9);
    }
}
