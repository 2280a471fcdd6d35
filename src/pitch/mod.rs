pub mod aggregate;
pub mod extractor;
pub mod frames;

use serde::{Deserialize, Serialize};

/// A single fundamental-frequency estimate.
///
/// `Unvoiced` covers silence, noise and anything outside the extractor's
/// frequency band. A `Voiced` value is always inside that band.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum PitchEstimate {
    Voiced(f32),
    Unvoiced,
}

impl PitchEstimate {
    /// Frequency in Hz, if voiced and positive.
    pub fn hz(self) -> Option<f32> {
        match self {
            PitchEstimate::Voiced(hz) if hz > 0.0 => Some(hz),
            _ => None,
        }
    }

    /// Flat representation used by the reference asset: 0.0 means unvoiced.
    pub fn to_stored(self) -> f32 {
        self.hz().unwrap_or(0.0)
    }

    pub fn from_stored(value: f32) -> Self {
        if value.is_finite() && value > 0.0 {
            PitchEstimate::Voiced(value)
        } else {
            PitchEstimate::Unvoiced
        }
    }
}

#[cfg(test)]
pub(crate) mod test_signal {
    /// Pure sine at `freq` Hz, `len` samples long.
    pub fn sine(freq: f32, sample_rate: u32, len: usize, amplitude: f32) -> Vec<f32> {
        let step = 2.0 * std::f64::consts::PI * freq as f64 / sample_rate as f64;
        (0..len)
            .map(|i| (amplitude as f64 * (step * i as f64).sin()) as f32)
            .collect()
    }

    /// Signed distance from `expected` in cents.
    pub fn cents_off(actual: f32, expected: f32) -> f32 {
        1200.0 * (actual / expected).log2()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_zero_is_unvoiced() {
        assert_eq!(PitchEstimate::from_stored(0.0), PitchEstimate::Unvoiced);
        assert_eq!(PitchEstimate::from_stored(-1.0), PitchEstimate::Unvoiced);
        assert_eq!(PitchEstimate::from_stored(f32::NAN), PitchEstimate::Unvoiced);
        assert_eq!(PitchEstimate::Unvoiced.to_stored(), 0.0);
    }

    #[test]
    fn voiced_keeps_value() {
        let p = PitchEstimate::from_stored(220.5);
        assert_eq!(p, PitchEstimate::Voiced(220.5));
        assert_eq!(p.to_stored(), 220.5);
        assert_eq!(p.hz(), Some(220.5));
    }

    #[test]
    fn non_positive_voiced_reads_as_silence() {
        assert_eq!(PitchEstimate::Voiced(0.0).hz(), None);
        assert_eq!(PitchEstimate::Voiced(-3.0).to_stored(), 0.0);
    }
}
