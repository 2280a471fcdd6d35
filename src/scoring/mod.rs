use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ConfigError;
use crate::pitch::PitchEstimate;

/// Feedback tier for one evaluation tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Tier {
    Perfect,
    Good,
    Miss,
}

impl Tier {
    pub fn points(self) -> u32 {
        match self {
            Tier::Perfect => 100,
            Tier::Good => 70,
            Tier::Miss => 0,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Tier::Perfect => "Perfect!",
            Tier::Good => "Good!",
            Tier::Miss => "Miss!",
        };
        f.write_str(label)
    }
}

/// Unit the scoring margins are expressed in. The error is always computed
/// in the same unit as the margins.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MarginUnit {
    /// Logarithmic distance, 1200 per octave.
    #[default]
    Cents,
    /// Absolute frequency difference.
    Hz,
}

impl MarginUnit {
    /// (perfect, good) margins used when none are configured.
    pub fn default_margins(self) -> (f32, f32) {
        match self {
            MarginUnit::Cents => (25.0, 75.0),
            MarginUnit::Hz => (10.0, 30.0),
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            MarginUnit::Cents => "cents",
            MarginUnit::Hz => "Hz",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Margins {
    pub perfect: f32,
    pub good: f32,
    pub unit: MarginUnit,
}

impl Margins {
    pub fn new(perfect: f32, good: f32, unit: MarginUnit) -> Result<Self, ConfigError> {
        if !(perfect >= 0.0) {
            return Err(ConfigError::NegativeMargin { name: "perfect", value: perfect });
        }
        if !(good >= 0.0) {
            return Err(ConfigError::NegativeMargin { name: "good", value: good });
        }
        if good < perfect {
            return Err(ConfigError::MarginOrder { perfect, good });
        }
        Ok(Self { perfect, good, unit })
    }

    pub fn defaults(unit: MarginUnit) -> Self {
        let (perfect, good) = unit.default_margins();
        Self { perfect, good, unit }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Evaluation {
    pub tier: Tier,
    pub points: u32,
    /// Signed detected-minus-reference error in the margin unit. `None`
    /// when either side had no pitch.
    pub error: Option<f32>,
}

/// Interval from `reference` to `detected` in cents. Both must be positive.
pub fn cents_between(detected: f32, reference: f32) -> f32 {
    (1200.0 * (detected as f64 / reference as f64).log2()) as f32
}

/// Classifies one (detected, reference) pair. Margins are inclusive on the
/// better tier.
pub fn classify(detected: PitchEstimate, reference: PitchEstimate, margins: &Margins) -> Evaluation {
    // Unvoiced or non-positive pitches never reach the logarithm.
    let (Some(detected), Some(reference)) = (detected.hz(), reference.hz()) else {
        return Evaluation {
            tier: Tier::Miss,
            points: Tier::Miss.points(),
            error: None,
        };
    };

    let error = match margins.unit {
        MarginUnit::Cents => cents_between(detected, reference),
        MarginUnit::Hz => detected - reference,
    };

    let magnitude = error.abs();
    let tier = if magnitude <= margins.perfect {
        Tier::Perfect
    } else if magnitude <= margins.good {
        Tier::Good
    } else {
        Tier::Miss
    };

    Evaluation {
        tier,
        points: tier.points(),
        error: Some(error),
    }
}

/// Cumulative score and latest feedback for one session.
#[derive(Debug)]
pub struct ScoringEngine {
    margins: Margins,
    score: u64,
    last_tier: Option<Tier>,
}

impl ScoringEngine {
    pub fn new(margins: Margins) -> Self {
        Self {
            margins,
            score: 0,
            last_tier: None,
        }
    }

    /// Scores one tick and folds it into the running total.
    pub fn evaluate(&mut self, detected: PitchEstimate, reference: PitchEstimate) -> Evaluation {
        let evaluation = classify(detected, reference, &self.margins);
        self.score += evaluation.points as u64;
        self.last_tier = Some(evaluation.tier);
        evaluation
    }

    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn last_tier(&self) -> Option<Tier> {
        self.last_tier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cents(perfect: f32, good: f32) -> Margins {
        Margins::new(perfect, good, MarginUnit::Cents).unwrap()
    }

    fn voiced(hz: f32) -> PitchEstimate {
        PitchEstimate::Voiced(hz)
    }

    #[test]
    fn unison_is_perfect_with_zero_error() {
        let result = classify(voiced(440.0), voiced(440.0), &cents(25.0, 75.0));
        assert_eq!(result.tier, Tier::Perfect);
        assert_eq!(result.points, 100);
        assert_eq!(result.error, Some(0.0));
    }

    #[test]
    fn semitone_sharp_is_a_miss() {
        let result = classify(voiced(466.16), voiced(440.0), &cents(25.0, 75.0));
        assert_eq!(result.tier, Tier::Miss);
        assert_eq!(result.points, 0);
        let error = result.error.unwrap();
        assert!((error - 100.0).abs() < 0.1, "error was {error}");
    }

    #[test]
    fn within_good_margin() {
        // 50 cents flat of A4
        let detected = 440.0 * 2f32.powf(-50.0 / 1200.0);
        let result = classify(voiced(detected), voiced(440.0), &cents(25.0, 75.0));
        assert_eq!(result.tier, Tier::Good);
        assert_eq!(result.points, 70);
        assert!(result.error.unwrap() < 0.0);
    }

    #[test]
    fn missing_pitch_is_a_miss_without_error() {
        let margins = cents(25.0, 75.0);
        for (detected, reference) in [
            (voiced(0.0), voiced(440.0)),
            (PitchEstimate::Unvoiced, voiced(440.0)),
            (voiced(440.0), PitchEstimate::Unvoiced),
            (voiced(-10.0), voiced(440.0)),
        ] {
            let result = classify(detected, reference, &margins);
            assert_eq!(result.tier, Tier::Miss);
            assert_eq!(result.points, 0);
            assert_eq!(result.error, None);
        }
    }

    #[test]
    fn boundaries_are_inclusive_on_better_tier() {
        // An octave is exactly 1200 cents, two octaves exactly 2400.
        let margins = cents(1200.0, 2400.0);
        assert_eq!(classify(voiced(880.0), voiced(440.0), &margins).tier, Tier::Perfect);
        assert_eq!(classify(voiced(1760.0), voiced(440.0), &margins).tier, Tier::Good);
        assert_eq!(classify(voiced(110.0), voiced(440.0), &margins).tier, Tier::Good);
        assert_eq!(classify(voiced(3520.0), voiced(440.0), &margins).tier, Tier::Miss);
    }

    #[test]
    fn hz_margins_compare_frequency_difference() {
        let margins = Margins::new(10.0, 30.0, MarginUnit::Hz).unwrap();
        let exact = classify(voiced(450.0), voiced(440.0), &margins);
        assert_eq!(exact.tier, Tier::Perfect);
        assert_eq!(exact.error, Some(10.0));
        assert_eq!(classify(voiced(410.0), voiced(440.0), &margins).tier, Tier::Good);
        assert_eq!(classify(voiced(400.0), voiced(440.0), &margins).tier, Tier::Miss);
    }

    #[test]
    fn units_are_not_mixed() {
        // 20 Hz below 110 Hz is over 300 cents but inside a 30 Hz margin.
        let hz = Margins::new(10.0, 30.0, MarginUnit::Hz).unwrap();
        let ct = cents(10.0, 30.0);
        assert_eq!(classify(voiced(90.0), voiced(110.0), &hz).tier, Tier::Good);
        assert_eq!(classify(voiced(90.0), voiced(110.0), &ct).tier, Tier::Miss);
    }

    #[test]
    fn rejects_bad_margins() {
        assert!(matches!(
            Margins::new(-1.0, 75.0, MarginUnit::Cents),
            Err(ConfigError::NegativeMargin { name: "perfect", .. })
        ));
        assert!(matches!(
            Margins::new(25.0, f32::NAN, MarginUnit::Cents),
            Err(ConfigError::NegativeMargin { name: "good", .. })
        ));
        assert!(matches!(
            Margins::new(50.0, 20.0, MarginUnit::Hz),
            Err(ConfigError::MarginOrder { .. })
        ));
    }

    #[test]
    fn engine_accumulates_and_tracks_last_tier() {
        let mut engine = ScoringEngine::new(Margins::defaults(MarginUnit::Cents));
        assert_eq!(engine.last_tier(), None);

        engine.evaluate(voiced(440.0), voiced(440.0));
        engine.evaluate(voiced(440.0 * 2f32.powf(50.0 / 1200.0)), voiced(440.0));
        assert_eq!(engine.score(), 170);
        assert_eq!(engine.last_tier(), Some(Tier::Good));

        engine.evaluate(PitchEstimate::Unvoiced, voiced(440.0));
        assert_eq!(engine.score(), 170);
        assert_eq!(engine.last_tier(), Some(Tier::Miss));
    }
}
