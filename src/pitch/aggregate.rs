use super::PitchEstimate;

/// Collects per-window estimates for one evaluation tick and reduces them
/// to a single representative pitch.
#[derive(Debug, Default)]
pub struct PitchAggregator {
    sum: f64,
    voiced: usize,
    observed: usize,
}

impl PitchAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one window's estimate. Unvoiced windows are counted but do
    /// not contribute to the mean.
    pub fn observe(&mut self, estimate: PitchEstimate) {
        self.observed += 1;
        if let Some(hz) = estimate.hz() {
            self.sum += hz as f64;
            self.voiced += 1;
        }
    }

    /// Mean of the voiced estimates since the last reduce, or `Unvoiced` if
    /// there were none. Clears the tick buffer.
    pub fn reduce(&mut self) -> PitchEstimate {
        let result = if self.voiced == 0 {
            PitchEstimate::Unvoiced
        } else {
            PitchEstimate::Voiced((self.sum / self.voiced as f64) as f32)
        };
        *self = Self::default();
        result
    }

    /// Windows seen in the current tick, voiced or not.
    pub fn observed(&self) -> usize {
        self.observed
    }

    pub fn voiced(&self) -> usize {
        self.voiced
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduces_to_mean_of_voiced() {
        let mut agg = PitchAggregator::new();
        agg.observe(PitchEstimate::Voiced(200.0));
        agg.observe(PitchEstimate::Unvoiced);
        agg.observe(PitchEstimate::Voiced(220.0));
        assert_eq!(agg.observed(), 3);
        assert_eq!(agg.voiced(), 2);
        assert_eq!(agg.reduce(), PitchEstimate::Voiced(210.0));
    }

    #[test]
    fn empty_tick_is_unvoiced() {
        let mut agg = PitchAggregator::new();
        assert_eq!(agg.reduce(), PitchEstimate::Unvoiced);
        agg.observe(PitchEstimate::Unvoiced);
        agg.observe(PitchEstimate::Unvoiced);
        assert_eq!(agg.reduce(), PitchEstimate::Unvoiced);
    }

    #[test]
    fn second_reduce_without_observations_is_unvoiced() {
        let mut agg = PitchAggregator::new();
        agg.observe(PitchEstimate::Voiced(440.0));
        assert_eq!(agg.reduce(), PitchEstimate::Voiced(440.0));
        assert_eq!(agg.reduce(), PitchEstimate::Unvoiced);
        assert_eq!(agg.observed(), 0);
    }
}
