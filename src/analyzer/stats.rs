/// Single-pass running mean with a previous-value tracker.
///
/// One instance follows one monitored quantity for the lifetime of a
/// session. The mean is updated incrementally (`mean += (x - mean) / n`) so
/// no running sum is kept.
#[derive(Debug, Clone, Default)]
pub struct StreamingStats {
    count: u64,
    mean: f64,
    previous: Option<f64>,
}

/// What an observation exposes to threshold checks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// `value - previous`, absent on the first observation.
    pub delta: Option<f64>,
    /// Mean of the values seen before this one.
    pub prior_mean: Option<f64>,
}

impl StreamingStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, value: f64) -> Observation {
        let prior_mean = (self.count > 0).then_some(self.mean);
        let delta = self.previous.map(|p| value - p);

        self.count += 1;
        self.mean += (value - self.mean) / self.count as f64;
        self.previous = Some(value);

        Observation { delta, prior_mean }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Running mean, `None` before the first observation
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    pub fn previous(&self) -> Option<f64> {
        self.previous
    }
}
