use crate::types::{Sample, Warning, WarningKind, Warnings};
use super::stats::StreamingStats;
use super::Analyzer;

/// Lower edge of the expected band, as a fraction of the running mean.
const RANGE_LOW: f64 = 0.75;
/// Upper edge of the expected band, as a fraction of the running mean.
const RANGE_HIGH: f64 = 1.25;

/// Specific-humidity spike and range detection.
///
/// A spike is a jump from the previous accepted sample larger than the
/// configured threshold. The range check compares the sample against
/// 75%..125% of the mean of the samples before it. Both checks wait for a
/// previous sample.
pub struct HumidityAnalyzer {
    stats: StreamingStats,
    spike_threshold: f64,
}

impl HumidityAnalyzer {
    pub fn new(spike_threshold: f64) -> Self {
        Self {
            stats: StreamingStats::new(),
            spike_threshold,
        }
    }

    pub fn stats(&self) -> &StreamingStats {
        &self.stats
    }
}

pub(crate) fn direction(delta: f64) -> &'static str {
    if delta > 0.0 { "above" } else { "below" }
}

impl Analyzer for HumidityAnalyzer {
    fn name(&self) -> &str { "specific_humidity" }

    fn analyze(&mut self, sample: &Sample) -> Warnings {
        let mut warnings = Warnings::new();
        let sh = sample.sh;
        let obs = self.stats.observe(sh);

        let Some(delta) = obs.delta else {
            return warnings;
        };

        if delta.abs() > self.spike_threshold {
            warnings.push(Warning {
                kind: WarningKind::ShSpike,
                value: delta.abs(),
                threshold: self.spike_threshold,
                message: format!(
                    "SH spike detected: {:.2} ({} threshold)",
                    delta.abs(),
                    direction(delta)
                ),
            });
        }

        if let Some(mean) = obs.prior_mean {
            let lower = RANGE_LOW * mean;
            let upper = RANGE_HIGH * mean;
            if sh < lower {
                warnings.push(Warning {
                    kind: WarningKind::ShBelowRange,
                    value: sh,
                    threshold: lower,
                    message: format!("SH below expected range: {:.2} < {:.2}", sh, lower),
                });
            } else if sh > upper {
                warnings.push(Warning {
                    kind: WarningKind::ShAboveRange,
                    value: sh,
                    threshold: upper,
                    message: format!("SH above expected range: {:.2} > {:.2}", sh, upper),
                });
            }
        }

        warnings
    }
}
