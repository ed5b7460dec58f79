pub mod heat;
pub mod humidity;
pub mod stats;

use crate::config::ThresholdConfig;
use crate::types::{Sample, Warnings};

/// Trait for per-session anomaly analyzers.
///
/// Each analyzer keeps its own streaming state and inspects accepted samples
/// in arrival order, returning advisory warnings.
pub trait Analyzer: Send + Sync {
    /// Human-readable name for this analyzer
    fn name(&self) -> &str;

    /// Fold the sample into the analyzer state and return any warnings
    fn analyze(&mut self, sample: &Sample) -> Warnings;
}

/// Create the analyzers for one session
pub fn create_analyzers(thresholds: &ThresholdConfig) -> Vec<Box<dyn Analyzer>> {
    vec![
        Box::new(humidity::HumidityAnalyzer::new(thresholds.sh_spike)),
        Box::new(heat::HeatIndexAnalyzer::new(thresholds.heat_index)),
    ]
}

/// Runs every analyzer of a session over each accepted sample.
///
/// Holds no persistence state; warnings never change whether a sample is
/// accepted.
pub struct AnomalyDetector {
    analyzers: Vec<Box<dyn Analyzer>>,
}

impl AnomalyDetector {
    pub fn new(thresholds: &ThresholdConfig) -> Self {
        Self { analyzers: create_analyzers(thresholds) }
    }

    pub fn inspect(&mut self, sample: &Sample) -> Warnings {
        let mut warnings = Warnings::new();
        for analyzer in self.analyzers.iter_mut() {
            let found = analyzer.analyze(sample);
            if !found.is_empty() {
                tracing::trace!(analyzer = analyzer.name(), count = found.len(), "Analyzer raised warnings");
            }
            warnings.extend(found);
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{unset_date, WarningKind};

    fn sample(sh: f64, t: f64, rh: f64) -> Sample {
        Sample { t, tpot: 0.0, tdew: 0.0, sh, rh, date: unset_date() }
    }

    #[test]
    fn humidity_warnings_come_before_heat_index() {
        let thresholds = ThresholdConfig { sh_spike: 1.0, heat_index: 5.0 };
        let mut detector = AnomalyDetector::new(&thresholds);

        assert!(detector.inspect(&sample(10.0, 0.0, 0.0)).is_empty());

        let w = detector.inspect(&sample(20.0, 30.0, 10.0));
        let kinds: Vec<_> = w.iter().map(|w| w.kind).collect();
        assert_eq!(
            kinds,
            vec![
                WarningKind::ShSpike,
                WarningKind::ShAboveRange,
                WarningKind::HeatIndexExceeded,
                WarningKind::HeatIndexSpike,
            ]
        );
    }
}
