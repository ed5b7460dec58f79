use crate::types::{Sample, Warning, WarningKind, Warnings};
use super::humidity::direction;
use super::Analyzer;

/// Heat index from temperature and relative humidity.
///
/// Quadratic-interaction polynomial; the higher-order cross terms of the
/// full regression are zero-weighted and left out.
pub fn heat_index(t: f64, rh: f64) -> f64 {
    -8.78 + 1.61 * t + 2.34 * rh - 0.15 * t * rh - 0.01 * t * t - 0.02 * rh * rh
}

/// Absolute-threshold and spike detection on the heat index
pub struct HeatIndexAnalyzer {
    threshold: f64,
    previous: Option<f64>,
}

impl HeatIndexAnalyzer {
    pub fn new(threshold: f64) -> Self {
        Self { threshold, previous: None }
    }

    pub fn previous(&self) -> Option<f64> {
        self.previous
    }
}

impl Analyzer for HeatIndexAnalyzer {
    fn name(&self) -> &str { "heat_index" }

    fn analyze(&mut self, sample: &Sample) -> Warnings {
        let mut warnings = Warnings::new();
        let hi = heat_index(sample.t, sample.rh);

        if hi > self.threshold {
            warnings.push(Warning {
                kind: WarningKind::HeatIndexExceeded,
                value: hi,
                threshold: self.threshold,
                message: format!("Heat index exceeded threshold: {:.2} > {}", hi, self.threshold),
            });
        }

        if let Some(prev) = self.previous {
            let delta = hi - prev;
            let limit = self.threshold / 2.0;
            if delta.abs() > limit {
                warnings.push(Warning {
                    kind: WarningKind::HeatIndexSpike,
                    value: delta.abs(),
                    threshold: limit,
                    message: format!(
                        "Heat index spike detected: {:.2} ({} threshold)",
                        delta.abs(),
                        direction(delta)
                    ),
                });
            }
        }

        self.previous = Some(hi);
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::unset_date;

    fn sample(t: f64, rh: f64) -> Sample {
        Sample { t, tpot: 0.0, tdew: 0.0, sh: 5.0, rh, date: unset_date() }
    }

    #[test]
    fn polynomial_values() {
        assert!((heat_index(0.0, 0.0) + 8.78).abs() < 1e-12);
        // -8.78 + 48.3 + 23.4 - 45 - 9 - 2
        assert!((heat_index(30.0, 10.0) - 6.92).abs() < 1e-9);
    }

    #[test]
    fn absolute_threshold_fires_on_first_sample() {
        let mut a = HeatIndexAnalyzer::new(5.0);
        let w = a.analyze(&sample(30.0, 10.0));
        assert_eq!(w.len(), 1);
        assert_eq!(w[0].kind, WarningKind::HeatIndexExceeded);
        assert_eq!(w[0].message, "Heat index exceeded threshold: 6.92 > 5");
    }

    #[test]
    fn spike_needs_previous_value() {
        let mut a = HeatIndexAnalyzer::new(1000.0);
        assert!(a.analyze(&sample(0.0, 0.0)).is_empty());
        assert!((a.previous().unwrap() + 8.78).abs() < 1e-12);

        // hi(30,10) - hi(0,0) = 15.7 > 1000 / 2 is false
        assert!(a.analyze(&sample(30.0, 10.0)).is_empty());

        let mut a = HeatIndexAnalyzer::new(20.0);
        a.analyze(&sample(0.0, 0.0));
        let w = a.analyze(&sample(30.0, 10.0));
        assert_eq!(w.len(), 1);
        assert_eq!(w[0].kind, WarningKind::HeatIndexSpike);
        assert_eq!(w[0].message, "Heat index spike detected: 15.70 (above threshold)");
    }

    #[test]
    fn previous_updates_even_when_warning_fires() {
        let mut a = HeatIndexAnalyzer::new(4.0);
        a.analyze(&sample(30.0, 10.0));
        let w = a.analyze(&sample(30.0, 10.0));
        // same index again: exceeded, no spike
        assert_eq!(w.len(), 1);
        assert_eq!(w[0].kind, WarningKind::HeatIndexExceeded);
    }
}
