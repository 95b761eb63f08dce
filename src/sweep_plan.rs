use std::time::Duration;

use log::info;

use crate::config::SweepSettings;
use crate::error::{Result, VnaError};

/// Sweep parameters resolved from the bench config and CLI overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepPlan {
    pub frequencies: Vec<f64>,
    pub reference_hz: f64,
    pub settle: Duration,
    pub source_power: u8,
    pub lo_power: u8,
    pub temperature_adjust: bool,
}

impl SweepPlan {
    pub fn from_settings(
        settings: &SweepSettings,
        start_hz: Option<f64>,
        stop_hz: Option<f64>,
        points: Option<usize>,
    ) -> Result<Self> {
        let start = start_hz.unwrap_or(settings.start_hz);
        let stop = stop_hz.unwrap_or(settings.stop_hz);
        let points = points.unwrap_or(settings.points);

        if !(start > 0.0) || !stop.is_finite() || stop < start {
            return Err(VnaError::Config(format!(
                "invalid sweep range {} Hz .. {} Hz",
                start, stop
            )));
        }
        if points == 0 {
            return Err(VnaError::Config("sweep needs at least one point".into()));
        }

        let frequencies = linspace(start, stop, points);
        info!(
            "Sweep: {} points, {:.3} GHz .. {:.3} GHz",
            points,
            start / 1e9,
            stop / 1e9
        );
        if points > 1 {
            info!("Step: {:.3} MHz", (stop - start) / (points - 1) as f64 / 1e6);
        }
        info!(
            "Reference: {:.1} MHz, settle {} ms",
            settings.reference_hz / 1e6,
            settings.settle_ms
        );

        Ok(Self {
            frequencies,
            reference_hz: settings.reference_hz,
            settle: Duration::from_millis(settings.settle_ms),
            source_power: settings.source_power,
            lo_power: settings.lo_power,
            temperature_adjust: settings.temperature_adjust,
        })
    }
}

/// Evenly spaced points with both endpoints included.
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => vec![],
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_linspace_endpoints() {
        let f = linspace(100e6, 5.999e9, 600);
        assert_eq!(f.len(), 600);
        assert_relative_eq!(f[0], 100e6);
        assert_relative_eq!(f[599], 5.999e9, epsilon = 1e-3);
        assert!(f.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_linspace_single_point() {
        assert_eq!(linspace(1e9, 2e9, 1), vec![1e9]);
    }

    #[test]
    fn test_overrides_take_precedence() {
        let settings = SweepSettings::default();
        let plan = SweepPlan::from_settings(&settings, Some(1e9), Some(3e9), Some(3)).unwrap();
        assert_eq!(plan.frequencies, vec![1e9, 2e9, 3e9]);
        assert_eq!(plan.settle, Duration::from_millis(20));
        assert_eq!(plan.source_power, 1);
        assert_eq!(plan.lo_power, 0);
    }

    #[test]
    fn test_invalid_range() {
        let settings = SweepSettings::default();
        assert!(SweepPlan::from_settings(&settings, Some(2e9), Some(1e9), None).is_err());
        assert!(SweepPlan::from_settings(&settings, Some(0.0), None, None).is_err());
        assert!(SweepPlan::from_settings(&settings, None, None, Some(0)).is_err());
    }
}
