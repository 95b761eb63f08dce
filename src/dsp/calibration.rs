//! Detector calibration: raw detector voltage + RF frequency -> dBm.
//!
//! The AD8319 was characterised at a handful of frequencies, each with its own
//! voltage/power curve. A reading is first evaluated on every curve, then the
//! per-frequency results are interpolated at the RF frequency. Both stages
//! extrapolate linearly past the ends of the table.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::{info, trace};
use serde::Deserialize;

use crate::error::{Result, VnaError};

/// Loss of the parallel 50 ohm termination in front of the detector.
pub const TERMINATION_OFFSET_DB: f64 = 3.3;

#[derive(Debug, Deserialize)]
struct CalibrationFile {
    curves: Vec<CurveEntry>,
}

#[derive(Debug, Deserialize)]
struct CurveEntry {
    frequency_hz: f64,
    /// `[voltage, dBm]` pairs
    points: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationCurve {
    pub frequency_hz: f64,
    voltages: Vec<f64>,
    powers: Vec<f64>,
}

impl CalibrationCurve {
    fn new(frequency_hz: f64, mut points: Vec<(f64, f64)>) -> Result<Self> {
        if points.len() < 2 {
            return Err(VnaError::Calibration(format!(
                "curve at {} Hz needs at least two points, has {}",
                frequency_hz,
                points.len()
            )));
        }
        if points.iter().any(|(v, p)| !v.is_finite() || !p.is_finite()) {
            return Err(VnaError::Calibration(format!(
                "curve at {} Hz has non-finite values",
                frequency_hz
            )));
        }
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        if points.windows(2).any(|w| w[0].0 == w[1].0) {
            return Err(VnaError::Calibration(format!(
                "curve at {} Hz repeats a voltage",
                frequency_hz
            )));
        }
        let (voltages, powers) = points.into_iter().unzip();
        Ok(Self {
            frequency_hz,
            voltages,
            powers,
        })
    }

    /// Power on this curve at `voltage`, without the termination offset.
    pub fn power_at(&self, voltage: f64) -> f64 {
        interpolate(&self.voltages, &self.powers, voltage)
    }
}

/// Immutable once built; share it through `CalibrationModel`.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationTable {
    curves: Vec<CalibrationCurve>,
}

impl CalibrationTable {
    pub fn new(curves: Vec<(f64, Vec<(f64, f64)>)>) -> Result<Self> {
        let mut curves = curves
            .into_iter()
            .map(|(f, points)| {
                if !f.is_finite() {
                    return Err(VnaError::Calibration("non-finite calibration frequency".into()));
                }
                CalibrationCurve::new(f, points)
            })
            .collect::<Result<Vec<_>>>()?;
        if curves.len() < 2 {
            return Err(VnaError::Calibration(format!(
                "need at least two calibration frequencies, have {}",
                curves.len()
            )));
        }
        curves.sort_by(|a, b| a.frequency_hz.total_cmp(&b.frequency_hz));
        if let Some(w) = curves.windows(2).find(|w| w[0].frequency_hz == w[1].frequency_hz) {
            return Err(VnaError::Calibration(format!(
                "duplicate calibration frequency {} Hz",
                w[0].frequency_hz
            )));
        }
        Ok(Self { curves })
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let file: CalibrationFile = serde_json::from_str(contents)
            .map_err(|e| VnaError::Calibration(format!("malformed table: {}", e)))?;
        Self::new(
            file.curves
                .into_iter()
                .map(|c| (c.frequency_hz, c.points))
                .collect(),
        )
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            VnaError::Calibration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let table = Self::from_json(&contents)?;
        info!(
            "Loaded calibration table {}: {} frequencies, {:.0} .. {:.0} MHz",
            path.display(),
            table.curves.len(),
            table.curves[0].frequency_hz / 1e6,
            table.curves[table.curves.len() - 1].frequency_hz / 1e6
        );
        Ok(table)
    }
}

#[derive(Debug, Clone)]
pub struct CalibrationModel {
    table: Arc<CalibrationTable>,
}

impl CalibrationModel {
    pub fn new(table: CalibrationTable) -> Self {
        Self {
            table: Arc::new(table),
        }
    }

    pub fn voltage_to_power(&self, voltage: f64, frequency_hz: f64) -> f64 {
        let (freqs, estimates): (Vec<f64>, Vec<f64>) = self
            .table
            .curves
            .iter()
            .map(|c| (c.frequency_hz, c.power_at(voltage)))
            .unzip();
        let power = interpolate(&freqs, &estimates, frequency_hz) + TERMINATION_OFFSET_DB;
        trace!(
            "{:.4} V @ {:.1} MHz -> {:.2} dBm",
            voltage,
            frequency_hz / 1e6,
            power
        );
        power
    }
}

/// Piecewise-linear interpolation over ascending `xs`, extending the end
/// segments beyond the sampled range. Needs at least two samples.
pub fn interpolate(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    debug_assert!(xs.len() >= 2 && xs.len() == ys.len());
    let i = xs
        .partition_point(|&xi| xi <= x)
        .saturating_sub(1)
        .min(xs.len() - 2);
    let (x0, x1) = (xs[i], xs[i + 1]);
    let (y0, y1) = (ys[i], ys[i + 1]);
    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
}
