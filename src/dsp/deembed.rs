//! Short/open de-embedding of a device-under-test sweep.

use crate::error::{Result, VnaError};
use crate::sweep::SweepResult;

/// Sweeps taken with the same frequency list agree to well under this.
const FREQ_TOLERANCE_HZ: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReturnLossPoint {
    pub frequency_hz: f64,
    pub return_loss_db: f64,
}

/// Mean of the short and open responses, point by point (tau).
pub fn reference_term(short: &SweepResult, open: &SweepResult) -> Result<Vec<f64>> {
    check_aligned(short, open, "open")?;
    Ok(short
        .points
        .iter()
        .zip(&open.points)
        .map(|(s, o)| (s.delta_db + o.delta_db) / 2.0)
        .collect())
}

pub fn deembed(
    short: &SweepResult,
    open: &SweepResult,
    dut: &SweepResult,
) -> Result<Vec<ReturnLossPoint>> {
    let tau = reference_term(short, open)?;
    check_aligned(short, dut, "DUT")?;
    Ok(dut
        .points
        .iter()
        .zip(tau)
        .map(|(p, t)| ReturnLossPoint {
            frequency_hz: p.frequency_hz,
            return_loss_db: p.delta_db - t,
        })
        .collect())
}

fn check_aligned(reference: &SweepResult, other: &SweepResult, name: &str) -> Result<()> {
    if reference.len() != other.len() {
        return Err(VnaError::Mismatch(format!(
            "{} sweep has {} points, short has {}",
            name,
            other.len(),
            reference.len()
        )));
    }
    if let Some((i, (a, b))) = reference
        .points
        .iter()
        .zip(&other.points)
        .enumerate()
        .find(|(_, (a, b))| (a.frequency_hz - b.frequency_hz).abs() > FREQ_TOLERANCE_HZ)
    {
        return Err(VnaError::Mismatch(format!(
            "{} sweep point {} is at {:.0} Hz, short is at {:.0} Hz",
            name, i, b.frequency_hz, a.frequency_hz
        )));
    }
    Ok(())
}
