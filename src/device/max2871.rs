//! MAX2871 fractional-N frequency planning.
//!
//! Only the arithmetic that decides which frequency the chip will really
//! produce is modelled closely; the register words are an opaque program
//! handed to the board as-is.

use crate::device::Tuning;
use crate::error::{Result, VnaError};

/// Fundamental VCO range
pub const VCO_MIN_HZ: f64 = 3.0e9;
pub const VCO_MAX_HZ: f64 = 6.0e9;

/// RF output divider is a power of two up to 128
pub const MAX_DIVIDER_LOG2: u32 = 7;

pub const OUT_MIN_HZ: f64 = VCO_MIN_HZ / 128.0;
pub const OUT_MAX_HZ: f64 = VCO_MAX_HZ;

/// Fractional modulus, fixed at its maximum for the finest step
pub const MODULUS: u32 = 4095;

/// N limits in fractional mode
pub const INT_MIN: u32 = 19;
pub const INT_MAX: u32 = 4091;

/// Band-select clock target
const BAND_SELECT_CLOCK_HZ: f64 = 50e3;

/// Registers are latched on the R0 write, so the program goes out R5 first.
pub const WRITE_ORDER: [usize; 6] = [5, 4, 3, 2, 1, 0];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyPlan {
    pub divider_log2: u32,
    pub int: u32,
    pub frac: u32,
    pub actual_hz: f64,
}

/// Pick divider and N for `freq_hz` with the reference used directly as the
/// phase-detector frequency.
pub fn plan(freq_hz: f64, reference_hz: f64) -> Result<FrequencyPlan> {
    if !(OUT_MIN_HZ..=OUT_MAX_HZ).contains(&freq_hz) {
        return Err(VnaError::Config(format!(
            "{:.0} Hz is outside the synthesizer range {:.0} .. {:.0} Hz",
            freq_hz, OUT_MIN_HZ, OUT_MAX_HZ
        )));
    }
    if !(reference_hz > 0.0) {
        return Err(VnaError::Config("reference frequency must be positive".into()));
    }

    let divider_log2 = (0..=MAX_DIVIDER_LOG2)
        .find(|&d| freq_hz * f64::from(1u32 << d) >= VCO_MIN_HZ)
        .unwrap_or(MAX_DIVIDER_LOG2);
    let divider = f64::from(1u32 << divider_log2);
    let n = freq_hz * divider / reference_hz;

    let mut int = n.floor() as u32;
    let mut frac = ((n - n.floor()) * f64::from(MODULUS)).round() as u32;
    if frac == MODULUS {
        int += 1;
        frac = 0;
    }
    if !(INT_MIN..=INT_MAX).contains(&int) {
        return Err(VnaError::Config(format!(
            "N = {} out of range for reference {:.0} Hz",
            int, reference_hz
        )));
    }

    let actual_hz =
        reference_hz * (f64::from(int) + f64::from(frac) / f64::from(MODULUS)) / divider;

    Ok(FrequencyPlan {
        divider_log2,
        int,
        frac,
        actual_hz,
    })
}

/// Plan `freq_hz` and pack it into the six register words. `power` is the
/// RF-A output power level, 0..=3.
pub fn tune(freq_hz: f64, reference_hz: f64, power: u8) -> Result<Tuning> {
    let p = plan(freq_hz, reference_hz)?;
    Ok(Tuning {
        actual_hz: p.actual_hz,
        registers: registers(&p, reference_hz, power),
    })
}

fn registers(p: &FrequencyPlan, reference_hz: f64, power: u8) -> [u32; 6] {
    let band_select = ((reference_hz / BAND_SELECT_CLOCK_HZ).ceil() as u32).clamp(1, 1023);

    let r0 = (p.int << 15) | (p.frac << 3);
    let r1 = (0b01 << 29) | (1 << 15) | (MODULUS << 3) | 1;
    // R = 1, full charge-pump current, positive PD polarity
    let r2 = (1 << 14) | (0xF << 9) | (1 << 6) | 2;
    let r3 = (1 << 3) | 3;
    let r4 = (0b011 << 29)
        | ((band_select >> 8) << 24)
        | (p.divider_log2 << 20)
        | ((band_select & 0xFF) << 12)
        | (1 << 5)
        | (u32::from(power & 0b11) << 3)
        | 4;
    // digital lock detect on the LD pin
    let r5 = (0b01 << 22) | 5;

    [r0, r1, r2, r3, r4, r5]
}
