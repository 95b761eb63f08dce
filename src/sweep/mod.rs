pub mod controller;
pub mod sampler;
pub mod session;

use log::error;
use serde::{Deserialize, Serialize};

use crate::device::{DetectorLink, FrontEnd, Synthesizer};
use crate::error::Result;

pub use controller::SweepController;
pub use sampler::DualChannelSampler;
pub use session::{FrontEndSession, FrontEndSetup};

/// Calibrated power from one detector channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelReading {
    pub frequency_hz: f64,
    pub power_dbm: f64,
}

/// Both channels at one sweep point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub frequency_hz: f64,
    pub channel_a_dbm: f64,
    pub channel_b_dbm: f64,
    /// channel B minus channel A
    pub delta_db: f64,
}

impl Measurement {
    pub fn new(frequency_hz: f64, a: ChannelReading, b: ChannelReading) -> Self {
        Self {
            frequency_hz,
            channel_a_dbm: a.power_dbm,
            channel_b_dbm: b.power_dbm,
            delta_db: b.power_dbm - a.power_dbm,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    /// What the synthesizer actually produced, not what was asked for.
    pub frequency_hz: f64,
    pub delta_db: f64,
}

/// Swept response in sweep order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepResult {
    pub points: Vec<SweepPoint>,
}

impl SweepResult {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[cfg(test)]
    pub fn frequencies(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|p| p.frequency_hz)
    }

    pub fn deltas(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|p| p.delta_db)
    }

    pub fn mean_delta(&self) -> Option<f64> {
        if self.is_empty() {
            None
        } else {
            Some(self.deltas().sum::<f64>() / self.points.len() as f64)
        }
    }
}

/// Run one sweep with the front end switched on around it.
///
/// A failure to switch off afterwards is logged; the measured points are
/// still returned.
pub fn measure<F, Y, S>(
    front_end: &mut F,
    setup: FrontEndSetup,
    controller: &mut SweepController<Y, S>,
    frequencies: &[f64],
) -> Result<SweepResult>
where
    F: FrontEnd,
    Y: Synthesizer,
    S: DetectorLink,
{
    let session = FrontEndSession::start(front_end, setup)?;
    let result = controller.run_sweep(frequencies)?;
    if let Err(e) = session.close() {
        error!("Failed to switch front end off after sweep: {}", e);
    }
    Ok(result)
}
