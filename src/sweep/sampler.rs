use log::{debug, trace};

use crate::cancel::CancelToken;
use crate::config::DetectorConfig;
use crate::device::detector::TempAdjust;
use crate::device::frame_reader::SerialFrameReader;
use crate::device::{ByteSource, DetectorLink};
use crate::dsp::calibration::CalibrationModel;
use crate::error::Result;
use crate::sweep::{ChannelReading, Measurement};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    A,
    B,
}

/// Reads one calibrated power per channel per trigger.
///
/// Channel A is read to completion before channel B; there is no shared
/// trigger, so the two readings are skewed by the UART latency of one frame.
pub struct DualChannelSampler<S> {
    a: SerialFrameReader<S>,
    b: SerialFrameReader<S>,
    model: CalibrationModel,
    full_scale_v: f64,
    max_code: u16,
}

impl<S: ByteSource> DualChannelSampler<S> {
    pub fn new(a: S, b: S, model: CalibrationModel, adc: &DetectorConfig) -> Self {
        Self {
            a: SerialFrameReader::new(a),
            b: SerialFrameReader::new(b),
            model,
            full_scale_v: adc.adc_full_scale_v,
            max_code: adc.adc_max_code,
        }
    }

    /// Flush the channel, wait for a fresh frame and calibrate it at
    /// `frequency_hz`. `Ok(None)` if cancelled while waiting.
    pub fn read_channel(
        &mut self,
        channel: Channel,
        frequency_hz: f64,
        cancel: &CancelToken,
    ) -> Result<Option<ChannelReading>> {
        let (full_scale_v, max_code) = (self.full_scale_v, self.max_code);
        let reader = self.reader_mut(channel);
        reader.flush()?;
        let Some(frame) = reader.next_sample(cancel)? else {
            debug!("Channel {:?} read cancelled", channel);
            return Ok(None);
        };
        let volts = frame.volts(full_scale_v, max_code);
        let power_dbm = self.model.voltage_to_power(volts, frequency_hz);
        trace!(
            "Channel {:?}: code {} -> {:.4} V -> {:.2} dBm",
            channel,
            frame.code(),
            volts,
            power_dbm
        );
        Ok(Some(ChannelReading {
            frequency_hz,
            power_dbm,
        }))
    }

    /// Channel A then channel B.
    pub fn sample(&mut self, frequency_hz: f64, cancel: &CancelToken) -> Result<Option<Measurement>> {
        let Some(a) = self.read_channel(Channel::A, frequency_hz, cancel)? else {
            return Ok(None);
        };
        let Some(b) = self.read_channel(Channel::B, frequency_hz, cancel)? else {
            return Ok(None);
        };
        Ok(Some(Measurement::new(frequency_hz, a, b)))
    }

    pub fn reader_mut(&mut self, channel: Channel) -> &mut SerialFrameReader<S> {
        match channel {
            Channel::A => &mut self.a,
            Channel::B => &mut self.b,
        }
    }

    pub fn sync_losses(&self) -> (u64, u64) {
        (self.a.sync_losses(), self.b.sync_losses())
    }
}

impl<S: DetectorLink> DualChannelSampler<S> {
    pub fn set_temp_adjust(&mut self, tadj: TempAdjust) -> Result<()> {
        self.a.source_mut().set_temp_adjust(tadj)?;
        self.b.source_mut().set_temp_adjust(tadj)?;
        Ok(())
    }
}
