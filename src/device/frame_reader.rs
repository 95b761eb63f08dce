//! Frame synchronization for the detector UART stream.
//!
//! The detector firmware sends each 12-bit ADC code as three bytes:
//! `0xFF`, `0x0H`, `0xLL`. Data bytes never reach `0xFF`, so the marker is
//! unambiguous once the reader is aligned; a high byte with a non-zero upper
//! nibble means alignment was lost.

use log::trace;

use crate::cancel::CancelToken;
use crate::device::{ByteError, ByteSource};
use crate::error::{Result, VnaError};

pub const SYNC_BYTE: u8 = 0xFF;
const HIGH_BYTE_MASK: u8 = 0xF0;

/// One decoded ADC code, 0..=4095.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleFrame(u16);

impl SampleFrame {
    pub fn code(self) -> u16 {
        self.0
    }

    /// Detector output voltage for this code.
    pub fn volts(self, full_scale_v: f64, max_code: u16) -> f64 {
        full_scale_v * f64::from(self.0) / f64::from(max_code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncState {
    WaitSync,
    ReadHigh,
    ReadLow { high: u8 },
}

pub struct SerialFrameReader<S> {
    source: S,
    state: SyncState,
    sync_losses: u64,
}

impl<S: ByteSource> SerialFrameReader<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            state: SyncState::WaitSync,
            sync_losses: 0,
        }
    }

    /// Block until a frame is decoded.
    ///
    /// Returns `Ok(None)` if `cancel` fires first; any partial frame is dropped.
    /// Transient read faults are retried without touching the decoder state.
    pub fn next_sample(&mut self, cancel: &CancelToken) -> Result<Option<SampleFrame>> {
        loop {
            if cancel.is_cancelled() {
                self.state = SyncState::WaitSync;
                return Ok(None);
            }
            let byte = match self.source.read_byte() {
                Ok(byte) => byte,
                Err(ByteError::Transient) => continue,
                Err(ByteError::DeviceLost(e)) => {
                    self.state = SyncState::WaitSync;
                    return Err(VnaError::DeviceLost(e));
                }
            };
            if let Some(frame) = self.step(byte) {
                return Ok(Some(frame));
            }
        }
    }

    /// Drop stale bytes captured before the last hardware change.
    pub fn flush(&mut self) -> Result<()> {
        self.state = SyncState::WaitSync;
        match self.source.flush_input() {
            Ok(()) | Err(ByteError::Transient) => Ok(()),
            Err(ByteError::DeviceLost(e)) => Err(VnaError::DeviceLost(e)),
        }
    }

    /// Number of times a bad high byte forced a resync.
    pub fn sync_losses(&self) -> u64 {
        self.sync_losses
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    fn step(&mut self, byte: u8) -> Option<SampleFrame> {
        match self.state {
            SyncState::WaitSync => {
                if byte == SYNC_BYTE {
                    self.state = SyncState::ReadHigh;
                }
                None
            }
            SyncState::ReadHigh => {
                if byte & HIGH_BYTE_MASK != 0 {
                    // Not re-read as a marker, even if it is 0xFF.
                    trace!("Sync lost on high byte 0x{:02X}", byte);
                    self.sync_losses += 1;
                    self.state = SyncState::WaitSync;
                } else {
                    self.state = SyncState::ReadLow { high: byte & 0x0F };
                }
                None
            }
            SyncState::ReadLow { high } => {
                self.state = SyncState::WaitSync;
                Some(SampleFrame((u16::from(high) << 8) | u16::from(byte)))
            }
        }
    }
}
