//! Hardware seams: the detector byte streams and the VNA board.
//!
//! The sweep and sampler only talk to these traits, so the bench can be
//! driven by the real serial/USB devices or by in-memory stand-ins.

pub mod detector;
pub mod frame_reader;
pub mod max2871;
pub mod vna;

#[cfg(test)]
pub mod mock;

use std::io;
use std::thread;
use std::time::Duration;

use crate::error::Result;

/// Outcome of a failed single-byte read.
#[derive(Debug)]
pub enum ByteError {
    /// Timeout or momentarily busy device. Retry the same read.
    Transient,
    /// The device went away. Never retried.
    DeviceLost(io::Error),
}

/// A byte stream from one detector channel.
pub trait ByteSource {
    fn read_byte(&mut self) -> std::result::Result<u8, ByteError>;

    /// Discard anything buffered but not yet read.
    fn flush_input(&mut self) -> std::result::Result<(), ByteError>;
}

/// A detector board: its sample stream plus the T_ADJ command input.
pub trait DetectorLink: ByteSource {
    fn set_temp_adjust(&mut self, tadj: detector::TempAdjust) -> Result<()>;
}

/// The two MAX2871 synthesizers on the VNA board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pll {
    Lo,
    Source,
}

impl Pll {
    /// Chip-select index used by the board's register write request.
    pub fn select(self) -> u16 {
        match self {
            Pll::Lo => 2,
            Pll::Source => 3,
        }
    }
}

/// A computed synthesizer setting: the frequency it will really produce and
/// the register words that produce it.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuning {
    pub actual_hz: f64,
    pub registers: [u32; 6],
}

pub trait Synthesizer {
    /// Compute the register program for `freq_hz`. No hardware access.
    fn tune(&self, pll: Pll, freq_hz: f64, reference_hz: f64, power: u8) -> Result<Tuning>;

    /// Write a previously computed program to the chip.
    fn commit(&mut self, pll: Pll, tuning: &Tuning) -> Result<()>;

    /// Switch the filter bank to the band covering `freq_hz`.
    fn select_path(&mut self, freq_hz: f64) -> Result<()>;

    /// Wait for a freshly written PLL to lock.
    fn settle(&mut self, wait: Duration) {
        thread::sleep(wait);
    }
}

/// RF front-end switches, used at sweep start and end only.
pub trait FrontEnd {
    fn enable_path(&mut self) -> Result<()>;
    fn disable_path(&mut self) -> Result<()>;
    fn set_attenuation(&mut self, level: u16) -> Result<()>;
    fn select_mixer_input(&mut self, input: crate::config::MixerInput) -> Result<()>;
    fn select_port(&mut self, port: u8) -> Result<()>;
}
