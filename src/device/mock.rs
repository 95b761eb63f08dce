//! In-memory stand-ins for the detector stream and the VNA board.

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::config::MixerInput;
use crate::device::detector::TempAdjust;
use crate::device::max2871;
use crate::device::{ByteError, ByteSource, DetectorLink, FrontEnd, Pll, Synthesizer, Tuning};
use crate::error::Result;

enum Event {
    Byte(u8),
    Transient,
    Lost,
}

/// Replays a fixed byte script. Bytes pushed with `push_stale` sit in the
/// "OS buffer" and are discarded by `flush_input`. When the script runs dry
/// the shared token is cancelled so blocking readers return.
pub struct ScriptedBytes {
    stale: VecDeque<u8>,
    script: VecDeque<Event>,
    cancel: CancelToken,
    flushes: usize,
    pub tadj_writes: Vec<TempAdjust>,
}

impl ScriptedBytes {
    pub fn new(bytes: &[u8], cancel: CancelToken) -> Self {
        Self {
            stale: VecDeque::new(),
            script: bytes.iter().map(|&b| Event::Byte(b)).collect(),
            cancel,
            flushes: 0,
            tadj_writes: Vec::new(),
        }
    }

    pub fn push_byte(&mut self, byte: u8) {
        self.script.push_back(Event::Byte(byte));
    }

    pub fn push_frame(&mut self, code: u16) {
        for b in [0xFF, (code >> 8) as u8, (code & 0xFF) as u8] {
            self.push_byte(b);
        }
    }

    pub fn push_transient(&mut self, count: usize) {
        for _ in 0..count {
            self.script.push_back(Event::Transient);
        }
    }

    pub fn push_lost(&mut self) {
        self.script.push_back(Event::Lost);
    }

    pub fn push_stale(&mut self, bytes: &[u8]) {
        self.stale.extend(bytes);
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }
}

impl ByteSource for ScriptedBytes {
    fn read_byte(&mut self) -> std::result::Result<u8, ByteError> {
        if let Some(b) = self.stale.pop_front() {
            return Ok(b);
        }
        match self.script.pop_front() {
            Some(Event::Byte(b)) => Ok(b),
            Some(Event::Transient) => Err(ByteError::Transient),
            Some(Event::Lost) => Err(ByteError::DeviceLost(io::Error::new(
                io::ErrorKind::NotFound,
                "detector unplugged",
            ))),
            None => {
                self.cancel.cancel();
                Err(ByteError::Transient)
            }
        }
    }

    fn flush_input(&mut self) -> std::result::Result<(), ByteError> {
        self.flushes += 1;
        self.stale.clear();
        Ok(())
    }
}

impl DetectorLink for ScriptedBytes {
    fn set_temp_adjust(&mut self, tadj: TempAdjust) -> Result<()> {
        self.tadj_writes.push(tadj);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoardCall {
    SelectPath(f64),
    Commit(Pll, f64),
    Settle(Duration),
    EnablePath,
    DisablePath,
    Attenuation(u16),
    Mixer(MixerInput),
    Port(u8),
}

/// Records every call. `actual_hz` maps a requested source frequency to the
/// frequency the mock claims to synthesize; `cancel_on_path` cancels when the
/// n-th path selection happens (1-based).
#[derive(Default)]
pub struct MockBoard {
    pub calls: Vec<BoardCall>,
    pub actual_hz: Vec<(f64, f64)>,
    pub cancel_on_path: Option<(usize, CancelToken)>,
    pub fail_enable: bool,
    pub fail_disable: bool,
    pub paths: usize,
}

impl MockBoard {
    pub fn count(&self, call: &BoardCall) -> usize {
        self.calls.iter().filter(|c| *c == call).count()
    }
}

impl Synthesizer for MockBoard {
    fn tune(&self, pll: Pll, freq_hz: f64, reference_hz: f64, power: u8) -> Result<Tuning> {
        let mut tuning = max2871::tune(freq_hz, reference_hz, power)?;
        if pll == Pll::Source {
            if let Some(&(_, actual)) = self.actual_hz.iter().find(|(req, _)| *req == freq_hz) {
                tuning.actual_hz = actual;
            }
        }
        Ok(tuning)
    }

    fn commit(&mut self, pll: Pll, tuning: &Tuning) -> Result<()> {
        self.calls.push(BoardCall::Commit(pll, tuning.actual_hz));
        Ok(())
    }

    fn select_path(&mut self, freq_hz: f64) -> Result<()> {
        self.paths += 1;
        if let Some((n, token)) = &self.cancel_on_path {
            if *n == self.paths {
                token.cancel();
            }
        }
        self.calls.push(BoardCall::SelectPath(freq_hz));
        Ok(())
    }

    fn settle(&mut self, wait: Duration) {
        self.calls.push(BoardCall::Settle(wait));
    }
}

impl FrontEnd for MockBoard {
    fn enable_path(&mut self) -> Result<()> {
        self.calls.push(BoardCall::EnablePath);
        if self.fail_enable {
            return Err(crate::error::VnaError::Usb("stall".into()));
        }
        Ok(())
    }

    fn disable_path(&mut self) -> Result<()> {
        self.calls.push(BoardCall::DisablePath);
        if self.fail_disable {
            return Err(crate::error::VnaError::Usb("stall".into()));
        }
        Ok(())
    }

    fn set_attenuation(&mut self, level: u16) -> Result<()> {
        self.calls.push(BoardCall::Attenuation(level));
        Ok(())
    }

    fn select_mixer_input(&mut self, input: MixerInput) -> Result<()> {
        self.calls.push(BoardCall::Mixer(input));
        Ok(())
    }

    fn select_port(&mut self, port: u8) -> Result<()> {
        self.calls.push(BoardCall::Port(port));
        Ok(())
    }
}
