use log::{error, info};

use crate::config::{MixerInput, SweepSettings};
use crate::device::FrontEnd;
use crate::error::Result;

/// Front-end switch positions for a measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrontEndSetup {
    pub attenuation: u16,
    pub mixer_input: MixerInput,
    pub port: u8,
}

impl From<&SweepSettings> for FrontEndSetup {
    fn from(s: &SweepSettings) -> Self {
        Self {
            attenuation: s.attenuation,
            mixer_input: s.mixer_input,
            port: s.port,
        }
    }
}

/// Signal path and PA are on for as long as this value lives.
///
/// Dropping it (normal return, cancellation, `?` unwinding or a panic)
/// switches them off again. `close` does the same and reports the error.
pub struct FrontEndSession<'a, F: FrontEnd> {
    front_end: &'a mut F,
    closed: bool,
}

impl<'a, F: FrontEnd> FrontEndSession<'a, F> {
    pub fn start(front_end: &'a mut F, setup: FrontEndSetup) -> Result<Self> {
        // Guard exists before the first switch so a failed setup still turns off.
        let session = Self {
            front_end,
            closed: false,
        };
        session.front_end.enable_path()?;
        session.front_end.set_attenuation(setup.attenuation)?;
        session.front_end.select_mixer_input(setup.mixer_input)?;
        session.front_end.select_port(setup.port)?;
        info!(
            "Front end ready: attenuation {}, mixer {:?}, port {}",
            setup.attenuation, setup.mixer_input, setup.port
        );
        Ok(session)
    }

    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.front_end.disable_path()
    }
}

impl<F: FrontEnd> Drop for FrontEndSession<'_, F> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.front_end.disable_path() {
                error!("Failed to switch front end off: {}", e);
            }
        }
    }
}
