use futures_lite::future::block_on;
use log::{debug, info};
use nusb::transfer::{ControlOut, ControlType, Recipient};

use crate::config::{MixerInput, VnaConfig};
use crate::device::{max2871, FrontEnd, Pll, Synthesizer, Tuning};
use crate::error::{Result, VnaError};

/// The VNA board: both MAX2871s, the filter bank and the front-end switches,
/// all driven through vendor control requests on interface 0.
///
/// Cloning shares the claimed interface, so the sweep can own the synthesizer
/// side while the front-end session holds another handle.
#[derive(Clone)]
pub struct Vna {
    interface: nusb::Interface,
    cfg: VnaConfig,
}

impl Vna {
    /// Open the first board matching the configured VID:PID.
    pub fn open(cfg: &VnaConfig) -> Result<Self> {
        let info = nusb::list_devices()
            .map_err(|e| VnaError::Usb(e.to_string()))?
            .find(|d| d.vendor_id() == cfg.vid && d.product_id() == cfg.pid)
            .ok_or_else(|| {
                VnaError::HardwareNotFound(format!(
                    "VNA not found (VID:PID {:04X}:{:04X})",
                    cfg.vid, cfg.pid
                ))
            })?;
        let device = info.open().map_err(|e| VnaError::Usb(e.to_string()))?;
        #[cfg(not(target_os = "windows"))]
        {
            let configured = device
                .active_configuration()
                .map(|c| c.configuration_value() == 1)
                .unwrap_or(false);
            if !configured {
                device
                    .set_configuration(1)
                    .map_err(|e| VnaError::Usb(e.to_string()))?;
            }
        }
        let interface = device
            .detach_and_claim_interface(0)
            .map_err(|e| VnaError::Usb(e.to_string()))?;
        info!("Found VNA");
        Ok(Self {
            interface,
            cfg: cfg.clone(),
        })
    }

    fn vendor_out(&self, request: u8, value: u16, index: u16, data: &[u8]) -> Result<()> {
        block_on(self.interface.control_out(ControlOut {
            control_type: ControlType::Vendor,
            recipient: Recipient::Device,
            request,
            value,
            index,
            data,
        }))
        .into_result()
        .map_err(|e| VnaError::Usb(format!("request {}: {}", request, e)))?;
        Ok(())
    }

    fn filter_band(&self, freq_hz: f64) -> u16 {
        band_index(&self.cfg.filter_edges_hz, freq_hz)
    }
}

/// Index of the first band whose upper edge covers `freq_hz`; the last band
/// takes anything above the table.
fn band_index(edges: &[f64], freq_hz: f64) -> u16 {
    edges
        .iter()
        .position(|&edge| freq_hz <= edge)
        .unwrap_or(edges.len().saturating_sub(1)) as u16
}

impl Synthesizer for Vna {
    fn tune(&self, _pll: Pll, freq_hz: f64, reference_hz: f64, power: u8) -> Result<Tuning> {
        max2871::tune(freq_hz, reference_hz, power)
    }

    fn commit(&mut self, pll: Pll, tuning: &Tuning) -> Result<()> {
        debug!("PLL {:?} -> {:.0} Hz", pll, tuning.actual_hz);
        for reg in max2871::WRITE_ORDER {
            self.vendor_out(
                self.cfg.requests.pll_write,
                0,
                pll.select(),
                &tuning.registers[reg].to_be_bytes(),
            )?;
        }
        Ok(())
    }

    fn select_path(&mut self, freq_hz: f64) -> Result<()> {
        let band = self.filter_band(freq_hz);
        self.vendor_out(self.cfg.requests.filter, band, 0, &[])
    }
}

impl FrontEnd for Vna {
    fn enable_path(&mut self) -> Result<()> {
        info!("Signal path and PA on");
        self.vendor_out(self.cfg.requests.path_on, 0, self.cfg.path_on_mask, &[])
    }

    fn disable_path(&mut self) -> Result<()> {
        info!("Signal path and PA off");
        self.vendor_out(self.cfg.requests.path_off, 0, self.cfg.path_off_mask, &[])
    }

    fn set_attenuation(&mut self, level: u16) -> Result<()> {
        self.vendor_out(self.cfg.requests.attenuation, level, 0, &[])
    }

    fn select_mixer_input(&mut self, input: MixerInput) -> Result<()> {
        self.vendor_out(self.cfg.requests.mixer_input, input.code(), 0, &[])
    }

    fn select_port(&mut self, port: u8) -> Result<()> {
        self.vendor_out(self.cfg.requests.port, u16::from(port), 0, &[])
    }
}
