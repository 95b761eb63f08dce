use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::Deserialize;

use crate::error::{Result, VnaError};

/// Serial settings and ADC scaling for the AD8319 detector boards.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub vid: u16,
    pub pid: u16,
    pub baud: u32,
    pub timeout_ms: u64,
    pub adc_full_scale_v: f64,
    pub adc_max_code: u16,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            vid: 0x1FC9,
            pid: 0x0083,
            baud: 1_000_000,
            timeout_ms: 100,
            adc_full_scale_v: 3.3,
            adc_max_code: 4095,
        }
    }
}

/// bRequest codes of the VNA board's vendor control endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct VendorRequests {
    #[serde(default = "default_path_on")]
    pub path_on: u8,
    #[serde(default = "default_path_off")]
    pub path_off: u8,
    pub attenuation: u8,
    pub mixer_input: u8,
    pub port: u8,
    pub filter: u8,
    pub pll_write: u8,
}

fn default_path_on() -> u8 {
    4
}

fn default_path_off() -> u8 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct VnaConfig {
    #[serde(default = "default_vna_vid")]
    pub vid: u16,
    #[serde(default = "default_vna_pid")]
    pub pid: u16,
    pub requests: VendorRequests,
    /// Output bits driven high at sweep start (signal path, PA).
    #[serde(default = "default_path_on_mask")]
    pub path_on_mask: u16,
    /// Output bits driven low when the sweep ends, however it ends.
    #[serde(default = "default_path_off_mask")]
    pub path_off_mask: u16,
    /// Upper edge of each filter band, ascending. Band index = first edge >= f.
    #[serde(default)]
    pub filter_edges_hz: Vec<f64>,
}

fn default_vna_vid() -> u16 {
    0x1D50
}

fn default_vna_pid() -> u16 {
    0x6099
}

fn default_path_on_mask() -> u16 {
    (1 << 0) | (1 << 2)
}

fn default_path_off_mask() -> u16 {
    (1 << 0) | (1 << 2) | (1 << 3)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MixerInput {
    Rx1,
    Rx2,
}

impl MixerInput {
    pub fn code(self) -> u16 {
        match self {
            MixerInput::Rx1 => 1,
            MixerInput::Rx2 => 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SweepSettings {
    pub start_hz: f64,
    pub stop_hz: f64,
    pub points: usize,
    pub reference_hz: f64,
    pub settle_ms: u64,
    pub source_power: u8,
    pub lo_power: u8,
    pub attenuation: u16,
    pub mixer_input: MixerInput,
    pub port: u8,
    pub temperature_adjust: bool,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            start_hz: 100e6,
            stop_hz: 5.999e9,
            points: 600,
            reference_hz: 19.2e6,
            settle_ms: 20,
            source_power: 1,
            lo_power: 0,
            attenuation: 0,
            mixer_input: MixerInput::Rx1,
            port: 2,
            temperature_adjust: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BenchConfig {
    #[serde(default)]
    pub detector: DetectorConfig,
    pub vna: Option<VnaConfig>,
    #[serde(default)]
    pub sweep: SweepSettings,
    #[serde(default = "default_calibration_table")]
    pub calibration_table: PathBuf,
}

fn default_calibration_table() -> PathBuf {
    PathBuf::from("ad8319_cal.json")
}

impl BenchConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading bench config: {}", path.display());
        let contents = fs::read_to_string(path).map_err(|e| {
            VnaError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let config: BenchConfig = serde_json::from_str(contents)
            .map_err(|e| VnaError::Config(format!("malformed bench config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// The VNA section is only needed by the sweep; readout mode runs without it.
    pub fn vna(&self) -> Result<&VnaConfig> {
        self.vna
            .as_ref()
            .ok_or_else(|| VnaError::Config("bench config has no \"vna\" section".into()))
    }

    fn validate(&self) -> Result<()> {
        let d = &self.detector;
        if d.adc_max_code == 0 || !(d.adc_full_scale_v > 0.0) {
            return Err(VnaError::Config("detector ADC scaling must be positive".into()));
        }
        let s = &self.sweep;
        if !(s.reference_hz > 0.0) {
            return Err(VnaError::Config("sweep reference_hz must be positive".into()));
        }
        if s.source_power > 3 || s.lo_power > 3 {
            return Err(VnaError::Config("amplifier power level must be 0..=3".into()));
        }
        if let Some(vna) = &self.vna {
            if vna.filter_edges_hz.windows(2).any(|w| w[0] >= w[1]) {
                return Err(VnaError::Config("filter_edges_hz must be strictly ascending".into()));
            }
        }
        Ok(())
    }
}
