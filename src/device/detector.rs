use std::io::{self, Read, Write};
use std::time::Duration;

use log::{debug, info, warn};
use serialport::{ClearBuffer, DataBits, Parity, SerialPort, SerialPortType, StopBits};

use crate::config::DetectorConfig;
use crate::device::{ByteError, ByteSource, DetectorLink};
use crate::error::{Result, VnaError};

/// Above this frequency the detector wants the low T_ADJ resistor.
pub const TADJ_SWITCH_HZ: f64 = 5.3e9;

/// Temperature-compensation resistor select, one command byte to the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempAdjust {
    /// 8.2 kOhm
    Low = 0xF0,
    /// 500 Ohm
    High = 0xF1,
}

impl TempAdjust {
    pub fn for_frequency(freq_hz: f64) -> Self {
        if freq_hz >= TADJ_SWITCH_HZ {
            TempAdjust::High
        } else {
            TempAdjust::Low
        }
    }
}

/// One AD8319 detector board on its USB-UART.
pub struct DetectorPort {
    name: String,
    port: Box<dyn SerialPort>,
}

impl DetectorPort {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl DetectorLink for DetectorPort {
    fn set_temp_adjust(&mut self, tadj: TempAdjust) -> Result<()> {
        debug!("{}: T_ADJ 0x{:02X}", self.name, tadj as u8);
        self.port.write_all(&[tadj as u8])?;
        self.port.flush()?;
        Ok(())
    }
}

impl ByteSource for DetectorPort {
    fn read_byte(&mut self) -> std::result::Result<u8, ByteError> {
        let mut buf = [0u8; 1];
        match self.port.read(&mut buf) {
            Ok(1) => Ok(buf[0]),
            Ok(_) => Err(ByteError::Transient),
            Err(e) => classify(e),
        }
    }

    fn flush_input(&mut self) -> std::result::Result<(), ByteError> {
        match self.port.clear(ClearBuffer::Input) {
            Ok(()) => Ok(()),
            Err(e) => classify(e.into()),
        }
    }
}

fn classify<T>(e: io::Error) -> std::result::Result<T, ByteError> {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => {
            Err(ByteError::Transient)
        }
        _ => Err(ByteError::DeviceLost(e)),
    }
}

/// Serial ports whose USB VID:PID match the detector boards, sorted by name.
pub fn find_detector_ports(cfg: &DetectorConfig) -> Result<Vec<String>> {
    let mut names: Vec<String> = serialport::available_ports()?
        .into_iter()
        .filter(|p| match &p.port_type {
            SerialPortType::UsbPort(usb) => usb.vid == cfg.vid && usb.pid == cfg.pid,
            _ => false,
        })
        .map(|p| p.port_name)
        .collect();
    names.sort();
    Ok(names)
}

pub fn open_detector(path: &str, cfg: &DetectorConfig) -> Result<DetectorPort> {
    info!("Opening detector {} at {} bps", path, cfg.baud);
    let port = serialport::new(path, cfg.baud)
        .parity(Parity::None)
        .stop_bits(StopBits::Two)
        .data_bits(DataBits::Eight)
        .timeout(Duration::from_millis(cfg.timeout_ms))
        .open()
        .map_err(|e| {
            warn!("Opening serial port {} failed: {}", path, e);
            e
        })?;
    Ok(DetectorPort {
        name: path.to_string(),
        port,
    })
}

/// First detector found; readout mode only needs one.
pub fn open_first_detector(cfg: &DetectorConfig) -> Result<DetectorPort> {
    let names = find_detector_ports(cfg)?;
    let first = names.first().ok_or_else(|| {
        VnaError::HardwareNotFound(format!(
            "no power detector with VID:PID {:04X}:{:04X}",
            cfg.vid, cfg.pid
        ))
    })?;
    open_detector(first, cfg)
}

/// Channel A and channel B, in port-name order.
pub fn open_detector_pair(cfg: &DetectorConfig) -> Result<(DetectorPort, DetectorPort)> {
    let names = find_detector_ports(cfg)?;
    if names.len() < 2 {
        return Err(VnaError::HardwareNotFound(format!(
            "unable to find power detectors, found {}",
            names.len()
        )));
    }
    let a = open_detector(&names[0], cfg)?;
    let b = open_detector(&names[1], cfg)?;
    info!("Channel A: {}, channel B: {}", a.name(), b.name());
    Ok((a, b))
}
