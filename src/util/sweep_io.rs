use bincode::{config::*, serde::*};
use chrono::Utc;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::dsp::deembed::ReturnLossPoint;
use crate::error::Result;
use crate::sweep::{Measurement, SweepResult};

pub const SWEEP_DIR: &str = "sweeps";

/// One persisted sweep: the delta trace plus the per-channel readings behind it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SweepRecord {
    pub recorded_at: String,
    pub result: SweepResult,
    pub measurements: Vec<Measurement>,
}

impl SweepRecord {
    pub fn new(result: SweepResult, measurements: Vec<Measurement>) -> Self {
        Self {
            recorded_at: Utc::now().to_rfc3339(),
            result,
            measurements,
        }
    }
}

/// Return-loss CSV row, frequency in GHz.
#[derive(Serialize)]
struct ReturnLossRow {
    frequency_ghz: f64,
    return_loss_db: f64,
}

/// `sweeps/sweep_<UTC timestamp>.bin`
pub fn default_sweep_path() -> PathBuf {
    let timestamp = Utc::now().format("%Y-%m-%d_%H-%M-%S").to_string();
    Path::new(SWEEP_DIR).join(format!("sweep_{}.bin", timestamp))
}

pub fn save_sweep<P: AsRef<Path>>(record: &SweepRecord, filename: P) -> Result<()> {
    let filename = filename.as_ref();
    if let Some(dir) = filename.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let config = standard().with_little_endian();
    let encoded: Vec<u8> = encode_to_vec(record, config)?;
    fs::write(filename, &encoded)?;
    info!(
        "Saved sweep of {} points ({} bytes) to {:?}",
        record.result.len(),
        encoded.len(),
        filename
    );
    Ok(())
}

pub fn load_sweep<P: AsRef<Path>>(filename: P) -> Result<SweepRecord> {
    let filename = filename.as_ref();
    let encoded = fs::read(filename)?;
    let config = standard().with_little_endian();
    let (record, _): (SweepRecord, usize) = decode_from_slice(&encoded, config)?;
    info!(
        "Loaded sweep of {} points recorded {} from {:?}",
        record.result.len(),
        record.recorded_at,
        filename
    );
    Ok(record)
}

/// One row per measured point, header from the field names.
pub fn write_csv<P: AsRef<Path>>(measurements: &[Measurement], filename: P) -> Result<()> {
    let mut wtr = csv::Writer::from_path(filename.as_ref())?;
    for m in measurements {
        wtr.serialize(m)?;
    }
    wtr.flush()?;
    info!("Wrote {} rows to {:?}", measurements.len(), filename.as_ref());
    Ok(())
}

pub fn write_return_loss_csv<P: AsRef<Path>>(points: &[ReturnLossPoint], filename: P) -> Result<()> {
    let mut wtr = csv::Writer::from_path(filename.as_ref())?;
    for p in points {
        wtr.serialize(ReturnLossRow {
            frequency_ghz: p.frequency_hz / 1e9,
            return_loss_db: p.return_loss_db,
        })?;
    }
    wtr.flush()?;
    info!("Wrote {} return loss points to {:?}", points.len(), filename.as_ref());
    Ok(())
}
