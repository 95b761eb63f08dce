use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{info, warn};

use crate::cancel::CancelToken;
use crate::config::BenchConfig;
use crate::device::detector::{self, TempAdjust};
use crate::device::frame_reader::SerialFrameReader;
use crate::device::vna::Vna;
use crate::device::DetectorLink;
use crate::dsp::calibration::{CalibrationModel, CalibrationTable};
use crate::dsp::deembed::deembed;
use crate::sweep::{DualChannelSampler, FrontEndSetup, SweepController};
use crate::sweep_plan::SweepPlan;
use crate::util::sweep_io::{self, SweepRecord};

mod cancel;
mod config;
mod device;
mod dsp;
mod error;
mod sweep;
mod sweep_plan;
mod util;

#[derive(Parser)]
#[command(name = "scalar-vna")]
#[command(about = "Scalar network analyzer bench: swept source, two power detectors")]
struct Args {
    /// Bench config (JSON)
    #[arg(short, long, default_value = "bench.json")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sweep the source and record the channel B - channel A delta
    Sweep {
        #[arg(long)]
        start_ghz: Option<f64>,
        #[arg(long)]
        stop_ghz: Option<f64>,
        #[arg(long)]
        points: Option<usize>,
        /// Defaults to sweeps/sweep_<timestamp>.bin
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Print calibrated power from one detector until Ctrl-C
    Detector {
        #[arg(long)]
        freq_ghz: f64,
    },
    /// Return loss of DUT sweeps against short and open references
    Deembed {
        #[arg(long)]
        short: PathBuf,
        #[arg(long)]
        open: PathBuf,
        #[arg(required = true)]
        duts: Vec<PathBuf>,
        #[arg(long)]
        csv_dir: Option<PathBuf>,
    },
    /// List detector serial ports
    Ports,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        info!("Stop requested");
        handler_token.cancel();
    })?;

    match args.command {
        Command::Sweep {
            start_ghz,
            stop_ghz,
            points,
            output,
            csv,
        } => {
            let cfg = load_config(&args.config)?;
            let plan = SweepPlan::from_settings(
                &cfg.sweep,
                start_ghz.map(|g| g * 1e9),
                stop_ghz.map(|g| g * 1e9),
                points,
            )?;
            run_sweep(&cfg, &plan, output, csv, cancel)
        }
        Command::Detector { freq_ghz } => {
            let freq_hz = readout_frequency_hz(freq_ghz)?;
            let cfg = load_config(&args.config)?;
            run_detector(&cfg, freq_hz, cancel)
        }
        Command::Deembed {
            short,
            open,
            duts,
            csv_dir,
        } => run_deembed(&short, &open, &duts, csv_dir.as_deref()),
        Command::Ports => {
            let cfg = load_config(&args.config)?;
            let ports = detector::find_detector_ports(&cfg.detector)?;
            if ports.is_empty() {
                warn!(
                    "No detectors with VID:PID {:04X}:{:04X}",
                    cfg.detector.vid, cfg.detector.pid
                );
            }
            for p in ports {
                println!("{}", p);
            }
            Ok(())
        }
    }
}

/// Readout frequency in Hz; only 0 < f < 10 GHz is accepted.
fn readout_frequency_hz(freq_ghz: f64) -> Result<f64> {
    if !(freq_ghz > 0.0 && freq_ghz < 10.0) {
        bail!("frequency must be between 0 and 10 GHz, got {}", freq_ghz);
    }
    Ok(freq_ghz * 1e9)
}

/// A missing file means defaults; a present but broken one is an error.
fn load_config(path: &Path) -> Result<BenchConfig> {
    if !path.exists() {
        warn!("{} not found, using defaults", path.display());
        return Ok(BenchConfig::from_json("{}")?);
    }
    BenchConfig::load(path).with_context(|| format!("loading {}", path.display()))
}

fn load_model(cfg: &BenchConfig) -> Result<CalibrationModel> {
    let table = CalibrationTable::load(&cfg.calibration_table)
        .with_context(|| format!("loading {}", cfg.calibration_table.display()))?;
    Ok(CalibrationModel::new(table))
}

fn run_sweep(
    cfg: &BenchConfig,
    plan: &SweepPlan,
    output: Option<PathBuf>,
    csv: Option<PathBuf>,
    cancel: CancelToken,
) -> Result<()> {
    let model = load_model(cfg)?;
    let vna = Vna::open(cfg.vna()?).context("opening VNA board")?;
    let (a, b) = detector::open_detector_pair(&cfg.detector).context("opening detectors")?;
    let sampler = DualChannelSampler::new(a, b, model, &cfg.detector);

    // Same USB interface; one handle drives the PLLs, the other the switches.
    let mut front_end = vna.clone();
    let mut controller = SweepController::new(vna, sampler, plan, cancel);
    let result = sweep::measure(
        &mut front_end,
        FrontEndSetup::from(&cfg.sweep),
        &mut controller,
        &plan.frequencies,
    )?;

    if result.len() < plan.frequencies.len() {
        warn!(
            "Sweep incomplete: stopped at point {} of {}",
            controller.cursor(),
            plan.frequencies.len()
        );
    }
    match result.mean_delta() {
        Some(mean) => info!("Mean delta: {:.3} dB over {} points", mean, result.len()),
        None => {
            warn!("No points measured, nothing saved");
            return Ok(());
        }
    }

    let record = SweepRecord::new(result, controller.measurements().to_vec());
    let path = output.unwrap_or_else(sweep_io::default_sweep_path);
    sweep_io::save_sweep(&record, &path)?;
    if let Some(csv) = csv {
        sweep_io::write_csv(&record.measurements, &csv)?;
    }
    Ok(())
}

fn run_detector(cfg: &BenchConfig, freq_hz: f64, cancel: CancelToken) -> Result<()> {
    let model = load_model(cfg)?;
    let mut port = detector::open_first_detector(&cfg.detector)?;
    let tadj = TempAdjust::for_frequency(freq_hz);
    port.set_temp_adjust(tadj)?;
    info!(
        "Reading {} at {:.3} GHz, T_ADJ {:?}",
        port.name(),
        freq_hz / 1e9,
        tadj
    );

    let d = &cfg.detector;
    let mut reader = SerialFrameReader::new(port);
    reader.flush()?;
    while let Some(frame) = reader.next_sample(&cancel)? {
        let volts = frame.volts(d.adc_full_scale_v, d.adc_max_code);
        println!("{:.2}", model.voltage_to_power(volts, freq_hz));
    }
    info!("Readout stopped, {} sync losses", reader.sync_losses());
    Ok(())
}

fn run_deembed(short: &Path, open: &Path, duts: &[PathBuf], csv_dir: Option<&Path>) -> Result<()> {
    let short_rec = sweep_io::load_sweep(short).with_context(|| format!("loading {}", short.display()))?;
    let open_rec = sweep_io::load_sweep(open).with_context(|| format!("loading {}", open.display()))?;

    for dut in duts {
        let dut_rec = sweep_io::load_sweep(dut).with_context(|| format!("loading {}", dut.display()))?;
        let points = deembed(&short_rec.result, &open_rec.result, &dut_rec.result)
            .with_context(|| format!("de-embedding {}", dut.display()))?;

        match csv_dir {
            Some(dir) => {
                let stem = dut
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "dut".to_string());
                std::fs::create_dir_all(dir)?;
                sweep_io::write_return_loss_csv(&points, dir.join(format!("{}_return_loss.csv", stem)))?;
            }
            None => {
                info!("{}:", dut.display());
                for p in &points {
                    info!("{:.4} GHz {:.3} dB", p.frequency_hz / 1e9, p.return_loss_db);
                }
            }
        }
    }
    Ok(())
}
