use std::time::{Duration, Instant};

use log::{debug, info, trace};

use crate::cancel::CancelToken;
use crate::device::detector::TempAdjust;
use crate::device::{DetectorLink, Pll, Synthesizer, Tuning};
use crate::error::Result;
use crate::sweep::sampler::DualChannelSampler;
use crate::sweep::{Measurement, SweepPoint, SweepResult};
use crate::sweep_plan::SweepPlan;

/// Steps the source through a frequency list and records the detector delta
/// at each point.
///
/// The LO only needs to be programmed once per run; `lo_locked` tracks that
/// and is cleared at the start of every `run_sweep`.
pub struct SweepController<Y, S> {
    synth: Y,
    sampler: DualChannelSampler<S>,
    cancel: CancelToken,
    reference_hz: f64,
    settle: Duration,
    source_power: u8,
    lo_power: u8,
    temperature_adjust: bool,
    lo_locked: bool,
    cursor: usize,
    measurements: Vec<Measurement>,
}

impl<Y: Synthesizer, S: DetectorLink> SweepController<Y, S> {
    pub fn new(synth: Y, sampler: DualChannelSampler<S>, plan: &SweepPlan, cancel: CancelToken) -> Self {
        Self {
            synth,
            sampler,
            cancel,
            reference_hz: plan.reference_hz,
            settle: plan.settle,
            source_power: plan.source_power,
            lo_power: plan.lo_power,
            temperature_adjust: plan.temperature_adjust,
            lo_locked: false,
            cursor: 0,
            measurements: Vec::new(),
        }
    }

    /// Sweep `frequencies` in order.
    ///
    /// A cancel request ends the sweep early and returns the points measured
    /// so far. Hardware and calibration errors abort with `Err`.
    pub fn run_sweep(&mut self, frequencies: &[f64]) -> Result<SweepResult> {
        self.lo_locked = false;
        self.measurements.clear();
        let mut result = SweepResult::default();

        for (i, &freq) in frequencies.iter().enumerate() {
            self.cursor = i;
            if self.cancel.is_cancelled() {
                info!("Sweep stopped after {} of {} points", i, frequencies.len());
                return Ok(result);
            }
            let start = Instant::now();
            let Some(m) = self.measure_point(freq)? else {
                info!("Sweep stopped after {} of {} points", i, frequencies.len());
                return Ok(result);
            };
            info!("{:.3} {:.3} {:.3}", m.delta_db, m.channel_a_dbm, m.channel_b_dbm);
            trace!(
                "Point {} ({:.1} MHz) took {:.3}ms",
                i,
                freq / 1e6,
                start.elapsed().as_secs_f64() * 1000.0
            );
            result.points.push(SweepPoint {
                frequency_hz: m.frequency_hz,
                delta_db: m.delta_db,
            });
            self.measurements.push(m);
        }
        self.cursor = frequencies.len();

        let (losses_a, losses_b) = self.sampler.sync_losses();
        debug!("Sync losses: A {}, B {}", losses_a, losses_b);
        Ok(result)
    }

    fn measure_point(&mut self, freq: f64) -> Result<Option<Measurement>> {
        self.synth.select_path(freq)?;

        let source = self
            .synth
            .tune(Pll::Source, freq, self.reference_hz, self.source_power)?;
        if source.actual_hz != freq {
            trace!("Requested {:.0} Hz, synthesizing {:.0} Hz", freq, source.actual_hz);
        }

        if !self.lo_locked {
            self.lock_lo(freq, &source)?;
        }
        self.synth.commit(Pll::Source, &source)?;

        if self.temperature_adjust {
            self.sampler.set_temp_adjust(TempAdjust::for_frequency(freq))?;
        }

        // The detectors are calibrated against the requested frequency; the
        // sweep records the synthesized one.
        let Some(m) = self.sampler.sample(freq, &self.cancel)? else {
            return Ok(None);
        };
        Ok(Some(Measurement {
            frequency_hz: source.actual_hz,
            ..m
        }))
    }

    fn lock_lo(&mut self, freq: f64, source: &Tuning) -> Result<()> {
        let lo = self
            .synth
            .tune(Pll::Lo, freq, self.reference_hz, self.lo_power)?;
        debug!("Locking LO at {:.3} MHz", lo.actual_hz / 1e6);
        self.synth.commit(Pll::Lo, &lo)?;
        self.synth.settle(self.settle);
        // Second write in case the first was missed while the chip powered up.
        self.synth.commit(Pll::Lo, &lo)?;
        self.lo_locked = true;
        self.synth.commit(Pll::Source, source)?;
        self.synth.settle(self.settle);
        Ok(())
    }

    /// Per-channel detail of the last run.
    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    #[cfg(test)]
    pub fn lo_locked(&self) -> bool {
        self.lo_locked
    }

    /// Index of the point being (or last) measured.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[cfg(test)]
    pub fn synth(&self) -> &Y {
        &self.synth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DetectorConfig, SweepSettings};
    use crate::device::mock::{BoardCall, MockBoard, ScriptedBytes};
    use crate::dsp::calibration::{CalibrationModel, CalibrationTable};
    use crate::sweep::sampler::Channel;

    /// One ADC code per dB on both curves, so delta = code_b - code_a.
    fn model() -> CalibrationModel {
        CalibrationModel::new(
            CalibrationTable::new(vec![
                (1e8, vec![(0.0, 0.0), (3.3, 4095.0)]),
                (6e9, vec![(0.0, 0.0), (3.3, 4095.0)]),
            ])
            .unwrap(),
        )
    }

    fn plan(freqs: &[f64]) -> SweepPlan {
        SweepPlan {
            frequencies: freqs.to_vec(),
            reference_hz: 19.2e6,
            settle: Duration::ZERO,
            source_power: 1,
            lo_power: 0,
            temperature_adjust: false,
        }
    }

    /// Channel A always reads code 100; channel B reads `deltas[i]` codes above it.
    fn controller(
        freqs: &[f64],
        deltas: &[f64],
        board: MockBoard,
        cancel: &CancelToken,
    ) -> SweepController<MockBoard, ScriptedBytes> {
        let mut a = ScriptedBytes::new(&[], cancel.clone());
        let mut b = ScriptedBytes::new(&[], cancel.clone());
        for &d in deltas {
            a.push_frame(100);
            b.push_frame(100 + d as u16);
        }
        let sampler = DualChannelSampler::new(a, b, model(), &DetectorConfig::default());
        SweepController::new(board, sampler, &plan(freqs), cancel.clone())
    }

    #[test]
    fn test_records_actual_frequencies_in_order() {
        let requested = [1e9, 2e9, 3e9];
        let board = MockBoard {
            actual_hz: vec![(1e9, 0.99e9), (2e9, 1.99e9), (3e9, 2.99e9)],
            ..Default::default()
        };
        let deltas = [1.0, 2.0, 3.0];
        let cancel = CancelToken::new();
        let mut c = controller(&requested, &deltas, board, &cancel);
        let result = c.run_sweep(&requested).unwrap();

        let freqs: Vec<f64> = result.frequencies().collect();
        assert_eq!(freqs, vec![0.99e9, 1.99e9, 2.99e9]);
        for (got, want) in result.deltas().zip(deltas) {
            assert!((got - want).abs() < 1e-9, "{} vs {}", got, want);
        }
        assert_eq!(c.measurements().len(), 3);
        assert_eq!(c.measurements()[1].frequency_hz, 1.99e9);
    }

    #[test]
    fn test_lo_programmed_once_per_run() {
        let requested = [1e9, 2e9, 3e9];
        let cancel = CancelToken::new();
        let mut c = controller(&requested, &[0.0; 3], MockBoard::default(), &cancel);
        assert!(!c.lo_locked());
        c.run_sweep(&requested).unwrap();
        assert!(c.lo_locked());

        let calls = &c.synth().calls;
        let lo_writes = calls
            .iter()
            .filter(|call| matches!(call, BoardCall::Commit(Pll::Lo, _)))
            .count();
        assert_eq!(lo_writes, 2);
        let source_writes = calls
            .iter()
            .filter(|call| matches!(call, BoardCall::Commit(Pll::Source, _)))
            .count();
        // extra write on the first point while locking the LO
        assert_eq!(source_writes, 4);
        assert_eq!(c.synth().count(&BoardCall::SelectPath(2e9)), 1);
    }

    #[test]
    fn test_call_order_first_point() {
        let requested = [1e9];
        let cancel = CancelToken::new();
        let mut c = controller(&requested, &[0.0], MockBoard::default(), &cancel);
        c.run_sweep(&requested).unwrap();
        let kinds: Vec<&str> = c
            .synth()
            .calls
            .iter()
            .map(|call| match call {
                BoardCall::SelectPath(_) => "path",
                BoardCall::Commit(Pll::Lo, _) => "lo",
                BoardCall::Commit(Pll::Source, _) => "source",
                BoardCall::Settle(_) => "settle",
                _ => "other",
            })
            .collect();
        assert_eq!(
            kinds,
            vec!["path", "lo", "settle", "lo", "source", "settle", "source"]
        );
    }

    #[test]
    fn test_settle_waits_once_per_run() {
        let requested = [1e9, 2e9, 3e9];
        let settle = Duration::from_millis(20);
        let mut p = plan(&requested);
        p.settle = settle;
        let cancel = CancelToken::new();
        let mut a = ScriptedBytes::new(&[], cancel.clone());
        let mut b = ScriptedBytes::new(&[], cancel.clone());
        for _ in 0..6 {
            a.push_frame(0);
            b.push_frame(0);
        }
        let sampler = DualChannelSampler::new(a, b, model(), &DetectorConfig::default());
        let mut c = SweepController::new(MockBoard::default(), sampler, &p, cancel);

        for _ in 0..2 {
            c.run_sweep(&requested).unwrap();
        }
        let calls = &c.synth().calls;
        assert_eq!(c.synth().count(&BoardCall::Settle(settle)), 4);

        // Each run waits only while locking the LO on its first point.
        let first_settle = calls.iter().position(|call| matches!(call, BoardCall::Settle(_))).unwrap();
        let second_path = calls
            .iter()
            .position(|call| *call == BoardCall::SelectPath(2e9))
            .unwrap();
        assert!(first_settle < second_path);
        assert!(!calls[second_path..calls.len() / 2]
            .iter()
            .any(|call| matches!(call, BoardCall::Settle(_))));
    }

    #[test]
    fn test_lo_relocked_on_next_run() {
        let requested = [1e9, 2e9];
        let cancel = CancelToken::new();
        let mut a = ScriptedBytes::new(&[], cancel.clone());
        let mut b = ScriptedBytes::new(&[], cancel.clone());
        for _ in 0..4 {
            a.push_frame(0);
            b.push_frame(0);
        }
        let sampler = DualChannelSampler::new(a, b, model(), &DetectorConfig::default());
        let mut c = SweepController::new(MockBoard::default(), sampler, &plan(&requested), cancel);
        c.run_sweep(&requested).unwrap();
        c.run_sweep(&requested).unwrap();
        let lo_writes = c
            .synth()
            .calls
            .iter()
            .filter(|call| matches!(call, BoardCall::Commit(Pll::Lo, _)))
            .count();
        assert_eq!(lo_writes, 4);
    }

    #[test]
    fn test_cancel_returns_partial_result() {
        let requested = [1e9, 2e9, 3e9, 4e9, 5e9];
        let cancel = CancelToken::new();
        let board = MockBoard {
            cancel_on_path: Some((3, cancel.clone())),
            ..Default::default()
        };
        let mut c = controller(&requested, &[1.0; 5], board, &cancel);
        let result = c.run_sweep(&requested).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(c.cursor(), 2);
    }

    #[test]
    fn test_cancel_before_start() {
        let requested = [1e9, 2e9];
        let cancel = CancelToken::new();
        let mut c = controller(&requested, &[1.0; 2], MockBoard::default(), &cancel);
        cancel.cancel();
        assert!(c.run_sweep(&requested).unwrap().is_empty());
        assert!(c.synth().calls.is_empty());
    }

    #[test]
    fn test_out_of_range_frequency_is_an_error() {
        let requested = [1e9, 9e9];
        let cancel = CancelToken::new();
        let mut c = controller(&requested, &[1.0; 2], MockBoard::default(), &cancel);
        assert!(c.run_sweep(&requested).is_err());
    }

    #[test]
    fn test_temperature_adjust_per_point() {
        let requested = [5.0e9, 5.5e9];
        let cancel = CancelToken::new();
        let mut a = ScriptedBytes::new(&[], cancel.clone());
        let mut b = ScriptedBytes::new(&[], cancel.clone());
        for _ in 0..2 {
            a.push_frame(0);
            b.push_frame(0);
        }
        let sampler = DualChannelSampler::new(a, b, model(), &DetectorConfig::default());
        let mut p = SweepPlan::from_settings(&SweepSettings::default(), Some(5.0e9), Some(5.5e9), Some(2)).unwrap();
        p.settle = Duration::ZERO;
        p.temperature_adjust = true;
        let mut c = SweepController::new(MockBoard::default(), sampler, &p, cancel);
        c.run_sweep(&requested).unwrap();
        let writes = c
            .sampler
            .reader_mut(Channel::A)
            .source_mut()
            .tadj_writes
            .clone();
        assert_eq!(writes, vec![TempAdjust::Low, TempAdjust::High]);
    }
}
