// ─────────────────────────────────────────────────────────────────────
// PocKETlab Core — Frequency Response Engine
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Log-spaced amplitude sweep.
//!
//! Gain is the ratio of the response amplitude to the applied amplitude.
//! Phase comes from a single-pole placeholder model, there is no
//! synchronous detection.

use super::{check_range, percent, FlushState, Gate, ModeEngine};
use crate::command::parse_settings;
use crate::context::LabContext;
use crate::messages::{BatchData, DataBatch};
use lab_control::regulator::{rms_read, settle};
use lab_control::ring::SampleRing;
use lab_types::config::EngineConfig;
use lab_types::constants::{
    BODE_BUFFER_CAPACITY, BODE_FREQ_MAX_HZ, BODE_FREQ_MIN_HZ, BODE_MAX_POINTS, BODE_PPD_MAX,
    BODE_PPD_MIN, GAIN_EPSILON, PHASE_PLACEHOLDER_CORNER_HZ, STEP_COUNT_EPSILON,
};
use lab_types::error::{LabError, LabResult};
use lab_types::io::Channel;
use lab_types::mode::MeasurementMode;
use lab_types::sample::BodeSample;
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};

const MODE: MeasurementMode = MeasurementMode::Bode;

#[derive(Debug, Clone, Deserialize)]
pub struct FrequencyRange {
    pub from: f64,
    pub to: f64,
    pub points_per_decade: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BodeSettings {
    pub channel: Channel,
    pub frequency_range: FrequencyRange,
    pub output_voltage: f64,
}

/// `floor(decades · ppd) + 1`.
pub fn point_count(from: f64, to: f64, points_per_decade: u32) -> usize {
    ((to / from).log10() * points_per_decade as f64 + STEP_COUNT_EPSILON).floor() as usize + 1
}

/// Frequency of point `index` out of `total` on a log grid.
pub fn frequency_at(from: f64, to: f64, index: usize, total: usize) -> f64 {
    if total <= 1 {
        return from;
    }
    let frac = index as f64 / (total - 1) as f64;
    from * 10f64.powf(frac * (to / from).log10())
}

pub fn gain_db(measured: f64, applied: f64) -> f64 {
    20.0 * (measured / applied + GAIN_EPSILON).log10()
}

pub fn placeholder_phase_deg(freq: f64) -> f64 {
    -(freq / PHASE_PLACEHOLDER_CORNER_HZ).atan().to_degrees()
}

pub struct BodeEngine {
    channel: Channel,
    from: f64,
    to: f64,
    amplitude: f64,
    total_points: usize,
    current_point: usize,
    gate: Gate,
    settle: Duration,
    rms_samples: usize,
    buffer: SampleRing<BodeSample>,
    flush: FlushState,
}

impl BodeEngine {
    pub fn from_settings(settings: &Value, config: &EngineConfig) -> LabResult<Self> {
        let s: BodeSettings = parse_settings(MODE, settings)?;
        let range = &s.frequency_range;
        let mode = MODE.as_str();

        check_range(MODE, "frequency_range.from", range.from, BODE_FREQ_MIN_HZ, BODE_FREQ_MAX_HZ, "Hz")?;
        check_range(MODE, "frequency_range.to", range.to, BODE_FREQ_MIN_HZ, BODE_FREQ_MAX_HZ, "Hz")?;
        if range.from >= range.to {
            return Err(LabError::parameter_range(
                mode,
                "frequency_range.to",
                range.to,
                "The end frequency must be greater than the start frequency",
            ));
        }
        if !(BODE_PPD_MIN..=BODE_PPD_MAX).contains(&range.points_per_decade) {
            return Err(LabError::parameter_range(
                mode,
                "frequency_range.points_per_decade",
                range.points_per_decade,
                format!("Use between {BODE_PPD_MIN} and {BODE_PPD_MAX} points per decade"),
            ));
        }
        let max_output = config.limits.max_output(s.channel);
        if !s.output_voltage.is_finite() || s.output_voltage <= 0.0 || s.output_voltage > max_output
        {
            return Err(LabError::parameter_range(
                mode,
                "output_voltage",
                s.output_voltage,
                format!("Use an amplitude above 0 and up to {max_output:.3} V"),
            ));
        }
        let total_points = point_count(range.from, range.to, range.points_per_decade);
        if total_points > BODE_MAX_POINTS {
            return Err(LabError::ExcessiveResolution {
                mode: mode.to_string(),
                parameter: "frequency_range.points_per_decade".to_string(),
                requested: total_points,
                limit: BODE_MAX_POINTS,
            });
        }

        Ok(BodeEngine {
            channel: s.channel,
            from: range.from,
            to: range.to,
            amplitude: s.output_voltage,
            total_points,
            current_point: 0,
            gate: Gate::new(config.timing.bode_point_delay()),
            settle: config.timing.bode_settle(),
            rms_samples: config.regulation.rms_samples,
            buffer: SampleRing::new(BODE_BUFFER_CAPACITY),
            flush: FlushState::default(),
        })
    }

    pub fn total_points(&self) -> usize {
        self.total_points
    }

    pub fn frequencies(&self) -> Vec<f64> {
        (0..self.total_points)
            .map(|i| frequency_at(self.from, self.to, i, self.total_points))
            .collect()
    }
}

impl ModeEngine for BodeEngine {
    fn mode(&self) -> MeasurementMode {
        MODE
    }

    fn begin(&mut self, _ctx: &LabContext, _now: Instant) {
        tracing::info!(
            channel = %self.channel,
            from = self.from,
            to = self.to,
            points = self.total_points,
            "Bode sweep started"
        );
    }

    fn tick(&mut self, ctx: &LabContext, now: Instant) {
        if self.flush.is_finished() || !self.gate.ready(now) {
            return;
        }
        let freq = frequency_at(self.from, self.to, self.current_point, self.total_points);
        if !ctx.io.set_output_voltage(self.channel.output(), self.amplitude) {
            tracing::warn!(channel = %self.channel, freq, "Bode output write refused");
        }
        ctx.io.commit_outputs();
        settle(self.settle);

        let measured = rms_read(ctx.io.as_ref(), self.channel.response_node(), self.rms_samples);
        self.buffer.push(BodeSample {
            freq,
            gain_db: gain_db(measured, self.amplitude),
            phase_deg: placeholder_phase_deg(freq),
        });
        self.current_point += 1;

        if self.current_point >= self.total_points {
            self.flush.finish();
        } else if self.buffer.is_full() {
            self.flush.request();
        }
    }

    fn progress(&self) -> Option<f64> {
        Some(percent(self.current_point, self.total_points))
    }

    fn is_finished(&self) -> bool {
        self.flush.is_finished()
    }

    fn take_batch(&mut self, force: bool) -> Option<DataBatch> {
        let completed = self.flush.take(force)?;
        Some(DataBatch {
            data: BatchData::Bode(self.buffer.drain()),
            progress: percent(self.current_point, self.total_points),
            completed,
            sample_count: None,
        })
    }

    fn estimated_duration(&self) -> Option<f64> {
        let per_point = self.gate.period().as_secs_f64() + self.settle.as_secs_f64();
        Some(self.total_points as f64 * per_point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings(from: f64, to: f64, ppd: u32) -> Value {
        json!({
            "channel": "signal_a",
            "frequency_range": {"from": from, "to": to, "points_per_decade": ppd},
            "output_voltage": 1.0
        })
    }

    #[test]
    fn test_two_decades_ten_per_decade() {
        let engine = BodeEngine::from_settings(&settings(10.0, 1000.0, 10), &EngineConfig::default())
            .unwrap();
        assert_eq!(engine.total_points(), 21);
        let f = engine.frequencies();
        assert!((f[0] - 10.0).abs() < 1e-9);
        assert!((f[10] - 100.0).abs() < 1e-6);
        assert!((f[20] - 1000.0).abs() < 1e-6);
        assert!(f.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_single_point_uses_start_frequency() {
        assert_eq!(frequency_at(42.0, 50.0, 0, 1), 42.0);
        assert_eq!(point_count(42.0, 50.0, 1), 1);
    }

    #[test]
    fn test_gain_of_dead_channel_is_finite() {
        assert!(gain_db(0.0, 1.0).is_finite());
        assert!(gain_db(1.0, 1.0).abs() < 1e-6);
        assert!((gain_db(0.5, 1.0) + 6.0206).abs() < 1e-3);
    }

    #[test]
    fn test_placeholder_phase() {
        assert!((placeholder_phase_deg(1_000.0) + 45.0).abs() < 1e-9);
        assert!(placeholder_phase_deg(1.0) > -1.0);
    }

    #[test]
    fn test_validation() {
        let cfg = EngineConfig::default();
        let err = BodeEngine::from_settings(&settings(0.5, 100.0, 10), &cfg).err().unwrap();
        assert_eq!(err.context().parameter, "frequency_range.from");
        let err = BodeEngine::from_settings(&settings(100.0, 100.0, 10), &cfg).err().unwrap();
        assert_eq!(err.context().parameter, "frequency_range.to");
        let err = BodeEngine::from_settings(&settings(10.0, 20_000.0, 10), &cfg).err().unwrap();
        assert_eq!(err.code(), "E001");
        let err = BodeEngine::from_settings(&settings(10.0, 100.0, 0), &cfg).err().unwrap();
        assert_eq!(err.context().parameter, "frequency_range.points_per_decade");
        let mut s = settings(10.0, 100.0, 10);
        s["output_voltage"] = json!(0.0);
        let err = BodeEngine::from_settings(&s, &cfg).err().unwrap();
        assert_eq!(err.context().parameter, "output_voltage");
    }
}
