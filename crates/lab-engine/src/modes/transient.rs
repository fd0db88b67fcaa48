// ─────────────────────────────────────────────────────────────────────
// PocKETlab Core — Transient Response Engines
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Step and impulse responses.
//!
//! The first tick applies the excitation and starts the clock. Every
//! later tick takes at most one sample, once wall-clock time has passed
//! the next of `TRANSIENT_POINTS` evenly spaced offsets.

use super::{check_range, percent, FlushState, ModeEngine};
use crate::command::parse_settings;
use crate::context::LabContext;
use crate::messages::{BatchData, DataBatch};
use lab_control::ring::SampleRing;
use lab_types::config::EngineConfig;
use lab_types::constants::{
    IMPULSE_DURATION_MAX_US, IMPULSE_DURATION_MIN_US, IMPULSE_TIME_MAX_S, IMPULSE_TIME_MIN_S,
    POWER_VOLTAGE_MAX, STEP_TIME_MAX_S, STEP_TIME_MIN_S, TRANSIENT_BUFFER_CAPACITY,
    TRANSIENT_FLUSH_EVERY, TRANSIENT_POINTS,
};
use lab_types::error::{LabError, LabResult};
use lab_types::io::{Channel, OutputNode};
use lab_types::mode::MeasurementMode;
use lab_types::sample::TransientSample;
use serde::Deserialize;
use serde_json::Value;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Deserialize)]
pub struct StepSettings {
    pub channel: Channel,
    pub voltage: f64,
    pub measurement_time: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImpulseSettings {
    pub voltage: f64,
    pub duration_us: u32,
    pub measurement_time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Excitation {
    Step { voltage: f64 },
    /// Always on the power channel.
    Impulse { voltage: f64, duration_us: u32 },
}

pub struct TransientEngine {
    excitation: Excitation,
    channel: Channel,
    measurement_time: f64,
    dt: f64,
    started_at: Option<Instant>,
    index: usize,
    buffer: SampleRing<TransientSample>,
    flush: FlushState,
}

impl TransientEngine {
    fn new(excitation: Excitation, channel: Channel, measurement_time: f64) -> Self {
        TransientEngine {
            excitation,
            channel,
            measurement_time,
            dt: measurement_time / (TRANSIENT_POINTS - 1) as f64,
            started_at: None,
            index: 0,
            buffer: SampleRing::new(TRANSIENT_BUFFER_CAPACITY),
            flush: FlushState::default(),
        }
    }

    pub fn step_from_settings(settings: &Value, config: &EngineConfig) -> LabResult<Self> {
        let mode = MeasurementMode::Step;
        let s: StepSettings = parse_settings(mode, settings)?;
        let ceiling = config.limits.max_output(s.channel).min(POWER_VOLTAGE_MAX);
        check_range(mode, "voltage", s.voltage, 0.0, ceiling, "V")?;
        check_range(
            mode,
            "measurement_time",
            s.measurement_time,
            STEP_TIME_MIN_S,
            STEP_TIME_MAX_S,
            "s",
        )?;
        Ok(Self::new(
            Excitation::Step { voltage: s.voltage },
            s.channel,
            s.measurement_time,
        ))
    }

    pub fn impulse_from_settings(settings: &Value, config: &EngineConfig) -> LabResult<Self> {
        let mode = MeasurementMode::Impulse;
        let s: ImpulseSettings = parse_settings(mode, settings)?;
        let ceiling = config.limits.power_voltage_max.min(POWER_VOLTAGE_MAX);
        check_range(mode, "voltage", s.voltage, 0.0, ceiling, "V")?;
        if !(IMPULSE_DURATION_MIN_US..=IMPULSE_DURATION_MAX_US).contains(&s.duration_us) {
            return Err(LabError::parameter_range(
                mode.as_str(),
                "duration_us",
                s.duration_us,
                format!(
                    "Use a pulse between {IMPULSE_DURATION_MIN_US} and {IMPULSE_DURATION_MAX_US} us"
                ),
            ));
        }
        check_range(
            mode,
            "measurement_time",
            s.measurement_time,
            IMPULSE_TIME_MIN_S,
            IMPULSE_TIME_MAX_S,
            "s",
        )?;
        Ok(Self::new(
            Excitation::Impulse {
                voltage: s.voltage,
                duration_us: s.duration_us,
            },
            Channel::Power,
            s.measurement_time,
        ))
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn samples_taken(&self) -> usize {
        self.index
    }

    fn excite(&self, ctx: &LabContext) {
        let io = ctx.io.as_ref();
        match self.excitation {
            Excitation::Step { voltage } => {
                if self.channel == Channel::Power {
                    io.set_output_voltage(
                        OutputNode::PowerCurrentLimit,
                        ctx.config.limits.power_current_max,
                    );
                }
                if !io.set_output_voltage(self.channel.output(), voltage) {
                    tracing::warn!(channel = %self.channel, voltage, "step output write refused");
                }
                io.commit_outputs();
            }
            Excitation::Impulse {
                voltage,
                duration_us,
            } => {
                io.set_output_voltage(
                    OutputNode::PowerCurrentLimit,
                    ctx.config.limits.power_current_max,
                );
                io.set_output_voltage(OutputNode::PowerVoltage, voltage);
                io.commit_outputs();
                thread::sleep(Duration::from_micros(u64::from(duration_us)));
                io.set_output_voltage(OutputNode::PowerVoltage, 0.0);
                io.commit_outputs();
            }
        }
    }
}

impl ModeEngine for TransientEngine {
    fn mode(&self) -> MeasurementMode {
        match self.excitation {
            Excitation::Step { .. } => MeasurementMode::Step,
            Excitation::Impulse { .. } => MeasurementMode::Impulse,
        }
    }

    fn tick(&mut self, ctx: &LabContext, _now: Instant) {
        if self.flush.is_finished() {
            return;
        }
        let Some(started_at) = self.started_at else {
            self.excite(ctx);
            self.started_at = Some(Instant::now());
            tracing::debug!(mode = self.mode().as_str(), dt = self.dt, "transient capture armed");
            return;
        };

        let elapsed = started_at.elapsed().as_secs_f64();
        if elapsed < self.index as f64 * self.dt {
            return;
        }
        let response = ctx.io.read_voltage(self.channel.response_node());
        self.buffer.push(TransientSample {
            t: elapsed,
            response,
        });
        self.index += 1;

        if self.index >= TRANSIENT_POINTS {
            self.flush.finish();
        } else if self.index % TRANSIENT_FLUSH_EVERY == 0 || self.buffer.is_full() {
            self.flush.request();
        }
    }

    fn progress(&self) -> Option<f64> {
        Some(percent(self.index, TRANSIENT_POINTS))
    }

    fn is_finished(&self) -> bool {
        self.flush.is_finished()
    }

    fn take_batch(&mut self, force: bool) -> Option<DataBatch> {
        let completed = self.flush.take(force)?;
        Some(DataBatch {
            data: BatchData::Transient(self.buffer.drain()),
            progress: percent(self.index, TRANSIENT_POINTS),
            completed,
            sample_count: None,
        })
    }

    fn estimated_duration(&self) -> Option<f64> {
        Some(self.measurement_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_time_step_spans_window() {
        let engine = TransientEngine::step_from_settings(
            &json!({"channel": "signal_b", "voltage": 2.0, "measurement_time": 1.99}),
            &EngineConfig::default(),
        )
        .unwrap();
        assert!((engine.dt() - 0.01).abs() < 1e-12);
        assert_eq!(engine.mode(), MeasurementMode::Step);
    }

    #[test]
    fn test_step_bounds() {
        let cfg = EngineConfig::default();
        let err = TransientEngine::step_from_settings(
            &json!({"channel": "signal_a", "voltage": 15.0, "measurement_time": 1.0}),
            &cfg,
        )
        .err()
        .unwrap();
        assert_eq!(err.context().parameter, "voltage");
        let err = TransientEngine::step_from_settings(
            &json!({"channel": "power", "voltage": 5.0, "measurement_time": 11.0}),
            &cfg,
        )
        .err()
        .unwrap();
        assert_eq!(err.context().parameter, "measurement_time");
    }

    #[test]
    fn test_impulse_bounds() {
        let cfg = EngineConfig::default();
        let ok = TransientEngine::impulse_from_settings(
            &json!({"voltage": 5.0, "duration_us": 100, "measurement_time": 0.5}),
            &cfg,
        )
        .unwrap();
        assert_eq!(ok.mode(), MeasurementMode::Impulse);
        let err = TransientEngine::impulse_from_settings(
            &json!({"voltage": 5.0, "duration_us": 5000, "measurement_time": 0.5}),
            &cfg,
        )
        .err()
        .unwrap();
        assert_eq!(err.context().parameter, "duration_us");
        let err = TransientEngine::impulse_from_settings(
            &json!({"voltage": 5.0, "duration_us": 10, "measurement_time": 3.0}),
            &cfg,
        )
        .err()
        .unwrap();
        assert_eq!(err.context().parameter, "measurement_time");
    }
}
