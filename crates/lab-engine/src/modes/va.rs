// ─────────────────────────────────────────────────────────────────────
// PocKETlab Core — VA Characteristic Engine
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Current-voltage sweeps in constant-voltage or constant-current form.
//!
//! One step per gated tick. CV steps regulate the differential DUT
//! voltage, CC steps regulate the sensed current; both end with an
//! RMS-averaged reading. A CV step that saturates the channel ends the
//! sweep early.

use super::{check_range, percent, FlushState, Gate, ModeEngine};
use crate::command::parse_settings;
use crate::context::LabContext;
use crate::messages::{BatchData, DataBatch};
use lab_control::regulator::{measure_point, regulate_current, search_voltage};
use lab_control::ring::SampleRing;
use lab_types::config::EngineConfig;
use lab_types::constants::{STEP_COUNT_EPSILON, VA_BUFFER_CAPACITY, VA_FLUSH_EVERY, VA_MAX_STEPS};
use lab_types::error::{LabError, LabResult};
use lab_types::io::{Channel, OutputNode};
use lab_types::mode::MeasurementMode;
use lab_types::sample::VaSample;
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};

const MODE: MeasurementMode = MeasurementMode::Va;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum SweepKind {
    #[serde(rename = "CV")]
    ConstantVoltage,
    #[serde(rename = "CC")]
    ConstantCurrent,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CvSettings {
    pub start_voltage: f64,
    pub end_voltage: f64,
    pub step_voltage: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CcSettings {
    pub start_current: f64,
    pub end_current: f64,
    pub step_current: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VaSettings {
    pub channel: Channel,
    pub mode_type: SweepKind,
    pub shunt_resistance: f64,
    #[serde(default)]
    pub cv_settings: Option<CvSettings>,
    #[serde(default)]
    pub cc_settings: Option<CcSettings>,
}

/// Validated sweep geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct VaPlan {
    pub channel: Channel,
    pub kind: SweepKind,
    pub shunt_ohms: f64,
    pub start: f64,
    pub end: f64,
    pub step: f64,
    pub total_steps: usize,
    pub max_output: f64,
}

impl VaPlan {
    pub fn target(&self, index: usize) -> f64 {
        (self.start + index as f64 * self.step).min(self.end)
    }
}

/// `ceil(span/step) + 1`, guarded against float overshoot of the ceiling.
pub fn step_count(start: f64, end: f64, step: f64) -> f64 {
    ((end - start) / step - STEP_COUNT_EPSILON).ceil() + 1.0
}

fn validate(settings: &VaSettings, config: &EngineConfig) -> LabResult<VaPlan> {
    let mode = MODE.as_str();
    if !settings.shunt_resistance.is_finite() || settings.shunt_resistance <= 0.0 {
        return Err(LabError::parameter_range(
            mode,
            "shunt_resistance",
            settings.shunt_resistance,
            "Shunt resistance must be greater than 0 ohm",
        ));
    }

    let channel = settings.channel;
    let max_output = config.limits.max_output(channel);
    let (start, end, step, names, ceiling, unit) = match settings.mode_type {
        SweepKind::ConstantVoltage => {
            let cv = settings.cv_settings.as_ref().ok_or_else(|| {
                LabError::malformed(mode, "cv_settings", "CV sweeps need a cv_settings object")
            })?;
            (
                cv.start_voltage,
                cv.end_voltage,
                cv.step_voltage,
                ["start_voltage", "end_voltage", "step_voltage"],
                max_output,
                "V",
            )
        }
        SweepKind::ConstantCurrent => {
            if channel.current_node().is_none() {
                return Err(LabError::ChannelIncompatible {
                    mode: mode.to_string(),
                    channel: channel.to_string(),
                    kind: "CC".to_string(),
                });
            }
            let cc = settings.cc_settings.as_ref().ok_or_else(|| {
                LabError::malformed(mode, "cc_settings", "CC sweeps need a cc_settings object")
            })?;
            (
                cc.start_current,
                cc.end_current,
                cc.step_current,
                ["start_current", "end_current", "step_current"],
                config.limits.power_current_max,
                "A",
            )
        }
    };

    check_range(MODE, names[0], start, 0.0, ceiling, unit)?;
    check_range(MODE, names[1], end, 0.0, ceiling, unit)?;
    if start >= end {
        return Err(LabError::parameter_range(
            mode,
            names[1],
            end,
            format!("{} must be greater than {}", names[1], names[0]),
        ));
    }
    if !step.is_finite() || step <= 0.0 {
        return Err(LabError::parameter_range(
            mode,
            names[2],
            step,
            format!("{} must be greater than 0", names[2]),
        ));
    }
    let steps = step_count(start, end, step);
    if steps > VA_MAX_STEPS as f64 {
        return Err(LabError::ExcessiveResolution {
            mode: mode.to_string(),
            parameter: names[2].to_string(),
            requested: steps.min(usize::MAX as f64) as usize,
            limit: VA_MAX_STEPS,
        });
    }

    Ok(VaPlan {
        channel,
        kind: settings.mode_type,
        shunt_ohms: settings.shunt_resistance,
        start,
        end,
        step,
        total_steps: steps as usize,
        max_output,
    })
}

pub struct VaEngine {
    plan: VaPlan,
    current_step: usize,
    commanded: f64,
    capped: bool,
    achieved: f64,
    started_at: Instant,
    gate: Gate,
    settle: Duration,
    buffer: SampleRing<VaSample>,
    flush: FlushState,
}

impl VaEngine {
    pub fn from_settings(settings: &Value, config: &EngineConfig) -> LabResult<Self> {
        let parsed: VaSettings = parse_settings(MODE, settings)?;
        let plan = validate(&parsed, config)?;
        Ok(VaEngine {
            achieved: plan.start,
            plan,
            current_step: 0,
            commanded: 0.0,
            capped: false,
            started_at: Instant::now(),
            gate: Gate::new(config.timing.va_step_delay()),
            settle: config.timing.va_settle(),
            buffer: SampleRing::new(VA_BUFFER_CAPACITY),
            flush: FlushState::default(),
        })
    }

    pub fn plan(&self) -> &VaPlan {
        &self.plan
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn is_capped(&self) -> bool {
        self.capped
    }

    pub fn commanded(&self) -> f64 {
        self.commanded
    }
}

impl ModeEngine for VaEngine {
    fn mode(&self) -> MeasurementMode {
        MODE
    }

    fn begin(&mut self, ctx: &LabContext, now: Instant) {
        self.started_at = now;
        if self.plan.channel == Channel::Power {
            ctx.io.set_output_voltage(
                OutputNode::PowerCurrentLimit,
                ctx.config.limits.power_current_max,
            );
        }
        ctx.io.set_output_voltage(self.plan.channel.output(), 0.0);
        ctx.io.commit_outputs();
        tracing::info!(
            channel = %self.plan.channel,
            kind = ?self.plan.kind,
            steps = self.plan.total_steps,
            "VA sweep started"
        );
    }

    fn tick(&mut self, ctx: &LabContext, now: Instant) {
        if self.flush.is_finished() || !self.gate.ready(now) {
            return;
        }
        let plan = &self.plan;
        let target = plan.target(self.current_step);
        let reg = &ctx.config.regulation;
        let io = ctx.io.as_ref();

        let outcome = match plan.kind {
            SweepKind::ConstantVoltage => search_voltage(
                io,
                plan.channel,
                target,
                self.commanded,
                plan.max_output,
                reg,
                self.settle,
            ),
            SweepKind::ConstantCurrent => regulate_current(
                io,
                plan.channel,
                target,
                self.commanded,
                plan.shunt_ohms,
                plan.max_output,
                reg,
                self.settle,
            ),
        };
        self.commanded = outcome.commanded;

        let reading = measure_point(io, plan.channel, plan.shunt_ohms, reg.rms_samples);
        self.buffer.push(VaSample {
            voltage: reading.voltage,
            current: reading.current,
            t: now.saturating_duration_since(self.started_at).as_secs_f64(),
        });
        self.achieved = reading.voltage;
        self.current_step += 1;

        if outcome.capped {
            self.capped = true;
            tracing::warn!(
                step = self.current_step,
                target,
                commanded = self.commanded,
                "VA output saturated, sweep ends early"
            );
        }
        if self.capped || self.current_step >= self.plan.total_steps {
            self.flush.finish();
        } else if self.buffer.is_full() || self.current_step % VA_FLUSH_EVERY == 0 {
            self.flush.request();
        }
    }

    fn progress(&self) -> Option<f64> {
        if self.flush.is_finished() {
            return Some(100.0);
        }
        Some(match self.plan.kind {
            SweepKind::ConstantVoltage => {
                let span = self.plan.end - self.plan.start;
                ((self.achieved - self.plan.start) / span * 100.0).clamp(0.0, 100.0)
            }
            SweepKind::ConstantCurrent => percent(self.current_step, self.plan.total_steps),
        })
    }

    fn is_finished(&self) -> bool {
        self.flush.is_finished()
    }

    fn take_batch(&mut self, force: bool) -> Option<DataBatch> {
        let completed = self.flush.take(force)?;
        Some(DataBatch {
            data: BatchData::Va(self.buffer.drain()),
            progress: self.progress().unwrap_or(0.0),
            completed,
            sample_count: None,
        })
    }

    fn estimated_duration(&self) -> Option<f64> {
        let per_step = self.gate.period().as_secs_f64() + self.settle.as_secs_f64();
        Some(self.plan.total_steps as f64 * per_step)
    }
}
