// ─────────────────────────────────────────────────────────────────────
// PocKETlab Core — Testbed Engine
// © 1998–2026 Miroslav Šotek. All rights reserved.
// ─────────────────────────────────────────────────────────────────────
//! Bench supply with optional monitoring.
//!
//! Holds the power stage at a target voltage and current limit until
//! stopped, publishing readings every `update_interval_ms` (continuous)
//! or once after the first interval.

use super::{check_range, FlushState, Gate, ModeEngine};
use crate::command::parse_settings;
use crate::context::LabContext;
use crate::messages::{BatchData, DataBatch};
use lab_types::config::EngineConfig;
use lab_types::constants::{
    AUX_CHANNEL_COUNT, POWER_VOLTAGE_MAX, TESTBED_INTERVAL_MAX_MS, TESTBED_INTERVAL_MIN_MS,
};
use lab_types::error::{LabError, LabResult};
use lab_types::io::{InputNode, OutputNode};
use lab_types::mode::MeasurementMode;
use lab_types::sample::{AuxReading, TestbedSample};
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};

const MODE: MeasurementMode = MeasurementMode::Testbed;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuxMode {
    Digital,
    Analog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct AuxChannelConfig {
    pub channel: u8,
    pub mode: AuxMode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TestbedSettings {
    pub target_voltage: f64,
    pub current_limit: f64,
    #[serde(default)]
    pub continuous_monitoring: bool,
    pub update_interval_ms: u64,
    #[serde(default)]
    pub aux_channels: Vec<AuxChannelConfig>,
}

pub struct TestbedEngine {
    settings: TestbedSettings,
    gate: Gate,
    started_at: Instant,
    readings: Vec<TestbedSample>,
    sent_once: bool,
    flush: FlushState,
}

impl TestbedEngine {
    pub fn from_settings(settings: &Value, config: &EngineConfig) -> LabResult<Self> {
        let s: TestbedSettings = parse_settings(MODE, settings)?;
        let v_max = config.limits.power_voltage_max.min(POWER_VOLTAGE_MAX);
        check_range(MODE, "target_voltage", s.target_voltage, 0.0, v_max, "V")?;
        check_range(
            MODE,
            "current_limit",
            s.current_limit,
            0.0,
            config.limits.power_current_max,
            "A",
        )?;
        if !(TESTBED_INTERVAL_MIN_MS..=TESTBED_INTERVAL_MAX_MS).contains(&s.update_interval_ms) {
            return Err(LabError::parameter_range(
                MODE.as_str(),
                "update_interval_ms",
                s.update_interval_ms,
                format!(
                    "Use an interval between {TESTBED_INTERVAL_MIN_MS} and {TESTBED_INTERVAL_MAX_MS} ms"
                ),
            ));
        }
        if let Some(aux) = s.aux_channels.iter().find(|a| a.channel >= AUX_CHANNEL_COUNT) {
            return Err(LabError::parameter_range(
                MODE.as_str(),
                "aux_channels.channel",
                aux.channel,
                format!("Auxiliary channels are 0 to {}", AUX_CHANNEL_COUNT - 1),
            ));
        }
        Ok(TestbedEngine {
            gate: Gate::new(Duration::from_millis(s.update_interval_ms)),
            settings: s,
            started_at: Instant::now(),
            readings: Vec::new(),
            sent_once: false,
            flush: FlushState::default(),
        })
    }

    pub fn settings(&self) -> &TestbedSettings {
        &self.settings
    }

    fn read(&self, ctx: &LabContext, now: Instant) -> TestbedSample {
        let io = ctx.io.as_ref();
        let aux = self
            .settings
            .aux_channels
            .iter()
            .map(|a| match a.mode {
                AuxMode::Digital => AuxReading::Digital {
                    channel: a.channel,
                    level: io.read_aux_digital(a.channel),
                },
                AuxMode::Analog => AuxReading::Analog {
                    channel: a.channel,
                    volts: io.read_aux_analog(a.channel),
                },
            })
            .collect();
        TestbedSample {
            t: now.saturating_duration_since(self.started_at).as_secs_f64(),
            voltage: io.read_voltage(InputNode::PowerVoltage),
            current: io.read_voltage(InputNode::PowerCurrent),
            aux,
        }
    }
}

impl ModeEngine for TestbedEngine {
    fn mode(&self) -> MeasurementMode {
        MODE
    }

    fn begin(&mut self, ctx: &LabContext, now: Instant) {
        self.started_at = now;
        self.gate.arm(now);
        let io = ctx.io.as_ref();
        io.set_output_voltage(OutputNode::PowerCurrentLimit, self.settings.current_limit);
        if !io.set_output_voltage(OutputNode::PowerVoltage, self.settings.target_voltage) {
            tracing::warn!(volts = self.settings.target_voltage, "testbed output write refused");
        }
        io.commit_outputs();
        tracing::info!(
            volts = self.settings.target_voltage,
            limit = self.settings.current_limit,
            continuous = self.settings.continuous_monitoring,
            "testbed outputs applied"
        );
    }

    fn tick(&mut self, ctx: &LabContext, now: Instant) {
        if self.sent_once && !self.settings.continuous_monitoring {
            return;
        }
        if !self.gate.ready(now) {
            return;
        }
        let sample = self.read(ctx, now);
        self.readings.push(sample);
        self.sent_once = true;
        self.flush.request();
    }

    fn progress(&self) -> Option<f64> {
        None
    }

    /// Outputs are held until an explicit stop.
    fn is_finished(&self) -> bool {
        false
    }

    fn take_batch(&mut self, force: bool) -> Option<DataBatch> {
        if force && self.readings.is_empty() {
            return None;
        }
        let completed = self.flush.take(force)?;
        Some(DataBatch {
            data: BatchData::Testbed(std::mem::take(&mut self.readings)),
            progress: 0.0,
            completed: completed || !self.settings.continuous_monitoring,
            sample_count: None,
        })
    }

    fn estimated_duration(&self) -> Option<f64> {
        None
    }

    fn start_message(&self) -> String {
        format!("{} activated", MODE.title())
    }
}
