// ─────────────────────────────────────────────────────────────────────
// PocKETlab Core — Config
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{POWER_CURRENT_MAX, POWER_VOLTAGE_MAX, SIGNAL_VOLTAGE_MAX};
use crate::error::{LabError, LabResult};
use crate::io::Channel;

/// Top-level engine configuration.
/// Every field has a default so a partial JSON file is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_board_id")]
    pub board_id: String,
    /// Period of the `ready` status heartbeat.
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub regulation: RegulationConfig,
    #[serde(default)]
    pub control: ControlLoopConfig,
    #[serde(default)]
    pub limits: ChannelLimits,
}

/// Delays of the cooperative loop and the shared-buffer handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Gap between VA steps.
    #[serde(default = "default_va_step_delay_ms")]
    pub va_step_delay_ms: u64,
    /// Wait after each VA output change before reading back.
    #[serde(default = "default_settle_ms")]
    pub va_settle_ms: u64,
    #[serde(default = "default_bode_point_delay_ms")]
    pub bode_point_delay_ms: u64,
    #[serde(default = "default_settle_ms")]
    pub bode_settle_ms: u64,
    /// Minimum gap between two control-loop batches.
    #[serde(default = "default_control_send_interval_ms")]
    pub control_send_interval_ms: u64,
    /// Bounded wait on the control-loop buffer mutex.
    #[serde(default = "default_buffer_lock_timeout_us")]
    pub buffer_lock_timeout_us: u64,
    /// Bounded wait for the real-time thread to quiesce.
    #[serde(default = "default_control_join_timeout_ms")]
    pub control_join_timeout_ms: u64,
}

/// Closed-loop regulator tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegulationConfig {
    #[serde(default = "default_cv_increment_v")]
    pub cv_increment_v: f64,
    #[serde(default = "default_cv_tolerance_v")]
    pub cv_tolerance_v: f64,
    #[serde(default = "default_cv_max_iterations")]
    pub cv_max_iterations: usize,
    #[serde(default = "default_cc_gain")]
    pub cc_gain: f64,
    /// Relative band around the CC target counted as converged.
    #[serde(default = "default_cc_tolerance_ratio")]
    pub cc_tolerance_ratio: f64,
    #[serde(default = "default_cc_max_iterations")]
    pub cc_max_iterations: usize,
    /// Repeated reads folded into one RMS value.
    #[serde(default = "default_rms_samples")]
    pub rms_samples: usize,
}

/// Real-time control loop timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlLoopConfig {
    #[serde(default = "default_target_hz")]
    pub target_hz: f64,
    /// Ticks starting later than this are counted as overruns (0 disables).
    #[serde(default = "default_max_jitter_us")]
    pub max_jitter_us: f64,
    #[serde(default)]
    pub use_busy_wait: bool,
    /// Smallest control batch worth publishing.
    #[serde(default = "default_min_batch")]
    pub min_batch: usize,
}

/// Physical ceilings of the front end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelLimits {
    #[serde(default = "default_power_voltage_max")]
    pub power_voltage_max: f64,
    #[serde(default = "default_power_current_max")]
    pub power_current_max: f64,
    #[serde(default = "default_signal_voltage_max")]
    pub signal_voltage_max: f64,
}

fn default_board_id() -> String {
    "pocketlab_01".to_string()
}
fn default_status_interval_ms() -> u64 {
    10_000
}
fn default_va_step_delay_ms() -> u64 {
    100
}
fn default_settle_ms() -> u64 {
    10
}
fn default_bode_point_delay_ms() -> u64 {
    50
}
fn default_control_send_interval_ms() -> u64 {
    100
}
fn default_buffer_lock_timeout_us() -> u64 {
    500
}
fn default_control_join_timeout_ms() -> u64 {
    500
}
fn default_cv_increment_v() -> f64 {
    0.05
}
fn default_cv_tolerance_v() -> f64 {
    0.02
}
fn default_cv_max_iterations() -> usize {
    50
}
fn default_cc_gain() -> f64 {
    1.0
}
fn default_cc_tolerance_ratio() -> f64 {
    0.01
}
fn default_cc_max_iterations() -> usize {
    10
}
fn default_rms_samples() -> usize {
    10
}
fn default_target_hz() -> f64 {
    100.0
}
fn default_max_jitter_us() -> f64 {
    2_000.0
}
fn default_min_batch() -> usize {
    5
}
fn default_power_voltage_max() -> f64 {
    POWER_VOLTAGE_MAX
}
fn default_power_current_max() -> f64 {
    POWER_CURRENT_MAX
}
fn default_signal_voltage_max() -> f64 {
    SIGNAL_VOLTAGE_MAX
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            va_step_delay_ms: default_va_step_delay_ms(),
            va_settle_ms: default_settle_ms(),
            bode_point_delay_ms: default_bode_point_delay_ms(),
            bode_settle_ms: default_settle_ms(),
            control_send_interval_ms: default_control_send_interval_ms(),
            buffer_lock_timeout_us: default_buffer_lock_timeout_us(),
            control_join_timeout_ms: default_control_join_timeout_ms(),
        }
    }
}

impl Default for RegulationConfig {
    fn default() -> Self {
        RegulationConfig {
            cv_increment_v: default_cv_increment_v(),
            cv_tolerance_v: default_cv_tolerance_v(),
            cv_max_iterations: default_cv_max_iterations(),
            cc_gain: default_cc_gain(),
            cc_tolerance_ratio: default_cc_tolerance_ratio(),
            cc_max_iterations: default_cc_max_iterations(),
            rms_samples: default_rms_samples(),
        }
    }
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        ControlLoopConfig {
            target_hz: default_target_hz(),
            max_jitter_us: default_max_jitter_us(),
            use_busy_wait: false,
            min_batch: default_min_batch(),
        }
    }
}

impl Default for ChannelLimits {
    fn default() -> Self {
        ChannelLimits {
            power_voltage_max: default_power_voltage_max(),
            power_current_max: default_power_current_max(),
            signal_voltage_max: default_signal_voltage_max(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            board_id: default_board_id(),
            status_interval_ms: default_status_interval_ms(),
            timing: TimingConfig::default(),
            regulation: RegulationConfig::default(),
            control: ControlLoopConfig::default(),
            limits: ChannelLimits::default(),
        }
    }
}

impl TimingConfig {
    pub fn va_step_delay(&self) -> Duration {
        Duration::from_millis(self.va_step_delay_ms)
    }

    pub fn va_settle(&self) -> Duration {
        Duration::from_millis(self.va_settle_ms)
    }

    pub fn bode_point_delay(&self) -> Duration {
        Duration::from_millis(self.bode_point_delay_ms)
    }

    pub fn bode_settle(&self) -> Duration {
        Duration::from_millis(self.bode_settle_ms)
    }

    pub fn control_send_interval(&self) -> Duration {
        Duration::from_millis(self.control_send_interval_ms)
    }

    pub fn buffer_lock_timeout(&self) -> Duration {
        Duration::from_micros(self.buffer_lock_timeout_us)
    }

    pub fn control_join_timeout(&self) -> Duration {
        Duration::from_millis(self.control_join_timeout_ms)
    }
}

impl ChannelLimits {
    /// Output ceiling of a channel.
    pub fn max_output(&self, channel: Channel) -> f64 {
        match channel {
            Channel::Power => self.power_voltage_max,
            Channel::SignalA | Channel::SignalB => self.signal_voltage_max,
        }
    }
}

impl ControlLoopConfig {
    /// Integration step and tick period (s).
    pub fn dt(&self) -> f64 {
        1.0 / self.target_hz
    }
}

impl EngineConfig {
    /// Load from a JSON file and validate.
    pub fn from_file(path: &str) -> LabResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Timing/regulation sanity checks that the engines rely on.
    pub fn validate(&self) -> LabResult<()> {
        if !self.control.target_hz.is_finite() || self.control.target_hz <= 0.0 {
            return Err(LabError::malformed(
                "config",
                "control.target_hz",
                "target_hz must be finite and > 0",
            ));
        }
        if self.regulation.rms_samples < 8 {
            return Err(LabError::malformed(
                "config",
                "regulation.rms_samples",
                "at least 8 samples are needed for RMS averaging",
            ));
        }
        let reg = &self.regulation;
        if !reg.cv_increment_v.is_finite()
            || reg.cv_increment_v <= 0.0
            || !reg.cv_tolerance_v.is_finite()
            || reg.cv_tolerance_v < 0.0
        {
            return Err(LabError::malformed(
                "config",
                "regulation.cv_increment_v",
                "CV increment must be > 0 and tolerance >= 0",
            ));
        }
        if self.regulation.cv_max_iterations == 0 || self.regulation.cc_max_iterations == 0 {
            return Err(LabError::malformed(
                "config",
                "regulation",
                "iteration caps must be >= 1",
            ));
        }
        if self.control.min_batch == 0 {
            return Err(LabError::malformed(
                "config",
                "control.min_batch",
                "min_batch must be >= 1",
            ));
        }
        Ok(())
    }
}
