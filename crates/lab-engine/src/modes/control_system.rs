// ─────────────────────────────────────────────────────────────────────
// PocKETlab Core — Control System Mode
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Settings for the real-time state-space loop.
//!
//! The loop itself runs on its own thread (`lab_control::realtime`);
//! this module only turns a request into a validated model.

use crate::command::parse_settings;
use lab_control::state_space::{StateSpaceModel, SystemModelSpec, VoltageRange};
use lab_types::config::EngineConfig;
use lab_types::error::{LabError, LabResult};
use lab_types::mode::MeasurementMode;
use serde::Deserialize;
use serde_json::Value;

const MODE: MeasurementMode = MeasurementMode::ControlSystem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CsMode {
    /// Unity follower across the full signal range.
    Controller,
    /// User-supplied plant model.
    System,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControlSystemSettings {
    pub cs_mode: CsMode,
    #[serde(default)]
    pub system_model: Option<SystemModelSpec>,
}

/// Validated request, ready to be loaded into the control loop.
#[derive(Debug, Clone)]
pub struct ControlPlan {
    pub cs_mode: CsMode,
    pub model: StateSpaceModel,
}

impl ControlPlan {
    pub fn from_settings(settings: &Value, config: &EngineConfig) -> LabResult<Self> {
        let s: ControlSystemSettings = parse_settings(MODE, settings)?;
        let ceiling = config.limits.signal_voltage_max;
        let model = match s.cs_mode {
            CsMode::Controller => StateSpaceModel::feedthrough(VoltageRange {
                min_volts: 0.0,
                max_volts: ceiling,
                zero_offset: 0.0,
            }),
            CsMode::System => {
                let spec = s.system_model.as_ref().ok_or_else(|| {
                    LabError::malformed(
                        MODE.as_str(),
                        "system_model",
                        "system mode needs a system_model with A, B, C, D and voltage ranges",
                    )
                })?;
                StateSpaceModel::from_spec(spec, ceiling)?
            }
        };
        Ok(ControlPlan {
            cs_mode: s.cs_mode,
            model,
        })
    }
}
