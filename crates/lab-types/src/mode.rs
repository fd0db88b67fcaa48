// ─────────────────────────────────────────────────────────────────────
// PocKETlab Core — Measurement Mode
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Mode label reported in status messages and used to address engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementMode {
    None,
    Va,
    Bode,
    Step,
    Impulse,
    Testbed,
    ControlSystem,
}

impl MeasurementMode {
    pub const ADDRESSABLE: [MeasurementMode; 6] = [
        MeasurementMode::Va,
        MeasurementMode::Bode,
        MeasurementMode::Step,
        MeasurementMode::Impulse,
        MeasurementMode::Testbed,
        MeasurementMode::ControlSystem,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementMode::None => "none",
            MeasurementMode::Va => "va",
            MeasurementMode::Bode => "bode",
            MeasurementMode::Step => "step",
            MeasurementMode::Impulse => "impulse",
            MeasurementMode::Testbed => "testbed",
            MeasurementMode::ControlSystem => "control_system",
        }
    }

    /// Human-readable name used in acknowledgment texts.
    pub fn title(&self) -> &'static str {
        match self {
            MeasurementMode::None => "Idle",
            MeasurementMode::Va => "VA measurement",
            MeasurementMode::Bode => "Bode measurement",
            MeasurementMode::Step => "Step measurement",
            MeasurementMode::Impulse => "Impulse measurement",
            MeasurementMode::Testbed => "Testbed mode",
            MeasurementMode::ControlSystem => "Control System mode",
        }
    }
}

impl fmt::Display for MeasurementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse error for mode names; carries the rejected text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMode(pub String);

impl FromStr for MeasurementMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "va" => Ok(MeasurementMode::Va),
            "bode" => Ok(MeasurementMode::Bode),
            "step" => Ok(MeasurementMode::Step),
            "impulse" => Ok(MeasurementMode::Impulse),
            "testbed" => Ok(MeasurementMode::Testbed),
            "control_system" => Ok(MeasurementMode::ControlSystem),
            other => Err(UnknownMode(other.to_string())),
        }
    }
}
