// ─────────────────────────────────────────────────────────────────────
// PocKETlab Core — Inbound Commands
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Decoding of inbound command messages.
//!
//! Accepts the full envelope (`{timestamp, message_id, type, payload}`)
//! or the bare payload (`{mode, action?, settings?}`). A stop request is
//! `action: "stop"` either beside `mode` or inside `settings`.

use lab_types::error::LabError;
use lab_types::mode::MeasurementMode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
struct RawCommand {
    mode: String,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    settings: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Inbound {
    Envelope { payload: RawCommand },
    Bare(RawCommand),
}

/// What the arbiter is asked to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Start {
        mode: MeasurementMode,
        settings: Value,
    },
    /// `mode` is kept as text so an unknown target can be reported.
    Stop { mode: String },
    /// Start addressed to a mode that does not exist.
    Unknown { mode: String },
}

fn is_stop(action: Option<&str>) -> bool {
    action.is_some_and(|a| a.eq_ignore_ascii_case("stop"))
}

impl Request {
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        let raw = match serde_json::from_str::<Inbound>(text)? {
            Inbound::Envelope { payload } => payload,
            Inbound::Bare(raw) => raw,
        };
        let nested_stop = raw
            .settings
            .as_ref()
            .and_then(|s| s.get("action"))
            .and_then(Value::as_str);
        if is_stop(raw.action.as_deref()) || is_stop(nested_stop) {
            return Ok(Request::Stop { mode: raw.mode });
        }
        Ok(match raw.mode.parse::<MeasurementMode>() {
            Ok(mode) => Request::Start {
                mode,
                settings: raw.settings.unwrap_or(Value::Null),
            },
            Err(_) => Request::Unknown { mode: raw.mode },
        })
    }
}

/// Typed view of a settings object; any serde failure is `E004`.
pub fn parse_settings<T: DeserializeOwned>(
    mode: MeasurementMode,
    settings: &Value,
) -> Result<T, LabError> {
    if settings.is_null() {
        return Err(LabError::malformed(
            mode.as_str(),
            "settings",
            "settings object is required",
        ));
    }
    T::deserialize(settings).map_err(|e| LabError::malformed(mode.as_str(), "settings", e.to_string()))
}
