use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabError {
    #[error("Parameter out of range: {parameter}={value} ({hint})")]
    ParameterRange {
        mode: String,
        parameter: String,
        value: String,
        hint: String,
    },

    #[error("Channel {channel} does not support {kind}")]
    ChannelIncompatible {
        mode: String,
        channel: String,
        kind: String,
    },

    #[error("Resolution too high: {parameter} needs {requested} points, limit is {limit}")]
    ExcessiveResolution {
        mode: String,
        parameter: String,
        requested: usize,
        limit: usize,
    },

    #[error("Malformed configuration for {parameter}: {message}")]
    MalformedConfig {
        mode: String,
        parameter: String,
        message: String,
    },

    #[error("Invalid stop target: {mode}")]
    InvalidStopTarget { mode: String },

    #[error("Real-time engine error: {0}")]
    Realtime(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type LabResult<T> = Result<T, LabError>;

/// Where a rejected request went wrong, as reported in `error_context`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorContext {
    pub mode: String,
    pub parameter: String,
    pub value: String,
}

impl LabError {
    pub fn parameter_range(
        mode: &str,
        parameter: &str,
        value: impl ToString,
        hint: impl Into<String>,
    ) -> Self {
        LabError::ParameterRange {
            mode: mode.to_string(),
            parameter: parameter.to_string(),
            value: value.to_string(),
            hint: hint.into(),
        }
    }

    pub fn malformed(mode: &str, parameter: &str, message: impl Into<String>) -> Self {
        LabError::MalformedConfig {
            mode: mode.to_string(),
            parameter: parameter.to_string(),
            message: message.into(),
        }
    }

    /// Wire error code carried in `status/error` messages.
    pub fn code(&self) -> &'static str {
        match self {
            LabError::ParameterRange { .. } => "E001",
            LabError::ChannelIncompatible { .. } => "E002",
            LabError::ExcessiveResolution { .. } => "E003",
            LabError::MalformedConfig { .. } => "E004",
            LabError::InvalidStopTarget { .. } => "E005",
            LabError::Realtime(_) | LabError::Io(_) | LabError::Json(_) => "E100",
        }
    }

    pub fn context(&self) -> ErrorContext {
        let (mode, parameter, value) = match self {
            LabError::ParameterRange {
                mode,
                parameter,
                value,
                ..
            } => (mode.clone(), parameter.clone(), value.clone()),
            LabError::ChannelIncompatible {
                mode,
                channel,
                kind,
            } => (mode.clone(), "channel".to_string(), format!("{channel}/{kind}")),
            LabError::ExcessiveResolution {
                mode,
                parameter,
                requested,
                ..
            } => (mode.clone(), parameter.clone(), requested.to_string()),
            LabError::MalformedConfig {
                mode, parameter, ..
            } => (mode.clone(), parameter.clone(), String::new()),
            LabError::InvalidStopTarget { mode } => {
                (mode.clone(), "mode".to_string(), mode.clone())
            }
            LabError::Realtime(_) | LabError::Io(_) | LabError::Json(_) => {
                (String::new(), String::new(), String::new())
            }
        };
        ErrorContext {
            mode,
            parameter,
            value,
        }
    }

    pub fn suggested_action(&self) -> String {
        match self {
            LabError::ParameterRange { hint, .. } => hint.clone(),
            LabError::ChannelIncompatible { kind, .. } => {
                format!("Select a channel that supports {kind}")
            }
            LabError::ExcessiveResolution { limit, .. } => {
                format!("Reduce the resolution to at most {limit} points")
            }
            LabError::MalformedConfig { parameter, .. } => {
                format!("Provide a complete and well-formed '{parameter}' object")
            }
            LabError::InvalidStopTarget { .. } => {
                "Use one of: va, bode, step, impulse, testbed, control_system".to_string()
            }
            LabError::Realtime(_) | LabError::Io(_) | LabError::Json(_) => {
                "Retry the request; power-cycle the instrument if it persists".to_string()
            }
        }
    }
}
