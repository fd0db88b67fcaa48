// ─────────────────────────────────────────────────────────────────────
// PocKETlab Core — Outbound Messages
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Wire shapes of everything the engine publishes.

use lab_types::error::{ErrorContext, LabError};
use lab_types::mode::MeasurementMode;
use lab_types::sample::{BodeSample, ControlSample, TestbedSample, TransientSample, VaSample};
use serde::Serialize;

/// Common envelope around every outbound payload.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<P> {
    /// Milliseconds since engine boot.
    pub timestamp: u64,
    pub message_id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub payload: P,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponsePayload {
    pub mode: String,
    pub status: String,
    pub message: String,
    /// Seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_duration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorPayload {
    pub error: bool,
    pub error_code: &'static str,
    pub error_message: String,
    pub error_context: ErrorContext,
    pub suggested_action: String,
}

impl From<&LabError> for ErrorPayload {
    fn from(err: &LabError) -> Self {
        ErrorPayload {
            error: true,
            error_code: err.code(),
            error_message: err.to_string(),
            error_context: err.context(),
            suggested_action: err.suggested_action(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusPayload {
    pub device_status: &'static str,
    pub current_mode: MeasurementMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
}

/// Control-loop batch, one column per channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ControlColumns {
    pub timestamps: Vec<f64>,
    pub input: Vec<f64>,
    pub x1: Vec<f64>,
    pub x2: Vec<f64>,
    pub y1: Vec<f64>,
    pub y2: Vec<f64>,
}

impl From<&[ControlSample]> for ControlColumns {
    fn from(samples: &[ControlSample]) -> Self {
        let mut cols = ControlColumns::default();
        for s in samples {
            cols.timestamps.push(s.t);
            cols.input.push(s.input);
            cols.x1.push(s.x1);
            cols.x2.push(s.x2);
            cols.y1.push(s.y1);
            cols.y2.push(s.y2);
        }
        cols
    }
}

/// Samples of one batch; serializes as the bare `data` array.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BatchData {
    Va(Vec<VaSample>),
    Bode(Vec<BodeSample>),
    Transient(Vec<TransientSample>),
    Testbed(Vec<TestbedSample>),
    Control([ControlColumns; 1]),
}

impl BatchData {
    pub fn len(&self) -> usize {
        match self {
            BatchData::Va(v) => v.len(),
            BatchData::Bode(v) => v.len(),
            BatchData::Transient(v) => v.len(),
            BatchData::Testbed(v) => v.len(),
            BatchData::Control([cols]) => cols.timestamps.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One drained buffer ready for publishing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataBatch {
    pub data: BatchData,
    pub progress: f64,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataPayload<'a> {
    pub mode: MeasurementMode,
    pub payload: &'a DataBatch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_payload_shape() {
        let err = LabError::parameter_range("va", "step_voltage", -1.0, "Use a positive step");
        let json = serde_json::to_value(ErrorPayload::from(&err)).unwrap();
        assert_eq!(json["error"], true);
        assert_eq!(json["error_code"], "E001");
        assert_eq!(json["error_context"]["parameter"], "step_voltage");
        assert_eq!(json["error_context"]["value"], "-1");
        assert_eq!(json["suggested_action"], "Use a positive step");
    }

    #[test]
    fn test_control_batch_is_single_columnar_element() {
        let samples = [
            ControlSample {
                t: 0.0,
                input: 1.0,
                ..ControlSample::default()
            },
            ControlSample {
                t: 0.01,
                input: 2.0,
                ..ControlSample::default()
            },
        ];
        let batch = DataBatch {
            data: BatchData::Control([ControlColumns::from(&samples[..])]),
            progress: 0.0,
            completed: false,
            sample_count: Some(2),
        };
        let json = serde_json::to_value(&batch).unwrap();
        assert_eq!(json["data"].as_array().unwrap().len(), 1);
        assert_eq!(json["data"][0]["input"][1], 2.0);
        assert_eq!(json["sample_count"], 2);
        assert_eq!(batch.data.len(), 2);
    }

    #[test]
    fn test_response_omits_missing_duration() {
        let payload = ResponsePayload {
            mode: "testbed".into(),
            status: "success".into(),
            message: "Testbed mode activated".into(),
            estimated_duration: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("estimated_duration").is_none());
    }
}
