// ─────────────────────────────────────────────────────────────────────
// PocKETlab Core — Postman
// © 1998–2026 Miroslav Šotek. All rights reserved.
// ─────────────────────────────────────────────────────────────────────
//! Message shaping on top of the transport collaborator.
//!
//! The transport only sees `publish(topic, json)`. Topic prefixing,
//! broker connection and reconnects belong to it.

use crate::messages::{
    DataBatch, DataPayload, Envelope, ErrorPayload, ResponsePayload, StatusPayload,
};
use lab_types::error::LabError;
use lab_types::mode::MeasurementMode;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

pub const TOPIC_RESPONSE: &str = "response";
pub const TOPIC_STATUS: &str = "status";

/// Outbound transport collaborator.
pub trait Messenger: Send + Sync {
    fn publish(&self, topic: &str, message: &serde_json::Value);
}

pub fn data_topic(mode: MeasurementMode) -> String {
    format!("data/{}", mode.as_str())
}

pub struct Postman {
    messenger: Arc<dyn Messenger>,
    boot: Instant,
    seq: AtomicU64,
}

impl Postman {
    pub fn new(messenger: Arc<dyn Messenger>) -> Self {
        Postman {
            messenger,
            boot: Instant::now(),
            seq: AtomicU64::new(0),
        }
    }

    pub fn uptime_ms(&self) -> u64 {
        self.boot.elapsed().as_millis() as u64
    }

    fn send<P: Serialize>(&self, topic: &str, kind: &'static str, id_prefix: &str, payload: P) {
        let timestamp = self.uptime_ms();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let envelope = Envelope {
            timestamp,
            message_id: format!("{id_prefix}-{timestamp}-{seq}"),
            kind,
            payload,
        };
        match serde_json::to_value(&envelope) {
            Ok(json) => self.messenger.publish(topic, &json),
            Err(e) => tracing::error!(topic, error = %e, "failed to serialize outbound message"),
        }
    }

    pub fn send_response(
        &self,
        mode: MeasurementMode,
        status: &str,
        message: &str,
        estimated_duration: Option<f64>,
    ) {
        let payload = ResponsePayload {
            mode: mode.as_str().to_string(),
            status: status.to_string(),
            message: message.to_string(),
            estimated_duration,
        };
        self.send(TOPIC_RESPONSE, "response", "response", payload);
    }

    pub fn send_error(&self, err: &LabError) {
        tracing::warn!(code = err.code(), error = %err, "request rejected");
        self.send(TOPIC_STATUS, "status", "error", ErrorPayload::from(err));
    }

    pub fn send_status(&self, current_mode: MeasurementMode, progress: Option<f64>) {
        let payload = StatusPayload {
            device_status: "ready",
            current_mode,
            progress,
        };
        self.send(TOPIC_STATUS, "status", "status", payload);
    }

    pub fn send_data(&self, mode: MeasurementMode, batch: &DataBatch) {
        tracing::debug!(
            mode = mode.as_str(),
            samples = batch.data.len(),
            completed = batch.completed,
            "publishing data batch"
        );
        let payload = DataPayload {
            mode,
            payload: batch,
        };
        self.send(&data_topic(mode), "data", "data", payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::BatchData;
    use lab_types::sample::VaSample;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Capture(Mutex<Vec<(String, serde_json::Value)>>);

    impl Messenger for Capture {
        fn publish(&self, topic: &str, message: &serde_json::Value) {
            self.0.lock().push((topic.to_string(), message.clone()));
        }
    }

    #[test]
    fn test_envelope_fields() {
        let capture = Arc::new(Capture::default());
        let postman = Postman::new(capture.clone());
        postman.send_response(MeasurementMode::Va, "success", "VA measurement started", Some(0.6));
        postman.send_status(MeasurementMode::None, None);

        let sent = capture.0.lock();
        assert_eq!(sent[0].0, "response");
        let msg = &sent[0].1;
        assert_eq!(msg["type"], "response");
        assert!(msg["message_id"].as_str().unwrap().starts_with("response-"));
        assert_eq!(msg["payload"]["mode"], "va");
        assert_eq!(msg["payload"]["estimated_duration"], 0.6);
        assert_eq!(sent[1].1["payload"]["device_status"], "ready");
        assert_eq!(sent[1].1["payload"]["current_mode"], "none");
        assert_ne!(msg["message_id"], sent[1].1["message_id"]);
    }

    #[test]
    fn test_error_is_status_message() {
        let capture = Arc::new(Capture::default());
        let postman = Postman::new(capture.clone());
        postman.send_error(&LabError::InvalidStopTarget {
            mode: "scope".into(),
        });
        let sent = capture.0.lock();
        assert_eq!(sent[0].0, "status");
        assert_eq!(sent[0].1["type"], "status");
        assert_eq!(sent[0].1["payload"]["error_code"], "E005");
        assert!(sent[0].1["message_id"].as_str().unwrap().starts_with("error-"));
    }

    #[test]
    fn test_data_topic_and_nesting() {
        let capture = Arc::new(Capture::default());
        let postman = Postman::new(capture.clone());
        let batch = DataBatch {
            data: BatchData::Va(vec![VaSample {
                voltage: 1.0,
                current: 0.5,
                t: 0.1,
            }]),
            progress: 20.0,
            completed: false,
            sample_count: None,
        };
        postman.send_data(MeasurementMode::Va, &batch);
        let sent = capture.0.lock();
        assert_eq!(sent[0].0, "data/va");
        let payload = &sent[0].1["payload"];
        assert_eq!(payload["mode"], "va");
        assert_eq!(payload["payload"]["data"][0]["current"], 0.5);
        assert_eq!(payload["payload"]["completed"], false);
        assert!(payload["payload"].get("sample_count").is_none());
    }
}
