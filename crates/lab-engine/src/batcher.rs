// ─────────────────────────────────────────────────────────────────────
// PocKETlab Core — Telemetry Batcher
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Drains engine buffers into `data/<mode>` messages.
//!
//! Cooperative engines decide when a flush is due; the control loop
//! buffer is drained here once it holds `min_batch` samples and the send
//! interval has elapsed.

use crate::context::LabContext;
use crate::messages::{BatchData, ControlColumns, DataBatch};
use crate::modes::ModeEngine;
use lab_control::ring::SharedRing;
use lab_types::mode::MeasurementMode;
use lab_types::sample::ControlSample;
use std::time::Instant;

#[derive(Debug, Default)]
pub struct TelemetryBatcher {
    control_sent: u64,
    last_control_send: Option<Instant>,
}

impl TelemetryBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Samples published since the control loop last started.
    pub fn control_sample_count(&self) -> u64 {
        self.control_sent
    }

    pub fn reset_control(&mut self) {
        self.control_sent = 0;
        self.last_control_send = None;
    }

    /// Publish the engine's pending batch. Returns `true` when a message
    /// went out.
    pub fn flush_engine(&mut self, engine: &mut dyn ModeEngine, ctx: &LabContext, force: bool) -> bool {
        match engine.take_batch(force) {
            Some(batch) => {
                ctx.postman.send_data(engine.mode(), &batch);
                true
            }
            None => false,
        }
    }

    /// Drain the control buffer when enough samples are waiting. `force`
    /// ignores the interval and the minimum batch size, and always emits
    /// the closing `completed` batch, even an empty one.
    pub fn flush_control(
        &mut self,
        ring: &SharedRing<ControlSample>,
        ctx: &LabContext,
        now: Instant,
        force: bool,
    ) -> bool {
        if !force {
            if let Some(last) = self.last_control_send {
                if now.saturating_duration_since(last) < ctx.config.timing.control_send_interval() {
                    return false;
                }
            }
        }
        let min = if force { 1 } else { ctx.config.control.min_batch };
        let samples = match ring.try_drain_at_least(min) {
            Some(samples) => samples,
            None => {
                tracing::debug!("control buffer busy, drain skipped");
                return false;
            }
        };
        if samples.is_empty() && !force {
            return false;
        }

        self.control_sent += samples.len() as u64;
        self.last_control_send = Some(now);
        let batch = DataBatch {
            data: BatchData::Control([ControlColumns::from(samples.as_slice())]),
            progress: 0.0,
            completed: force,
            sample_count: Some(self.control_sent),
        };
        ctx.postman.send_data(MeasurementMode::ControlSystem, &batch);
        true
    }
}
