// ─────────────────────────────────────────────────────────────────────
// PocKETlab Core — Cooperative Runtime
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Single-threaded main loop: inbound commands, one arbiter step per
//! iteration, and the `ready` heartbeat.

use crate::arbiter::ModeArbiter;
use crate::context::LabContext;
use crate::postman::Messenger;
use lab_types::config::EngineConfig;
use lab_types::io::AnalogIo;
use lab_types::mode::MeasurementMode;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub struct LabRuntime {
    ctx: LabContext,
    arbiter: ModeArbiter,
    last_status: Instant,
    iterations: u64,
}

impl LabRuntime {
    pub fn new(io: Arc<dyn AnalogIo>, messenger: Arc<dyn Messenger>, config: EngineConfig) -> Self {
        let ctx = LabContext::new(io, messenger, config);
        let arbiter = ModeArbiter::new(&ctx);
        tracing::info!(board = %ctx.config.board_id, "runtime ready");
        LabRuntime {
            ctx,
            arbiter,
            last_status: Instant::now(),
            iterations: 0,
        }
    }

    pub fn context(&self) -> &LabContext {
        &self.ctx
    }

    pub fn arbiter(&self) -> &ModeArbiter {
        &self.arbiter
    }

    pub fn current_mode(&self) -> MeasurementMode {
        self.arbiter.current_mode()
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Hand one inbound message to the arbiter.
    pub fn submit(&mut self, text: &str) {
        self.arbiter.handle_message(&self.ctx, text);
    }

    /// One cooperative iteration.
    pub fn poll(&mut self) {
        let now = Instant::now();
        self.arbiter.tick(&self.ctx, now);
        self.iterations += 1;

        let interval = Duration::from_millis(self.ctx.config.status_interval_ms);
        if now.saturating_duration_since(self.last_status) >= interval {
            self.ctx
                .postman
                .send_status(self.arbiter.current_mode(), self.arbiter.progress());
            self.last_status = now;
        }
    }

    /// Poll until `duration` has passed, sleeping `idle` between
    /// iterations.
    pub fn run_for(&mut self, duration: Duration, idle: Duration) {
        let deadline = Instant::now() + duration;
        while Instant::now() < deadline {
            self.poll();
            if !idle.is_zero() {
                thread::sleep(idle);
            }
        }
    }

    /// Poll until the arbiter goes idle or `limit` iterations pass.
    /// Returns `true` when idle was reached.
    pub fn run_until_idle(&mut self, limit: u64) -> bool {
        for _ in 0..limit {
            if self.arbiter.current_mode() == MeasurementMode::None {
                return true;
            }
            self.poll();
        }
        self.arbiter.current_mode() == MeasurementMode::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{zero_delay_config, RecordingMessenger, SimulatedBench};

    #[test]
    fn test_heartbeat_reports_mode() {
        let rec = Arc::new(RecordingMessenger::new());
        let mut config = zero_delay_config();
        config.status_interval_ms = 0;
        let mut rt = LabRuntime::new(Arc::new(SimulatedBench::new(2.0, 1.0)), rec.clone(), config);
        rt.poll();
        let status = rec.on_topic("status");
        assert_eq!(status.len(), 1);
        assert_eq!(status[0]["payload"]["device_status"], "ready");
        assert_eq!(status[0]["payload"]["current_mode"], "none");
    }

    #[test]
    fn test_heartbeat_respects_interval() {
        let rec = Arc::new(RecordingMessenger::new());
        let mut rt = LabRuntime::new(
            Arc::new(SimulatedBench::new(2.0, 1.0)),
            rec.clone(),
            zero_delay_config(),
        );
        for _ in 0..10 {
            rt.poll();
        }
        assert!(rec.on_topic("status").is_empty());
        assert_eq!(rt.iterations(), 10);
    }

    #[test]
    fn test_run_until_idle_finishes_step() {
        let rec = Arc::new(RecordingMessenger::new());
        let mut rt = LabRuntime::new(
            Arc::new(SimulatedBench::new(2.0, 1.0)),
            rec.clone(),
            zero_delay_config(),
        );
        rt.submit(r#"{"mode":"step","settings":{"channel":"power","voltage":2.0,"measurement_time":0.002}}"#);
        assert_eq!(rt.current_mode(), MeasurementMode::Step);
        assert!(rt.run_until_idle(10_000_000));
        let data = rec.on_topic("data/step");
        assert!(data.last().is_some_and(|m| m["payload"]["payload"]["completed"] == true));
    }
}
