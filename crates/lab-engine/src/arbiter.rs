// ─────────────────────────────────────────────────────────────────────
// PocKETlab Core — Mode Arbiter
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Routes commands to engines and owns the single active mode.
//!
//! Start: validate (no mutation on failure), stop whatever is active,
//! begin the new engine, acknowledge. Stop: unknown name is `E005`, an
//! inactive mode is a silent no-op, otherwise flush as completed, zero
//! the outputs and acknowledge.

use crate::batcher::TelemetryBatcher;
use crate::command::Request;
use crate::context::LabContext;
use crate::modes::bode::BodeEngine;
use crate::modes::control_system::{ControlPlan, CsMode};
use crate::modes::testbed::TestbedEngine;
use crate::modes::transient::TransientEngine;
use crate::modes::va::VaEngine;
use crate::modes::ModeEngine;
use lab_control::realtime::{ControlLoop, RtcConfig, StatsSnapshot};
use lab_control::ring::SharedRing;
use lab_types::config::EngineConfig;
use lab_types::constants::CONTROL_BUFFER_CAPACITY;
use lab_types::error::{LabError, LabResult};
use lab_types::mode::MeasurementMode;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// Bookkeeping for a running control-system session; the model itself
/// lives in the control loop's slot.
#[derive(Debug, Clone, Copy)]
pub struct ControlSession {
    pub cs_mode: CsMode,
    pub started_at: Instant,
}

/// The one mode allowed to drive the outputs.
pub enum ActiveMode {
    Idle,
    Va(VaEngine),
    Bode(BodeEngine),
    Step(TransientEngine),
    Impulse(TransientEngine),
    Testbed(TestbedEngine),
    ControlSystem(ControlSession),
}

impl ActiveMode {
    pub fn mode(&self) -> MeasurementMode {
        match self {
            ActiveMode::Idle => MeasurementMode::None,
            ActiveMode::Va(_) => MeasurementMode::Va,
            ActiveMode::Bode(_) => MeasurementMode::Bode,
            ActiveMode::Step(_) => MeasurementMode::Step,
            ActiveMode::Impulse(_) => MeasurementMode::Impulse,
            ActiveMode::Testbed(_) => MeasurementMode::Testbed,
            ActiveMode::ControlSystem(_) => MeasurementMode::ControlSystem,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, ActiveMode::Idle)
    }

    /// Cooperative engine, if the active mode has one.
    pub fn engine(&self) -> Option<&dyn ModeEngine> {
        match self {
            ActiveMode::Va(e) => Some(e as &dyn ModeEngine),
            ActiveMode::Bode(e) => Some(e as &dyn ModeEngine),
            ActiveMode::Step(e) | ActiveMode::Impulse(e) => Some(e as &dyn ModeEngine),
            ActiveMode::Testbed(e) => Some(e as &dyn ModeEngine),
            ActiveMode::Idle | ActiveMode::ControlSystem(_) => None,
        }
    }

    fn engine_mut(&mut self) -> Option<&mut dyn ModeEngine> {
        match self {
            ActiveMode::Va(e) => Some(e as &mut dyn ModeEngine),
            ActiveMode::Bode(e) => Some(e as &mut dyn ModeEngine),
            ActiveMode::Step(e) | ActiveMode::Impulse(e) => Some(e as &mut dyn ModeEngine),
            ActiveMode::Testbed(e) => Some(e as &mut dyn ModeEngine),
            ActiveMode::Idle | ActiveMode::ControlSystem(_) => None,
        }
    }
}

/// A validated start request, built before anything is touched.
enum Prepared {
    Engine(ActiveMode),
    Control(ControlPlan),
}

fn prepare(mode: MeasurementMode, settings: &Value, config: &EngineConfig) -> LabResult<Prepared> {
    let prepared = match mode {
        MeasurementMode::Va => Prepared::Engine(ActiveMode::Va(VaEngine::from_settings(settings, config)?)),
        MeasurementMode::Bode => {
            Prepared::Engine(ActiveMode::Bode(BodeEngine::from_settings(settings, config)?))
        }
        MeasurementMode::Step => Prepared::Engine(ActiveMode::Step(
            TransientEngine::step_from_settings(settings, config)?,
        )),
        MeasurementMode::Impulse => Prepared::Engine(ActiveMode::Impulse(
            TransientEngine::impulse_from_settings(settings, config)?,
        )),
        MeasurementMode::Testbed => {
            Prepared::Engine(ActiveMode::Testbed(TestbedEngine::from_settings(settings, config)?))
        }
        MeasurementMode::ControlSystem => {
            Prepared::Control(ControlPlan::from_settings(settings, config)?)
        }
        MeasurementMode::None => {
            return Err(LabError::malformed("none", "mode", "idle is not a startable mode"))
        }
    };
    Ok(prepared)
}

pub struct ModeArbiter {
    active: ActiveMode,
    control: ControlLoop,
    batcher: TelemetryBatcher,
}

impl ModeArbiter {
    pub fn new(ctx: &LabContext) -> Self {
        let ring = Arc::new(SharedRing::new(
            CONTROL_BUFFER_CAPACITY,
            ctx.config.timing.buffer_lock_timeout(),
        ));
        let control = ControlLoop::new(Arc::clone(&ctx.io), ring, RtcConfig::from_engine(&ctx.config));
        ModeArbiter {
            active: ActiveMode::Idle,
            control,
            batcher: TelemetryBatcher::new(),
        }
    }

    pub fn current_mode(&self) -> MeasurementMode {
        self.active.mode()
    }

    pub fn active(&self) -> &ActiveMode {
        &self.active
    }

    pub fn progress(&self) -> Option<f64> {
        self.active.engine().and_then(|e| e.progress())
    }

    pub fn control_loop(&self) -> &ControlLoop {
        &self.control
    }

    pub fn control_stats(&self) -> StatsSnapshot {
        self.control.stats()
    }

    pub fn batcher(&self) -> &TelemetryBatcher {
        &self.batcher
    }

    /// Decode and dispatch one inbound message. Undecodable text is
    /// logged and dropped.
    pub fn handle_message(&mut self, ctx: &LabContext, text: &str) {
        match Request::decode(text) {
            Ok(request) => self.handle(ctx, request),
            Err(e) => tracing::warn!(error = %e, "dropping undecodable command"),
        }
    }

    pub fn handle(&mut self, ctx: &LabContext, request: Request) {
        match request {
            Request::Start { mode, settings } => self.start(ctx, mode, &settings),
            Request::Stop { mode } => self.stop(ctx, &mode),
            Request::Unknown { mode } => {
                tracing::warn!(mode = %mode, "start requested for unknown mode, ignored")
            }
        }
    }

    fn start(&mut self, ctx: &LabContext, mode: MeasurementMode, settings: &Value) {
        let prepared = match prepare(mode, settings, &ctx.config) {
            Ok(p) => p,
            Err(e) => {
                ctx.postman.send_error(&e);
                return;
            }
        };

        let previous = self.stop_active(ctx, Instant::now());
        if previous != MeasurementMode::None {
            tracing::info!(previous = previous.as_str(), next = mode.as_str(), "preempting active mode");
        }

        match prepared {
            Prepared::Engine(mut next) => {
                let now = Instant::now();
                let (message, estimated) = match next.engine_mut() {
                    Some(engine) => {
                        engine.begin(ctx, now);
                        (engine.start_message(), engine.estimated_duration())
                    }
                    None => (format!("{} started", mode.title()), None),
                };
                self.active = next;
                tracing::info!(mode = mode.as_str(), "mode started");
                ctx.postman.send_response(mode, "success", &message, estimated);
            }
            Prepared::Control(plan) => {
                self.control.load_model(plan.model);
                self.batcher.reset_control();
                if let Err(e) = self.control.start() {
                    ctx.postman.send_error(&e);
                    return;
                }
                self.active = ActiveMode::ControlSystem(ControlSession {
                    cs_mode: plan.cs_mode,
                    started_at: Instant::now(),
                });
                tracing::info!(mode = mode.as_str(), cs_mode = ?plan.cs_mode, "mode started");
                ctx.postman.send_response(
                    mode,
                    "success",
                    &format!("{} activated", mode.title()),
                    None,
                );
            }
        }
    }

    fn stop(&mut self, ctx: &LabContext, name: &str) {
        let mode = match name.parse::<MeasurementMode>() {
            Ok(mode) => mode,
            Err(_) => {
                ctx.postman.send_error(&LabError::InvalidStopTarget {
                    mode: name.to_string(),
                });
                return;
            }
        };
        if self.active.mode() != mode {
            tracing::debug!(mode = mode.as_str(), "stop for inactive mode ignored");
            return;
        }
        self.stop_active(ctx, Instant::now());
        ctx.postman
            .send_response(mode, "success", &format!("{} stopped", mode.title()), None);
    }

    /// Stop whatever is active: flush as completed, zero the outputs, go
    /// idle. Returns the mode that was stopped.
    fn stop_active(&mut self, ctx: &LabContext, now: Instant) -> MeasurementMode {
        let mut previous = std::mem::replace(&mut self.active, ActiveMode::Idle);
        let mode = previous.mode();
        match &mut previous {
            ActiveMode::Idle => return mode,
            ActiveMode::ControlSystem(session) => {
                if !self.control.stop() {
                    tracing::error!("control loop detached on stop");
                }
                self.batcher.flush_control(self.control.ring(), ctx, now, true);
                tracing::info!(
                    samples = self.batcher.control_sample_count(),
                    ran_s = now.saturating_duration_since(session.started_at).as_secs_f64(),
                    "control session ended"
                );
            }
            other => {
                if let Some(engine) = other.engine_mut() {
                    self.batcher.flush_engine(engine, ctx, true);
                }
            }
        }
        ctx.io.zero_outputs();
        tracing::info!(mode = mode.as_str(), "mode stopped");
        mode
    }

    /// One cooperative-loop step for the active mode plus its telemetry.
    pub fn tick(&mut self, ctx: &LabContext, now: Instant) {
        if let ActiveMode::ControlSystem(_) = self.active {
            self.batcher.flush_control(self.control.ring(), ctx, now, false);
            return;
        }
        let finished = match self.active.engine_mut() {
            Some(engine) => {
                engine.tick(ctx, now);
                self.batcher.flush_engine(engine, ctx, false);
                engine.is_finished()
            }
            None => false,
        };
        if finished {
            let mode = self.active.mode();
            self.active = ActiveMode::Idle;
            ctx.io.zero_outputs();
            tracing::info!(mode = mode.as_str(), "measurement complete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{zero_delay_config, RecordingMessenger, SimulatedBench};
    use lab_types::io::OutputNode;
    use serde_json::json;

    fn setup() -> (LabContext, Arc<SimulatedBench>, Arc<RecordingMessenger>) {
        let bench = Arc::new(SimulatedBench::new(2.0, 1.0));
        let rec = Arc::new(RecordingMessenger::new());
        let ctx = LabContext::new(bench.clone(), rec.clone(), zero_delay_config());
        (ctx, bench, rec)
    }

    fn testbed_start() -> Request {
        Request::Start {
            mode: MeasurementMode::Testbed,
            settings: json!({
                "target_voltage": 5.0,
                "current_limit": 1.0,
                "continuous_monitoring": true,
                "update_interval_ms": 50
            }),
        }
    }

    #[test]
    fn test_start_sets_label_and_acknowledges() {
        let (ctx, bench, rec) = setup();
        let mut arbiter = ModeArbiter::new(&ctx);
        arbiter.handle(&ctx, testbed_start());
        assert_eq!(arbiter.current_mode(), MeasurementMode::Testbed);
        assert_eq!(bench.output(OutputNode::PowerVoltage), 5.0);
        let responses = rec.on_topic("response");
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["payload"]["message"], "Testbed mode activated");
    }

    #[test]
    fn test_invalid_start_leaves_state() {
        let (ctx, bench, rec) = setup();
        let mut arbiter = ModeArbiter::new(&ctx);
        arbiter.handle(&ctx, testbed_start());
        rec.take();
        arbiter.handle(
            &ctx,
            Request::Start {
                mode: MeasurementMode::Step,
                settings: json!({"channel": "power", "voltage": 50.0, "measurement_time": 1.0}),
            },
        );
        assert_eq!(arbiter.current_mode(), MeasurementMode::Testbed);
        assert_eq!(bench.output(OutputNode::PowerVoltage), 5.0);
        let errors = rec.on_topic("status");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["payload"]["error_code"], "E001");
    }

    #[test]
    fn test_new_mode_preempts_active() {
        let (ctx, bench, _rec) = setup();
        let mut arbiter = ModeArbiter::new(&ctx);
        arbiter.handle(&ctx, testbed_start());
        arbiter.handle(
            &ctx,
            Request::Start {
                mode: MeasurementMode::Step,
                settings: json!({"channel": "signal_b", "voltage": 1.0, "measurement_time": 0.01}),
            },
        );
        assert_eq!(arbiter.current_mode(), MeasurementMode::Step);
        assert_eq!(bench.output(OutputNode::PowerVoltage), 0.0);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (ctx, bench, rec) = setup();
        let mut arbiter = ModeArbiter::new(&ctx);
        arbiter.handle(&ctx, testbed_start());
        rec.take();
        arbiter.handle(&ctx, Request::Stop { mode: "testbed".into() });
        assert!(arbiter.active().is_idle());
        assert_eq!(bench.output(OutputNode::PowerVoltage), 0.0);
        assert_eq!(rec.on_topic("response").len(), 1);
        rec.take();
        arbiter.handle(&ctx, Request::Stop { mode: "testbed".into() });
        arbiter.handle(&ctx, Request::Stop { mode: "va".into() });
        assert!(rec.is_empty());
    }

    #[test]
    fn test_unknown_stop_target() {
        let (ctx, _bench, rec) = setup();
        let mut arbiter = ModeArbiter::new(&ctx);
        arbiter.handle(&ctx, Request::Stop { mode: "scope".into() });
        let errors = rec.on_topic("status");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["payload"]["error_code"], "E005");
    }

    #[test]
    fn test_unknown_start_and_garbage_are_silent() {
        let (ctx, _bench, rec) = setup();
        let mut arbiter = ModeArbiter::new(&ctx);
        arbiter.handle_message(&ctx, r#"{"mode":"scope","settings":{}}"#);
        arbiter.handle_message(&ctx, "not json");
        assert!(rec.is_empty());
        assert_eq!(arbiter.current_mode(), MeasurementMode::None);
    }

    #[test]
    fn test_control_session_starts_and_stops() {
        let (ctx, _bench, rec) = setup();
        let mut arbiter = ModeArbiter::new(&ctx);
        arbiter.handle(
            &ctx,
            Request::Start {
                mode: MeasurementMode::ControlSystem,
                settings: json!({"cs_mode": "controller"}),
            },
        );
        assert_eq!(arbiter.current_mode(), MeasurementMode::ControlSystem);
        assert!(arbiter.control_loop().is_running());
        arbiter.handle(&ctx, Request::Stop { mode: "control_system".into() });
        assert!(!arbiter.control_loop().is_running());
        assert!(arbiter.control_loop().has_model());
        let responses = rec.on_topic("response");
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[1]["payload"]["message"], "Control System mode stopped");
    }
}
