// ─────────────────────────────────────────────────────────────────────
// PocKETlab Core — Real-Time Control Loop
// © 1998–2026 Miroslav Šotek. All rights reserved.
// ─────────────────────────────────────────────────────────────────────
//! Fixed-rate state-space control loop on its own thread.
//!
//! The loop owns its model while running and hands it back over a
//! bounded channel when it exits, so the model is only ever touched by
//! one execution context. The only state shared with the cooperative
//! loop is the [`SharedRing`] of control samples and the [`LoopStats`]
//! counters.

use crate::ring::SharedRing;
use crate::state_space::StateSpaceModel;
use crossbeam_channel::{bounded, Receiver};
use lab_types::config::EngineConfig;
use lab_types::error::{LabError, LabResult};
use lab_types::io::{AnalogIo, InputNode, OutputNode};
use lab_types::sample::ControlSample;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub const THREAD_NAME: &str = "pocketlab-control-loop";

/// Configuration for the real-time driver.
#[derive(Debug, Clone)]
pub struct RtcConfig {
    pub target_hz: f64,
    pub max_jitter_us: f64,
    pub use_busy_wait: bool,
    /// Bounded wait for the thread to quiesce on stop.
    pub join_timeout: Duration,
}

impl RtcConfig {
    pub fn from_engine(cfg: &EngineConfig) -> Self {
        RtcConfig {
            target_hz: cfg.control.target_hz,
            max_jitter_us: cfg.control.max_jitter_us,
            use_busy_wait: cfg.control.use_busy_wait,
            join_timeout: cfg.timing.control_join_timeout(),
        }
    }

    fn validate(&self) -> LabResult<()> {
        if !self.target_hz.is_finite() || self.target_hz <= 0.0 {
            return Err(LabError::Realtime(
                "target_hz must be finite and > 0".to_string(),
            ));
        }
        if !self.max_jitter_us.is_finite() || self.max_jitter_us < 0.0 {
            return Err(LabError::Realtime(
                "max_jitter_us must be finite and >= 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Diagnostic counters updated by the loop thread.
#[derive(Debug, Default)]
pub struct LoopStats {
    ticks: AtomicU64,
    overruns: AtomicU64,
    write_failures: AtomicU64,
    skipped_writes: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub ticks: u64,
    /// Ticks that started later than `max_jitter_us`.
    pub overruns: u64,
    /// Ticks where the analog front end refused an output write.
    pub write_failures: u64,
    /// Ticks whose sample was dropped on buffer contention.
    pub skipped_writes: u64,
}

impl LoopStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            skipped_writes: self.skipped_writes.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.ticks.store(0, Ordering::Relaxed);
        self.overruns.store(0, Ordering::Relaxed);
        self.write_failures.store(0, Ordering::Relaxed);
        self.skipped_writes.store(0, Ordering::Relaxed);
    }
}

/// One loop tick: read, step, write, commit, record.
pub fn control_tick(
    model: &mut StateSpaceModel,
    io: &dyn AnalogIo,
    ring: &SharedRing<ControlSample>,
    stats: &LoopStats,
    t: f64,
    dt: f64,
) -> ControlSample {
    let input = io.read_voltage(InputNode::SignalInA);
    let out = model.step_volts(input, dt);

    let ok_a = io.set_output_voltage(OutputNode::SignalA, out.volts[0]);
    let ok_b = io.set_output_voltage(OutputNode::SignalB, out.volts[1]);
    if !(ok_a && ok_b) {
        stats.write_failures.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(y1 = out.volts[0], y2 = out.volts[1], "control output write failed");
    }
    io.commit_outputs();

    let sample = ControlSample {
        t,
        input,
        x1: out.x[0],
        x2: out.x[1],
        y1: out.volts[0],
        y2: out.volts[1],
    };
    if !ring.try_push(sample) {
        stats.skipped_writes.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(t, "control buffer busy, sample skipped");
    }
    stats.ticks.fetch_add(1, Ordering::Relaxed);
    sample
}

struct RunningLoop {
    stop: Arc<AtomicBool>,
    done: Receiver<StateSpaceModel>,
    handle: JoinHandle<()>,
}

/// Owner of the replaceable model slot and the loop thread.
pub struct ControlLoop {
    io: Arc<dyn AnalogIo>,
    ring: Arc<SharedRing<ControlSample>>,
    stats: Arc<LoopStats>,
    config: RtcConfig,
    model: Option<StateSpaceModel>,
    running: Option<RunningLoop>,
}

impl ControlLoop {
    pub fn new(
        io: Arc<dyn AnalogIo>,
        ring: Arc<SharedRing<ControlSample>>,
        config: RtcConfig,
    ) -> Self {
        ControlLoop {
            io,
            ring,
            stats: Arc::new(LoopStats::default()),
            config,
            model: None,
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn ring(&self) -> &Arc<SharedRing<ControlSample>> {
        &self.ring
    }

    /// Replace the model. A running loop is stopped and quiesced first.
    pub fn load_model(&mut self, mut model: StateSpaceModel) {
        self.stop();
        model.reset();
        self.model = Some(model);
    }

    /// Spawn the loop thread around the loaded model.
    pub fn start(&mut self) -> LabResult<()> {
        if self.running.is_some() {
            return Ok(());
        }
        self.config.validate()?;
        let mut model = self
            .model
            .take()
            .ok_or_else(|| LabError::Realtime("no state-space model loaded".to_string()))?;

        self.stats.reset();
        if !self.ring.try_clear() {
            tracing::warn!("control buffer busy at start, stale samples kept");
        }

        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = bounded(1);
        let io = Arc::clone(&self.io);
        let ring = Arc::clone(&self.ring);
        let stats = Arc::clone(&self.stats);
        let config = self.config.clone();
        let stop_flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                let dt = 1.0 / config.target_hz;
                let step_duration = Duration::from_secs_f64(dt);
                let t_start = Instant::now();
                let mut next_tick = t_start;

                while !stop_flag.load(Ordering::Acquire) {
                    if config.use_busy_wait {
                        while Instant::now() < next_tick {
                            std::hint::spin_loop();
                        }
                    } else if let Some(wait) = next_tick.checked_duration_since(Instant::now()) {
                        thread::sleep(wait);
                    }
                    if stop_flag.load(Ordering::Acquire) {
                        break;
                    }

                    let tick_started_at = Instant::now();
                    let late_us = tick_started_at
                        .saturating_duration_since(next_tick)
                        .as_secs_f64()
                        * 1_000_000.0;
                    if config.max_jitter_us > 0.0 && late_us > config.max_jitter_us {
                        stats.overruns.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(late_us, "control tick overrun");
                        next_tick = tick_started_at;
                    }

                    let t = tick_started_at.duration_since(t_start).as_secs_f64();
                    control_tick(&mut model, io.as_ref(), &ring, &stats, t, dt);
                    next_tick += step_duration;
                }

                if done_tx.send(model).is_err() {
                    tracing::warn!("control loop owner gone, model dropped");
                }
            })
            .map_err(|e| LabError::Realtime(format!("failed to spawn control loop: {e}")))?;

        tracing::info!(target_hz = self.config.target_hz, "control loop started");
        self.running = Some(RunningLoop {
            stop,
            done: done_rx,
            handle,
        });
        Ok(())
    }

    /// Stop and quiesce the loop. Returns `false` when the thread had to
    /// be detached after the join timeout; its model is then gone.
    pub fn stop(&mut self) -> bool {
        let Some(run) = self.running.take() else {
            return true;
        };
        run.stop.store(true, Ordering::Release);
        match run.done.recv_timeout(self.config.join_timeout) {
            Ok(model) => {
                if run.handle.join().is_err() {
                    tracing::error!("control loop thread panicked on exit");
                }
                self.model = Some(model);
                tracing::info!(ticks = self.stats.snapshot().ticks, "control loop stopped");
                true
            }
            Err(_) => {
                tracing::error!(
                    timeout_ms = self.config.join_timeout.as_millis() as u64,
                    "control loop did not quiesce, detaching thread"
                );
                false
            }
        }
    }
}

impl Drop for ControlLoop {
    fn drop(&mut self) {
        self.stop();
    }
}
