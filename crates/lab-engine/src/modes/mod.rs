// ─────────────────────────────────────────────────────────────────────
// PocKETlab Core — Mode Engines
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Cooperative measurement engines.
//!
//! Each engine is built from validated settings (no hardware access),
//! then `begin` applies its initial outputs and `tick` advances it by at
//! most one measurement per cooperative-loop iteration.

pub mod bode;
pub mod control_system;
pub mod testbed;
pub mod transient;
pub mod va;

use crate::context::LabContext;
use crate::messages::DataBatch;
use lab_types::error::{LabError, LabResult};
use lab_types::mode::MeasurementMode;
use std::time::{Duration, Instant};

pub trait ModeEngine {
    fn mode(&self) -> MeasurementMode;

    /// Apply the initial hardware state. Runs after the previous mode
    /// has been stopped.
    fn begin(&mut self, _ctx: &LabContext, _now: Instant) {}

    fn tick(&mut self, ctx: &LabContext, now: Instant);

    /// Percent complete; `None` for open-ended modes.
    fn progress(&self) -> Option<f64>;

    fn is_finished(&self) -> bool;

    /// Drain the buffer if a flush is due. `force` drains whatever is
    /// buffered and marks the batch completed.
    fn take_batch(&mut self, force: bool) -> Option<DataBatch>;

    /// Seconds, for the start acknowledgment.
    fn estimated_duration(&self) -> Option<f64>;

    fn start_message(&self) -> String {
        format!("{} started", self.mode().title())
    }
}

/// Flush bookkeeping shared by the buffered engines.
#[derive(Debug, Default, Clone)]
pub(crate) struct FlushState {
    due: bool,
    finished: bool,
    final_sent: bool,
}

impl FlushState {
    pub(crate) fn request(&mut self) {
        self.due = true;
    }

    pub(crate) fn finish(&mut self) {
        self.finished = true;
        self.due = true;
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished
    }

    /// `Some(completed)` when a batch should go out now.
    pub(crate) fn take(&mut self, force: bool) -> Option<bool> {
        if self.final_sent || !(self.due || force) {
            return None;
        }
        self.due = false;
        let completed = self.finished || force;
        if completed {
            self.final_sent = true;
        }
        Some(completed)
    }
}

/// Time gate between measurements; the first call always passes.
#[derive(Debug, Clone)]
pub(crate) struct Gate {
    period: Duration,
    last: Option<Instant>,
}

impl Gate {
    pub(crate) fn new(period: Duration) -> Self {
        Gate { period, last: None }
    }

    pub(crate) fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.period => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    pub(crate) fn arm(&mut self, now: Instant) {
        self.last = Some(now);
    }

    pub(crate) fn period(&self) -> Duration {
        self.period
    }
}

/// `lo ≤ value ≤ hi`, otherwise `E001` naming the field.
pub(crate) fn check_range(
    mode: MeasurementMode,
    parameter: &str,
    value: f64,
    lo: f64,
    hi: f64,
    unit: &str,
) -> LabResult<()> {
    if !value.is_finite() || value < lo || value > hi {
        return Err(LabError::parameter_range(
            mode.as_str(),
            parameter,
            value,
            format!("Use a value between {lo} and {hi} {unit}"),
        ));
    }
    Ok(())
}

pub(crate) fn percent(done: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (done as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_state_final_once() {
        let mut f = FlushState::default();
        assert_eq!(f.take(false), None);
        f.request();
        assert_eq!(f.take(false), Some(false));
        assert_eq!(f.take(false), None);
        f.finish();
        assert_eq!(f.take(false), Some(true));
        assert_eq!(f.take(true), None);
    }

    #[test]
    fn test_forced_flush_completes() {
        let mut f = FlushState::default();
        assert_eq!(f.take(true), Some(true));
        assert_eq!(f.take(true), None);
    }

    #[test]
    fn test_gate() {
        let t0 = Instant::now();
        let mut gate = Gate::new(Duration::from_millis(100));
        assert!(gate.ready(t0));
        assert!(!gate.ready(t0 + Duration::from_millis(50)));
        assert!(gate.ready(t0 + Duration::from_millis(100)));
        let mut open = Gate::new(Duration::ZERO);
        assert!(open.ready(t0));
        assert!(open.ready(t0));
    }

    #[test]
    fn test_check_range_names_parameter() {
        let err = check_range(MeasurementMode::Step, "voltage", 25.0, 0.0, 20.0, "V").unwrap_err();
        assert_eq!(err.code(), "E001");
        assert_eq!(err.context().parameter, "voltage");
        assert!(check_range(MeasurementMode::Step, "voltage", f64::NAN, 0.0, 20.0, "V").is_err());
    }
}
