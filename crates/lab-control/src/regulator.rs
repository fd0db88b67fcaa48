// ─────────────────────────────────────────────────────────────────────
// PocKETlab Core — Regulators
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Closed-loop output regulation for VA characterization.
//!
//! Constant-voltage steps use a bounded incremental search on the
//! differential DUT voltage; constant-current steps use a proportional
//! regulator on the sensed current. Both settle synchronously after each
//! output change, so the worst-case blocking time of one step is
//! `max_iterations × settle`.

use lab_types::config::RegulationConfig;
use lab_types::io::{AnalogIo, Channel, InputNode};
use std::thread;
use std::time::Duration;

/// Sleep unless the settle time is configured to zero.
pub fn settle(delay: Duration) {
    if !delay.is_zero() {
        thread::sleep(delay);
    }
}

/// Root-mean-square of `samples` consecutive reads of one node.
pub fn rms_read(io: &dyn AnalogIo, node: InputNode, samples: usize) -> f64 {
    let n = samples.max(1);
    let sum_sq: f64 = (0..n)
        .map(|_| {
            let v = io.read_voltage(node);
            v * v
        })
        .sum();
    (sum_sq / n as f64).sqrt()
}

/// Single differential read across the DUT (high node minus low node).
pub fn read_differential(io: &dyn AnalogIo, channel: Channel) -> f64 {
    io.read_voltage(channel.high_node()) - io.read_voltage(channel.low_node())
}

/// Single current read: current sense on the power stage, otherwise the
/// low-node voltage across the shunt.
pub fn read_current(io: &dyn AnalogIo, channel: Channel, shunt_ohms: f64) -> f64 {
    match channel.current_node() {
        Some(node) => io.read_voltage(node),
        None => io.read_voltage(channel.low_node()) / shunt_ohms,
    }
}

/// Noise-rejecting final reading of one VA point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VaReading {
    pub voltage: f64,
    pub current: f64,
}

/// RMS-averaged DUT voltage and current after regulation has settled.
pub fn measure_point(
    io: &dyn AnalogIo,
    channel: Channel,
    shunt_ohms: f64,
    samples: usize,
) -> VaReading {
    let high = rms_read(io, channel.high_node(), samples);
    let low = rms_read(io, channel.low_node(), samples);
    let current = match channel.current_node() {
        Some(node) => rms_read(io, node, samples),
        None => low / shunt_ohms,
    };
    VaReading {
        voltage: high - low,
        current,
    }
}

/// How a regulation run ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegulationOutcome {
    /// Output voltage left applied.
    pub commanded: f64,
    /// Last regulated quantity observed (volts for CV, amperes for CC).
    pub measured: f64,
    pub iterations: usize,
    pub reached: bool,
    /// The output hit the channel ceiling before the target was reached.
    pub capped: bool,
}

fn apply(io: &dyn AnalogIo, channel: Channel, volts: f64) {
    if !io.set_output_voltage(channel.output(), volts) {
        tracing::warn!(channel = %channel, volts, "output write refused");
    }
    io.commit_outputs();
}

/// Incremental constant-voltage search.
///
/// Starts from `max(previous, target)` because the DUT drop can never
/// exceed the applied output, then climbs by `cv_increment_v` until the
/// differential voltage is within `cv_tolerance_v` of `target`.
pub fn search_voltage(
    io: &dyn AnalogIo,
    channel: Channel,
    target: f64,
    previous: f64,
    max_output: f64,
    reg: &RegulationConfig,
    settle_time: Duration,
) -> RegulationOutcome {
    let mut estimate = previous.max(target).min(max_output);
    let mut measured = 0.0;
    let mut iterations = 0;

    while iterations < reg.cv_max_iterations {
        iterations += 1;
        apply(io, channel, estimate);
        settle(settle_time);
        measured = read_differential(io, channel);

        if measured >= target - reg.cv_tolerance_v {
            return RegulationOutcome {
                commanded: estimate,
                measured,
                iterations,
                reached: true,
                capped: false,
            };
        }
        if estimate >= max_output {
            tracing::debug!(channel = %channel, target, measured, "CV search capped");
            return RegulationOutcome {
                commanded: estimate,
                measured,
                iterations,
                reached: false,
                capped: true,
            };
        }
        estimate = (estimate + reg.cv_increment_v).min(max_output);
    }

    tracing::debug!(channel = %channel, target, measured, iterations, "CV search exhausted");
    RegulationOutcome {
        commanded: estimate,
        measured,
        iterations,
        reached: false,
        capped: false,
    }
}

/// Proportional regulator: `Δv = gain · error · shunt`.
#[derive(Debug, Clone)]
pub struct ProportionalRegulator {
    pub gain: f64,
    pub shunt_ohms: f64,
    last_err: f64,
}

impl ProportionalRegulator {
    pub fn new(gain: f64, shunt_ohms: f64) -> Self {
        ProportionalRegulator {
            gain,
            shunt_ohms,
            last_err: 0.0,
        }
    }

    /// One regulation step. Returns the output correction (V).
    pub fn step(&mut self, error: f64) -> f64 {
        self.last_err = error;
        self.gain * error * self.shunt_ohms
    }

    pub fn last_error(&self) -> f64 {
        self.last_err
    }

    pub fn reset(&mut self) {
        self.last_err = 0.0;
    }
}

/// Constant-current regulation from the previously commanded voltage.
pub fn regulate_current(
    io: &dyn AnalogIo,
    channel: Channel,
    target: f64,
    previous: f64,
    shunt_ohms: f64,
    max_output: f64,
    reg: &RegulationConfig,
    settle_time: Duration,
) -> RegulationOutcome {
    let mut regulator = ProportionalRegulator::new(reg.cc_gain, shunt_ohms);
    let band = (target.abs() * reg.cc_tolerance_ratio).max(f64::EPSILON);
    let mut commanded = previous.clamp(0.0, max_output);
    let mut measured = 0.0;
    let mut iterations = 0;

    while iterations < reg.cc_max_iterations {
        iterations += 1;
        apply(io, channel, commanded);
        settle(settle_time);
        measured = read_current(io, channel, shunt_ohms);

        let error = target - measured;
        if error.abs() <= band {
            return RegulationOutcome {
                commanded,
                measured,
                iterations,
                reached: true,
                capped: false,
            };
        }
        let next = commanded + regulator.step(error);
        if next >= max_output && commanded >= max_output {
            tracing::debug!(channel = %channel, target, measured, "CC regulation saturated");
            return RegulationOutcome {
                commanded,
                measured,
                iterations,
                reached: false,
                capped: true,
            };
        }
        commanded = next.clamp(0.0, max_output);
    }

    RegulationOutcome {
        commanded,
        measured,
        iterations,
        reached: false,
        capped: false,
    }
}
