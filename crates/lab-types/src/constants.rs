// ─────────────────────────────────────────────────────────────────────
// PocKETlab Core — Constants
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
/// Power stage output ceiling (V).
pub const POWER_VOLTAGE_MAX: f64 = 20.0;

/// Power stage current limiter ceiling (A).
pub const POWER_CURRENT_MAX: f64 = 3.0;

/// Signal DAC reference (V) with 1x gain.
pub const SIGNAL_DAC_REFERENCE: f64 = 2.048;

/// Op-amp gain after the signal DAC.
pub const SIGNAL_AMPLIFIER_GAIN: f64 = 6.7;

/// Signal output ceiling (V): DAC reference times amplifier gain.
pub const SIGNAL_VOLTAGE_MAX: f64 = SIGNAL_DAC_REFERENCE * SIGNAL_AMPLIFIER_GAIN;

// Ring capacities, one per measurement stream.
pub const VA_BUFFER_CAPACITY: usize = 50;
pub const BODE_BUFFER_CAPACITY: usize = 20;
pub const CONTROL_BUFFER_CAPACITY: usize = 20;
pub const TRANSIENT_BUFFER_CAPACITY: usize = TRANSIENT_POINTS;

/// Fixed sample count of a step/impulse run.
pub const TRANSIENT_POINTS: usize = 200;

/// Step/impulse partial flush cadence (samples).
pub const TRANSIENT_FLUSH_EVERY: usize = 50;

/// VA partial flush cadence (steps).
pub const VA_FLUSH_EVERY: usize = 10;

/// Upper bound on VA sweep steps.
pub const VA_MAX_STEPS: usize = 500;

/// Upper bound on Bode sweep points.
pub const BODE_MAX_POINTS: usize = 500;

pub const BODE_FREQ_MIN_HZ: f64 = 1.0;
pub const BODE_FREQ_MAX_HZ: f64 = 10_000.0;
pub const BODE_PPD_MIN: u32 = 1;
pub const BODE_PPD_MAX: u32 = 100;

/// Added to the amplitude ratio before log10 so a dead channel reads finite.
pub const GAIN_EPSILON: f64 = 1e-9;

/// Corner frequency of the single-pole placeholder phase model (Hz).
pub const PHASE_PLACEHOLDER_CORNER_HZ: f64 = 1_000.0;

pub const STEP_TIME_MIN_S: f64 = 0.001;
pub const STEP_TIME_MAX_S: f64 = 10.0;
pub const IMPULSE_TIME_MIN_S: f64 = 0.001;
pub const IMPULSE_TIME_MAX_S: f64 = 2.0;
pub const IMPULSE_DURATION_MIN_US: u32 = 1;
pub const IMPULSE_DURATION_MAX_US: u32 = 1_000;

pub const TESTBED_INTERVAL_MIN_MS: u64 = 50;
pub const TESTBED_INTERVAL_MAX_MS: u64 = 1_000;

/// Auxiliary DA0..DA3 pins.
pub const AUX_CHANNEL_COUNT: u8 = 4;

/// Guard used when turning a span/step ratio into a step count.
pub const STEP_COUNT_EPSILON: f64 = 1e-9;
