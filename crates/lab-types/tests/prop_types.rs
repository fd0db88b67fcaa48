// ─────────────────────────────────────────────────────────────────────
// PocKETlab Core — Property-Based Tests (proptest) for lab-types
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Property-based tests for lab-types using proptest.
//!
//! Covers: error context/code consistency, config defaults under
//! partial JSON, channel limits.

use lab_types::config::EngineConfig;
use lab_types::error::LabError;
use lab_types::io::Channel;
use proptest::prelude::*;

// ── Error Taxonomy ───────────────────────────────────────────────────

proptest! {
    /// Range errors always report E001 and echo the offending field.
    #[test]
    fn range_error_echoes_parameter(
        value in -1.0e6f64..1.0e6,
        idx in 0usize..4,
    ) {
        let params = ["start_voltage", "end_voltage", "step_voltage", "shunt_resistance"];
        let err = LabError::parameter_range("va", params[idx], value, "Check constraints");
        prop_assert_eq!(err.code(), "E001");
        let ctx = err.context();
        prop_assert_eq!(ctx.mode, "va");
        prop_assert_eq!(ctx.parameter, params[idx]);
        prop_assert_eq!(ctx.value, value.to_string());
    }

    /// Resolution errors always carry the requested count.
    #[test]
    fn resolution_error_reports_count(requested in 501usize..100_000) {
        let err = LabError::ExcessiveResolution {
            mode: "bode".into(),
            parameter: "points_per_decade".into(),
            requested,
            limit: 500,
        };
        prop_assert_eq!(err.code(), "E003");
        prop_assert_eq!(err.context().value, requested.to_string());
    }
}

// ── Config Defaults ──────────────────────────────────────────────────

proptest! {
    /// Overriding one timing field leaves every other section at default.
    #[test]
    fn partial_timing_keeps_defaults(settle in 0u64..10_000) {
        let json = format!(r#"{{"timing": {{"bode_settle_ms": {settle}}}}}"#);
        let cfg: EngineConfig = serde_json::from_str(&json).unwrap();
        let defaults = EngineConfig::default();
        prop_assert_eq!(cfg.timing.bode_settle_ms, settle);
        prop_assert_eq!(cfg.timing.va_step_delay_ms, defaults.timing.va_step_delay_ms);
        prop_assert_eq!(&cfg.regulation, &defaults.regulation);
        prop_assert_eq!(&cfg.control, &defaults.control);
        prop_assert!(cfg.validate().is_ok());
    }

    /// Any positive rate gives a tick period equal to its inverse.
    #[test]
    fn control_dt_is_inverse_rate(hz in 1.0f64..10_000.0) {
        let mut cfg = EngineConfig::default();
        cfg.control.target_hz = hz;
        prop_assert!(cfg.validate().is_ok());
        prop_assert!((cfg.control.dt() * hz - 1.0).abs() < 1e-12);
    }
}

#[test]
fn channel_ceilings_are_positive() {
    for ch in [Channel::Power, Channel::SignalA, Channel::SignalB] {
        assert!(ch.max_output_voltage() > 0.0);
    }
}
