// ─────────────────────────────────────────────────────────────────────
// PocKETlab Core — Property-Based Tests (proptest) for lab-control
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Property-based tests for lab-control using proptest.
//!
//! Covers: ring count bounds and drain reset, affine voltage maps,
//! feed-through model round-trip.

use lab_control::ring::{SampleRing, SharedRing};
use lab_control::state_space::{StateSpaceModel, VoltageRange};
use lab_types::sample::ControlSample;
use proptest::prelude::*;
use std::time::Duration;

fn range_strategy() -> impl Strategy<Value = VoltageRange> {
    (0.0f64..6.0, 0.5f64..7.0, 0.0f64..1.0).prop_map(|(min, span, frac)| VoltageRange {
        min_volts: min,
        max_volts: min + span,
        zero_offset: min + frac * span,
    })
}

// ── Sample Rings ─────────────────────────────────────────────────────

proptest! {
    /// Count never exceeds capacity and the view keeps the newest samples.
    #[test]
    fn ring_count_bounded(pushes in 0usize..200, capacity in 1usize..40) {
        let mut ring = SampleRing::<f64>::new(capacity);
        for i in 0..pushes {
            ring.push(i as f64);
            prop_assert!(ring.len() <= capacity);
        }
        let view = ring.get_view();
        prop_assert_eq!(view.len(), pushes.min(capacity));
        if let Some(last) = view.last() {
            prop_assert_eq!(*last, (pushes - 1) as f64);
        }
        prop_assert!(view.windows(2).all(|w| w[0] < w[1]));
    }

    /// After a drain the next write lands at index 0.
    #[test]
    fn shared_drain_resets(pushes in 1usize..100) {
        let ring = SharedRing::<ControlSample>::new(20, Duration::from_millis(1));
        for i in 0..pushes {
            let sample = ControlSample { t: i as f64, ..ControlSample::default() };
            prop_assert!(ring.try_push(sample));
        }
        let (count, _) = ring.try_snapshot().unwrap();
        prop_assert!(count <= 20);
        let drained = ring.try_drain().unwrap();
        prop_assert_eq!(drained.len(), pushes.min(20));
        prop_assert_eq!(ring.try_snapshot(), Some((0, 0)));
        prop_assert!(ring.try_push(ControlSample::default()));
        prop_assert_eq!(ring.try_snapshot(), Some((1, 1)));
    }
}

// ── Affine Maps ──────────────────────────────────────────────────────

proptest! {
    /// Mapping volts into model units and back is lossless inside the range.
    #[test]
    fn affine_round_trip(r in range_strategy(), frac in 0.0f64..=1.0) {
        let v = r.min_volts + frac * r.span();
        prop_assert!((r.to_volts(r.to_model(v)) - v).abs() < 1e-9);
    }

    /// Output volts are always clamped into the range.
    #[test]
    fn output_map_clamps(r in range_strategy(), y in -1.0e3f64..1.0e3) {
        let v = r.to_volts(y);
        prop_assert!(v >= r.min_volts && v <= r.max_volts);
    }

    /// Feed-through model with equal maps reproduces its input each tick.
    #[test]
    fn feedthrough_reproduces_input(
        r in range_strategy(),
        fracs in prop::collection::vec(0.0f64..=1.0, 1..30),
    ) {
        let mut model = StateSpaceModel::feedthrough(r);
        for frac in fracs {
            let v = r.min_volts + frac * r.span();
            let out = model.step_volts(v, 0.01);
            prop_assert!((out.volts[0] - v).abs() < 1e-9);
            prop_assert!((out.volts[1] - v).abs() < 1e-9);
        }
    }
}
