// ─────────────────────────────────────────────────────────────────────
// PocKETlab Core — State-Space Model
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Two-state, single-input, two-output linear model.
//!
//! `x ← x + dt·(A·x + B·u)`, `y = C·x + D·u` on the updated state.
//! Instrument volts are mapped to model units and back through
//! [`VoltageRange`].

use lab_types::error::{LabError, LabResult};
use ndarray::{Array1, Array2};
use serde::Deserialize;

pub const STATE_DIM: usize = 2;
pub const OUTPUT_DIM: usize = 2;

const MODE: &str = "control_system";

/// Affine map between instrument volts and normalized model units.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct VoltageRange {
    pub min_volts: f64,
    pub max_volts: f64,
    pub zero_offset: f64,
}

impl VoltageRange {
    pub fn span(&self) -> f64 {
        self.max_volts - self.min_volts
    }

    /// Volts in, model units out.
    pub fn to_model(&self, volts: f64) -> f64 {
        (volts - self.zero_offset) / self.span()
    }

    /// Model units in, clamped volts out.
    pub fn to_volts(&self, value: f64) -> f64 {
        (value * self.span() + self.zero_offset).clamp(self.min_volts, self.max_volts)
    }

    /// `parameter` names the range in error reports.
    pub fn validate(&self, parameter: &str, ceiling: f64) -> LabResult<()> {
        let fields = [
            ("min_volts", self.min_volts),
            ("max_volts", self.max_volts),
            ("zero_offset", self.zero_offset),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 || value > ceiling {
                return Err(LabError::parameter_range(
                    MODE,
                    &format!("{parameter}.{name}"),
                    value,
                    format!("Keep voltage ranges within 0 to {ceiling:.3} V"),
                ));
            }
        }
        if self.min_volts >= self.max_volts {
            return Err(LabError::parameter_range(
                MODE,
                &format!("{parameter}.min_volts"),
                self.min_volts,
                "min_volts must be below max_volts",
            ));
        }
        if self.zero_offset < self.min_volts || self.zero_offset > self.max_volts {
            return Err(LabError::parameter_range(
                MODE,
                &format!("{parameter}.zero_offset"),
                self.zero_offset,
                "zero_offset must lie within [min_volts, max_volts]",
            ));
        }
        Ok(())
    }
}

/// Wire form of a user model: row-major nested arrays.
#[derive(Debug, Clone, Deserialize)]
pub struct SystemModelSpec {
    #[serde(rename = "A")]
    pub a: Vec<Vec<f64>>,
    #[serde(rename = "B")]
    pub b: Vec<Vec<f64>>,
    #[serde(rename = "C")]
    pub c: Vec<Vec<f64>>,
    #[serde(rename = "D")]
    pub d: Vec<Vec<f64>>,
    pub input_voltage_range: VoltageRange,
    pub output_voltage_range: VoltageRange,
}

fn to_matrix(name: &str, rows: &[Vec<f64>], shape: (usize, usize)) -> LabResult<Array2<f64>> {
    let malformed = || {
        LabError::malformed(
            MODE,
            &format!("system_model.{name}"),
            format!("{name} must be a finite {}x{} matrix", shape.0, shape.1),
        )
    };
    if rows.len() != shape.0 || rows.iter().any(|r| r.len() != shape.1) {
        return Err(malformed());
    }
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    if flat.iter().any(|v| !v.is_finite()) {
        return Err(malformed());
    }
    Array2::from_shape_vec(shape, flat).map_err(|_| malformed())
}

/// Validated model plus its integration state.
#[derive(Debug, Clone)]
pub struct StateSpaceModel {
    a: Array2<f64>,
    b: Array1<f64>,
    c: Array2<f64>,
    d: Array1<f64>,
    pub input_map: VoltageRange,
    pub output_map: VoltageRange,
    x: Array1<f64>,
}

/// One model tick in both unit systems.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutput {
    pub u: f64,
    pub x: [f64; STATE_DIM],
    pub y: [f64; OUTPUT_DIM],
    /// `y` mapped back to clamped volts.
    pub volts: [f64; OUTPUT_DIM],
}

impl StateSpaceModel {
    /// Build from the wire form. `ceiling` bounds both voltage ranges.
    pub fn from_spec(spec: &SystemModelSpec, ceiling: f64) -> LabResult<Self> {
        let a = to_matrix("A", &spec.a, (STATE_DIM, STATE_DIM))?;
        let b = to_matrix("B", &spec.b, (STATE_DIM, 1))?;
        let c = to_matrix("C", &spec.c, (OUTPUT_DIM, STATE_DIM))?;
        let d = to_matrix("D", &spec.d, (OUTPUT_DIM, 1))?;
        spec.input_voltage_range
            .validate("system_model.input_voltage_range", ceiling)?;
        spec.output_voltage_range
            .validate("system_model.output_voltage_range", ceiling)?;
        Ok(StateSpaceModel {
            a,
            b: b.column(0).to_owned(),
            c,
            d: d.column(0).to_owned(),
            input_map: spec.input_voltage_range,
            output_map: spec.output_voltage_range,
            x: Array1::zeros(STATE_DIM),
        })
    }

    /// Unity follower: both outputs track the input through `D`.
    pub fn feedthrough(range: VoltageRange) -> Self {
        StateSpaceModel {
            a: Array2::zeros((STATE_DIM, STATE_DIM)),
            b: Array1::zeros(STATE_DIM),
            c: Array2::zeros((OUTPUT_DIM, STATE_DIM)),
            d: Array1::ones(OUTPUT_DIM),
            input_map: range,
            output_map: range,
            x: Array1::zeros(STATE_DIM),
        }
    }

    pub fn state(&self) -> [f64; STATE_DIM] {
        [self.x[0], self.x[1]]
    }

    pub fn reset(&mut self) {
        self.x.fill(0.0);
    }

    /// Advance by `dt` seconds with model input `u`.
    pub fn step(&mut self, u: f64, dt: f64) -> [f64; OUTPUT_DIM] {
        let dx = self.a.dot(&self.x) + &self.b * u;
        self.x.scaled_add(dt, &dx);
        let y = self.c.dot(&self.x) + &self.d * u;
        [y[0], y[1]]
    }

    /// Full tick from input volts to output volts.
    pub fn step_volts(&mut self, input_volts: f64, dt: f64) -> StepOutput {
        let u = self.input_map.to_model(input_volts);
        let y = self.step(u, dt);
        StepOutput {
            u,
            x: self.state(),
            y,
            volts: [self.output_map.to_volts(y[0]), self.output_map.to_volts(y[1])],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range() -> VoltageRange {
        VoltageRange {
            min_volts: 0.0,
            max_volts: 10.0,
            zero_offset: 5.0,
        }
    }

    fn spec(a: Vec<Vec<f64>>, c: Vec<Vec<f64>>, d: Vec<Vec<f64>>) -> SystemModelSpec {
        SystemModelSpec {
            a,
            b: vec![vec![0.0], vec![0.0]],
            c,
            d,
            input_voltage_range: range(),
            output_voltage_range: range(),
        }
    }

    #[test]
    fn test_affine_maps_invert() {
        let r = range();
        for v in [0.0, 2.5, 5.0, 7.5, 10.0] {
            assert!((r.to_volts(r.to_model(v)) - v).abs() < 1e-12);
        }
        assert_eq!(r.to_volts(10.0), 10.0);
        assert_eq!(r.to_volts(-10.0), 0.0);
    }

    #[test]
    fn test_feedthrough_round_trip() {
        let mut model = StateSpaceModel::feedthrough(range());
        for v in [0.3, 4.0, 9.9] {
            let out = model.step_volts(v, 0.01);
            assert!((out.volts[0] - v).abs() < 1e-9);
            assert!((out.volts[1] - v).abs() < 1e-9);
        }
    }

    #[test]
    fn test_identity_c_holds_zero_offset() {
        let identity = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let zeros = vec![vec![0.0, 0.0], vec![0.0, 0.0]];
        let s = spec(zeros, identity, vec![vec![0.0], vec![0.0]]);
        let mut model = StateSpaceModel::from_spec(&s, 13.7).unwrap();
        let out = model.step_volts(8.0, 0.01);
        assert_eq!(out.x, [0.0, 0.0]);
        assert!((out.volts[0] - 5.0).abs() < 1e-12);
        assert!((out.volts[1] - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_first_order_lag_settles() {
        // x1' = -x1 + u, y1 = x1
        let mut s = spec(
            vec![vec![-1.0, 0.0], vec![0.0, 0.0]],
            vec![vec![1.0, 0.0], vec![0.0, 0.0]],
            vec![vec![0.0], vec![0.0]],
        );
        s.b = vec![vec![1.0], vec![0.0]];
        let mut model = StateSpaceModel::from_spec(&s, 13.7).unwrap();
        let mut y = [0.0; 2];
        for _ in 0..2_000 {
            y = model.step(0.5, 0.01);
        }
        assert!((y[0] - 0.5).abs() < 1e-3, "y1={}", y[0]);
        model.reset();
        assert_eq!(model.state(), [0.0, 0.0]);
    }

    #[test]
    fn test_rejects_wrong_shape() {
        let s = spec(
            vec![vec![0.0, 0.0]],
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            vec![vec![0.0], vec![0.0]],
        );
        let err = StateSpaceModel::from_spec(&s, 13.7).unwrap_err();
        assert_eq!(err.code(), "E004");
        assert_eq!(err.context().parameter, "system_model.A");
    }

    #[test]
    fn test_rejects_non_finite_entry() {
        let s = spec(
            vec![vec![f64::NAN, 0.0], vec![0.0, 0.0]],
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            vec![vec![0.0], vec![0.0]],
        );
        assert_eq!(StateSpaceModel::from_spec(&s, 13.7).unwrap_err().code(), "E004");
    }

    #[test]
    fn test_rejects_range_outside_ceiling() {
        let mut s = spec(
            vec![vec![0.0, 0.0], vec![0.0, 0.0]],
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            vec![vec![0.0], vec![0.0]],
        );
        s.output_voltage_range.max_volts = 20.0;
        let err = StateSpaceModel::from_spec(&s, 13.7).unwrap_err();
        assert_eq!(err.code(), "E001");
        assert_eq!(
            err.context().parameter,
            "system_model.output_voltage_range.max_volts"
        );
    }

    #[test]
    fn test_spec_parses_wire_names() {
        let json = r#"{
            "A": [[0, 1], [-1, 0]],
            "B": [[0], [1]],
            "C": [[1, 0], [0, 1]],
            "D": [[0], [0]],
            "input_voltage_range": {"min_volts": 0, "max_volts": 10, "zero_offset": 5},
            "output_voltage_range": {"min_volts": 0, "max_volts": 10, "zero_offset": 5}
        }"#;
        let s: SystemModelSpec = serde_json::from_str(json).unwrap();
        assert!(StateSpaceModel::from_spec(&s, 13.7).is_ok());
    }
}
