// ─────────────────────────────────────────────────────────────────────
// PocKETlab Core — Sample Tuples
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use serde::Serialize;

/// One VA sweep point. `t` is seconds since sweep start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct VaSample {
    pub voltage: f64,
    pub current: f64,
    pub t: f64,
}

/// One frequency-response point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BodeSample {
    #[serde(rename = "frequency")]
    pub freq: f64,
    pub gain_db: f64,
    pub phase_deg: f64,
}

/// One step/impulse response point. `t` is seconds since excitation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TransientSample {
    pub t: f64,
    pub response: f64,
}

/// One real-time control tick: input volts, model state, output volts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ControlSample {
    pub t: f64,
    pub input: f64,
    pub x1: f64,
    pub x2: f64,
    pub y1: f64,
    pub y2: f64,
}

/// Auxiliary pin reading attached to testbed samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuxReading {
    Digital { channel: u8, level: bool },
    Analog { channel: u8, volts: f64 },
}

/// Testbed monitor reading of the power stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestbedSample {
    pub t: f64,
    pub voltage: f64,
    pub current: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aux: Vec<AuxReading>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bode_sample_wire_names() {
        let sample = BodeSample {
            freq: 100.0,
            gain_db: -3.0,
            phase_deg: -45.0,
        };
        let json = serde_json::to_value(sample).unwrap();
        assert_eq!(json["frequency"], 100.0);
        assert_eq!(json["gain_db"], -3.0);
    }

    #[test]
    fn test_testbed_sample_omits_empty_aux() {
        let sample = TestbedSample {
            t: 0.5,
            voltage: 3.3,
            current: 0.1,
            aux: Vec::new(),
        };
        let json = serde_json::to_value(&sample).unwrap();
        assert!(json.get("aux").is_none());

        let with_aux = TestbedSample {
            aux: vec![AuxReading::Digital {
                channel: 2,
                level: true,
            }],
            ..sample
        };
        let json = serde_json::to_value(&with_aux).unwrap();
        assert_eq!(json["aux"][0]["kind"], "digital");
        assert_eq!(json["aux"][0]["level"], true);
    }
}
