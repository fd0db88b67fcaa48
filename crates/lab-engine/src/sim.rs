// ─────────────────────────────────────────────────────────────────────
// PocKETlab Core — Simulated Bench
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! In-memory stand-ins for the analog front end and the transport.
//!
//! Every channel drives a resistive DUT in series with a shunt to
//! ground. The power stage reports its current directly; signal
//! channels expose the shunt voltage on their input node. The current
//! limiter setting is recorded but not modelled.

use crate::postman::Messenger;
use lab_types::config::EngineConfig;
use lab_types::error::{LabError, LabResult};
use lab_types::io::{AnalogIo, Channel, InputNode, OutputNode};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde_json::Value;

const AUX_PINS: usize = 4;

fn output_index(output: OutputNode) -> usize {
    match output {
        OutputNode::PowerVoltage => 0,
        OutputNode::PowerCurrentLimit => 1,
        OutputNode::SignalA => 2,
        OutputNode::SignalB => 3,
    }
}

fn channel_index(channel: Channel) -> usize {
    match channel {
        Channel::Power => 0,
        Channel::SignalA => 1,
        Channel::SignalB => 2,
    }
}

struct BenchState {
    staged: [f64; 4],
    latched: [f64; 4],
    dut_ohms: [f64; 3],
    shunt_ohms: f64,
    control_input: Option<f64>,
    aux_digital: [bool; AUX_PINS],
    aux_analog: [f64; AUX_PINS],
    noise: Option<Normal<f64>>,
    rng: StdRng,
    refuse_writes: bool,
    commits: u64,
}

impl BenchState {
    fn current(&self, channel: Channel) -> f64 {
        let v = self.latched[output_index(channel.output())];
        v / (self.dut_ohms[channel_index(channel)] + self.shunt_ohms)
    }

    fn ideal(&self, input: InputNode) -> f64 {
        match input {
            InputNode::PowerVoltage => self.latched[output_index(OutputNode::PowerVoltage)],
            InputNode::PowerGround => self.current(Channel::Power) * self.shunt_ohms,
            InputNode::PowerCurrent => self.current(Channel::Power),
            InputNode::SignalOutA => self.latched[output_index(OutputNode::SignalA)],
            InputNode::SignalOutB => self.latched[output_index(OutputNode::SignalB)],
            InputNode::SignalInA => self
                .control_input
                .unwrap_or_else(|| self.current(Channel::SignalA) * self.shunt_ohms),
            InputNode::SignalInB => self.current(Channel::SignalB) * self.shunt_ohms,
        }
    }
}

/// Resistive bench: one DUT per channel in series with a common shunt.
pub struct SimulatedBench {
    state: Mutex<BenchState>,
}

impl SimulatedBench {
    pub fn new(dut_ohms: f64, shunt_ohms: f64) -> Self {
        SimulatedBench {
            state: Mutex::new(BenchState {
                staged: [0.0; 4],
                latched: [0.0; 4],
                dut_ohms: [dut_ohms; 3],
                shunt_ohms,
                control_input: None,
                aux_digital: [false; AUX_PINS],
                aux_analog: [0.0; AUX_PINS],
                noise: None,
                rng: StdRng::seed_from_u64(0),
                refuse_writes: false,
                commits: 0,
            }),
        }
    }

    pub fn with_dut(self, channel: Channel, ohms: f64) -> Self {
        self.state.lock().dut_ohms[channel_index(channel)] = ohms;
        self
    }

    /// Gaussian read noise with standard deviation `std_volts`.
    pub fn with_noise(self, std_volts: f64, seed: u64) -> LabResult<Self> {
        let normal = Normal::new(0.0, std_volts)
            .map_err(|e| LabError::malformed("sim", "noise_std", e.to_string()))?;
        {
            let mut state = self.state.lock();
            state.noise = Some(normal);
            state.rng = StdRng::seed_from_u64(seed);
        }
        Ok(self)
    }

    /// Override `SignalInA` with an external control input.
    pub fn set_control_input(&self, volts: Option<f64>) {
        self.state.lock().control_input = volts;
    }

    pub fn set_aux_digital(&self, pin: u8, level: bool) {
        if let Some(slot) = self.state.lock().aux_digital.get_mut(pin as usize) {
            *slot = level;
        }
    }

    pub fn set_aux_analog(&self, pin: u8, volts: f64) {
        if let Some(slot) = self.state.lock().aux_analog.get_mut(pin as usize) {
            *slot = volts;
        }
    }

    pub fn set_refuse_writes(&self, refuse: bool) {
        self.state.lock().refuse_writes = refuse;
    }

    /// Latched value of an output.
    pub fn output(&self, output: OutputNode) -> f64 {
        self.state.lock().latched[output_index(output)]
    }

    pub fn commits(&self) -> u64 {
        self.state.lock().commits
    }
}

impl AnalogIo for SimulatedBench {
    fn set_output_voltage(&self, output: OutputNode, volts: f64) -> bool {
        let mut state = self.state.lock();
        if state.refuse_writes || !volts.is_finite() {
            return false;
        }
        state.staged[output_index(output)] = volts;
        true
    }

    fn read_voltage(&self, input: InputNode) -> f64 {
        let mut state = self.state.lock();
        let ideal = state.ideal(input);
        let noise = state.noise;
        match noise {
            Some(normal) => ideal + normal.sample(&mut state.rng),
            None => ideal,
        }
    }

    fn commit_outputs(&self) {
        let mut state = self.state.lock();
        state.latched = state.staged;
        state.commits += 1;
    }

    fn read_aux_digital(&self, pin: u8) -> bool {
        self.state
            .lock()
            .aux_digital
            .get(pin as usize)
            .copied()
            .unwrap_or(false)
    }

    fn read_aux_analog(&self, pin: u8) -> f64 {
        self.state
            .lock()
            .aux_analog
            .get(pin as usize)
            .copied()
            .unwrap_or(0.0)
    }
}

/// Default configuration with every cooperative delay at zero, so
/// sweeps finish in as many ticks as they have points.
pub fn zero_delay_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.timing.va_step_delay_ms = 0;
    config.timing.va_settle_ms = 0;
    config.timing.bode_point_delay_ms = 0;
    config.timing.bode_settle_ms = 0;
    config.timing.control_send_interval_ms = 0;
    config
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub message: Value,
}

/// Transport that keeps everything it is asked to publish.
#[derive(Debug, Default)]
pub struct RecordingMessenger {
    messages: Mutex<Vec<PublishedMessage>>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.messages.lock().clone()
    }

    pub fn take(&self) -> Vec<PublishedMessage> {
        std::mem::take(&mut *self.messages.lock())
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    /// Messages whose topic starts with `prefix`.
    pub fn on_topic(&self, prefix: &str) -> Vec<Value> {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.topic.starts_with(prefix))
            .map(|m| m.message.clone())
            .collect()
    }
}

impl Messenger for RecordingMessenger {
    fn publish(&self, topic: &str, message: &Value) {
        self.messages.lock().push(PublishedMessage {
            topic: topic.to_string(),
            message: message.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outputs_latch_on_commit() {
        let bench = SimulatedBench::new(2.0, 1.0);
        assert!(bench.set_output_voltage(OutputNode::PowerVoltage, 3.0));
        assert_eq!(bench.read_voltage(InputNode::PowerVoltage), 0.0);
        bench.commit_outputs();
        assert_eq!(bench.read_voltage(InputNode::PowerVoltage), 3.0);
        assert!((bench.read_voltage(InputNode::PowerCurrent) - 1.0).abs() < 1e-12);
        assert!((bench.read_voltage(InputNode::PowerGround) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_signal_channel_divider() {
        let bench = SimulatedBench::new(9.0, 1.0);
        bench.set_output_voltage(OutputNode::SignalB, 5.0);
        bench.commit_outputs();
        assert_eq!(bench.read_voltage(InputNode::SignalOutB), 5.0);
        assert!((bench.read_voltage(InputNode::SignalInB) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_control_input_override() {
        let bench = SimulatedBench::new(9.0, 1.0);
        bench.set_control_input(Some(2.5));
        assert_eq!(bench.read_voltage(InputNode::SignalInA), 2.5);
        bench.set_control_input(None);
        assert_eq!(bench.read_voltage(InputNode::SignalInA), 0.0);
    }

    #[test]
    fn test_noise_is_seeded() {
        let a = SimulatedBench::new(2.0, 1.0).with_noise(0.01, 7).unwrap();
        let b = SimulatedBench::new(2.0, 1.0).with_noise(0.01, 7).unwrap();
        let ra: Vec<f64> = (0..5).map(|_| a.read_voltage(InputNode::PowerVoltage)).collect();
        let rb: Vec<f64> = (0..5).map(|_| b.read_voltage(InputNode::PowerVoltage)).collect();
        assert_eq!(ra, rb);
        assert!(ra.iter().any(|v| *v != 0.0));
        assert!(SimulatedBench::new(2.0, 1.0).with_noise(f64::NAN, 1).is_err());
    }

    #[test]
    fn test_refused_writes() {
        let bench = SimulatedBench::new(2.0, 1.0);
        bench.set_refuse_writes(true);
        assert!(!bench.set_output_voltage(OutputNode::SignalA, 1.0));
    }

    #[test]
    fn test_aux_pins() {
        let bench = SimulatedBench::new(2.0, 1.0);
        bench.set_aux_digital(2, true);
        bench.set_aux_analog(3, 1.2);
        assert!(bench.read_aux_digital(2));
        assert!(!bench.read_aux_digital(9));
        assert_eq!(bench.read_aux_analog(3), 1.2);
    }

    #[test]
    fn test_recording_messenger() {
        let rec = RecordingMessenger::new();
        rec.publish("data/va", &serde_json::json!({"n": 1}));
        rec.publish("status", &serde_json::json!({"n": 2}));
        assert_eq!(rec.on_topic("data/").len(), 1);
        assert_eq!(rec.take().len(), 2);
        assert!(rec.is_empty());
    }
}
