// ─────────────────────────────────────────────────────────────────────
// PocKETlab Core — Analog I/O Collaborator
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Narrow interface onto the analog front end.
//!
//! The driver behind it owns ADC/DAC register access, scaling and
//! calibration. Implementations synchronise internally: the cooperative
//! loop and the real-time control thread both hold a shared reference.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{POWER_VOLTAGE_MAX, SIGNAL_VOLTAGE_MAX};

/// Measurement point readable through [`AnalogIo::read_voltage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputNode {
    PowerVoltage,
    /// Floating ground behind the current limiter.
    PowerGround,
    /// Current sense, already scaled to amperes.
    PowerCurrent,
    SignalOutA,
    SignalInA,
    SignalOutB,
    SignalInB,
}

/// Writable output driven through [`AnalogIo::set_output_voltage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputNode {
    PowerVoltage,
    PowerCurrentLimit,
    SignalA,
    SignalB,
}

impl OutputNode {
    pub const ALL: [OutputNode; 4] = [
        OutputNode::PowerVoltage,
        OutputNode::PowerCurrentLimit,
        OutputNode::SignalA,
        OutputNode::SignalB,
    ];
}

/// One of the three physical DUT channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    #[serde(rename = "power", alias = "CH1")]
    Power,
    #[serde(rename = "signal_a", alias = "CH2")]
    SignalA,
    #[serde(rename = "signal_b", alias = "CH3")]
    SignalB,
}

impl Channel {
    pub fn output(&self) -> OutputNode {
        match self {
            Channel::Power => OutputNode::PowerVoltage,
            Channel::SignalA => OutputNode::SignalA,
            Channel::SignalB => OutputNode::SignalB,
        }
    }

    /// Node on the driven side of the DUT.
    pub fn high_node(&self) -> InputNode {
        match self {
            Channel::Power => InputNode::PowerVoltage,
            Channel::SignalA => InputNode::SignalOutA,
            Channel::SignalB => InputNode::SignalOutB,
        }
    }

    /// Node on the return side of the DUT (top of the shunt).
    pub fn low_node(&self) -> InputNode {
        match self {
            Channel::Power => InputNode::PowerGround,
            Channel::SignalA => InputNode::SignalInA,
            Channel::SignalB => InputNode::SignalInB,
        }
    }

    /// Node sampled for frequency and transient responses.
    pub fn response_node(&self) -> InputNode {
        match self {
            Channel::Power => InputNode::PowerVoltage,
            Channel::SignalA => InputNode::SignalInA,
            Channel::SignalB => InputNode::SignalInB,
        }
    }

    /// Only the power stage has a current sense.
    pub fn current_node(&self) -> Option<InputNode> {
        match self {
            Channel::Power => Some(InputNode::PowerCurrent),
            Channel::SignalA | Channel::SignalB => None,
        }
    }

    pub fn max_output_voltage(&self) -> f64 {
        match self {
            Channel::Power => POWER_VOLTAGE_MAX,
            Channel::SignalA | Channel::SignalB => SIGNAL_VOLTAGE_MAX,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Power => "power",
            Channel::SignalA => "signal_a",
            Channel::SignalB => "signal_b",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Analog front-end collaborator.
///
/// `set_output_voltage` stages a value; `commit_outputs` latches every
/// staged DAC at once. A `false` return means the write was refused.
pub trait AnalogIo: Send + Sync {
    fn set_output_voltage(&self, output: OutputNode, volts: f64) -> bool;

    fn read_voltage(&self, input: InputNode) -> f64;

    fn commit_outputs(&self);

    fn read_aux_digital(&self, pin: u8) -> bool;

    fn read_aux_analog(&self, pin: u8) -> f64;

    /// Drive every output to zero and latch.
    fn zero_outputs(&self) {
        for output in OutputNode::ALL {
            self.set_output_voltage(output, 0.0);
        }
        self.commit_outputs();
    }
}
