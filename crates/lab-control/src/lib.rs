// ─────────────────────────────────────────────────────────────────────
// PocKETlab Core — Lab Control
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Control primitives shared by the measurement engines.
//!
//! Sample rings, VA output regulators, the state-space model and the
//! fixed-rate control loop thread.

pub mod realtime;
pub mod regulator;
pub mod ring;
pub mod state_space;
