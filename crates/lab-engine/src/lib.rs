// ─────────────────────────────────────────────────────────────────────
// PocKETlab Core — Lab Engine
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Measurement and control engine of the PocKETlab instrument.
//!
//! Commands come in through [`runtime::LabRuntime::submit`], the mode
//! arbiter drives one engine at a time, and results leave through the
//! [`postman::Messenger`] collaborator.

pub mod arbiter;
pub mod batcher;
pub mod command;
pub mod context;
pub mod messages;
pub mod modes;
pub mod postman;
pub mod runtime;
pub mod sim;
