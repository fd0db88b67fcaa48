// ─────────────────────────────────────────────────────────────────────
// PocKETlab Core — Application Context
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use crate::postman::{Messenger, Postman};
use lab_types::config::EngineConfig;
use lab_types::io::{AnalogIo, Channel};
use std::sync::Arc;

/// Collaborators and configuration, assembled once at the top level and
/// lent to every component.
pub struct LabContext {
    pub io: Arc<dyn AnalogIo>,
    pub postman: Postman,
    pub config: EngineConfig,
}

impl LabContext {
    pub fn new(io: Arc<dyn AnalogIo>, messenger: Arc<dyn Messenger>, config: EngineConfig) -> Self {
        LabContext {
            io,
            postman: Postman::new(messenger),
            config,
        }
    }

    /// Output ceiling of a channel under the configured limits.
    pub fn channel_max(&self, channel: Channel) -> f64 {
        self.config.limits.max_output(channel)
    }
}
