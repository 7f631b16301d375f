//! InterWave device options

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// First and last port scanned when none is configured
pub const PROBE_PORTS: std::ops::RangeInclusive<u16> = 0x220..=0x260;

/// Port step between scanned addresses
pub const PROBE_STEP: usize = 0x10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterWaveConfig {
    /// Card base port; `None` scans 0x220-0x260
    pub port: Option<u16>,
    /// IRQ line for the card's own timer
    pub irq: Option<u8>,
    /// Tick from the card timer instead of the host timer when an IRQ is set
    pub card_timer: bool,
    /// Run the reverb generator on voices 28-31 (InterWave only)
    pub effects: bool,
    /// Keep the reverb voices free even if the player asks for more channels
    pub force_effects: bool,
}

impl Default for InterWaveConfig {
    fn default() -> Self {
        Self {
            port: None,
            irq: None,
            card_timer: true,
            effects: true,
            force_effects: false,
        }
    }
}

impl InterWaveConfig {
    pub fn from_json(text: &str) -> Result<InterWaveConfig> {
        serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<InterWaveConfig> {
        InterWaveConfig::from_json(&std::fs::read_to_string(path)?)
    }

    /// Ports to try, in order
    pub fn candidate_ports(&self) -> Vec<u16> {
        match self.port {
            Some(port) => vec![port],
            None => PROBE_PORTS.step_by(PROBE_STEP).collect(),
        }
    }

    /// Card timer is only used when there is a line to deliver it on
    pub fn wants_card_timer(&self) -> bool {
        self.card_timer && self.irq.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_order() {
        let config = InterWaveConfig::default();
        assert_eq!(
            config.candidate_ports(),
            vec![0x220, 0x230, 0x240, 0x250, 0x260]
        );
        let config = InterWaveConfig::from_json(r#"{ "port": 576 }"#).unwrap();
        assert_eq!(config.candidate_ports(), vec![0x240]);
    }

    #[test]
    fn test_card_timer_needs_irq() {
        let mut config = InterWaveConfig::default();
        assert!(!config.wants_card_timer());
        config.irq = Some(11);
        assert!(config.wants_card_timer());
    }
}
