//! Replayer settings

use crate::error::{Error, Result};
use crate::opl::DEFAULT_BASE_PORT;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Rate every VGM stream is timed against
pub const VGM_SAMPLE_RATE: u32 = 44100;

/// Loop count that means "loop forever"
pub const LOOP_FOREVER: u8 = 255;

/// Highest accepted timer divider
pub const MAX_DIVIDER: u8 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// OPL base I/O port
    pub port: u16,
    /// Loop-point seeks before the song ends; 255 loops forever
    pub loop_max: u8,
    /// The tick runs at 44100/divider Hz and accounts for `divider`
    /// samples per tick
    pub divider: u8,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_BASE_PORT,
            loop_max: LOOP_FOREVER,
            divider: 1,
        }
    }
}

impl PlayerConfig {
    pub fn from_json(text: &str) -> Result<PlayerConfig> {
        let config: PlayerConfig =
            serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<PlayerConfig> {
        PlayerConfig::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_DIVIDER).contains(&self.divider) {
            return Err(Error::Config(format!(
                "divider {} outside 1..={MAX_DIVIDER}",
                self.divider
            )));
        }
        Ok(())
    }

    /// Timer rate requested from the host
    pub fn timer_hz(&self) -> u32 {
        VGM_SAMPLE_RATE / self.divider.max(1) as u32
    }

    pub fn loops_forever(&self) -> bool {
        self.loop_max == LOOP_FOREVER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = PlayerConfig::from_json(r#"{ "loop_max": 2 }"#).unwrap();
        assert_eq!(config.port, 0x388);
        assert_eq!(config.loop_max, 2);
        assert_eq!(config.divider, 1);
        assert_eq!(config.timer_hz(), 44100);
    }

    #[test]
    fn test_divider_range() {
        assert!(PlayerConfig::from_json(r#"{ "divider": 0 }"#).is_err());
        assert!(PlayerConfig::from_json(r#"{ "divider": 101 }"#).is_err());
        let config = PlayerConfig::from_json(r#"{ "divider": 4 }"#).unwrap();
        assert_eq!(config.timer_hz(), 11025);
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            PlayerConfig::from_json("{ port: }"),
            Err(Error::Config(_))
        ));
    }
}
