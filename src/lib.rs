//! VGM replayer for ISA OPL hardware and an InterWave/GUS wavetable voice
//! engine, both driven from a host timer interrupt.

pub mod error;
pub mod hw;
pub mod iw;
pub mod opl;
pub mod player;
pub mod vgm;

pub use error::{Error, Result};
pub use iw::{InterWave, InterWaveConfig};
pub use player::{PlayState, Player, PlayerConfig};
