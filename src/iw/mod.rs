//! AMD InterWave / Gravis Ultrasound wavetable voice engine
//!
//! A sample-based player drives the card through [`ChannelControl`]: it
//! uploads its samples once, opens a number of channels, then on every tick
//! adjusts per-channel parameters with [`ChannelControl::set`]. The engine
//! turns the accumulated changes into voice register writes at the start of
//! the next tick.
//!
//! GF1 (original Ultrasound) and AMD (InterWave) parts share this engine;
//! [`GusKind`] selects the places where their registers differ.

pub mod card;
pub mod config;
pub mod engine;
pub mod memory;
pub mod sample;
pub mod voice;

pub use card::Card;
pub use config::InterWaveConfig;
pub use engine::InterWave;
pub use memory::{MemoryLayout, VolumeTable};
pub use sample::{SampleData, SampleInfo, SampleType};
pub use voice::{Direction, LoopSelect, Voice};

use crate::error::Result;
use serde::Serialize;

/// Hardware voices on the card
pub const VOICES: usize = 32;

/// Voices the reverb generator takes when effects are on
pub const EFFECT_VOICES: std::ops::Range<usize> = 28..32;

/// Fewest voices a GF1 can be programmed for
pub const GF1_MIN_VOICES: usize = 14;

/// Samples a single upload may carry
pub const MAX_SAMPLES: usize = 256;

/// Which Ultrasound generation was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GusKind {
    /// Gravis GF1: one 1 MiB bank, logarithmic volume, 4-bit pan
    Gf1,
    /// AMD InterWave: four 4 MiB banks, per-side volume offsets, effects
    Amd,
}

/// Player-visible parameters, global (`Master*`, `Speed`, timers) or per
/// channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Param {
    MasterVolume,
    MasterPanning,
    MasterBalance,
    MasterSurround,
    MasterSpeed,
    MasterPitch,
    MasterBass,
    MasterTreble,
    MasterReverb,
    MasterChorus,
    MasterPause,
    MasterFilter,
    MasterAmplify,
    /// Ticks per second in 1/256 Hz
    Speed,
    Volume,
    Panning,
    PanY,
    PanZ,
    Surround,
    Position,
    /// Note relative to 8363 Hz in 1/256 semitones
    Pitch,
    /// Fixed playback rate in 1/65536 of the sample rate
    PitchFix,
    /// Amiga-style period relative to 6848
    Pitch6848,
    Stop,
    Reset,
    Bass,
    Treble,
    Reverb,
    Chorus,
    Mute,
    Status,
    Instrument,
    Loop,
    Direct,
    FilterFreq,
    FilterRez,
    /// Host time in 1/65536 s
    Timer,
    /// Player time in 1/65536 s
    CmdTimer,
    Restrict,
}

/// Channel-mixer interface a sample-based player drives
pub trait ChannelControl {
    /// Upload every sample the song uses, reducing them if memory is short.
    /// Sample types are updated to reflect any reduction applied.
    fn load_samples(&mut self, samples: &mut [SampleInfo]) -> Result<()>;

    /// Start ticking `player` with `channels` channels; returns the channel
    /// count actually granted.
    fn open_player(&mut self, channels: usize, player: Box<dyn ChannelPlayer>) -> Result<usize>;

    fn close_player(&mut self);

    fn set(&mut self, channel: usize, param: Param, value: i32);

    fn get(&mut self, channel: usize, param: Param) -> i32;
}

/// Song logic called once per engine tick
pub trait ChannelPlayer {
    fn tick(&mut self, control: &mut dyn ChannelControl);
}

/// Frequency for `note` 1/256-semitones above 8363 Hz
pub fn freq8363(note: i32) -> u32 {
    let freq = 8363.0 * (note as f64 / 3072.0).exp2();
    freq.round().clamp(0.0, u32::MAX as f64) as u32
}

/// `a * b / c` in 64-bit, 0 when `c` is 0
pub(crate) fn umuldiv(a: u64, b: u64, c: u64) -> u64 {
    if c == 0 {
        return 0;
    }
    a * b / c
}

/// `a * b / c` rounded to nearest
pub(crate) fn umuldivrnd(a: u64, b: u64, c: u64) -> u64 {
    if c == 0 {
        return 0;
    }
    (a * b + c / 2) / c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freq8363_octaves() {
        assert_eq!(freq8363(0), 8363);
        assert_eq!(freq8363(12 * 256), 16726);
        assert_eq!(freq8363(-12 * 256), 4182);
    }

    #[test]
    fn test_rounding_division() {
        assert_eq!(umuldiv(10, 10, 3), 33);
        assert_eq!(umuldivrnd(10, 10, 3), 33);
        assert_eq!(umuldivrnd(10, 10, 6), 17);
        assert_eq!(umuldivrnd(1, 1, 0), 0);
    }
}
