use crate::opl::{ChipKind, ChipRequirement};
use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No OPL chip detected at port {port:#05x}")]
    NoOplDetected { port: u16 },

    #[error("Not a VGM file (bad magic)")]
    BadMagic,

    #[error("VGM version {0:#x} predates OPL support (need 0x151 or later)")]
    VersionTooOld(u32),

    #[error("VGM requires {required:?}, which cannot be played on {detected:?}")]
    UnsupportedChips {
        required: ChipRequirement,
        detected: ChipKind,
    },

    #[error("VGM parse error: {0}")]
    VgmParse(String),

    #[error("Unexpected end of VGM data at offset {offset:#x}")]
    UnexpectedEof { offset: usize },

    #[error("Unknown VGM command {opcode:#04x} at offset {offset:#x}")]
    Decode { opcode: u8, offset: usize },

    #[error("No InterWave/GUS card found")]
    NoWavetableCard,

    #[error("Too many samples: {0}")]
    TooManySamples(usize),

    #[error("Sample memory exhausted: {needed} bytes needed, {available} available")]
    SampleMemory { needed: u64, available: u64 },

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
