//! Yamaha OPL family hardware: detection, chip mapping, register shadow

pub mod detect;
pub mod device;
pub mod mapping;
pub mod shadow;

pub use detect::detect;
pub use device::OplDevice;
pub use mapping::{ChipMapping, ChipRequirement};
pub use shadow::RegisterShadow;

use serde::Serialize;

/// Default AdLib base port
pub const DEFAULT_BASE_PORT: u16 = 0x388;

/// FM hardware found by [`detect`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChipKind {
    None,
    Opl2,
    DualOpl2,
    Opl3,
}

impl ChipKind {
    /// Bus settle delays appropriate for this chip
    pub fn timing(self) -> WriteTiming {
        match self {
            ChipKind::Opl3 => WriteTiming::OPL3,
            _ => WriteTiming::OPL2,
        }
    }

    /// Whether registers 0x100-0x1FF reach real hardware
    pub fn has_secondary_bank(self) -> bool {
        matches!(self, ChipKind::DualOpl2 | ChipKind::Opl3)
    }

    pub fn name(self) -> &'static str {
        match self {
            ChipKind::None => "none",
            ChipKind::Opl2 => "OPL2",
            ChipKind::DualOpl2 => "Dual OPL2",
            ChipKind::Opl3 => "OPL3",
        }
    }
}

/// Settle delays after the register-select and data writes, in ISA read cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WriteTiming {
    pub register: u8,
    pub data: u8,
}

impl WriteTiming {
    /// YM3812 needs 3.3us after the address and 23us after the data write
    pub const OPL2: WriteTiming = WriteTiming {
        register: 12,
        data: 64,
    };

    pub const OPL3: WriteTiming = WriteTiming {
        register: 4,
        data: 4,
    };
}
