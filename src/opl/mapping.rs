//! Matching a file's FM chip requirement to the detected hardware

use super::ChipKind;
use crate::error::{Error, Result};
use crate::vgm::{OplPort, OplWrite, VgmHeader};
use serde::Serialize;

/// Port offset that feeds both chips of a dual-OPL2 card at once
pub const DUAL_OPL2_MIRROR_OFFSET: u16 = 8;

/// Waveform-select enable register
const REG_WAVE_SELECT_ENABLE: u8 = 0x01;

/// Channel feedback/connection/output registers
const PAN_REGISTERS: std::ops::RangeInclusive<u8> = 0xC0..=0xC8;

/// Output bits of the 0xC0 block on an OPL3: A (left) and B (right)
const PAN_LEFT: u8 = 0x10;
const PAN_RIGHT: u8 = 0x20;

/// What the file's header clock fields ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChipRequirement {
    Opl1,
    Opl2,
    Opl3,
    DualOpl1,
    DualOpl2,
    /// One YM3526 plus one YM3812
    Opl1Opl2,
    /// Dual YMF262, or no FM chip at all
    Unsupported,
}

impl ChipRequirement {
    /// Classify from the YM3812, YM3526 and YMF262 clock fields.
    ///
    /// A YMF262 wins over everything else; a dual YMF262 is unsupported.
    pub fn from_header(header: &VgmHeader) -> ChipRequirement {
        if header.ymf262.is_present() {
            return if header.ymf262.is_dual() {
                ChipRequirement::Unsupported
            } else {
                ChipRequirement::Opl3
            };
        }

        let opl2 = header.ym3812.is_present().then(|| header.ym3812.is_dual());
        let opl1 = header.ym3526.is_present().then(|| header.ym3526.is_dual());

        match (opl1, opl2) {
            (Some(true), _) => ChipRequirement::DualOpl1,
            (Some(false), Some(false)) => ChipRequirement::Opl1Opl2,
            // a single YM3526 next to a dual YM3812 plays as plain OPL1
            (Some(false), Some(true) | None) => ChipRequirement::Opl1,
            (None, Some(true)) => ChipRequirement::DualOpl2,
            (None, Some(false)) => ChipRequirement::Opl2,
            (None, None) => ChipRequirement::Unsupported,
        }
    }

    /// Channels the content can use
    pub fn channels(self) -> u8 {
        match self {
            ChipRequirement::Opl1 | ChipRequirement::Opl2 => 9,
            ChipRequirement::Unsupported => 0,
            _ => 18,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ChipRequirement::Opl1 => "OPL1",
            ChipRequirement::Opl2 => "OPL2",
            ChipRequirement::Opl3 => "OPL3",
            ChipRequirement::DualOpl1 => "Dual OPL1",
            ChipRequirement::DualOpl2 => "Dual OPL2",
            ChipRequirement::Opl1Opl2 => "OPL1 + OPL2",
            ChipRequirement::Unsupported => "unsupported",
        }
    }
}

/// How a file's register writes reach the detected chip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChipMapping {
    pub requirement: ChipRequirement,
    pub detected: ChipKind,
    /// Added to the base port for every write
    pub port_offset: u16,
    /// Two OPL2 streams panned hard left/right on the two OPL3 banks
    pub dual_on_opl3: bool,
}

impl ChipMapping {
    /// Decide whether `requirement` can play on `detected`, and how.
    pub fn new(requirement: ChipRequirement, detected: ChipKind) -> Result<ChipMapping> {
        use ChipKind as K;
        use ChipRequirement as R;

        let port_offset = match (requirement, detected) {
            (_, K::None) => None,
            (R::Opl1 | R::Opl2, K::Opl2 | K::Opl3) => Some(0),
            (R::Opl1 | R::Opl2, K::DualOpl2) => Some(DUAL_OPL2_MIRROR_OFFSET),
            (R::Opl3, K::Opl3) => Some(0),
            (R::DualOpl1 | R::DualOpl2, K::DualOpl2 | K::Opl3) => Some(0),
            _ => None,
        };

        let port_offset = port_offset.ok_or(Error::UnsupportedChips {
            required: requirement,
            detected,
        })?;

        Ok(ChipMapping {
            requirement,
            detected,
            port_offset,
            dual_on_opl3: requirement == R::DualOpl2 && detected == K::Opl3,
        })
    }

    /// Logical register and value for a stream write, or `None` when the
    /// write must not reach the hardware.
    pub fn route(&self, write: OplWrite) -> Option<(u16, u8)> {
        let register = write.register as u16;
        let mut value = write.value;

        match write.port {
            OplPort::Ym3812 => {
                if self.dual_on_opl3 && PAN_REGISTERS.contains(&write.register) {
                    value = (value & 0x0F) | PAN_LEFT;
                }
                Some((register, value))
            }
            OplPort::Ym3526 | OplPort::Ymf262Port0 => Some((register, value)),
            OplPort::Ymf262Port1 | OplPort::Ym3526Second => Some((register + 0x100, value)),
            OplPort::Ym3812Second => {
                if self.dual_on_opl3 {
                    // Wave-select enable in the OPL3 high bank mutes the whole chip
                    if write.register == REG_WAVE_SELECT_ENABLE {
                        return None;
                    }
                    if PAN_REGISTERS.contains(&write.register) {
                        value = (value & 0x0F) | PAN_RIGHT;
                    }
                }
                Some((register + 0x100, value))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vgm::VgmBuilder;

    fn classify(builder: VgmBuilder) -> ChipRequirement {
        let image = builder.end().build();
        ChipRequirement::from_header(&VgmHeader::parse(&image).unwrap())
    }

    fn write(port: OplPort, register: u8, value: u8) -> OplWrite {
        OplWrite {
            port,
            register,
            value,
        }
    }

    const CLOCK: u32 = 3_579_545;

    #[test]
    fn test_classification() {
        assert_eq!(classify(VgmBuilder::new().ym3812(CLOCK)), ChipRequirement::Opl2);
        assert_eq!(classify(VgmBuilder::new().ym3812_dual(CLOCK)), ChipRequirement::DualOpl2);
        assert_eq!(classify(VgmBuilder::new().ym3526(CLOCK)), ChipRequirement::Opl1);
        assert_eq!(classify(VgmBuilder::new().ym3526_dual(CLOCK)), ChipRequirement::DualOpl1);
        assert_eq!(
            classify(VgmBuilder::new().ym3812(CLOCK).ym3526(CLOCK)),
            ChipRequirement::Opl1Opl2
        );
        assert_eq!(
            classify(VgmBuilder::new().ym3526(CLOCK).ym3812_dual(CLOCK)),
            ChipRequirement::Opl1
        );
        assert_eq!(
            classify(VgmBuilder::new().ym3812(CLOCK).ymf262(CLOCK * 4)),
            ChipRequirement::Opl3
        );
        assert_eq!(
            classify(VgmBuilder::new().ymf262((CLOCK * 4) | 0x4000_0000)),
            ChipRequirement::Unsupported
        );
        assert_eq!(classify(VgmBuilder::new()), ChipRequirement::Unsupported);
    }

    #[test]
    fn test_mapping_table() {
        use ChipKind as K;
        use ChipRequirement as R;

        let offset = |r, k| ChipMapping::new(r, k).ok().map(|m| m.port_offset);

        assert_eq!(offset(R::Opl2, K::Opl2), Some(0));
        assert_eq!(offset(R::Opl1, K::Opl3), Some(0));
        assert_eq!(offset(R::Opl2, K::DualOpl2), Some(8));
        assert_eq!(offset(R::Opl3, K::Opl3), Some(0));
        assert_eq!(offset(R::Opl3, K::DualOpl2), None);
        assert_eq!(offset(R::DualOpl2, K::Opl2), None);
        assert_eq!(offset(R::DualOpl2, K::DualOpl2), Some(0));
        assert_eq!(offset(R::DualOpl1, K::Opl3), Some(0));
        assert_eq!(offset(R::Opl1Opl2, K::Opl3), None);
        assert_eq!(offset(R::Opl1Opl2, K::DualOpl2), None);
        assert_eq!(offset(R::Opl2, K::None), None);
        assert_eq!(offset(R::Unsupported, K::Opl3), None);
    }

    #[test]
    fn test_dual_opl2_on_opl3_panning() {
        let mapping = ChipMapping::new(ChipRequirement::DualOpl2, ChipKind::Opl3).unwrap();
        assert!(mapping.dual_on_opl3);
        assert_eq!(
            mapping.route(write(OplPort::Ym3812, 0xC0, 0x0F)),
            Some((0xC0, 0x1F))
        );
        assert_eq!(
            mapping.route(write(OplPort::Ym3812Second, 0xC0, 0x0F)),
            Some((0x1C0, 0x2F))
        );
        // Stereo bits already set by the file are replaced, not merged
        assert_eq!(
            mapping.route(write(OplPort::Ym3812Second, 0xC8, 0x31)),
            Some((0x1C8, 0x21))
        );
    }

    #[test]
    fn test_waveform_registers_keep_their_data() {
        let mapping = ChipMapping::new(ChipRequirement::DualOpl2, ChipKind::Opl3).unwrap();
        assert_eq!(
            mapping.route(write(OplPort::Ym3812, 0xE0, 0x03)),
            Some((0xE0, 0x03))
        );
    }

    #[test]
    fn test_second_chip_wave_select_dropped() {
        let mapping = ChipMapping::new(ChipRequirement::DualOpl2, ChipKind::Opl3).unwrap();
        assert_eq!(mapping.route(write(OplPort::Ym3812Second, 0x01, 0x20)), None);
        assert_eq!(
            mapping.route(write(OplPort::Ym3812, 0x01, 0x20)),
            Some((0x01, 0x20))
        );
    }

    #[test]
    fn test_real_dual_opl2_passes_through() {
        let mapping = ChipMapping::new(ChipRequirement::DualOpl2, ChipKind::DualOpl2).unwrap();
        assert!(!mapping.dual_on_opl3);
        assert_eq!(
            mapping.route(write(OplPort::Ym3812Second, 0x01, 0x20)),
            Some((0x101, 0x20))
        );
        assert_eq!(
            mapping.route(write(OplPort::Ym3812Second, 0xC0, 0x0F)),
            Some((0x1C0, 0x0F))
        );
    }

    #[test]
    fn test_opl3_port1_uses_high_bank() {
        let mapping = ChipMapping::new(ChipRequirement::Opl3, ChipKind::Opl3).unwrap();
        assert_eq!(
            mapping.route(write(OplPort::Ymf262Port1, 0x05, 0x01)),
            Some((0x105, 0x01))
        );
    }
}
