//! VGM header definitions and parsing

use super::reader::VgmReader;
use crate::error::{Error, Result};
use serde::Serialize;

/// "Vgm " identifier
pub const VGM_MAGIC: &[u8; 4] = b"Vgm ";

/// Oldest version that carries the OPL clock fields
pub const MIN_VERSION: u32 = 0x151;

/// Data start used when the header leaves the data offset at zero
pub const DEFAULT_DATA_START: usize = 0x40;

/// Header size written by [`super::builder::VgmBuilder`]
pub const VGM_HEADER_SIZE: usize = 0x80;

/// Clock-field bit flagging a second chip of the same type
pub const DUAL_CHIP_FLAG: u32 = 0x4000_0000;

/// VGM header offsets (in bytes)
pub mod offset {
    /// "Vgm " identifier
    pub const IDENT: usize = 0x00;
    /// End of file offset (relative to 0x04)
    pub const EOF_OFFSET: usize = 0x04;
    /// Version number
    pub const VERSION: usize = 0x08;
    /// GD3 offset (relative to 0x14)
    pub const GD3_OFFSET: usize = 0x14;
    /// Total samples
    pub const TOTAL_SAMPLES: usize = 0x18;
    /// Loop offset (relative to 0x1C)
    pub const LOOP_OFFSET: usize = 0x1C;
    /// Loop samples
    pub const LOOP_SAMPLES: usize = 0x20;
    /// Recording rate
    pub const RATE: usize = 0x24;
    /// VGM data offset (relative to 0x34)
    pub const DATA_OFFSET: usize = 0x34;
    /// YM3812 clock
    pub const YM3812_CLOCK: usize = 0x50;
    /// YM3526 clock
    pub const YM3526_CLOCK: usize = 0x54;
    /// YMF262 clock
    pub const YMF262_CLOCK: usize = 0x5C;
    /// Loop base
    pub const LOOP_BASE: usize = 0x7E;
    /// Loop modifier
    pub const LOOP_MODIFIER: usize = 0x7F;
}

/// Clock field of one chip type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChipClock(pub u32);

impl ChipClock {
    pub fn is_present(self) -> bool {
        self.hz() != 0
    }

    pub fn is_dual(self) -> bool {
        self.0 & DUAL_CHIP_FLAG != 0
    }

    /// Clock in Hz with the flag bits removed
    pub fn hz(self) -> u32 {
        self.0 & 0x3FFF_FFFF
    }
}

/// Parsed VGM header information
#[derive(Debug, Clone, Default, Serialize)]
pub struct VgmHeader {
    pub version: u32,
    pub eof_offset: u32,
    pub gd3_offset: u32,
    pub total_samples: u32,
    pub loop_offset: u32,
    pub loop_samples: u32,
    pub rate: u32,
    pub data_offset: u32,
    pub ym3812: ChipClock,
    pub ym3526: ChipClock,
    pub ymf262: ChipClock,
    pub loop_base: i8,
    pub loop_modifier: u8,
}

impl VgmHeader {
    /// Validate magic and version and read the fields the replayer uses.
    ///
    /// Fields that would lie inside the command stream (old, short headers)
    /// read as zero.
    pub fn parse(data: &[u8]) -> Result<VgmHeader> {
        if data.len() < DEFAULT_DATA_START {
            return Err(Error::VgmParse("file too small for VGM header".into()));
        }
        if &data[offset::IDENT..offset::IDENT + 4] != VGM_MAGIC {
            return Err(Error::BadMagic);
        }

        let reader = VgmReader::new(data);
        let version = reader.peek_u32_at(offset::VERSION)?;
        if version < MIN_VERSION {
            return Err(Error::VersionTooOld(version));
        }

        let mut header = VgmHeader {
            version,
            eof_offset: reader.peek_u32_at(offset::EOF_OFFSET)?,
            gd3_offset: reader.peek_u32_at(offset::GD3_OFFSET)?,
            total_samples: reader.peek_u32_at(offset::TOTAL_SAMPLES)?,
            loop_offset: reader.peek_u32_at(offset::LOOP_OFFSET)?,
            loop_samples: reader.peek_u32_at(offset::LOOP_SAMPLES)?,
            rate: reader.peek_u32_at(offset::RATE)?,
            data_offset: reader.peek_u32_at(offset::DATA_OFFSET)?,
            ..VgmHeader::default()
        };

        let data_start = header.data_start();
        if data_start > data.len() {
            return Err(Error::VgmParse(format!(
                "data offset {data_start:#x} past end of file ({:#x})",
                data.len()
            )));
        }

        let field = |at: usize| -> u32 {
            if at + 4 <= data_start {
                reader.peek_u32_at(at).unwrap_or(0)
            } else {
                0
            }
        };
        header.ym3812 = ChipClock(field(offset::YM3812_CLOCK));
        header.ym3526 = ChipClock(field(offset::YM3526_CLOCK));
        header.ymf262 = ChipClock(field(offset::YMF262_CLOCK));

        if offset::LOOP_MODIFIER < data_start {
            header.loop_base = reader.peek_u8_at(offset::LOOP_BASE).unwrap_or(0) as i8;
            header.loop_modifier = reader.peek_u8_at(offset::LOOP_MODIFIER).unwrap_or(0);
        }

        Ok(header)
    }

    /// Absolute offset of the first command
    pub fn data_start(&self) -> usize {
        if self.data_offset == 0 {
            DEFAULT_DATA_START
        } else {
            self.data_offset as usize + offset::DATA_OFFSET
        }
    }

    /// Absolute loop point, if the file loops
    pub fn loop_start(&self) -> Option<usize> {
        (self.loop_offset > 0).then(|| self.loop_offset as usize + offset::LOOP_OFFSET)
    }

    /// Absolute offset of the GD3 tag, if any
    pub fn gd3_start(&self) -> Option<usize> {
        (self.gd3_offset > 0).then(|| self.gd3_offset as usize + offset::GD3_OFFSET)
    }

    /// Absolute end of file as declared by the header
    pub fn eof(&self) -> usize {
        self.eof_offset as usize + offset::EOF_OFFSET
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vgm::builder::VgmBuilder;

    #[test]
    fn test_rejects_bad_magic() {
        let mut image = VgmBuilder::new().end().build();
        image[0] = b'X';
        assert!(matches!(VgmHeader::parse(&image), Err(Error::BadMagic)));
    }

    #[test]
    fn test_rejects_old_version() {
        let image = VgmBuilder::new().version(0x150).end().build();
        assert!(matches!(
            VgmHeader::parse(&image),
            Err(Error::VersionTooOld(0x150))
        ));
    }

    #[test]
    fn test_rejects_truncated_file() {
        assert!(matches!(
            VgmHeader::parse(b"Vgm \x00\x00"),
            Err(Error::VgmParse(_))
        ));
    }

    #[test]
    fn test_offsets_are_relative() {
        let image = VgmBuilder::new()
            .ym3812(3_579_545)
            .wait(10)
            .loop_here()
            .opl(0x5A, 0x20, 0x01)
            .end()
            .build();
        let header = VgmHeader::parse(&image).unwrap();
        assert_eq!(header.data_start(), VGM_HEADER_SIZE);
        assert_eq!(header.loop_start(), Some(VGM_HEADER_SIZE + 1));
        assert_eq!(header.eof(), image.len());
        assert_eq!(header.ym3812.hz(), 3_579_545);
        assert!(!header.ym3812.is_dual());
    }

    #[test]
    fn test_zero_data_offset_defaults() {
        let mut image = VgmBuilder::new().end().build();
        image[offset::DATA_OFFSET..offset::DATA_OFFSET + 4].fill(0);
        let header = VgmHeader::parse(&image).unwrap();
        assert_eq!(header.data_start(), DEFAULT_DATA_START);
        // Clock fields now overlap the stream and are ignored
        assert!(!header.ym3812.is_present());
    }

    #[test]
    fn test_dual_flag() {
        let clock = ChipClock(3_579_545 | DUAL_CHIP_FLAG);
        assert!(clock.is_dual());
        assert_eq!(clock.hz(), 3_579_545);
    }
}
