//! VGM command opcodes and operand widths

use serde::Serialize;

/// VGM command opcodes the replayer cares about by name
pub mod opcode {
    pub const YM3812: u8 = 0x5A;
    pub const YM3526: u8 = 0x5B;
    pub const YMF262_PORT0: u8 = 0x5E;
    pub const YMF262_PORT1: u8 = 0x5F;
    pub const WAIT_NNNN: u8 = 0x61;
    pub const WAIT_60TH: u8 = 0x62;
    pub const WAIT_50TH: u8 = 0x63;
    pub const END: u8 = 0x66;
    pub const DATA_BLOCK: u8 = 0x67;
    pub const PCM_RAM_WRITE: u8 = 0x68;
    pub const WAIT_N_BASE: u8 = 0x70;
    pub const YM3812_2ND: u8 = 0xAA;
    pub const YM3526_2ND: u8 = 0xAB;
}

/// Samples per 1/60 second frame at 44100 Hz
pub const WAIT_60TH_SAMPLES: u32 = 735;

/// Samples per 1/50 second frame at 44100 Hz
pub const WAIT_50TH_SAMPLES: u32 = 882;

/// Version from which the reserved 0x40-0x4E commands carry two operands
pub const VERSION_WIDE_RESERVED: u32 = 0x160;

/// Data block header after the opcode: 0x66 marker, type, 32-bit size
pub const DATA_BLOCK_HEADER_LEN: usize = 6;

/// Which FM register file a VGM write command addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OplPort {
    /// 0x5A: YM3812, first chip
    Ym3812,
    /// 0x5B: YM3526, first chip
    Ym3526,
    /// 0x5E: YMF262 port 0
    Ymf262Port0,
    /// 0x5F: YMF262 port 1
    Ymf262Port1,
    /// 0xAA: YM3812, second chip
    Ym3812Second,
    /// 0xAB: YM3526, second chip
    Ym3526Second,
}

impl OplPort {
    pub fn from_opcode(op: u8) -> Option<OplPort> {
        match op {
            opcode::YM3812 => Some(OplPort::Ym3812),
            opcode::YM3526 => Some(OplPort::Ym3526),
            opcode::YMF262_PORT0 => Some(OplPort::Ymf262Port0),
            opcode::YMF262_PORT1 => Some(OplPort::Ymf262Port1),
            opcode::YM3812_2ND => Some(OplPort::Ym3812Second),
            opcode::YM3526_2ND => Some(OplPort::Ym3526Second),
            _ => None,
        }
    }

    pub fn opcode(self) -> u8 {
        match self {
            OplPort::Ym3812 => opcode::YM3812,
            OplPort::Ym3526 => opcode::YM3526,
            OplPort::Ymf262Port0 => opcode::YMF262_PORT0,
            OplPort::Ymf262Port1 => opcode::YMF262_PORT1,
            OplPort::Ym3812Second => opcode::YM3812_2ND,
            OplPort::Ym3526Second => opcode::YM3526_2ND,
        }
    }
}

/// Wait length encoded in the opcode itself, if any
pub fn implicit_wait(op: u8) -> Option<u32> {
    match op {
        opcode::WAIT_60TH => Some(WAIT_60TH_SAMPLES),
        opcode::WAIT_50TH => Some(WAIT_50TH_SAMPLES),
        0x70..=0x7F => Some((op - 0x6F) as u32),
        _ => None,
    }
}

/// Number of operand bytes after the opcode, or `None` for opcodes that are
/// not part of the format.
///
/// The data block (0x67) returns its fixed header length; the payload size
/// is read from that header.
pub fn operand_len(op: u8, version: u32) -> Option<usize> {
    let len = match op {
        0x30..=0x3F => 1,
        0x40..=0x4E => {
            if version < VERSION_WIDE_RESERVED {
                1
            } else {
                2
            }
        }
        0x4F | 0x50 => 1,
        0x51..=0x5F => 2,
        opcode::WAIT_NNNN => 2,
        opcode::WAIT_60TH | opcode::WAIT_50TH | opcode::END => 0,
        opcode::DATA_BLOCK => DATA_BLOCK_HEADER_LEN,
        opcode::PCM_RAM_WRITE => 11,
        // Short waits and YM2612 DAC-from-bank writes
        0x70..=0x8F => 0,
        0x90 | 0x91 | 0x95 => 4,
        0x92 => 5,
        0x93 => 10,
        0x94 => 1,
        0xA0..=0xBF => 2,
        0xC0..=0xDF => 3,
        0xE0..=0xFF => 4,
        _ => return None,
    };
    Some(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_waits() {
        for op in 0x70..=0x7Fu8 {
            let wait = implicit_wait(op).unwrap();
            assert_eq!(wait, (op - 0x6F) as u32);
            assert!((1..=16).contains(&wait));
        }
    }

    #[test]
    fn test_frame_waits() {
        assert_eq!(implicit_wait(0x62), Some(735));
        assert_eq!(implicit_wait(0x63), Some(882));
        assert_eq!(implicit_wait(0x61), None);
    }

    #[test]
    fn test_reserved_width_depends_on_version() {
        assert_eq!(operand_len(0x41, 0x151), Some(1));
        assert_eq!(operand_len(0x41, 0x160), Some(2));
        assert_eq!(operand_len(0x4F, 0x171), Some(1));
    }

    #[test]
    fn test_operand_widths() {
        assert_eq!(operand_len(0x5A, 0x151), Some(2));
        assert_eq!(operand_len(0x68, 0x151), Some(11));
        assert_eq!(operand_len(0x92, 0x151), Some(5));
        assert_eq!(operand_len(0x93, 0x151), Some(10));
        assert_eq!(operand_len(0xC5, 0x151), Some(3));
        assert_eq!(operand_len(0xE1, 0x151), Some(4));
        assert_eq!(operand_len(0x67, 0x151), Some(6));
    }

    #[test]
    fn test_unknown_opcodes() {
        for op in [0x00u8, 0x2F, 0x60, 0x64, 0x65, 0x69, 0x6F, 0x96, 0x9F] {
            assert_eq!(operand_len(op, 0x171), None, "opcode {op:#04x}");
        }
    }

    #[test]
    fn test_opl_ports() {
        for op in [0x5A, 0x5B, 0x5E, 0x5F, 0xAA, 0xAB] {
            assert_eq!(OplPort::from_opcode(op).map(OplPort::opcode), Some(op));
        }
        assert_eq!(OplPort::from_opcode(0xAE), None);
    }
}
