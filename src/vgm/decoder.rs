//! Sequential VGM command decoder

use super::commands::{self, opcode, OplPort, DATA_BLOCK_HEADER_LEN};
use super::header::VgmHeader;
use super::reader::VgmReader;
use crate::error::{Error, Result};
use serde::Serialize;

/// Data block sizes carry a "compressed" flag in bit 31
const DATA_BLOCK_SIZE_MASK: u32 = 0x7FFF_FFFF;

/// One FM register write taken from the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OplWrite {
    pub port: OplPort,
    pub register: u8,
    pub value: u8,
}

/// Result of decoding one command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    OplWrite(OplWrite),
    /// Samples added to the decoded position
    Wait(u32),
    /// A recognised command this replayer has no use for
    Skipped(u8),
    /// Explicit end-of-stream (0x66)
    End,
    /// Ran off the end of the data, or hit an unknown opcode inside the GD3 tag
    ImplicitEnd,
}

impl Decoded {
    pub fn is_end(&self) -> bool {
        matches!(self, Decoded::End | Decoded::ImplicitEnd)
    }
}

/// Cursor state for walking one file's command stream.
///
/// The decoder does not own the image; every call takes the same byte
/// slice the decoder was created for.
#[derive(Debug, Clone)]
pub struct StreamDecoder {
    pos: usize,
    sample_position: u64,
    version: u32,
    data_start: usize,
    gd3_start: Option<usize>,
    end: usize,
}

impl StreamDecoder {
    pub fn new(header: &VgmHeader, data_len: usize) -> Self {
        let end = match header.eof() {
            eof if eof > header.data_start() && eof < data_len => eof,
            _ => data_len,
        };
        Self {
            pos: header.data_start(),
            sample_position: 0,
            version: header.version,
            data_start: header.data_start(),
            gd3_start: header.gd3_start(),
            end,
        }
    }

    /// Byte offset of the next command
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Samples decoded so far
    pub fn sample_position(&self) -> u64 {
        self.sample_position
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Back to the first command with the sample position at zero
    pub fn rewind(&mut self) {
        self.pos = self.data_start;
        self.sample_position = 0;
    }

    /// Decode the command at the cursor and advance past it.
    ///
    /// Only an unknown opcode before the GD3 tag is an error; a command cut
    /// short by the end of the file ends the stream.
    pub fn decode_next(&mut self, data: &[u8]) -> Result<Decoded> {
        let data = &data[..self.end.min(data.len())];
        let mut reader = VgmReader::at(data, self.pos);
        let at = self.pos;

        let Ok(op) = reader.read_u8() else {
            return Ok(Decoded::ImplicitEnd);
        };

        let decoded = match self.decode_body(op, &mut reader) {
            Ok(Some(decoded)) => decoded,
            Ok(None) => {
                if self.gd3_start.is_some_and(|gd3| at >= gd3) {
                    log::debug!("opcode {op:#04x} inside GD3 tag at {at:#x}, treating as end");
                    Decoded::ImplicitEnd
                } else {
                    return Err(Error::Decode { opcode: op, offset: at });
                }
            }
            Err(_) => {
                log::debug!("command {op:#04x} at {at:#x} truncated by end of file");
                self.pos = data.len();
                return Ok(Decoded::ImplicitEnd);
            }
        };

        if !matches!(decoded, Decoded::ImplicitEnd) {
            self.pos = reader.position();
        }
        if let Decoded::Wait(samples) = decoded {
            self.sample_position += samples as u64;
        }
        Ok(decoded)
    }

    /// `Ok(None)` for an opcode outside the format
    fn decode_body(&self, op: u8, reader: &mut VgmReader) -> Result<Option<Decoded>> {
        if let Some(port) = OplPort::from_opcode(op) {
            let register = reader.read_u8()?;
            let value = reader.read_u8()?;
            return Ok(Some(Decoded::OplWrite(OplWrite {
                port,
                register,
                value,
            })));
        }

        if let Some(samples) = commands::implicit_wait(op) {
            return Ok(Some(Decoded::Wait(samples)));
        }

        let decoded = match op {
            opcode::WAIT_NNNN => Decoded::Wait(reader.read_u16_le()? as u32),
            opcode::END => Decoded::End,
            opcode::DATA_BLOCK => {
                let header = reader.read_bytes(DATA_BLOCK_HEADER_LEN)?;
                let size = u32::from_le_bytes([header[2], header[3], header[4], header[5]]);
                reader.skip((size & DATA_BLOCK_SIZE_MASK) as usize)?;
                Decoded::Skipped(op)
            }
            _ => match commands::operand_len(op, self.version) {
                Some(len) => {
                    reader.skip(len)?;
                    Decoded::Skipped(op)
                }
                None => return Ok(None),
            },
        };
        Ok(Some(decoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vgm::builder::VgmBuilder;
    use crate::vgm::gd3::Gd3Tag;

    fn decode_all(image: &[u8]) -> Result<Vec<Decoded>> {
        let header = VgmHeader::parse(image)?;
        let mut decoder = StreamDecoder::new(&header, image.len());
        let mut out = Vec::new();
        loop {
            let decoded = decoder.decode_next(image)?;
            out.push(decoded);
            if decoded.is_end() {
                return Ok(out);
            }
        }
    }

    fn write(port: OplPort, register: u8, value: u8) -> Decoded {
        Decoded::OplWrite(OplWrite {
            port,
            register,
            value,
        })
    }

    #[test]
    fn test_minimal_stream() {
        let image = VgmBuilder::new()
            .raw(&[0x5A, 0x20, 0x00, 0x5A, 0x40, 0x3F, 0x61, 0x00, 0x01, 0x66])
            .build();
        assert_eq!(
            decode_all(&image).unwrap(),
            vec![
                write(OplPort::Ym3812, 0x20, 0x00),
                write(OplPort::Ym3812, 0x40, 0x3F),
                Decoded::Wait(256),
                Decoded::End,
            ]
        );
    }

    #[test]
    fn test_waits_accumulate() {
        let image = VgmBuilder::new()
            .raw(&[0x62, 0x63, 0x70, 0x7F, 0x61, 0x10, 0x00, 0x66])
            .build();
        let header = VgmHeader::parse(&image).unwrap();
        let mut decoder = StreamDecoder::new(&header, image.len());
        while !decoder.decode_next(&image).unwrap().is_end() {}
        assert_eq!(decoder.sample_position(), 735 + 882 + 1 + 16 + 16);
    }

    #[test]
    fn test_skips_foreign_commands() {
        let image = VgmBuilder::new()
            .raw(&[0x50, 0x9F]) // SN76489
            .raw(&[0x52, 0x28, 0xF0]) // YM2612
            .raw(&[0xC0, 0x00, 0x10, 0x7F]) // Sega PCM
            .raw(&[0xE0, 0x00, 0x00, 0x00, 0x00]) // PCM seek
            .raw(&[0xAE, 0x01, 0x02]) // second YMF262, unsupported
            .opl(0x5F, 0x05, 0x01)
            .end()
            .build();
        assert_eq!(
            decode_all(&image).unwrap(),
            vec![
                Decoded::Skipped(0x50),
                Decoded::Skipped(0x52),
                Decoded::Skipped(0xC0),
                Decoded::Skipped(0xE0),
                Decoded::Skipped(0xAE),
                write(OplPort::Ymf262Port1, 0x05, 0x01),
                Decoded::End,
            ]
        );
    }

    #[test]
    fn test_data_block_is_skipped() {
        let image = VgmBuilder::new()
            .data_block(0x00, &[1, 2, 3, 4, 5])
            .opl(0x5A, 0xB0, 0x20)
            .end()
            .build();
        let decoded = decode_all(&image).unwrap();
        assert_eq!(decoded[0], Decoded::Skipped(0x67));
        assert_eq!(decoded[1], write(OplPort::Ym3812, 0xB0, 0x20));
    }

    #[test]
    fn test_reserved_width_follows_version() {
        // 0x41 takes one operand before 1.60 and two from 1.60 on
        let old = VgmBuilder::new()
            .version(0x151)
            .raw(&[0x41, 0x00, 0x66])
            .build();
        assert_eq!(decode_all(&old).unwrap().len(), 2);

        let new = VgmBuilder::new()
            .version(0x160)
            .raw(&[0x41, 0x00, 0x00, 0x66])
            .build();
        assert_eq!(decode_all(&new).unwrap().len(), 2);
    }

    #[test]
    fn test_unknown_opcode_is_error() {
        let image = VgmBuilder::new().raw(&[0x70, 0x00]).end().build();
        match decode_all(&image) {
            Err(Error::Decode { opcode, offset }) => {
                assert_eq!(opcode, 0x00);
                assert_eq!(offset, crate::vgm::header::VGM_HEADER_SIZE + 1);
            }
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_opcode_in_gd3_is_end() {
        // No 0x66: the stream runs straight into the tag
        let image = VgmBuilder::new()
            .opl(0x5A, 0x20, 0x01)
            .gd3(&Gd3Tag::default())
            .build();
        let decoded = decode_all(&image).unwrap();
        assert_eq!(decoded[0], write(OplPort::Ym3812, 0x20, 0x01));
        // "Gd3 " itself parses as a reserved command before the space trips
        assert_eq!(decoded.last(), Some(&Decoded::ImplicitEnd));
    }

    #[test]
    fn test_truncated_command_is_end() {
        let image = VgmBuilder::new().raw(&[0x5A, 0x20]).build();
        assert_eq!(
            decode_all(&image).unwrap(),
            vec![Decoded::ImplicitEnd]
        );
    }

    #[test]
    fn test_rewind_resets_position() {
        let image = VgmBuilder::new().wait(100).end().build();
        let header = VgmHeader::parse(&image).unwrap();
        let mut decoder = StreamDecoder::new(&header, image.len());
        decoder.decode_next(&image).unwrap();
        assert_eq!(decoder.sample_position(), 100);
        decoder.rewind();
        assert_eq!(decoder.sample_position(), 0);
        assert_eq!(decoder.position(), header.data_start());
    }
}
