//! Byte cursor over an in-memory VGM image

use crate::error::{Error, Result};

/// Sequential little-endian reader with random-access peeks
#[derive(Debug, Clone)]
pub struct VgmReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> VgmReader<'a> {
    /// Create a new reader from raw VGM data
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Create a reader already positioned at `pos`
    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    /// Check if we've reached the end of data
    pub fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Get current position
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Read a single byte
    pub fn read_u8(&mut self) -> Result<u8> {
        let b = self.peek_u8_at(self.pos)?;
        self.pos += 1;
        Ok(b)
    }

    /// Read a 16-bit little-endian value
    pub fn read_u16_le(&mut self) -> Result<u16> {
        let lo = self.read_u8()? as u16;
        let hi = self.read_u8()? as u16;
        Ok(lo | (hi << 8))
    }

    /// Read a 32-bit little-endian value
    pub fn read_u32_le(&mut self) -> Result<u32> {
        let lo = self.read_u16_le()? as u32;
        let hi = self.read_u16_le()? as u32;
        Ok(lo | (hi << 16))
    }

    /// Borrow the next `len` bytes
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(Error::UnexpectedEof { offset: self.pos })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    /// Advance past `len` bytes without looking at them
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.read_bytes(len).map(|_| ())
    }

    /// Read a u32 at a specific offset without advancing position
    pub fn peek_u32_at(&self, offset: usize) -> Result<u32> {
        match self.data.get(offset..offset.saturating_add(4)) {
            Some(&[a, b, c, d]) => Ok(u32::from_le_bytes([a, b, c, d])),
            _ => Err(Error::UnexpectedEof { offset }),
        }
    }

    /// Read a u8 at a specific offset without advancing position
    pub fn peek_u8_at(&self, offset: usize) -> Result<u8> {
        self.data
            .get(offset)
            .copied()
            .ok_or(Error::UnexpectedEof { offset })
    }

    /// Read a null-terminated UTF-16LE string that must end before `limit`.
    ///
    /// Unpaired surrogates are dropped. Running into `limit` ends the string.
    pub fn read_utf16_string(&mut self, limit: usize) -> String {
        let limit = limit.min(self.data.len());
        let mut units = Vec::new();

        while self.pos + 2 <= limit {
            let code = u16::from_le_bytes([self.data[self.pos], self.data[self.pos + 1]]);
            self.pos += 2;
            if code == 0 {
                break;
            }
            units.push(code);
        }

        char::decode_utf16(units)
            .filter_map(|c| c.ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian_reads() {
        let data = [0x34, 0x12, 0x78, 0x56, 0x34, 0x12];
        let mut reader = VgmReader::new(&data);
        assert_eq!(reader.read_u16_le().unwrap(), 0x1234);
        assert_eq!(reader.read_u32_le().unwrap(), 0x12345678);
        assert!(reader.is_eof());
        assert!(reader.read_u8().is_err());
    }

    #[test]
    fn test_skip_past_end_fails() {
        let data = [0u8; 4];
        let mut reader = VgmReader::at(&data, 2);
        assert!(matches!(
            reader.skip(3),
            Err(Error::UnexpectedEof { offset: 2 })
        ));
        assert!(matches!(
            reader.peek_u32_at(1),
            Err(Error::UnexpectedEof { offset: 1 })
        ));
        assert_eq!(reader.position(), 2);
        assert!(reader.skip(2).is_ok());
    }

    #[test]
    fn test_utf16_surrogates_and_limit() {
        // "A", U+1F600, terminator, then "B" which lies past the limit
        let data = [0x41, 0x00, 0x3D, 0xD8, 0x00, 0xDE, 0x00, 0x00, 0x42, 0x00];
        let mut reader = VgmReader::new(&data);
        assert_eq!(reader.read_utf16_string(8), "A\u{1F600}");
        assert_eq!(reader.read_utf16_string(8), "");
    }

    #[test]
    fn test_utf16_unterminated_stops_at_limit() {
        let data = [0x41, 0x00, 0x42, 0x00, 0x43, 0x00];
        let mut reader = VgmReader::new(&data);
        assert_eq!(reader.read_utf16_string(4), "AB");
        assert_eq!(reader.position(), 4);
    }
}
