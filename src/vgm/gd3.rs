//! GD3 (Game Description 3) tag handling

use super::header::VgmHeader;
use super::reader::VgmReader;
use serde::Serialize;

/// GD3 tag magic
pub const GD3_MAGIC: &[u8; 4] = b"Gd3 ";

/// GD3 version (1.0)
pub const GD3_VERSION: u32 = 0x00000100;

/// Magic, version and data length
const GD3_PREAMBLE: usize = 12;

/// Parsed GD3 metadata. Every string is empty when the file has no tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Gd3Tag {
    /// Declared byte length of the string block
    pub length: u32,
    pub title: String,
    pub title_jp: String,
    pub game: String,
    pub game_jp: String,
    pub system: String,
    pub system_jp: String,
    pub author: String,
    pub author_jp: String,
    pub date: String,
    pub converter: String,
    pub notes: String,
}

impl Gd3Tag {
    /// Read the tag the header points at.
    ///
    /// A missing tag, a bad magic or an offset past the end yields the empty
    /// tag. Strings never read past the tag's declared length or the file's
    /// EOF offset.
    pub fn parse(data: &[u8], header: &VgmHeader) -> Gd3Tag {
        let Some(start) = header.gd3_start() else {
            return Gd3Tag::default();
        };
        let mut reader = VgmReader::at(data, start);

        let Ok(magic) = reader.read_bytes(4) else {
            return Gd3Tag::default();
        };
        if magic != GD3_MAGIC {
            log::warn!("GD3 offset {start:#x} does not point at a tag");
            return Gd3Tag::default();
        }
        let (Ok(_version), Ok(length)) = (reader.read_u32_le(), reader.read_u32_le()) else {
            return Gd3Tag::default();
        };

        let mut limit = data.len().min(header.eof().max(start));
        limit = limit.min(start + GD3_PREAMBLE + length as usize);
        let mut next = || reader.read_utf16_string(limit);

        Gd3Tag {
            length,
            title: next(),
            title_jp: next(),
            game: next(),
            game_jp: next(),
            system: next(),
            system_jp: next(),
            author: next(),
            author_jp: next(),
            date: next(),
            converter: next(),
            notes: next(),
        }
    }

    /// Serialize to the on-disk layout (magic, version, length, 11 strings)
    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::new();

        data.extend_from_slice(GD3_MAGIC);
        data.extend_from_slice(&GD3_VERSION.to_le_bytes());

        // Placeholder for data size (will be filled later)
        let size_offset = data.len();
        data.extend_from_slice(&0u32.to_le_bytes());

        let strings_start = data.len();
        for s in [
            &self.title,
            &self.title_jp,
            &self.game,
            &self.game_jp,
            &self.system,
            &self.system_jp,
            &self.author,
            &self.author_jp,
            &self.date,
            &self.converter,
            &self.notes,
        ] {
            write_utf16_string(&mut data, s);
        }

        let strings_size = (data.len() - strings_start) as u32;
        data[size_offset..size_offset + 4].copy_from_slice(&strings_size.to_le_bytes());

        data
    }
}

/// Write a UTF-16LE null-terminated string
fn write_utf16_string(data: &mut Vec<u8>, s: &str) {
    for unit in s.encode_utf16() {
        data.extend_from_slice(&unit.to_le_bytes());
    }
    // Null terminator
    data.push(0);
    data.push(0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vgm::builder::VgmBuilder;

    #[test]
    fn test_utf16_ascii() {
        let mut data = Vec::new();
        write_utf16_string(&mut data, "ABC");
        assert_eq!(data, vec![0x41, 0x00, 0x42, 0x00, 0x43, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_utf16_japanese() {
        let mut data = Vec::new();
        write_utf16_string(&mut data, "あ");
        // U+3042 = hiragana A
        assert_eq!(data, vec![0x42, 0x30, 0x00, 0x00]);
    }

    #[test]
    fn test_tag_from_file() {
        let tag = Gd3Tag {
            title: "Stage 1".into(),
            author: "Komposer".into(),
            notes: "🎵".into(),
            ..Gd3Tag::default()
        };
        let image = VgmBuilder::new().end().gd3(&tag).build();
        let header = VgmHeader::parse(&image).unwrap();
        let parsed = Gd3Tag::parse(&image, &header);
        assert_eq!(parsed.title, "Stage 1");
        assert_eq!(parsed.author, "Komposer");
        assert_eq!(parsed.notes, "🎵");
        assert_eq!(parsed.length as usize, tag.encode().len() - GD3_PREAMBLE);
    }

    #[test]
    fn test_missing_tag_is_empty() {
        let image = VgmBuilder::new().end().build();
        let header = VgmHeader::parse(&image).unwrap();
        assert_eq!(Gd3Tag::parse(&image, &header), Gd3Tag::default());
    }

    #[test]
    fn test_truncated_tag_stops_at_eof() {
        let tag = Gd3Tag {
            title: "Long title".into(),
            game: "Game".into(),
            ..Gd3Tag::default()
        };
        let mut image = VgmBuilder::new().end().gd3(&tag).build();
        // Cut the file in the middle of the title
        let header = VgmHeader::parse(&image).unwrap();
        let cut = header.gd3_start().unwrap() + GD3_PREAMBLE + 8;
        image.truncate(cut);
        let parsed = Gd3Tag::parse(&image, &header);
        assert_eq!(parsed.title, "Long");
        assert_eq!(parsed.game, "");
    }
}
