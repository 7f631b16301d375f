//! Loading VGM/VGZ images into memory

use super::gd3::Gd3Tag;
use super::header::VgmHeader;
use crate::error::Result;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Leading bytes of a gzip stream
pub const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

/// A fully inflated VGM image with its parsed header and tag
#[derive(Debug, Clone)]
pub struct VgmFile {
    data: Vec<u8>,
    header: VgmHeader,
    gd3: Gd3Tag,
}

impl VgmFile {
    /// Inflate if gzipped, then validate and parse
    pub fn from_bytes(bytes: Vec<u8>) -> Result<VgmFile> {
        let data = inflate(bytes)?;
        let header = VgmHeader::parse(&data)?;
        let gd3 = Gd3Tag::parse(&data, &header);
        log::debug!(
            "VGM {}.{:02x}: data at {:#x}, loop {:?}, gd3 {:?}",
            header.version >> 8,
            header.version & 0xFF,
            header.data_start(),
            header.loop_start(),
            header.gd3_start()
        );
        Ok(VgmFile { data, header, gd3 })
    }

    pub fn open(path: &Path) -> Result<VgmFile> {
        VgmFile::from_bytes(read_file(path)?)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn header(&self) -> &VgmHeader {
        &self.header
    }

    pub fn gd3(&self) -> &Gd3Tag {
        &self.gd3
    }
}

/// Decompress `bytes` when they start with the gzip magic
pub fn inflate(bytes: Vec<u8>) -> Result<Vec<u8>> {
    if !bytes.starts_with(&GZIP_MAGIC) {
        return Ok(bytes);
    }
    let mut decoder = GzDecoder::new(bytes.as_slice());
    let mut data = Vec::new();
    decoder.read_to_end(&mut data)?;
    Ok(data)
}

/// Read a VGM or VGZ file as stored on disk
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::vgm::builder::VgmBuilder;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_plain_passthrough() {
        let image = VgmBuilder::new().end().build();
        assert_eq!(inflate(image.clone()).unwrap(), image);
    }

    #[test]
    fn test_gzip_inflates() {
        let image = VgmBuilder::new().ym3812(3_579_545).wait(735).end().build();
        let file = VgmFile::from_bytes(gzip(&image)).unwrap();
        assert_eq!(file.data(), image.as_slice());
        assert!(file.header().ym3812.is_present());
    }

    #[test]
    fn test_corrupt_gzip_is_io_error() {
        let mut packed = gzip(&VgmBuilder::new().end().build());
        packed.truncate(12);
        assert!(matches!(VgmFile::from_bytes(packed), Err(Error::Io(_))));
    }

    #[test]
    fn test_gzip_of_non_vgm_rejected() {
        let packed = gzip(&[0u8; 0x100]);
        assert!(matches!(VgmFile::from_bytes(packed), Err(Error::BadMagic)));
    }
}
