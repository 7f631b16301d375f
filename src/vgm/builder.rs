//! In-memory VGM image builder
//!
//! Produces small, well-formed files for the demo mode of the CLI and for
//! tests: header fields are patched in [`VgmBuilder::build`] once the stream
//! and tag layout are known.

use super::commands::{opcode, WAIT_50TH_SAMPLES, WAIT_60TH_SAMPLES};
use super::gd3::Gd3Tag;
use super::header::{offset, DUAL_CHIP_FLAG, VGM_HEADER_SIZE, VGM_MAGIC};

/// Version written unless overridden
pub const DEFAULT_VERSION: u32 = 0x171;

#[derive(Debug, Clone)]
pub struct VgmBuilder {
    header: [u8; VGM_HEADER_SIZE],
    stream: Vec<u8>,
    loop_pos: Option<usize>,
    total_samples: u64,
    loop_samples_from: Option<u64>,
    gd3: Option<Vec<u8>>,
}

impl VgmBuilder {
    pub fn new() -> Self {
        let mut builder = Self {
            header: [0; VGM_HEADER_SIZE],
            stream: Vec::new(),
            loop_pos: None,
            total_samples: 0,
            loop_samples_from: None,
            gd3: None,
        };
        builder.header[offset::IDENT..offset::IDENT + 4].copy_from_slice(VGM_MAGIC);
        builder.write_u32(offset::VERSION, DEFAULT_VERSION);
        builder.write_u32(offset::RATE, 60);
        builder
    }

    fn write_u32(&mut self, at: usize, value: u32) {
        self.header[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn version(mut self, version: u32) -> Self {
        self.write_u32(offset::VERSION, version);
        self
    }

    /// Set an arbitrary 32-bit header field
    pub fn header_u32(mut self, at: usize, value: u32) -> Self {
        self.write_u32(at, value);
        self
    }

    pub fn ym3812(self, clock: u32) -> Self {
        self.header_u32(offset::YM3812_CLOCK, clock)
    }

    pub fn ym3812_dual(self, clock: u32) -> Self {
        self.header_u32(offset::YM3812_CLOCK, clock | DUAL_CHIP_FLAG)
    }

    pub fn ym3526(self, clock: u32) -> Self {
        self.header_u32(offset::YM3526_CLOCK, clock)
    }

    pub fn ym3526_dual(self, clock: u32) -> Self {
        self.header_u32(offset::YM3526_CLOCK, clock | DUAL_CHIP_FLAG)
    }

    pub fn ymf262(self, clock: u32) -> Self {
        self.header_u32(offset::YMF262_CLOCK, clock)
    }

    /// Append raw command bytes
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.stream.extend_from_slice(bytes);
        self
    }

    /// FM register write through `op` (0x5A, 0x5E, 0xAA, ...)
    pub fn opl(self, op: u8, register: u8, value: u8) -> Self {
        self.raw(&[op, register, value])
    }

    /// Wait commands totalling `samples`
    pub fn wait(mut self, samples: u64) -> Self {
        encode_wait(&mut self.stream, samples);
        self.total_samples += samples;
        self
    }

    /// Data block of `kind` carrying `payload`
    pub fn data_block(mut self, kind: u8, payload: &[u8]) -> Self {
        self.stream.extend_from_slice(&[opcode::DATA_BLOCK, opcode::END, kind]);
        self.stream
            .extend_from_slice(&(payload.len() as u32).to_le_bytes());
        self.stream.extend_from_slice(payload);
        self
    }

    /// Mark the current stream position as the loop point
    pub fn loop_here(mut self) -> Self {
        self.loop_pos = Some(self.stream.len());
        self.loop_samples_from = Some(self.total_samples);
        self
    }

    pub fn end(self) -> Self {
        self.raw(&[opcode::END])
    }

    /// Append a GD3 tag after the stream
    pub fn gd3(mut self, tag: &Gd3Tag) -> Self {
        self.gd3 = Some(tag.encode());
        self
    }

    pub fn build(mut self) -> Vec<u8> {
        let data_start = VGM_HEADER_SIZE;
        self.write_u32(offset::DATA_OFFSET, (data_start - offset::DATA_OFFSET) as u32);
        self.write_u32(offset::TOTAL_SAMPLES, self.total_samples as u32);

        if let (Some(pos), Some(from)) = (self.loop_pos, self.loop_samples_from) {
            let absolute = data_start + pos;
            self.write_u32(offset::LOOP_OFFSET, (absolute - offset::LOOP_OFFSET) as u32);
            self.write_u32(offset::LOOP_SAMPLES, (self.total_samples - from) as u32);
        }

        let mut image = Vec::with_capacity(data_start + self.stream.len());
        image.extend_from_slice(&self.header);
        image.extend_from_slice(&self.stream);

        if let Some(tag) = &self.gd3 {
            let gd3_pos = image.len();
            image.extend_from_slice(tag);
            image[offset::GD3_OFFSET..offset::GD3_OFFSET + 4]
                .copy_from_slice(&((gd3_pos - offset::GD3_OFFSET) as u32).to_le_bytes());
        }

        let eof = (image.len() - offset::EOF_OFFSET) as u32;
        image[offset::EOF_OFFSET..offset::EOF_OFFSET + 4].copy_from_slice(&eof.to_le_bytes());
        image
    }
}

impl Default for VgmBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a delay with the shortest commands for common frame lengths
pub fn encode_wait(out: &mut Vec<u8>, mut duration: u64) {
    while duration > 0 {
        if duration == WAIT_60TH_SAMPLES as u64 {
            out.push(opcode::WAIT_60TH);
            duration = 0;
        } else if duration == WAIT_50TH_SAMPLES as u64 {
            out.push(opcode::WAIT_50TH);
            duration = 0;
        } else if duration <= 16 {
            out.push(opcode::WAIT_N_BASE + (duration as u8) - 1);
            duration = 0;
        } else {
            let chunk = duration.min(0xFFFF);
            out.push(opcode::WAIT_NNNN);
            out.extend_from_slice(&(chunk as u16).to_le_bytes());
            duration -= chunk;
        }
    }
}
