//! Sample descriptions handed to the engine for upload

use crate::error::{Error, Result};
use bitflags::bitflags;
use serde::Serialize;

bitflags! {
    /// Sample format and loop flags, plus the reduction marks the engine sets
    /// when it had to shrink a sample to fit card memory.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
    pub struct SampleType: u32 {
        const BIT16 = 0x0000_0004;
        const LOOP = 0x0000_0010;
        const BIDI = 0x0000_0020;
        const SUSTAIN_LOOP = 0x0000_0040;
        const SUSTAIN_BIDI = 0x0000_0080;
        const STEREO = 0x0000_0100;
        const RED_RATE2 = 0x4000_0000;
        const RED_RATE4 = 0x2000_0000;
        const RED_STEREO = 0x1000_0000;
    }
}

impl SampleType {
    /// Rate halvings applied so far (0, 1 or 2)
    pub fn reduction_level(self) -> u8 {
        if self.contains(Self::RED_RATE4) {
            2
        } else if self.contains(Self::RED_RATE2) {
            1
        } else {
            0
        }
    }
}

/// Signed PCM, interleaved when stereo
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleData {
    Pcm8(Vec<i8>),
    Pcm16(Vec<i16>),
}

impl SampleData {
    fn values(&self) -> usize {
        match self {
            SampleData::Pcm8(v) => v.len(),
            SampleData::Pcm16(v) => v.len(),
        }
    }

    fn map_frames(&self, channels: usize, step: usize, f: impl Fn(&[i32]) -> i32) -> SampleData {
        fn collect<T: Copy + Into<i32>>(
            values: &[T],
            channels: usize,
            step: usize,
            f: &impl Fn(&[i32]) -> i32,
        ) -> Vec<i32> {
            values
                .chunks(channels * step)
                .map(|chunk| {
                    let widened: Vec<i32> = chunk.iter().map(|&v| v.into()).collect();
                    f(&widened)
                })
                .collect()
        }

        match self {
            SampleData::Pcm8(v) => SampleData::Pcm8(
                collect(v, channels, step, &f)
                    .into_iter()
                    .map(|v| v as i8)
                    .collect(),
            ),
            SampleData::Pcm16(v) => SampleData::Pcm16(
                collect(v, channels, step, &f)
                    .into_iter()
                    .map(|v| v as i16)
                    .collect(),
            ),
        }
    }
}

fn average(values: &[i32]) -> i32 {
    if values.is_empty() {
        return 0;
    }
    values.iter().sum::<i32>() / values.len() as i32
}

/// A sample as supplied by the player. Lengths and loop points count
/// frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleInfo {
    pub kind: SampleType,
    pub data: SampleData,
    pub length: u32,
    pub loop_start: u32,
    pub loop_end: u32,
    pub sustain_start: u32,
    pub sustain_end: u32,
    pub sample_rate: u32,
}

impl SampleInfo {
    pub fn new_8bit(data: Vec<i8>, sample_rate: u32) -> Self {
        Self {
            kind: SampleType::empty(),
            length: data.len() as u32,
            data: SampleData::Pcm8(data),
            loop_start: 0,
            loop_end: 0,
            sustain_start: 0,
            sustain_end: 0,
            sample_rate,
        }
    }

    pub fn new_16bit(data: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            kind: SampleType::BIT16,
            length: data.len() as u32,
            data: SampleData::Pcm16(data),
            loop_start: 0,
            loop_end: 0,
            sustain_start: 0,
            sustain_end: 0,
            sample_rate,
        }
    }

    pub fn with_loop(mut self, start: u32, end: u32, bidi: bool) -> Self {
        self.loop_start = start;
        self.loop_end = end;
        self.kind.insert(SampleType::LOOP);
        if bidi {
            self.kind.insert(SampleType::BIDI);
        }
        self
    }

    pub fn with_sustain_loop(mut self, start: u32, end: u32, bidi: bool) -> Self {
        self.sustain_start = start;
        self.sustain_end = end;
        self.kind.insert(SampleType::SUSTAIN_LOOP);
        if bidi {
            self.kind.insert(SampleType::SUSTAIN_BIDI);
        }
        self
    }

    pub fn is_16bit(&self) -> bool {
        self.kind.contains(SampleType::BIT16)
    }

    fn channels(&self) -> usize {
        if self.kind.contains(SampleType::STEREO) {
            2
        } else {
            1
        }
    }

    pub fn validate(&self) -> Result<()> {
        let frames = self.data.values() / self.channels();
        let wide = matches!(self.data, SampleData::Pcm16(_));
        if wide != self.is_16bit() {
            return Err(Error::Config("sample width does not match its data".into()));
        }
        if (frames as u32) < self.length {
            return Err(Error::Config(format!(
                "sample claims {} frames but holds {frames}",
                self.length
            )));
        }
        Ok(())
    }

    /// Bytes the sample takes in card memory, including the two guard frames
    pub fn upload_size(&self) -> u32 {
        let shift = self.is_16bit() as u32 + (self.channels() as u32 - 1);
        (self.length + 2) << shift
    }

    /// Card-format bytes: the frames followed by two copies of the last one
    /// so interpolation past the end reads a held value.
    pub fn upload_bytes(&self) -> Vec<u8> {
        let count = self.length as usize * self.channels();
        match &self.data {
            SampleData::Pcm8(v) => {
                let last = v[..count].last().copied().unwrap_or(0);
                v[..count]
                    .iter()
                    .copied()
                    .chain(std::iter::repeat(last).take(2 * self.channels()))
                    .map(|s| s as u8)
                    .collect()
            }
            SampleData::Pcm16(v) => {
                let last = v[..count].last().copied().unwrap_or(0);
                v[..count]
                    .iter()
                    .copied()
                    .chain(std::iter::repeat(last).take(2 * self.channels()))
                    .flat_map(|s| s.to_le_bytes())
                    .collect()
            }
        }
    }

    fn to_mono(&mut self) {
        if !self.kind.contains(SampleType::STEREO) {
            return;
        }
        self.data = self.data.map_frames(2, 1, average);
        self.kind.remove(SampleType::STEREO);
        self.kind.insert(SampleType::RED_STEREO);
    }

    fn halve_rate(&mut self) {
        self.to_mono();
        self.data = self.data.map_frames(1, 2, average);
        self.length /= 2;
        self.loop_start /= 2;
        self.loop_end /= 2;
        self.sustain_start /= 2;
        self.sustain_end /= 2;
        self.sample_rate /= 2;

        if self.kind.contains(SampleType::RED_RATE2) {
            self.kind.remove(SampleType::RED_RATE2);
            self.kind.insert(SampleType::RED_RATE4);
        } else {
            self.kind.insert(SampleType::RED_RATE2);
        }
    }
}

/// Shrink `samples` until their upload size fits `budget` bytes. Stereo
/// is folded to mono up front when `to_mono` is set, otherwise only once
/// rates have to be halved; every sample is halved at most twice.
pub fn reduce(samples: &mut [SampleInfo], budget: u32, to_mono: bool) -> Result<()> {
    let total = |samples: &[SampleInfo]| samples.iter().map(|s| s.upload_size() as u64).sum::<u64>();

    if to_mono {
        samples.iter_mut().for_each(SampleInfo::to_mono);
    }

    for _ in 0..2 {
        if total(samples) <= budget as u64 {
            return Ok(());
        }
        log::debug!(
            "{} bytes of samples for {budget} bytes of memory, halving rates",
            total(samples)
        );
        samples.iter_mut().for_each(SampleInfo::halve_rate);
    }

    let needed = total(samples);
    if needed <= budget as u64 {
        Ok(())
    } else {
        Err(Error::SampleMemory {
            needed,
            available: budget as u64,
        })
    }
}
