//! Ultrasound register access
//!
//! The card exposes a voice select port, a register select port and an
//! 8/16-bit data window, plus a byte window onto its sample DRAM. Every
//! primitive here is a fixed, short port sequence with bounded settle
//! delays.

use super::GusKind;
use crate::hw::IoBus;

/// Offsets from the card base port
pub mod port {
    pub const MIX_CONTROL: u16 = 0x000;
    pub const IRQ_STATUS: u16 = 0x006;
    pub const TIMER_CONTROL: u16 = 0x008;
    pub const TIMER_DATA: u16 = 0x009;
    pub const MIDI_CONTROL: u16 = 0x100;
    pub const VOICE_SELECT: u16 = 0x102;
    pub const REGISTER_SELECT: u16 = 0x103;
    pub const DATA_LOW: u16 = 0x104;
    pub const DATA_HIGH: u16 = 0x105;
    pub const DRAM: u16 = 0x107;
}

/// Synthesizer register indices; add [`reg::READ`] to read one back
pub mod reg {
    pub const MODE: u8 = 0x00;
    pub const FREQUENCY: u8 = 0x01;
    pub const START_HIGH: u8 = 0x02;
    pub const END_HIGH: u8 = 0x04;
    pub const RAMP_RATE: u8 = 0x06;
    pub const RAMP_START: u8 = 0x07;
    pub const RAMP_END: u8 = 0x08;
    pub const VOLUME: u8 = 0x09;
    pub const POSITION_HIGH: u8 = 0x0A;
    pub const POSITION_LOW: u8 = 0x0B;
    /// GF1 pan position; on the InterWave the right volume offset
    pub const PAN: u8 = 0x0C;
    pub const VOLUME_MODE: u8 = 0x0D;
    pub const ACTIVE_VOICES: u8 = 0x0E;
    pub const UPPER_ADDRESS: u8 = 0x10;
    pub const FX_WRITE_HIGH: u8 = 0x11;
    pub const LEFT_OFFSET: u8 = 0x13;
    pub const FX_CHANNELS: u8 = 0x14;
    pub const VOICE_MODE: u8 = 0x15;
    pub const FX_VOLUME: u8 = 0x16;
    pub const GLOBAL_MODE: u8 = 0x19;
    pub const RIGHT_OFFSET_FINAL: u8 = 0x1B;
    pub const LEFT_OFFSET_FINAL: u8 = 0x1C;
    pub const FX_VOLUME_FINAL: u8 = 0x1D;
    pub const DMA_CONTROL: u8 = 0x41;
    pub const DRAM_LOW: u8 = 0x43;
    pub const DRAM_HIGH: u8 = 0x44;
    pub const TIMER_CONTROL: u8 = 0x45;
    pub const TIMER1_COUNT: u8 = 0x46;
    pub const SAMPLE_CONTROL: u8 = 0x49;
    pub const RESET: u8 = 0x4C;
    pub const DRAM_AUTO_INCREMENT: u8 = 0x51;
    pub const MEMORY_CONFIG: u8 = 0x52;
    pub const MEMORY_CONTROL: u8 = 0x53;
    pub const REVISION: u8 = 0x5B;
    pub const READ: u8 = 0x80;
}

/// Voice mode bit: voice stopped
pub const MODE_STOPPED: u8 = 0x01;
/// Voice mode bit: playing backwards
pub const MODE_BACKWARD: u8 = 0x40;

/// Settle reads after each port write
const IO_SETTLE: u32 = 4;

/// Voice address registers, in the order the player uses them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Point {
    Current,
    Start,
    End,
    /// Effects buffer write position (InterWave)
    FxWrite,
}

pub struct Card<B: IoBus> {
    bus: B,
    port: u16,
    kind: GusKind,
}

impl<B: IoBus> Card<B> {
    pub fn new(bus: B, port: u16, kind: GusKind) -> Self {
        Self { bus, port, kind }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn kind(&self) -> GusKind {
        self.kind
    }

    pub(crate) fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    pub(crate) fn set_kind(&mut self, kind: GusKind) {
        self.kind = kind;
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn into_bus(self) -> B {
        self.bus
    }

    pub fn is_amd(&self) -> bool {
        self.kind == GusKind::Amd
    }

    pub fn delay(&mut self, cycles: u32) {
        self.bus.io_delay(cycles);
    }

    pub fn inp(&mut self, offset: u16) -> u8 {
        self.bus.inb(self.port + offset)
    }

    pub fn outp(&mut self, offset: u16, value: u8) {
        self.bus.outb(self.port + offset, value);
        self.delay(IO_SETTLE);
    }

    fn select(&mut self, register: u8) {
        self.bus.outb(self.port + port::REGISTER_SELECT, register);
        self.delay(IO_SETTLE);
    }

    pub fn out8(&mut self, register: u8, value: u8) {
        self.select(register);
        self.bus.outb(self.port + port::DATA_HIGH, value);
        self.delay(IO_SETTLE);
    }

    pub fn out16(&mut self, register: u8, value: u16) {
        self.select(register);
        self.bus.outw(self.port + port::DATA_LOW, value);
        self.delay(IO_SETTLE);
    }

    pub fn in8(&mut self, register: u8) -> u8 {
        self.select(register);
        self.bus.inb(self.port + port::DATA_HIGH)
    }

    pub fn in16(&mut self, register: u8) -> u16 {
        self.select(register);
        self.bus.inw(self.port + port::DATA_LOW)
    }

    /// Voice control write; the GF1 latches it reliably only when written
    /// twice around its internal update cycle.
    pub fn out_voice_control(&mut self, register: u8, value: u8) {
        match self.kind {
            GusKind::Amd => self.out8(register, value),
            GusKind::Gf1 => {
                self.select(register);
                self.bus.outb(self.port + port::DATA_HIGH, value);
                self.delay(IO_SETTLE * 2);
                self.bus.outb(self.port + port::DATA_HIGH, value);
            }
        }
    }

    fn set_dram_address(&mut self, address: u32) {
        self.out16(reg::DRAM_LOW, (address & 0xFFFF) as u16);
        self.out_voice_control(reg::DRAM_HIGH, ((address >> 16) & 0xFF) as u8);
    }

    pub fn peek(&mut self, address: u32) -> u8 {
        self.set_dram_address(address);
        self.inp(port::DRAM)
    }

    pub fn poke(&mut self, address: u32, value: u8) {
        self.set_dram_address(address);
        self.outp(port::DRAM, value);
    }

    pub fn select_voice(&mut self, voice: usize) {
        self.outp(port::VOICE_SELECT, voice as u8);
    }

    pub fn set_mode(&mut self, mode: u8) {
        self.out_voice_control(reg::MODE, mode);
    }

    pub fn mode(&mut self) -> u8 {
        self.in8(reg::MODE | reg::READ)
    }

    pub fn set_volume_mode(&mut self, mode: u8) {
        self.out_voice_control(reg::VOLUME_MODE, mode);
    }

    pub fn volume_mode(&mut self) -> u8 {
        self.in8(reg::VOLUME_MODE | reg::READ)
    }

    pub fn set_bank(&mut self, bank: u8) {
        if self.is_amd() {
            self.out8(reg::UPPER_ADDRESS, bank);
        }
    }

    pub fn bank(&mut self) -> u8 {
        if self.is_amd() {
            self.in8(reg::UPPER_ADDRESS | reg::READ) & 0x03
        } else {
            0
        }
    }

    pub fn set_timer_control(&mut self, value: u8) {
        self.out8(reg::TIMER_CONTROL, value);
    }

    pub fn set_timer_count(&mut self, count: u8) {
        self.out8(reg::TIMER1_COUNT, count);
    }

    pub fn set_frequency(&mut self, fc: u16) {
        let fc = if self.is_amd() { fc } else { fc & !1 };
        self.out16(reg::FREQUENCY, fc);
    }

    /// 12-bit logarithmic volume
    pub fn set_volume(&mut self, volume: u16) {
        self.out16(reg::VOLUME, volume << 4);
    }

    pub fn volume(&mut self) -> u16 {
        self.in16(reg::VOLUME | reg::READ) >> 4
    }

    /// GF1 pan position 0 (left) to 15 (right)
    pub fn set_pan(&mut self, pan: u8) {
        self.out8(reg::PAN, pan);
    }

    /// Left volume offset as 12-bit attenuation. With `final_only` only the
    /// target register is written and the current value ramps towards it.
    pub fn set_left_offset(&mut self, attenuation: u16, final_only: bool) {
        if self.is_amd() {
            if !final_only {
                self.out16(reg::LEFT_OFFSET, attenuation << 4);
            }
            self.out16(reg::LEFT_OFFSET_FINAL, attenuation << 4);
        }
    }

    pub fn set_right_offset(&mut self, attenuation: u16, final_only: bool) {
        if self.is_amd() {
            if !final_only {
                self.out16(reg::PAN, attenuation << 4);
            }
            self.out16(reg::RIGHT_OFFSET_FINAL, attenuation << 4);
        }
    }

    /// Effects send level (12-bit, 0xFFF loudest)
    pub fn set_fx_volume(&mut self, level: u16) {
        if self.is_amd() {
            let attenuation = 0xFFF - level.min(0xFFF);
            self.out16(reg::FX_VOLUME, attenuation << 4);
            self.out16(reg::FX_VOLUME_FINAL, attenuation << 4);
        }
    }

    /// Effects voices this voice sends to, one bit per voice 24-31
    pub fn set_fx_channels(&mut self, mask: u8) {
        if self.is_amd() {
            self.out8(reg::FX_CHANNELS, mask);
        }
    }

    pub fn set_point(&mut self, address: u32, which: Point) {
        match self.kind {
            GusKind::Amd => {
                let register = match which {
                    Point::Start => reg::START_HIGH,
                    Point::End => reg::END_HIGH,
                    Point::FxWrite => reg::FX_WRITE_HIGH,
                    Point::Current => reg::POSITION_HIGH,
                };
                self.out16(register, (address >> 7) as u16);
                self.out16(register + 1, (address << 9) as u16);
            }
            GusKind::Gf1 => {
                let register = match which {
                    Point::Start => reg::START_HIGH,
                    Point::End => reg::END_HIGH,
                    Point::Current | Point::FxWrite => reg::POSITION_HIGH,
                };
                self.out16(register, ((address >> 7) & 0x1FFF) as u16);
                self.out16(register + 1, (address << 9) as u16);
            }
        }
    }

    /// Current playback address of the selected voice
    pub fn point(&mut self) -> u32 {
        let mut high = self.in16(reg::POSITION_HIGH | reg::READ) as u32;
        let low = self.in16(reg::POSITION_LOW | reg::READ) as u32;
        if self.kind == GusKind::Gf1 {
            high &= 0x1FFF;
        }
        (high << 7) | (low >> 9)
    }

    /// Ramp the selected voice to `target` instead of jumping there
    pub fn fade_volume(&mut self, target: u16) {
        let mut start = self.volume();
        let mut end = target;
        if (start as i32 - end as i32).abs() < 64 {
            self.set_volume(end);
            return;
        }

        let mode = if start > end {
            std::mem::swap(&mut start, &mut end);
            0x40
        } else {
            0x00
        };
        let start = start.max(64);
        let end = end.min(4032);

        self.out8(reg::RAMP_START, (start >> 4) as u8);
        self.out8(reg::RAMP_END, (end >> 4) as u8);
        self.set_volume_mode(mode);
    }

    /// Fast ramp of the selected voice towards silence
    pub fn fade_volume_down(&mut self) {
        self.out8(reg::RAMP_START, 0x04);
        self.out8(reg::RAMP_END, 0xFC);
        self.set_volume_mode(0x40);
    }

    /// Pulse the master reset
    pub fn reset(&mut self) {
        self.out8(reg::RESET, 0x00);
        self.bus.delay_ms(20);
        self.out8(reg::RESET, 0x01);
        self.bus.delay_ms(20);
    }

    /// Switch InterWave enhanced mode; reports whether enabling stuck,
    /// which it never does on a GF1.
    pub fn set_enhanced_mode(&mut self, enable: bool) -> bool {
        let mode = self.in8(reg::GLOBAL_MODE | reg::READ);
        if enable {
            self.out8(reg::GLOBAL_MODE, mode | 0x01);
            return self.in8(reg::GLOBAL_MODE | reg::READ) & 0x01 != 0;
        }
        self.out8(reg::GLOBAL_MODE, mode & !0x01);
        true
    }

    /// Copy `bytes` into DRAM at `address`.
    ///
    /// The InterWave takes little-endian words through its auto-incrementing
    /// port; odd edges of 8-bit data go through single-byte pokes. The GF1
    /// is written a byte at a time.
    pub fn upload(&mut self, address: u32, bytes: &[u8], sixteen_bit: bool) {
        match self.kind {
            GusKind::Amd => {
                let control = self.in8(reg::MEMORY_CONTROL);
                self.out8(reg::MEMORY_CONTROL, (control | 0x01) & 0x4D);

                let mut address = address;
                let mut bytes = bytes;
                if !sixteen_bit {
                    if address & 1 != 0 {
                        if let Some((&first, rest)) = bytes.split_first() {
                            self.poke(address, first);
                            address += 1;
                            bytes = rest;
                        }
                    }
                    if bytes.len() & 1 != 0 {
                        if let Some((&last, rest)) = bytes.split_last() {
                            self.poke(address + rest.len() as u32, last);
                            bytes = rest;
                        }
                    }
                }
                self.write_words(address, bytes.chunks(2).map(|pair| {
                    let lo = pair[0] as u16;
                    let hi = pair.get(1).copied().unwrap_or(0) as u16;
                    lo | (hi << 8)
                }));

                self.out8(reg::MEMORY_CONTROL, control);
            }
            GusKind::Gf1 => {
                let mut high = ((address >> 16) & 0xFF) as u8;
                let mut low = (address & 0xFFFF) as u16;
                self.select(reg::DRAM_HIGH);
                self.bus.outb(self.port + port::DATA_HIGH, high);
                self.select(reg::DRAM_LOW);
                self.bus.outw(self.port + port::DATA_LOW, low);

                for &byte in bytes {
                    self.bus.outb(self.port + port::DRAM, byte);
                    low = low.wrapping_add(1);
                    self.bus.outw(self.port + port::DATA_LOW, low);
                    if low == 0 {
                        high = high.wrapping_add(1);
                        self.select(reg::DRAM_HIGH);
                        self.bus.outb(self.port + port::DATA_HIGH, high);
                        self.select(reg::DRAM_LOW);
                    }
                }
            }
        }
    }

    /// Zero `len` bytes of InterWave DRAM
    pub fn fill_zero(&mut self, address: u32, len: u32) {
        let control = self.in8(reg::MEMORY_CONTROL);
        self.out8(reg::MEMORY_CONTROL, (control | 0x01) & 0x4D);
        self.write_words(address, (0..len / 2).map(|_| 0));
        self.out8(reg::MEMORY_CONTROL, control);
    }

    fn write_words(&mut self, address: u32, words: impl Iterator<Item = u16>) {
        self.select(reg::DRAM_HIGH);
        self.bus
            .outb(self.port + port::DATA_HIGH, ((address >> 16) & 0xFF) as u8);
        self.select(reg::DRAM_LOW);
        self.bus
            .outw(self.port + port::DATA_LOW, (address & 0xFFFF) as u16);
        self.select(reg::DRAM_AUTO_INCREMENT);
        for word in words {
            self.bus.outw(self.port + port::DATA_LOW, word);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::sim::{SimCardKind, SimInterWave};

    fn card(kind: SimCardKind) -> Card<SimInterWave> {
        let gus = match kind {
            SimCardKind::Gf1 => GusKind::Gf1,
            _ => GusKind::Amd,
        };
        Card::new(SimInterWave::new(kind, 0x240), 0x240, gus)
    }

    #[test]
    fn test_peek_poke() {
        let mut card = card(SimCardKind::Amd);
        card.poke(0x1234, 0xAA);
        assert_eq!(card.peek(0x1234), 0xAA);
        assert_eq!(card.bus().dram(0x1234), 0xAA);
    }

    #[test]
    fn test_amd_upload_handles_odd_edges() {
        let mut card = card(SimCardKind::Amd);
        card.upload(0x101, &[1, 2, 3, 4], false);
        let stored: Vec<u8> = (0x101..0x105).map(|a| card.bus().dram(a)).collect();
        assert_eq!(stored, vec![1, 2, 3, 4]);
        assert_eq!(card.bus().dram(0x100), 0x00);
        assert_eq!(card.bus().dram(0x105), 0x00);
    }

    #[test]
    fn test_gf1_upload_crosses_64k() {
        let mut card = card(SimCardKind::Gf1);
        card.upload(0xFFFE, &[9, 8, 7, 6], false);
        let stored: Vec<u8> = (0xFFFE..0x10002).map(|a| card.bus().dram(a)).collect();
        assert_eq!(stored, vec![9, 8, 7, 6]);
    }

    #[test]
    fn test_enhanced_mode_only_on_amd() {
        assert!(card(SimCardKind::Amd).set_enhanced_mode(true));
        assert!(!card(SimCardKind::Gf1).set_enhanced_mode(true));
    }

    #[test]
    fn test_amd_point_round_trip() {
        let mut card = card(SimCardKind::Amd);
        card.select_voice(3);
        card.set_point(0x12_3456, Point::Current);
        assert_eq!(card.point(), 0x12_3456);
    }
}
