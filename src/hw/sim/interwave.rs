//! Simulated Gravis Ultrasound / AMD InterWave card
//!
//! Keeps the register file (per-voice and global), the sample DRAM and the
//! interrupt status latch. Voices do not actually play: mode and ramp bits
//! read back as written, with the ramp reported as finished.

use crate::hw::{IoBus, DELAY_PORT};
use serde::{Deserialize, Serialize};

/// Card generation to simulate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SimCardKind {
    Absent,
    Gf1,
    Amd,
}

/// A synthesizer register write as seen by the card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimVoiceWrite {
    pub voice: u8,
    pub register: u8,
    pub value: u16,
}

const SPAN: u16 = 0x108;
const VOICE_REGISTERS: usize = 0x20;

const REG_DRAM_LOW: u8 = 0x43;
const REG_DRAM_HIGH: u8 = 0x44;
const REG_DRAM_AUTO_INCREMENT: u8 = 0x51;
const REG_GLOBAL_MODE: u8 = 0x19;
const REG_REVISION: u8 = 0x5B;

fn is_voice_register(register: u8) -> bool {
    (register as usize) < VOICE_REGISTERS && !matches!(register, 0x0E | 0x0F | 0x19)
}

#[derive(Debug, Clone)]
pub struct SimInterWave {
    base: u16,
    kind: SimCardKind,
    voice: u8,
    register: u8,
    voices: Vec<[u16; VOICE_REGISTERS]>,
    globals: [u16; 0x80],
    ports: [u8; 0x10],
    banks: [Vec<u8>; 4],
    irq_status: u8,
    revision: u8,
    writes: Vec<SimVoiceWrite>,
    recording: bool,
    io_cycles: u64,
}

impl SimInterWave {
    /// A card with 1 MiB in its first bank
    pub fn new(kind: SimCardKind, base: u16) -> Self {
        Self::with_memory(kind, base, [1 << 20, 0, 0, 0])
    }

    /// A card with the given DRAM per bank. A GF1 only has bank 0 (up to
    /// 1 MiB, aliased above its size).
    pub fn with_memory(kind: SimCardKind, base: u16, banks: [u32; 4]) -> Self {
        let banks = match kind {
            SimCardKind::Absent => [0; 4],
            SimCardKind::Gf1 => [banks[0].min(1 << 20), 0, 0, 0],
            SimCardKind::Amd => banks.map(|size| size.min(4 << 20)),
        };
        Self {
            base,
            kind,
            voice: 0,
            register: 0,
            voices: vec![[0; VOICE_REGISTERS]; 32],
            globals: [0; 0x80],
            ports: [0; 0x10],
            banks: banks.map(|size| vec![0; size as usize]),
            irq_status: 0,
            revision: 1,
            writes: Vec::new(),
            recording: true,
            io_cycles: 0,
        }
    }

    pub fn kind(&self) -> SimCardKind {
        self.kind
    }

    /// Raw DRAM byte at a card address, 0xFF where nothing is fitted
    pub fn dram(&self, address: u32) -> u8 {
        match self.locate(address) {
            Some((bank, offset)) => self.banks[bank][offset],
            None => 0xFF,
        }
    }

    fn locate(&self, address: u32) -> Option<(usize, usize)> {
        match self.kind {
            SimCardKind::Absent => None,
            SimCardKind::Gf1 => {
                let size = self.banks[0].len();
                (size > 0).then(|| (0, (address as usize & 0xF_FFFF) % size))
            }
            SimCardKind::Amd => {
                let bank = ((address >> 22) & 3) as usize;
                let offset = (address & 0x3F_FFFF) as usize;
                (offset < self.banks[bank].len()).then_some((bank, offset))
            }
        }
    }

    pub fn voice_register(&self, voice: usize, register: u8) -> u16 {
        self.voices[voice][register as usize]
    }

    pub fn global_register(&self, register: u8) -> u16 {
        self.globals[(register & 0x7F) as usize]
    }

    /// Last byte written to a base-relative port below 0x10
    pub fn port_value(&self, offset: u16) -> u8 {
        self.ports[(offset & 0x0F) as usize]
    }

    pub fn selected_voice(&self) -> usize {
        self.voice as usize
    }

    /// Latch interrupt sources (bit 2 timer 1, bit 3 timer 2, bits 0-1 MIDI)
    pub fn raise_irq(&mut self, sources: u8) {
        self.irq_status |= sources;
    }

    pub fn pending_irq(&self) -> u8 {
        self.irq_status
    }

    /// Synthesizer register writes since the last [`SimInterWave::clear_writes`]
    pub fn writes(&self) -> &[SimVoiceWrite] {
        &self.writes
    }

    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }

    pub fn set_recording(&mut self, recording: bool) {
        self.recording = recording;
        if !recording {
            self.writes.clear();
        }
    }

    pub fn io_cycles(&self) -> u64 {
        self.io_cycles
    }

    fn dram_address(&self) -> u32 {
        ((self.globals[REG_DRAM_HIGH as usize] as u32 & 0xFF) << 16)
            | self.globals[REG_DRAM_LOW as usize] as u32
    }

    fn set_dram_address(&mut self, address: u32) {
        self.globals[REG_DRAM_LOW as usize] = (address & 0xFFFF) as u16;
        self.globals[REG_DRAM_HIGH as usize] = ((address >> 16) & 0xFF) as u16;
    }

    fn poke(&mut self, address: u32, value: u8) {
        if let Some((bank, offset)) = self.locate(address) {
            self.banks[bank][offset] = value;
        }
    }

    fn read_register(&self, register: u8) -> u16 {
        let register = register & 0x7F;
        if is_voice_register(register) {
            let value = self.voices[self.voice as usize][register as usize];
            // Ramps complete instantly
            return if register == 0x0D { value | 0x01 } else { value };
        }
        match register {
            REG_REVISION => (self.revision as u16) << 4,
            0x0F => 0,
            _ => self.globals[register as usize],
        }
    }

    fn write_register(&mut self, value: u16, word: bool) {
        let register = self.register;
        if register & 0x80 != 0 {
            return;
        }
        if self.recording {
            self.writes.push(SimVoiceWrite {
                voice: self.voice,
                register,
                value,
            });
        }

        if is_voice_register(register) {
            self.voices[self.voice as usize][register as usize] = value;
            return;
        }
        match register {
            REG_DRAM_AUTO_INCREMENT if word => {
                let address = self.dram_address();
                self.poke(address, (value & 0xFF) as u8);
                self.poke(address + 1, (value >> 8) as u8);
                self.set_dram_address(address.wrapping_add(2) & 0xFF_FFFF);
            }
            REG_GLOBAL_MODE if self.kind == SimCardKind::Gf1 => {
                self.globals[register as usize] = value & !0x01;
            }
            _ => self.globals[register as usize] = value,
        }
    }
}

impl IoBus for SimInterWave {
    fn inb(&mut self, port: u16) -> u8 {
        let offset = port.wrapping_sub(self.base);
        if self.kind == SimCardKind::Absent || offset >= SPAN {
            return 0xFF;
        }
        match offset {
            0x006 => std::mem::take(&mut self.irq_status),
            0x100 => 0,
            0x102 => self.voice,
            0x103 => self.register,
            0x104 => (self.read_register(self.register) & 0xFF) as u8,
            0x105 => (self.read_register(self.register) & 0xFF) as u8,
            0x107 => self.dram(self.dram_address()),
            o if o < 0x10 => self.ports[o as usize],
            _ => 0xFF,
        }
    }

    fn outb(&mut self, port: u16, value: u8) {
        let offset = port.wrapping_sub(self.base);
        if self.kind == SimCardKind::Absent || port == DELAY_PORT || offset >= SPAN {
            return;
        }
        match offset {
            0x102 => self.voice = value & 0x1F,
            0x103 => self.register = value,
            0x104 | 0x105 => self.write_register(value as u16, false),
            0x107 => {
                let address = self.dram_address();
                self.poke(address, value);
            }
            o if o < 0x10 => self.ports[o as usize] = value,
            _ => {}
        }
    }

    fn inw(&mut self, port: u16) -> u16 {
        if self.kind != SimCardKind::Absent && port.wrapping_sub(self.base) == 0x104 {
            return self.read_register(self.register);
        }
        let lo = self.inb(port) as u16;
        let hi = self.inb(port + 1) as u16;
        lo | (hi << 8)
    }

    fn outw(&mut self, port: u16, value: u16) {
        if self.kind == SimCardKind::Absent || port.wrapping_sub(self.base) != 0x104 {
            return;
        }
        self.write_register(value, true);
    }

    fn io_delay(&mut self, cycles: u32) {
        self.io_cycles += cycles as u64;
    }

    fn delay_ms(&mut self, _ms: u32) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_registers_are_banked() {
        let mut card = SimInterWave::new(SimCardKind::Amd, 0x240);
        card.outb(0x342, 3);
        card.outb(0x343, 0x01);
        card.outw(0x344, 0x1234);
        card.outb(0x342, 4);
        card.outw(0x344, 0x5678);
        assert_eq!(card.voice_register(3, 0x01), 0x1234);
        assert_eq!(card.voice_register(4, 0x01), 0x5678);
        card.outb(0x342, 3);
        card.outb(0x343, 0x81);
        assert_eq!(card.inw(0x344), 0x1234);
    }

    #[test]
    fn test_auto_increment_writes_words() {
        let mut card = SimInterWave::new(SimCardKind::Amd, 0x240);
        card.outb(0x343, 0x44);
        card.outb(0x345, 0x00);
        card.outb(0x343, 0x43);
        card.outw(0x344, 0x0010);
        card.outb(0x343, 0x51);
        card.outw(0x344, 0xBBAA);
        card.outw(0x344, 0xDDCC);
        let bytes: Vec<u8> = (0x10..0x14).map(|a| card.dram(a)).collect();
        assert_eq!(bytes, vec![0xAA, 0xBB, 0xCC, 0xDD]);
    }

    #[test]
    fn test_irq_status_clears_on_read() {
        let mut card = SimInterWave::new(SimCardKind::Gf1, 0x220);
        card.raise_irq(0x04);
        assert_eq!(card.inb(0x226), 0x04);
        assert_eq!(card.inb(0x226), 0x00);
    }

    #[test]
    fn test_gf1_memory_aliases() {
        let mut card = SimInterWave::with_memory(SimCardKind::Gf1, 0x220, [256 * 1024, 0, 0, 0]);
        card.poke(0x40000, 7);
        assert_eq!(card.dram(0), 7);
    }

    #[test]
    fn test_absent_card_floats_high() {
        let mut card = SimInterWave::new(SimCardKind::Absent, 0x240);
        card.outb(0x343, 0x01);
        assert_eq!(card.inb(0x345), 0xFF);
        assert_eq!(card.dram(0), 0xFF);
    }
}
