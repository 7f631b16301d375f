//! Simulated AdLib / Sound Blaster FM card
//!
//! Models only what the driver can observe: address latches, the register
//! file of each chip, and the timer-1 status flags used by detection.

use crate::hw::{IoBus, DELAY_PORT};
use serde::{Deserialize, Serialize};

/// Which FM hardware the simulated card carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SimChip {
    /// Nothing answers on the ports
    Absent,
    /// Single YM3812
    Opl2,
    /// Two YM3812s at base/base+2 (Sound Blaster Pro 1 style)
    DualOpl2,
    /// YMF262
    Opl3,
}

/// A register write as seen by the card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimWrite {
    /// Port offset used for the data byte (1, 3 or 9)
    pub port_offset: u16,
    /// Logical register, 0x100 added for the second bank/chip
    pub register: u16,
    pub value: u8,
}

#[derive(Debug, Clone)]
struct SimOplChip {
    latch: u8,
    regs: [u8; 256],
    flags: u8,
}

impl SimOplChip {
    fn new() -> Self {
        Self {
            latch: 0,
            regs: [0; 256],
            flags: 0,
        }
    }

    fn write(&mut self, value: u8, has_timers: bool) {
        self.regs[self.latch as usize] = value;
        if has_timers && self.latch == 0x04 {
            if value & 0x80 != 0 {
                self.flags = 0;
            } else if value & 0x01 != 0 && value & 0x40 == 0 {
                // Timer 1 overflows long before anyone reads status again
                self.flags = 0xC0;
            }
        }
    }
}

/// Simulated FM card on the ISA bus
#[derive(Debug, Clone)]
pub struct SimOpl {
    base: u16,
    kind: SimChip,
    chips: [SimOplChip; 2],
    writes: Vec<SimWrite>,
    io_cycles: u64,
    recording: bool,
}

impl SimOpl {
    pub fn new(kind: SimChip, base: u16) -> Self {
        Self {
            base,
            kind,
            chips: [SimOplChip::new(), SimOplChip::new()],
            writes: Vec::new(),
            io_cycles: 0,
            recording: true,
        }
    }

    pub fn kind(&self) -> SimChip {
        self.kind
    }

    /// Current contents of a logical register (0x000-0x1FF)
    pub fn register(&self, register: u16) -> u8 {
        let chip = ((register >> 8) & 1) as usize;
        self.chips[chip].regs[(register & 0xFF) as usize]
    }

    /// Every data write since the last [`SimOpl::clear_writes`]
    pub fn writes(&self) -> &[SimWrite] {
        &self.writes
    }

    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }

    /// Stops appending to the write log (long CLI runs)
    pub fn set_recording(&mut self, recording: bool) {
        self.recording = recording;
        if !recording {
            self.writes.clear();
        }
    }

    /// Total settle cycles burnt by the driver
    pub fn io_cycles(&self) -> u64 {
        self.io_cycles
    }

    fn status(&self, chip: usize) -> u8 {
        match (self.kind, chip) {
            (SimChip::Absent, _) => 0xFF,
            // OPL2 parts leave bits 1-2 set; the YMF262 reads them as zero
            (SimChip::Opl2, 0) | (SimChip::DualOpl2, _) => self.chips[chip].flags | 0x06,
            (SimChip::Opl3, 0) => self.chips[0].flags,
            _ => 0xFF,
        }
    }

    fn data_write(&mut self, chip: usize, port_offset: u16, value: u8) {
        let has_timers = chip == 0 || self.kind == SimChip::DualOpl2;
        self.chips[chip].write(value, has_timers);
        if self.recording {
            self.writes.push(SimWrite {
                port_offset,
                register: ((chip as u16) << 8) | self.chips[chip].latch as u16,
                value,
            });
        }
    }
}

impl IoBus for SimOpl {
    fn inb(&mut self, port: u16) -> u8 {
        match port.wrapping_sub(self.base) {
            0 => self.status(0),
            2 => self.status(1),
            _ => 0xFF,
        }
    }

    fn outb(&mut self, port: u16, value: u8) {
        if self.kind == SimChip::Absent || port == DELAY_PORT {
            return;
        }
        let offset = port.wrapping_sub(self.base);
        match (offset, self.kind) {
            (0, _) => self.chips[0].latch = value,
            (1, _) => self.data_write(0, offset, value),
            (2, SimChip::DualOpl2 | SimChip::Opl3) => self.chips[1].latch = value,
            (3, SimChip::DualOpl2 | SimChip::Opl3) => self.data_write(1, offset, value),
            // Sound Blaster Pro routes base+8/9 to both chips at once
            (8, SimChip::DualOpl2) => {
                self.chips[0].latch = value;
                self.chips[1].latch = value;
            }
            (9, SimChip::DualOpl2) => {
                self.data_write(0, offset, value);
                self.data_write(1, offset, value);
            }
            (8, _) => self.chips[0].latch = value,
            (9, _) => self.data_write(0, offset, value),
            _ => {}
        }
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
    fn test_timer_flags_follow_control_register() {
        let mut card = SimOpl::new(SimChip::Opl2, 0x388);
        card.outb(0x388, 0x04);
        card.outb(0x389, 0x21);
        assert_eq!(card.inb(0x388) & 0xE0, 0xC0);
        card.outb(0x389, 0x80);
        assert_eq!(card.inb(0x388) & 0xE0, 0x00);
    }

    #[test]
    fn test_dual_mirror_port_reaches_both_chips() {
        let mut card = SimOpl::new(SimChip::DualOpl2, 0x220);
        card.outb(0x228, 0xA0);
        card.outb(0x229, 0x44);
        assert_eq!(card.register(0x0A0), 0x44);
        assert_eq!(card.register(0x1A0), 0x44);
    }

    #[test]
    fn test_absent_card_floats_high() {
        let mut card = SimOpl::new(SimChip::Absent, 0x388);
        card.outb(0x388, 0x04);
        card.outb(0x389, 0x21);
        assert_eq!(card.inb(0x388), 0xFF);
        assert!(card.writes().is_empty());
    }
}
