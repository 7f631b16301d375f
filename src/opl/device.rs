//! OPL device model: timed register writes and the silent reset sequence

use super::shadow::RegisterShadow;
use super::{ChipKind, WriteTiming};
use crate::hw::IoBus;

/// Operator register offsets, two per channel. Channels 10-18 live in the
/// secondary bank.
pub const OPERATOR_ORDER: [u16; 36] = [
    0x00, 0x03, 0x01, 0x04, 0x02, 0x05, //
    0x08, 0x0B, 0x09, 0x0C, 0x0A, 0x0D, //
    0x10, 0x13, 0x11, 0x14, 0x12, 0x15, //
    0x100, 0x103, 0x101, 0x104, 0x102, 0x105, //
    0x108, 0x10B, 0x109, 0x10C, 0x10A, 0x10D, //
    0x110, 0x113, 0x111, 0x114, 0x112, 0x115,
];

/// Channels per register bank
pub const CHANNELS_PER_BANK: u16 = 9;

/// OPL3 "NEW" bit register (secondary bank 0x05)
pub const REG_OPL3_NEW: u16 = 0x105;

/// OPL3 4-operator connection select
pub const REG_OPL3_FOUR_OP: u16 = 0x104;

/// One or two FM chips behind an I/O base, with their register shadow
pub struct OplDevice<B: IoBus> {
    bus: B,
    base: u16,
    port: u16,
    chip: ChipKind,
    timing: WriteTiming,
    shadow: RegisterShadow,
}

impl<B: IoBus> OplDevice<B> {
    /// A device at `base`, assuming OPL2 bus timing until detection says otherwise
    pub fn new(bus: B, base: u16) -> Self {
        Self {
            bus,
            base,
            port: base,
            chip: ChipKind::None,
            timing: WriteTiming::OPL2,
            shadow: RegisterShadow::new(),
        }
    }

    pub fn base(&self) -> u16 {
        self.base
    }

    /// Port the next writes go to (base, or base+8 on dual-OPL2 mono routing)
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn chip(&self) -> ChipKind {
        self.chip
    }

    pub fn timing(&self) -> WriteTiming {
        self.timing
    }

    pub fn shadow(&self) -> &RegisterShadow {
        &self.shadow
    }

    pub fn shadow_mut(&mut self) -> &mut RegisterShadow {
        &mut self.shadow
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

    /// Fix the detected chip and its write timing
    pub(crate) fn set_chip(&mut self, chip: ChipKind) {
        self.chip = chip;
        self.timing = chip.timing();
    }

    /// Route subsequent writes through `base + offset`
    pub(crate) fn set_port_offset(&mut self, offset: u16) {
        self.port = self.base + offset;
    }

    /// Raw status register read (primary or secondary status port)
    pub(crate) fn read_status(&mut self, secondary: bool) -> u8 {
        let port = if secondary { self.port + 2 } else { self.port };
        self.bus.inb(port)
    }

    /// Write one register: select, settle, data, settle.
    ///
    /// Registers 0x100 and up go through the secondary port pair.
    pub fn write(&mut self, register: u16, value: u8) {
        let (addr_port, data_port) = if register >= 0x100 {
            (self.port + 2, self.port + 3)
        } else {
            (self.port, self.port + 1)
        };

        self.bus.outb(addr_port, (register & 0xFF) as u8);
        self.bus.io_delay(self.timing.register as u32);
        self.bus.outb(data_port, value);
        self.bus.io_delay(self.timing.data as u32);

        self.shadow.record(register, value);
    }

    /// Bitmask of channels (bit n = channel n, 0-17) with key-on set
    pub fn keyed_channels(&self) -> u32 {
        let mut mask = 0;
        for channel in 0..CHANNELS_PER_BANK * 2 {
            let bank = (channel / CHANNELS_PER_BANK) << 8;
            let register = bank | (0xB0 + channel % CHANNELS_PER_BANK);
            if self.shadow.get(register) & 0x20 != 0 {
                mask |= 1 << channel;
            }
        }
        mask
    }

    /// Silence every voice and return the chip to power-on register state.
    ///
    /// The order matters on real hardware: levels are driven to maximum
    /// attenuation with the fastest envelope first so voices decay instead of
    /// clicking, and the OPL3 NEW bit is cleared only after everything it
    /// gates has been zeroed. The reset always addresses the chips through
    /// the base port, whatever routing is in effect.
    pub fn reset_all(&mut self) {
        let routed = std::mem::replace(&mut self.port, self.base);
        self.reset_chips();
        self.port = routed;
    }

    fn reset_chips(&mut self) {
        let both_banks = self.chip.has_secondary_bank();

        if self.chip == ChipKind::Opl3 {
            self.write(REG_OPL3_NEW, 0x01);
        }

        self.clear_channels(0x000);
        if both_banks {
            self.clear_channels(0x100);
        }

        let operators = if both_banks { 36 } else { 18 };
        for &op in &OPERATOR_ORDER[..operators] {
            self.write(0x20 + op, 0x00);
            self.write(0x40 + op, 0x3F);
            self.write(0x60 + op, 0xFF);
            self.write(0x80 + op, 0xFF);
            self.write(0xE0 + op, 0x00);
        }

        self.write(0xBD, 0x00);
        if both_banks {
            self.write(0x1BD, 0x00);
        }

        for &op in &OPERATOR_ORDER[..operators] {
            self.write(0x60 + op, 0x00);
            self.write(0x80 + op, 0x00);
            self.write(0x40 + op, 0x00);
        }

        for register in 0x00..0x20 {
            self.write(register, 0x00);
        }

        match self.chip {
            ChipKind::DualOpl2 => {
                for register in 0x100..0x120 {
                    self.write(register, 0x00);
                }
            }
            ChipKind::Opl3 => {
                for register in 0x100..=0x103 {
                    self.write(register, 0x00);
                }
                for register in 0x106..0x120 {
                    self.write(register, 0x00);
                }
                // 4-op select must drop before NEW; NEW goes last
                self.write(REG_OPL3_FOUR_OP, 0x00);
                self.write(REG_OPL3_NEW, 0x00);
            }
            ChipKind::None | ChipKind::Opl2 => {}
        }
    }

    fn clear_channels(&mut self, bank: u16) {
        for channel in 0..CHANNELS_PER_BANK {
            self.write(bank + 0xA0 + channel, 0x00);
            self.write(bank + 0xB0 + channel, 0x00);
            self.write(bank + 0xC0 + channel, 0x30);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::sim::{SimChip, SimOpl};

    fn device(kind: SimChip, chip: ChipKind) -> OplDevice<SimOpl> {
        let mut dev = OplDevice::new(SimOpl::new(kind, 0x388), 0x388);
        dev.set_chip(chip);
        dev
    }

    #[test]
    fn test_secondary_write_uses_upper_ports() {
        let mut dev = device(SimChip::Opl3, ChipKind::Opl3);
        dev.write(0x1C0, 0x2F);
        let write = dev.bus().writes()[0];
        assert_eq!(write.port_offset, 3);
        assert_eq!(write.register, 0x1C0);
        assert_eq!(dev.shadow().get(0x1C0), 0x2F);
    }

    #[test]
    fn test_write_timing_follows_chip() {
        let mut dev = device(SimChip::Opl2, ChipKind::Opl2);
        dev.write(0x20, 0x01);
        assert_eq!(dev.bus().io_cycles(), 12 + 64);

        let mut dev = device(SimChip::Opl3, ChipKind::Opl3);
        dev.write(0x20, 0x01);
        assert_eq!(dev.bus().io_cycles(), 4 + 4);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut dev = device(SimChip::Opl3, ChipKind::Opl3);
        dev.write(0xB0, 0x31);
        dev.write(0x105, 0x01);
        dev.write(0x104, 0x3F);
        dev.reset_all();
        let once = dev.shadow().values().to_vec();
        dev.reset_all();
        assert_eq!(dev.shadow().values().to_vec(), once);
    }

    #[test]
    fn test_opl3_reset_touches_new_bit_first_and_last() {
        let mut dev = device(SimChip::Opl3, ChipKind::Opl3);
        dev.reset_all();
        let writes = dev.bus().writes();
        assert_eq!(writes.first().map(|w| (w.register, w.value)), Some((0x105, 0x01)));
        assert_eq!(writes.last().map(|w| (w.register, w.value)), Some((0x105, 0x00)));
        let four_op = writes.iter().rposition(|w| w.register == 0x104).unwrap();
        assert_eq!(four_op, writes.len() - 2);
        assert_eq!(dev.bus().register(0x105), 0);
    }

    #[test]
    fn test_reset_attenuates_before_zeroing_levels() {
        let mut dev = device(SimChip::Opl2, ChipKind::Opl2);
        dev.reset_all();
        let writes = dev.bus().writes();
        let first_40 = writes.iter().position(|w| w.register == 0x40).unwrap();
        let last_40 = writes.iter().rposition(|w| w.register == 0x40).unwrap();
        assert_eq!(writes[first_40].value, 0x3F);
        assert_eq!(writes[last_40].value, 0x00);
        let percussion = writes.iter().position(|w| w.register == 0xBD).unwrap();
        assert!(first_40 < percussion && percussion < last_40);
        assert!(writes.iter().all(|w| w.register < 0x100));
    }

    #[test]
    fn test_reset_bypasses_mirror_routing() {
        let mut dev = device(SimChip::DualOpl2, ChipKind::DualOpl2);
        dev.set_port_offset(8);
        dev.write(0xB0, 0x31);
        assert_eq!(dev.bus().register(0x1B0), 0x31);
        dev.reset_all();
        assert_eq!(dev.bus().register(0x0B0), 0x00);
        assert_eq!(dev.bus().register(0x1B0), 0x00);
        assert_eq!(dev.port(), 0x388 + 8);
    }

    #[test]
    fn test_keyed_channels_reads_shadow() {
        let mut dev = device(SimChip::Opl3, ChipKind::Opl3);
        dev.write(0xB2, 0x20);
        dev.write(0x1B0, 0x31);
        assert_eq!(dev.keyed_channels(), (1 << 2) | (1 << 9));
    }
}
