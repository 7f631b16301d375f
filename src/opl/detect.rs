//! OPL presence probe using the timer-1 status flags

use super::{ChipKind, OplDevice};
use crate::hw::IoBus;

/// Status bits that carry the IRQ/timer flags; the rest float on some cards
const STATUS_FLAG_MASK: u8 = 0xE0;

/// Status bits 1-2 read as zero only on a YMF262
const STATUS_OPL2_ID_MASK: u8 = 0x06;

/// True when status read idle before timer 1 started and flagged after
pub fn timer_probe_passed(before: u8, after: u8) -> bool {
    before & STATUS_FLAG_MASK == 0x00 && after & STATUS_FLAG_MASK == 0xC0
}

/// Probe for FM hardware at the device's base port.
///
/// Runs timer 1 on the primary chip; a passing probe whose status lacks the
/// OPL2 identification bits is an OPL3. Otherwise the same probe through the
/// secondary port pair distinguishes a second discrete OPL2. The device's
/// write timing is set from the result.
pub fn detect<B: IoBus>(dev: &mut OplDevice<B>) -> ChipKind {
    let (before, after) = probe_timer(dev, false, 100);

    let chip = if !timer_probe_passed(before, after) {
        ChipKind::None
    } else if after & STATUS_OPL2_ID_MASK == 0 {
        ChipKind::Opl3
    } else {
        let (before, after) = probe_timer(dev, true, 10);
        if timer_probe_passed(before, after) {
            ChipKind::DualOpl2
        } else {
            ChipKind::Opl2
        }
    };

    dev.set_chip(chip);
    match chip {
        ChipKind::None => log::warn!("no OPL found at {:#05x}", dev.base()),
        _ => log::info!("{} detected at {:#05x}", chip.name(), dev.base()),
    }
    chip
}

fn probe_timer<B: IoBus>(dev: &mut OplDevice<B>, secondary: bool, wait_ms: u32) -> (u8, u8) {
    let bank = if secondary { 0x100 } else { 0x000 };

    // Mask both timers, then clear the IRQ flags
    dev.write(bank | 0x04, 0x60);
    dev.write(bank | 0x04, 0x80);
    let before = dev.read_status(secondary);

    dev.write(bank | 0x02, 0xFF);
    dev.write(bank | 0x04, 0x21);
    // Timer 1 at 0xFF overflows after 80us
    dev.bus_mut().delay_ms(wait_ms);
    let after = dev.read_status(secondary);

    dev.write(bank | 0x04, 0x60);
    dev.write(bank | 0x04, 0x80);
    (before, after)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::sim::{SimChip, SimOpl};

    fn detect_sim(kind: SimChip) -> ChipKind {
        let mut dev = OplDevice::new(SimOpl::new(kind, 0x388), 0x388);
        detect(&mut dev)
    }

    #[test]
    fn test_probe_pattern() {
        assert!(timer_probe_passed(0x00, 0xC0));
        assert!(timer_probe_passed(0x06, 0xC6));
        assert!(!timer_probe_passed(0x00, 0x00));
        assert!(!timer_probe_passed(0xFF, 0xFF));
        assert!(!timer_probe_passed(0x20, 0xC0));
        assert!(!timer_probe_passed(0x00, 0x80));
    }

    #[test]
    fn test_detects_each_card() {
        assert_eq!(detect_sim(SimChip::Absent), ChipKind::None);
        assert_eq!(detect_sim(SimChip::Opl2), ChipKind::Opl2);
        assert_eq!(detect_sim(SimChip::DualOpl2), ChipKind::DualOpl2);
        assert_eq!(detect_sim(SimChip::Opl3), ChipKind::Opl3);
    }

    #[test]
    fn test_detection_sets_timing() {
        let mut dev = OplDevice::new(SimOpl::new(SimChip::Opl3, 0x388), 0x388);
        detect(&mut dev);
        assert_eq!(dev.timing(), super::super::WriteTiming::OPL3);
    }
}
