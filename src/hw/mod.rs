//! Hardware capabilities consumed by the OPL and wavetable engines
//!
//! The engines never touch ports or timers directly. They drive an [`IoBus`]
//! for register traffic and a [`PeriodicTimer`] (or [`IrqLine`]) for their
//! tick source. The host wires the real interrupt to the engine's tick entry
//! point; everything in [`sim`] stands in for real hardware in the binaries
//! and tests.

pub mod irq;
pub mod sim;

pub use irq::InterruptGuard;

use std::time::Duration;

/// ISA POST diagnostic port, read to burn bus cycles between register writes
pub const DELAY_PORT: u16 = 0x80;

/// Byte/word port I/O on the ISA bus
pub trait IoBus {
    fn inb(&mut self, port: u16) -> u8;

    fn outb(&mut self, port: u16, value: u8);

    fn inw(&mut self, port: u16) -> u16 {
        let lo = self.inb(port) as u16;
        let hi = self.inb(port + 1) as u16;
        lo | (hi << 8)
    }

    fn outw(&mut self, port: u16, value: u16) {
        self.outb(port, (value & 0xFF) as u8);
        self.outb(port + 1, (value >> 8) as u8);
    }

    /// Bounded settle delay measured in ISA read cycles.
    ///
    /// Chip write timing is specified in bus cycles rather than wall time,
    /// so the default spins on the diagnostic port.
    fn io_delay(&mut self, cycles: u32) {
        for _ in 0..cycles {
            self.inb(DELAY_PORT);
        }
    }

    /// Coarse delay used only outside of interrupt context (probing, reset).
    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(ms as u64));
    }
}

impl<B: IoBus + ?Sized> IoBus for &mut B {
    fn inb(&mut self, port: u16) -> u8 {
        (**self).inb(port)
    }

    fn outb(&mut self, port: u16, value: u8) {
        (**self).outb(port, value)
    }

    fn inw(&mut self, port: u16) -> u16 {
        (**self).inw(port)
    }

    fn outw(&mut self, port: u16, value: u16) {
        (**self).outw(port, value)
    }

    fn io_delay(&mut self, cycles: u32) {
        (**self).io_delay(cycles)
    }

    fn delay_ms(&mut self, ms: u32) {
        (**self).delay_ms(ms)
    }
}

/// An interrupt source that can be masked around shared-state mutation
pub trait InterruptSource {
    /// Masks the source and reports whether it was enabled before.
    fn mask(&mut self) -> bool;

    /// Restores the state returned by the matching [`InterruptSource::mask`].
    fn unmask(&mut self, was_enabled: bool);
}

/// Periodic host timer (Timer A on the Atari MFP, the PIT on a PC)
///
/// The host calls the engine's tick entry point on every expiry.
pub trait PeriodicTimer: InterruptSource {
    /// Arms the periodic callback near `hz` and returns the rate the
    /// hardware divider actually produced. Tick math must use the return
    /// value.
    fn hook(&mut self, hz: u32) -> u32;

    /// Disarms the callback. No tick may run after this returns.
    fn unhook(&mut self);
}

/// ISA interrupt line claimed by a sound card's onboard timer
pub trait IrqLine: InterruptSource {
    /// Claims `irq` for the card handler; false if the line is unavailable.
    fn attach(&mut self, irq: u8) -> bool;

    fn detach(&mut self);
}
