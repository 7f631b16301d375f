//! Virtual timer and IRQ line

use crate::hw::{InterruptSource, IrqLine, PeriodicTimer};

/// Timer that records how it was programmed instead of firing.
///
/// The driver loop (CLI or test) calls the engine's tick entry point while
/// [`VirtualTimer::is_armed`] holds.
#[derive(Debug, Clone)]
pub struct VirtualTimer {
    granularity: u32,
    armed: bool,
    enabled: bool,
    rate: u32,
    hooks: u32,
    unhooks: u32,
    masks: u32,
}

impl VirtualTimer {
    /// A timer that produces exactly the requested rate
    pub fn new() -> Self {
        Self::with_granularity(1)
    }

    /// A timer whose divider only reaches multiples of `step` Hz
    pub fn with_granularity(step: u32) -> Self {
        Self {
            granularity: step.max(1),
            armed: false,
            enabled: true,
            rate: 0,
            hooks: 0,
            unhooks: 0,
            masks: 0,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// True when armed and not masked, i.e. a tick would be delivered now
    pub fn would_fire(&self) -> bool {
        self.armed && self.enabled
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn hook_count(&self) -> u32 {
        self.hooks
    }

    pub fn unhook_count(&self) -> u32 {
        self.unhooks
    }

    pub fn mask_count(&self) -> u32 {
        self.masks
    }
}

impl Default for VirtualTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptSource for VirtualTimer {
    fn mask(&mut self) -> bool {
        self.masks += 1;
        std::mem::replace(&mut self.enabled, false)
    }

    fn unmask(&mut self, was_enabled: bool) {
        self.enabled = was_enabled;
    }
}

impl PeriodicTimer for VirtualTimer {
    fn hook(&mut self, hz: u32) -> u32 {
        let step = self.granularity;
        let actual = ((hz + step / 2) / step).max(1) * step;
        self.rate = actual;
        self.armed = true;
        self.hooks += 1;
        actual
    }

    fn unhook(&mut self) {
        self.armed = false;
        self.unhooks += 1;
    }
}

/// IRQ line that accepts any vector unless told otherwise
#[derive(Debug, Clone, Default)]
pub struct VirtualIrq {
    unavailable: bool,
    attached: Option<u8>,
    enabled: bool,
}

impl VirtualIrq {
    pub fn new() -> Self {
        Self {
            unavailable: false,
            attached: None,
            enabled: true,
        }
    }

    /// A line whose `attach` always fails
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::new()
        }
    }

    pub fn attached(&self) -> Option<u8> {
        self.attached
    }
}

impl InterruptSource for VirtualIrq {
    fn mask(&mut self) -> bool {
        std::mem::replace(&mut self.enabled, false)
    }

    fn unmask(&mut self, was_enabled: bool) {
        self.enabled = was_enabled;
    }
}

impl IrqLine for VirtualIrq {
    fn attach(&mut self, irq: u8) -> bool {
        if self.unavailable {
            return false;
        }
        self.attached = Some(irq);
        true
    }

    fn detach(&mut self) {
        self.attached = None;
    }
}
