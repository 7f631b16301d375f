//! OPL register shadow
//!
//! Mirrors every value written to the hardware, since OPL registers are
//! write-only, plus a change map so a front end can redraw only what moved.

/// Logical registers 0x000-0x1FF (primary + secondary bank)
pub const REGISTER_COUNT: usize = 0x200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterShadow {
    values: [u8; REGISTER_COUNT],
    dirty: [bool; REGISTER_COUNT],
}

impl RegisterShadow {
    pub fn new() -> Self {
        Self {
            values: [0; REGISTER_COUNT],
            dirty: [false; REGISTER_COUNT],
        }
    }

    /// Record a hardware write and flag the register as changed
    pub fn record(&mut self, register: u16, value: u8) {
        let index = register as usize & (REGISTER_COUNT - 1);
        self.values[index] = value;
        self.dirty[index] = true;
    }

    /// Last value written to `register`
    pub fn get(&self, register: u16) -> u8 {
        self.values[register as usize & (REGISTER_COUNT - 1)]
    }

    pub fn is_dirty(&self, register: u16) -> bool {
        self.dirty[register as usize & (REGISTER_COUNT - 1)]
    }

    pub fn values(&self) -> &[u8; REGISTER_COUNT] {
        &self.values
    }

    /// Registers written since the last call, in address order
    pub fn take_changes(&mut self) -> Vec<u16> {
        let mut changed = Vec::new();
        for (index, flag) in self.dirty.iter_mut().enumerate() {
            if std::mem::take(flag) {
                changed.push(index as u16);
            }
        }
        changed
    }

    pub fn clear_changes(&mut self) {
        self.dirty = [false; REGISTER_COUNT];
    }
}

impl Default for RegisterShadow {
    fn default() -> Self {
        Self::new()
    }
}
