//! Software stand-ins for the ISA cards and host timer

pub mod interwave;
pub mod opl;
pub mod timer;

pub use interwave::{SimCardKind, SimInterWave, SimVoiceWrite};
pub use opl::{SimChip, SimOpl, SimWrite};
pub use timer::{VirtualIrq, VirtualTimer};
