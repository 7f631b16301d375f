//! Per-voice bookkeeping and volume math

use super::GusKind;
use super::sample::SampleType;
use serde::Serialize;

/// Which loop of the current sample is active
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoopSelect {
    #[default]
    None,
    Sustain,
    Normal,
}

impl LoopSelect {
    /// Player encoding 0 = none, 1 = sustain, 2 = normal
    pub fn from_param(value: i32) -> Option<LoopSelect> {
        match value {
            0 => Some(LoopSelect::None),
            1 => Some(LoopSelect::Sustain),
            2 => Some(LoopSelect::Normal),
            _ => None,
        }
    }

    /// Fall back to a loop the sample actually has
    pub fn resolve(self, kind: SampleType) -> LoopSelect {
        let mut select = self;
        if select == LoopSelect::Sustain && !kind.contains(SampleType::SUSTAIN_LOOP) {
            select = LoopSelect::Normal;
        }
        if select == LoopSelect::Normal && !kind.contains(SampleType::LOOP) {
            select = LoopSelect::None;
        }
        select
    }
}

/// Requested playback direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    Forward,
    Backward,
    Toggle,
}

impl Direction {
    pub fn from_param(value: i32) -> Option<Direction> {
        match value {
            0 => Some(Direction::Forward),
            1 => Some(Direction::Backward),
            2 => Some(Direction::Toggle),
            _ => None,
        }
    }
}

/// Global mix settings shared by every voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Master {
    pub volume: i32,
    pub panning: i32,
    pub balance: i32,
    pub reverb: i32,
    /// Pitch scale, 256 = unchanged
    pub pitch: u32,
    /// Output gain, 65536 = unity
    pub amplify: u32,
    /// Tempo scale, 256 = unchanged
    pub speed: u32,
    pub filter: bool,
}

impl Default for Master {
    fn default() -> Self {
        Self {
            volume: 64,
            panning: 64,
            balance: 0,
            reverb: 0,
            pitch: 256,
            amplify: 65536,
            speed: 256,
            filter: false,
        }
    }
}

impl Master {
    /// Scale one side down by the balance setting
    fn apply_balance(&self, left: i32, right: i32) -> (i32, i32) {
        match self.balance {
            0 => (left, right),
            b if b < 0 => (left, (right * (64 + b)) >> 6),
            b => ((left * (64 - b)) >> 6, right),
        }
    }
}

/// Output levels derived from a voice's musical parameters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Levels {
    pub volume: u16,
    pub left: u16,
    pub right: u16,
    pub reverb: u16,
    /// Index into the effects routing table
    pub fx_send: u8,
}

/// Compute the levels of a voice from its volume, pan and reverb send.
///
/// On the InterWave volume and pan are independent (pan goes through the
/// per-side offsets); the GF1 splits the volume itself between the sides.
pub fn levels(kind: GusKind, master: &Master, volume: i32, pan: i32, reverb: i32) -> Levels {
    let amplify = master.amplify as i64;
    let scaled = ((volume as i64 * master.volume as i64 * amplify) >> 20).min(0x1FF) as i32;

    match kind {
        GusKind::Amd => {
            let right = ((((pan * master.panning) >> 6) + 128) << 1).min(0x1FF);
            let left = 0x1FF - right;
            let fx_send = (right >> 8) as u8;

            let mr = master.reverb;
            let reverb = if mr > 0 {
                (mr << 2) + ((reverb * (64 - mr)) >> 6)
            } else {
                (reverb * (mr + 64)) >> 6
            }
            .min(0x1FF);

            let (left, right) = master.apply_balance(left, right);
            Levels {
                volume: scaled.max(0) as u16,
                left: left.max(0) as u16,
                right: right.max(0) as u16,
                reverb: reverb.max(0) as u16,
                fx_send,
            }
        }
        GusKind::Gf1 => {
            let right = (scaled * (((pan * master.panning) >> 6) + 128)) >> 8;
            let left = scaled - right;
            let (left, right) = master.apply_balance(left, right);
            let (left, right) = (left.max(0), right.max(0));
            Levels {
                volume: (left + right) as u16,
                left: left as u16,
                right: right as u16,
                reverb: 0,
                fx_send: 0,
            }
        }
    }
}

/// Left and right offsets of a reverb voice with preset pan `panning`
pub fn fx_levels(master: &Master, panning: i32) -> (u16, u16) {
    let (left, right) = master.apply_balance(0x200 - panning, panning);
    (left.max(0) as u16, right.max(0) as u16)
}

/// Pending changes set between ticks, consumed by the next tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pending {
    /// Voice must be stopped (instrument change or explicit stop)
    pub stop: bool,
    pub sample: Option<usize>,
    /// Position in frames of the unreduced sample
    pub position: Option<u32>,
    pub loop_select: Option<LoopSelect>,
    pub direction: Option<Direction>,
}

/// One hardware voice as the engine tracks it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Voice {
    pub inited: bool,
    pub pending: Pending,

    pub sample: Option<usize>,
    pub bank: u8,
    pub kind: SampleType,
    pub reduction: u8,
    pub sample_rate: u32,

    // Card addresses, in frames of the sample's width
    pub start: u32,
    pub end: u32,
    pub loop_start: u32,
    pub loop_end: u32,
    pub sustain_start: u32,
    pub sustain_end: u32,
    pub current_start: u32,
    pub current_end: u32,
    pub current_loop: LoopSelect,
    /// Voice control bits as last programmed
    pub mode: u8,

    pub freq: u32,
    pub divisor: u32,
    pub volume: i32,
    pub pan: i32,
    pub reverb: i32,
    pub levels: Levels,

    pub muted: bool,
    pub was_playing: bool,
}

impl Voice {
    /// Select a sample; the voice stops until a position is given
    pub fn set_instrument(&mut self, sample: usize) {
        self.pending.stop = true;
        self.pending.position = None;
        self.pending.sample = Some(sample);
        self.pending.loop_select = Some(LoopSelect::Sustain);
        self.inited = true;
    }

    pub fn stop(&mut self) {
        self.pending.position = None;
        self.pending.stop = true;
    }

    /// Back to power-on state; mute survives
    pub fn reset(&mut self) {
        let muted = self.muted;
        *self = Voice::default();
        self.muted = muted;
    }

    /// Whether the next tick has to touch this voice before reprogramming
    pub fn needs_ramp_down(&self) -> bool {
        self.inited && (self.pending.stop || self.pending.position.is_some())
    }
}
