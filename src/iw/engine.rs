//! The voice engine proper
//!
//! [`InterWave`] owns the card, its timer sources and the voice table. Tick
//! work happens in [`InterWave::on_timer`] (host timer) or
//! [`InterWave::on_card_irq`] (the card's own timer 1); everything else
//! runs with the active tick source masked.

use super::card::{port, reg, Card, Point, MODE_BACKWARD, MODE_STOPPED};
use super::config::InterWaveConfig;
use super::memory::{self, MemoryLayout, VolumeTable, FX_BUFFER_SIZE};
use super::sample::{self, SampleInfo, SampleType};
use super::voice::{self, Direction, LoopSelect, Master, Pending, Voice};
use super::{
    freq8363, umuldiv, umuldivrnd, ChannelControl, ChannelPlayer, GusKind, Param,
    EFFECT_VOICES, GF1_MIN_VOICES, MAX_SAMPLES, VOICES,
};
use crate::error::{Error, Result};
use crate::hw::{InterruptSource, IoBus, IrqLine, PeriodicTimer};
use serde::Serialize;

/// PC interval timer input clock
pub const PIT_CLOCK: u64 = 1_193_046;

/// Card timer 1 rate (one count every 80us)
pub const CARD_TIMER_CLOCK: u64 = 12_615;

/// Tick rate in 1/256 Hz until the player says otherwise
pub const DEFAULT_SPEED: u32 = 50 * 256;

/// Slowest relative speed accepted
const MIN_RELATIVE_SPEED: u32 = 16;

/// Bound on the wait for a volume ramp to settle
const RAMP_WAIT_LIMIT: u32 = 512;

/// Bound on interrupt sources handled per card interrupt
const IRQ_ROUNDS: u32 = 8;

/// Reverb delay line lengths, in words
const REVERB_DELAY: [u32; 4] = [3395, 2023, 2857, 1796];
const REVERB_FEEDBACK: [u16; 4] = [0x80, 0xC0, 0xA0, 0x100];
const REVERB_FX_CHANNELS: [u8; 4] = [0xC0, 0xC0, 0x30, 0x30];
const REVERB_PANNING: [i32; 4] = [0x152, 0xAB, 0x200, 0];

/// Reverb voices a channel feeds, by effects send index
const PAN_TO_FX: [u8; 4] = [0xA0, 0x30, 0x30, 0x50];

/// Which interrupt drives the tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TickSource {
    /// No player open
    Idle,
    /// The card's timer 1, delivered on the configured IRQ
    Card,
    /// The host periodic timer
    Host,
}

/// A sample as it sits in card memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlacedSample {
    pub bank: u8,
    /// Byte offset within the bank
    pub offset: u32,
    pub length: u32,
    pub loop_start: u32,
    pub loop_end: u32,
    pub sustain_start: u32,
    pub sustain_end: u32,
    pub sample_rate: u32,
    pub kind: SampleType,
}

impl PlacedSample {
    fn new(info: &SampleInfo, bank: usize, offset: u32) -> Self {
        Self {
            bank: bank as u8,
            offset,
            length: info.length,
            loop_start: info.loop_start,
            loop_end: info.loop_end,
            sustain_start: info.sustain_start,
            sustain_end: info.sustain_end,
            sample_rate: info.sample_rate,
            kind: info.kind,
        }
    }
}

/// Tick timing for both sources. Card timer values are in 1/256 timer
/// counts, host timer values in PIT counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct TickClock {
    /// Tick rate in 1/256 Hz
    speed: u32,
    /// Tempo scale, 256 = unchanged
    relative: u32,

    card_len: u32,
    card_pos: u32,
    card_programmed: u32,

    host_len: u64,
    host_elapsed: u64,
    host_period: u64,
    host_hz: u32,
    host_time: u64,

    /// Accumulated tick time, in 1/3600 of 1/65536 s
    cmd_time: u64,
}

impl TickClock {
    fn card_tick_len(&self) -> u32 {
        umuldiv(
            256,
            CARD_TIMER_CLOCK * 256 * 256,
            self.speed as u64 * self.relative as u64,
        ) as u32
    }

    fn host_tick_len(&self) -> u64 {
        umuldiv(256, PIT_CLOCK * 256, self.speed as u64 * self.relative as u64)
    }

    /// Timer 1 preload for the current countdown
    fn card_count(&self) -> u8 {
        if (self.card_pos >> 8) <= 256 {
            (256 - (self.card_pos >> 8)) as u8
        } else {
            0
        }
    }
}

pub struct InterWave<B: IoBus, T: PeriodicTimer, I: IrqLine> {
    card: Card<B>,
    config: InterWaveConfig,
    layout: MemoryLayout,
    volumes: VolumeTable,
    timer: T,
    irq: I,
    effects: bool,
    force_effects: bool,
    voices: [Voice; VOICES],
    master: Master,
    samples: Vec<PlacedSample>,
    /// Channels granted to the player
    channels: usize,
    /// Voices the card is programmed to run
    active_voices: usize,
    paused: bool,
    clock: TickClock,
    source: TickSource,
    player: Option<Box<dyn ChannelPlayer>>,
}

impl<B: IoBus, T: PeriodicTimer, I: IrqLine> InterWave<B, T, I> {
    /// Find the card on the configured (or scanned) ports, size its memory
    /// and leave every voice silent.
    pub fn detect(bus: B, timer: T, irq: I, config: InterWaveConfig) -> Result<Self> {
        let mut card = Card::new(bus, 0, GusKind::Amd);
        let layout = config
            .candidate_ports()
            .into_iter()
            .find_map(|port| memory::test_port(&mut card, port, config.effects))
            .ok_or(Error::NoWavetableCard)?;

        let amd = card.kind() == GusKind::Amd;
        log::info!(
            "{} Ultrasound rev {} with {} KiB at port {:#05x}",
            if amd { "InterWave" } else { "GF1" },
            layout.revision,
            layout.total() / 1024,
            card.port()
        );

        let mut engine = Self {
            card,
            effects: config.effects && amd,
            force_effects: config.force_effects && amd,
            config,
            layout,
            volumes: VolumeTable::new(),
            timer,
            irq,
            voices: [Voice::default(); VOICES],
            master: Master::default(),
            samples: Vec::new(),
            channels: 0,
            active_voices: 0,
            paused: false,
            clock: TickClock {
                speed: DEFAULT_SPEED,
                relative: 256,
                ..TickClock::default()
            },
            source: TickSource::Idle,
            player: None,
        };
        engine.init_card(true, 0);
        Ok(engine)
    }

    /// Run `f` with the active tick source masked
    fn critical<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let was_enabled = match self.source {
            TickSource::Card => self.irq.mask(),
            TickSource::Host => self.timer.mask(),
            TickSource::Idle => false,
        };
        let result = f(self);
        match self.source {
            TickSource::Card => self.irq.unmask(was_enabled),
            TickSource::Host => self.timer.unmask(was_enabled),
            TickSource::Idle => {}
        }
        result
    }

    fn clear_pending_irqs(&mut self) {
        self.card.inp(port::IRQ_STATUS);
        self.card.in8(reg::DMA_CONTROL | reg::READ);
        self.card.in8(reg::SAMPLE_CONTROL | reg::READ);
        self.card.in8(0x8F);
    }

    /// Reset the synthesizer and program every voice silent. The first
    /// `voices` voices are left enabled; the rest are switched off.
    fn init_card(&mut self, enhanced: bool, voices: usize) {
        let amd = self.card.is_amd();
        let (enhanced, mut voices) = if amd {
            (enhanced, voices)
        } else {
            (false, voices.max(GF1_MIN_VOICES))
        };
        voices = voices.min(VOICES);
        if self.force_effects {
            voices = voices.min(EFFECT_VOICES.start);
        }
        self.active_voices = voices;

        let card = &mut self.card;
        card.reset();
        card.set_enhanced_mode(enhanced);
        card.out8(reg::DMA_CONTROL, 0x00);
        card.set_timer_control(0x00);
        card.out8(reg::SAMPLE_CONTROL, 0x00);
        if amd {
            card.out8(reg::ACTIVE_VOICES, 0xFF);
        } else {
            card.out8(reg::ACTIVE_VOICES, (voices as u8 - 1) | 0xC0);
        }
        self.clear_pending_irqs();

        let card = &mut self.card;
        for i in 0..VOICES {
            card.select_voice(i);
            card.set_volume(0);
            card.set_mode(0x03);
            card.set_volume_mode(0x03);
            card.set_point(0, Point::Current);
            if amd {
                card.set_point(1, Point::Current);
            }
            card.out8(reg::RAMP_RATE, 63);
            card.delay(10);

            if amd {
                card.out16(reg::PAN, 0xFFF0);
                if enhanced {
                    card.out8(reg::VOICE_MODE, if i < voices { 0x20 } else { 0x02 });
                    card.set_bank(0);
                    card.out16(reg::LEFT_OFFSET, 0xFFF0);
                    card.out16(reg::RIGHT_OFFSET_FINAL, 0xFFF0);
                    card.out16(reg::LEFT_OFFSET_FINAL, 0xFFF0);
                    card.out16(reg::FX_VOLUME, 0);
                    card.out16(reg::FX_VOLUME_FINAL, 0);
                    card.out8(reg::FX_CHANNELS, 0x00);
                } else {
                    card.out8(reg::VOICE_MODE, 0x00);
                }
            }
        }

        self.clear_pending_irqs();
        // Synth IRQ and DAC on
        self.card.out8(reg::RESET, 0x07);

        if amd && self.effects && enhanced && voices > 0 && voices < EFFECT_VOICES.start + 1 {
            self.setup_reverb();
        }

        self.card.select_voice(0);
        self.card.outp(port::MIX_CONTROL, 0x08);
        log::debug!("synthesizer reset with {voices} voices (enhanced {enhanced})");
    }

    /// Clear the delay lines and start voices 28-31 as the reverb generator
    fn setup_reverb(&mut self) {
        let bank = self.layout.fx_bank as u32;
        let position = self.layout.fx_position;
        self.card
            .fill_zero((bank << 22) + (position << 1), FX_BUFFER_SIZE);

        let mut at = ((bank & 1) << 21) | position;
        for (k, v) in EFFECT_VOICES.enumerate() {
            let card = &mut self.card;
            card.select_voice(v);
            card.set_mode(0x0C);
            card.set_volume_mode(0x07);
            card.out8(reg::UPPER_ADDRESS, (bank >> 1) as u8);
            card.set_point(at, Point::Current);
            card.set_point(at, Point::Start);
            card.set_point(at + 0xFFF, Point::End);
            card.set_point(at + REVERB_DELAY[k], Point::FxWrite);
            card.set_left_offset(0, true);
            card.set_right_offset(0, true);
            card.set_volume(0xFFF);
            card.set_fx_volume(self.volumes.get(REVERB_FEEDBACK[k]));
            card.set_fx_channels(REVERB_FX_CHANNELS[k]);
            card.set_frequency(0x400);
            card.out8(reg::VOICE_MODE, 0x21);
            at += 0x2000;
        }
    }

    fn recalc_voice(&mut self, channel: usize) {
        let kind = self.card.kind();
        let v = &mut self.voices[channel];
        v.levels = voice::levels(kind, &self.master, v.volume, v.pan, v.reverb);
    }

    fn recalc_all(&mut self) {
        for channel in 0..self.channels {
            self.recalc_voice(channel);
        }
    }

    /// Balance-adjusted outputs of the reverb voices
    fn calc_fx_levels(&mut self) {
        if !self.effects || self.channels > EFFECT_VOICES.start {
            return;
        }
        for (k, v) in EFFECT_VOICES.enumerate() {
            let (left, right) = voice::fx_levels(&self.master, REVERB_PANNING[k]);
            self.card.select_voice(v);
            self.card
                .set_left_offset(self.volumes.attenuation(left), true);
            self.card
                .set_right_offset(self.volumes.attenuation(right), true);
        }
    }

    /// Apply the changes collected since the last tick.
    ///
    /// Voices that change sample or position are stopped and ramped down
    /// first; only once the ramps have settled are they reprogrammed.
    fn process_tick(&mut self) {
        let mut ramping = [false; VOICES];
        for (i, ramp) in ramping.iter_mut().enumerate().take(self.channels) {
            let v = &self.voices[i];
            if v.needs_ramp_down() {
                self.card.select_voice(i);
                self.card.set_mode(v.mode | 0x03);
                self.card.fade_volume_down();
                *ramp = true;
            }
        }

        for (i, _) in ramping.iter().enumerate().filter(|(_, r)| **r) {
            self.card.select_voice(i);
            let mut spins = 0;
            while self.card.volume_mode() & 0x01 == 0 && spins < RAMP_WAIT_LIMIT {
                spins += 1;
            }
        }

        for i in 0..self.channels {
            self.program_voice(i);
        }
    }

    fn program_voice(&mut self, i: usize) {
        let kind = self.card.kind();
        self.card.select_voice(i);

        if !self.voices[i].inited {
            self.card.fade_volume_down();
            self.voices[i].pending = Pending::default();
            return;
        }

        let pending = self.voices[i].pending;
        if let Some(index) = pending.sample {
            if let Some(sample) = self.samples.get(index).copied() {
                self.assign_sample(i, index, &sample);
            }
        }

        let card = &mut self.card;
        let v = &mut self.voices[i];
        if pending.stop {
            v.mode |= MODE_STOPPED | 0x02;
        }
        let position = pending.position.map(|p| v.start + (p >> v.reduction));

        let select = pending.loop_select.map(|s| s.resolve(v.kind));
        match select {
            Some(LoopSelect::None) => {
                v.current_start = v.start;
                v.current_end = v.end;
                v.mode &= !0x18;
            }
            Some(LoopSelect::Sustain) => {
                v.current_start = v.sustain_start;
                v.current_end = v.sustain_end;
                v.mode = (v.mode & !0x18) | 0x08;
                if v.kind.contains(SampleType::SUSTAIN_BIDI) {
                    v.mode |= 0x10;
                }
            }
            Some(LoopSelect::Normal) => {
                v.current_start = v.loop_start;
                v.current_end = v.loop_end;
                v.mode = (v.mode & !0x18) | 0x08;
                if v.kind.contains(SampleType::BIDI) {
                    v.mode |= 0x10;
                }
            }
            None => {}
        }

        let mut dir = card.mode() & MODE_BACKWARD;
        if let Some(select) = select {
            v.current_loop = select;
            card.set_point(v.current_start, Point::Start);
            card.set_point(v.current_end, Point::End);
        }

        if let Some(direction) = pending.direction {
            dir = match direction {
                Direction::Forward => 0,
                Direction::Backward => MODE_BACKWARD,
                Direction::Toggle => dir ^ MODE_BACKWARD,
            };
        }

        let mut pos = None;
        if select.is_some() || pending.direction.is_some() {
            pos = Some(card.point());
        }
        if position.is_some() {
            pos = position;
        }

        if let Some(mut pos) = pos {
            let backward = dir != 0;
            if (pos < v.current_start && backward) || (pos >= v.current_end && !backward) {
                dir ^= MODE_BACKWARD;
            }
            if position.is_some() {
                v.mode &= !0x03;
                pos = pos.min(v.end).max(v.start);
                card.set_point(pos, Point::Current);
            }
            card.set_mode(v.mode | dir);
        }

        if card.mode() & MODE_STOPPED == 0 {
            let pitch = v.sample_rate as u64 * self.master.pitch as u64;
            let scaled = umuldivrnd(v.freq as u64, pitch, v.divisor as u64);
            let fc = match kind {
                GusKind::Amd => {
                    if v.muted {
                        card.fade_volume_down();
                    } else {
                        card.fade_volume(self.volumes.get(v.levels.volume));
                        card.set_left_offset(self.volumes.attenuation(v.levels.left), false);
                        card.set_right_offset(self.volumes.attenuation(v.levels.right), false);
                        card.set_fx_volume(self.volumes.get(v.levels.reverb));
                        card.set_fx_channels(PAN_TO_FX[v.levels.fx_send as usize & 3]);
                    }
                    scaled / 11025
                }
                GusKind::Gf1 => {
                    let total = (v.levels.left + v.levels.right) as u32;
                    if total != 0 {
                        card.set_pan(((15 * v.levels.right as u32 + total / 2) / total) as u8);
                    }
                    card.fade_volume(if v.muted {
                        0
                    } else {
                        self.volumes.get(total as u16)
                    });
                    umuldivrnd(scaled, self.active_voices as u64, 154_350)
                }
            };
            card.set_frequency(fc.min(0xFFFF) as u16);
        } else {
            card.fade_volume_down();
        }

        v.pending = Pending::default();
    }

    /// Point voice `i` at sample `index`; the voice stays stopped
    fn assign_sample(&mut self, i: usize, index: usize, sample: &PlacedSample) {
        let wide = sample.kind.contains(SampleType::BIT16);
        let mut start = sample.offset + ((sample.bank as u32) << 22);
        match self.card.kind() {
            GusKind::Amd if wide => start >>= 1,
            GusKind::Gf1 if wide => {
                start = (start & 0xC0000) | ((start >> 1) & 0x1FFFF) | 0x20000;
            }
            _ => {}
        }

        let v = &mut self.voices[i];
        v.sample = Some(index);
        v.bank = sample.bank;
        v.start = start;
        v.end = start + sample.length;
        v.loop_start = start + sample.loop_start;
        v.loop_end = start + sample.loop_end;
        v.sustain_start = start + sample.sustain_start;
        v.sustain_end = start + sample.sustain_end;
        v.sample_rate = sample.sample_rate;
        v.kind = sample.kind;
        v.reduction = sample.kind.reduction_level();
        v.pending.loop_select.get_or_insert(LoopSelect::Sustain);
        v.mode = if wide { 0x07 } else { 0x03 };

        let (mode, bank) = (v.mode, sample.bank >> wide as u8);
        let (left, right) = (v.levels.left, v.levels.right);
        self.card.set_bank(bank);
        self.card.set_mode(mode | 0x03);
        self.card
            .set_left_offset(self.volumes.attenuation(left), false);
        self.card
            .set_right_offset(self.volumes.attenuation(right), false);
    }

    /// Tick work shared by both sources
    fn run_tick(&mut self) {
        self.critical(Self::process_tick);

        if let Some(mut player) = self.player.take() {
            player.tick(self);
            if self.player.is_none() && self.source != TickSource::Idle {
                self.player = Some(player);
            }
        }
    }

    /// Host timer entry point
    pub fn on_timer(&mut self) {
        if self.source != TickSource::Host {
            return;
        }
        let clock = &mut self.clock;
        clock.host_time += clock.host_period;
        if self.paused {
            return;
        }

        clock.host_elapsed += clock.host_period;
        if clock.host_elapsed < clock.host_len {
            return;
        }
        clock.host_elapsed -= clock.host_len;
        let len = clock.host_len;

        self.run_tick();
        if self.source != TickSource::Host {
            return;
        }
        self.clock.cmd_time += len;
        self.clock.host_len = self.clock.host_tick_len();
        self.rehook_host();
    }

    /// Re-arm the host timer if the tick length moved to a new rate
    fn rehook_host(&mut self) {
        let hz = (PIT_CLOCK / self.clock.host_len.clamp(1, 65536)).max(1) as u32;
        if hz == self.clock.host_hz {
            return;
        }
        let actual = self.timer.hook(hz).max(1);
        if actual != hz {
            log::debug!("host timer runs at {actual} Hz (asked for {hz} Hz)");
        }
        self.clock.host_hz = hz;
        self.clock.host_period = PIT_CLOCK / actual as u64;
    }

    /// Card interrupt entry point
    pub fn on_card_irq(&mut self) {
        if self.source != TickSource::Card {
            return;
        }
        for _ in 0..IRQ_ROUNDS {
            let sources = self.card.inp(port::IRQ_STATUS);
            if sources == 0 {
                break;
            }
            if sources & 0x03 != 0 {
                self.card.inp(port::MIDI_CONTROL);
            }
            if sources & 0x04 != 0 {
                if self.paused {
                    self.card.set_timer_control(0x00);
                    self.card.set_timer_control(0x04);
                } else {
                    self.card_timer_expired();
                }
            }
            if sources & 0x08 != 0 {
                self.card.set_timer_control(0x00);
                self.card.set_timer_control(0x04);
            }
        }
    }

    /// Timer 1 counts at most 256 steps, so longer ticks are split into
    /// several countdowns and only the last one runs the tick.
    fn card_timer_expired(&mut self) {
        let clock = &mut self.clock;
        if (clock.card_pos >> 8) <= 256 {
            clock.card_pos = (clock.card_pos & 0xFF) + clock.card_len;
        } else {
            clock.card_pos -= 256 << 8;
        }

        if clock.card_pos != clock.card_programmed {
            clock.card_programmed = clock.card_pos;
            let count = clock.card_count();
            self.card.set_timer_control(0x00);
            self.card.set_timer_count(count);
            self.card.set_timer_control(0x04);
        }

        if (self.clock.card_pos.wrapping_sub(self.clock.card_len) >> 8) == 0 {
            let len = self.clock.card_len;
            self.run_tick();
            self.clock.cmd_time += umuldiv(len as u64, 256 * 65536, CARD_TIMER_CLOCK * 3600);
            self.clock.card_len = self.clock.card_tick_len();
        }
    }

    /// Freeze every playing voice (remembering which were playing) or
    /// restart them.
    pub fn pause(&mut self, paused: bool) {
        self.critical(|iw| iw.set_paused(paused));
    }

    fn set_paused(&mut self, paused: bool) {
        if paused == self.paused {
            return;
        }
        let card_timer = self.source == TickSource::Card;

        if self.paused {
            for i in 0..self.channels {
                if self.voices[i].was_playing {
                    self.card.select_voice(i);
                    let dir = self.card.mode() & MODE_BACKWARD;
                    self.card.set_mode(self.voices[i].mode | dir);
                }
            }
            self.clock.host_elapsed = 0;
            self.clock.card_pos = 0;
            self.paused = false;
            if card_timer {
                self.card.set_timer_control(0x04);
            }
        } else {
            self.paused = true;
            if card_timer {
                self.card.set_timer_control(0x00);
            }
            for i in 0..self.channels {
                self.card.select_voice(i);
                let mode = self.card.mode();
                self.voices[i].was_playing = mode & MODE_STOPPED == 0;
                self.card.set_mode(0x03 | (mode & MODE_BACKWARD));
            }
        }
        log::debug!("voices {}", if paused { "paused" } else { "resumed" });
    }

    fn apply(&mut self, channel: usize, param: Param, value: i32) {
        let voice_param = matches!(
            param,
            Param::Instrument
                | Param::Stop
                | Param::Mute
                | Param::Status
                | Param::Loop
                | Param::Direct
                | Param::Position
                | Param::Pitch
                | Param::PitchFix
                | Param::Pitch6848
                | Param::Reset
                | Param::Volume
                | Param::Panning
                | Param::Reverb
        );
        if voice_param && channel >= VOICES {
            log::debug!("{param:?} for channel {channel} ignored");
            return;
        }

        match param {
            Param::Speed => self.clock.speed = value.max(1) as u32,
            Param::Instrument => {
                if value >= 0 && (value as usize) < self.samples.len() {
                    self.voices[channel].set_instrument(value as usize);
                } else {
                    log::warn!("channel {channel}: no sample {value}");
                }
            }
            Param::Mute => self.voices[channel].muted = value != 0,
            Param::Status => {
                if value == 0 {
                    self.voices[channel].stop();
                }
            }
            Param::Stop => self.voices[channel].stop(),
            Param::Loop => {
                if let Some(select) = LoopSelect::from_param(value) {
                    self.voices[channel].pending.loop_select = Some(select);
                }
            }
            Param::Direct => {
                if let Some(direction) = Direction::from_param(value) {
                    self.voices[channel].pending.direction = Some(direction);
                }
            }
            Param::Position => self.voices[channel].pending.position = Some(value.max(0) as u32),
            Param::Pitch => {
                let v = &mut self.voices[channel];
                v.freq = 8363;
                v.divisor = match freq8363(-value) {
                    0 => 256,
                    d => d,
                };
            }
            Param::PitchFix => {
                let v = &mut self.voices[channel];
                v.freq = value.max(0) as u32;
                v.divisor = 0x10000;
            }
            Param::Pitch6848 => {
                let v = &mut self.voices[channel];
                v.freq = 6848;
                v.divisor = if value <= 0 { 256 } else { value as u32 };
            }
            Param::Reset => self.voices[channel].reset(),
            Param::Volume => {
                self.voices[channel].volume = value.clamp(0, 0x100);
                self.recalc_voice(channel);
            }
            Param::Panning => {
                self.voices[channel].pan = value.clamp(-0x80, 0x80);
                self.recalc_voice(channel);
            }
            Param::Reverb => {
                self.voices[channel].reverb = value.clamp(0, 0x100);
                self.recalc_voice(channel);
            }
            Param::MasterAmplify => {
                self.master.amplify = value.max(0) as u32;
                self.recalc_all();
            }
            Param::MasterPause => self.set_paused(value != 0),
            Param::MasterVolume => {
                self.master.volume = value;
                self.recalc_all();
            }
            Param::MasterPanning => {
                self.master.panning = value;
                self.recalc_all();
            }
            Param::MasterBalance => {
                self.master.balance = value;
                self.recalc_all();
                if self.channels != 0 {
                    self.calc_fx_levels();
                }
            }
            Param::MasterReverb => {
                self.master.reverb = value;
                self.recalc_all();
            }
            Param::MasterSpeed => {
                self.master.speed = (value.max(0) as u32).max(MIN_RELATIVE_SPEED);
                self.clock.relative = self.master.speed;
            }
            Param::MasterPitch => self.master.pitch = value.max(0) as u32,
            Param::MasterFilter => self.master.filter = value != 0,
            _ => {}
        }
    }

    fn query(&mut self, channel: usize, param: Param) -> i32 {
        let to_seconds = |t: u64| ((t * 3600) >> 16) as i32;
        match param {
            Param::Status if channel < VOICES => {
                self.card.select_voice(channel);
                let playing = self.card.mode() & MODE_STOPPED == 0;
                (playing || (self.paused && self.voices[channel].was_playing)) as i32
            }
            Param::Mute if channel < VOICES => self.voices[channel].muted as i32,
            Param::Timer => {
                if self.source == TickSource::Card {
                    to_seconds(self.clock.cmd_time)
                } else {
                    to_seconds(self.clock.host_time)
                }
            }
            Param::CmdTimer => to_seconds(self.clock.cmd_time),
            _ => 0,
        }
    }

    fn upload(&mut self, address: u32, info: &SampleInfo) {
        let bytes = info.upload_bytes();
        let wide = info.is_16bit();
        self.critical(|iw| iw.card.upload(address, &bytes, wide));
    }

    pub fn kind(&self) -> GusKind {
        self.card.kind()
    }

    pub fn port(&self) -> u16 {
        self.card.port()
    }

    pub fn layout(&self) -> &MemoryLayout {
        &self.layout
    }

    pub fn config(&self) -> &InterWaveConfig {
        &self.config
    }

    pub fn voice(&self, channel: usize) -> Option<&Voice> {
        self.voices.get(channel)
    }

    pub fn samples(&self) -> &[PlacedSample] {
        &self.samples
    }

    pub fn master(&self) -> &Master {
        &self.master
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn active_voices(&self) -> usize {
        self.active_voices
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn tick_source(&self) -> TickSource {
        self.source
    }

    pub fn bus(&self) -> &B {
        self.card.bus()
    }

    pub fn bus_mut(&mut self) -> &mut B {
        self.card.bus_mut()
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn irq(&self) -> &I {
        &self.irq
    }

    /// Close any player, drop to the power-on voice setup and hand back the
    /// hardware.
    pub fn into_parts(mut self) -> (B, T, I) {
        self.close_player();
        self.init_card(false, GF1_MIN_VOICES);
        (self.card.into_bus(), self.timer, self.irq)
    }
}

impl<B: IoBus, T: PeriodicTimer, I: IrqLine> ChannelControl for InterWave<B, T, I> {
    fn load_samples(&mut self, samples: &mut [SampleInfo]) -> Result<()> {
        if samples.len() > MAX_SAMPLES {
            return Err(Error::TooManySamples(samples.len()));
        }
        for info in samples.iter() {
            info.validate()?;
        }
        self.samples.clear();

        match self.card.kind() {
            GusKind::Amd => {
                sample::reduce(samples, self.layout.total(), true)?;
                let sizes: Vec<u32> = samples.iter().map(SampleInfo::upload_size).collect();
                let placements = memory::place(&sizes, &self.layout.banks)?;
                for (info, placement) in samples.iter().zip(&placements) {
                    let address = placement.offset | ((placement.bank as u32) << 22);
                    self.upload(address, info);
                    self.samples
                        .push(PlacedSample::new(info, placement.bank, placement.offset));
                }
            }
            GusKind::Gf1 => {
                for info in samples.iter_mut() {
                    if info.loop_start == info.loop_end {
                        info.kind.remove(SampleType::LOOP);
                    }
                }
                sample::reduce(samples, self.layout.banks[0], true)?;

                let mut placed = vec![None; samples.len()];
                let mut offset = 0u32;
                // 16-bit samples first so they stay inside the first 256 KiB page
                for wide in [true, false] {
                    for (i, info) in samples.iter().enumerate() {
                        if info.is_16bit() != wide {
                            continue;
                        }
                        offset = (offset + memory::AMD_ALIGN - 1) & !(memory::AMD_ALIGN - 1);
                        let end = offset as u64 + info.upload_size() as u64;
                        if end > self.layout.banks[0] as u64 {
                            return Err(Error::SampleMemory {
                                needed: end,
                                available: self.layout.banks[0] as u64,
                            });
                        }
                        self.upload(offset, info);
                        placed[i] = Some(PlacedSample::new(info, 0, offset));
                        offset += info.upload_size();
                    }
                }
                self.samples = placed.into_iter().flatten().collect();
            }
        }

        log::info!(
            "{} samples uploaded ({} bytes)",
            self.samples.len(),
            samples.iter().map(|s| s.upload_size() as u64).sum::<u64>()
        );
        Ok(())
    }

    fn open_player(&mut self, channels: usize, player: Box<dyn ChannelPlayer>) -> Result<usize> {
        if self.source != TickSource::Idle {
            self.close_player();
        }

        let mut channels = channels.min(VOICES);
        if self.force_effects {
            channels = channels.min(EFFECT_VOICES.start);
        }

        self.clock.speed = DEFAULT_SPEED;
        self.voices = [Voice::default(); VOICES];
        self.paused = false;
        self.channels = 0;
        self.init_card(true, channels.max(GF1_MIN_VOICES));
        self.calc_fx_levels();
        self.channels = channels;
        self.recalc_all();

        self.card.select_voice(0);
        self.card.delay(10);
        self.card.outp(port::MIX_CONTROL, 0x09);
        self.card.delay(10);

        self.clock.cmd_time = 0;
        self.player = Some(player);

        let irq = self.config.irq.filter(|_| self.config.wants_card_timer());
        match irq {
            Some(line) if self.irq.attach(line) => {
                let clock = &mut self.clock;
                clock.card_len = clock.card_tick_len();
                clock.card_pos = clock.card_len;
                clock.card_programmed = clock.card_len;
                let count = clock.card_count();
                self.card.set_timer_count(count);
                self.card.set_timer_control(0x04);
                self.source = TickSource::Card;
                log::info!("player open with {channels} channels on card timer (IRQ {line})");
            }
            _ => {
                if let Some(line) = irq {
                    log::warn!("IRQ {line} unavailable, using the host timer");
                }
                let clock = &mut self.clock;
                clock.host_len = clock.host_tick_len();
                clock.host_elapsed = 0;
                clock.host_hz = 0;
                self.source = TickSource::Host;
                self.rehook_host();
                log::info!("player open with {channels} channels on host timer");
            }
        }

        self.card.outp(port::TIMER_CONTROL, 0x04);
        self.card.outp(port::TIMER_DATA, 0x01);
        Ok(channels)
    }

    fn close_player(&mut self) {
        match self.source {
            TickSource::Host => {
                let was_enabled = self.timer.mask();
                self.timer.unhook();
                self.timer.unmask(was_enabled);
            }
            TickSource::Card => {
                let was_enabled = self.irq.mask();
                self.irq.detach();
                self.irq.unmask(was_enabled);
            }
            TickSource::Idle => return,
        }
        self.source = TickSource::Idle;
        self.player = None;
        self.paused = false;
        self.init_card(true, 0);
        self.channels = 0;
        log::info!("player closed");
    }

    fn set(&mut self, channel: usize, param: Param, value: i32) {
        self.critical(|iw| iw.apply(channel, param, value));
    }

    fn get(&mut self, channel: usize, param: Param) -> i32 {
        self.critical(|iw| iw.query(channel, param))
    }
}
