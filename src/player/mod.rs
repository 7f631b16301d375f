//! Timer-driven VGM playback
//!
//! [`Player`] owns the OPL device, the host timer and the loaded song. The
//! host calls [`Player::on_timer`] from its periodic interrupt; every other
//! method masks that interrupt for the duration of its state changes.

pub mod config;

pub use config::PlayerConfig;

use crate::error::{Error, Result};
use crate::hw::{InterruptGuard, IoBus, PeriodicTimer};
use crate::opl::device::REG_OPL3_NEW;
use crate::opl::{self, ChipKind, ChipMapping, ChipRequirement, OplDevice};
use crate::vgm::{Decoded, StreamDecoder, VgmFile, VgmHeader};
use config::VGM_SAMPLE_RATE;
use serde::Serialize;

/// Playback state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlayState {
    /// Nothing loaded
    Null,
    Stopped,
    Playing,
    Paused,
    /// Reached the end (or a fatal decode error) and went silent
    Done,
}

/// Converts timer ticks into VGM samples using the rate the timer actually
/// runs at, carrying the remainder between ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickStep {
    rate: u32,
    remainder: u32,
}

impl TickStep {
    pub fn new(rate: u32) -> Self {
        Self {
            rate: rate.max(1),
            remainder: 0,
        }
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// Same accumulated remainder, new rate
    pub fn retune(&mut self, rate: u32) {
        self.rate = rate.max(1);
        self.remainder %= self.rate;
    }

    /// Samples covered by one more tick
    pub fn advance(&mut self) -> u64 {
        self.remainder += VGM_SAMPLE_RATE;
        let samples = self.remainder / self.rate;
        self.remainder %= self.rate;
        samples as u64
    }
}

/// Counters for the current play-through
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlaybackStats {
    pub ticks: u64,
    pub commands: u64,
    pub writes: u64,
    /// Writes suppressed by the chip mapping
    pub dropped: u64,
    /// Seeks back to the loop point
    pub loops: u32,
}

/// What [`Player::info`] reports about the loaded song
#[derive(Debug, Clone, Serialize)]
pub struct SongInfo<'a> {
    pub requirement: ChipRequirement,
    pub gd3_length: u32,
    pub title: &'a str,
    pub author: &'a str,
}

struct Song {
    file: VgmFile,
    decoder: StreamDecoder,
    mapping: ChipMapping,
}

pub struct Player<B: IoBus, T: PeriodicTimer> {
    device: OplDevice<B>,
    timer: T,
    config: PlayerConfig,
    state: PlayState,
    song: Option<Song>,
    tick_counter: u64,
    step: TickStep,
    loop_count: u8,
    stats: PlaybackStats,
}

impl<B: IoBus, T: PeriodicTimer> Player<B, T> {
    /// Probe for FM hardware at the configured port and silence it.
    pub fn init(bus: B, timer: T, config: PlayerConfig) -> Result<Self> {
        config.validate()?;

        let mut device = OplDevice::new(bus, config.port);
        if opl::detect(&mut device) == ChipKind::None {
            return Err(Error::NoOplDetected { port: config.port });
        }
        device.reset_all();

        Ok(Self {
            device,
            timer,
            step: TickStep::new(config.timer_hz()),
            config,
            state: PlayState::Null,
            song: None,
            tick_counter: 0,
            loop_count: 0,
            stats: PlaybackStats::default(),
        })
    }

    /// Replace the current song. Playback is stopped first; on failure
    /// nothing is loaded and the chip is left silent.
    pub fn load(&mut self, bytes: Vec<u8>) -> Result<()> {
        self.unload();

        let song = match self.prepare(bytes) {
            Ok(song) => song,
            Err(e) => {
                log::warn!("load failed: {e}");
                self.device.reset_all();
                return Err(e);
            }
        };

        self.device.set_port_offset(song.mapping.port_offset);
        log::info!(
            "loaded {} song \"{}\" on {} (port {:#05x})",
            song.mapping.requirement.name(),
            song.file.gd3().title,
            song.mapping.detected.name(),
            self.device.port()
        );
        self.song = Some(song);
        self.state = PlayState::Stopped;
        Ok(())
    }

    fn prepare(&self, bytes: Vec<u8>) -> Result<Song> {
        let file = VgmFile::from_bytes(bytes)?;
        let requirement = ChipRequirement::from_header(file.header());
        let mapping = ChipMapping::new(requirement, self.device.chip())?;
        let decoder = StreamDecoder::new(file.header(), file.data().len());
        Ok(Song {
            file,
            decoder,
            mapping,
        })
    }

    /// Stop and forget the current song
    pub fn unload(&mut self) {
        self.stop();
        self.song = None;
        self.state = PlayState::Null;
    }

    /// Start from the beginning. Ignored unless stopped or done.
    pub fn play(&mut self) {
        if !matches!(self.state, PlayState::Stopped | PlayState::Done) {
            return;
        }
        let Some(song) = self.song.as_mut() else {
            return;
        };

        let mut timer = InterruptGuard::new(&mut self.timer);
        self.device.reset_all();
        song.decoder.rewind();
        if song.mapping.dual_on_opl3 {
            self.device.write(REG_OPL3_NEW, 0x01);
        }
        self.tick_counter = 0;
        self.loop_count = 0;
        self.stats = PlaybackStats::default();

        let requested = self.config.timer_hz();
        let actual = timer.hook(requested);
        if actual != requested {
            log::debug!("timer runs at {actual} Hz (asked for {requested} Hz)");
        }
        self.step = TickStep::new(actual);
        self.state = PlayState::Playing;
    }

    pub fn stop(&mut self) {
        let mut timer = InterruptGuard::new(&mut self.timer);
        if self.state == PlayState::Playing {
            timer.unhook();
            self.device.reset_all();
        }
        if self.state != PlayState::Null {
            self.state = PlayState::Stopped;
        }
    }

    /// Pause silences the chip and keeps the stream position; resuming
    /// continues where the tick counter left off.
    pub fn pause(&mut self, paused: bool) {
        let mut timer = InterruptGuard::new(&mut self.timer);
        match (paused, self.state) {
            (true, PlayState::Playing) => {
                timer.unhook();
                self.device.reset_all();
                self.state = PlayState::Paused;
            }
            (false, PlayState::Paused) => {
                self.device.reset_all();
                if self.song.as_ref().is_some_and(|s| s.mapping.dual_on_opl3) {
                    self.device.write(REG_OPL3_NEW, 0x01);
                }
                let actual = timer.hook(self.config.timer_hz());
                self.step.retune(actual);
                self.state = PlayState::Playing;
            }
            _ => {}
        }
    }

    /// Tick entry point, called on every timer expiry.
    ///
    /// Plays every command whose timestamp has been reached. Never fails:
    /// a decode error ends the song and leaves the chip silent.
    pub fn on_timer(&mut self) {
        if self.state != PlayState::Playing {
            return;
        }
        let Some(song) = self.song.as_mut() else {
            return;
        };

        self.tick_counter += self.step.advance();
        self.stats.ticks += 1;

        // Sample position of the last loop seek made during this tick
        let mut looped_at = None;

        while song.decoder.sample_position() < self.tick_counter {
            let decoded = match song.decoder.decode_next(song.file.data()) {
                Ok(decoded) => decoded,
                Err(e) => {
                    log::warn!("{e}; ending playback");
                    self.finish();
                    return;
                }
            };
            self.stats.commands += 1;

            match decoded {
                Decoded::OplWrite(write) => match song.mapping.route(write) {
                    Some((register, value)) => {
                        self.device.write(register, value);
                        self.stats.writes += 1;
                    }
                    None => self.stats.dropped += 1,
                },
                Decoded::Wait(_) | Decoded::Skipped(_) => {}
                Decoded::End | Decoded::ImplicitEnd => {
                    let position = song.decoder.sample_position();
                    // A loop with no waits in it would spin here forever
                    let may_loop =
                        self.loop_count < self.config.loop_max && looped_at != Some(position);

                    match song.file.header().loop_start() {
                        Some(start) if may_loop => {
                            song.decoder.seek(start);
                            if !self.config.loops_forever() {
                                self.loop_count += 1;
                            }
                            self.stats.loops += 1;
                            looped_at = Some(position);
                            log::debug!("loop {} at sample {position}", self.stats.loops);
                        }
                        _ => {
                            self.finish();
                            return;
                        }
                    }
                }
            }
        }
    }

    fn finish(&mut self) {
        self.state = PlayState::Done;
        self.timer.unhook();
        self.device.reset_all();
        log::info!(
            "playback done after {} ticks, {} writes",
            self.stats.ticks,
            self.stats.writes
        );
    }

    /// Chip requirement, GD3 length, track name and author of the loaded song
    pub fn info(&self) -> Option<SongInfo<'_>> {
        self.song.as_ref().map(|song| SongInfo {
            requirement: song.mapping.requirement,
            gd3_length: song.file.gd3().length,
            title: &song.file.gd3().title,
            author: &song.file.gd3().author,
        })
    }

    pub fn state(&self) -> PlayState {
        self.state
    }

    pub fn chip(&self) -> ChipKind {
        self.device.chip()
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn header(&self) -> Option<&VgmHeader> {
        self.song.as_ref().map(|song| song.file.header())
    }

    pub fn mapping(&self) -> Option<&ChipMapping> {
        self.song.as_ref().map(|song| &song.mapping)
    }

    /// Samples elapsed according to the timer
    pub fn tick_counter(&self) -> u64 {
        self.tick_counter
    }

    /// Samples decoded from the stream
    pub fn sample_position(&self) -> u64 {
        self.song
            .as_ref()
            .map_or(0, |song| song.decoder.sample_position())
    }

    pub fn loop_count(&self) -> u8 {
        self.loop_count
    }

    pub fn stats(&self) -> PlaybackStats {
        self.stats
    }

    pub fn device(&self) -> &OplDevice<B> {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut OplDevice<B> {
        &mut self.device
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    /// Stop playback and hand back the bus and timer
    pub fn into_parts(mut self) -> (B, T) {
        self.stop();
        (self.device.into_bus(), self.timer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::sim::{SimChip, SimOpl, VirtualTimer};
    use crate::vgm::VgmBuilder;

    type SimPlayer = Player<SimOpl, VirtualTimer>;

    fn player(kind: SimChip, config: PlayerConfig) -> SimPlayer {
        Player::init(SimOpl::new(kind, config.port), VirtualTimer::new(), config).unwrap()
    }

    fn run_ticks(player: &mut SimPlayer, ticks: usize) {
        for _ in 0..ticks {
            if !player.timer().would_fire() {
                break;
            }
            player.on_timer();
        }
    }

    #[test]
    fn test_tick_step_exact_rate() {
        let mut step = TickStep::new(44100);
        assert!((0..100).all(|_| step.advance() == 1));

        let mut step = TickStep::new(11025);
        assert_eq!(step.advance(), 4);
    }

    #[test]
    fn test_tick_step_carries_remainder() {
        // 44100/2200 = 20.045...
        let mut step = TickStep::new(2200);
        let total: u64 = (0..2200).map(|_| step.advance()).sum();
        assert_eq!(total, 44100);
    }

    #[test]
    fn test_init_fails_without_chip() {
        let result = Player::init(
            SimOpl::new(SimChip::Absent, 0x388),
            VirtualTimer::new(),
            PlayerConfig::default(),
        );
        assert!(matches!(result, Err(Error::NoOplDetected { port: 0x388 })));
    }

    #[test]
    fn test_play_requires_song() {
        let mut player = player(SimChip::Opl2, PlayerConfig::default());
        player.play();
        assert_eq!(player.state(), PlayState::Null);
        assert!(!player.timer().is_armed());
    }

    #[test]
    fn test_multiple_commands_per_tick() {
        let mut player = player(SimChip::Opl2, PlayerConfig::default());
        let image = VgmBuilder::new()
            .ym3812(3_579_545)
            .opl(0x5A, 0x20, 0x01)
            .opl(0x5A, 0x23, 0x01)
            .opl(0x5A, 0x40, 0x10)
            .wait(1)
            .end()
            .build();
        player.load(image).unwrap();
        player.play();
        player.device_mut().shadow_mut().clear_changes();
        player.on_timer();
        assert_eq!(player.stats().writes, 3);
        assert_eq!(
            player.device_mut().shadow_mut().take_changes(),
            vec![0x20, 0x23, 0x40]
        );
    }

    #[test]
    fn test_decode_error_ends_in_silence() {
        let mut player = player(SimChip::Opl2, PlayerConfig::default());
        let image = VgmBuilder::new()
            .ym3812(3_579_545)
            .opl(0x5A, 0xB0, 0x31)
            .raw(&[0x01])
            .end()
            .build();
        player.load(image).unwrap();
        player.play();
        player.on_timer();
        assert_eq!(player.state(), PlayState::Done);
        assert!(!player.timer().is_armed());
        assert_eq!(player.device().bus().register(0xB0), 0x00);
    }

    #[test]
    fn test_zero_length_loop_does_not_hang() {
        let config = PlayerConfig {
            loop_max: 255,
            ..PlayerConfig::default()
        };
        let mut player = player(SimChip::Opl2, config);
        let image = VgmBuilder::new()
            .ym3812(3_579_545)
            .wait(4)
            .loop_here()
            .opl(0x5A, 0x20, 0x01)
            .end()
            .build();
        player.load(image).unwrap();
        player.play();
        run_ticks(&mut player, 10);
        assert_eq!(player.state(), PlayState::Done);
    }

    #[test]
    fn test_divider_advances_several_samples() {
        let config = PlayerConfig {
            divider: 4,
            ..PlayerConfig::default()
        };
        let mut player = player(SimChip::Opl2, config);
        let image = VgmBuilder::new().ym3812(3_579_545).wait(100).end().build();
        player.load(image).unwrap();
        player.play();
        assert_eq!(player.timer().rate(), 11025);
        player.on_timer();
        assert_eq!(player.tick_counter(), 4);
    }

    #[test]
    fn test_info_reports_tag() {
        let mut player = player(SimChip::Opl3, PlayerConfig::default());
        assert!(player.info().is_none());
        let tag = crate::vgm::Gd3Tag {
            title: "Title".into(),
            author: "Author".into(),
            ..Default::default()
        };
        let image = VgmBuilder::new()
            .ymf262(14_318_180)
            .end()
            .gd3(&tag)
            .build();
        player.load(image).unwrap();
        let info = player.info().unwrap();
        assert_eq!(info.requirement, ChipRequirement::Opl3);
        assert_eq!(info.title, "Title");
        assert_eq!(info.author, "Author");
        assert_eq!(info.gd3_length, tag.encode().len() as u32 - 12);
    }
}
