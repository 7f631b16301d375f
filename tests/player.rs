//! Playback against the simulated OPL card

use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use tempfile::tempdir;
use vgmslap::hw::sim::{SimChip, SimOpl, VirtualTimer};
use vgmslap::opl::{ChipKind, ChipRequirement};
use vgmslap::vgm::{self, Decoded, Gd3Tag, OplPort, StreamDecoder, VgmBuilder, VgmFile};
use vgmslap::{Error, PlayState, Player, PlayerConfig};

const OPL2_CLOCK: u32 = 3_579_545;

fn player(chip: SimChip, config: PlayerConfig) -> Player<SimOpl, VirtualTimer> {
    Player::init(SimOpl::new(chip, config.port), VirtualTimer::new(), config).unwrap()
}

/// Tick until the song stops or `limit` ticks have passed
fn run(player: &mut Player<SimOpl, VirtualTimer>, limit: u32) -> u32 {
    let mut ticks = 0;
    while player.state() == PlayState::Playing && ticks < limit {
        player.on_timer();
        ticks += 1;
    }
    ticks
}

fn looping_song() -> Vec<u8> {
    VgmBuilder::new()
        .ym3812(OPL2_CLOCK)
        .opl(0x5A, 0x20, 0x01)
        .loop_here()
        .wait(10)
        .opl(0x5A, 0xB0, 0x31)
        .end()
        .build()
}

#[test]
fn test_stream_decodes_what_was_built() {
    let tag = Gd3Tag {
        title: "Tune".into(),
        game: "Game".into(),
        author: "Someone".into(),
        ..Default::default()
    };
    let image = VgmBuilder::new()
        .ymf262(14_318_180)
        .opl(0x5E, 0x01, 0x20)
        .opl(0x5F, 0x05, 0x01)
        .wait(735)
        .raw(&[0x50, 0x9F])
        .wait(3)
        .end()
        .gd3(&tag)
        .build();

    let file = VgmFile::from_bytes(image).unwrap();
    assert_eq!(file.gd3().title, "Tune");
    assert_eq!(file.gd3().game, "Game");
    assert_eq!(
        ChipRequirement::from_header(file.header()),
        ChipRequirement::Opl3
    );

    let mut decoder = StreamDecoder::new(file.header(), file.data().len());
    let mut seen = Vec::new();
    loop {
        let decoded = decoder.decode_next(file.data()).unwrap();
        if decoded.is_end() {
            break;
        }
        seen.push(decoded);
    }
    assert_eq!(seen.len(), 5);
    assert!(matches!(
        seen[1],
        Decoded::OplWrite(w) if w.port == OplPort::Ymf262Port1 && w.register == 0x05
    ));
    assert_eq!(seen[2], Decoded::Wait(735));
    assert_eq!(seen[3], Decoded::Skipped(0x50));
    assert_eq!(decoder.sample_position(), 738);
}

#[test]
fn test_loop_limit_then_done() {
    let config = PlayerConfig {
        loop_max: 2,
        ..PlayerConfig::default()
    };
    let mut player = player(SimChip::Opl2, config);
    player.load(looping_song()).unwrap();
    player.play();

    let ticks = run(&mut player, 1000);
    assert_eq!(player.state(), PlayState::Done);
    assert_eq!(ticks, 31);
    assert_eq!(player.stats().loops, 2);
    assert_eq!(player.loop_count(), 2);
    assert!(!player.timer().is_armed());
    assert_eq!(player.device().keyed_channels(), 0);
}

#[test]
fn test_play_again_after_done_resets_loops() {
    let config = PlayerConfig {
        loop_max: 1,
        ..PlayerConfig::default()
    };
    let mut player = player(SimChip::Opl2, config);
    player.load(looping_song()).unwrap();
    player.play();
    run(&mut player, 1000);
    assert_eq!(player.state(), PlayState::Done);

    player.play();
    assert_eq!(player.state(), PlayState::Playing);
    assert_eq!(player.loop_count(), 0);
    assert_eq!(player.tick_counter(), 0);
    run(&mut player, 1000);
    assert_eq!(player.stats().loops, 1);
}

#[test]
fn test_infinite_loop_keeps_playing() {
    let mut player = player(SimChip::Opl2, PlayerConfig::default());
    player.load(looping_song()).unwrap();
    player.play();
    assert_eq!(run(&mut player, 500), 500);
    assert_eq!(player.state(), PlayState::Playing);
    assert!(player.stats().loops >= 48);
    assert_eq!(player.loop_count(), 0);
}

#[test]
fn test_pause_holds_position() {
    let mut player = player(SimChip::Opl2, PlayerConfig::default());
    player.load(looping_song()).unwrap();
    player.play();
    run(&mut player, 5);

    player.pause(true);
    assert_eq!(player.state(), PlayState::Paused);
    assert!(!player.timer().is_armed());
    let held = player.tick_counter();
    player.on_timer();
    assert_eq!(player.tick_counter(), held);
    assert_eq!(player.device().bus().register(0xB0), 0);

    player.pause(false);
    assert_eq!(player.state(), PlayState::Playing);
    assert!(player.timer().is_armed());
    player.on_timer();
    assert_eq!(player.tick_counter(), held + 1);
}

#[test]
fn test_stop_silences_and_disarms() {
    let mut player = player(SimChip::Opl3, PlayerConfig::default());
    player.load(looping_song()).unwrap();
    player.play();
    run(&mut player, 20);
    player.stop();
    assert_eq!(player.state(), PlayState::Stopped);
    assert!(!player.timer().is_armed());
    assert_eq!(player.device().keyed_channels(), 0);
}

#[test]
fn test_gzipped_file_from_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("song.vgz");
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&looping_song()).unwrap();
    std::fs::write(&path, encoder.finish().unwrap()).unwrap();

    let file = VgmFile::open(&path).unwrap();
    assert_eq!(file.header().loop_start(), Some(0x80 + 3));

    let mut player = player(SimChip::Opl2, PlayerConfig::default());
    player.load(vgm::load::read_file(&path).unwrap()).unwrap();
    assert_eq!(player.state(), PlayState::Stopped);
    assert_eq!(
        player.info().unwrap().requirement,
        ChipRequirement::Opl2
    );
}

#[test]
fn test_no_chip_detected() {
    let result = Player::init(
        SimOpl::new(SimChip::Absent, 0x388),
        VirtualTimer::new(),
        PlayerConfig::default(),
    );
    assert!(matches!(result, Err(Error::NoOplDetected { port: 0x388 })));
}

#[test]
fn test_opl3_song_rejected_on_opl2() {
    let mut player = player(SimChip::Opl2, PlayerConfig::default());
    let image = VgmBuilder::new().ymf262(14_318_180).end().build();
    let result = player.load(image);
    assert!(matches!(
        result,
        Err(Error::UnsupportedChips {
            required: ChipRequirement::Opl3,
            detected: ChipKind::Opl2
        })
    ));
    assert_eq!(player.state(), PlayState::Null);
}

#[test]
fn test_bad_magic_rejected() {
    let mut player = player(SimChip::Opl2, PlayerConfig::default());
    let mut image = looping_song();
    image[0] = b'X';
    assert!(matches!(player.load(image), Err(Error::BadMagic)));
}

#[test]
fn test_dual_opl2_on_opl3_is_panned() {
    let mut player = player(SimChip::Opl3, PlayerConfig::default());
    let image = VgmBuilder::new()
        .ym3812_dual(OPL2_CLOCK)
        .opl(0x5A, 0xC0, 0x0F)
        .opl(0xAA, 0xC0, 0x0F)
        .opl(0xAA, 0x01, 0x20)
        .wait(1)
        .end()
        .build();
    player.load(image).unwrap();
    player.play();
    assert_eq!(player.device().bus().register(0x105), 0x01);

    player.on_timer();
    let card = player.device().bus();
    assert_eq!(card.register(0x0C0), 0x1F);
    assert_eq!(card.register(0x1C0), 0x2F);
    assert_eq!(card.register(0x101), 0x00);
    assert_eq!(player.stats().dropped, 1);
}

#[test]
fn test_dual_opl2_on_dual_card_passes_through() {
    let mut player = player(SimChip::DualOpl2, PlayerConfig::default());
    let image = VgmBuilder::new()
        .ym3812_dual(OPL2_CLOCK)
        .opl(0xAA, 0xC0, 0x0F)
        .wait(1)
        .end()
        .build();
    player.load(image).unwrap();
    player.play();
    player.on_timer();
    assert_eq!(player.device().bus().register(0x1C0), 0x0F);
    assert_eq!(player.chip(), ChipKind::DualOpl2);
}
