use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use vgmslap::hw::sim::{SimChip, SimOpl, VirtualTimer};
use vgmslap::player::config::VGM_SAMPLE_RATE;
use vgmslap::player::PlaybackStats;
use vgmslap::vgm::{self, VgmBuilder};
use vgmslap::{Error, PlayState, Player, PlayerConfig};

#[derive(Parser, Debug)]
#[command(name = "vgmslap")]
#[command(version = "0.1.0")]
#[command(about = "Play OPL VGM/VGZ files on a simulated AdLib-compatible card", long_about = None)]
struct Args {
    /// VGM or VGZ file (plays a short built-in tune if omitted)
    input: Option<PathBuf>,

    /// JSON settings file; command-line options override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// OPL base port
    #[arg(short, long, value_parser = parse_port)]
    port: Option<u16>,

    /// Loop-point seeks before stopping (255 loops forever)
    #[arg(short, long)]
    loops: Option<u8>,

    /// Timer divider: tick at 44100/N Hz
    #[arg(short, long)]
    divider: Option<u8>,

    /// FM hardware on the simulated card
    #[arg(long, value_enum, default_value = "opl3")]
    chip: ChipArg,

    /// Give up after this many seconds of song time
    #[arg(long, default_value_t = 600)]
    max_seconds: u32,

    /// Print a register activity line per second of song time
    #[arg(short, long)]
    activity: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ChipArg {
    Opl2,
    DualOpl2,
    Opl3,
}

impl From<ChipArg> for SimChip {
    fn from(chip: ChipArg) -> SimChip {
        match chip {
            ChipArg::Opl2 => SimChip::Opl2,
            ChipArg::DualOpl2 => SimChip::DualOpl2,
            ChipArg::Opl3 => SimChip::Opl3,
        }
    }
}

fn parse_port(text: &str) -> Result<u16, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("bad port {text:?}: {e}"))
}

#[derive(Serialize)]
struct Report<'a> {
    chip: &'static str,
    requirement: &'static str,
    title: &'a str,
    author: &'a str,
    timer_hz: u32,
    seconds: f64,
    state: PlayState,
    stats: PlaybackStats,
}

/// Two notes on channel 0 with a loop point before the first
fn demo_tune() -> Vec<u8> {
    let note = |b: VgmBuilder, fnum: u8, block: u8| {
        b.opl(0x5A, 0xA0, fnum)
            .opl(0x5A, 0xB0, 0x20 | (block << 2) | 0x01)
            .wait(22050)
            .opl(0x5A, 0xB0, 0x00)
            .wait(4410)
    };
    let tune = VgmBuilder::new()
        .ym3812(3_579_545)
        .opl(0x5A, 0x20, 0x01)
        .opl(0x5A, 0x40, 0x10)
        .opl(0x5A, 0x60, 0xF0)
        .opl(0x5A, 0x80, 0x77)
        .opl(0x5A, 0x23, 0x01)
        .opl(0x5A, 0x63, 0xF0)
        .opl(0x5A, 0x83, 0x77)
        .loop_here();
    note(note(tune, 0x41, 4), 0x81, 4).end().build()
}

fn main() -> vgmslap::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PlayerConfig::load(path)?,
        None => PlayerConfig::default(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(loops) = args.loops {
        config.loop_max = loops;
    }
    if let Some(divider) = args.divider {
        config.divider = divider;
    }
    if config.loops_forever() {
        log::info!("looping forever; stopping after {} s", args.max_seconds);
    }

    let bytes = match &args.input {
        Some(path) => vgm::load::read_file(path)?,
        None => {
            log::info!("no input file, playing the built-in tune");
            demo_tune()
        }
    };

    let bus = SimOpl::new(args.chip.into(), config.port);
    let mut player = Player::init(bus, VirtualTimer::new(), config)?;
    player.device_mut().bus_mut().set_recording(false);
    player.load(bytes)?;
    player.play();

    let hz = player.timer().rate().max(1);
    let limit = hz as u64 * args.max_seconds as u64;
    let mut ticks = 0u64;
    while player.state() == PlayState::Playing && ticks < limit {
        player.on_timer();
        ticks += 1;
        if args.activity && ticks % hz as u64 == 0 {
            let changed = player.device_mut().shadow_mut().take_changes();
            println!(
                "{:>5}s  {:>3} registers changed  keys {:018b}",
                ticks / hz as u64,
                changed.len(),
                player.device().keyed_channels()
            );
        }
    }
    if player.state() == PlayState::Playing {
        player.stop();
    }

    let info = player.info();
    let report = Report {
        chip: player.chip().name(),
        requirement: info.as_ref().map_or("none", |i| i.requirement.name()),
        title: info.as_ref().map_or("", |i| i.title),
        author: info.as_ref().map_or("", |i| i.author),
        timer_hz: hz,
        seconds: player.sample_position() as f64 / VGM_SAMPLE_RATE as f64,
        state: player.state(),
        stats: player.stats(),
    };
    let json =
        serde_json::to_string_pretty(&report).map_err(|e| Error::Config(e.to_string()))?;
    println!("{json}");

    Ok(())
}
