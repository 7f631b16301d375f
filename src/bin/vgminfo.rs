//! VGM/VGZ header, GD3 tag and command statistics as JSON

use clap::Parser;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use vgmslap::opl::ChipRequirement;
use vgmslap::vgm::{Decoded, Gd3Tag, StreamDecoder, VgmFile, VgmHeader};

#[derive(Parser, Debug)]
#[command(name = "vgminfo")]
#[command(version = "0.1.0")]
#[command(about = "Describe VGM/VGZ files as JSON", long_about = None)]
struct Args {
    /// Input VGM or VGZ file
    input: PathBuf,

    /// Output JSON file (writes to stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output compact JSON (default is pretty-printed)
    #[arg(short, long)]
    compact: bool,
}

#[derive(Debug, Default, Serialize)]
struct CommandStats {
    commands: u64,
    waits: u64,
    samples: u64,
    /// FM writes per command port
    writes: BTreeMap<String, u64>,
    /// Commands for other chips, by opcode
    skipped: BTreeMap<String, u64>,
    ended_explicitly: bool,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct Info<'a> {
    header: &'a VgmHeader,
    requirement: ChipRequirement,
    data_start: usize,
    loop_start: Option<usize>,
    gd3: &'a Gd3Tag,
    stream: CommandStats,
}

fn scan(file: &VgmFile) -> CommandStats {
    let mut stats = CommandStats::default();
    let mut decoder = StreamDecoder::new(file.header(), file.data().len());
    loop {
        let decoded = match decoder.decode_next(file.data()) {
            Ok(decoded) => decoded,
            Err(e) => {
                stats.error = Some(e.to_string());
                break;
            }
        };
        stats.commands += 1;
        match decoded {
            Decoded::OplWrite(write) => {
                *stats.writes.entry(format!("{:?}", write.port)).or_default() += 1;
            }
            Decoded::Wait(_) => stats.waits += 1,
            Decoded::Skipped(op) => {
                *stats.skipped.entry(format!("{op:#04x}")).or_default() += 1;
            }
            Decoded::End => {
                stats.ended_explicitly = true;
                break;
            }
            Decoded::ImplicitEnd => break,
        }
    }
    stats.samples = decoder.sample_position();
    stats
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let file = VgmFile::open(&args.input)?;
    let info = Info {
        header: file.header(),
        requirement: ChipRequirement::from_header(file.header()),
        data_start: file.header().data_start(),
        loop_start: file.header().loop_start(),
        gd3: file.gd3(),
        stream: scan(&file),
    };

    let json = if args.compact {
        serde_json::to_string(&info)?
    } else {
        serde_json::to_string_pretty(&info)?
    };

    match args.output {
        Some(path) => {
            let mut out = File::create(path)?;
            out.write_all(json.as_bytes())?;
            out.write_all(b"\n")?;
        }
        None => println!("{json}"),
    }

    Ok(())
}
