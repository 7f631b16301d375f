//! Card DRAM sizing, effects buffer carve-out and sample placement

use super::card::{reg, Card};
use super::GusKind;
use crate::error::{Error, Result};
use crate::hw::IoBus;
use serde::Serialize;

/// Size of one InterWave memory bank
pub const AMD_BANK_SIZE: u32 = 4 * 1024 * 1024;

/// Granularity of the InterWave memory probe
pub const AMD_PROBE_STEP: u32 = 64 * 1024;

/// Granularity of the GF1 memory probe
pub const GF1_CHUNK: u32 = 256 * 1024;

/// Bytes reserved for the reverb delay lines
pub const FX_BUFFER_SIZE: u32 = 65536;

/// Samples are placed on 32-byte boundaries in InterWave memory
pub(crate) const AMD_ALIGN: u32 = 32;

/// 12-bit logarithmic volume for each linear level 0..=512
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeTable([u16; 513]);

impl VolumeTable {
    pub fn new() -> Self {
        let mut table = [0u16; 513];
        table[512] = 0x0FFF;
        for (i, entry) in table.iter_mut().enumerate().take(512).skip(1) {
            let mut exponent = 0x0600u32;
            let mut k = i;
            while k != 0 {
                k >>= 1;
                exponent += 0x0100;
            }
            let mantissa = (i as u32) << (8 - ((exponent - 0x0700) >> 8));
            *entry = (exponent | (mantissa & 0xFF)) as u16;
        }
        VolumeTable(table)
    }

    /// Log volume for a linear level; out-of-range levels clamp
    pub fn get(&self, level: u16) -> u16 {
        self.0[(level as usize).min(512)]
    }

    /// Attenuation for a linear level, as the volume offset registers take it
    pub fn attenuation(&self, level: u16) -> u16 {
        0x0FFF - self.get(level)
    }
}

impl Default for VolumeTable {
    fn default() -> Self {
        Self::new()
    }
}

/// What was found on the card
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryLayout {
    /// Usable bytes per bank, effects buffer already subtracted
    pub banks: [u32; 4],
    /// Local memory configuration index programmed into the card
    pub config_index: u8,
    /// Bank holding the reverb delay lines
    pub fx_bank: usize,
    /// Start of the delay lines within `fx_bank`, in 16-bit words
    pub fx_position: u32,
    /// Chip revision (1 on a GF1)
    pub revision: u8,
}

impl MemoryLayout {
    pub fn total(&self) -> u32 {
        self.banks.iter().sum()
    }

    pub fn largest_bank(&self) -> u32 {
        self.banks.iter().copied().max().unwrap_or(0)
    }
}

/// Where [`place`] put a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub bank: usize,
    /// Byte offset within the bank
    pub offset: u32,
}

/// Size the DRAM of a GF1 in 256 KiB steps, using distinct markers to
/// catch address wrap-around.
pub fn probe_gf1<B: IoBus>(card: &mut Card<B>) -> MemoryLayout {
    let chunk = |i: u32| i * GF1_CHUNK;
    let saved: Vec<u8> = (0..4).map(|i| card.peek(chunk(i))).collect();

    // The GF1 sometimes drops the first write after a reset
    card.poke(0, 1);
    card.poke(0, 1);
    let mut size = GF1_CHUNK;
    for i in 1..4u32 {
        card.poke(chunk(i), 15 + i as u8);
        card.poke(chunk(i), 15 + i as u8);
        let intact = (0..i).all(|j| card.peek(chunk(j)) == 1 + j as u8);
        if !intact || card.peek(chunk(i)) != 15 + i as u8 {
            break;
        }
        card.poke(chunk(i), 1 + i as u8);
        card.poke(chunk(i), 1 + i as u8);
        size += GF1_CHUNK;
    }

    for i in (0..4u32).rev() {
        card.poke(chunk(i), saved[i as usize]);
        card.poke(chunk(i), saved[i as usize]);
    }

    log::info!("GF1 memory: {} KiB", size / 1024);
    MemoryLayout {
        banks: [size, 0, 0, 0],
        config_index: 0,
        fx_bank: 0,
        fx_position: 0,
        revision: 1,
    }
}

/// Probe each InterWave bank in 64 KiB steps, stopping once `max` bytes
/// were found in total.
fn find_amd<B: IoBus>(card: &mut Card<B>, max: u32) -> ([u32; 4], u32) {
    let mut banks = [0u32; 4];
    let mut found = 0u32;

    for (b, bank) in banks.iter_mut().enumerate() {
        let base = (b as u32) << 22;
        let (b0, b1) = (card.peek(base), card.peek(base + 1));
        card.poke(base, 0x55);
        card.poke(base + 1, 0x56);

        let mut at = base;
        let mut marker = 0x55u8;
        for _ in 0..AMD_BANK_SIZE / AMD_PROBE_STEP {
            if found == max {
                break;
            }
            let (s0, s1) = (card.peek(at), card.peek(at + 1));
            card.poke(at, marker);
            card.poke(at + 1, marker.wrapping_add(1));
            let ok = card.peek(at) == marker
                && card.peek(at + 1) == marker.wrapping_add(1)
                && card.peek(base) == 0x55
                && card.peek(base + 1) == 0x56;
            if !ok {
                break;
            }
            card.poke(at, s0);
            card.poke(at + 1, s1);
            at += AMD_PROBE_STEP;
            found += AMD_PROBE_STEP;
            marker = marker.wrapping_add(2);
        }

        card.poke(base, b0);
        card.poke(base + 1, b1);
        *bank = at - base;
    }
    (banks, found)
}

/// Local memory configuration index for a set of bank sizes
pub fn config_index(banks: &[u32; 4]) -> u8 {
    let code = banks
        .iter()
        .rev()
        .fold(0u32, |acc, &size| (acc << 8) | ((size >> 18) & 0xFF));
    match code {
        0x0000_0001 => 0x0,
        0x0000_0101 | 0x0001_0101 => 0x1,
        0x0101_0101 => 0x2,
        0x0000_0401 => 0x3,
        0x0001_0401 | 0x0004_0401 | 0x0104_0401 | 0x0404_0401 => 0x4,
        0x0004_0101 => 0x5,
        0x0104_0101 | 0x0404_0101 => 0x6,
        0x0000_0004 => 0x7,
        0x0000_0104 | 0x0000_0404 => 0x8,
        0x0001_0404 | 0x0004_0404 | 0x0104_0404 | 0x0404_0404 => 0x9,
        0x0000_0010 => 0xA,
        0x0000_0110 | 0x0000_0410 | 0x0000_1010 => 0xB,
        _ => 0xC,
    }
}

/// Smallest populated bank among 1-3, else bank 0
pub fn fx_bank(banks: &[u32; 4]) -> usize {
    let mut chosen = 0;
    let mut smallest = AMD_BANK_SIZE;
    for (b, &size) in banks.iter().enumerate().skip(1) {
        if size != 0 && size < smallest {
            smallest = size;
            chosen = b;
        }
    }
    chosen
}

/// Size InterWave DRAM: probe with the widest decode, program the matching
/// configuration index, then probe again under it.
pub fn probe_amd<B: IoBus>(card: &mut Card<B>, effects: bool) -> MemoryLayout {
    let decode = card.in16(reg::MEMORY_CONFIG);
    card.out16(reg::MEMORY_CONFIG, (decode & 0xFFF0) | 0x0C);
    let control = card.in8(reg::MEMORY_CONTROL);
    card.out8(reg::MEMORY_CONTROL, control & 0xFD);

    let (banks, found) = find_amd(card, AMD_BANK_SIZE * 4);
    let config_index = config_index(&banks);
    log::debug!(
        "InterWave raw memory {} KiB {:?}, config index {config_index:#x}",
        found / 1024,
        banks.map(|b| b / 1024)
    );

    let decode = card.in16(reg::MEMORY_CONFIG);
    card.out16(reg::MEMORY_CONFIG, (decode & 0xFFF0) | config_index as u16);
    let (mut banks, _) = find_amd(card, found);

    let fx_bank = fx_bank(&banks);
    if effects {
        banks[fx_bank] = banks[fx_bank].saturating_sub(FX_BUFFER_SIZE);
    }
    let fx_position = banks[fx_bank] >> 1;
    let revision = card.in8(reg::REVISION) >> 4;
    card.set_enhanced_mode(false);

    let layout = MemoryLayout {
        banks,
        config_index,
        fx_bank,
        fx_position,
        revision,
    };
    log::info!(
        "InterWave rev {revision} memory: {} KiB, effects in bank {fx_bank}",
        layout.total() / 1024
    );
    layout
}

/// Reset the card at `port`, check that DRAM answers, then tell GF1 from
/// InterWave by whether enhanced mode can be switched on.
pub fn test_port<B: IoBus>(card: &mut Card<B>, port: u16, effects: bool) -> Option<MemoryLayout> {
    let previous = card.port();
    card.set_port(port);
    card.reset();

    let (b0, b1) = (card.peek(0), card.peek(1));
    card.poke(0, 0xAA);
    card.poke(1, 0x55);
    let answers = card.peek(0) == 0xAA;
    card.poke(0, b0);
    card.poke(1, b1);

    if !answers {
        log::debug!("no Ultrasound DRAM at {port:#05x}");
        card.set_port(previous);
        return None;
    }

    if card.set_enhanced_mode(true) {
        card.set_kind(GusKind::Amd);
        Some(probe_amd(card, effects))
    } else {
        card.set_kind(GusKind::Gf1);
        Some(probe_gf1(card))
    }
}

/// Greedy placement: repeatedly put the largest remaining sample into the
/// bank with the most free space. `sizes` are upload sizes in bytes;
/// returns one placement per size, in input order.
pub fn place(sizes: &[u32], banks: &[u32; 4]) -> Result<Vec<Placement>> {
    let mut used = [0u32; 4];
    let mut placements = vec![Placement { bank: 0, offset: 0 }; sizes.len()];
    let mut order: Vec<usize> = (0..sizes.len()).collect();
    // Stable: equal sizes keep their input order
    order.sort_by(|&a, &b| sizes[b].cmp(&sizes[a]));

    for index in order {
        let size = sizes[index];
        let (bank, free) = (0..4)
            .map(|b| (b, banks[b] - used[b]))
            .fold((0, 0), |best, cur| if cur.1 > best.1 { cur } else { best });
        if size > free {
            return Err(Error::SampleMemory {
                needed: size as u64,
                available: free as u64,
            });
        }
        placements[index] = Placement {
            bank,
            offset: used[bank],
        };
        used[bank] = (used[bank] + size + AMD_ALIGN - 1) & !(AMD_ALIGN - 1);
        used[bank] = used[bank].min(banks[bank]);
    }
    Ok(placements)
}
