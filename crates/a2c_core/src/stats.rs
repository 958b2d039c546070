//! Codec for the character-stats section.
//!
//! On top of the generic section envelope, every field of this block is
//! individually obfuscated by its modifier slot, chained to previously
//! decoded values, and optionally preceded by a filler byte selected by
//! the header seed. Decoding therefore consumes a seed-dependent number of
//! input bytes while always producing the same 16 fields; the declared
//! header length is not trusted for this section.

use std::io::{self, Cursor, Read, Seek};
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::checksum::section_checksum;
use crate::modifier::{MODIFIERS, ModifierSlot, filler_count};
use crate::reader::LittleEndianReader;
use crate::section::{STATS_MAGIC, SectionHeader};

/// Size of the decoded stats body in bytes.
pub const STATS_BLOCK_SIZE: usize = 52;
/// Byte written before a field whose seed mask bit is set.
pub const FILLER_BYTE: u8 = 0x7F;

pub const SCORE_COUNT: usize = 4;
pub const STAT_COUNT: usize = 4;
pub const SPELL_COUNT: usize = 2;
pub const EXP_COUNT: usize = 5;

// Modifier-table slices per processing group. The groups are not handled
// in on-disk declaration order: the spell singletons (slots 9 and 10) are
// processed between the stat bytes and the exp table, each as a group of
// its own with fresh chain state.
const SCORE_GROUP: Range<usize> = 0..5;
const STAT_GROUP: Range<usize> = 5..9;
const SPELL_A_SLOT: usize = 9;
const SPELL_B_SLOT: usize = 10;
const EXP_GROUP: Range<usize> = 11..16;

/// The fixed-shape character stats record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsBlock {
    pub scores: [u32; SCORE_COUNT],
    pub gold: u32,
    pub stats: [u8; STAT_COUNT],
    pub spells: [u32; SPELL_COUNT],
    pub exp: [u32; EXP_COUNT],
}

/// Chain state threaded through one field group. The first decoded value
/// of the group replaces `start`; every decoded value becomes `previous`
/// for the next field. Seed values only ever feed the first field.
#[derive(Debug, Clone, Copy)]
struct FieldChain {
    start: u32,
    previous: u32,
    initialized: bool,
}

impl FieldChain {
    fn seeded(start: u32, previous: u32) -> Self {
        Self {
            start,
            previous,
            initialized: false,
        }
    }

    fn advance(&mut self, value: u32) {
        if !self.initialized {
            self.start = value;
            self.initialized = true;
        }
        self.previous = value;
    }
}

/// On-disk size of the obfuscated payload for a given seed: the decoded
/// size plus one filler byte per set mask bit.
pub fn encoded_len(seed: u16) -> usize {
    STATS_BLOCK_SIZE + filler_count(seed)
}

fn decode_u32_field<R: Read + Seek>(
    r: &mut LittleEndianReader<R>,
    seed: u16,
    slot: &ModifierSlot,
    chain: &mut FieldChain,
) -> io::Result<u32> {
    if seed & slot.mask != 0 {
        r.read_u8()?; // filler byte, content ignored
    }
    let raw = r.read_u32()?;
    let value = slot.transform.apply(raw, chain.start, chain.previous);
    chain.advance(value);
    Ok(value)
}

fn decode_u8_field<R: Read + Seek>(
    r: &mut LittleEndianReader<R>,
    seed: u16,
    slot: &ModifierSlot,
    chain: &mut FieldChain,
) -> io::Result<u8> {
    if seed & slot.mask != 0 {
        r.read_u8()?;
    }
    let raw = r.read_u8()?;
    let value = slot.transform.apply(raw as u32, chain.start, chain.previous) as u8;
    chain.advance(value as u32);
    Ok(value)
}

/// Decode the obfuscated stats payload directly from the input stream.
///
/// Consumes exactly `encoded_len(seed)` bytes and yields all 16 fields.
/// The consumed count is re-checked against that total; a mismatch means
/// the layout constants do not match the file revision and is a hard
/// error, never silently accepted.
pub fn decode<R: Read + Seek>(r: &mut LittleEndianReader<R>, seed: u16) -> io::Result<StatsBlock> {
    let start_pos = r.position()?;
    let mut block = StatsBlock::default();

    // scores, then gold, one running chain
    let mut chain = FieldChain::seeded(0, 0);
    for (i, slot) in MODIFIERS[SCORE_GROUP].iter().enumerate() {
        let value = decode_u32_field(r, seed, slot, &mut chain)?;
        if i < SCORE_COUNT {
            block.scores[i] = value;
        } else {
            block.gold = value;
        }
    }

    // one-byte stats, chained across groups from the first score and gold
    let mut chain = FieldChain::seeded(block.scores[0] & 0xFF, block.gold & 0xFF);
    for (i, slot) in MODIFIERS[STAT_GROUP].iter().enumerate() {
        block.stats[i] = decode_u8_field(r, seed, slot, &mut chain)?;
    }

    // spell singletons
    let mut chain = FieldChain::seeded(0, 0);
    block.spells[0] = decode_u32_field(r, seed, &MODIFIERS[SPELL_A_SLOT], &mut chain)?;
    let mut chain = FieldChain::seeded(0, 0);
    block.spells[1] = decode_u32_field(r, seed, &MODIFIERS[SPELL_B_SLOT], &mut chain)?;

    // exp table
    let mut chain = FieldChain::seeded(0, 0);
    for (i, slot) in MODIFIERS[EXP_GROUP].iter().enumerate() {
        block.exp[i] = decode_u32_field(r, seed, slot, &mut chain)?;
    }

    let consumed = (r.position()? - start_pos) as usize;
    let expected = encoded_len(seed);
    if consumed != expected {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("stats block consumed {consumed} bytes, layout expects {expected}"),
        ));
    }

    Ok(block)
}

fn encode_u32_field(
    out: &mut Vec<u8>,
    seed: u16,
    slot: &ModifierSlot,
    chain: &mut FieldChain,
    value: u32,
) {
    if seed & slot.mask != 0 {
        out.push(FILLER_BYTE);
    }
    let raw = slot.transform.invert(value, chain.start, chain.previous);
    out.extend_from_slice(&raw.to_le_bytes());
    chain.advance(value);
}

fn encode_u8_field(
    out: &mut Vec<u8>,
    seed: u16,
    slot: &ModifierSlot,
    chain: &mut FieldChain,
    value: u8,
) {
    if seed & slot.mask != 0 {
        out.push(FILLER_BYTE);
    }
    let raw = slot.transform.invert(value as u32, chain.start, chain.previous) as u8;
    out.push(raw);
    chain.advance(value as u32);
}

/// Re-apply the per-field obfuscation, producing the on-disk payload.
///
/// Chain state advances on the decoded values, exactly as in `decode`, so
/// a decode/encode pair reproduces the original byte stream bit for bit,
/// filler bytes included.
pub fn encode(block: &StatsBlock, seed: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_len(seed));

    let score_fields = [
        block.scores[0],
        block.scores[1],
        block.scores[2],
        block.scores[3],
        block.gold,
    ];
    let mut chain = FieldChain::seeded(0, 0);
    for (slot, &value) in MODIFIERS[SCORE_GROUP].iter().zip(score_fields.iter()) {
        encode_u32_field(&mut out, seed, slot, &mut chain, value);
    }

    let mut chain = FieldChain::seeded(block.scores[0] & 0xFF, block.gold & 0xFF);
    for (slot, &value) in MODIFIERS[STAT_GROUP].iter().zip(block.stats.iter()) {
        encode_u8_field(&mut out, seed, slot, &mut chain, value);
    }

    let mut chain = FieldChain::seeded(0, 0);
    encode_u32_field(&mut out, seed, &MODIFIERS[SPELL_A_SLOT], &mut chain, block.spells[0]);
    let mut chain = FieldChain::seeded(0, 0);
    encode_u32_field(&mut out, seed, &MODIFIERS[SPELL_B_SLOT], &mut chain, block.spells[1]);

    let mut chain = FieldChain::seeded(0, 0);
    for (slot, &value) in MODIFIERS[EXP_GROUP].iter().zip(block.exp.iter()) {
        encode_u32_field(&mut out, seed, slot, &mut chain, value);
    }

    out
}

/// Obfuscate a block and stamp its section header. The header length is
/// the actual on-disk payload size; the checksum covers the decoded-form
/// body, which is what the decode side verifies.
pub fn encode_section(block: &StatsBlock, seed: u16) -> (SectionHeader, Vec<u8>) {
    let bytes = encode(block, seed);
    let header = SectionHeader {
        magic: STATS_MAGIC,
        length: bytes.len() as u32,
        reserved: 0,
        seed,
        checksum: section_checksum(&block.to_decoded_bytes()),
    };
    (header, bytes)
}

impl StatsBlock {
    /// Plain little-endian serialization in processing order: the body of
    /// the section as written to converted output.
    pub fn to_decoded_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(STATS_BLOCK_SIZE);
        for score in &self.scores {
            out.extend_from_slice(&score.to_le_bytes());
        }
        out.extend_from_slice(&self.gold.to_le_bytes());
        out.extend_from_slice(&self.stats);
        for spell in &self.spells {
            out.extend_from_slice(&spell.to_le_bytes());
        }
        for exp in &self.exp {
            out.extend_from_slice(&exp.to_le_bytes());
        }
        out
    }

    /// Parse the plain decoded-form body back into a block.
    pub fn from_decoded_bytes(bytes: &[u8]) -> io::Result<Self> {
        if bytes.len() != STATS_BLOCK_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "decoded stats body is {} bytes, expected {STATS_BLOCK_SIZE}",
                    bytes.len()
                ),
            ));
        }

        let mut r = LittleEndianReader::new(Cursor::new(bytes));
        let mut block = StatsBlock::default();
        for score in &mut block.scores {
            *score = r.read_u32()?;
        }
        block.gold = r.read_u32()?;
        for stat in &mut block.stats {
            *stat = r.read_u8()?;
        }
        for spell in &mut block.spells {
            *spell = r.read_u32()?;
        }
        for exp in &mut block.exp {
            *exp = r.read_u32()?;
        }
        Ok(block)
    }
}
