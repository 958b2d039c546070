//! Decode/encode library for a2c save files.
//!
//! An a2c save is a fixed sequence of framed sections, each protected by a
//! seeded keystream cipher and a rolling checksum; the character-stats
//! section additionally obfuscates every field through a fixed modifier
//! table with chained state and seed-driven filler bytes. This crate
//! decodes such files to a plaintext mirror of the same framing, parses
//! them into typed values, and re-encodes both representations.

pub mod checksum;
pub mod cipher;
pub mod modifier;
pub mod pkt;
pub mod reader;
pub mod save;
pub mod section;
pub mod stats;

pub use save::{ConvertSummary, FILE_MAGIC, SaveFile, convert};
pub use section::{
    DecodedSection, HEADER_SIZE, SECTION_CAPACITY, SECTION_TAGS, STATS_MAGIC, SectionFault,
    SectionFramer, SectionHeader, SectionOutcome,
};
pub use stats::{STATS_BLOCK_SIZE, StatsBlock};
