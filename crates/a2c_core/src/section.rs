//! The generic header+body section envelope and its framer.

use std::fmt;
use std::io::{self, Read, Seek};

use serde::Serialize;

use crate::checksum::section_checksum;
use crate::cipher::apply_keystream;
use crate::reader::LittleEndianReader;
use crate::stats::{self, StatsBlock};

/// Fixed capacity of the section body buffer. Sections declaring a larger
/// body are skipped rather than processed.
pub const SECTION_CAPACITY: usize = 2560;
/// On-disk size of a section header.
pub const HEADER_SIZE: usize = 16;

/// Magic tag of the obfuscated character-stats section.
pub const STATS_MAGIC: u32 = 0x4139_2521;

/// Section tags in the order they appear in a save file.
pub const SECTION_TAGS: [u32; 6] = [
    0xAAAA_AAAA, // player info
    0x5555_5555, // game state
    0x40A4_0A40, // serialized item names
    0xDE0D_E0DE, // unknown
    STATS_MAGIC, // character stats
    0x3A5A_3A5A, // unknown
];

/// The 16-byte envelope in front of every section body. `length` counts
/// the body bytes as stored on disk; for the stats section that claim is
/// unreliable and gets replaced by the actually consumed size. `checksum`
/// covers the fully decoded body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionHeader {
    pub magic: u32,
    pub length: u32,
    pub reserved: u16,
    pub seed: u16,
    pub checksum: u32,
}

impl SectionHeader {
    pub fn parse<R: Read + Seek>(r: &mut LittleEndianReader<R>) -> io::Result<Self> {
        Ok(Self {
            magic: r.read_u32()?,
            length: r.read_u32()?,
            reserved: r.read_u16()?,
            seed: r.read_u16()?,
            checksum: r.read_u32()?,
        })
    }

    pub fn emit_to_vec(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.magic.to_le_bytes());
        out.extend_from_slice(&self.length.to_le_bytes());
        out.extend_from_slice(&self.reserved.to_le_bytes());
        out.extend_from_slice(&self.seed.to_le_bytes());
        out.extend_from_slice(&self.checksum.to_le_bytes());
    }
}

/// Why a section was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SectionFault {
    /// Header magic does not match the tag expected at this position.
    /// Fatal: nothing after this point in the stream can be trusted.
    Malformed { expected: u32, found: u32 },
    /// Declared body length exceeds the section buffer. The body bytes
    /// are skipped and processing continues with the next section.
    Oversized { magic: u32, length: u32 },
    /// Decoded body does not reproduce the header checksum. The section
    /// is dropped and processing continues.
    ChecksumMismatch {
        magic: u32,
        expected: u32,
        computed: u32,
    },
}

impl SectionFault {
    /// Recoverable faults drop one section; fatal ones end the file.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SectionFault::Malformed { .. })
    }
}

impl fmt::Display for SectionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            SectionFault::Malformed { expected, found } => {
                write!(f, "unknown data section {found:#010x}, expected {expected:#010x}")
            }
            SectionFault::Oversized { magic, length } => {
                write!(
                    f,
                    "section {magic:#010x} declares {length} body bytes, over the {SECTION_CAPACITY} byte limit"
                )
            }
            SectionFault::ChecksumMismatch {
                magic,
                expected,
                computed,
            } => {
                write!(
                    f,
                    "section {magic:#010x} checksum {computed:#010x} does not match header {expected:#010x}"
                )
            }
        }
    }
}

impl std::error::Error for SectionFault {}

/// One decoded, checksum-verified section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSection {
    pub magic: u32,
    pub reserved: u16,
    pub seed: u16,
    pub body: Vec<u8>,
}

impl DecodedSection {
    fn header(&self) -> SectionHeader {
        SectionHeader {
            magic: self.magic,
            length: self.body.len() as u32,
            reserved: self.reserved,
            seed: self.seed,
            checksum: section_checksum(&self.body),
        }
    }

    /// Decoded-form envelope, as written to converted output.
    pub fn emit_decoded(&self, out: &mut Vec<u8>) {
        self.header().emit_to_vec(out);
        out.extend_from_slice(&self.body);
    }

    /// On-disk (a2c) envelope: the stats body re-obfuscated through the
    /// codec, every other body run back through the keystream cipher.
    pub fn emit_encoded(&self, out: &mut Vec<u8>) -> io::Result<()> {
        if self.magic == STATS_MAGIC {
            let block = StatsBlock::from_decoded_bytes(&self.body)?;
            let (mut header, bytes) = stats::encode_section(&block, self.seed);
            header.reserved = self.reserved;
            header.emit_to_vec(out);
            out.extend_from_slice(&bytes);
        } else {
            let mut body = self.body.clone();
            apply_keystream(&mut body, self.seed);
            self.header().emit_to_vec(out);
            out.extend_from_slice(&body);
        }
        Ok(())
    }
}

/// Outcome of reading one section from the input stream.
#[derive(Debug)]
pub enum SectionOutcome {
    /// Decoded and checksum-verified.
    Decoded(DecodedSection),
    /// Dropped with a recoverable fault; the stream is positioned at the
    /// next section.
    Skipped(SectionFault),
    /// Fatal fault; the stream cannot be trusted past this point.
    Aborted(SectionFault),
}

/// Reads section envelopes and dispatches bodies to the stats codec or the
/// keystream cipher. Owns the body buffer; one instance per file, no state
/// carried between sections.
pub struct SectionFramer {
    buffer: [u8; SECTION_CAPACITY],
}

impl SectionFramer {
    pub fn new() -> Self {
        Self {
            buffer: [0; SECTION_CAPACITY],
        }
    }

    /// Read and decode the section expected to carry `expected_magic` next
    /// in the stream. I/O problems and stats-codec integrity faults come
    /// back as errors; format-level faults come back as outcomes so the
    /// caller can apply its skip/abort policy.
    pub fn decode_section<R: Read + Seek>(
        &mut self,
        r: &mut LittleEndianReader<R>,
        expected_magic: u32,
    ) -> io::Result<SectionOutcome> {
        let header = SectionHeader::parse(r)?;

        if header.magic != expected_magic {
            return Ok(SectionOutcome::Aborted(SectionFault::Malformed {
                expected: expected_magic,
                found: header.magic,
            }));
        }

        if header.length as usize > SECTION_CAPACITY {
            r.skip(header.length as u64)?;
            return Ok(SectionOutcome::Skipped(SectionFault::Oversized {
                magic: header.magic,
                length: header.length,
            }));
        }

        let body_len = if header.magic == STATS_MAGIC {
            // The codec consumes what the seed dictates, independent of
            // the header's length claim.
            let block = stats::decode(r, header.seed)?;
            let decoded = block.to_decoded_bytes();
            self.buffer[..decoded.len()].copy_from_slice(&decoded);
            decoded.len()
        } else {
            let len = header.length as usize;
            r.read_exact(&mut self.buffer[..len])?;
            apply_keystream(&mut self.buffer[..len], header.seed);
            len
        };

        let computed = section_checksum(&self.buffer[..body_len]);
        if computed != header.checksum {
            return Ok(SectionOutcome::Skipped(SectionFault::ChecksumMismatch {
                magic: header.magic,
                expected: header.checksum,
                computed,
            }));
        }

        Ok(SectionOutcome::Decoded(DecodedSection {
            magic: header.magic,
            reserved: header.reserved,
            seed: header.seed,
            body: self.buffer[..body_len].to_vec(),
        }))
    }
}

impl Default for SectionFramer {
    fn default() -> Self {
        Self::new()
    }
}
