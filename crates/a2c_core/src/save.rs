//! Whole-file conversion and the structured save API.

use std::io::{self, Read, Seek, Write};

use serde::Serialize;

use crate::reader::LittleEndianReader;
use crate::section::{
    DecodedSection, HEADER_SIZE, SECTION_TAGS, STATS_MAGIC, SectionFault, SectionFramer,
    SectionOutcome,
};
use crate::stats::StatsBlock;

/// File-type magic at the start of every a2c save.
pub const FILE_MAGIC: u32 = 0x0450_7989;

/// What happened to each section during a streaming conversion.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConvertSummary {
    pub sections_emitted: usize,
    pub sections_skipped: Vec<SectionFault>,
    /// Set when a fatal fault stopped the run; earlier sections stay in
    /// the output.
    pub aborted: Option<SectionFault>,
}

fn check_file_magic<R: Read + Seek>(r: &mut LittleEndianReader<R>) -> io::Result<()> {
    let file_magic = r.read_u32()?;
    if file_magic != FILE_MAGIC {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("not an a2c save: file magic {file_magic:#010x}"),
        ));
    }
    Ok(())
}

/// Convert an a2c stream to its decoded representation, section by
/// section in the fixed tag order. Sections with recoverable faults are
/// dropped from the output; the first fatal fault ends the run with
/// whatever was already emitted left intact.
pub fn convert<R: Read + Seek, W: Write>(input: R, output: &mut W) -> io::Result<ConvertSummary> {
    let mut r = LittleEndianReader::new(input);
    check_file_magic(&mut r)?;
    output.write_all(&FILE_MAGIC.to_le_bytes())?;

    let mut framer = SectionFramer::new();
    let mut summary = ConvertSummary::default();

    for &tag in &SECTION_TAGS {
        match framer.decode_section(&mut r, tag)? {
            SectionOutcome::Decoded(section) => {
                let mut emitted = Vec::with_capacity(HEADER_SIZE + section.body.len());
                section.emit_decoded(&mut emitted);
                output.write_all(&emitted)?;
                summary.sections_emitted += 1;
            }
            SectionOutcome::Skipped(fault) => summary.sections_skipped.push(fault),
            SectionOutcome::Aborted(fault) => {
                summary.aborted = Some(fault);
                break;
            }
        }
    }

    Ok(summary)
}

/// A fully decoded save: every section present and verified, with the
/// stats block exposed as a typed value alongside its section body.
#[derive(Debug, Clone)]
pub struct SaveFile {
    pub sections: Vec<DecodedSection>,
    pub stats: StatsBlock,
}

impl SaveFile {
    /// Strict parse: any section fault is an error here, unlike the
    /// skip-and-continue policy of `convert`.
    pub fn parse<R: Read + Seek>(input: R) -> io::Result<Self> {
        let mut r = LittleEndianReader::new(input);
        check_file_magic(&mut r)?;

        let mut framer = SectionFramer::new();
        let mut sections = Vec::with_capacity(SECTION_TAGS.len());
        for &tag in &SECTION_TAGS {
            match framer.decode_section(&mut r, tag)? {
                SectionOutcome::Decoded(section) => sections.push(section),
                SectionOutcome::Skipped(fault) | SectionOutcome::Aborted(fault) => {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, fault));
                }
            }
        }

        let stats_body = sections
            .iter()
            .find(|section| section.magic == STATS_MAGIC)
            .map(|section| section.body.as_slice())
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidData, "save carries no stats section")
            })?;
        let stats = StatsBlock::from_decoded_bytes(stats_body)?;

        Ok(Self { sections, stats })
    }

    /// Replace the stats block, keeping the typed view and the section
    /// body in step.
    pub fn set_stats(&mut self, stats: StatsBlock) -> io::Result<()> {
        let section = self
            .sections
            .iter_mut()
            .find(|section| section.magic == STATS_MAGIC)
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidData, "save carries no stats section")
            })?;
        section.body = stats.to_decoded_bytes();
        self.stats = stats;
        Ok(())
    }

    /// Serialize back to the obfuscated on-disk representation.
    pub fn to_a2c_bytes(&self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        out.extend_from_slice(&FILE_MAGIC.to_le_bytes());
        for section in &self.sections {
            section.emit_encoded(&mut out)?;
        }
        Ok(out)
    }

    /// Serialize to the decoded representation, same framing with
    /// plaintext bodies.
    pub fn to_decoded_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&FILE_MAGIC.to_le_bytes());
        for section in &self.sections {
            section.emit_decoded(&mut out);
        }
        out
    }
}
