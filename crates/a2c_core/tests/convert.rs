use std::io::Cursor;

use a2c_core::checksum::section_checksum;
use a2c_core::cipher::apply_keystream;
use a2c_core::save::{FILE_MAGIC, SaveFile, convert};
use a2c_core::section::{HEADER_SIZE, SECTION_TAGS, STATS_MAGIC, SectionFault, SectionHeader};
use a2c_core::stats::{self, StatsBlock};

const STATS_INDEX: usize = 4;

fn sample_stats() -> StatsBlock {
    StatsBlock {
        scores: [9_001, 350, 0, 77],
        gold: 123_456,
        stats: [10, 12, 14, 16],
        spells: [3, 0x0600_0000],
        exp: [100, 200, 400, 800, 1_600],
    }
}

fn emit_header(out: &mut Vec<u8>, header: SectionHeader) {
    header.emit_to_vec(out);
}

/// Hand-assemble one ciphered section: header plus keystreamed body.
fn cipher_section(out: &mut Vec<u8>, magic: u32, reserved: u16, seed: u16, plaintext: &[u8]) {
    emit_header(
        out,
        SectionHeader {
            magic,
            length: plaintext.len() as u32,
            reserved,
            seed,
            checksum: section_checksum(plaintext),
        },
    );
    let mut body = plaintext.to_vec();
    apply_keystream(&mut body, seed);
    out.extend_from_slice(&body);
}

fn decoded_section(out: &mut Vec<u8>, magic: u32, reserved: u16, seed: u16, plaintext: &[u8]) {
    emit_header(
        out,
        SectionHeader {
            magic,
            length: plaintext.len() as u32,
            reserved,
            seed,
            checksum: section_checksum(plaintext),
        },
    );
    out.extend_from_slice(plaintext);
}

fn section_bodies() -> [Vec<u8>; 6] {
    [
        b"player info body".to_vec(),
        b"game state, somewhat longer than the first body".to_vec(),
        b"item\x00names\x00".to_vec(),
        vec![0xDE, 0xAD, 0x00, 0x01, 0x02],
        sample_stats().to_decoded_bytes(),
        vec![0x3A; 24],
    ]
}

fn section_seed(index: usize) -> u16 {
    [0x1111, 0x0000, 0x2222, 0x0F0F, 0x4020, 0xBEEF][index]
}

/// Build a full a2c fixture and the decoded output convert should emit.
fn build_fixture() -> (Vec<u8>, Vec<u8>) {
    let bodies = section_bodies();
    let mut a2c = FILE_MAGIC.to_le_bytes().to_vec();
    let mut bin = FILE_MAGIC.to_le_bytes().to_vec();

    for (index, &magic) in SECTION_TAGS.iter().enumerate() {
        let seed = section_seed(index);
        let reserved = if index == 1 { 0x1234 } else { 0 };
        if magic == STATS_MAGIC {
            let (mut header, bytes) = stats::encode_section(&sample_stats(), seed);
            header.reserved = reserved;
            emit_header(&mut a2c, header);
            a2c.extend_from_slice(&bytes);
        } else {
            cipher_section(&mut a2c, magic, reserved, seed, &bodies[index]);
        }
        decoded_section(&mut bin, magic, reserved, seed, &bodies[index]);
    }

    (a2c, bin)
}

#[test]
fn convert_decodes_a_whole_file() {
    let (a2c, expected_bin) = build_fixture();
    let mut output = Vec::new();
    let summary = convert(Cursor::new(a2c), &mut output).expect("convert succeeds");

    assert_eq!(output, expected_bin);
    assert_eq!(summary.sections_emitted, SECTION_TAGS.len());
    assert!(summary.sections_skipped.is_empty());
    assert!(summary.aborted.is_none());
}

#[test]
fn convert_ignores_the_stats_length_claim() {
    // The stats header length is unreliable in source files; the codec
    // consumes what the seed dictates and the output carries the decoded
    // size.
    let (mut a2c, expected_bin) = build_fixture();

    // Patch the stats header's length field. Sections 0..4 precede it.
    let mut offset = 4;
    for index in 0..STATS_INDEX {
        offset += HEADER_SIZE + section_bodies()[index].len();
    }
    let bogus = (stats::encoded_len(section_seed(STATS_INDEX)) as u32) + 7;
    a2c[offset + 4..offset + 8].copy_from_slice(&bogus.to_le_bytes());

    let mut output = Vec::new();
    let summary = convert(Cursor::new(a2c), &mut output).expect("convert succeeds");
    assert_eq!(output, expected_bin);
    assert_eq!(summary.sections_emitted, SECTION_TAGS.len());
}

#[test]
fn oversized_section_is_skipped_and_the_rest_processed() {
    let bodies = section_bodies();
    let mut a2c = FILE_MAGIC.to_le_bytes().to_vec();
    let mut expected = FILE_MAGIC.to_le_bytes().to_vec();

    for (index, &magic) in SECTION_TAGS.iter().enumerate() {
        let seed = section_seed(index);
        if index == 1 {
            // a declared length over the buffer capacity, body skipped
            let junk = vec![0x55u8; 5000];
            emit_header(
                &mut a2c,
                SectionHeader {
                    magic,
                    length: junk.len() as u32,
                    reserved: 0,
                    seed,
                    checksum: 0,
                },
            );
            a2c.extend_from_slice(&junk);
            continue;
        }
        if magic == STATS_MAGIC {
            let (header, bytes) = stats::encode_section(&sample_stats(), seed);
            emit_header(&mut a2c, header);
            a2c.extend_from_slice(&bytes);
        } else {
            cipher_section(&mut a2c, magic, 0, seed, &bodies[index]);
        }
        decoded_section(&mut expected, magic, 0, seed, &bodies[index]);
    }

    let mut output = Vec::new();
    let summary = convert(Cursor::new(a2c), &mut output).expect("convert succeeds");

    assert_eq!(output, expected);
    assert_eq!(summary.sections_emitted, SECTION_TAGS.len() - 1);
    assert_eq!(
        summary.sections_skipped,
        vec![SectionFault::Oversized {
            magic: SECTION_TAGS[1],
            length: 5000,
        }]
    );
    assert!(summary.aborted.is_none());
}

#[test]
fn checksum_mismatch_drops_only_that_section() {
    let (mut a2c, _) = build_fixture();

    // Corrupt the stored checksum of the first section (header starts at 4,
    // checksum is its last u32).
    a2c[4 + 12] ^= 0xFF;

    let mut output = Vec::new();
    let summary = convert(Cursor::new(a2c), &mut output).expect("convert succeeds");

    assert_eq!(summary.sections_emitted, SECTION_TAGS.len() - 1);
    assert_eq!(summary.sections_skipped.len(), 1);
    assert!(matches!(
        summary.sections_skipped[0],
        SectionFault::ChecksumMismatch {
            magic: 0xAAAA_AAAA,
            ..
        }
    ));
    assert!(!summary.sections_skipped[0].is_fatal());

    // The output starts with the second section instead.
    let tag = u32::from_le_bytes(output[4..8].try_into().expect("slice"));
    assert_eq!(tag, SECTION_TAGS[1]);
}

#[test]
fn malformed_magic_aborts_remaining_sections() {
    let bodies = section_bodies();
    let mut a2c = FILE_MAGIC.to_le_bytes().to_vec();
    let mut expected = FILE_MAGIC.to_le_bytes().to_vec();

    for (index, &magic) in SECTION_TAGS.iter().enumerate() {
        let seed = section_seed(index);
        let written_magic = if index == 2 { 0x0BAD_0BAD } else { magic };
        if magic == STATS_MAGIC {
            let (header, bytes) = stats::encode_section(&sample_stats(), seed);
            emit_header(&mut a2c, header);
            a2c.extend_from_slice(&bytes);
        } else {
            cipher_section(&mut a2c, written_magic, 0, seed, &bodies[index]);
        }
        if index < 2 {
            decoded_section(&mut expected, magic, 0, seed, &bodies[index]);
        }
    }

    let mut output = Vec::new();
    let summary = convert(Cursor::new(a2c), &mut output).expect("convert succeeds");

    // Sections before the bad tag survive; nothing after it is read.
    assert_eq!(output, expected);
    assert_eq!(summary.sections_emitted, 2);
    assert_eq!(
        summary.aborted,
        Some(SectionFault::Malformed {
            expected: SECTION_TAGS[2],
            found: 0x0BAD_0BAD,
        })
    );
    assert!(summary.aborted.expect("aborted").is_fatal());
}

#[test]
fn rejects_a_wrong_file_magic() {
    let (mut a2c, _) = build_fixture();
    a2c[0] ^= 0x01;
    let mut output = Vec::new();
    assert!(convert(Cursor::new(a2c), &mut output).is_err());
    assert!(output.is_empty());
}

#[test]
fn save_file_round_trips_to_identical_bytes() {
    let (a2c, bin) = build_fixture();

    let save = SaveFile::parse(Cursor::new(a2c.as_slice())).expect("save parses");
    assert_eq!(save.stats, sample_stats());
    assert_eq!(save.sections.len(), SECTION_TAGS.len());
    assert_eq!(save.sections[1].reserved, 0x1234);

    assert_eq!(save.to_a2c_bytes().expect("re-encode succeeds"), a2c);
    assert_eq!(save.to_decoded_bytes(), bin);
}

#[test]
fn strict_parse_rejects_what_convert_skips() {
    let (mut a2c, _) = build_fixture();
    a2c[4 + 12] ^= 0xFF; // first section checksum
    assert!(SaveFile::parse(Cursor::new(a2c)).is_err());
}

#[test]
fn edited_stats_survive_a_reencode_cycle() {
    let (a2c, _) = build_fixture();
    let mut save = SaveFile::parse(Cursor::new(a2c)).expect("save parses");

    let mut edited = save.stats;
    edited.gold = 999_999;
    edited.stats[2] = 0x7F;
    save.set_stats(edited).expect("stats section present");

    let reencoded = save.to_a2c_bytes().expect("re-encode succeeds");
    let reparsed = SaveFile::parse(Cursor::new(reencoded)).expect("re-parse succeeds");
    assert_eq!(reparsed.stats, edited);
}

#[test]
fn convert_summary_renders_as_json() {
    let (mut a2c, _) = build_fixture();
    a2c[4 + 12] ^= 0xFF;

    let mut output = Vec::new();
    let summary = convert(Cursor::new(a2c), &mut output).expect("convert succeeds");
    let value = serde_json::to_value(&summary).expect("summary serializes");

    assert_eq!(value["sections_emitted"], 5);
    assert!(value["sections_skipped"][0]["ChecksumMismatch"].is_object());
}
