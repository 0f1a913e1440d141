//! CRAM container walker
//!
//! Reads the file definition, the SAM header carried by the first
//! container, and every subsequent container header. Record-level data
//! series are entropy coded per slice and are not decoded here, so CRAM
//! summaries carry container-level counts only.

use flate2::read::GzDecoder;
use std::io::Read;

use crate::error::ContainerError;

use super::alignment::AlignmentTally;
use super::reader::{ByteReader, ParseResult};

const CRAM_MAGIC: &[u8] = b"CRAM";
const FILE_ID_LEN: usize = 20;

/// Block content type carrying the SAM header
const CONTENT_FILE_HEADER: u8 = 0;

const METHOD_RAW: u8 = 0;
const METHOD_GZIP: u8 = 1;

/// Container reference id meaning "unmapped, unplaced"
const UNMAPPED_REF: i32 = -1;

pub(crate) fn read(bytes: &[u8], tally: &mut AlignmentTally) -> ParseResult<()> {
    let mut r = ByteReader::new(bytes);
    r.expect_magic(CRAM_MAGIC, "CRAM")?;
    let major = r.u8()?;
    let _minor = r.u8()?;
    if !(2..=3).contains(&major) {
        return Err(ContainerError::Invalid(format!(
            "unsupported CRAM major version {}",
            major
        )));
    }
    r.skip(FILE_ID_LEN)?;

    let header = ContainerHeader::read(&mut r, major)?;
    let sam_header = read_header_block(r.take(header.length)?, major)?;
    tally.set_references(reference_names(&sam_header));

    let (mut mapped, mut unmapped) = (0u64, 0u64);
    while !r.is_empty() {
        let container = ContainerHeader::read(&mut r, major)?;
        r.skip(container.length)?;
        // Multi-reference containers (-2) only hold placed records
        if container.ref_seq_id == UNMAPPED_REF {
            unmapped += container.n_records;
        } else {
            mapped += container.n_records;
        }
    }
    tally.add_counts(mapped, unmapped);
    Ok(())
}

struct ContainerHeader {
    length: usize,
    ref_seq_id: i32,
    n_records: u64,
}

impl ContainerHeader {
    fn read(r: &mut ByteReader<'_>, major: u8) -> ParseResult<Self> {
        let start = r.position();
        let length = r.len_i32("container")?;
        let ref_seq_id = itf8(r)?;
        let _alignment_start = itf8(r)?;
        let _alignment_span = itf8(r)?;
        let n_records = itf8(r)?;
        let _record_counter = ltf8(r)?;
        let _bases = ltf8(r)?;
        let _n_blocks = itf8(r)?;
        let n_landmarks = non_negative(itf8(r)?, "landmark count")?;
        for _ in 0..n_landmarks {
            itf8(r)?;
        }
        if major >= 3 {
            verify_crc(r, start, "container header")?;
        }

        Ok(Self {
            length,
            ref_seq_id,
            n_records: non_negative(n_records, "container record count")? as u64,
        })
    }
}

fn read_header_block(body: &[u8], major: u8) -> ParseResult<String> {
    let mut r = ByteReader::new(body);
    let method = r.u8()?;
    let content_type = r.u8()?;
    let _content_id = itf8(&mut r)?;
    let size = non_negative(itf8(&mut r)?, "block size")?;
    let raw_size = non_negative(itf8(&mut r)?, "block raw size")?;
    let data = r.take(size)?;
    if major >= 3 {
        verify_crc(&mut r, 0, "file header block")?;
    }
    if content_type != CONTENT_FILE_HEADER {
        return Err(ContainerError::Invalid(format!(
            "first container holds block content type {}, not a file header",
            content_type
        )));
    }

    let raw = match method {
        METHOD_RAW => data.to_vec(),
        METHOD_GZIP => {
            let mut out = Vec::with_capacity(raw_size);
            GzDecoder::new(data).read_to_end(&mut out)?;
            out
        }
        other => {
            return Err(ContainerError::Invalid(format!(
                "unsupported file header block compression method {}",
                other
            )))
        }
    };

    let mut hr = ByteReader::new(&raw);
    let l_text = hr.len_i32("SAM header")?;
    Ok(String::from_utf8_lossy(hr.take(l_text)?).into_owned())
}

/// `SN` of every `@SQ` line, in header order
fn reference_names(sam_header: &str) -> Vec<String> {
    sam_header
        .lines()
        .filter(|line| line.starts_with("@SQ"))
        .filter_map(|line| {
            line.split('\t')
                .find_map(|field| field.strip_prefix("SN:"))
                .map(str::to_string)
        })
        .collect()
}

/// Checks the CRC32 that follows the bytes read since `start`
fn verify_crc(r: &mut ByteReader<'_>, start: usize, what: &'static str) -> ParseResult<()> {
    let mut crc = flate2::Crc::new();
    crc.update(r.since(start));
    let expected = r.u32()?;
    if crc.sum() != expected {
        return Err(ContainerError::Checksum { what });
    }
    Ok(())
}

fn non_negative(value: i32, what: &str) -> ParseResult<usize> {
    usize::try_from(value).map_err(|_| ContainerError::Invalid(format!("negative {}: {}", what, value)))
}

/// CRAM variable-length 32-bit integer
fn itf8(r: &mut ByteReader<'_>) -> ParseResult<i32> {
    let b0 = u32::from(r.u8()?);
    let value = if b0 & 0x80 == 0 {
        b0
    } else if b0 & 0x40 == 0 {
        ((b0 & 0x7f) << 8) | u32::from(r.u8()?)
    } else if b0 & 0x20 == 0 {
        let b = r.take(2)?;
        ((b0 & 0x3f) << 16) | (u32::from(b[0]) << 8) | u32::from(b[1])
    } else if b0 & 0x10 == 0 {
        let b = r.take(3)?;
        ((b0 & 0x1f) << 24) | (u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2])
    } else {
        let b = r.take(4)?;
        ((b0 & 0x0f) << 28)
            | (u32::from(b[0]) << 20)
            | (u32::from(b[1]) << 12)
            | (u32::from(b[2]) << 4)
            | (u32::from(b[3]) & 0x0f)
    };
    Ok(value as i32)
}

/// CRAM variable-length 64-bit integer
fn ltf8(r: &mut ByteReader<'_>) -> ParseResult<i64> {
    let b0 = r.u8()?;
    let extra = b0.leading_ones() as usize;
    let mut value: u64 = if extra >= 7 {
        0
    } else {
        u64::from(b0 & (0xff >> (extra + 1)))
    };
    for &b in r.take(extra)? {
        value = (value << 8) | u64::from(b);
    }
    Ok(value as i64)
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use super::test_support::itf8;
    use crate::decode::decode;
    use crate::summary::{AlignmentContainer, DecodedSummary};
    use crate::types::{Format, ResolvedPayload};
    use bytes::Bytes;

    const SAM_HEADER: &str = "@HD\tVN:1.6\n@SQ\tSN:chr1\tLN:1000\n@SQ\tLN:500\tSN:chr2\n@RG\tID:rg1\n";

    fn cram(containers: &[(i32, i32)]) -> Vec<u8> {
        let mut out = file_definition();
        out.extend(container(0, 0, &header_block(SAM_HEADER)));
        for (ref_id, n) in containers {
            out.extend(container(*ref_id, *n, &[0xaa; 16]));
        }
        // EOF container
        out.extend(container(-1, 0, &[0u8; 15]));
        out
    }

    fn payload(bytes: Vec<u8>) -> ResolvedPayload {
        ResolvedPayload {
            format: Format::Cram,
            segment_sizes: vec![bytes.len()],
            bytes: Bytes::from(bytes),
        }
    }

    #[test]
    fn test_itf8_round_trip_edges() {
        for value in [0, 1, 127, 128, 16383, 16384, 1 << 20, 4_542_278, -1, -2, i32::MAX] {
            let encoded = itf8(value);
            let mut r = ByteReader::new(&encoded);
            assert_eq!(super::itf8(&mut r).unwrap(), value, "value {}", value);
            assert!(r.is_empty());
        }
    }

    #[test]
    fn test_ltf8_multi_byte() {
        let mut r = ByteReader::new(&[0x81, 0x02]);
        assert_eq!(ltf8(&mut r).unwrap(), 0x102);
        let mut r = ByteReader::new(&[0xff, 0, 0, 0, 0, 0, 0, 0x01, 0x00]);
        assert_eq!(ltf8(&mut r).unwrap(), 0x100);
    }

    #[test]
    fn test_counts_by_container_placement() {
        let bytes = cram(&[(0, 40), (1, 10), (-2, 5), (-1, 7)]);
        let summary = match decode(payload(bytes)).unwrap() {
            DecodedSummary::Alignment(a) => a,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(summary.container, AlignmentContainer::Cram);
        assert_eq!(summary.reference_names.items, vec!["chr1", "chr2"]);
        assert_eq!(summary.mapped_count, 55);
        assert_eq!(summary.unmapped_count, 7);
        assert_eq!(summary.reads.total, 62);
        assert!(summary.reads.is_empty());
        assert!(!summary.records_decoded);
    }

    #[test]
    fn test_corrupt_container_crc() {
        let mut bytes = cram(&[(0, 3)]);
        // flip a byte inside the first data container's header
        let offset = file_definition().len() + container(0, 0, &header_block(SAM_HEADER)).len() + 5;
        bytes[offset] ^= 0x01;
        let err = decode(payload(bytes)).unwrap_err();
        assert!(err.to_string().contains("malformed alignment container (CRAM)"));
    }

    #[test]
    fn test_truncated_container_body() {
        let mut bytes = cram(&[(0, 3)]);
        bytes.truncate(bytes.len() - 20);
        assert!(decode(payload(bytes)).is_err());
    }

    #[test]
    fn test_rejects_bam_bytes_declared_as_cram() {
        assert!(decode(payload(b"BAM\x01garbage".to_vec())).is_err());
    }
}
