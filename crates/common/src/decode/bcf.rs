//! BCF2 container walker

use std::collections::HashMap;

use crate::error::ContainerError;
use crate::summary::{Bounded, VariantRecord, VariantSummary, RECORD_CAP, SAMPLE_CAP};

use super::bgzf;
use super::reader::{c_string, ByteReader, ParseResult};

const BCF_MAGIC: &[u8] = b"BCF\x02";

/// Shared-block bytes before the ID field
const FIXED_SHARED_LEN: usize = 24;

// Typed value type codes
const TYPE_MISSING: u8 = 0;
const TYPE_INT8: u8 = 1;
const TYPE_INT16: u8 = 2;
const TYPE_INT32: u8 = 3;
const TYPE_FLOAT: u8 = 5;
const TYPE_CHAR: u8 = 7;

pub(crate) fn read(bytes: &[u8]) -> ParseResult<VariantSummary> {
    let data = bgzf::inflate(bytes)?;
    let mut r = ByteReader::new(&data);

    r.expect_magic(BCF_MAGIC, "BCF\\2")?;
    let _minor = r.u8()?;
    let l_text = r.u32()? as usize;
    let header = HeaderInfo::parse(&c_string(r.take(l_text)?));

    let mut records = Bounded::new(RECORD_CAP);
    while !r.is_empty() {
        let l_shared = r.u32()? as usize;
        let l_indiv = r.u32()? as usize;
        let shared = r.take(l_shared)?;
        r.skip(l_indiv)?;

        if records.is_full() {
            // Still bounds-check the fixed fields so corruption surfaces
            check_shared(shared, &header)?;
            records.skip(1);
        } else {
            records.push(read_shared(shared, &header)?);
        }
    }

    Ok(VariantSummary {
        samples: Bounded::from_vec(header.samples, SAMPLE_CAP),
        records: records.finish(),
    })
}

fn check_shared(shared: &[u8], header: &HeaderInfo) -> ParseResult<()> {
    let mut r = ByteReader::new(shared);
    let chrom = r.i32()?;
    header.contig(chrom)?;
    r.skip(FIXED_SHARED_LEN - 4)
}

fn read_shared(shared: &[u8], header: &HeaderInfo) -> ParseResult<VariantRecord> {
    let mut r = ByteReader::new(shared);
    let chrom = r.i32()?;
    let pos = r.i32()?;
    let _rlen = r.i32()?;
    let _qual = r.u32()?;
    let n_allele_info = r.u32()?;
    let _n_fmt_sample = r.u32()?;
    let n_allele = (n_allele_info >> 16) as usize;

    let _id = typed_string(&mut r)?;
    let mut alleles = Vec::with_capacity(n_allele);
    for _ in 0..n_allele {
        alleles.push(typed_string(&mut r)?);
    }

    let position = u64::try_from(pos)
        .map(|p| p + 1)
        .map_err(|_| ContainerError::Invalid(format!("negative variant position {}", pos)))?;
    let mut alleles = alleles.into_iter();
    let reference_allele = alleles.next().unwrap_or_default();
    let alternate_alleles = alleles.collect::<Vec<_>>().join(",");

    Ok(VariantRecord {
        chromosome: header.contig(chrom)?.to_string(),
        position,
        reference_allele,
        alternate_alleles,
    })
}

/// Reads a typed descriptor, returning (type, element count)
fn type_descriptor(r: &mut ByteReader<'_>) -> ParseResult<(u8, usize)> {
    let byte = r.u8()?;
    let kind = byte & 0x0f;
    let mut count = (byte >> 4) as usize;
    if count == 15 {
        let (count_kind, n) = type_descriptor(r)?;
        if n != 1 {
            return Err(ContainerError::Invalid(
                "typed length is not a single integer".to_string(),
            ));
        }
        let value = match count_kind {
            TYPE_INT8 => i64::from(r.u8()? as i8),
            TYPE_INT16 => i64::from(r.u16()? as i16),
            TYPE_INT32 => i64::from(r.i32()?),
            other => {
                return Err(ContainerError::Invalid(format!(
                    "typed length has non-integer type {}",
                    other
                )))
            }
        };
        count = usize::try_from(value)
            .map_err(|_| ContainerError::Invalid(format!("negative typed length {}", value)))?;
    }
    Ok((kind, count))
}

fn typed_string(r: &mut ByteReader<'_>) -> ParseResult<String> {
    let (kind, count) = type_descriptor(r)?;
    match kind {
        TYPE_CHAR => Ok(c_string(r.take(count)?)),
        TYPE_MISSING => Ok(String::new()),
        TYPE_INT8 | TYPE_INT16 | TYPE_INT32 | TYPE_FLOAT => Err(ContainerError::Invalid(format!(
            "expected a character field, found type {}",
            kind
        ))),
        other => Err(ContainerError::Invalid(format!(
            "unknown typed value type {}",
            other
        ))),
    }
}

/// The parts of the VCF header text a summary needs
struct HeaderInfo {
    contigs: HashMap<i32, String>,
    samples: Vec<String>,
}

impl HeaderInfo {
    fn parse(text: &str) -> Self {
        let mut contigs = HashMap::new();
        let mut samples = Vec::new();
        let mut next_idx = 0;

        for line in text.lines() {
            if let Some(body) = line
                .strip_prefix("##contig=<")
                .and_then(|rest| rest.strip_suffix('>'))
            {
                let attrs = parse_structured(body);
                let Some(id) = attrs.get("ID") else { continue };
                let idx = attrs
                    .get("IDX")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(next_idx);
                contigs.insert(idx, id.to_string());
                next_idx = idx + 1;
            } else if line.starts_with("#CHROM") {
                samples = line.split('\t').skip(9).map(str::to_string).collect();
            }
        }

        Self { contigs, samples }
    }

    fn contig(&self, idx: i32) -> ParseResult<&str> {
        self.contigs.get(&idx).map(String::as_str).ok_or_else(|| {
            ContainerError::Invalid(format!("record contig index {} not in header", idx))
        })
    }
}

/// Splits `ID=chr1,length=100,Description="a,b"` into key/value pairs
fn parse_structured(body: &str) -> HashMap<&str, &str> {
    let mut out = HashMap::new();
    let mut rest = body;
    while !rest.is_empty() {
        let Some(eq) = rest.find('=') else { break };
        let key = rest[..eq].trim();
        let after = &rest[eq + 1..];
        let (value, remainder) = if let Some(quoted) = after.strip_prefix('"') {
            match quoted.find('"') {
                Some(end) => (&quoted[..end], &quoted[end + 1..]),
                None => (quoted, ""),
            }
        } else {
            match after.find(',') {
                Some(end) => (&after[..end], &after[end..]),
                None => (after, ""),
            }
        };
        out.insert(key, value);
        rest = remainder.trim_start_matches(',');
    }
    out
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::decode::decode;
    use crate::error::DecodeError;
    use crate::summary::DecodedSummary;
    use crate::types::{Format, ResolvedPayload};
    use bytes::Bytes;

    fn payload(parts: &[&[u8]]) -> ResolvedPayload {
        ResolvedPayload {
            format: Format::Bcf,
            segment_sizes: parts.iter().map(|p| p.len()).collect(),
            bytes: Bytes::from(parts.concat()),
        }
    }

    fn variants(summary: DecodedSummary) -> VariantSummary {
        match summary {
            DecodedSummary::Variant(v) => v,
            other => panic!("expected variant summary, got {:?}", other),
        }
    }

    #[test]
    fn test_samples_and_first_records() {
        let records: Vec<Vec<u8>> = (0..12)
            .map(|i| record(i % 2, 999 + i, &["A", "G", "T"]))
            .collect();
        let (header, body) = bcf_file(&records);
        let summary = variants(decode(payload(&[&header, &body])).unwrap());

        assert_eq!(summary.samples.items, vec!["NA12878", "NA12891"]);
        assert_eq!(summary.records.len(), 10);
        assert_eq!(summary.records.total, 12);
        assert!(summary.records.is_truncated());

        let first = &summary.records.items[0];
        assert_eq!(first.chromosome, "chr1");
        assert_eq!(first.position, 1000);
        assert_eq!(first.reference_allele, "A");
        assert_eq!(first.alternate_alleles, "G,T");
        assert_eq!(summary.records.items[1].chromosome, "chr2");
        assert_eq!(first.to_string(), "chr1:1000 A -> G,T");
    }

    #[test]
    fn test_long_allele_uses_overflow_length() {
        let long_ref = "ACGTACGTACGTACGTACGT";
        let (header, body) = bcf_file(&[record(0, 9, &[long_ref, "A"])]);
        let summary = variants(decode(payload(&[&header, &body])).unwrap());
        assert_eq!(summary.records.items[0].reference_allele, long_ref);
        assert_eq!(summary.records.items[0].position, 10);
    }

    #[test]
    fn test_truncated_payload_is_an_error_not_a_partial_summary() {
        let records: Vec<Vec<u8>> = (0..5).map(|i| record(0, i, &["C", "T"])).collect();
        let (header, body) = bcf_file(&records);
        let cut = &body[..body.len() / 2];
        let err = decode(payload(&[&header, cut])).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedVariant { .. }));
        assert_eq!(err.format(), &Format::Bcf);
    }

    #[test]
    fn test_record_cut_inside_shared_block() {
        let mut raw = header_block();
        let rec = record(0, 5, &["C", "T"]);
        raw.extend_from_slice(&rec[..12]);
        let bytes = crate::decode::bgzf::test_support::member(&raw);
        assert!(decode(payload(&[&bytes])).is_err());
    }

    #[test]
    fn test_unknown_contig_index() {
        let (header, body) = bcf_file(&[record(9, 5, &["C", "T"])]);
        assert!(decode(payload(&[&header, &body])).is_err());
    }

    #[test]
    fn test_contigs_without_idx_follow_header_order() {
        let info = HeaderInfo::parse(
            "##contig=<ID=1,length=10>\n##contig=<ID=X,length=5>\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n",
        );
        assert_eq!(info.contig(0).unwrap(), "1");
        assert_eq!(info.contig(1).unwrap(), "X");
        assert!(info.samples.is_empty());
    }

    #[test]
    fn test_parse_structured_handles_quoted_commas() {
        let attrs = parse_structured("ID=DP,Number=1,Description=\"Depth, total\",IDX=3");
        assert_eq!(attrs["ID"], "DP");
        assert_eq!(attrs["Description"], "Depth, total");
        assert_eq!(attrs["IDX"], "3");
    }
}
