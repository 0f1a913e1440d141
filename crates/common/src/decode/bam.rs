//! BAM container walker

use crate::error::ContainerError;
use crate::summary::AlignmentRecord;

use super::alignment::AlignmentTally;
use super::bgzf;
use super::reader::{c_string, ByteReader, ParseResult};

const BAM_MAGIC: &[u8] = b"BAM\x01";

/// Fixed-size prefix of every alignment record
const FIXED_RECORD_LEN: usize = 32;

const FLAG_UNMAPPED: u16 = 0x4;

pub(crate) fn read(bytes: &[u8], tally: &mut AlignmentTally) -> ParseResult<()> {
    let data = bgzf::inflate(bytes)?;
    let mut r = ByteReader::new(&data);

    r.expect_magic(BAM_MAGIC, "BAM\\1")?;
    let l_text = r.len_i32("header text")?;
    r.skip(l_text)?;

    let n_ref = r.len_i32("reference count")?;
    let mut references = Vec::with_capacity(n_ref.min(4096));
    for _ in 0..n_ref {
        let l_name = r.len_i32("reference name")?;
        references.push(c_string(r.take(l_name)?));
        r.i32()?;
    }
    tally.set_references(references);

    while !r.is_empty() {
        let block_size = r.len_i32("record")?;
        let block = r.take(block_size)?;
        read_record(block, tally)?;
    }
    Ok(())
}

fn read_record(block: &[u8], tally: &mut AlignmentTally) -> ParseResult<()> {
    if block.len() < FIXED_RECORD_LEN {
        return Err(ContainerError::Invalid(format!(
            "alignment record of {} bytes is shorter than its fixed fields",
            block.len()
        )));
    }
    let mut r = ByteReader::new(block);
    let ref_id = r.i32()?;
    let pos = r.i32()?;
    let l_read_name = r.u8()? as usize;
    r.skip(3)?; // mapq, bin
    let n_cigar_op = r.u16()? as usize;
    let flag = r.u16()?;
    r.skip(16)?; // l_seq, next_refID, next_pos, tlen

    let reference_name = match ref_id {
        -1 => None,
        id if id >= 0 && (id as usize) < tally.references().len() => {
            Some(tally.references()[id as usize].clone())
        }
        id => {
            return Err(ContainerError::Invalid(format!(
                "record reference id {} outside {} declared references",
                id,
                tally.references().len()
            )))
        }
    };

    let name = c_string(r.take(l_read_name)?);
    let mut span = 0u64;
    for _ in 0..n_cigar_op {
        let op = r.u32()?;
        // M, D, N, =, X consume the reference
        if matches!(op & 0xf, 0 | 2 | 3 | 7 | 8) {
            span += u64::from(op >> 4);
        }
    }

    let mapped = flag & FLAG_UNMAPPED == 0;
    let detail = tally.wants_detail().then(|| {
        let start = u64::try_from(pos).ok();
        let end = match start {
            Some(start) if mapped && span > 0 => Some(start + span),
            _ => None,
        };
        AlignmentRecord {
            name,
            reference_name,
            start,
            end,
        }
    });
    tally.add_read(mapped, detail);
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::decode::bgzf::{test_support::member, EOF_BLOCK};

    pub struct TestRead<'a> {
        pub name: &'a str,
        pub ref_id: i32,
        pub pos: i32,
        pub flag: u16,
        /// (length, op code)
        pub cigar: Vec<(u32, u32)>,
    }

    pub fn header(references: &[(&str, u32)]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"BAM\x01");
        let mut text = String::from("@HD\tVN:1.6\tSO:coordinate\n");
        for (name, len) in references {
            text.push_str(&format!("@SQ\tSN:{}\tLN:{}\n", name, len));
        }
        out.extend_from_slice(&(text.len() as i32).to_le_bytes());
        out.extend_from_slice(text.as_bytes());
        out.extend_from_slice(&(references.len() as i32).to_le_bytes());
        for (name, len) in references {
            out.extend_from_slice(&((name.len() + 1) as i32).to_le_bytes());
            out.extend_from_slice(name.as_bytes());
            out.push(0);
            out.extend_from_slice(&(*len as i32).to_le_bytes());
        }
        out
    }

    pub fn record(read: &TestRead<'_>) -> Vec<u8> {
        let seq = b"ACGT";
        let mut body = Vec::new();
        body.extend_from_slice(&read.ref_id.to_le_bytes());
        body.extend_from_slice(&read.pos.to_le_bytes());
        body.push((read.name.len() + 1) as u8);
        body.push(60); // mapq
        body.extend_from_slice(&0u16.to_le_bytes()); // bin
        body.extend_from_slice(&(read.cigar.len() as u16).to_le_bytes());
        body.extend_from_slice(&read.flag.to_le_bytes());
        body.extend_from_slice(&(seq.len() as u32).to_le_bytes());
        body.extend_from_slice(&(-1i32).to_le_bytes());
        body.extend_from_slice(&(-1i32).to_le_bytes());
        body.extend_from_slice(&0i32.to_le_bytes());
        body.extend_from_slice(read.name.as_bytes());
        body.push(0);
        for (len, op) in &read.cigar {
            body.extend_from_slice(&((len << 4) | op).to_le_bytes());
        }
        body.extend_from_slice(&[0x12, 0x48]); // packed ACGT
        body.extend_from_slice(&[30u8; 4]);

        let mut out = (body.len() as i32).to_le_bytes().to_vec();
        out.extend(body);
        out
    }

    /// Header member followed by one member of records and the EOF block
    pub fn bam_file(references: &[(&str, u32)], reads: &[TestRead<'_>]) -> (Vec<u8>, Vec<u8>) {
        let header = member(&header(references));
        let mut records = Vec::new();
        for read in reads {
            records.extend(record(read));
        }
        let mut body = member(&records);
        body.extend_from_slice(&EOF_BLOCK);
        (header, body)
    }

    /// `n` mapped reads spread round-robin over the references
    pub fn mapped_reads(n: usize, n_refs: i32) -> Vec<(String, i32, i32)> {
        (0..n)
            .map(|i| (format!("read{}", i), i as i32 % n_refs, i as i32 * 100))
            .collect()
    }
}
