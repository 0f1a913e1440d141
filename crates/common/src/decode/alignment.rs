//! Shared alignment decode path for BAM and CRAM

use crate::error::{DecodeError, DecodeResult};
use crate::summary::{
    AlignmentContainer, AlignmentRecord, AlignmentSummary, Bounded, BoundedBuilder, RECORD_CAP,
    REFERENCE_NAME_CAP,
};
use crate::types::Format;

use super::{bam, cram};

/// Accumulates what either container reader learns about a payload
pub(crate) struct AlignmentTally {
    references: Vec<String>,
    mapped: u64,
    unmapped: u64,
    reads: BoundedBuilder<AlignmentRecord>,
    records_decoded: bool,
}

impl AlignmentTally {
    fn new() -> Self {
        Self {
            references: Vec::new(),
            mapped: 0,
            unmapped: 0,
            reads: Bounded::new(RECORD_CAP),
            records_decoded: true,
        }
    }

    pub fn set_references(&mut self, references: Vec<String>) {
        self.references = references;
    }

    pub fn references(&self) -> &[String] {
        &self.references
    }

    /// Whether another read would still be listed
    pub fn wants_detail(&self) -> bool {
        !self.reads.is_full()
    }

    /// One decoded record; `detail` may be omitted once the list is full
    pub fn add_read(&mut self, mapped: bool, detail: Option<AlignmentRecord>) {
        if mapped {
            self.mapped += 1;
        } else {
            self.unmapped += 1;
        }
        match detail {
            Some(record) => self.reads.push(record),
            None => self.reads.skip(1),
        }
    }

    /// Records known only by count
    pub fn add_counts(&mut self, mapped: u64, unmapped: u64) {
        self.mapped += mapped;
        self.unmapped += unmapped;
        self.reads.skip(mapped + unmapped);
        self.records_decoded = false;
    }

    fn finish(self, container: AlignmentContainer) -> AlignmentSummary {
        AlignmentSummary {
            container,
            reference_names: Bounded::from_vec(self.references, REFERENCE_NAME_CAP),
            mapped_count: self.mapped,
            unmapped_count: self.unmapped,
            reads: self.reads.finish(),
            records_decoded: self.records_decoded,
        }
    }
}

pub(crate) fn decode(format: &Format, bytes: &[u8]) -> DecodeResult<AlignmentSummary> {
    let mut tally = AlignmentTally::new();
    let (container, result) = match format {
        Format::Cram => (AlignmentContainer::Cram, cram::read(bytes, &mut tally)),
        _ => (AlignmentContainer::Bam, bam::read(bytes, &mut tally)),
    };
    result.map_err(|source| DecodeError::MalformedAlignment {
        format: format.clone(),
        source,
    })?;
    Ok(tally.finish(container))
}
