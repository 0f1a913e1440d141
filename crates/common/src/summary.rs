//! Bounded, human-readable summaries of decoded payloads

use serde::{Deserialize, Serialize};

/// Maximum leading records kept in a summary
pub const RECORD_CAP: usize = 10;

/// Maximum reference names kept for display
pub const REFERENCE_NAME_CAP: usize = 10;

/// Maximum sample names kept for display
pub const SAMPLE_CAP: usize = 100;

/// Characters of text kept for a variant-text preview
pub const TEXT_PREVIEW_CHARS: usize = 5000;

/// Bytes kept for an unknown-format preview
pub const RAW_PREVIEW_BYTES: usize = 2000;

/// A capped list that remembers how many items there were in total
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounded<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> Bounded<T> {
    pub fn new(cap: usize) -> BoundedBuilder<T> {
        BoundedBuilder {
            cap,
            items: Vec::with_capacity(cap.min(64)),
            total: 0,
        }
    }

    pub fn from_vec(all: Vec<T>, cap: usize) -> Self {
        let mut builder = Self::new(cap);
        for item in all {
            builder.push(item);
        }
        builder.finish()
    }

    /// More items exist than are listed
    pub fn is_truncated(&self) -> bool {
        self.total > self.items.len() as u64
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Accumulates a [`Bounded`] while counting everything pushed
#[derive(Debug)]
pub struct BoundedBuilder<T> {
    cap: usize,
    items: Vec<T>,
    total: u64,
}

impl<T> BoundedBuilder<T> {
    pub fn push(&mut self, item: T) {
        if self.items.len() < self.cap {
            self.items.push(item);
        }
        self.total += 1;
    }

    /// Count `n` items without keeping them
    pub fn skip(&mut self, n: u64) {
        self.total += n;
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.cap
    }

    pub fn finish(self) -> Bounded<T> {
        Bounded {
            items: self.items,
            total: self.total,
        }
    }
}

/// Result of decoding a resolved payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecodedSummary {
    Alignment(AlignmentSummary),
    VariantText(TextPreview),
    Variant(VariantSummary),
    Raw(RawPreview),
}

impl DecodedSummary {
    pub fn reference_names(&self) -> &[String] {
        match self {
            DecodedSummary::Alignment(a) => &a.reference_names.items,
            _ => &[],
        }
    }

    pub fn sample_names(&self) -> &[String] {
        match self {
            DecodedSummary::Variant(v) => &v.samples.items,
            _ => &[],
        }
    }

    /// Total records observed, where the format exposes them
    pub fn record_total(&self) -> Option<u64> {
        match self {
            DecodedSummary::Alignment(a) => Some(a.reads.total),
            DecodedSummary::Variant(v) => Some(v.records.total),
            _ => None,
        }
    }
}

/// Which alignment container produced a summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlignmentContainer {
    Bam,
    Cram,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentSummary {
    pub container: AlignmentContainer,
    pub reference_names: Bounded<String>,
    pub mapped_count: u64,
    pub unmapped_count: u64,
    /// Leading reads; `total` counts every record in the payload
    pub reads: Bounded<AlignmentRecord>,
    /// False when only container-level counts were available
    pub records_decoded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentRecord {
    pub name: String,
    pub reference_name: Option<String>,
    /// 0-based leftmost position
    pub start: Option<u64>,
    /// 0-based exclusive end on the reference
    pub end: Option<u64>,
}

impl std::fmt::Display for AlignmentRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let opt = |v: Option<u64>| v.map(|v| v.to_string()).unwrap_or_else(|| "*".to_string());
        write!(
            f,
            "{}: {}:{}-{}",
            self.name,
            self.reference_name.as_deref().unwrap_or("*"),
            opt(self.start),
            opt(self.end)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSummary {
    pub samples: Bounded<String>,
    pub records: Bounded<VariantRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantRecord {
    pub chromosome: String,
    /// 1-based position
    pub position: u64,
    pub reference_allele: String,
    /// Alternate alleles joined with ","
    pub alternate_alleles: String,
}

impl std::fmt::Display for VariantRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} {} -> {}",
            self.chromosome, self.position, self.reference_allele, self.alternate_alleles
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPreview {
    pub text: String,
    pub truncated: bool,
    pub total_bytes: usize,
    /// Undecodable bytes were replaced with U+FFFD
    pub replaced_invalid: bool,
    /// Input was gzip/BGZF and was inflated before decoding
    pub inflated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPreview {
    pub format: String,
    pub text: String,
    pub truncated: bool,
    pub total_bytes: usize,
}
