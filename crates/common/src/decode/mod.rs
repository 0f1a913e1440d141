//! Format-specific structural decoders
//!
//! ```text
//! ResolvedPayload ──► decode() ──┬─ BAM / CRAM ─► alignment ─► AlignmentSummary
//!                                ├─ VCF ────────► text ──────► TextPreview
//!                                ├─ BCF ────────► bcf ───────► VariantSummary
//!                                └─ other ──────► text ──────► RawPreview
//! ```
//!
//! Binary decoders walk the whole payload before returning, so a corrupt
//! tail is reported as an error rather than hidden behind a summary of the
//! records that happened to come first.

mod alignment;
mod bam;
pub mod bgzf;
mod bcf;
mod cram;
mod reader;
mod text;

use tracing::debug;

use crate::error::{DecodeError, DecodeResult};
use crate::summary::DecodedSummary;
use crate::types::{Format, ResolvedPayload};

/// Decode a resolved payload according to its declared format
///
/// Consumes the payload: summaries hold a bounded set of facts, never the
/// bytes themselves.
pub fn decode(payload: ResolvedPayload) -> DecodeResult<DecodedSummary> {
    let ResolvedPayload { format, bytes, .. } = payload;
    debug!(format = %format, bytes = bytes.len(), "decoding payload");

    match &format {
        Format::Bam | Format::Cram => {
            alignment::decode(&format, &bytes).map(DecodedSummary::Alignment)
        }
        Format::Vcf => Ok(DecodedSummary::VariantText(text::variant_text(&bytes))),
        Format::Bcf => bcf::read(&bytes)
            .map(DecodedSummary::Variant)
            .map_err(|source| DecodeError::MalformedVariant {
                format: format.clone(),
                source,
            }),
        Format::Unknown(name) => Ok(DecodedSummary::Raw(text::raw(name, &bytes))),
    }
}
