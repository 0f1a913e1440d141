//! htsprobe common library
//!
//! Wire types for htsget tickets, payload decoders for the genomic
//! container formats a ticket can resolve to, and the bounded summaries
//! those decoders produce.

pub mod decode;
pub mod error;
pub mod preview;
pub mod summary;
pub mod types;

pub use decode::decode;
pub use error::{ContainerError, DecodeError, DecodeResult};
pub use summary::{
    AlignmentContainer, AlignmentRecord, AlignmentSummary, Bounded, DecodedSummary, RawPreview,
    TextPreview, VariantRecord, VariantSummary,
};
pub use types::*;

/// htsprobe version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
