//! Text and raw previews

use std::borrow::Cow;

use crate::summary::{RawPreview, TextPreview, RAW_PREVIEW_BYTES, TEXT_PREVIEW_CHARS};

use super::bgzf;

/// Variant text preview; never fails
///
/// bgzipped VCF is inflated first. If inflation fails the raw bytes are
/// shown instead, so a corrupt stream still produces an observation.
pub(crate) fn variant_text(bytes: &[u8]) -> TextPreview {
    let inflated = if bgzf::is_gzip(bytes) {
        match bgzf::inflate(bytes) {
            Ok(data) => Some(data),
            Err(e) => {
                tracing::debug!(error = %e, "VCF payload looked compressed but did not inflate");
                None
            }
        }
    } else {
        None
    };
    let data = inflated.as_deref().unwrap_or(bytes);
    let (text, replaced_invalid) = lossy(data);
    let (text, truncated) = truncate_chars(&text, TEXT_PREVIEW_CHARS);

    TextPreview {
        text,
        truncated,
        total_bytes: data.len(),
        replaced_invalid,
        inflated: inflated.is_some(),
    }
}

/// Bounded preview for formats with no decoder
pub(crate) fn raw(format: &str, bytes: &[u8]) -> RawPreview {
    let head = &bytes[..bytes.len().min(RAW_PREVIEW_BYTES)];
    let (text, _) = lossy(head);
    RawPreview {
        format: format.to_string(),
        text,
        truncated: bytes.len() > RAW_PREVIEW_BYTES,
        total_bytes: bytes.len(),
    }
}

fn lossy(bytes: &[u8]) -> (String, bool) {
    match String::from_utf8_lossy(bytes) {
        Cow::Borrowed(s) => (s.to_string(), false),
        Cow::Owned(s) => (s, true),
    }
}

fn truncate_chars(text: &str, max: usize) -> (String, bool) {
    match text.char_indices().nth(max) {
        Some((idx, _)) => (text[..idx].to_string(), true),
        None => (text.to_string(), false),
    }
}
