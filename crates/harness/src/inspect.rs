//! Single-segment inspection

use htsprobe_common::preview::{
    hexdump, is_text_content_type, text_head, HEXDUMP_BYTES, SEGMENT_TEXT_CHARS,
};
use htsprobe_common::Segment;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;
use crate::fetch::SegmentFetcher;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SegmentPreview {
    Text { text: String, truncated: bool },
    Hex { dump: String, shown_bytes: usize },
}

/// What one segment URL returned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentInspection {
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub length: usize,
    pub preview: SegmentPreview,
}

/// Fetch a segment on its own and render a preview of its body
///
/// Text is shown when the content type advertises it and the body is
/// valid UTF-8; anything else gets a hex dump of its first bytes.
pub async fn inspect_segment(
    fetcher: &SegmentFetcher,
    segment: &Segment,
) -> Result<SegmentInspection, FetchError> {
    let body = fetcher.fetch(segment).await?;

    let as_text = body
        .content_type
        .as_deref()
        .is_some_and(is_text_content_type)
        .then(|| text_head(&body.bytes, SEGMENT_TEXT_CHARS))
        .flatten();

    let preview = match as_text {
        Some((text, truncated)) => SegmentPreview::Text { text, truncated },
        None => SegmentPreview::Hex {
            dump: hexdump(&body.bytes, HEXDUMP_BYTES),
            shown_bytes: body.bytes.len().min(HEXDUMP_BYTES),
        },
    };

    Ok(SegmentInspection {
        url: segment.url.clone(),
        status: body.status,
        content_type: body.content_type,
        length: body.bytes.len(),
        preview,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::test_support::FakeTransport;
    use htsprobe_common::DataClass;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_binary_segment_gets_hexdump() {
        let body = vec![0x1fu8; 1000];
        let fetcher =
            SegmentFetcher::new(Arc::new(FakeTransport::default().with("http://h/d", &body)));
        let report = inspect_segment(&fetcher, &Segment::new("http://h/d", DataClass::Body))
            .await
            .unwrap();

        assert_eq!(report.length, 1000);
        assert_eq!(report.status, 200);
        match report.preview {
            SegmentPreview::Hex { dump, shown_bytes } => {
                assert_eq!(shown_bytes, HEXDUMP_BYTES);
                assert_eq!(dump.lines().count(), HEXDUMP_BYTES / 16);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_text_segment_gets_text() {
        let fetcher = SegmentFetcher::new(Arc::new(FakeTransport::default()));
        let segment = Segment::new("data:text/vcf,%23CHROM%09POS", DataClass::Header);
        let report = inspect_segment(&fetcher, &segment).await.unwrap();

        assert_eq!(
            report.preview,
            SegmentPreview::Text {
                text: "#CHROM\tPOS".to_string(),
                truncated: false
            }
        );
    }

    #[tokio::test]
    async fn test_failed_fetch_is_reported() {
        let fetcher = SegmentFetcher::new(Arc::new(
            FakeTransport::default().failing("http://h/missing", 404),
        ));
        let err = inspect_segment(&fetcher, &Segment::new("http://h/missing", DataClass::Body))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404 }));
    }
}
