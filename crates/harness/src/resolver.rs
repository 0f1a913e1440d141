//! Ticket resolution: fetch every segment in order and concatenate

use bytes::BytesMut;
use htsprobe_common::{ResolvedPayload, Ticket};
use tracing::{debug, info, warn};

use crate::error::ResolveError;
use crate::fetch::SegmentFetcher;

/// Turns a ticket into one contiguous payload
///
/// Segments are fetched one at a time in list order; the first failure
/// aborts the resolution and discards everything fetched so far.
#[derive(Clone)]
pub struct TicketResolver {
    fetcher: SegmentFetcher,
}

impl TicketResolver {
    pub fn new(fetcher: SegmentFetcher) -> Self {
        Self { fetcher }
    }

    pub async fn resolve(&self, ticket: &Ticket) -> Result<ResolvedPayload, ResolveError> {
        if ticket.segments.is_empty() {
            return Err(ResolveError::EmptyTicket);
        }

        let mut buffer = BytesMut::new();
        let mut segment_sizes = Vec::with_capacity(ticket.segments.len());

        for (index, segment) in ticket.segments.iter().enumerate() {
            let body = self.fetcher.fetch(segment).await.map_err(|cause| {
                warn!(index, url = %segment.url, error = %cause, "segment fetch failed");
                ResolveError::SegmentFetch {
                    index,
                    url: segment.url.clone(),
                    cause,
                }
            })?;
            debug!(index, class = %segment.class, bytes = body.bytes.len(), "segment fetched");
            segment_sizes.push(body.bytes.len());
            buffer.extend_from_slice(&body.bytes);
        }

        info!(
            format = %ticket.format,
            segments = segment_sizes.len(),
            bytes = buffer.len(),
            "resolved ticket"
        );
        Ok(ResolvedPayload {
            format: ticket.format.clone(),
            bytes: buffer.freeze(),
            segment_sizes,
        })
    }
}
