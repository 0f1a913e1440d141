//! BGZF inflation
//!
//! BGZF is a series of gzip members, so a multi-member gzip decoder reads
//! the whole stream. Ticket segments are split on member boundaries, which
//! is why plain concatenation of segment bodies stays inflatable.

use flate2::read::MultiGzDecoder;
use std::io::Read;

use crate::error::ContainerError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// The 28-byte empty block that terminates a BGZF file
pub const EOF_BLOCK: [u8; 28] = [
    0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x06, 0x00, 0x42, 0x43, 0x02,
    0x00, 0x1b, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

/// Whether the stream ends with the BGZF end-of-file marker
pub fn has_eof_marker(bytes: &[u8]) -> bool {
    bytes.ends_with(&EOF_BLOCK)
}

/// Inflate every member of a BGZF (or plain gzip) stream
pub fn inflate(bytes: &[u8]) -> Result<Vec<u8>, ContainerError> {
    if !is_gzip(bytes) {
        return Err(ContainerError::BadMagic {
            expected: "BGZF/gzip member",
        });
    }
    let mut out = Vec::with_capacity(bytes.len() * 3);
    MultiGzDecoder::new(bytes).read_to_end(&mut out)?;
    Ok(out)
}
