//! Human-readable previews of individual segment bodies

use std::fmt::Write as _;

/// Bytes shown by [`hexdump`] when inspecting a segment
pub const HEXDUMP_BYTES: usize = 512;

/// Characters shown when a segment body is text
pub const SEGMENT_TEXT_CHARS: usize = 4000;

const ROW: usize = 16;

/// Offset, hex and ASCII columns, 16 bytes per row
///
/// ```text
/// 0000  1f 8b 08 04 00 00 00 00 00 ff 06 00 42 43 02 00  ............BC..
/// ```
pub fn hexdump(bytes: &[u8], limit: usize) -> String {
    let mut out = String::new();
    for (row, chunk) in bytes[..bytes.len().min(limit)].chunks(ROW).enumerate() {
        let hex = chunk
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(" ");
        let ascii: String = chunk
            .iter()
            .map(|&b| if (0x20..0x7f).contains(&b) { b as char } else { '.' })
            .collect();
        let _ = writeln!(out, "{:04x}  {:<48}  {}", row * ROW, hex, ascii);
    }
    out
}

/// Whether a segment's Content-Type advertises something readable as text
pub fn is_text_content_type(content_type: &str) -> bool {
    let lowered = content_type.to_ascii_lowercase();
    ["json", "text", "vcf", "fasta", "fastq"]
        .iter()
        .any(|kind| lowered.contains(kind))
}

/// Text preview of a segment body, bounded to `max_chars`
///
/// Returns `None` when the body is not valid UTF-8.
pub fn text_head(bytes: &[u8], max_chars: usize) -> Option<(String, bool)> {
    let text = std::str::from_utf8(bytes).ok()?;
    Some(match text.char_indices().nth(max_chars) {
        Some((idx, _)) => (text[..idx].to_string(), true),
        None => (text.to_string(), false),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_hexdump_layout() {
        let dump = hexdump(b"BAM\x01hello, world!!!\x00", HEXDUMP_BYTES);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("0000  42 41 4d 01 68"));
        assert!(lines[0].ends_with("BAM.hello, world"));
        assert!(lines[1].starts_with("0010  21 21 21 00"));
        // hex column is padded so ASCII columns align
        assert_eq!(lines[1].find("!!!"), lines[0].find("BAM"));
    }

    #[test]
    fn test_hexdump_respects_limit() {
        let bytes = vec![0u8; 4096];
        assert_eq!(hexdump(&bytes, HEXDUMP_BYTES).lines().count(), 32);
        assert!(hexdump(&[], HEXDUMP_BYTES).is_empty());
    }

    #[test_case("text/plain", true ; "plain")]
    #[test_case("text/vcf; charset=utf-8", true ; "with parameters")]
    #[test_case("application/x-fastq", true ; "fastq")]
    #[test_case("Application/JSON", true ; "case insensitive")]
    #[test_case("application/octet-stream", false ; "octet stream")]
    #[test_case("", false ; "empty")]
    fn test_text_content_types(content_type: &str, expected: bool) {
        assert_eq!(is_text_content_type(content_type), expected);
    }

    #[test]
    fn test_text_head() {
        assert_eq!(text_head(b"abcdef", 3), Some(("abc".to_string(), true)));
        assert_eq!(text_head(b"abc", 3), Some(("abc".to_string(), false)));
        assert_eq!(text_head(&[0xff, 0x00], 3), None);
    }
}
