//! Core types for htsprobe

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Payload format declared by a ticket
///
/// Known htsget formats map to dedicated variants; anything else the
/// server sends is kept verbatim in `Unknown` so it can still be shown.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Format {
    Bam,
    Cram,
    Vcf,
    Bcf,
    Unknown(String),
}

impl Format {
    pub fn as_str(&self) -> &str {
        match self {
            Format::Bam => "BAM",
            Format::Cram => "CRAM",
            Format::Vcf => "VCF",
            Format::Bcf => "BCF",
            Format::Unknown(name) => name,
        }
    }

    pub fn is_alignment(&self) -> bool {
        matches!(self, Format::Bam | Format::Cram)
    }

    pub fn is_variant(&self) -> bool {
        matches!(self, Format::Vcf | Format::Bcf)
    }

    /// Endpoint that serves this format, if it is a known one
    pub fn endpoint(&self) -> Option<Endpoint> {
        match self {
            Format::Bam | Format::Cram => Some(Endpoint::Reads),
            Format::Vcf | Format::Bcf => Some(Endpoint::Variants),
            Format::Unknown(_) => None,
        }
    }
}

impl From<&str> for Format {
    fn from(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "BAM" => Format::Bam,
            "CRAM" => Format::Cram,
            "VCF" => Format::Vcf,
            "BCF" => Format::Bcf,
            _ => Format::Unknown(s.to_string()),
        }
    }
}

impl From<String> for Format {
    fn from(s: String) -> Self {
        Format::from(s.as_str())
    }
}

impl From<Format> for String {
    fn from(f: Format) -> Self {
        f.as_str().to_string()
    }
}

impl std::str::FromStr for Format {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Format::from(s))
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Segment class: container header only, or data body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataClass {
    Header,
    #[default]
    Body,
}

impl DataClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataClass::Header => "header",
            DataClass::Body => "body",
        }
    }
}

impl std::fmt::Display for DataClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol endpoint family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Reads,
    Variants,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Reads => "reads",
            Endpoint::Variants => "variants",
        }
    }
}

impl std::str::FromStr for Endpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reads" => Ok(Endpoint::Reads),
            "variants" => Ok(Endpoint::Variants),
            _ => Err(format!(
                "unknown endpoint: {} (expected 'reads' or 'variants')",
                s
            )),
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One URL of a ticket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub url: String,
    #[serde(default)]
    pub class: DataClass,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl Segment {
    pub fn new(url: impl Into<String>, class: DataClass) -> Self {
        Self {
            url: url.into(),
            class,
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Whether the payload is carried inline as a `data:` URI
    pub fn is_inline(&self) -> bool {
        self.url.starts_with("data:")
    }
}

/// Server answer describing where, and in what order, to fetch a payload
///
/// Segment order is authoritative: concatenating segment bodies in list
/// order reproduces the container byte stream. `class` is informational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub format: Format,
    #[serde(rename = "urls")]
    pub segments: Vec<Segment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
}

impl Ticket {
    pub fn new(format: Format, segments: Vec<Segment>) -> Self {
        Self {
            format,
            segments,
            md5: None,
        }
    }

    pub fn header_segments(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| s.class == DataClass::Header)
            .count()
    }
}

/// Concatenated bytes of every ticket segment, in ticket order
///
/// Produced by resolution and consumed by value by the decoder; nothing
/// keeps a copy afterwards.
#[derive(Debug, Clone)]
pub struct ResolvedPayload {
    pub format: Format,
    pub bytes: Bytes,
    pub segment_sizes: Vec<usize>,
}

impl ResolvedPayload {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// True when the buffer length equals the sum of the segment lengths
    pub fn is_consistent(&self) -> bool {
        self.segment_sizes.iter().sum::<usize>() == self.bytes.len()
    }

    /// Hex SHA-256 of the payload, for diagnostics
    pub fn sha256_hex(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        hex::encode(hasher.finalize())
    }
}

/// Supervised server lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerState::Stopped => write!(f, "stopped"),
            ServerState::Starting => write!(f, "starting"),
            ServerState::Running => write!(f, "running"),
            ServerState::Stopping => write!(f, "stopping"),
            ServerState::Failed => write!(f, "failed"),
        }
    }
}

/// A data file the server can be queried for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFixture {
    pub id: String,
    pub name: String,
    pub display_type: String,
    pub endpoint: Endpoint,
    pub size_bytes: u64,
    pub path: PathBuf,
    /// Unique per file: ids repeat across formats (sample.bam, sample.cram)
    pub key: String,
}

impl TestFixture {
    /// Format to request explicitly; BAM and VCF are server defaults
    pub fn query_format(&self) -> Option<Format> {
        match self.display_type.as_str() {
            "CRAM" => Some(Format::Cram),
            "BCF" => Some(Format::Bcf),
            _ => None,
        }
    }

    pub fn display_size(&self) -> String {
        if self.size_bytes < 1024 {
            format!("{} B", self.size_bytes)
        } else {
            format!("{} KB", self.size_bytes / 1024)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing_is_case_insensitive() {
        assert_eq!(Format::from("bam"), Format::Bam);
        assert_eq!(Format::from("CRAM"), Format::Cram);
        assert_eq!(Format::from("Vcf"), Format::Vcf);
        assert_eq!(Format::from("BCF"), Format::Bcf);
        assert_eq!(Format::from("FASTA"), Format::Unknown("FASTA".to_string()));
    }

    #[test]
    fn test_ticket_deserializes_wire_shape() {
        let json = r#"{
            "format": "BAM",
            "urls": [
                {"url": "http://a/h", "class": "header"},
                {"url": "http://b/1", "headers": {"Range": "bytes=0-9"}},
                {"url": "http://b/2", "class": "body"}
            ]
        }"#;
        let ticket: Ticket = serde_json::from_str(json).unwrap();
        assert_eq!(ticket.format, Format::Bam);
        assert_eq!(ticket.segments.len(), 3);
        assert_eq!(ticket.segments[0].class, DataClass::Header);
        assert_eq!(ticket.segments[1].class, DataClass::Body);
        assert_eq!(ticket.segments[1].headers["Range"], "bytes=0-9");
        assert_eq!(ticket.header_segments(), 1);
    }

    #[test]
    fn test_ticket_rejects_unknown_class() {
        let json = r#"{"format": "BAM", "urls": [{"url": "x", "class": "footer"}]}"#;
        assert!(serde_json::from_str::<Ticket>(json).is_err());
    }

    #[test]
    fn test_unknown_format_round_trips_name() {
        let json = r#"{"format": "FASTQ", "urls": []}"#;
        let ticket: Ticket = serde_json::from_str(json).unwrap();
        assert_eq!(ticket.format.as_str(), "FASTQ");
        assert!(ticket.format.endpoint().is_none());
    }

    #[test]
    fn test_payload_consistency() {
        let payload = ResolvedPayload {
            format: Format::Bam,
            bytes: Bytes::from_static(b"abcdef"),
            segment_sizes: vec![2, 4],
        };
        assert!(payload.is_consistent());
        assert_eq!(payload.len(), 6);
        assert_eq!(payload.sha256_hex().len(), 64);
    }

    #[test]
    fn test_fixture_display_size() {
        let mut fixture = TestFixture {
            id: "sample".to_string(),
            name: "sample.bam".to_string(),
            display_type: "BAM".to_string(),
            endpoint: Endpoint::Reads,
            size_bytes: 512,
            path: PathBuf::from("sample.bam"),
            key: "sample.bam".to_string(),
        };
        assert_eq!(fixture.display_size(), "512 B");
        fixture.size_bytes = 4096;
        assert_eq!(fixture.display_size(), "4 KB");
        assert_eq!(fixture.query_format(), None);
    }
}
