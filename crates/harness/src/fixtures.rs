//! Data directory scanning

use std::path::Path;

use htsprobe_common::{Endpoint, TestFixture};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Recognised data file suffixes; index files and everything else are skipped
const KINDS: &[(&str, &str, Endpoint)] = &[
    (".bam", "BAM", Endpoint::Reads),
    (".cram", "CRAM", Endpoint::Reads),
    (".vcf.gz", "VCF", Endpoint::Variants),
    (".bcf", "BCF", Endpoint::Variants),
    (".sam", "SAM", Endpoint::Reads),
];

/// List the queryable files directly inside `dir`, sorted by file name
///
/// A missing directory yields an empty list.
pub fn scan_fixtures(dir: &Path) -> Vec<TestFixture> {
    if !dir.is_dir() {
        debug!(dir = %dir.display(), "fixture directory does not exist");
        return Vec::new();
    }

    let mut fixtures = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable fixture entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_string();
        let Some((suffix, display_type, endpoint)) =
            KINDS.iter().find(|(suffix, _, _)| name.ends_with(suffix))
        else {
            continue;
        };

        let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or_default();
        let id = name[..name.len() - suffix.len()].to_string();
        fixtures.push(TestFixture {
            key: format!("{}.{}", id, display_type.to_ascii_lowercase()),
            id,
            name,
            display_type: display_type.to_string(),
            endpoint: *endpoint,
            size_bytes,
            path: entry.into_path(),
        });
    }
    fixtures
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use test_case::test_case;

    #[test]
    fn test_scan_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "sample.cram",
            "sample.bam",
            "sample.bam.bai",
            "calls.vcf.gz",
            "calls.vcf.gz.tbi",
            "calls.bcf",
            "notes.txt",
        ] {
            fs::write(dir.path().join(name), b"0123456789").unwrap();
        }
        fs::create_dir(dir.path().join("nested.bam")).unwrap();

        let fixtures = scan_fixtures(dir.path());
        let keys: Vec<&str> = fixtures.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["calls.bcf", "calls.vcf", "sample.bam", "sample.cram"]);

        let bam = &fixtures[2];
        assert_eq!(bam.id, "sample");
        assert_eq!(bam.name, "sample.bam");
        assert_eq!(bam.endpoint, Endpoint::Reads);
        assert_eq!(bam.size_bytes, 10);
        assert_eq!(bam.display_size(), "10 B");
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_fixtures(&dir.path().join("absent")).is_empty());
    }

    #[test_case("reads.sam", "reads", "SAM", Endpoint::Reads ; "sam")]
    #[test_case("a.b.cram", "a.b", "CRAM", Endpoint::Reads ; "dotted id")]
    #[test_case("x.vcf.gz", "x", "VCF", Endpoint::Variants ; "bgzipped vcf")]
    fn test_classification(name: &str, id: &str, display_type: &str, endpoint: Endpoint) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(name), b"").unwrap();
        let fixtures = scan_fixtures(dir.path());
        assert_eq!(fixtures.len(), 1);
        assert_eq!(fixtures[0].id, id);
        assert_eq!(fixtures[0].display_type, display_type);
        assert_eq!(fixtures[0].endpoint, endpoint);
    }
}
