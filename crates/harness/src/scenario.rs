//! Declarative YAML scenarios

use std::path::Path;

use htsprobe_common::{Endpoint, Format};
use serde::{Deserialize, Serialize};

use crate::client::QueryParams;
use crate::error::{HarnessError, HarnessResult};

/// One query plus what its result should look like
///
/// ```yaml
/// name: sample1-chr1
/// tags: [reads, smoke]
/// query:
///   endpoint: reads
///   id: sample1
///   reference_name: chr1
/// expect:
///   format: BAM
///   reference_names_include: [chr1]
///   min_records: 1
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Tags for filtering
    #[serde(default)]
    pub tags: Vec<String>,

    pub query: ScenarioQuery,

    #[serde(default)]
    pub expect: Expectations,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioQuery {
    pub endpoint: Endpoint,
    pub id: String,
    #[serde(flatten)]
    pub params: QueryParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expectations {
    /// Format the ticket must declare
    #[serde(default)]
    pub format: Option<Format>,

    #[serde(default)]
    pub min_segments: Option<usize>,

    /// Resolve and decode the payload (false stops after the ticket)
    #[serde(default = "default_decode")]
    pub decode: bool,

    #[serde(default)]
    pub reference_names_include: Vec<String>,

    #[serde(default)]
    pub samples_include: Vec<String>,

    /// Lower bound on decoded records (reads or variants)
    #[serde(default)]
    pub min_records: Option<u64>,
}

fn default_decode() -> bool {
    true
}

impl Default for Expectations {
    fn default() -> Self {
        Self {
            format: None,
            min_segments: None,
            decode: true,
            reference_names_include: Vec::new(),
            samples_include: Vec::new(),
            min_records: None,
        }
    }
}

impl Scenario {
    pub fn from_yaml(yaml: &str) -> HarnessResult<Self> {
        serde_yaml::from_str(yaml).map_err(HarnessError::from)
    }

    pub fn from_file(path: &Path) -> HarnessResult<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content)
            .map_err(|e| HarnessError::Scenario(format!("{}: {}", path.display(), e)))
    }

    /// Load every `.yaml`/`.yml` scenario under `dir`, ordered by path
    pub fn load_all(dir: &Path) -> HarnessResult<Vec<Self>> {
        if !dir.is_dir() {
            return Err(HarnessError::Scenario(format!(
                "scenario directory {} does not exist",
                dir.display()
            )));
        }

        let mut scenarios = Vec::new();
        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_type().is_file()
                    && e.path()
                        .extension()
                        .map(|ext| ext == "yaml" || ext == "yml")
                        .unwrap_or(false)
            })
        {
            scenarios.push(Self::from_file(entry.path())?);
        }
        Ok(scenarios)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use htsprobe_common::DataClass;

    #[test]
    fn test_parse_full_scenario() {
        let yaml = r#"
name: sample1-chr1
description: BAM slice over chr1
tags: [reads, smoke]
query:
  endpoint: reads
  id: sample1
  format: BAM
  class: header
  reference_name: chr1
  start: 0
  end: 100000
expect:
  format: BAM
  min_segments: 2
  reference_names_include: [chr1]
  min_records: 1
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        assert_eq!(scenario.query.endpoint, Endpoint::Reads);
        assert_eq!(scenario.query.params.format, Some(Format::Bam));
        assert_eq!(scenario.query.params.class, Some(DataClass::Header));
        assert_eq!(scenario.query.params.reference_name.as_deref(), Some("chr1"));
        assert_eq!(scenario.query.params.end, Some(100_000));
        assert_eq!(scenario.expect.min_segments, Some(2));
        assert!(scenario.expect.decode);
        assert!(scenario.has_tag("smoke"));
    }

    #[test]
    fn test_minimal_scenario_defaults() {
        let scenario = Scenario::from_yaml(
            "name: calls\nquery:\n  endpoint: variants\n  id: calls\n",
        )
        .unwrap();
        assert_eq!(scenario.query.params, QueryParams::default());
        assert!(scenario.expect.decode);
        assert!(scenario.expect.samples_include.is_empty());
    }

    #[test]
    fn test_unknown_endpoint_is_rejected() {
        assert!(Scenario::from_yaml("name: x\nquery:\n  endpoint: sequences\n  id: a\n").is_err());
    }

    #[test]
    fn test_load_all_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for (file, name) in [("b.yaml", "second"), ("a.yml", "first"), ("c.txt", "ignored")] {
            std::fs::write(
                dir.path().join(file),
                format!("name: {}\nquery:\n  endpoint: reads\n  id: s\n", name),
            )
            .unwrap();
        }
        let names: Vec<String> = Scenario::load_all(dir.path())
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["first", "second"]);
    }
}
