// src/source/mod.rs

use anyhow::{bail, Context, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt};

use crate::duck::is_valid_identifier;
use crate::fetch::locator::{LocatorResolver, MAX_YEAR_WINDOW};
pub use crate::process::parser::ParseHints;

pub mod builtin;

/// One calendar month a fetch targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// `"YYYYMM"`, the token most publishers embed in file names.
    pub fn year_month(&self) -> String {
        format!("{:04}{:02}", self.year, self.month)
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Every month from `start` to `end`, both included. Empty when `end < start`.
    pub fn range_inclusive(start: Period, end: Period) -> Vec<Period> {
        let mut out = Vec::new();
        let mut cur = start;
        while cur <= end {
            out.push(cur);
            cur = cur.next();
        }
        out
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// What the endpoint serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    #[default]
    Csv,
    ArchiveOfCsv,
}

/// How to search for alternative locators when the primary one is missing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FallbackStrategy {
    #[default]
    None,
    /// Try neighbouring publication years (±window) and the current year.
    YearSearch { window: u32 },
    /// Try each fixed file version suffix in order.
    VersionSuffixSearch { suffixes: Vec<String> },
}

fn default_encoding() -> String {
    "shift_jis".to_string()
}

/// Static description of one publisher. Never mutated once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub id: String,
    /// Target relation in the store.
    pub table: String,
    /// Tag stored with every record; defaults to `id`.
    #[serde(default)]
    pub source_tag: Option<String>,
    /// Append the tag to every master key. Required when the table is shared,
    /// and fixed per source so keys never change shape between runs.
    #[serde(default)]
    pub tag_in_key: bool,
    pub locator_template: String,
    #[serde(default)]
    pub content_kind: ContentKind,
    #[serde(default)]
    pub fallback: FallbackStrategy,
    /// Primary declared encoding label (WHATWG label, e.g. `shift_jis`, `utf-8`).
    #[serde(default = "default_encoding")]
    pub encoding: String,
    #[serde(default)]
    pub parse: ParseHints,
}

impl SourceDescriptor {
    pub fn tag(&self) -> &str {
        self.source_tag.as_deref().unwrap_or(&self.id)
    }

    /// Startup validation. Anything rejected here is a configuration bug.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            bail!("source id must not be empty");
        }
        if !is_valid_identifier(&self.table) {
            bail!("source {}: invalid table name {:?}", self.id, self.table);
        }
        if encoding_rs::Encoding::for_label(self.encoding.as_bytes()).is_none() {
            bail!("source {}: unknown encoding {:?}", self.id, self.encoding);
        }
        if let FallbackStrategy::YearSearch { window } = self.fallback {
            if window > MAX_YEAR_WINDOW {
                bail!(
                    "source {}: year search window {} exceeds {}",
                    self.id,
                    window,
                    MAX_YEAR_WINDOW
                );
            }
        }
        if self.parse.header_rows > 2 {
            bail!(
                "source {}: header_rows must be 0, 1 or 2 (got {})",
                self.id,
                self.parse.header_rows
            );
        }
        // dry-run the resolver so template mistakes fail at startup
        let probe = Period { year: 2000, month: 1 };
        LocatorResolver::new(2000)
            .resolve(self, probe)
            .map_err(anyhow::Error::new)
            .with_context(|| format!("source {}: bad locator template", self.id))?;
        Ok(())
    }
}

/// The set of known sources, built-in plus configured.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<SourceDescriptor>,
}

impl SourceRegistry {
    pub fn new(sources: Vec<SourceDescriptor>) -> Result<Self> {
        let mut seen = HashSet::new();
        for s in &sources {
            s.validate()?;
            if !seen.insert(s.id.as_str()) {
                bail!("duplicate source id {:?}", s.id);
            }
        }
        let reg = Self { sources };
        if let Some(s) = reg.iter().find(|s| !s.tag_in_key && reg.shares_table(&s.id)) {
            bail!(
                "source {}: table {} is shared with other sources; set tag_in_key: true",
                s.id,
                s.table
            );
        }
        Ok(reg)
    }

    /// Add or replace descriptors by id; replaced entries keep their position.
    pub fn with_overrides(mut self, overrides: Vec<SourceDescriptor>) -> Result<Self> {
        for o in overrides {
            match self.sources.iter_mut().find(|s| s.id == o.id) {
                Some(existing) => *existing = o,
                None => self.sources.push(o),
            }
        }
        Self::new(self.sources)
    }

    pub fn get(&self, id: &str) -> Option<&SourceDescriptor> {
        self.sources.iter().find(|s| s.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceDescriptor> {
        self.sources.iter()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// True when more than one source writes into the same physical table.
    pub fn shares_table(&self, id: &str) -> bool {
        let Some(src) = self.get(id) else {
            return false;
        };
        self.sources.iter().filter(|s| s.table == src.table).count() > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: &str, table: &str) -> SourceDescriptor {
        SourceDescriptor {
            id: id.into(),
            table: table.into(),
            source_tag: None,
            tag_in_key: true,
            locator_template: "https://example.com/{yearMonth}.csv".into(),
            content_kind: ContentKind::Csv,
            fallback: FallbackStrategy::None,
            encoding: "shift_jis".into(),
            parse: ParseHints::default(),
        }
    }

    #[test]
    fn period_range_crosses_year_boundary() {
        let start = Period::new(2023, 11).unwrap();
        let end = Period::new(2024, 2).unwrap();
        let months: Vec<String> = Period::range_inclusive(start, end)
            .iter()
            .map(|p| p.year_month())
            .collect();
        assert_eq!(months, vec!["202311", "202312", "202401", "202402"]);
        assert!(Period::range_inclusive(end, start).is_empty());
        assert!(Period::new(2024, 13).is_none());
    }

    #[test]
    fn descriptor_deserializes_with_defaults() {
        let yaml = r#"
id: chubu
table: tso_area_jukyu
locator_template: "https://example.com/eria_jukyu_{year}.zip"
content_kind: archive_of_csv
fallback:
  kind: year_search
  window: 1
parse:
  header_rows: 1
  skip_leading_rows: 1
"#;
        let d: SourceDescriptor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(d.content_kind, ContentKind::ArchiveOfCsv);
        assert_eq!(d.fallback, FallbackStrategy::YearSearch { window: 1 });
        assert_eq!(d.encoding, "shift_jis");
        assert_eq!(d.tag(), "chubu");
        assert_eq!(d.parse.skip_leading_rows, 1);
        d.validate().unwrap();
    }

    #[test]
    fn validation_rejects_bad_config() {
        let mut d = descriptor("a", "bad-table");
        assert!(d.validate().is_err());

        d.table = "ok_table".into();
        d.encoding = "no-such-encoding".into();
        assert!(d.validate().is_err());

        d.encoding = "utf-8".into();
        d.locator_template = "https://example.com/{nonsense}.csv".into();
        assert!(d.validate().is_err());
    }

    #[test]
    fn registry_detects_shared_tables_and_duplicates() {
        let reg = SourceRegistry::new(vec![
            descriptor("tepco", "tso"),
            descriptor("kansai", "tso"),
            descriptor("jepx", "spot"),
        ])
        .unwrap();
        assert!(reg.shares_table("tepco"));
        assert!(!reg.shares_table("jepx"));
        assert!(!reg.shares_table("missing"));

        assert!(SourceRegistry::new(vec![descriptor("x", "t"), descriptor("x", "t")]).is_err());
    }

    #[test]
    fn shared_tables_require_tagged_keys() {
        let mut spot = descriptor("jepx", "spot");
        spot.tag_in_key = false;
        assert!(SourceRegistry::new(vec![spot.clone()]).is_ok());

        let err = SourceRegistry::new(vec![spot, descriptor("other", "spot")]).unwrap_err();
        assert!(err.to_string().contains("tag_in_key"), "{err}");
    }

    #[test]
    fn oversized_year_window_is_rejected() {
        let mut d = descriptor("y", "t");
        d.locator_template = "https://example.com/{year}.csv".into();
        d.fallback = FallbackStrategy::YearSearch { window: MAX_YEAR_WINDOW };
        d.validate().unwrap();
        d.fallback = FallbackStrategy::YearSearch { window: 1_000_000 };
        assert!(d.validate().is_err());
    }

    #[test]
    fn overrides_replace_in_place() {
        let reg = SourceRegistry::new(vec![descriptor("a", "t1"), descriptor("b", "t2")]).unwrap();
        let mut replacement = descriptor("a", "t3");
        replacement.source_tag = Some("alpha".into());
        let reg = reg
            .with_overrides(vec![replacement, descriptor("c", "t4")])
            .unwrap();
        let ids: Vec<&str> = reg.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(reg.get("a").unwrap().table, "t3");
        assert_eq!(reg.get("a").unwrap().tag(), "alpha");
    }
}
