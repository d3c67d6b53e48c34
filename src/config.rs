// src/config.rs
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::fetch::{locator::MAX_YEAR_WINDOW, DEFAULT_USER_AGENT};
use crate::source::{builtin, SourceDescriptor, SourceRegistry};

/// Environment variable that overrides `store.path`.
pub const DB_PATH_ENV: &str = "DB_PATH";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/gridscraper.duckdb"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolitenessConfig {
    pub min_secs: f64,
    pub max_secs: f64,
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            min_secs: 1.0,
            max_secs: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: f64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30.0,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Window for the built-in year-search sources.
    pub year_window: u32,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self { year_window: 1 }
    }
}

/// Everything read at startup. Immutable afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub politeness: PolitenessConfig,
    pub http: HttpConfig,
    pub fallback: FallbackConfig,
    /// Extra sources, or replacements for built-ins with the same id.
    pub sources: Vec<SourceDescriptor>,
}

impl AppConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).context("parsing YAML config")
    }

    /// Read the config file (defaults when `None`), then apply `DB_PATH`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p)
                    .with_context(|| format!("reading config {}", p.display()))?;
                Self::from_yaml_str(&text)
                    .with_context(|| format!("in config {}", p.display()))?
            }
            None => Self::default(),
        };
        cfg.apply_env(|k| std::env::var(k).ok());
        cfg.validate()?;
        if let Some(p) = path {
            info!(config = %p.display(), sources = cfg.sources.len(), "loaded config");
        }
        Ok(cfg)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(p) = lookup(DB_PATH_ENV).filter(|s| !s.trim().is_empty()) {
            self.store.path = PathBuf::from(p);
        }
    }

    /// Command-line overrides win over file and environment.
    pub fn apply_overrides(&mut self, db_path: Option<PathBuf>) {
        if let Some(p) = db_path {
            self.store.path = p;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let p = &self.politeness;
        if !(p.min_secs.is_finite() && p.max_secs.is_finite()) || p.min_secs < 0.0 {
            bail!("politeness bounds must be finite and non-negative");
        }
        if p.min_secs > p.max_secs {
            bail!(
                "politeness.min_secs ({}) exceeds politeness.max_secs ({})",
                p.min_secs,
                p.max_secs
            );
        }
        if !(self.http.timeout_secs.is_finite() && self.http.timeout_secs > 0.0) {
            bail!("http.timeout_secs must be positive");
        }
        if self.http.user_agent.trim().is_empty() {
            bail!("http.user_agent must not be empty");
        }
        if self.fallback.year_window > MAX_YEAR_WINDOW {
            bail!(
                "fallback.year_window ({}) exceeds {}",
                self.fallback.year_window,
                MAX_YEAR_WINDOW
            );
        }
        if self.store.path.as_os_str().is_empty() {
            bail!("store.path must not be empty");
        }
        Ok(())
    }

    /// Built-in sources merged with the configured ones, fully validated.
    pub fn registry(&self) -> Result<SourceRegistry> {
        SourceRegistry::new(builtin::descriptors(self.fallback.year_window))?
            .with_overrides(self.sources.clone())
            .context("invalid source configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FallbackStrategy;
    use std::io::Write;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = AppConfig::from_yaml_str("").unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.politeness.min_secs, 1.0);
        assert_eq!(cfg.politeness.max_secs, 5.0);
        assert_eq!(cfg.http.timeout_secs, 30.0);
        cfg.validate().unwrap();
    }

    #[test]
    fn file_env_and_cli_precedence() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "store:\n  path: from_file.duckdb\nfallback:\n  year_window: 2").unwrap();
        let mut cfg = AppConfig::from_yaml_str(&std::fs::read_to_string(f.path()).unwrap()).unwrap();
        assert_eq!(cfg.store.path, PathBuf::from("from_file.duckdb"));

        cfg.apply_env(|k| (k == DB_PATH_ENV).then(|| "from_env.duckdb".to_string()));
        assert_eq!(cfg.store.path, PathBuf::from("from_env.duckdb"));

        cfg.apply_overrides(Some(PathBuf::from("from_cli.duckdb")));
        assert_eq!(cfg.store.path, PathBuf::from("from_cli.duckdb"));

        let reg = cfg.registry().unwrap();
        assert_eq!(
            reg.get("chubu").unwrap().fallback,
            FallbackStrategy::YearSearch { window: 2 }
        );
    }

    #[test]
    fn configured_sources_extend_and_override() {
        let yaml = r#"
sources:
  - id: tepco
    table: tso_area_jukyu
    tag_in_key: true
    locator_template: "https://mirror.example/tepco_{yearMonth}.csv"
  - id: hokkaido_versions
    table: tso_area_jukyu
    tag_in_key: true
    locator_template: "https://example.com/eria_jukyu_{yearMonth}_{version}.csv"
    fallback:
      kind: version_suffix_search
      suffixes: ["01", "02", "03"]
"#;
        let cfg = AppConfig::from_yaml_str(yaml).unwrap();
        let reg = cfg.registry().unwrap();
        assert!(reg
            .get("tepco")
            .unwrap()
            .locator_template
            .starts_with("https://mirror.example/"));
        assert!(reg.get("hokkaido_versions").is_some());
        assert!(reg.shares_table("hokkaido_versions"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let cfg = AppConfig::from_yaml_str("politeness:\n  min_secs: 6\n  max_secs: 2\n").unwrap();
        assert!(cfg.validate().is_err());

        assert!(AppConfig::from_yaml_str("unknown_key: 1\n").is_err());

        let cfg = AppConfig::from_yaml_str("fallback:\n  year_window: 5000000\n").unwrap();
        assert!(cfg.validate().is_err());

        // joining the shared TSO table without tagged keys
        let untagged = r#"
sources:
  - id: extra_area
    table: tso_area_jukyu
    locator_template: "https://example.com/{yearMonth}.csv"
"#;
        let cfg = AppConfig::from_yaml_str(untagged).unwrap();
        assert!(cfg.registry().is_err());

        let bad_source = r#"
sources:
  - id: x
    table: "bad name"
    locator_template: "https://example.com/{yearMonth}.csv"
"#;
        let cfg = AppConfig::from_yaml_str(bad_source).unwrap();
        assert!(cfg.registry().is_err());
    }

    #[test]
    fn load_reads_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "http:\n  timeout_secs: 5\n  user_agent: test-agent").unwrap();
        let cfg = AppConfig::load(Some(f.path())).unwrap();
        assert_eq!(cfg.http.timeout_secs, 5.0);
        assert_eq!(cfg.http.user_agent, "test-agent");
        assert!(AppConfig::load(Some(Path::new("/definitely/missing.yaml"))).is_err());
    }
}
