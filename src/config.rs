//! TOML configuration parsing.
//!
//! Loading is two-stage: [`load_or_default`] reads the configured file and,
//! only when that file does not exist, falls back to [`Config::fallback`].
//! Every other failure (unreadable file, bad TOML, failed validation) is an
//! error. The [`ConfigOrigin`] that comes back says which path was taken.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use leadwatch_core::LeadError;

use crate::schedule::Schedule;
use crate::source::{SortMode, TimeWindow};

pub const DEFAULT_KEYWORDS: &[&str] = &["interview preparation", "mock interview", "coding interview"];
pub const DEFAULT_PARTITIONS: &[&str] = &["cscareerquestions", "jobs", "careerguidance", "recruitinghell"];
/// Every 30 minutes.
pub const DEFAULT_INTERVAL: &str = "*/30 * * * *";
pub const DEFAULT_LIMIT: u32 = 25;
pub const DEFAULT_MIN_SCORE: u8 = 60;

/// Placeholder key shipped in sample env files; treated as "not configured".
const PLACEHOLDER_API_KEY: &str = "your_gemini_api_key_here";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub monitoring: MonitoringSection,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3001".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_source_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_source_url(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_source_url() -> String {
    "https://www.reddit.com".to_string()
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScoringConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_scoring_url")]
    pub base_url: String,
    /// Minimum spacing between upstream calls (30 calls/minute ceiling).
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(default = "default_max_body_chars")]
    pub max_body_chars: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// What is being pitched; interpolated into the prompt.
    #[serde(default = "default_product")]
    pub product: String,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            base_url: default_scoring_url(),
            min_interval_ms: default_min_interval_ms(),
            max_body_chars: default_max_body_chars(),
            timeout_secs: default_timeout_secs(),
            product: default_product(),
        }
    }
}

fn default_provider() -> String {
    "gemini".to_string()
}
fn default_model() -> String {
    "gemini-2.0-flash-lite".to_string()
}
fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}
fn default_scoring_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}
fn default_min_interval_ms() -> u64 {
    2100
}
fn default_max_body_chars() -> usize {
    leadwatch_core::scoring::MAX_BODY_CHARS
}
fn default_product() -> String {
    leadwatch_core::scoring::DEFAULT_PRODUCT.to_string()
}

impl ScoringConfig {
    /// The API key, if the provider is on and a real key is in the environment.
    pub fn api_key(&self) -> Option<String> {
        if self.provider == "disabled" {
            return None;
        }
        std::env::var(&self.api_key_env)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty() && k != PLACEHOLDER_API_KEY)
    }
}

/// The `[monitoring]` table: the runtime [`MonitoringConfig`] plus scheduler knobs.
#[derive(Debug, Deserialize, Clone)]
pub struct MonitoringSection {
    #[serde(flatten)]
    pub config: MonitoringConfig,
    /// Fire cycles on the cron schedule (manual triggers work either way).
    #[serde(default = "default_true")]
    pub schedule_enabled: bool,
    #[serde(default = "default_true")]
    pub run_on_start: bool,
    #[serde(default = "default_keyword_delay_ms")]
    pub keyword_delay_ms: u64,
    #[serde(default = "default_partition_delay_ms")]
    pub partition_delay_ms: u64,
    /// Result order for cycle searches.
    #[serde(default = "default_cycle_sort")]
    pub sort: SortMode,
    /// Lookback window for cycle searches.
    #[serde(default = "default_cycle_time")]
    pub time: TimeWindow,
}

impl Default for MonitoringSection {
    fn default() -> Self {
        Self {
            config: MonitoringConfig::default(),
            schedule_enabled: true,
            run_on_start: true,
            keyword_delay_ms: default_keyword_delay_ms(),
            partition_delay_ms: default_partition_delay_ms(),
            sort: default_cycle_sort(),
            time: default_cycle_time(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_keyword_delay_ms() -> u64 {
    1000
}
fn default_partition_delay_ms() -> u64 {
    2000
}
fn default_cycle_sort() -> SortMode {
    SortMode::New
}
fn default_cycle_time() -> TimeWindow {
    TimeWindow::Day
}

/// What the scheduler searches for, how often, and what counts as a lead.
///
/// Held in memory by the scheduler; runtime updates are not persisted.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringConfig {
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
    #[serde(default = "default_partitions", alias = "subreddits")]
    pub partitions: Vec<String>,
    /// Five-field cron expression.
    #[serde(default = "default_interval")]
    pub interval: String,
    /// Items fetched per partition x keyword search.
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Scores at or above this fire a qualifying-lead event.
    #[serde(default = "default_min_score", alias = "min_score")]
    pub min_score: u8,
}

fn default_keywords() -> Vec<String> {
    DEFAULT_KEYWORDS.iter().map(|s| s.to_string()).collect()
}
fn default_partitions() -> Vec<String> {
    DEFAULT_PARTITIONS.iter().map(|s| s.to_string()).collect()
}
fn default_interval() -> String {
    DEFAULT_INTERVAL.to_string()
}
fn default_limit() -> u32 {
    DEFAULT_LIMIT
}
fn default_min_score() -> u8 {
    DEFAULT_MIN_SCORE
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
            partitions: default_partitions(),
            interval: default_interval(),
            limit: default_limit(),
            min_score: default_min_score(),
        }
    }
}

impl MonitoringConfig {
    pub fn validate(&self) -> leadwatch_core::Result<()> {
        validate_terms("keywords", &self.keywords)?;
        validate_terms("partitions", &self.partitions)?;
        if !(1..=100).contains(&self.limit) {
            return Err(LeadError::invalid("limit must be between 1 and 100"));
        }
        if self.min_score > 100 {
            return Err(LeadError::invalid("minScore must be between 0 and 100"));
        }
        Schedule::parse(&self.interval)?;
        Ok(())
    }

    /// Merge a partial update, returning the new config without touching `self`.
    pub fn merged(&self, patch: &ConfigPatch) -> leadwatch_core::Result<MonitoringConfig> {
        let mut next = self.clone();
        if let Some(ref keywords) = patch.keywords {
            next.keywords = keywords.clone();
        }
        if let Some(ref partitions) = patch.partitions {
            next.partitions = partitions.clone();
        }
        if let Some(ref interval) = patch.interval {
            next.interval = interval.clone();
        }
        if let Some(limit) = patch.limit {
            next.limit = limit;
        }
        if let Some(min_score) = patch.min_score {
            next.min_score = min_score;
        }
        next.validate()?;
        Ok(next)
    }
}

fn validate_terms(field: &str, terms: &[String]) -> leadwatch_core::Result<()> {
    if terms.is_empty() {
        return Err(LeadError::invalid(format!("{} must not be empty", field)));
    }
    if terms.iter().any(|t| t.trim().is_empty()) {
        return Err(LeadError::invalid(format!(
            "{} must not contain blank entries",
            field
        )));
    }
    Ok(())
}

/// Partial update accepted by the config-update operation.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    pub keywords: Option<Vec<String>>,
    #[serde(alias = "subreddits")]
    pub partitions: Option<Vec<String>>,
    pub interval: Option<String>,
    pub limit: Option<u32>,
    pub min_score: Option<u8>,
}

/// Where the active configuration came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigOrigin {
    File(PathBuf),
    /// The file was missing; built-in defaults are in effect.
    Fallback(PathBuf),
}

impl Config {
    /// Built-in configuration used when no config file exists.
    pub fn fallback() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/leads.sqlite"),
            },
            server: ServerConfig::default(),
            source: SourceConfig::default(),
            scoring: ScoringConfig::default(),
            monitoring: MonitoringSection::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.monitoring
            .config
            .validate()
            .context("invalid [monitoring] section")?;

        match self.scoring.provider.as_str() {
            "gemini" | "disabled" => {}
            other => bail!(
                "Unknown scoring provider: '{}'. Must be gemini or disabled.",
                other
            ),
        }

        if self.scoring.max_body_chars == 0 {
            bail!("scoring.max_body_chars must be > 0");
        }
        Ok(())
    }
}

/// Strictly load and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

/// Load `path`, falling back to [`Config::fallback`] only if it does not exist.
pub fn load_or_default(path: &Path) -> Result<(Config, ConfigOrigin)> {
    match std::fs::metadata(path) {
        Ok(_) => {
            let config = load_config(path)?;
            tracing::info!(path = %path.display(), "loaded configuration file");
            Ok((config, ConfigOrigin::File(path.to_path_buf())))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(
                path = %path.display(),
                "config file not found, using built-in defaults"
            );
            Ok((Config::fallback(), ConfigOrigin::Fallback(path.to_path_buf())))
        }
        Err(e) => Err(e).with_context(|| format!("Failed to stat config file: {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_minimal_file_gets_defaults() {
        let config: Config = toml::from_str("[db]\npath = \"./x.sqlite\"\n").unwrap();
        config.validate().unwrap();
        assert_eq!(config.monitoring.config, MonitoringConfig::default());
        assert_eq!(config.scoring.min_interval_ms, 2100);
        assert_eq!(config.server.bind, "127.0.0.1:3001");
    }

    #[test]
    fn test_monitoring_section_parses() {
        let config: Config = toml::from_str(
            r#"
[db]
path = "./x.sqlite"

[monitoring]
keywords = ["mock interview"]
partitions = ["jobs"]
interval = "0 * * * *"
limit = 10
min_score = 75
run_on_start = false
"#,
        )
        .unwrap();
        config.validate().unwrap();
        let m = &config.monitoring;
        assert_eq!(m.config.keywords, vec!["mock interview"]);
        assert_eq!(m.config.partitions, vec!["jobs"]);
        assert_eq!(m.config.min_score, 75);
        assert!(!m.run_on_start);
        assert!(m.schedule_enabled);
        assert_eq!(m.sort, SortMode::New);
        assert_eq!(m.time, TimeWindow::Day);
    }

    #[test]
    fn test_cycle_search_options_override() {
        let config: Config = toml::from_str(
            "[db]\npath = \"x\"\n[monitoring]\nsort = \"top\"\ntime = \"week\"\n",
        )
        .unwrap();
        assert_eq!(config.monitoring.sort, SortMode::Top);
        assert_eq!(config.monitoring.time, TimeWindow::Week);

        let bad: std::result::Result<Config, _> =
            toml::from_str("[db]\npath = \"x\"\n[monitoring]\ntime = \"decade\"\n");
        assert!(bad.is_err());
    }

    #[test]
    fn test_example_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/leadwatch.example.toml");
        let config = load_config(&path).unwrap();
        assert_eq!(config.monitoring.config, MonitoringConfig::default());
        assert_eq!(config.scoring.provider, "gemini");
    }

    #[test]
    fn test_rejects_bad_limit() {
        let config: Config =
            toml::from_str("[db]\npath = \"x\"\n[monitoring]\nlimit = 500\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let config: Config =
            toml::from_str("[db]\npath = \"x\"\n[scoring]\nprovider = \"magic\"\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_falls_back() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("absent.toml");
        let (config, origin) = load_or_default(&path).unwrap();
        assert_eq!(origin, ConfigOrigin::Fallback(path));
        assert_eq!(config.monitoring.config.keywords.len(), DEFAULT_KEYWORDS.len());
        assert_eq!(config.monitoring.config.interval, DEFAULT_INTERVAL);
    }

    #[test]
    fn test_broken_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        std::fs::write(&path, "[db\npath = ").unwrap();
        assert!(load_or_default(&path).is_err());
    }

    #[test]
    fn test_patch_merges_subset() {
        let base = MonitoringConfig::default();
        let patch = ConfigPatch {
            keywords: Some(vec!["resume review".into()]),
            min_score: Some(80),
            ..Default::default()
        };
        let merged = base.merged(&patch).unwrap();
        assert_eq!(merged.keywords, vec!["resume review"]);
        assert_eq!(merged.min_score, 80);
        assert_eq!(merged.partitions, base.partitions);
        assert_eq!(merged.interval, base.interval);
    }

    #[test]
    fn test_patch_rejects_empty_lists() {
        let base = MonitoringConfig::default();
        let patch = ConfigPatch {
            partitions: Some(vec![]),
            ..Default::default()
        };
        assert!(matches!(
            base.merged(&patch),
            Err(LeadError::InvalidArgument(_))
        ));
        let patch = ConfigPatch {
            keywords: Some(vec!["  ".into()]),
            ..Default::default()
        };
        assert!(base.merged(&patch).is_err());
    }

    #[test]
    fn test_patch_rejects_bad_interval() {
        let patch = ConfigPatch {
            interval: Some("every tuesday".into()),
            ..Default::default()
        };
        assert!(MonitoringConfig::default().merged(&patch).is_err());
    }
}
