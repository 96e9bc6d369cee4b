//! Configuration management
//!
//! Loads from YAML files + environment variables via .env. Loaded once in
//! `main` and handed down explicitly.

mod types;

pub use types::*;

use anyhow::{bail, Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat, Map};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashSet;

/// Default bound on a feed's round window
pub const DEFAULT_MAX_ROUNDS: usize = 100;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub chain: ChainConfig,
    pub runner: RunnerConfig,
    #[serde(default)]
    pub report: ReportConfig,
    pub logging: LoggingConfig,
    pub feeds: Vec<FeedConfig>,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let legacy = LegacySettings::from_file("config/config")?
            .overlay_env(|key| std::env::var(key).ok())?;

        let builder = Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(legacy.into_source())
            // Override with environment variables (FLUXDEV__SECTION__KEY)
            .add_source(
                Environment::with_prefix("FLUXDEV")
                    .separator("__")
                    .try_parsing(true),
            );

        Self::build(builder)
    }

    /// Defaults overlaid with a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let builder = Self::defaults()?.add_source(File::from_str(yaml, FileFormat::Yaml));
        Self::build(builder)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        let builder = Config::builder()
            .set_default("chain.endpoint", "")?
            .set_default("chain.from_block", 0)?
            .set_default("runner.parallel", false)?
            .set_default("runner.max_rounds", DEFAULT_MAX_ROUNDS as u64)?
            .set_default("logging.json", false)?
            .set_default("logging.filter", "flux_deviation=info")?
            .set_default("feeds", Vec::<String>::new())?;
        Ok(builder)
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config = builder.build().context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(app_config)
    }

    /// Reject configurations no scenario could run with
    pub fn validate(&self) -> Result<()> {
        if self.chain.endpoint.trim().is_empty() {
            bail!("chain.endpoint is not set (config/default.yaml, WSS or FLUXDEV__CHAIN__ENDPOINT)");
        }
        if self.feeds.is_empty() {
            bail!("No feeds configured");
        }

        let mut names = HashSet::new();
        for feed in &self.feeds {
            if !names.insert(feed.name.as_str()) {
                bail!("Duplicate feed name '{}'", feed.name);
            }
            if feed.threshold < Decimal::ZERO {
                bail!(
                    "Feed '{}' has a negative threshold ({}%)",
                    feed.name,
                    feed.threshold
                );
            }
        }

        Ok(())
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        let feeds: Vec<&str> = self.feeds.iter().map(|f| f.name.as_str()).collect();
        format!(
            "endpoint={} parallel={} max_rounds={} feeds={:?}",
            self.chain.endpoint, self.runner.parallel, self.runner.max_rounds, feeds
        )
    }
}

/// Flat settings older pipelines still pass: `wss` / `parallel` in
/// `config/config.yml`, or the bare `WSS` / `PARALLEL` variables.
///
/// Layered above the YAML files and below `FLUXDEV__*`.
#[derive(Debug, Default, Deserialize)]
struct LegacySettings {
    wss: Option<String>,
    parallel: Option<bool>,
}

impl LegacySettings {
    fn from_file(name: &str) -> Result<Self> {
        Config::builder()
            .add_source(File::with_name(name).required(false))
            .build()
            .and_then(|c| c.try_deserialize())
            .with_context(|| format!("Failed to read legacy config {}", name))
    }

    /// Non-empty variables win over the file
    fn overlay_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(wss) = lookup("WSS").filter(|v| !v.is_empty()) {
            self.wss = Some(wss);
        }
        if let Some(parallel) = lookup("PARALLEL").filter(|v| !v.is_empty()) {
            self.parallel = Some(parse_flag(&parallel).context("Invalid PARALLEL value")?);
        }
        Ok(self)
    }

    fn into_source(self) -> Environment {
        let mut vars = Map::new();
        if let Some(wss) = self.wss {
            vars.insert("CHAIN__ENDPOINT".to_string(), wss);
        }
        if let Some(parallel) = self.parallel {
            vars.insert("RUNNER__PARALLEL".to_string(), parallel.to_string());
        }
        Environment::default()
            .separator("__")
            .try_parsing(true)
            .source(Some(vars))
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        other => bail!("'{}' is not a boolean", other),
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const YAML: &str = r#"
chain:
  endpoint: wss://node.example:8546
runner:
  parallel: true
feeds:
  - name: BTC
    address: "0xf570deefff684d964dc3e15e1f9414283e3f7419"
    rounds: 5
    threshold: 10
  - name: DOGE
    address: "0x0227903281b0421666f1e9161e8828c7112b8e86"
    rounds: 5
    threshold: 2.5
"#;

    #[test]
    fn yaml_overrides_defaults() {
        let config = AppConfig::from_yaml_str(YAML).unwrap();

        assert_eq!(config.chain.endpoint, "wss://node.example:8546");
        assert_eq!(config.chain.from_block, 0);
        assert!(config.runner.parallel);
        assert_eq!(config.runner.max_rounds, DEFAULT_MAX_ROUNDS);
        assert!(config.report.csv_path.is_none());
        assert_eq!(config.feeds.len(), 2);
        assert_eq!(config.feeds[0].threshold, dec!(10));
        assert_eq!(config.feeds[1].threshold, dec!(2.5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn defaults_fail_validation() {
        let config = AppConfig::from_yaml_str("{}").unwrap();
        assert!(!config.runner.parallel);
        assert!(config.feeds.is_empty());
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_feed_names_are_rejected() {
        let mut config = AppConfig::from_yaml_str(YAML).unwrap();
        config.feeds[1].name = "BTC".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate feed name"));
    }

    #[test]
    fn negative_threshold_is_rejected() {
        let mut config = AppConfig::from_yaml_str(YAML).unwrap();
        config.feeds[0].threshold = dec!(-1);
        assert!(config.validate().is_err());
    }

    fn env(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    fn with_legacy(yaml: &str, legacy: LegacySettings) -> AppConfig {
        let builder = AppConfig::defaults()
            .unwrap()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .add_source(legacy.into_source());
        AppConfig::build(builder).unwrap()
    }

    #[test]
    fn bare_wss_and_parallel_override_yaml() {
        let legacy = LegacySettings::default()
            .overlay_env(env(&[("WSS", "wss://legacy.example"), ("PARALLEL", "F")]))
            .unwrap();
        let config = with_legacy(YAML, legacy);

        assert_eq!(config.chain.endpoint, "wss://legacy.example");
        assert!(!config.runner.parallel);
        assert_eq!(config.feeds.len(), 2);
    }

    #[test]
    fn empty_legacy_vars_are_ignored() {
        let legacy = LegacySettings::default()
            .overlay_env(env(&[("WSS", ""), ("PARALLEL", "")]))
            .unwrap();
        let config = with_legacy(YAML, legacy);

        assert_eq!(config.chain.endpoint, "wss://node.example:8546");
        assert!(config.runner.parallel);
    }

    #[test]
    fn legacy_file_keys_are_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "wss: ws://file.example\nparallel: true\n").unwrap();

        let legacy = LegacySettings::from_file(path.to_str().unwrap())
            .unwrap()
            .overlay_env(env(&[]))
            .unwrap();
        let config = with_legacy("{}", legacy);

        assert_eq!(config.chain.endpoint, "ws://file.example");
        assert!(config.runner.parallel);
    }

    #[test]
    fn missing_legacy_file_is_not_an_error() {
        let legacy = LegacySettings::from_file("does/not/exist").unwrap();
        assert!(legacy.wss.is_none() && legacy.parallel.is_none());
    }

    #[test]
    fn invalid_parallel_flag_is_rejected() {
        let err = LegacySettings::default()
            .overlay_env(env(&[("PARALLEL", "sometimes")]))
            .unwrap_err();
        assert!(err.to_string().contains("PARALLEL"));
    }

    #[test]
    fn digest_lists_feeds() {
        let config = AppConfig::from_yaml_str(YAML).unwrap();
        let digest = config.to_string();
        assert!(digest.contains("parallel=true"));
        assert!(digest.contains("\"DOGE\""));
    }
}
