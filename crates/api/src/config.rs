//! Engine configuration: YAML file, then environment overlay.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use statline_client::{ClientConfig, RetryPolicy, DEFAULT_CREDENTIAL_HEADER};
use statline_store::{RateWindow, DEFAULT_MAX_ENTRIES};

pub const ENV_API_KEY: &str = "STATLINE_API_KEY";
pub const ENV_CREDENTIAL_HEADER: &str = "STATLINE_CREDENTIAL_HEADER";
pub const ENV_TIMEOUT_SECS: &str = "STATLINE_TIMEOUT_SECS";
pub const ENV_BASE_URL_PREFIX: &str = "STATLINE_BASE_URL_";

const DEFAULT_BASE_URLS: &[(&str, &str)] = &[
    ("football", "https://v3.football.api-sports.io"),
    ("basketball", "https://v1.basketball.api-sports.io"),
    ("baseball", "https://v1.baseball.api-sports.io"),
    ("hockey", "https://v1.hockey.api-sports.io"),
    ("rugby", "https://v1.rugby.api-sports.io"),
    ("volleyball", "https://v1.volleyball.api-sports.io"),
    ("handball", "https://v1.handball.api-sports.io"),
    ("formula-1", "https://v1.formula-1.api-sports.io"),
    ("afl", "https://v1.afl.api-sports.io"),
    ("nba", "https://v2.nba.api-sports.io"),
    ("nfl", "https://v1.american-football.api-sports.io"),
    ("mma", "https://v1.mma.api-sports.io"),
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read {path}: {reason}")]
    Io { path: String, reason: String },
    #[error("parse config: {0}")]
    Parse(String),
    #[error("invalid {key}: {reason}")]
    Invalid { key: String, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// API key; empty means no credential header is sent.
    #[serde(skip_serializing)]
    pub credential: String,
    pub credential_header: String,
    /// Entries here are merged over the built-in per-sport defaults.
    pub base_urls: BTreeMap<String, String>,
    pub timeout_secs: u64,
    pub retry: RetryPolicy,
    pub rate_limits: Vec<RateWindow>,
    pub remote_retry_after_secs: u64,
    pub cache_max_entries: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            credential: String::new(),
            credential_header: DEFAULT_CREDENTIAL_HEADER.to_string(),
            base_urls: default_base_urls(),
            timeout_secs: 30,
            retry: RetryPolicy::default(),
            rate_limits: RateWindow::free_tier(),
            remote_retry_after_secs: 60,
            cache_max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

pub fn default_base_urls() -> BTreeMap<String, String> {
    DEFAULT_BASE_URLS.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// `formula-1` -> `STATLINE_BASE_URL_FORMULA_1`
pub fn base_url_var(namespace: &str) -> String {
    format!("{ENV_BASE_URL_PREFIX}{}", namespace.to_uppercase().replace('-', "_"))
}

impl EngineConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let mut cfg: EngineConfig = serde_yaml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let mut merged = default_base_urls();
        merged.append(&mut cfg.base_urls);
        cfg.base_urls = merged;
        Ok(cfg)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io { path: path.display().to_string(), reason: e.to_string() })?;
        Self::from_yaml_str(&text)
    }

    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, ConfigError> { Self::default().overlay_env(std::env::vars()) }

    /// Overlay `STATLINE_*` variables from `vars` onto this config.
    pub fn overlay_env<I>(mut self, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: Vec<(String, String)> = vars.into_iter().collect();
        for (key, value) in vars.iter() {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key.as_str() {
                ENV_API_KEY => self.credential = value.to_string(),
                ENV_CREDENTIAL_HEADER => self.credential_header = value.to_string(),
                ENV_TIMEOUT_SECS => {
                    self.timeout_secs = value
                        .parse()
                        .map_err(|_| ConfigError::Invalid { key: key.clone(), reason: format!("`{value}` is not a number") })?
                }
                _ => {}
            }
        }
        // known namespaces first so `FORMULA_1` maps back to `formula-1`
        let known: Vec<String> = self.base_urls.keys().cloned().collect();
        for (key, value) in vars.iter() {
            let Some(suffix) = key.strip_prefix(ENV_BASE_URL_PREFIX) else { continue };
            if suffix.is_empty() || value.trim().is_empty() {
                continue;
            }
            let ns = known
                .iter()
                .find(|ns| base_url_var(ns) == *key)
                .cloned()
                .unwrap_or_else(|| suffix.to_lowercase().replace('_', "-"));
            self.base_urls.insert(ns, value.trim().to_string());
        }
        Ok(self)
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = credential.into();
        self
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            credential: self.credential.clone(),
            credential_header: self.credential_header.clone(),
            base_urls: self.base_urls.clone(),
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
            retry: self.retry,
            remote_retry_after_secs: self.remote_retry_after_secs,
        }
    }
}
